//! Typed path parameter helpers.

use jobhub_core::error::AppError;
use jobhub_core::types::JobId;

/// Parses a job id from a path segment.
pub fn parse_job_id(s: &str) -> Result<JobId, AppError> {
    s.parse::<JobId>()
        .map_err(|_| AppError::validation(format!("Invalid job id: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id() {
        let id = JobId::new();
        assert_eq!(parse_job_id(&id.to_string()).unwrap(), id);
        assert!(parse_job_id("not-a-uuid").is_err());
    }
}
