//! Read-modify-CAS loop over [`JobStore::compare_and_swap`].

use chrono::Utc;
use tracing;

use jobhub_core::result::AppResult;
use jobhub_core::types::JobId;
use jobhub_entity::job::Job;

use crate::store::JobStore;

/// Apply `mutate` to the freshest copy of a job until the CAS succeeds.
///
/// `mutate` may run several times and must be a pure function of the job
/// it is given. Returning `Ok(false)` leaves the job untouched; an error
/// aborts without writing. On success `updated_at` is refreshed.
///
/// Returns the latest job and whether a write happened.
pub async fn update_job<F>(store: &dyn JobStore, id: JobId, mut mutate: F) -> AppResult<(Job, bool)>
where
    F: FnMut(&mut Job) -> AppResult<bool> + Send,
{
    let mut conflicts = 0u32;
    loop {
        let current = store.get(id).await?;
        let mut next = current.clone();

        if !mutate(&mut next)? {
            return Ok((current, false));
        }
        next.updated_at = Utc::now();

        let (job, swapped) = store.compare_and_swap(id, current.revision, next).await?;
        if swapped {
            if conflicts > 0 {
                tracing::trace!(job_id = %id, conflicts, "CAS succeeded after retries");
            }
            return Ok((job, true));
        }

        conflicts += 1;
        tokio::task::yield_now().await;
    }
}
