//! Thin HTTP client for the JobHub API.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use jobhub_api::dto::response::ApiResponse;
use jobhub_api::error::ApiErrorResponse;
use jobhub_core::error::{AppError, ErrorKind};

/// Client bound to one server base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client for `base_url`, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// GET a JSON resource.
    pub async fn get<T: DeserializeOwned + Serialize>(&self, path: &str) -> Result<T, AppError> {
        debug!(path, "GET");
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(unreachable_server)?;
        decode(response).await
    }

    /// POST a JSON body, or no body when `body` is `None`.
    pub async fn post<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Serialize,
    {
        debug!(path, "POST");
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(unreachable_server)?;
        decode(response).await
    }

    /// Opens a streaming GET, returning the raw response for the caller to
    /// consume incrementally.
    pub async fn open_stream(&self, path: &str) -> Result<reqwest::Response, AppError> {
        let response = self
            .http
            .get(self.url(path))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(unreachable_server)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from(response).await)
        }
    }
}

fn unreachable_server(e: reqwest::Error) -> AppError {
    AppError::with_source(
        ErrorKind::ServiceUnavailable,
        "Could not reach the JobHub server",
        e,
    )
}

async fn decode<T: DeserializeOwned + Serialize>(response: reqwest::Response) -> Result<T, AppError> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    let body: ApiResponse<T> = response
        .json()
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Serialization, "Malformed response", e))?;
    Ok(body.data)
}

async fn error_from(response: reqwest::Response) -> AppError {
    let status = response.status();
    match response.json::<ApiErrorResponse>().await {
        Ok(body) => AppError::new(kind_for_code(&body.error), body.message),
        Err(_) => AppError::internal(format!("Server responded with {status}")),
    }
}

/// Maps an API error code back to an error kind.
fn kind_for_code(code: &str) -> ErrorKind {
    match code {
        "VALIDATION_ERROR" => ErrorKind::Validation,
        "NOT_FOUND" => ErrorKind::NotFound,
        "INVALID_STATE" => ErrorKind::InvalidState,
        "CONFLICT" => ErrorKind::Conflict,
        "SERVICE_UNAVAILABLE" => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Internal,
    }
}
