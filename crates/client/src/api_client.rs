//! HTTP client for the optimization service's REST endpoints.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use greenwave_shared::{
    ApiError, HealthResponse, PlanResponse, RunRequest, RunResponse, StopResponse, SystemState,
    UploadRequest, UploadResponse,
};

/// Client for the service's `/api/*` endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Make a GET request and decode the JSON response.
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Make a POST request with a JSON body and decode the JSON response.
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }

    // --- Typed endpoint wrappers ---

    /// Fetch the current system state snapshot.
    pub async fn get_state(&self) -> Result<SystemState, ApiError> {
        self.get_json("/api/state").await
    }

    /// Fetch the current cycle plan.
    pub async fn get_plan(&self) -> Result<PlanResponse, ApiError> {
        self.get_json("/api/plan").await
    }

    /// Service liveness probe.
    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        self.get_json("/api/healthz").await
    }

    /// Start the optimization model. Resulting state changes arrive over the
    /// stream, not in this response.
    pub async fn run_optimization(&self, request: &RunRequest) -> Result<RunResponse, ApiError> {
        self.post_json("/api/run", request).await
    }

    /// Stop the optimization model.
    pub async fn stop_optimization(&self) -> Result<StopResponse, ApiError> {
        self.post_json("/api/stop", &serde_json::json!({})).await
    }

    /// Register video sources (file paths or stream URLs) per approach.
    pub async fn upload_videos(&self, request: &UploadRequest) -> Result<UploadResponse, ApiError> {
        self.post_json("/api/upload", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joining_handles_slashes() {
        let client = ApiClient::new("http://localhost:8000/");
        assert_eq!(client.url("/api/state"), "http://localhost:8000/api/state");
        assert_eq!(client.url("api/state"), "http://localhost:8000/api/state");

        let client = ApiClient::new("http://localhost:8000");
        assert_eq!(client.url("/api/state"), "http://localhost:8000/api/state");
    }
}
