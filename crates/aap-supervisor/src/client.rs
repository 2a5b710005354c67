//! Loopback HTTP calls to the worker server.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use aap_core::{Endpoint, LogFrame};

use crate::error::SupervisorError;

/// Body `/health` must return for the listener to count as our worker.
pub const HEALTH_DETAIL: &str = "ADB Auto Player Server";
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
pub const POST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct HealthResponse {
    detail: String,
}

#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    command: &'a [String],
}

#[derive(Debug, Deserialize)]
struct LogFrameList {
    messages: Vec<LogFrame>,
}

#[derive(Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
}

impl WorkerClient {
    pub fn new() -> Result<Self, SupervisorError> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|err| SupervisorError::DecodeFailed(format!("http client: {err}")))?;
        Ok(Self { http })
    }

    /// `GET /health` and check the identity body.
    pub async fn health(&self, endpoint: &Endpoint) -> Result<(), SupervisorError> {
        let url = endpoint.http_url("/health");
        let resp = self
            .http
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|source| SupervisorError::ServerUnreachable {
                endpoint: endpoint.clone(),
                source,
            })?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(SupervisorError::Unhealthy(format!(
                "health check returned non-OK status: {status}"
            )));
        }
        let body = resp.text().await.unwrap_or_default();
        let parsed: HealthResponse = serde_json::from_str(&body).map_err(|err| {
            SupervisorError::Unhealthy(format!("failed to parse health check response: {err}"))
        })?;
        if parsed.detail != HEALTH_DETAIL {
            return Err(SupervisorError::Unhealthy(format!(
                "expected detail='{HEALTH_DETAIL}', got '{}'",
                parsed.detail
            )));
        }
        Ok(())
    }

    pub async fn is_healthy(&self, endpoint: &Endpoint) -> bool {
        self.health(endpoint).await.is_ok()
    }

    /// POST a JSON body and return the raw response body on HTTP 200.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        endpoint: &Endpoint,
        path: &str,
        body: &B,
    ) -> Result<String, SupervisorError> {
        let resp = self
            .http
            .post(endpoint.http_url(path))
            .timeout(POST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|source| SupervisorError::ServerUnreachable {
                endpoint: endpoint.clone(),
                source,
            })?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|err| SupervisorError::DecodeFailed(err.to_string()))?;
        if status != 200 {
            return Err(SupervisorError::HttpStatus { status, body: text });
        }
        Ok(text)
    }

    /// `POST /execute` with `{command}`; returns the ordered log frames.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        args: &[String],
    ) -> Result<Vec<LogFrame>, SupervisorError> {
        let text = self
            .post_json(endpoint, "/execute", &CommandRequest { command: args })
            .await?;
        let list: LogFrameList = serde_json::from_str(&text)
            .map_err(|err| SupervisorError::DecodeFailed(err.to_string()))?;
        Ok(list.messages)
    }
}
