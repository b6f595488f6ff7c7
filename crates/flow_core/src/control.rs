use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{ControlAction, ProcessId},
    error::ApiError,
    protocol::ControlResponse,
};
use tracing::{debug, warn};
use url::Url;

use crate::{config::RetryPolicy, error::ControlError};

/// Remote process-control service.
#[async_trait]
pub trait ControlApi: Send + Sync {
    async fn send(
        &self,
        process_id: &ProcessId,
        action: ControlAction,
    ) -> Result<ControlResponse, ControlError>;
}

/// Stand-in used when no control endpoint is configured. Every call fails.
pub struct MissingControlApi;

#[async_trait]
impl ControlApi for MissingControlApi {
    async fn send(
        &self,
        process_id: &ProcessId,
        action: ControlAction,
    ) -> Result<ControlResponse, ControlError> {
        Err(ControlError::Unavailable(format!(
            "no control endpoint configured for {action} {process_id}"
        )))
    }
}

/// `POST {base}/processes/{id}/start|stop` over HTTP.
pub struct HttpControlApi {
    http: Client,
    base_url: Url,
}

impl HttpControlApi {
    pub fn new(base_url: &str) -> Result<Self, ControlError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, ControlError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|err| ControlError::InvalidBaseUrl(format!("{base_url}: {err}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ControlError::InvalidBaseUrl(format!(
                "{base_url}: expected an http:// or https:// url"
            )));
        }
        Ok(Self { http, base_url })
    }

    fn action_url(&self, process_id: &ProcessId, action: ControlAction) -> Result<Url, ControlError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ControlError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["processes", process_id.as_str(), action.as_path_segment()]);
        Ok(url)
    }
}

#[async_trait]
impl ControlApi for HttpControlApi {
    async fn send(
        &self,
        process_id: &ProcessId,
        action: ControlAction,
    ) -> Result<ControlResponse, ControlError> {
        let url = self.action_url(process_id, action)?;
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|err| ControlError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|api_error| api_error.message)
                .unwrap_or(body);
            return Err(ControlError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<ControlResponse>()
            .await
            .map_err(|err| ControlError::Malformed(err.to_string()))
    }
}

/// One logical control call: per-attempt timeout, success check, and bounded
/// retry with exponential backoff for retryable failures.
pub(crate) async fn call_control(
    control: &dyn ControlApi,
    process_id: &ProcessId,
    action: ControlAction,
    timeout: Duration,
    retry: &RetryPolicy,
) -> Result<(), ControlError> {
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(timeout, control.send(process_id, action)).await {
            Ok(Ok(response)) if response.success => Ok(()),
            Ok(Ok(response)) => Err(ControlError::Refused {
                message: response
                    .message
                    .unwrap_or_else(|| "no reason given".to_string()),
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ControlError::Timeout(timeout)),
        };

        match result {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                attempt += 1;
                let delay = retry.backoff(attempt);
                warn!(
                    process_id = %process_id,
                    %action,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "control: retrying failed call"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                debug!(process_id = %process_id, %action, error = %err, "control: call failed");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/control_tests.rs"]
mod tests;
