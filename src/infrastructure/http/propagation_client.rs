use crate::domain::errors::PropagationError;
use crate::domain::optimization::parameter_set::ParameterSet;
use crate::domain::ports::ParameterPropagator;
use crate::domain::propagation::{LivenessStatus, PropagationPayload};
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, join_url};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pushes accepted parameters to the trading service over HTTP.
pub struct HttpPropagationClient {
    update_url: String,
    health_url: String,
    /// Retrying client for the idempotent health GET.
    health_client: ClientWithMiddleware,
    /// Plain client for the update POST; a POST is never retried.
    update_client: Client,
}

impl HttpPropagationClient {
    pub fn new(base_url: &str, update_path: &str, health_path: &str, timeout: Duration) -> Self {
        Self {
            update_url: join_url(base_url, update_path),
            health_url: join_url(base_url, health_path),
            health_client: HttpClientFactory::create_client(timeout),
            update_client: HttpClientFactory::create_plain_client(timeout),
        }
    }
}

#[async_trait]
impl ParameterPropagator for HttpPropagationClient {
    async fn check_liveness(&self) -> Result<LivenessStatus, PropagationError> {
        let response = self
            .health_client
            .get(&self.health_url)
            .send()
            .await
            .map_err(|e| PropagationError::Unreachable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PropagationError::NotLive {
                reason: format!("health endpoint returned HTTP {}", status.as_u16()),
            });
        }

        let liveness: LivenessStatus =
            response
                .json()
                .await
                .map_err(|e| PropagationError::NotLive {
                    reason: format!("unreadable health response: {}", e),
                })?;

        if !liveness.bot_active {
            return Err(PropagationError::NotLive {
                reason: format!("bot inactive (status: {})", liveness.status),
            });
        }

        debug!("Trading service live: status={}", liveness.status);
        Ok(liveness)
    }

    async fn propagate(&self, parameters: &ParameterSet) -> Result<(), PropagationError> {
        let payload = PropagationPayload::from(parameters);
        let response = self
            .update_client
            .post(&self.update_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PropagationError::Unreachable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Parameter update rejected: HTTP {} {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            );
            return Err(PropagationError::Rejected {
                status: status.as_u16(),
            });
        }

        info!(
            "Propagated {} parameters to {} (score={:.4})",
            payload.parameters.len(),
            self.update_url,
            payload.score
        );
        Ok(())
    }
}
