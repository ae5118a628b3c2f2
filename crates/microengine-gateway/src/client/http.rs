//! HTTP layer: status mapping and retry.
//!
//! This is the ONLY place for status code handling. The public clients never
//! interpret status codes.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use crate::error::{GatewayError, GatewayResult};
use crate::types::GatewayConfig;

use super::helpers::resource_from_url;

/// HTTP backend for making requests (holds reqwest client and config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) config: GatewayConfig,
}

impl HttpBackend {
    /// Idempotent request with retry on transient failures.
    ///
    /// Only used for reads. Assertions, reveals and artifact downloads go
    /// through [`HttpBackend::request_once`].
    pub(crate) async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
    ) -> GatewayResult<reqwest::Response> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            let result = self.request_once(method.clone(), url, None).await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let backoff = match &e {
                        GatewayError::RateLimited {
                            retry_after: Some(retry_after),
                        } => {
                            let capped = (*retry_after).min(Duration::from_secs(30));
                            let base_ms = capped.as_millis() as u64;
                            let jitter_factor: f64 =
                                rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
                            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
                            Duration::from_millis(jittered_ms.max(100))
                        }
                        _ => {
                            let base_backoff = Duration::from_secs(1 << retries);
                            let base_backoff = base_backoff.min(Duration::from_secs(30));
                            let jittered_ms =
                                rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                            Duration::from_millis(jittered_ms.max(10))
                        }
                    };

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single attempt; maps non-success statuses to [`GatewayError`].
    pub(crate) async fn request_once(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> GatewayResult<reqwest::Response> {
        let mut request = self.client.request(method, url);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response),

            401 | 403 => {
                let message = response.text().await.unwrap_or_default();
                Err(GatewayError::Unauthorized {
                    message: if message.is_empty() {
                        status.to_string()
                    } else {
                        message
                    },
                })
            }

            404 => Err(GatewayError::NotFound {
                resource: resource_from_url(url),
            }),

            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(GatewayError::RateLimited { retry_after })
            }

            400..=499 => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(GatewayError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }

            _ => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| StatusCode::as_str(&status).to_string());
                Err(GatewayError::Network {
                    message: format!("HTTP {}: {}", status.as_u16(), message),
                })
            }
        }
    }
}
