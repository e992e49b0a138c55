//! HTTP client wrapper with retry logic.
//!
//! GET and DELETE are retried on network failures, 408, 429 and 5xx.
//! POST and PATCH create or amend orders, so they are retried on 429 only:
//! a throttled request was never processed, while a 5xx or a dropped
//! connection may have been.

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api_types::AlpacaErrorResponse;
use super::config::AlpacaConfig;
use super::error::AlpacaError;
use crate::broker::{
    ExponentialBackoffCalculator, RetryAfterExtractor, RetryPolicy, is_retryable_status,
};

/// Delay assumed when a 429 carries no Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP client for the Alpaca trading and data APIs.
#[derive(Clone)]
pub struct AlpacaHttpClient {
    client: Client,
    api_key: String,
    api_secret: String,
    trading_base_url: String,
    data_base_url: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for AlpacaHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaHttpClient")
            .field("trading_base_url", &self.trading_base_url)
            .field("data_base_url", &self.data_base_url)
            .finish_non_exhaustive()
    }
}

impl AlpacaHttpClient {
    /// Create a new HTTP client from config.
    pub fn new(config: &AlpacaConfig) -> Result<Self, AlpacaError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(AlpacaError::AuthenticationFailed);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AlpacaError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            trading_base_url: config.trading_url.clone(),
            data_base_url: config.data_url.clone(),
            retry: config.retry.clone(),
        })
    }

    /// GET from the trading API.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AlpacaError> {
        self.request(Method::GET, &self.trading_base_url, path, None::<&()>)
            .await
    }

    /// POST to the trading API.
    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AlpacaError> {
        self.request(Method::POST, &self.trading_base_url, path, Some(body))
            .await
    }

    /// PATCH the trading API.
    pub async fn patch<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AlpacaError> {
        self.request(Method::PATCH, &self.trading_base_url, path, Some(body))
            .await
    }

    /// DELETE on the trading API; any response body is discarded.
    pub async fn delete(&self, path: &str) -> Result<(), AlpacaError> {
        let _: serde_json::Value = self
            .request(Method::DELETE, &self.trading_base_url, path, None::<&()>)
            .await?;
        Ok(())
    }

    /// GET from the market data API.
    pub async fn data_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AlpacaError> {
        self.request(Method::GET, &self.data_base_url, path, None::<&()>)
            .await
    }

    async fn request<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        base_url: &str,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, AlpacaError> {
        let url = format!("{base_url}{path}");
        let idempotent = matches!(method, Method::GET | Method::DELETE);
        let mut backoff = ExponentialBackoffCalculator::new(&self.retry);

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("APCA-API-KEY-ID", &self.api_key)
                .header("APCA-API-SECRET-KEY", &self.api_secret);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let error = if e.is_timeout() {
                        AlpacaError::Timeout(e.to_string())
                    } else {
                        AlpacaError::Network(e.to_string())
                    };
                    if idempotent && let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            method = %method,
                            path,
                            error = %error,
                            delay_ms = delay.as_millis() as u64,
                            attempt = backoff.current_attempt(),
                            "Request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(exhausted(&backoff, error));
                }
            };

            let status = response.status();
            if status.is_success() {
                let text = response
                    .text()
                    .await
                    .map_err(|e| AlpacaError::Network(e.to_string()))?;
                let text = if text.trim().is_empty() { "null" } else { &text };
                return serde_json::from_str(text).map_err(|e| AlpacaError::Decode(e.to_string()));
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<AlpacaErrorResponse>(&error_body) {
                Ok(err) => (
                    err.code
                        .map_or_else(|| status.as_u16().to_string(), |code| code.to_string()),
                    err.message,
                ),
                Err(_) => (status.as_u16().to_string(), error_body),
            };

            let retryable = is_retryable_status(status.as_u16())
                && (idempotent || status == StatusCode::TOO_MANY_REQUESTS);
            if retryable
                && let Some(delay) = RetryAfterExtractor::get_delay(retry_after.as_deref(), &mut backoff)
            {
                tracing::warn!(
                    method = %method,
                    path,
                    status = status.as_u16(),
                    code = %code,
                    delay_ms = delay.as_millis() as u64,
                    "Retryable response, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let retry_after_secs = retry_after
                .as_deref()
                .and_then(RetryAfterExtractor::parse)
                .map_or(DEFAULT_RETRY_AFTER_SECS, |delay| delay.as_secs());
            let error = classify(status, code, message, path, retry_after_secs);
            return Err(if retryable { exhausted(&backoff, error) } else { error });
        }
    }
}

/// Wrap the last error once retries were spent on it.
fn exhausted(backoff: &ExponentialBackoffCalculator, error: AlpacaError) -> AlpacaError {
    match (backoff.current_attempt(), error) {
        (_, rate_limited @ AlpacaError::RateLimited { .. }) => rate_limited,
        (0, error) => error,
        (attempts, error) => AlpacaError::MaxRetriesExceeded {
            attempts: attempts + 1,
            last_error: error.to_string(),
        },
    }
}

/// Map a non-success response to an adapter error.
fn classify(
    status: StatusCode,
    code: String,
    message: String,
    path: &str,
    retry_after_secs: u64,
) -> AlpacaError {
    match status {
        StatusCode::UNAUTHORIZED => AlpacaError::AuthenticationFailed,
        StatusCode::FORBIDDEN if is_buying_power_message(&message) => {
            AlpacaError::InsufficientFunds(message)
        }
        StatusCode::FORBIDDEN => AlpacaError::AuthenticationFailed,
        StatusCode::NOT_FOUND => AlpacaError::NotFound {
            path: path.split('?').next().unwrap_or(path).to_string(),
        },
        StatusCode::UNPROCESSABLE_ENTITY if is_buying_power_message(&message) => {
            AlpacaError::InsufficientFunds(message)
        }
        StatusCode::UNPROCESSABLE_ENTITY => AlpacaError::OrderRejected(message),
        StatusCode::REQUEST_TIMEOUT => AlpacaError::Timeout(message),
        StatusCode::TOO_MANY_REQUESTS => AlpacaError::RateLimited { retry_after_secs },
        _ => AlpacaError::Api {
            status: status.as_u16(),
            code,
            message,
        },
    }
}

fn is_buying_power_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("buying power") || message.contains("insufficient")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_status(status: StatusCode, message: &str) -> AlpacaError {
        classify(status, status.as_u16().to_string(), message.to_string(), "/v2/orders/x?a=b", 3)
    }

    #[test]
    fn forbidden_buying_power_is_insufficient_funds() {
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "insufficient buying power"),
            AlpacaError::InsufficientFunds(_)
        ));
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "forbidden"),
            AlpacaError::AuthenticationFailed
        );
    }

    #[test]
    fn not_found_strips_query() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, ""),
            AlpacaError::NotFound {
                path: "/v2/orders/x".into()
            }
        );
    }

    #[test]
    fn unprocessable_is_rejection() {
        assert_eq!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "qty must be > 0"),
            AlpacaError::OrderRejected("qty must be > 0".into())
        );
    }

    #[test]
    fn throttling_keeps_retry_after() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            AlpacaError::RateLimited {
                retry_after_secs: 3
            }
        );
    }

    #[test]
    fn exhausted_counts_every_attempt() {
        let mut backoff = ExponentialBackoffCalculator::new(&RetryPolicy::default());
        assert_eq!(
            exhausted(&backoff, AlpacaError::Network("x".into())),
            AlpacaError::Network("x".into())
        );
        backoff.next_backoff();
        backoff.next_backoff();
        assert!(matches!(
            exhausted(&backoff, AlpacaError::Network("x".into())),
            AlpacaError::MaxRetriesExceeded { attempts: 3, .. }
        ));
    }
}
