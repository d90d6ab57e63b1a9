//! ftrack REST API client
//!
//! Every call is a `POST {server}/api` carrying a JSON array of operations.
//! The response is an array with one result per operation, or an object
//! with `exception` and `content` when ftrack rejects the batch.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hiersync_ftrack::client::FtrackClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = FtrackClient::new("https://studio.ftrackapp.com", "pipeline", "api-key");
//! let projects = client.query(r#"select id, full_name from Project"#).await?;
//! println!("{} projects", projects.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::FtrackError;

/// Header carrying the API user name
pub const USER_HEADER: &str = "ftrack-user";

/// Header carrying the API key
pub const KEY_HEADER: &str = "ftrack-api-key";

/// Retry-after used when a 429 response carries no usable header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Upper bound for a server-requested back-off
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

const DEFAULT_MAX_RETRIES: u32 = 5;

// ============================================================================
// FtrackClient
// ============================================================================

/// HTTP client for the ftrack API
pub struct FtrackClient {
    client: Client,
    server_url: String,
    api_user: String,
    api_key: String,
    max_retries: u32,
}

impl FtrackClient {
    /// Creates a client for `server_url` (scheme and host, no `/api`)
    pub fn new(
        server_url: impl Into<String>,
        api_user: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let server_url: String = server_url.into();
        Self {
            client: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            api_user: api_user.into(),
            api_key: api_key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Applies a per-request timeout
    ///
    /// # Errors
    /// Fails if the TLS backend cannot be initialized.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(self)
    }

    /// Sets how many times a 429 response is retried
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn api_user(&self) -> &str {
        &self.api_user
    }

    /// Authenticated request builder for the batch endpoint
    pub fn request(&self) -> RequestBuilder {
        self.client
            .post(format!("{}/api", self.server_url))
            .header(USER_HEADER, &self.api_user)
            .header(KEY_HEADER, &self.api_key)
    }

    /// Sends a batch of operations and returns one result per operation
    ///
    /// HTTP 429 responses are retried after the server's `Retry-After`.
    pub async fn call(&self, operations: &[Value]) -> Result<Vec<Value>> {
        let mut retry_after = DEFAULT_RETRY_AFTER;

        for attempt in 0..=self.max_retries {
            let response = self
                .request()
                .json(operations)
                .send()
                .await
                .map_err(FtrackError::from)
                .context("Failed to send request to ftrack")?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .map(parse_retry_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                if attempt == self.max_retries {
                    break;
                }
                info!(
                    attempt,
                    retry_after_ms = retry_after.as_millis(),
                    "ftrack rate limit hit, backing off"
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(FtrackError::from)
                .context("Failed to read ftrack response")?;

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(FtrackError::Unauthorized(body).into());
            }
            if attempt > 0 {
                debug!(attempt, "ftrack request succeeded after retry");
            }
            return parse_batch_response(status, &body, operations.len()).map_err(Into::into);
        }

        warn!(attempts = self.max_retries + 1, "ftrack retry limit exhausted");
        Err(FtrackError::TooManyRequests { retry_after }.into())
    }

    /// Runs a single query expression and returns its `data` rows
    pub async fn query(&self, expression: &str) -> Result<Vec<Value>> {
        debug!(expression, "ftrack query");
        let operation = json!({ "action": "query", "expression": expression });
        let mut results = self
            .call(std::slice::from_ref(&operation))
            .await
            .with_context(|| format!("ftrack query failed: {}", expression))?;

        let result = results.pop().unwrap_or(Value::Null);
        match result.get("data") {
            Some(Value::Array(rows)) => Ok(rows.clone()),
            _ => Err(FtrackError::InvalidResponse(format!(
                "query result without data array: {}",
                result
            ))
            .into()),
        }
    }
}

// ============================================================================
// Response handling
// ============================================================================

fn parse_batch_response(
    status: StatusCode,
    body: &str,
    expected: usize,
) -> Result<Vec<Value>, FtrackError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        if status.is_success() {
            FtrackError::InvalidResponse(format!("body is not JSON: {}", e))
        } else {
            FtrackError::Http {
                status: status.as_u16(),
                body: body.to_string(),
            }
        }
    })?;

    if let Some(exception) = value.get("exception").and_then(Value::as_str) {
        let content = value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(FtrackError::Server {
            exception: exception.to_string(),
            content: content.to_string(),
        });
    }
    if !status.is_success() {
        return Err(FtrackError::Http {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    match value {
        Value::Array(results) if results.len() == expected => Ok(results),
        Value::Array(results) => Err(FtrackError::InvalidResponse(format!(
            "expected {} results, got {}",
            expected,
            results.len()
        ))),
        other => Err(FtrackError::InvalidResponse(format!(
            "expected a result array, got {}",
            other
        ))),
    }
}

/// Parses a `Retry-After` header given in seconds or as an HTTP date
pub fn parse_retry_after(value: &str) -> Duration {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds).min(MAX_RETRY_AFTER);
    }
    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return wait
            .to_std()
            .map(|d| d.min(MAX_RETRY_AFTER))
            .unwrap_or(Duration::ZERO);
    }
    warn!(value, "Unparseable Retry-After header, using default");
    DEFAULT_RETRY_AFTER
}

/// Quotes a value for use inside a query expression
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_sets_headers_and_url() {
        let client = FtrackClient::new("https://studio.example.com/", "pipeline", "secret");
        let request = client.request().build().unwrap();

        assert_eq!(request.url().as_str(), "https://studio.example.com/api");
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.headers().get(USER_HEADER).unwrap(), "pipeline");
        assert_eq!(request.headers().get(KEY_HEADER).unwrap(), "secret");
    }

    #[test]
    fn test_with_max_retries() {
        let client = FtrackClient::new("http://localhost", "u", "k").with_max_retries(0);
        assert_eq!(client.max_retries, 0);
        assert_eq!(client.api_user(), "u");
        assert_eq!(client.server_url(), "http://localhost");
    }

    mod response_tests {
        use super::*;

        #[test]
        fn test_exception_payload_is_server_error() {
            let body = r#"{"exception": "ServerError", "content": "Unknown entity type Foo"}"#;
            let err = parse_batch_response(StatusCode::OK, body, 1).unwrap_err();
            assert!(matches!(err, FtrackError::Server { ref exception, .. } if exception == "ServerError"));
            assert!(err.to_string().contains("Unknown entity type Foo"));
        }

        #[test]
        fn test_result_count_must_match() {
            let err = parse_batch_response(StatusCode::OK, "[]", 1).unwrap_err();
            assert!(matches!(err, FtrackError::InvalidResponse(_)));
        }

        #[test]
        fn test_non_json_error_body() {
            let err = parse_batch_response(StatusCode::BAD_GATEWAY, "<html>", 1).unwrap_err();
            assert!(matches!(err, FtrackError::Http { status: 502, .. }));
        }

        #[test]
        fn test_results_returned_in_order() {
            let body = r#"[{"action": "query", "data": []}, {"action": "create", "data": {"id": "j1"}}]"#;
            let results = parse_batch_response(StatusCode::OK, body, 2).unwrap();
            assert_eq!(results[1]["data"]["id"], "j1");
        }
    }

    mod retry_after_tests {
        use super::*;

        #[test]
        fn test_seconds() {
            assert_eq!(parse_retry_after("3"), Duration::from_secs(3));
            assert_eq!(parse_retry_after(" 0 "), Duration::ZERO);
        }

        #[test]
        fn test_capped() {
            assert_eq!(parse_retry_after("86400"), MAX_RETRY_AFTER);
        }

        #[test]
        fn test_date_in_the_past_means_no_wait() {
            assert_eq!(
                parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
                Duration::ZERO
            );
        }

        #[test]
        fn test_garbage_falls_back_to_default() {
            assert_eq!(parse_retry_after("soon"), DEFAULT_RETRY_AFTER);
        }
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("SH010"), "\"SH010\"");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }
}
