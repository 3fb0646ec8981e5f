//! Google Cloud Logging (formerly Stackdriver) client.
//!
//! Implements [`EventLogger`] against the Cloud Logging v2 REST API:
//! structured events are written as single entries with a `jsonPayload`,
//! and whole logs can be deleted by id. The endpoint is overridable for
//! tests and emulators.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::json;

use crate::auth::TokenProvider;
use crate::contract::{EventLogger, LogEvent, LoggingError};

const DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";

/// Everything outside the URL path-segment unreserved set gets encoded.
pub(crate) const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Client for writing and deleting structured logs in Cloud Logging.
#[derive(Clone)]
pub struct CloudLoggingClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    project: String,
    endpoint: String,
}

impl CloudLoggingClient {
    pub fn new(project: impl Into<String>, tokens: TokenProvider) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            project: project.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Override the API endpoint (tests, emulators).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Fully qualified log name, with the log id percent-encoded.
    fn log_name(&self, log_id: &str) -> String {
        format!(
            "projects/{}/logs/{}",
            self.project,
            utf8_percent_encode(log_id, SEGMENT)
        )
    }
}

#[async_trait]
impl EventLogger for CloudLoggingClient {
    async fn log_event<'a>(&self, log_id: &'a str, event: LogEvent) -> Result<(), LoggingError> {
        let token = self.tokens.token().await?;
        let body = json!({
            "logName": self.log_name(log_id),
            "resource": { "type": "global" },
            "entries": [{
                "severity": event.severity.as_str(),
                "jsonPayload": event.to_payload(),
            }],
        });

        tracing::debug!(
            log_id,
            event_name = %event.name,
            severity = event.severity.as_str(),
            "Writing log entry"
        );

        let response = self
            .http
            .post(format!("{}/v2/entries:write", self.endpoint))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(log_id, status = status.as_u16(), "Failed to write log entry");
            return Err(LoggingError::Unexpected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    async fn delete_logs<'a>(&self, log_id: &'a str) -> Result<(), LoggingError> {
        let token = self.tokens.token().await?;
        let url = format!(
            "{}/v2/projects/{}/logs/{}",
            self.endpoint,
            self.project,
            utf8_percent_encode(log_id, SEGMENT)
        );

        tracing::info!(log_id, "Deleting all entries of log");

        let response = self.http.delete(url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(log_id, status = status.as_u16(), "Failed to delete log");
            return Err(LoggingError::Unexpected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenProvider;

    #[test]
    fn log_name_encodes_log_id() {
        let client = CloudLoggingClient::new("my-project", TokenProvider::new());
        assert_eq!(
            client.log_name("infra"),
            "projects/my-project/logs/infra"
        );
        // Slashes and spaces in log ids must not break the resource path.
        assert_eq!(
            client.log_name("app/events v2"),
            "projects/my-project/logs/app%2Fevents%20v2"
        );
    }

    #[test]
    fn endpoint_override_strips_trailing_slash() {
        let client = CloudLoggingClient::new("p", TokenProvider::new())
            .with_endpoint("http://localhost:8080/");
        assert_eq!(client.endpoint, "http://localhost:8080");
    }
}
