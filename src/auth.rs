//! Ambient credential resolution for the Google Cloud clients.
//!
//! A bearer token is resolved from, in order:
//! 1. the `GOOGLE_ACCESS_TOKEN` environment variable (local development,
//!    CI, tests);
//! 2. the GCE metadata server, when running on Google infrastructure.
//!
//! Metadata tokens are cached until shortly before expiry; the env var path
//! is read on every call so tests can swap tokens freely.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_METADATA_ENDPOINT: &str = "http://metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens this close to expiry are refreshed instead of reused.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(
        "no ambient credentials: GOOGLE_ACCESS_TOKEN is unset and the metadata server is unreachable ({0})"
    )]
    NoCredentials(String),
    #[error("metadata server returned {status}: {body}")]
    Metadata { status: u16, body: String },
    #[error("malformed token response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Resolves and caches access tokens for the cloud clients.
#[derive(Clone)]
pub struct TokenProvider {
    http: reqwest::Client,
    metadata_endpoint: String,
    cache: Arc<Mutex<Option<CachedToken>>>,
}

impl Default for TokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Override the metadata endpoint (tests, emulators).
    pub fn with_metadata_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metadata_endpoint = endpoint.into();
        self
    }

    /// Resolve a bearer token from the environment or the metadata server.
    pub async fn token(&self) -> Result<String, AuthError> {
        if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
            if !token.is_empty() {
                debug!("Using access token from GOOGLE_ACCESS_TOKEN");
                return Ok(token);
            }
        }

        if let Some(cached) = self.cached_token() {
            return Ok(cached);
        }

        self.fetch_metadata_token().await
    }

    fn cached_token(&self) -> Option<String> {
        let cache = self.cache.lock().ok()?;
        match cache.as_ref() {
            Some(t) if t.expires_at > Instant::now() + EXPIRY_MARGIN => Some(t.value.clone()),
            _ => None,
        }
    }

    async fn fetch_metadata_token(&self) -> Result<String, AuthError> {
        let url = format!("{}{}", self.metadata_endpoint, TOKEN_PATH);
        debug!(url = %url, "Requesting access token from metadata server");

        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Metadata server unreachable and GOOGLE_ACCESS_TOKEN unset");
                AuthError::NoCredentials(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Metadata {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(CachedToken {
                value: parsed.access_token.clone(),
                expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
            });
        }

        debug!(expires_in = parsed.expires_in, "Fetched metadata token");
        Ok(parsed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // Nothing listens on this port, so the metadata path always fails fast.
    const UNREACHABLE_ENDPOINT: &str = "http://127.0.0.1:1";

    #[tokio::test]
    #[serial]
    async fn env_token_takes_precedence_over_the_metadata_server() {
        std::env::set_var("GOOGLE_ACCESS_TOKEN", "env-token");
        let provider = TokenProvider::new().with_metadata_endpoint(UNREACHABLE_ENDPOINT);

        let token = provider.token().await.expect("env token resolves");
        assert_eq!(token, "env-token");

        std::env::remove_var("GOOGLE_ACCESS_TOKEN");
    }

    #[tokio::test]
    #[serial]
    async fn no_sources_yield_a_typed_no_credentials_error() {
        std::env::remove_var("GOOGLE_ACCESS_TOKEN");
        let provider = TokenProvider::new().with_metadata_endpoint(UNREACHABLE_ENDPOINT);

        let err = provider.token().await.expect_err("no ambient credentials");
        assert!(matches!(err, AuthError::NoCredentials(_)));
    }

    #[tokio::test]
    #[serial]
    async fn empty_env_token_is_ignored() {
        std::env::set_var("GOOGLE_ACCESS_TOKEN", "");
        let provider = TokenProvider::new().with_metadata_endpoint(UNREACHABLE_ENDPOINT);

        let err = provider.token().await.expect_err("empty token is not a credential");
        assert!(matches!(err, AuthError::NoCredentials(_)));

        std::env::remove_var("GOOGLE_ACCESS_TOKEN");
    }

    #[tokio::test]
    async fn cached_token_is_reused_until_the_expiry_margin() {
        let provider = TokenProvider::new();
        if let Ok(mut cache) = provider.cache.lock() {
            *cache = Some(CachedToken {
                value: "cached".to_string(),
                expires_at: Instant::now() + Duration::from_secs(3600),
            });
        }
        assert_eq!(provider.cached_token().as_deref(), Some("cached"));

        if let Ok(mut cache) = provider.cache.lock() {
            *cache = Some(CachedToken {
                value: "stale".to_string(),
                expires_at: Instant::now() + Duration::from_secs(5),
            });
        }
        // Within the refresh margin the cached value must not be reused.
        assert_eq!(provider.cached_token(), None);
    }
}
