//! # contract: trait seams and shared types for the cloud facades
//!
//! This module defines the two traits the rest of the crate is written
//! against — [`EventLogger`] for structured event logging and
//! [`ObjectStore`] for bucket/object management — together with the plain
//! data types that cross those seams.
//!
//! ## Interface & Extensibility
//! - Implement [`EventLogger`] to ship events to a new logging backend.
//! - Implement [`ObjectStore`] to target a new storage backend.
//! - All methods are async and return typed errors ([`LoggingError`],
//!   [`StoreError`]).
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`, so consumers can generate
//!   deterministic mocks for unit/integration tests (exported behind the
//!   `test-export-mocks` feature, like the rest of the crate's mocks).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::auth::AuthError;

/// Severity of a logged event, mirroring the Cloud Logging severity ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogSeverity {
    /// Wire name as Cloud Logging expects it (`DEBUG`, `INFO`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO",
            LogSeverity::Warning => "WARNING",
            LogSeverity::Error => "ERROR",
            LogSeverity::Critical => "CRITICAL",
        }
    }
}

impl From<&str> for LogSeverity {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "debug" => LogSeverity::Debug,
            "info" => LogSeverity::Info,
            "warning" | "warn" => LogSeverity::Warning,
            "error" => LogSeverity::Error,
            "critical" => LogSeverity::Critical,
            other => {
                tracing::warn!(severity = other, "Unknown log severity, defaulting to INFO");
                LogSeverity::Info
            }
        }
    }
}

/// Deployment environment a logged event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Production,
    Infra,
}

impl Environment {
    /// Lower-cased name used in the event payload `env` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Infra => "infra",
        }
    }
}

/// Storage class for newly created buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    Standard,
    Nearline,
    Coldline,
    Archive,
}

impl StorageClass {
    /// Upper-cased name as the storage API expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::Nearline => "NEARLINE",
            StorageClass::Coldline => "COLDLINE",
            StorageClass::Archive => "ARCHIVE",
        }
    }
}

impl From<&str> for StorageClass {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "standard" => StorageClass::Standard,
            "nearline" => StorageClass::Nearline,
            "coldline" => StorageClass::Coldline,
            "archive" => StorageClass::Archive,
            other => {
                tracing::warn!(
                    storage_class = other,
                    "Unknown storage class, defaulting to STANDARD"
                );
                StorageClass::Standard
            }
        }
    }
}

/// A structured event to log: a named message with optional description,
/// environment, severity and free-form extra labels.
///
/// The payload shipped to the backend is
/// `{message, name, description, env, ...labels}`; the four reserved keys
/// always win over labels of the same name.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub name: String,
    pub message: String,
    pub description: Option<String>,
    /// Filled in from the router default when left unset.
    pub environment: Option<Environment>,
    pub severity: LogSeverity,
    pub labels: Map<String, Value>,
}

impl LogEvent {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            description: None,
            environment: None,
            severity: LogSeverity::Info,
            labels: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_severity(mut self, severity: LogSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Build the JSON payload for this event. Reserved keys (`message`,
    /// `name`, `description`, `env`) overwrite any label with the same name.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = self.labels.clone();
        payload.insert("message".to_string(), Value::from(self.message.clone()));
        payload.insert("name".to_string(), Value::from(self.name.clone()));
        payload.insert(
            "description".to_string(),
            match &self.description {
                Some(d) => Value::from(d.clone()),
                None => Value::Null,
            },
        );
        if let Some(env) = self.environment {
            payload.insert("env".to_string(), Value::from(env.as_str()));
        }
        payload
    }
}

/// Minimum data needed to create a bucket.
pub struct NewBucket<'a> {
    /// Short bucket name; the unique on-the-wire name is derived from it
    /// together with the application name.
    pub name: &'a str,
    pub storage_class: StorageClass,
}

/// A created/returned bucket.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub name: String,
    pub storage_class: String,
    pub location: Option<String>,
}

/// Minimum data needed to upload an object (an "artifact": any file, any size).
pub struct NewObject<'a> {
    pub bucket: &'a str,
    /// Object name inside the bucket; may be directory-like (`my/gcp/object`)
    /// or file-like (`my_object`).
    pub name: &'a str,
    /// Local file to read the contents from.
    pub file_path: &'a Path,
    /// Caller metadata stored on the object.
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Reference to a stored object, optionally pinned to a generation.
pub struct ObjectRef<'a> {
    pub bucket: &'a str,
    pub name: &'a str,
    pub generation: Option<i64>,
}

/// A stored object as returned by the backend.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredObject {
    pub bucket: String,
    pub name: String,
    pub generation: i64,
    pub size: u64,
    /// SHA-256 of the uploaded content when known (set on upload).
    pub content_hash: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub updated: Option<String>,
}

/// Error type for [`EventLogger`] implementations.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("logging request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("logging API returned {status}: {body}")]
    Unexpected { status: u16, body: String },
}

/// Error type for [`ObjectStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("invalid bucket name: {0}")]
    InvalidName(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed storage response: {0}")]
    Malformed(String),
    #[error("storage API returned {status}: {body}")]
    Unexpected { status: u16, body: String },
}

/// Trait for shipping structured events to a logging backend and managing
/// its logs. Implemented by the real Cloud Logging client and by test mocks.
///
/// The trait is `Send` + `Sync` and intended for async/await usage.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait EventLogger: Send + Sync {
    /// Log a single structured event under the given log id.
    async fn log_event<'a>(&self, log_id: &'a str, event: LogEvent) -> Result<(), LoggingError>;

    /// Delete all entries of the given log id.
    async fn delete_logs<'a>(&self, log_id: &'a str) -> Result<(), LoggingError>;
}

/// Trait for bucket and object management against a storage backend.
/// The implementor is responsible for transport, auth and serialization.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a new bucket.
    async fn create_bucket<'a>(&self, req: NewBucket<'a>) -> Result<Bucket, StoreError>;

    /// Upload a local file as an object, attaching caller metadata.
    async fn upload_object<'a>(&self, req: NewObject<'a>) -> Result<StoredObject, StoreError>;

    /// Download an object to the given local file path, honouring an
    /// optional generation pin. Returns the path written.
    async fn download_object<'a>(
        &self,
        obj: ObjectRef<'a>,
        dest: &'a Path,
    ) -> Result<PathBuf, StoreError>;

    /// Fetch a single object's metadata.
    async fn get_object<'a>(&self, obj: ObjectRef<'a>) -> Result<StoredObject, StoreError>;

    /// List objects in a bucket, optionally under a prefix. When not
    /// recursive, only the top level below the prefix is returned.
    async fn list_objects<'a>(
        &self,
        bucket: &'a str,
        prefix: Option<&'a str>,
        recursive: bool,
    ) -> Result<Vec<StoredObject>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_wire_names_match_cloud_logging() {
        assert_eq!(LogSeverity::Debug.as_str(), "DEBUG");
        assert_eq!(LogSeverity::Critical.as_str(), "CRITICAL");
        assert_eq!(LogSeverity::from("warn"), LogSeverity::Warning);
        // Unknown names fall back to INFO rather than failing.
        assert_eq!(LogSeverity::from("verbose"), LogSeverity::Info);
    }

    #[test]
    fn storage_class_parses_and_defaults() {
        assert_eq!(StorageClass::from("coldline"), StorageClass::Coldline);
        assert_eq!(StorageClass::from("bogus"), StorageClass::Standard);
        assert_eq!(StorageClass::Nearline.as_str(), "NEARLINE");
    }

    #[test]
    fn payload_reserved_keys_win_over_labels() {
        let event = LogEvent::new("Bucket Created", "A new bucket was created")
            .with_environment(Environment::Infra)
            .with_label("message", "spoofed")
            .with_label("bucketName", "my-bucket");
        let payload = event.to_payload();
        assert_eq!(payload["message"], "A new bucket was created");
        assert_eq!(payload["name"], "Bucket Created");
        assert_eq!(payload["env"], "infra");
        assert_eq!(payload["bucketName"], "my-bucket");
        // Description is present even when unset, as an explicit null.
        assert!(payload["description"].is_null());
    }
}
