//! Engine dispatch for structured events: the "logging redirector".
//!
//! Callers build a [`LogEvent`] and hand it to the [`EventRouter`], which
//! either emits it locally through `tracing` or forwards it to a cloud
//! [`EventLogger`] backend, depending on the configured engine. Every event
//! is stamped with the router's invocation id so a whole process run can be
//! correlated in the backend.

use std::sync::Arc;

use uuid::Uuid;

use crate::contract::{Environment, EventLogger, LogEvent, LogSeverity, LoggingError};

/// Which backend receives dispatched events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEngine {
    /// Emit through the process-wide `tracing` subscriber.
    Local,
    /// Forward to Google Cloud Logging.
    Google,
}

impl From<&str> for LogEngine {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "local" => LogEngine::Local,
            "google" => LogEngine::Google,
            other => {
                tracing::warn!(
                    engine = other,
                    "Unknown log engine, defaulting to local. Known engines: local, google"
                );
                LogEngine::Local
            }
        }
    }
}

/// Routes structured events to the configured engine.
#[derive(Clone)]
pub struct EventRouter {
    logger_name: String,
    environment: Environment,
    engine: LogEngine,
    google: Option<Arc<dyn EventLogger>>,
    invocation_id: Uuid,
}

impl EventRouter {
    pub fn new(
        logger_name: impl Into<String>,
        environment: Environment,
        engine: LogEngine,
        google: Option<Arc<dyn EventLogger>>,
    ) -> Self {
        Self {
            logger_name: logger_name.into(),
            environment,
            engine,
            google,
            invocation_id: Uuid::new_v4(),
        }
    }

    /// Local-only router, no cloud client required.
    pub fn local(logger_name: impl Into<String>, environment: Environment) -> Self {
        Self::new(logger_name, environment, LogEngine::Local, None)
    }

    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    /// Dispatch an event to the configured engine, surfacing backend errors.
    pub async fn dispatch(&self, event: LogEvent) -> Result<(), LoggingError> {
        let event = self.stamp(event);

        match self.engine {
            LogEngine::Google => match &self.google {
                Some(client) => client.log_event(&self.logger_name, event).await,
                None => {
                    tracing::warn!(
                        "Google log engine selected but no cloud client configured, emitting locally"
                    );
                    self.emit_local(&event);
                    Ok(())
                }
            },
            LogEngine::Local => {
                self.emit_local(&event);
                Ok(())
            }
        }
    }

    /// Dispatch an event, tracing (but swallowing) backend failures. Used by
    /// the storage facades: an audit-log failure must not fail the operation
    /// it describes.
    pub async fn emit(&self, event: LogEvent) {
        if let Err(e) = self.dispatch(event).await {
            tracing::error!(error = %e, "Failed to ship event to log backend");
        }
    }

    /// Fill in the default environment and stamp the invocation id.
    fn stamp(&self, mut event: LogEvent) -> LogEvent {
        if event.environment.is_none() {
            event.environment = Some(self.environment);
        }
        event
            .labels
            .insert("invocationId".to_string(), self.invocation_id.to_string().into());
        event
    }

    fn emit_local(&self, event: &LogEvent) {
        let payload = serde_json::Value::Object(event.to_payload()).to_string();
        match event.severity {
            LogSeverity::Debug => {
                tracing::debug!(logger = %self.logger_name, event = %event.name, payload = %payload)
            }
            LogSeverity::Info => {
                tracing::info!(logger = %self.logger_name, event = %event.name, payload = %payload)
            }
            LogSeverity::Warning => {
                tracing::warn!(logger = %self.logger_name, event = %event.name, payload = %payload)
            }
            LogSeverity::Error | LogSeverity::Critical => {
                tracing::error!(logger = %self.logger_name, event = %event.name, payload = %payload)
            }
        }
    }
}
