use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::Environment;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingSection,
    pub gcp: GcpSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_logger_name")]
    pub logger_name: String,
    /// `local` or `google`; unknown values fall back to `local`.
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_environment")]
    pub environment: Environment,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            logger_name: default_logger_name(),
            engine: default_engine(),
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GcpSection {
    pub project: String,
    /// Application name, used to derive unique bucket names.
    pub app_name: String,
    pub storage_endpoint: Option<String>,
    pub storage_upload_endpoint: Option<String>,
    pub logging_endpoint: Option<String>,
}

fn default_logger_name() -> String {
    "infra".to_string()
}

fn default_engine() -> String {
    "local".to_string()
}

fn default_environment() -> Environment {
    Environment::Dev
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            project = %self.gcp.project,
            app_name = %self.gcp.app_name,
            logger_name = %self.logging.logger_name,
            engine = %self.logging.engine,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}
