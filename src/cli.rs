/// # cloud-infra CLI Interface (Module)
///
/// This module implements the full CLI for cloud-infra: command parsing,
/// argument validation and the async entrypoint. Each subcommand maps 1:1
/// to a facade operation; business logic lives in the `gcs`, `gcl`,
/// `logging` and `extensions` modules.
///
/// ## How To Use
/// - For command-line users: use the installed `cloud-infra` binary with
///   `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed
///   [`Cli`].
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::auth::TokenProvider;
use crate::contract::{EventLogger, LogEvent, LogSeverity, ObjectRef, ObjectStore, StorageClass};
use crate::gcl::CloudLoggingClient;
use crate::gcs::{self, CloudStorageClient};
use crate::load_config::load_config;
use crate::logging::{EventRouter, LogEngine};

/// CLI for cloud-infra: manage buckets, artifacts and structured logs on
/// Google Cloud.
#[derive(Parser)]
#[clap(
    name = "cloud-infra",
    version,
    about = "Facade CLI for Google Cloud Logging and Google Cloud Storage"
)]
pub struct Cli {
    /// Path to the YAML config file
    #[clap(long, global = true, default_value = "cloud-infra.yaml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a bucket named after the configured application
    CreateBucket {
        /// Short bucket name; the created bucket is `<app_name>_<name>`
        name: String,
        /// Storage class: standard, nearline, coldline or archive
        #[clap(long, default_value = "standard")]
        storage_class: String,
    },
    /// Upload a local file as an artifact
    Upload {
        bucket: String,
        /// Object name inside the bucket (may be directory-like)
        object: String,
        /// Local file to upload
        file: PathBuf,
        /// Object metadata as key=value pairs (repeatable)
        #[clap(long = "meta")]
        metadata: Vec<String>,
    },
    /// Download a single artifact
    Download {
        bucket: String,
        object: String,
        /// Local directory that will contain the artifact
        dest_dir: PathBuf,
        /// Local file name; defaults to the last segment of the object name
        #[clap(long)]
        dest_file: Option<String>,
        /// Pin the download to an object generation
        #[clap(long)]
        generation: Option<i64>,
    },
    /// Download a batch of artifacts under an optional prefix
    DownloadBunch {
        bucket: String,
        /// Local directory that will contain the artifacts
        dest_dir: PathBuf,
        /// Only download objects under this prefix
        #[clap(long)]
        prefix: Option<String>,
        /// Also descend into subfolders of the prefix
        #[clap(long)]
        recursive: bool,
        /// Download concurrently; use for large batches
        #[clap(long)]
        parallel: bool,
    },
    /// Show the stored metadata of a single artifact
    Stat {
        bucket: String,
        object: String,
        /// Inspect a specific object generation
        #[clap(long)]
        generation: Option<i64>,
    },
    /// Log a structured event through the configured engine
    Log {
        /// Event name
        name: String,
        /// Event message
        message: String,
        #[clap(long)]
        description: Option<String>,
        /// debug, info, warning, error or critical
        #[clap(long, default_value = "info")]
        severity: String,
    },
    /// Delete all entries of a log
    DeleteLogs {
        /// Log id to delete
        log_name: String,
    },
}

/// Parse repeated `key=value` metadata flags into a map.
fn parse_metadata(pairs: &[String]) -> Result<Option<BTreeMap<String, String>>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut metadata = BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) => {
                metadata.insert(key.to_string(), value.to_string());
            }
            None => bail!("Invalid metadata pair {pair:?}, expected key=value"),
        }
    }
    Ok(Some(metadata))
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let config = load_config(&cli.config)?;
    config.trace_loaded();

    let tokens = TokenProvider::new();

    let mut logging_client = CloudLoggingClient::new(&config.gcp.project, tokens.clone());
    if let Some(endpoint) = &config.gcp.logging_endpoint {
        logging_client = logging_client.with_endpoint(endpoint);
    }

    let mut storage = CloudStorageClient::new(&config.gcp.project, tokens);
    if let Some(endpoint) = &config.gcp.storage_endpoint {
        storage = storage.with_endpoint(endpoint);
    }
    if let Some(endpoint) = &config.gcp.storage_upload_endpoint {
        storage = storage.with_upload_endpoint(endpoint);
    }

    let router = EventRouter::new(
        &config.logging.logger_name,
        config.logging.environment,
        LogEngine::from(config.logging.engine.as_str()),
        Some(Arc::new(logging_client.clone())),
    );

    match cli.command {
        Commands::CreateBucket {
            name,
            storage_class,
        } => {
            let created = gcs::create_bucket(
                &storage,
                &router,
                &name,
                &config.gcp.app_name,
                StorageClass::from(storage_class.as_str()),
            )
            .await?;
            if !created {
                bail!("Bucket {name:?} already exists");
            }
            tracing::info!(command = "create-bucket", bucket = %name, "Bucket created");
            Ok(())
        }
        Commands::Upload {
            bucket,
            object,
            file,
            metadata,
        } => {
            let metadata = parse_metadata(&metadata)?;
            let uploaded =
                gcs::save_artifact(&storage, &router, &bucket, &object, &file, metadata).await?;
            if !uploaded {
                bail!("Upload of {object:?} to bucket {bucket:?} failed; see logged events");
            }
            tracing::info!(command = "upload", bucket = %bucket, object = %object, "Artifact uploaded");
            Ok(())
        }
        Commands::Download {
            bucket,
            object,
            dest_dir,
            dest_file,
            generation,
        } => {
            let dest_file = dest_file.unwrap_or_else(|| {
                object
                    .rsplit('/')
                    .next()
                    .unwrap_or(object.as_str())
                    .to_string()
            });
            let downloaded = gcs::download_artifact(
                &storage,
                &router,
                &bucket,
                &object,
                generation,
                &dest_dir,
                &dest_file,
            )
            .await?;
            if !downloaded {
                bail!("Download of {object:?} from bucket {bucket:?} failed; see logged events");
            }
            tracing::info!(command = "download", bucket = %bucket, object = %object, "Artifact downloaded");
            Ok(())
        }
        Commands::DownloadBunch {
            bucket,
            dest_dir,
            prefix,
            recursive,
            parallel,
        } => {
            let downloaded = gcs::download_artifacts_bunch(
                &storage,
                &router,
                &bucket,
                &dest_dir,
                prefix.as_deref(),
                recursive,
                parallel,
            )
            .await?;
            if !downloaded {
                bail!("Batch download from bucket {bucket:?} failed; see logged events");
            }
            tracing::info!(command = "download-bunch", bucket = %bucket, "Artifacts downloaded");
            Ok(())
        }
        Commands::Stat {
            bucket,
            object,
            generation,
        } => {
            let info = storage
                .get_object(ObjectRef {
                    bucket: &bucket,
                    name: &object,
                    generation,
                })
                .await?;
            tracing::info!(
                command = "stat",
                bucket = %info.bucket,
                object = %info.name,
                generation = info.generation,
                size = info.size,
                content_hash = info.content_hash.as_deref().unwrap_or("-"),
                updated = info.updated.as_deref().unwrap_or("-"),
                "Fetched object metadata"
            );
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Commands::Log {
            name,
            message,
            description,
            severity,
        } => {
            let mut event =
                LogEvent::new(name, message).with_severity(LogSeverity::from(severity.as_str()));
            if let Some(description) = description {
                event = event.with_description(description);
            }
            router
                .dispatch(event)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to log event: {e}"))?;
            Ok(())
        }
        Commands::DeleteLogs { log_name } => {
            logging_client
                .delete_logs(&log_name)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to delete log {log_name:?}: {e}"))?;
            tracing::info!(command = "delete-logs", log = %log_name, "Log deleted");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_pairs_parse_into_a_map() {
        let pairs = vec!["owner=dsg".to_string(), "stage=raw".to_string()];
        let parsed = parse_metadata(&pairs).expect("valid pairs").expect("some map");
        assert_eq!(parsed["owner"], "dsg");
        assert_eq!(parsed["stage"], "raw");
    }

    #[test]
    fn metadata_without_equals_is_rejected() {
        let pairs = vec!["broken".to_string()];
        assert!(parse_metadata(&pairs).is_err());
    }

    #[test]
    fn no_metadata_flags_yield_none() {
        assert!(parse_metadata(&[]).expect("ok").is_none());
    }
}
