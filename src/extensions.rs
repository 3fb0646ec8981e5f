//! Extension helpers built on top of the basic facades.
//!
//! Currently: serialise an in-memory value to a JSON artifact in a
//! temporary directory and upload it through [`save_artifact`], cleaning
//! the temporary directory up afterwards. Cleanup failure is a warning
//! event, never an error.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::contract::{Environment, LogEvent, LogSeverity, ObjectStore, StoreError};
use crate::gcs::save_artifact;
use crate::logging::EventRouter;

/// Serialise `value` as pretty JSON and upload it as
/// `<object_name>.json` in the given bucket. Returns the same boolean
/// contract as [`save_artifact`].
pub async fn upload_json_artifact<S, T>(
    store: &S,
    router: &EventRouter,
    bucket_name: &str,
    object_name: &str,
    value: &T,
    metadata: Option<BTreeMap<String, String>>,
) -> Result<bool, StoreError>
where
    S: ObjectStore + ?Sized,
    T: Serialize,
{
    let base = |name: &str, message: &str| {
        LogEvent::new(name, message)
            .with_environment(Environment::Infra)
            .with_label("funcName", "upload_json_artifact")
            .with_label("eventGroup", "Google Cloud Storage")
    };

    let temp_dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            router
                .emit(
                    base("Directory Creation Error", "Could not create the temporary directory")
                        .with_description(e.to_string())
                        .with_severity(LogSeverity::Error),
                )
                .await;
            return Ok(false);
        }
    };

    // Directory-like object names must not escape the temp dir.
    let file_name = format!("{}.json", object_name.replace('/', "_"));
    let file_path = temp_dir.path().join(&file_name);

    let serialised = match serde_json::to_vec_pretty(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            router
                .emit(
                    base("File Creation Error", "Could not serialise the value to JSON.")
                        .with_description(e.to_string())
                        .with_severity(LogSeverity::Error)
                        .with_label("localFilePath", file_path.display().to_string()),
                )
                .await;
            return Ok(false);
        }
    };
    if let Err(e) = std::fs::write(&file_path, serialised) {
        router
            .emit(
                base("File Creation Error", "Could not create the JSON file.")
                    .with_description(e.to_string())
                    .with_severity(LogSeverity::Error)
                    .with_label("localFilePath", file_path.display().to_string()),
            )
            .await;
        return Ok(false);
    }

    let object_name_json = format!("{object_name}.json");
    let result = save_artifact(
        store,
        router,
        bucket_name,
        &object_name_json,
        &file_path,
        metadata,
    )
    .await;

    let temp_path = temp_dir.path().display().to_string();
    if let Err(e) = temp_dir.close() {
        router
            .emit(
                base("Directory Deletion Error", "Could not delete the temporary folder.")
                    .with_description(e.to_string())
                    .with_severity(LogSeverity::Warning)
                    .with_label("localDirectoryPath", temp_path),
            )
            .await;
    } else {
        debug!("Removed temporary artifact directory");
    }

    result
}
