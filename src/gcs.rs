//! Google Cloud Storage client and logged artifact facades.
//!
//! Two layers live here:
//! - [`CloudStorageClient`]: implements [`ObjectStore`] against the Cloud
//!   Storage JSON API (bucket creation, media upload with a metadata patch,
//!   download by optional generation, paginated listing).
//! - The facade functions ([`create_bucket`], [`save_artifact`],
//!   [`download_artifact`], [`download_artifacts_bunch`]): generic over any
//!   [`ObjectStore`], they log a structured audit event per operation
//!   through an [`EventRouter`] and report success as a boolean, reserving
//!   `Err` for credential and caller mistakes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use percent_encoding::utf8_percent_encode;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::auth::TokenProvider;
use crate::contract::{
    Bucket, Environment, LogEvent, LogSeverity, NewBucket, NewObject, ObjectRef, ObjectStore,
    StorageClass, StoreError, StoredObject,
};
use crate::gcl::SEGMENT;
use crate::logging::EventRouter;

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com/storage/v1";
const DEFAULT_UPLOAD_ENDPOINT: &str = "https://storage.googleapis.com/upload/storage/v1";

/// Concurrent downloads used by the batch facade when parallelism is on.
const PARALLEL_DOWNLOADS: usize = 8;

const EVENT_GROUP: &str = "Google Cloud Storage";

/// Derive the unique on-the-wire bucket name from the application name and
/// the short bucket name, validating it against the bucket naming rules
/// (3-63 characters; lowercase letters, digits, `-`, `_` and `.`).
pub fn unique_bucket_name(app_name: &str, bucket_name: &str) -> Result<String, StoreError> {
    static NAME_RULES: OnceLock<Regex> = OnceLock::new();
    let rules = NAME_RULES.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9._-]{1,61}[a-z0-9]$").expect("bucket name regex is valid")
    });

    let unique = format!(
        "{}_{}",
        app_name.to_ascii_lowercase(),
        bucket_name.to_ascii_lowercase()
    );
    if !rules.is_match(&unique) {
        return Err(StoreError::InvalidName(unique));
    }
    Ok(unique)
}

// ---------------------------------------------------------------------------
// JSON API client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiBucket {
    name: String,
    #[serde(rename = "storageClass", default)]
    storage_class: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiObject {
    bucket: String,
    name: String,
    generation: String,
    #[serde(default)]
    size: Option<String>,
    metadata: Option<BTreeMap<String, String>>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
    #[serde(default)]
    items: Vec<ApiObject>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

impl ApiObject {
    fn into_stored(self) -> Result<StoredObject, StoreError> {
        let generation = self
            .generation
            .parse::<i64>()
            .map_err(|_| StoreError::Malformed(format!("generation: {}", self.generation)))?;
        let size = match &self.size {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| StoreError::Malformed(format!("size: {raw}")))?,
            None => 0,
        };
        let content_hash = self
            .metadata
            .as_ref()
            .and_then(|m| m.get("contentSha256").cloned());
        Ok(StoredObject {
            bucket: self.bucket,
            name: self.name,
            generation,
            size,
            content_hash,
            metadata: self.metadata,
            updated: self.updated,
        })
    }
}

/// Client for the Cloud Storage JSON API.
#[derive(Clone)]
pub struct CloudStorageClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    project: String,
    endpoint: String,
    upload_endpoint: String,
}

impl CloudStorageClient {
    pub fn new(project: impl Into<String>, tokens: TokenProvider) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            project: project.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            upload_endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
        }
    }

    /// Override the metadata/download endpoint (tests, emulators such as
    /// fake-gcs-server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the media upload endpoint.
    pub fn with_upload_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.upload_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn object_url(&self, bucket: &str, object: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            self.endpoint,
            bucket,
            utf8_percent_encode(object, SEGMENT)
        )
    }

    /// Map an error response to a typed error, consuming the body.
    async fn fail(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        match status {
            404 => StoreError::NotFound(body),
            409 => StoreError::Conflict(body),
            _ => StoreError::Unexpected { status, body },
        }
    }
}

#[async_trait]
impl ObjectStore for CloudStorageClient {
    async fn create_bucket<'a>(&self, req: NewBucket<'a>) -> Result<Bucket, StoreError> {
        let token = self.tokens.token().await?;
        debug!(bucket = req.name, storage_class = req.storage_class.as_str(), "Creating bucket");

        let response = self
            .http
            .post(format!("{}/b", self.endpoint))
            .query(&[("project", self.project.as_str())])
            .bearer_auth(token)
            .json(&json!({
                "name": req.name,
                "storageClass": req.storage_class.as_str(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }

        let bucket: ApiBucket = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(Bucket {
            name: bucket.name,
            storage_class: bucket.storage_class,
            location: bucket.location,
        })
    }

    async fn upload_object<'a>(&self, req: NewObject<'a>) -> Result<StoredObject, StoreError> {
        let content = std::fs::read(req.file_path)?;
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(&content);
            format!("{:x}", hasher.finalize())
        };

        debug!(
            bucket = req.bucket,
            object = req.name,
            bytes = content.len(),
            "Uploading object"
        );

        let token = self.tokens.token().await?;
        let response = self
            .http
            .post(format!("{}/b/{}/o", self.upload_endpoint, req.bucket))
            .query(&[("uploadType", "media"), ("name", req.name)])
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let uploaded: ApiObject = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        // Attach caller metadata plus the content hash in a follow-up patch.
        let mut metadata = req.metadata.unwrap_or_default();
        metadata.insert("contentSha256".to_string(), content_hash.clone());

        let response = self
            .http
            .patch(self.object_url(req.bucket, &uploaded.name))
            .bearer_auth(&token)
            .json(&json!({ "metadata": metadata }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let patched: ApiObject = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let mut stored = patched.into_stored()?;
        stored.content_hash = Some(content_hash);
        Ok(stored)
    }

    async fn download_object<'a>(
        &self,
        obj: ObjectRef<'a>,
        dest: &'a Path,
    ) -> Result<PathBuf, StoreError> {
        let token = self.tokens.token().await?;
        let mut request = self
            .http
            .get(self.object_url(obj.bucket, obj.name))
            .query(&[("alt", "media")])
            .bearer_auth(token);
        if let Some(generation) = obj.generation {
            request = request.query(&[("generation", generation.to_string())]);
        }

        debug!(
            bucket = obj.bucket,
            object = obj.name,
            generation = obj.generation,
            dest = %dest.display(),
            "Downloading object"
        );

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &bytes)?;
        Ok(dest.to_path_buf())
    }

    async fn get_object<'a>(&self, obj: ObjectRef<'a>) -> Result<StoredObject, StoreError> {
        let token = self.tokens.token().await?;
        let mut request = self.http.get(self.object_url(obj.bucket, obj.name)).bearer_auth(token);
        if let Some(generation) = obj.generation {
            request = request.query(&[("generation", generation.to_string())]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        let object: ApiObject = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        object.into_stored()
    }

    async fn list_objects<'a>(
        &self,
        bucket: &'a str,
        prefix: Option<&'a str>,
        recursive: bool,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let token = self.tokens.token().await?;
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/b/{}/o", self.endpoint, bucket))
                .bearer_auth(&token);
            if let Some(prefix) = prefix {
                request = request.query(&[("prefix", prefix)]);
            }
            if !recursive {
                request = request.query(&[("delimiter", "/")]);
            }
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(Self::fail(response).await);
            }
            let page: ListObjectsResponse = response
                .json()
                .await
                .map_err(|e| StoreError::Malformed(e.to_string()))?;

            for item in page.items {
                objects.push(item.into_stored()?);
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(bucket, count = objects.len(), "Listed objects");
        Ok(objects)
    }
}

// ---------------------------------------------------------------------------
// Logged facades
// ---------------------------------------------------------------------------

/// Create a bucket named `app_name` + `_` + `bucket_name`, logging the
/// outcome. Returns `Ok(true)` if the bucket was created, `Ok(false)` if a
/// bucket with that name already exists; other failures are logged and
/// propagated.
pub async fn create_bucket<S>(
    store: &S,
    router: &EventRouter,
    bucket_name: &str,
    app_name: &str,
    storage_class: StorageClass,
) -> Result<bool, StoreError>
where
    S: ObjectStore + ?Sized,
{
    let unique_name = unique_bucket_name(app_name, bucket_name)?;
    let base = |name: &str, message: &str| {
        LogEvent::new(name, message)
            .with_environment(Environment::Infra)
            .with_label("bucketName", unique_name.clone())
            .with_label("funcName", "create_bucket")
            .with_label("eventGroup", EVENT_GROUP)
    };

    match store
        .create_bucket(NewBucket {
            name: &unique_name,
            storage_class,
        })
        .await
    {
        Ok(bucket) => {
            info!(bucket = %bucket.name, "Bucket created");
            router
                .emit(
                    base("Bucket Created", "A new bucket was created")
                        .with_label("storageClass", storage_class.as_str().to_lowercase()),
                )
                .await;
            Ok(true)
        }
        Err(StoreError::Conflict(detail)) => {
            router
                .emit(base("Bucket Error", &detail).with_severity(LogSeverity::Error))
                .await;
            Ok(false)
        }
        Err(e) => {
            router
                .emit(
                    base("Bucket Error", "Could not create the bucket")
                        .with_description(e.to_string())
                        .with_severity(LogSeverity::Error),
                )
                .await;
            Err(e)
        }
    }
}

/// Upload a local file as an artifact, logging the outcome. An "artifact"
/// can be any type of file in any size, each with its own metadata.
/// Returns `Ok(true)` on success; recognised failures (missing bucket,
/// missing local file, storage-side errors) are logged and reported as
/// `Ok(false)`, mirroring the audit-first facade contract. Credential
/// errors propagate.
pub async fn save_artifact<S>(
    store: &S,
    router: &EventRouter,
    bucket_name: &str,
    object_name: &str,
    file_path: &Path,
    metadata: Option<BTreeMap<String, String>>,
) -> Result<bool, StoreError>
where
    S: ObjectStore + ?Sized,
{
    let base = |name: &str, message: &str| {
        LogEvent::new(name, message)
            .with_environment(Environment::Infra)
            .with_label("funcName", "save_artifact")
            .with_label("eventGroup", EVENT_GROUP)
    };

    match store
        .upload_object(NewObject {
            bucket: bucket_name,
            name: object_name,
            file_path,
            metadata,
        })
        .await
    {
        Ok(object) => {
            info!(bucket = bucket_name, object = object_name, "Artifact uploaded");
            router
                .emit(
                    base("Artifact Upload", "Artifact uploading completed successfully.")
                        .with_label("bucketName", bucket_name)
                        .with_label("objectName", object_name)
                        .with_label(
                            "contentHash",
                            object.content_hash.clone().unwrap_or_default(),
                        ),
                )
                .await;
            Ok(true)
        }
        Err(StoreError::NotFound(detail)) => {
            router
                .emit(
                    base("Artifact Uploading Error", "The requested bucket was not found.")
                        .with_description(detail)
                        .with_severity(LogSeverity::Warning)
                        .with_label("bucketName", bucket_name),
                )
                .await;
            Ok(false)
        }
        Err(StoreError::Io(e)) => {
            router
                .emit(
                    base("Artifact Uploading Error", &e.to_string())
                        .with_severity(LogSeverity::Warning)
                        .with_label("filePath", file_path.display().to_string()),
                )
                .await;
            Ok(false)
        }
        Err(e @ (StoreError::Auth(_) | StoreError::InvalidName(_))) => Err(e),
        Err(e) => {
            router
                .emit(
                    base(
                        "Artifact Uploading Error",
                        "An error occurred while trying to upload the file.",
                    )
                    .with_description(e.to_string())
                    .with_severity(LogSeverity::Error)
                    .with_label("objectName", object_name),
                )
                .await;
            Ok(false)
        }
    }
}

/// Download an object (optionally a specific generation) into
/// `dest_dir/dest_file_name`, logging the outcome.
pub async fn download_artifact<S>(
    store: &S,
    router: &EventRouter,
    bucket_name: &str,
    object_name: &str,
    generation: Option<i64>,
    dest_dir: &Path,
    dest_file_name: &str,
) -> Result<bool, StoreError>
where
    S: ObjectStore + ?Sized,
{
    let dest_full_path = dest_dir.join(dest_file_name);
    let base = |name: &str, message: &str| {
        LogEvent::new(name, message)
            .with_environment(Environment::Infra)
            .with_label("funcName", "download_artifact")
            .with_label("eventGroup", EVENT_GROUP)
    };

    match store
        .download_object(
            ObjectRef {
                bucket: bucket_name,
                name: object_name,
                generation,
            },
            &dest_full_path,
        )
        .await
    {
        Ok(path) => {
            info!(bucket = bucket_name, object = object_name, dest = %path.display(), "Artifact downloaded");
            router
                .emit(
                    base("Artifact Download", "Artifact downloading completed successfully.")
                        .with_label("objectName", object_name)
                        .with_label("bucketName", bucket_name)
                        .with_label("objectGeneration", generation)
                        .with_label("localFileLocation", path.display().to_string()),
                )
                .await;
            Ok(true)
        }
        Err(StoreError::NotFound(detail)) => {
            router
                .emit(
                    base("Artifact Downloading Error", "The requested object does not exist.")
                        .with_description(detail)
                        .with_severity(LogSeverity::Warning)
                        .with_label("objectName", object_name),
                )
                .await;
            Ok(false)
        }
        Err(e @ StoreError::Auth(_)) => Err(e),
        Err(e) => {
            router
                .emit(
                    base("Artifact Downloading Error", "Could not download the artifact.")
                        .with_description(e.to_string())
                        .with_severity(LogSeverity::Error),
                )
                .await;
            Ok(false)
        }
    }
}

/// Download a batch of artifacts under an optional prefix into a local
/// directory, sequentially by default or concurrently when `parallel` is
/// set. Object names keep their directory structure below `local_dir`.
pub async fn download_artifacts_bunch<S>(
    store: &S,
    router: &EventRouter,
    bucket_name: &str,
    local_dir: &Path,
    prefix: Option<&str>,
    recursive: bool,
    parallel: bool,
) -> Result<bool, StoreError>
where
    S: ObjectStore + ?Sized + Sync,
{
    let base = |name: &str, message: &str| {
        LogEvent::new(name, message)
            .with_environment(Environment::Infra)
            .with_label("funcName", "download_artifacts_bunch")
            .with_label("eventGroup", EVENT_GROUP)
            .with_label("bucketName", bucket_name)
            .with_label("dataCloudLocation", prefix)
            .with_label("isRecursiveDownload", recursive)
            .with_label("isParallelDownload", parallel)
    };

    if let Err(e) = std::fs::create_dir_all(local_dir) {
        router
            .emit(
                base("Directory Creation Error", "Could not create the destination directory")
                    .with_description(e.to_string())
                    .with_severity(LogSeverity::Error)
                    .with_label("localDirectoryPath", local_dir.display().to_string()),
            )
            .await;
        return Ok(false);
    }

    let objects = match store.list_objects(bucket_name, prefix, recursive).await {
        Ok(objects) => objects,
        Err(e @ StoreError::Auth(_)) => return Err(e),
        Err(e) => {
            router
                .emit(
                    base(
                        "Artifacts Downloading Error",
                        "An unexpected error occurred while trying to download the artifacts.",
                    )
                    .with_description(e.to_string())
                    .with_severity(LogSeverity::Error),
                )
                .await;
            return Ok(false);
        }
    };

    // Folder placeholder objects carry no content.
    let downloads = objects
        .iter()
        .filter(|o| !o.name.ends_with('/'))
        .map(|object| {
            let dest = local_dir.join(&object.name);
            async move {
                store
                    .download_object(
                        ObjectRef {
                            bucket: bucket_name,
                            name: &object.name,
                            generation: None,
                        },
                        &dest,
                    )
                    .await
            }
        });

    let result: Result<Vec<PathBuf>, StoreError> = if parallel {
        stream::iter(downloads)
            .buffer_unordered(PARALLEL_DOWNLOADS)
            .try_collect()
            .await
    } else {
        let mut paths = Vec::new();
        let mut failure = None;
        for download in downloads {
            match download.await {
                Ok(path) => paths.push(path),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(paths),
        }
    };

    match result {
        Ok(paths) => {
            info!(
                bucket = bucket_name,
                count = paths.len(),
                dir = %local_dir.display(),
                "Artifact batch downloaded"
            );
            router
                .emit(
                    base("Artifacts Bunch Download", "Artifacts downloading completed successfully.")
                        .with_label("localDirectoryPath", local_dir.display().to_string())
                        .with_label("artifactCount", paths.len()),
                )
                .await;
            Ok(true)
        }
        Err(e @ StoreError::Auth(_)) => Err(e),
        Err(e) => {
            router
                .emit(
                    base(
                        "Artifacts Downloading Error",
                        "An unexpected error occurred while trying to download the artifacts.",
                    )
                    .with_description(e.to_string())
                    .with_severity(LogSeverity::Error),
                )
                .await;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_bucket_name_is_app_prefixed_and_lowercased() {
        let name = unique_bucket_name("Evolve", "Models").expect("valid name");
        assert_eq!(name, "evolve_models");
    }

    #[test]
    fn unique_bucket_name_rejects_invalid_names() {
        assert!(matches!(
            unique_bucket_name("app", "spaced name"),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            unique_bucket_name("a", ""),
            Err(StoreError::InvalidName(_))
        ));
        // 63 characters is the hard upper bound.
        let long = "x".repeat(80);
        assert!(matches!(
            unique_bucket_name("app", &long),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn object_url_percent_encodes_directory_like_names() {
        let client = CloudStorageClient::new("p", TokenProvider::new());
        assert_eq!(
            client.object_url("bkt", "my/gcp/object"),
            "https://storage.googleapis.com/storage/v1/b/bkt/o/my%2Fgcp%2Fobject"
        );
    }
}
