//! Storage engine façade.
//!
//! Runs one [`StorageTask`] at a time by composing the bag manager, the
//! archive codec and the object storage layer:
//!
//! - **upload**: a directory is wrapped as a bag, verified, archived and
//!   uploaded; the directory is always unwrapped and the archive always
//!   removed afterwards. A plain file is uploaded as is.
//! - **download**: objects are fetched, unarchived and, when the result is a
//!   bag, verified and unwrapped. A key ending in `/` downloads every object
//!   under that prefix.
//! - **delete**: one object, or every object under a prefix.
//! - **list**: buckets, or the objects under a bucket and prefix.
//!
//! Free space is checked before any file is created.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusty_archival_bagit::{is_bag, BagManager};
use rusty_archival_codec::{
    archive, archive_path_for, detect_container_type, is_archive_name, strip_archive_extension,
    unarchive, ContainerType, UnpackSummary,
};
use rusty_archival_common::{
    directory_size, human_readable_bytes, resolve_within_root, Compression, LogContext, TaskLogger,
    UNCOMPRESSED_SIZE_METADATA_KEY,
};
use rusty_archival_storage::{
    DownloadOutcome, ObjectMetadata, ObjectStorage, StorageClient, UploadOutcome,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, TaskError};
use crate::location::RemotePath;
use crate::space::{preflight, SpaceProbe};
use crate::task::{StorageAction, StorageTask};

/// Executes storage tasks against one backend.
pub struct StorageEngine<C: StorageClient, P: SpaceProbe> {
    storage: ObjectStorage<C>,
    bags: Arc<BagManager>,
    probe: Arc<P>,
    config: EngineConfig,
    logger: TaskLogger,
}

impl<C: StorageClient, P: SpaceProbe> StorageEngine<C, P> {
    /// Create a new storage engine.
    ///
    /// # Arguments
    /// * `client` - Object storage backend
    /// * `probe` - Free-space probe used for preflight checks
    /// * `config` - Archiver and transfer settings
    /// * `logger` - Parent logger; `engine`, `storage` and `bagit` children are derived from it
    ///
    /// # Errors
    /// Returns error if the bag verifier cannot be created.
    pub fn new(
        client: C,
        probe: P,
        config: EngineConfig,
        logger: &TaskLogger,
    ) -> Result<Self, EngineError> {
        let bags: BagManager = BagManager::new(config.archiver.clone(), logger)?;
        Ok(Self {
            storage: ObjectStorage::new(client, logger),
            bags: Arc::new(bags),
            probe: Arc::new(probe),
            config,
            logger: logger.for_component("engine"),
        })
    }

    /// A copy sharing this engine's backend, probe and bag verifier whose
    /// `engine`, `storage` and `bagit` loggers derive from `logger`.
    ///
    /// # Arguments
    /// * `logger` - Parent logger carrying the identifiers to log with
    pub fn with_logger(&self, logger: &TaskLogger) -> Self {
        Self {
            storage: self.storage.with_logger(logger),
            bags: Arc::new(self.bags.with_logger(logger)),
            probe: Arc::clone(&self.probe),
            config: self.config.clone(),
            logger: logger.for_component("engine"),
        }
    }

    /// The object storage layer.
    pub fn storage(&self) -> &ObjectStorage<C> {
        &self.storage
    }

    /// Archiver and transfer settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Logger bound to the `engine` component.
    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }

    /// Run a task to completion.
    ///
    /// Every component logs with the task's identifiers while it runs.
    /// Failures are logged once here, as a task failure event.
    ///
    /// # Returns
    /// Whether the task succeeded.
    pub async fn run(&self, task: &StorageTask) -> bool {
        let context: LogContext = self.logger.context().clone().with_task(&task.id, &task.name);
        let scoped: Self = self.with_logger(&TaskLogger::with_context("engine", context));
        let logger: &TaskLogger = &scoped.logger;
        logger.info(format!("Starting {}", task));

        match scoped.execute(task, logger).await {
            Ok(()) => {
                logger.event_info(format!("Storage {} completed", task.action));
                true
            }
            Err(err) => {
                logger.event_failure(format!("Storage {} failed: {}", task.action, err));
                false
            }
        }
    }

    async fn execute(&self, task: &StorageTask, logger: &TaskLogger) -> Result<(), EngineError> {
        match task.action {
            StorageAction::Upload => {
                let outcome: UploadOutcome = self
                    .upload(required_local(task)?, required_remote(task)?)
                    .await?;
                logger.info(format!(
                    "Stored {} as s3://{}/{}",
                    human_readable_bytes(outcome.bytes),
                    required_remote(task)?.bucket,
                    outcome.key
                ));
            }
            StorageAction::Download => {
                let paths: Vec<PathBuf> = self
                    .download(required_remote(task)?, required_local(task)?)
                    .await?;
                for path in &paths {
                    logger.info(format!("Restored {}", path.display()));
                }
            }
            StorageAction::Delete => {
                let deleted: usize = self.delete(required_remote(task)?).await?;
                logger.info(format!("Deleted {} objects", deleted));
            }
            StorageAction::List => {
                let entries: Vec<String> = self.list(task.remote_path.as_ref()).await?;
                for entry in &entries {
                    logger.info(entry);
                }
            }
        }
        Ok(())
    }

    /// Upload a file, or a directory as a bagged archive.
    ///
    /// A directory `<dir>` is stored as `<dir>.tar.gz` (or `.tar`) under the
    /// remote prefix. A plain file keeps its name. A remote key that does not
    /// end in `/` is used verbatim.
    ///
    /// # Errors
    /// Returns a precondition error for a missing bucket or local path, or
    /// insufficient space next to the directory, and an integrity error if
    /// the freshly wrapped bag does not verify.
    pub async fn upload(
        &self,
        local_path: &Path,
        remote: &RemotePath,
    ) -> Result<UploadOutcome, EngineError> {
        check_provider(remote)?;
        self.require_bucket(&remote.bucket).await?;

        let local: PathBuf = tokio::fs::canonicalize(local_path).await.map_err(|_| {
            EngineError::precondition(format!("Local path {} does not exist", local_path.display()))
        })?;
        let metadata: std::fs::Metadata = tokio::fs::metadata(&local)
            .await
            .map_err(|e| EngineError::io(local.display().to_string(), e))?;

        if metadata.is_dir() {
            self.upload_directory(&local, remote).await
        } else {
            let key: String = remote.key_for(&file_name_of(&local)?);
            let outcome: UploadOutcome = self
                .storage
                .upload(
                    &local,
                    &remote.bucket,
                    &key,
                    &self.config.upload_options(metadata.len()),
                )
                .await?;
            Ok(outcome)
        }
    }

    async fn upload_directory(
        &self,
        dir: &Path,
        remote: &RemotePath,
    ) -> Result<UploadOutcome, EngineError> {
        let compression: Compression = self.config.archiver.compression;
        let archive_path: PathBuf = archive_path_for(dir, compression);
        let key: String = remote.key_for(&file_name_of(&archive_path)?);

        let measured: PathBuf = dir.to_path_buf();
        let payload_size: u64 = blocking(move || Ok(directory_size(&measured)?)).await?;
        preflight(
            self.probe.as_ref(),
            dir,
            payload_size.saturating_add(self.config.space_headroom_bytes),
            &self.logger,
        )?;

        let result: Result<UploadOutcome, EngineError> = self
            .box_and_upload(dir, &archive_path, compression, remote, &key, payload_size)
            .await;

        let bags: Arc<BagManager> = Arc::clone(&self.bags);
        let restored: PathBuf = dir.to_path_buf();
        let unwrapped: Result<(), EngineError> =
            blocking(move || Ok(bags.unwrap(&restored)?)).await;

        if let Err(e) = tokio::fs::remove_file(&archive_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                self.logger.warn(format!(
                    "Failed to remove archive {}: {}",
                    archive_path.display(),
                    e
                ));
            }
        }

        let outcome: UploadOutcome = result?;
        unwrapped?;
        Ok(outcome)
    }

    async fn box_and_upload(
        &self,
        dir: &Path,
        archive_path: &Path,
        compression: Compression,
        remote: &RemotePath,
        key: &str,
        payload_size: u64,
    ) -> Result<UploadOutcome, EngineError> {
        let bags: Arc<BagManager> = Arc::clone(&self.bags);
        let bag_dir: PathBuf = dir.to_path_buf();
        let output: PathBuf = archive_path.to_path_buf();
        blocking(move || {
            bags.wrap(&bag_dir)?;
            bags.try_verify(&bag_dir)
                .map_err(|source| EngineError::Integrity {
                    path: bag_dir.display().to_string(),
                    source,
                })?;
            archive(&output, &[bag_dir.clone()], compression)?;
            Ok(())
        })
        .await?;

        let outcome: UploadOutcome = self
            .storage
            .upload(
                archive_path,
                &remote.bucket,
                key,
                &self.config.upload_options(payload_size),
            )
            .await?;
        Ok(outcome)
    }

    /// Download one object, or every object under a prefix, into `local_dir`.
    ///
    /// Archives are extracted and bags are verified and unwrapped.
    ///
    /// # Returns
    /// The restored path of each object.
    ///
    /// # Errors
    /// A single-object download fails on the first error. A prefix download
    /// attempts every object and returns `EngineError::PartialFailure` if
    /// any of them failed.
    pub async fn download(
        &self,
        remote: &RemotePath,
        local_dir: &Path,
    ) -> Result<Vec<PathBuf>, EngineError> {
        check_provider(remote)?;
        self.require_bucket(&remote.bucket).await?;

        if remote.is_prefix() {
            self.download_prefix(remote, local_dir).await
        } else {
            let restored: PathBuf = self
                .download_object(&remote.bucket, &remote.key, local_dir)
                .await?;
            Ok(vec![restored])
        }
    }

    async fn download_prefix(
        &self,
        remote: &RemotePath,
        local_dir: &Path,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let objects: Vec<(String, u64)> = self
            .storage
            .list_objects_with_size(&remote.bucket, &remote.key)
            .await?
            .into_iter()
            .filter(|(key, _)| !key.ends_with('/'))
            .collect();
        if objects.is_empty() {
            return Err(EngineError::precondition(format!(
                "No objects found under {}",
                remote
            )));
        }

        let total: u64 = objects.iter().map(|(_, size)| *size).sum();
        let largest: u64 = objects.iter().map(|(_, size)| *size).max().unwrap_or(0);
        preflight(
            self.probe.as_ref(),
            local_dir,
            total
                .saturating_add(largest)
                .saturating_add(self.config.space_headroom_bytes),
            &self.logger,
        )?;

        let parent: &str = prefix_parent(&remote.key);
        let mut restored: Vec<PathBuf> = Vec::with_capacity(objects.len());
        let mut failed: usize = 0;

        for (key, _) in &objects {
            let relative_dir: &str = key[parent.len()..]
                .rsplit_once('/')
                .map(|(dir, _)| dir)
                .unwrap_or("");
            let result: Result<PathBuf, EngineError> = match resolve_within_root(relative_dir, local_dir) {
                Ok(dest) => self.download_object(&remote.bucket, key, &dest).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(path) => restored.push(path),
                Err(err) => {
                    failed += 1;
                    self.logger
                        .error(format!("Failed to download s3://{}/{}: {}", remote.bucket, key, err));
                }
            }
        }

        if failed > 0 {
            return Err(EngineError::PartialFailure {
                prefix: remote.to_string(),
                failed,
                total: objects.len(),
            });
        }
        Ok(restored)
    }

    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        out_dir: &Path,
    ) -> Result<PathBuf, EngineError> {
        let metadata: ObjectMetadata = self
            .storage
            .object_metadata(bucket, key)
            .await?
            .ok_or_else(|| {
                EngineError::precondition(format!("Object s3://{}/{} does not exist", bucket, key))
            })?;

        let file_name: &str = key.rsplit('/').next().unwrap_or(key);
        if file_name.is_empty() {
            return Err(EngineError::precondition(format!(
                "Key {} does not name an object",
                key
            )));
        }
        let uncompressed: u64 = self.uncompressed_size(key, &metadata);
        let unboxed: PathBuf = out_dir.join(strip_archive_extension(file_name));

        if self.already_restored(&unboxed, uncompressed).await {
            self.logger.info(format!(
                "{} already holds {} of payload, skipping download",
                unboxed.display(),
                human_readable_bytes(uncompressed)
            ));
            return Ok(unboxed);
        }

        preflight(
            self.probe.as_ref(),
            out_dir,
            metadata
                .size
                .saturating_add(uncompressed)
                .saturating_add(self.config.space_headroom_bytes),
            &self.logger,
        )?;

        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| EngineError::io(out_dir.display().to_string(), e))?;
        remove_stale(&unboxed).await?;

        let outcome: DownloadOutcome = self
            .storage
            .download(bucket, key, out_dir, &self.config.download_options())
            .await?;

        let bags: Arc<BagManager> = Arc::clone(&self.bags);
        let downloaded: PathBuf = outcome.path;
        let out_dir: PathBuf = out_dir.to_path_buf();
        blocking(move || unbox(&bags, &downloaded, &out_dir, &unboxed)).await
    }

    /// Uncompressed size from the object's tag, or a multiple of its size.
    fn uncompressed_size(&self, key: &str, metadata: &ObjectMetadata) -> u64 {
        let tagged: Option<u64> = metadata
            .user_metadata
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(UNCOMPRESSED_SIZE_METADATA_KEY))
            .and_then(|(_, value)| value.trim().parse().ok());

        match tagged {
            Some(size) => size,
            None => {
                let estimate: u64 = metadata
                    .size
                    .saturating_mul(self.config.uncompressed_size_multiplier);
                self.logger.warn(format!(
                    "Object {} has no usable {} tag, assuming {}",
                    key,
                    UNCOMPRESSED_SIZE_METADATA_KEY,
                    human_readable_bytes(estimate)
                ));
                estimate
            }
        }
    }

    async fn already_restored(&self, unboxed: &Path, expected: u64) -> bool {
        if tokio::fs::symlink_metadata(unboxed).await.is_err() {
            return false;
        }
        let measured: PathBuf = unboxed.to_path_buf();
        match blocking(move || Ok(directory_size(&measured)?)).await {
            Ok(size) => size == expected,
            Err(err) => {
                self.logger
                    .debug(format!("Cannot measure {}: {}", unboxed.display(), err));
                false
            }
        }
    }

    /// Delete one object, or every object under a prefix.
    ///
    /// # Returns
    /// Number of objects deleted.
    ///
    /// # Errors
    /// Returns a precondition error for a missing bucket or object.
    pub async fn delete(&self, remote: &RemotePath) -> Result<usize, EngineError> {
        check_provider(remote)?;
        self.require_bucket(&remote.bucket).await?;

        if remote.is_prefix() {
            return Ok(self
                .storage
                .delete_prefix(&remote.bucket, &remote.key)
                .await?);
        }

        if !self
            .storage
            .object_exists(&remote.bucket, &remote.key)
            .await?
        {
            return Err(EngineError::precondition(format!(
                "Object {} does not exist",
                remote
            )));
        }
        self.storage
            .delete_object(&remote.bucket, &remote.key)
            .await?;
        Ok(1)
    }

    /// Bucket names when `remote` is None, otherwise the keys under it.
    pub async fn list(&self, remote: Option<&RemotePath>) -> Result<Vec<String>, EngineError> {
        match remote {
            None => Ok(self.storage.list_buckets().await?),
            Some(remote) => {
                check_provider(remote)?;
                self.require_bucket(&remote.bucket).await?;
                Ok(self
                    .storage
                    .list_objects(&remote.bucket, &remote.key)
                    .await?)
            }
        }
    }

    async fn require_bucket(&self, bucket: &str) -> Result<(), EngineError> {
        if self.storage.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(EngineError::precondition(format!(
                "Bucket {} does not exist",
                bucket
            )))
        }
    }
}

/// Extract a downloaded archive next to itself and unwrap a bag inside it.
///
/// Files that are not archives are returned untouched.
fn unbox(
    bags: &BagManager,
    downloaded: &Path,
    out_dir: &Path,
    unboxed: &Path,
) -> Result<PathBuf, EngineError> {
    if !is_archive_name(downloaded)
        || detect_container_type(downloaded)? == ContainerType::Unsupported
    {
        return Ok(downloaded.to_path_buf());
    }

    let summary: UnpackSummary = unarchive(downloaded, out_dir)?;
    std::fs::remove_file(downloaded)
        .map_err(|e| EngineError::io(downloaded.display().to_string(), e))?;

    let root: PathBuf = if unboxed.is_dir() {
        unboxed.to_path_buf()
    } else {
        match summary.top_level.iter().next() {
            Some(name) if summary.top_level.len() == 1 && out_dir.join(name).is_dir() => {
                out_dir.join(name)
            }
            _ => {
                return Err(EngineError::IoError {
                    path: downloaded.display().to_string(),
                    message: format!(
                        "archive holds no single payload directory (found {:?})",
                        summary.top_level
                    ),
                })
            }
        }
    };

    if is_bag(&root) {
        bags.try_verify(&root)
            .map_err(|source| EngineError::Integrity {
                path: root.display().to_string(),
                source,
            })?;
        bags.unwrap(&root)?;
    }
    Ok(root)
}

async fn remove_stale(path: &Path) -> Result<(), EngineError> {
    let metadata: std::fs::Metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(_) => return Ok(()),
    };
    let removed: std::io::Result<()> = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    removed.map_err(|e| EngineError::io(path.display().to_string(), e))
}

/// Run filesystem-bound work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| EngineError::Join {
            message: e.to_string(),
        })?
}

fn check_provider(remote: &RemotePath) -> Result<(), EngineError> {
    if remote.provider.is_s3_compatible() {
        Ok(())
    } else {
        Err(EngineError::UnsupportedProvider {
            provider: remote.provider.to_string(),
        })
    }
}

fn file_name_of(path: &Path) -> Result<String, EngineError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| EngineError::precondition(format!("{} has no file name", path.display())))
}

/// Part of a prefix up to and including the `/` before its last segment.
fn prefix_parent(prefix: &str) -> &str {
    match prefix.trim_end_matches('/').rfind('/') {
        Some(index) => &prefix[..=index],
        None => "",
    }
}

fn required_local(task: &StorageTask) -> Result<&Path, TaskError> {
    task.local_path
        .as_deref()
        .ok_or_else(|| TaskError::MissingField {
            task: task.name.clone(),
            field: "local_path",
        })
}

fn required_remote(task: &StorageTask) -> Result<&RemotePath, TaskError> {
    task.remote_path
        .as_ref()
        .ok_or_else(|| TaskError::MissingField {
            task: task.name.clone(),
            field: "remote_path",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_parent() {
        assert_eq!(prefix_parent("jobs/42/"), "jobs/");
        assert_eq!(prefix_parent("jobs/"), "");
        assert_eq!(prefix_parent(""), "");
        assert_eq!(prefix_parent("a/b/c/"), "a/b/");
    }

    #[test]
    fn test_check_provider() {
        assert!(check_provider(&RemotePath::new("b", "k")).is_ok());
        let gs: RemotePath = RemotePath::parse("gs://b/k").unwrap();
        assert!(matches!(
            check_provider(&gs),
            Err(EngineError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of(Path::new("/data/run-1")).unwrap(), "run-1");
        assert!(file_name_of(Path::new("/")).is_err());
    }
}
