//! Remote path parsing.
//!
//! A remote path is `<scheme>://<bucket>/<key-or-prefix>` or, without a
//! scheme, `<bucket>/<key-or-prefix>` addressed to the default S3-compatible
//! provider. A key that is empty or ends in `/` denotes every object under
//! that prefix.

use std::fmt;

use crate::error::TaskError;

/// Object storage provider selected by the remote path scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    /// `s3://` or no scheme.
    S3,
    /// `gs://`
    GoogleCloud,
    /// `azureblob://`
    AzureBlob,
}

impl StorageProvider {
    /// URI scheme of the provider.
    pub fn scheme(&self) -> &'static str {
        match self {
            StorageProvider::S3 => "s3",
            StorageProvider::GoogleCloud => "gs",
            StorageProvider::AzureBlob => "azureblob",
        }
    }

    /// Whether the engine can talk to this provider.
    pub fn is_s3_compatible(&self) -> bool {
        matches!(self, StorageProvider::S3)
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "s3" => Some(StorageProvider::S3),
            "gs" => Some(StorageProvider::GoogleCloud),
            "azureblob" => Some(StorageProvider::AzureBlob),
            _ => None,
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// A bucket plus an object key or prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    /// Provider selected by the scheme.
    pub provider: StorageProvider,
    /// Bucket (or container) name.
    pub bucket: String,
    /// Object key or prefix, without a leading `/`. May be empty.
    pub key: String,
}

impl RemotePath {
    /// Create an S3 path from its parts.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            provider: StorageProvider::S3,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a remote path, splitting bucket and key at the first `/`.
    ///
    /// # Errors
    /// Returns `TaskError::InvalidRemotePath` for an unknown scheme or an
    /// empty bucket name.
    pub fn parse(path: &str) -> Result<Self, TaskError> {
        let invalid = |message: &str| TaskError::InvalidRemotePath {
            path: path.to_string(),
            message: message.to_string(),
        };

        let trimmed: &str = path.trim();
        let (provider, rest): (StorageProvider, &str) = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                let provider: StorageProvider =
                    StorageProvider::from_scheme(scheme).ok_or_else(|| invalid("unknown scheme"))?;
                (provider, rest)
            }
            None => (StorageProvider::S3, trimmed.trim_start_matches('/')),
        };

        let (bucket, key): (&str, &str) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(invalid("missing bucket name"));
        }

        Ok(Self {
            provider,
            bucket: bucket.to_string(),
            key: key.trim_start_matches('/').to_string(),
        })
    }

    /// Whether the key denotes every object under a prefix.
    pub fn is_prefix(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// Last segment of the key, if it names an object.
    pub fn object_name(&self) -> Option<&str> {
        if self.is_prefix() {
            None
        } else {
            self.key.rsplit('/').next()
        }
    }

    /// The key to store `file_name` under: the key itself, or `file_name`
    /// appended when the key is a prefix.
    pub fn key_for(&self, file_name: &str) -> String {
        if self.is_prefix() {
            format!("{}{}", self.key, file_name)
        } else {
            self.key.clone()
        }
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.provider, self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schemes() {
        let s3: RemotePath = RemotePath::parse("s3://archive/runs/run-1.tar.gz").unwrap();
        assert_eq!(s3, RemotePath::new("archive", "runs/run-1.tar.gz"));

        let gs: RemotePath = RemotePath::parse("gs://bucket/x").unwrap();
        assert_eq!(gs.provider, StorageProvider::GoogleCloud);
        assert!(!gs.provider.is_s3_compatible());

        let azure: RemotePath = RemotePath::parse("azureblob://container/a/b/").unwrap();
        assert_eq!(azure.provider, StorageProvider::AzureBlob);
        assert_eq!(azure.bucket, "container");
        assert_eq!(azure.key, "a/b/");

        let bare: RemotePath = RemotePath::parse("archive/jobs/42/").unwrap();
        assert_eq!(bare.provider, StorageProvider::S3);
        assert_eq!(bare.bucket, "archive");
        assert!(bare.is_prefix());
    }

    #[test]
    fn test_bucket_only() {
        let path: RemotePath = RemotePath::parse("s3://archive").unwrap();
        assert_eq!(path.bucket, "archive");
        assert_eq!(path.key, "");
        assert!(path.is_prefix());
        assert_eq!(path.object_name(), None);
    }

    #[test]
    fn test_invalid_paths() {
        assert!(matches!(
            RemotePath::parse("ftp://host/file"),
            Err(TaskError::InvalidRemotePath { .. })
        ));
        assert!(RemotePath::parse("s3:///key").is_err());
        assert!(RemotePath::parse("").is_err());
    }

    #[test]
    fn test_key_for() {
        let prefix: RemotePath = RemotePath::new("b", "runs/");
        assert_eq!(prefix.key_for("sample.tar.gz"), "runs/sample.tar.gz");

        let root: RemotePath = RemotePath::new("b", "");
        assert_eq!(root.key_for("sample.tar.gz"), "sample.tar.gz");

        let exact: RemotePath = RemotePath::new("b", "runs/custom.tgz");
        assert_eq!(exact.key_for("sample.tar.gz"), "runs/custom.tgz");
        assert_eq!(exact.object_name(), Some("custom.tgz"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RemotePath::new("archive", "jobs/42/").to_string(),
            "s3://archive/jobs/42/"
        );
    }
}
