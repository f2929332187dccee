//! Storage task model.
//!
//! A `StorageTask` is built once from a task description and never mutated.
//! The action string is resolved to [`StorageAction`] at construction, and
//! required fields are checked per action.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::location::RemotePath;

/// Task type accepted in task descriptions.
pub const STORAGE_TASK_TYPE: &str = "storage";

/// What a storage task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageAction {
    Upload,
    Download,
    Delete,
    List,
}

impl StorageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageAction::Upload => "upload",
            StorageAction::Download => "download",
            StorageAction::Delete => "delete",
            StorageAction::List => "list",
        }
    }

    /// Whether the action needs a local path.
    pub fn requires_local_path(&self) -> bool {
        matches!(self, StorageAction::Upload | StorageAction::Download)
    }

    /// Whether the action needs a remote path.
    pub fn requires_remote_path(&self) -> bool {
        !matches!(self, StorageAction::List)
    }
}

impl FromStr for StorageAction {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(StorageAction::Upload),
            "download" => Ok(StorageAction::Download),
            "delete" => Ok(StorageAction::Delete),
            "list" => Ok(StorageAction::List),
            _ => Err(TaskError::InvalidAction {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for StorageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task description as found in a job file.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawStorageTask {
    id: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    task_type: Option<String>,
    action: Option<String>,
    local_path: Option<String>,
    remote_path: Option<String>,
}

/// A validated storage task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTask {
    pub id: String,
    pub name: String,
    pub action: StorageAction,
    /// Local file or directory; present for upload and download.
    pub local_path: Option<PathBuf>,
    /// Remote bucket and key; present for every action except a bucket listing.
    pub remote_path: Option<RemotePath>,
}

impl StorageTask {
    /// Create a task, checking the fields its action requires.
    ///
    /// # Arguments
    /// * `id` - Task identifier
    /// * `name` - Human-readable task name
    /// * `action` - What the task does
    /// * `local_path` - Local file or directory
    /// * `remote_path` - Remote path string, see [`RemotePath::parse`]
    ///
    /// # Errors
    /// Returns `TaskError::MissingField` for a blank id or name or a path the
    /// action needs, and `TaskError::InvalidRemotePath` for an unparsable
    /// remote path.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        action: StorageAction,
        local_path: Option<PathBuf>,
        remote_path: Option<&str>,
    ) -> Result<Self, TaskError> {
        let id: String = id.into();
        let name: String = name.into();
        if is_blank(Some(&id)) {
            return Err(TaskError::MissingField {
                task: name,
                field: "id",
            });
        }
        if is_blank(Some(&name)) {
            return Err(TaskError::MissingField { task: id, field: "name" });
        }

        let local_path: Option<PathBuf> =
            local_path.filter(|p| !p.as_os_str().is_empty());
        if action.requires_local_path() && local_path.is_none() {
            return Err(TaskError::MissingField {
                task: name,
                field: "local_path",
            });
        }

        let remote_path: Option<&str> = remote_path.filter(|p| !p.trim().is_empty());
        if action.requires_remote_path() && remote_path.is_none() {
            return Err(TaskError::MissingField {
                task: name,
                field: "remote_path",
            });
        }
        let remote_path: Option<RemotePath> = remote_path.map(RemotePath::parse).transpose()?;

        Ok(Self {
            id,
            name,
            action,
            local_path,
            remote_path,
        })
    }

    /// Parse and validate a task from its JSON description.
    ///
    /// Keys are `id`, `name`, `type`, `action`, `local_path` and
    /// `remote_path`. `type`, when present, must be `storage`.
    ///
    /// # Errors
    /// Returns `TaskError::InvalidJson` for malformed JSON, otherwise the
    /// same errors as [`StorageTask::new`].
    pub fn from_json(json: &str) -> Result<Self, TaskError> {
        let raw: RawStorageTask = serde_json::from_str(json).map_err(|e| TaskError::InvalidJson {
            message: e.to_string(),
        })?;

        let name: String = raw.name.clone().unwrap_or_default();
        if is_blank(raw.id.as_ref()) {
            return Err(TaskError::MissingField {
                task: name,
                field: "id",
            });
        }
        if is_blank(raw.name.as_ref()) {
            return Err(TaskError::MissingField {
                task: raw.id.unwrap_or_default(),
                field: "name",
            });
        }
        if let Some(task_type) = raw.task_type.as_deref() {
            if !task_type.trim().eq_ignore_ascii_case(STORAGE_TASK_TYPE) {
                return Err(TaskError::InvalidType {
                    value: task_type.to_string(),
                });
            }
        }
        let action: StorageAction = match raw.action.as_deref() {
            Some(action) if !action.trim().is_empty() => action.parse()?,
            _ => {
                return Err(TaskError::MissingField {
                    task: name,
                    field: "action",
                })
            }
        };

        Self::new(
            raw.id.unwrap_or_default(),
            name,
            action,
            raw.local_path.map(PathBuf::from),
            raw.remote_path.as_deref(),
        )
    }
}

impl fmt::Display for StorageTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task {} ({})", self.action, self.name, self.id)?;
        if let Some(local) = &self.local_path {
            write!(f, " local {}", local.display())?;
        }
        if let Some(remote) = &self.remote_path {
            write!(f, " remote {}", remote)?;
        }
        Ok(())
    }
}

fn is_blank(value: Option<&String>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_upload() {
        let task: StorageTask = StorageTask::from_json(
            r#"{
                "id": "t-1",
                "name": "archive run",
                "type": "storage",
                "action": "upload",
                "local_path": "/data/run-1",
                "remote_path": "s3://archive/runs/"
            }"#,
        )
        .unwrap();

        assert_eq!(task.action, StorageAction::Upload);
        assert_eq!(task.local_path, Some(PathBuf::from("/data/run-1")));
        assert_eq!(task.remote_path, Some(RemotePath::new("archive", "runs/")));
    }

    #[test]
    fn test_from_json_missing_local_path() {
        let err: TaskError = StorageTask::from_json(
            r#"{"id": "t-2", "name": "restore", "action": "download", "remote_path": "archive/x.tar.gz"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TaskError::MissingField {
                task: "restore".into(),
                field: "local_path"
            }
        );
    }

    #[test]
    fn test_from_json_rejects_other_types_and_actions() {
        assert!(matches!(
            StorageTask::from_json(r#"{"id": "1", "name": "n", "type": "docker", "action": "list"}"#),
            Err(TaskError::InvalidType { .. })
        ));
        assert!(matches!(
            StorageTask::from_json(r#"{"id": "1", "name": "n", "action": "copy"}"#),
            Err(TaskError::InvalidAction { .. })
        ));
        assert!(matches!(
            StorageTask::from_json(r#"{"id": "1", "action": "list"}"#),
            Err(TaskError::MissingField { field: "name", .. })
        ));
        assert!(matches!(
            StorageTask::from_json("not json"),
            Err(TaskError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_delete_requires_remote_path_but_list_does_not() {
        assert!(matches!(
            StorageTask::new("1", "n", StorageAction::Delete, None, None),
            Err(TaskError::MissingField {
                field: "remote_path",
                ..
            })
        ));

        let list: StorageTask = StorageTask::new("1", "n", StorageAction::List, None, None).unwrap();
        assert!(list.remote_path.is_none());
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("Upload".parse::<StorageAction>().unwrap(), StorageAction::Upload);
        assert_eq!(StorageAction::Download.to_string(), "download");
        assert!(StorageAction::Upload.requires_local_path());
        assert!(!StorageAction::Delete.requires_local_path());
    }
}
