use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const AUDIT_FILE_NAME: &str = "audit.ndjson";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Succeeded,
    Failed,
    Blocked,
}

/// One mutation attempt. Parameter values are not recorded, only their count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRecord {
    pub timestamp_unix_ms: u128,
    pub profile_name: Option<String>,
    pub database: Option<String>,
    pub table: String,
    pub operation: AuditOperation,
    pub sql: String,
    pub param_count: usize,
    pub outcome: AuditOutcome,
    pub affected_rows: Option<u64>,
    pub error: Option<String>,
}

#[must_use]
pub fn unix_timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[derive(Debug, Error)]
pub enum AuditTrailError {
    #[error("invalid audit trail path `{0}`")]
    InvalidPath(PathBuf),
    #[error("failed to create audit trail directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize audit record: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append audit record at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FileAuditTrail {
    path: PathBuf,
}

impl FileAuditTrail {
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AuditRecord) -> Result<(), AuditTrailError> {
        let parent_dir = self
            .path
            .parent()
            .ok_or_else(|| AuditTrailError::InvalidPath(self.path.clone()))?;
        fs::create_dir_all(parent_dir).map_err(|source| AuditTrailError::CreateDir {
            path: parent_dir.to_path_buf(),
            source,
        })?;

        let rendered = serde_json::to_string(record)
            .map_err(|source| AuditTrailError::Serialize { source })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| AuditTrailError::Write {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{rendered}").map_err(|source| AuditTrailError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
