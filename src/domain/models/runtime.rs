//! Runtime distribution and process models.
//!
//! The controlled browser runtime is installed from a remote archive pinned
//! by a version manifest, and tracked at run time through opaque handles.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version manifest served by the runtime distribution endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeManifest {
    /// Latest published runtime version.
    pub version: String,
    /// Download URL of the runtime archive for this version.
    pub archive_url: String,
}

/// Record of the locally installed runtime binary.
///
/// Created on first successful install, mutated on update, removed only by
/// an explicit reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub installed_version: String,
    pub executable_path: PathBuf,
    pub manifest_checked_at: DateTime<Utc>,
}

impl RuntimeRecord {
    pub fn new(installed_version: impl Into<String>, executable_path: PathBuf) -> Self {
        Self {
            installed_version: installed_version.into(),
            executable_path,
            manifest_checked_at: Utc::now(),
        }
    }
}

/// Handle to a live runtime process.
///
/// The handle is opaque to everything except the `ProcessControl`
/// implementation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeHandle {
    pub id: Uuid,
    pub pid: Option<u32>,
}

impl RuntimeHandle {
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pid,
        }
    }
}

impl std::fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "runtime {} (pid {})", self.id, pid),
            None => write!(f, "runtime {}", self.id),
        }
    }
}
