//! Process control port - distribution and custody of the runtime binary.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RuntimeHandle, RuntimeManifest};

/// Trait for fetching, unpacking, spawning, and killing the controlled
/// runtime. The lifecycle manager holds the install algorithm; this port
/// holds the mechanics.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Fetch the remote version manifest.
    async fn fetch_manifest(&self, url: &str) -> DomainResult<RuntimeManifest>;

    /// Download `url` to `dest`. On failure the destination must not be left
    /// as a plausible-looking partial file.
    async fn download(&self, url: &str, dest: &Path) -> DomainResult<()>;

    /// Extract an archive into `dir` as a unit.
    async fn extract(&self, archive: &Path, dir: &Path) -> DomainResult<()>;

    /// Spawn the runtime executable with the given arguments.
    async fn spawn(&self, executable: &Path, args: &[String]) -> DomainResult<RuntimeHandle>;

    /// Whether the process behind `handle` is still running.
    async fn is_alive(&self, handle: &RuntimeHandle) -> bool;

    /// Terminate the process: graceful signal, bounded wait, then hard kill.
    async fn kill(&self, handle: &RuntimeHandle, grace: Duration) -> DomainResult<()>;

    /// Terminate every process whose executable path is rooted under `dir`.
    /// Returns the number of processes signalled. Used by hard reset to clear
    /// lingering children that would keep installed binaries locked.
    async fn kill_rooted_under(&self, dir: &Path, grace: Duration) -> DomainResult<usize>;

    /// Subscribe to out-of-band process exits (a handle's process terminated
    /// without `kill` being called).
    fn subscribe_exits(&self) -> broadcast::Receiver<Uuid>;
}
