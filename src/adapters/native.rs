//! Native process control.
//!
//! Real implementation of the `ProcessControl` port: HTTP manifest and
//! archive downloads, zip extraction, and child-process custody for the
//! controlled runtime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RuntimeHandle, RuntimeManifest};
use crate::domain::ports::ProcessControl;

/// Capacity of the exit broadcast channel.
const EXIT_CHANNEL_CAPACITY: usize = 16;

/// Poll cadence while waiting for a signalled process to die.
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Process control backed by the operating system.
pub struct NativeProcessControl {
    http: reqwest::Client,
    running: Arc<RwLock<HashMap<Uuid, u32>>>,
    exits: broadcast::Sender<Uuid>,
}

impl NativeProcessControl {
    pub fn new() -> Self {
        let (exits, _) = broadcast::channel(EXIT_CHANNEL_CAPACITY);
        Self {
            http: reqwest::Client::new(),
            running: Arc::new(RwLock::new(HashMap::new())),
            exits,
        }
    }

    async fn stream_to_file(&self, url: &str, dest: &Path) -> DomainResult<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| DomainError::InstallFailed(format!("archive request failed: {e}")))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| DomainError::InstallFailed(format!("download interrupted: {e}")))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

impl Default for NativeProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessControl for NativeProcessControl {
    async fn fetch_manifest(&self, url: &str) -> DomainResult<RuntimeManifest> {
        let manifest = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| DomainError::InstallFailed(format!("manifest request failed: {e}")))?
            .json::<RuntimeManifest>()
            .await
            .map_err(|e| DomainError::InstallFailed(format!("manifest malformed: {e}")))?;
        debug!(version = %manifest.version, "manifest fetched");
        Ok(manifest)
    }

    async fn download(&self, url: &str, dest: &Path) -> DomainResult<()> {
        info!(url, dest = %dest.display(), "downloading runtime archive");
        match self.stream_to_file(url, dest).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Never leave a plausible-looking partial archive behind.
                let _ = tokio::fs::remove_file(dest).await;
                Err(err)
            }
        }
    }

    async fn extract(&self, archive: &Path, dir: &Path) -> DomainResult<()> {
        let archive = archive.to_path_buf();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || -> DomainResult<()> {
            let file = std::fs::File::open(&archive)?;
            let mut zip = zip::ZipArchive::new(file)
                .map_err(|e| DomainError::InstallFailed(format!("archive unreadable: {e}")))?;
            std::fs::create_dir_all(&dir)?;
            zip.extract(&dir)
                .map_err(|e| DomainError::InstallFailed(format!("extraction failed: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| DomainError::InstallFailed(format!("extraction task failed: {e}")))?
    }

    async fn spawn(&self, executable: &Path, args: &[String]) -> DomainResult<RuntimeHandle> {
        let mut child = Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                DomainError::LaunchFailed(format!("{}: {e}", executable.display()))
            })?;

        let pid = child.id();
        let handle = RuntimeHandle::new(pid);
        if let Some(pid) = pid {
            self.running.write().await.insert(handle.id, pid);
        }
        info!(%handle, "runtime process spawned");

        // The watcher owns the child; kills go through signals, and every
        // exit, explicit or not, is broadcast for the ownership arbiter.
        let running = Arc::clone(&self.running);
        let exits = self.exits.clone();
        let handle_id = handle.id;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(%handle_id, ?status, "runtime process exited"),
                Err(err) => warn!(%handle_id, error = %err, "wait on runtime process failed"),
            }
            running.write().await.remove(&handle_id);
            let _ = exits.send(handle_id);
        });

        Ok(handle)
    }

    async fn is_alive(&self, handle: &RuntimeHandle) -> bool {
        self.running.read().await.contains_key(&handle.id)
    }

    async fn kill(&self, handle: &RuntimeHandle, grace: Duration) -> DomainResult<()> {
        let Some(pid) = self.running.read().await.get(&handle.id).copied() else {
            debug!(%handle, "kill skipped, process already gone");
            return Ok(());
        };

        terminate_pid(pid)?;

        let deadline = tokio::time::Instant::now() + grace;
        while self.running.read().await.contains_key(&handle.id) {
            if tokio::time::Instant::now() >= deadline {
                warn!(%handle, "graceful shutdown timed out, hard-killing");
                force_kill_pid(pid)?;
                break;
            }
            tokio::time::sleep(KILL_POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn kill_rooted_under(&self, dir: &Path, grace: Duration) -> DomainResult<usize> {
        let victims = processes_rooted_under(dir);
        if victims.is_empty() {
            return Ok(0);
        }

        for &pid in &victims {
            if let Err(err) = terminate_pid(pid) {
                warn!(pid, error = %err, "failed to signal lingering process");
            }
        }
        tokio::time::sleep(grace.min(Duration::from_secs(5))).await;
        for &pid in &victims {
            if pid_exists(pid) {
                let _ = force_kill_pid(pid);
            }
        }
        Ok(victims.len())
    }

    fn subscribe_exits(&self) -> broadcast::Receiver<Uuid> {
        self.exits.subscribe()
    }
}

#[cfg(unix)]
fn terminate_pid(pid: u32) -> DomainResult<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| DomainError::Io(format!("SIGTERM to {pid} failed: {e}")))
}

#[cfg(unix)]
fn force_kill_pid(pid: u32) -> DomainResult<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
        .map_err(|e| DomainError::Io(format!("SIGKILL to {pid} failed: {e}")))
}

#[cfg(not(unix))]
fn terminate_pid(pid: u32) -> DomainResult<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .output()
        .map_err(|e| DomainError::Io(format!("taskkill {pid} failed: {e}")))?;
    let _ = status;
    Ok(())
}

#[cfg(not(unix))]
fn force_kill_pid(pid: u32) -> DomainResult<()> {
    std::process::Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .output()
        .map_err(|e| DomainError::Io(format!("taskkill {pid} failed: {e}")))?;
    Ok(())
}

/// Pids of processes whose executable resolves under `dir`.
#[cfg(unix)]
fn processes_rooted_under(dir: &Path) -> Vec<u32> {
    let root = match dir.canonicalize() {
        Ok(root) => root,
        Err(_) => dir.to_path_buf(),
    };
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    let mut pids = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let exe: PathBuf = match std::fs::read_link(entry.path().join("exe")) {
            Ok(exe) => exe,
            Err(_) => continue,
        };
        if exe.starts_with(&root) {
            pids.push(pid);
        }
    }
    pids
}

#[cfg(not(unix))]
fn processes_rooted_under(dir: &Path) -> Vec<u32> {
    warn!(dir = %dir.display(), "process sweep not supported on this platform");
    Vec::new()
}

#[cfg(unix)]
fn pid_exists(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn pid_exists(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_manifest() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/manifest.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"version":"9.1.0","archive_url":"https://dist.example/9.1.0.zip"}"#)
            .create_async()
            .await;

        let control = NativeProcessControl::new();
        let manifest = control
            .fetch_manifest(&format!("{}/manifest.json", server.url()))
            .await
            .unwrap();
        assert_eq!(manifest.version, "9.1.0");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_manifest_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/manifest.json")
            .with_status(503)
            .create_async()
            .await;

        let control = NativeProcessControl::new();
        let result = control
            .fetch_manifest(&format!("{}/manifest.json", server.url()))
            .await;
        assert!(matches!(result, Err(DomainError::InstallFailed(_))));
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/archive.zip")
            .with_status(200)
            .with_body(b"archive-bytes")
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("archive.zip");
        let control = NativeProcessControl::new();
        control
            .download(&format!("{}/archive.zip", server.url()), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"archive-bytes");
    }

    #[tokio::test]
    async fn test_failed_download_removes_partial_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/archive.zip")
            .with_status(404)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("archive.zip");
        let control = NativeProcessControl::new();
        let result = control
            .download(&format!("{}/archive.zip", server.url()), &dest)
            .await;

        assert!(matches!(result, Err(DomainError::InstallFailed(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_spawn_tracks_and_reaps() {
        let control = NativeProcessControl::new();
        let mut exits = control.subscribe_exits();

        let handle = control
            .spawn(Path::new("/bin/sh"), &["-c".to_string(), "exit 0".to_string()])
            .await
            .unwrap();

        // The watcher reaps the child and broadcasts its exit.
        let exited = exits.recv().await.unwrap();
        assert_eq!(exited, handle.id);
        assert!(!control.is_alive(&handle).await);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let control = NativeProcessControl::new();
        let result = control
            .spawn(Path::new("/nonexistent/definitely-not-here"), &[])
            .await;
        assert!(matches!(result, Err(DomainError::LaunchFailed(_))));
    }

    #[tokio::test]
    async fn test_kill_running_process() {
        let control = NativeProcessControl::new();
        let handle = control
            .spawn(Path::new("/bin/sh"), &["-c".to_string(), "sleep 30".to_string()])
            .await
            .unwrap();
        assert!(control.is_alive(&handle).await);

        control
            .kill(&handle, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!control.is_alive(&handle).await);
    }
}
