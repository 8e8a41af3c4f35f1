//! Runtime Lifecycle Manager
//!
//! Keeps the controlled browser runtime installed and current, launches and
//! terminates it, and exposes a liveness check. Install is atomic with
//! respect to the existing installation: the old install directory is only
//! removed after the replacement archive has been fully downloaded.

use std::path::PathBuf;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RuntimeConfig, RuntimeHandle, RuntimeRecord};
use crate::domain::ports::ProcessControl;
use std::sync::Arc;

/// Name of the version marker file inside the install directory.
const VERSION_MARKER: &str = "version";

/// Attempts at deleting the install directory during reset. Binaries may be
/// transiently locked by an OS-level file handle right after a kill.
const RESET_DELETE_ATTEMPTS: u32 = 3;

/// Manager for the controlled runtime's binary and process.
pub struct RuntimeLifecycle {
    control: Arc<dyn ProcessControl>,
    config: RuntimeConfig,
    handle: Mutex<Option<RuntimeHandle>>,
    record: Mutex<Option<RuntimeRecord>>,
}

impl RuntimeLifecycle {
    pub fn new(control: Arc<dyn ProcessControl>, config: RuntimeConfig) -> Self {
        Self {
            control,
            config,
            handle: Mutex::new(None),
            record: Mutex::new(None),
        }
    }

    /// Ensure the runtime binary is present and current.
    ///
    /// Checks the remote manifest; when the local version marker matches, the
    /// download is skipped. Otherwise the archive is downloaded to a staging
    /// path first, and only after a fully written download is the old install
    /// removed, the archive extracted, and the new version marker persisted.
    #[instrument(skip(self))]
    pub async fn ensure_installed(&self) -> DomainResult<()> {
        let manifest = self
            .control
            .fetch_manifest(&self.config.manifest_url)
            .await?;

        let executable = self.config.executable_path();
        let installed = self.installed_version().await;

        if installed.as_deref() == Some(manifest.version.as_str()) && executable.exists() {
            debug!(version = %manifest.version, "runtime already current");
            let mut record = self.record.lock().await;
            *record = Some(RuntimeRecord::new(manifest.version, executable));
            return Ok(());
        }

        info!(
            installed = installed.as_deref().unwrap_or("none"),
            available = %manifest.version,
            "installing runtime"
        );

        let staging = self.staging_path();
        if let Some(parent) = staging.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Err(err) = self.control.download(&manifest.archive_url, &staging).await {
            // The old install has not been touched yet; just drop the
            // partial download.
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err);
        }

        if tokio::fs::try_exists(&self.config.install_dir)
            .await
            .unwrap_or(false)
        {
            tokio::fs::remove_dir_all(&self.config.install_dir)
                .await
                .map_err(|e| {
                    DomainError::InstallFailed(format!("failed to clear old install: {e}"))
                })?;
        }

        self.control
            .extract(&staging, &self.config.install_dir)
            .await?;

        tokio::fs::write(
            self.config.install_dir.join(VERSION_MARKER),
            &manifest.version,
        )
        .await?;
        let _ = tokio::fs::remove_file(&staging).await;

        info!(version = %manifest.version, "runtime installed");
        let mut record = self.record.lock().await;
        *record = Some(RuntimeRecord::new(manifest.version, executable));
        Ok(())
    }

    /// Launch the runtime, installing first when needed.
    ///
    /// Idempotent: a live handle is returned unchanged rather than spawning a
    /// duplicate. Launch arguments pin the process to this instance's fixed
    /// control port and dedicated profile directory.
    #[instrument(skip(self))]
    pub async fn launch(&self, headless: bool) -> DomainResult<RuntimeHandle> {
        let mut held = self.handle.lock().await;
        if let Some(handle) = held.as_ref() {
            if self.control.is_alive(handle).await {
                debug!(%handle, "runtime already live");
                return Ok(handle.clone());
            }
            debug!(%handle, "held handle is dead, discarding");
            *held = None;
        }

        self.ensure_installed().await?;

        let args = self.launch_args(headless);
        let handle = self
            .control
            .spawn(&self.config.executable_path(), &args)
            .await?;
        info!(%handle, headless, port = self.config.control_port, "runtime launched");
        *held = Some(handle.clone());
        Ok(handle)
    }

    /// Close the held runtime, if any. Kill failures are logged, not
    /// surfaced: teardown must not block forward progress.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let taken = self.handle.lock().await.take();
        if let Some(handle) = taken {
            info!(%handle, "closing runtime");
            if let Err(err) = self.control.kill(&handle, self.config.close_grace()).await {
                warn!(%handle, error = %err, "runtime close failed");
            }
        }
    }

    /// Whether the held runtime process is confirmed live.
    pub async fn is_alive(&self) -> bool {
        let held = self.handle.lock().await;
        match held.as_ref() {
            Some(handle) => self.control.is_alive(handle).await,
            None => false,
        }
    }

    /// Id of the currently held handle, if any.
    pub async fn current_handle_id(&self) -> Option<Uuid> {
        self.handle.lock().await.as_ref().map(|h| h.id)
    }

    /// Whether the remote manifest advertises a version newer than the one
    /// installed locally.
    pub async fn is_update_available(&self) -> DomainResult<bool> {
        let manifest = self
            .control
            .fetch_manifest(&self.config.manifest_url)
            .await?;
        let installed = self.installed_version().await;

        if let Some(record) = self.record.lock().await.as_mut() {
            record.manifest_checked_at = Utc::now();
        }

        Ok(installed.as_deref() != Some(manifest.version.as_str()))
    }

    /// Hard reinstall: close the runtime, kill anything still running out of
    /// the install directory, then delete it, retrying with backoff since
    /// binaries may be locked briefly after a kill.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> DomainResult<()> {
        self.close().await;

        match self
            .control
            .kill_rooted_under(&self.config.install_dir, self.config.close_grace())
            .await
        {
            Ok(0) => {}
            Ok(killed) => info!(killed, "terminated lingering runtime processes"),
            Err(err) => warn!(error = %err, "failed to sweep lingering processes"),
        }

        if tokio::fs::try_exists(&self.config.install_dir)
            .await
            .unwrap_or(false)
        {
            self.remove_install_dir().await?;
        }

        let mut record = self.record.lock().await;
        *record = None;
        info!("runtime reset complete");
        Ok(())
    }

    /// Snapshot of the installed-runtime record, if known.
    pub async fn record(&self) -> Option<RuntimeRecord> {
        self.record.lock().await.clone()
    }

    /// Subscribe to out-of-band exits of processes spawned through the
    /// underlying control port.
    pub fn subscribe_exits(&self) -> broadcast::Receiver<Uuid> {
        self.control.subscribe_exits()
    }

    /// Read the locally persisted version marker.
    pub async fn installed_version(&self) -> Option<String> {
        let marker = self.config.install_dir.join(VERSION_MARKER);
        tokio::fs::read_to_string(marker)
            .await
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    async fn remove_install_dir(&self) -> DomainResult<()> {
        let mut delays = ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(250),
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        for attempt in 1..=RESET_DELETE_ATTEMPTS {
            match tokio::fs::remove_dir_all(&self.config.install_dir).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < RESET_DELETE_ATTEMPTS => {
                    let delay = delays
                        .next_backoff()
                        .unwrap_or(std::time::Duration::from_secs(1));
                    warn!(
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "install directory delete failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(DomainError::InstallFailed(format!(
                        "could not delete install directory after {RESET_DELETE_ATTEMPTS} attempts: {err}"
                    )));
                }
            }
        }
        unreachable!("loop either returns Ok or surfaces the final error")
    }

    fn staging_path(&self) -> PathBuf {
        let name = self
            .config
            .install_dir
            .file_name()
            .map_or_else(|| "runtime".to_string(), |n| n.to_string_lossy().to_string());
        match self.config.install_dir.parent() {
            Some(parent) => parent.join(format!("{name}.download")),
            None => PathBuf::from(format!("{name}.download")),
        }
    }

    fn launch_args(&self, headless: bool) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.config.control_port),
            format!("--user-data-dir={}", self.config.profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
        ];
        if headless {
            args.push("--headless=new".to_string());
        }
        args.push(self.config.app_url.clone());
        args
    }
}

impl std::fmt::Debug for RuntimeLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeLifecycle")
            .field("install_dir", &self.config.install_dir)
            .field("control_port", &self.config.control_port)
            .finish_non_exhaustive()
    }
}
