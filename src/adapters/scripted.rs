//! Scripted adapters for simulation.
//!
//! A scripted automation surface driven by queued observation sequences and
//! an in-memory process control. These back the orchestration test suites
//! and the CLI's `translate --dry-run` rehearsal mode.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RuntimeHandle, RuntimeManifest, SurfaceObservation};
use crate::domain::ports::{AutomationSurface, ProcessControl};

/// The observation sequence one turn plays back. The last observation
/// repeats once the script is exhausted.
#[derive(Debug, Clone)]
pub struct TurnScript {
    observations: Vec<SurfaceObservation>,
}

impl TurnScript {
    pub fn new(observations: Vec<SurfaceObservation>) -> Self {
        Self { observations }
    }

    /// A turn that generates briefly, then stabilizes on `text`.
    pub fn completes_with(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(vec![
            SurfaceObservation::busy(""),
            SurfaceObservation::idle(text.clone()),
            SurfaceObservation::idle(text.clone()),
            SurfaceObservation::idle(text),
        ])
    }

    /// A turn that starts generating, then shows an error banner.
    pub fn errors_with(banner: impl Into<String>) -> Self {
        Self::new(vec![
            SurfaceObservation::busy(""),
            SurfaceObservation::error(banner),
        ])
    }
}

/// Scripted conversational surface.
///
/// Each `click_send` arms the next queued [`TurnScript`]; `observe` then
/// plays it back one sample at a time.
#[derive(Default)]
pub struct ScriptedSurface {
    turns: Mutex<VecDeque<TurnScript>>,
    current: Mutex<VecDeque<SurfaceObservation>>,
    last_observation: Mutex<SurfaceObservation>,
    written: Mutex<Vec<String>>,
    sends: AtomicU32,
    observes: AtomicU32,
    resets: AtomicU32,
    stops: AtomicU32,
    fail_write: AtomicBool,
    fail_send: AtomicBool,
    reject_send: AtomicBool,
    echo: AtomicBool,
}

impl ScriptedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface that answers every send by echoing back the text portion of
    /// the prompt, as an identity "translation".
    pub fn echoing() -> Self {
        let surface = Self::default();
        surface.echo.store(true, Ordering::SeqCst);
        surface
    }

    pub fn with_turns(self, turns: Vec<TurnScript>) -> Self {
        *self.turns.lock().expect("turn queue poisoned") = turns.into();
        self
    }

    pub fn push_turn(&self, script: TurnScript) {
        self.turns.lock().expect("turn queue poisoned").push_back(script);
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_send(&self, reject: bool) {
        self.reject_send.store(reject, Ordering::SeqCst);
    }

    /// Every prompt written so far.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().expect("written log poisoned").clone()
    }

    pub fn send_count(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn observe_count(&self) -> u32 {
        self.observes.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> u32 {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    fn arm_next_turn(&self) {
        let script = if self.echo.load(Ordering::SeqCst) {
            let prompt = self
                .written
                .lock()
                .expect("written log poisoned")
                .last()
                .cloned()
                .unwrap_or_default();
            TurnScript::completes_with(extract_prompt_text(&prompt))
        } else if let Some(script) = self
            .turns
            .lock()
            .expect("turn queue poisoned")
            .pop_front()
        {
            script
        } else {
            // Nothing scripted: stay quiet and let the deadline decide.
            TurnScript::new(vec![])
        };
        *self.current.lock().expect("current script poisoned") = script.observations.into();
    }
}

#[async_trait]
impl AutomationSurface for ScriptedSurface {
    async fn write_input(&self, text: &str) -> DomainResult<()> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(DomainError::UploadFailed("input box not found".to_string()));
        }
        self.written
            .lock()
            .expect("written log poisoned")
            .push(text.to_string());
        Ok(())
    }

    async fn click_send(&self) -> DomainResult<bool> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(DomainError::SendFailed("send button not found".to_string()));
        }
        if self.reject_send.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.arm_next_turn();
        Ok(true)
    }

    async fn observe(&self) -> DomainResult<SurfaceObservation> {
        self.observes.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.lock().expect("current script poisoned");
        let observation = match current.pop_front() {
            Some(observation) => {
                *self.last_observation.lock().expect("last observation poisoned") =
                    observation.clone();
                observation
            }
            None => self
                .last_observation
                .lock()
                .expect("last observation poisoned")
                .clone(),
        };
        Ok(observation)
    }

    async fn reset_conversation(&self) -> DomainResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_generation(&self) -> DomainResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Pull the text portion back out of a built prompt (used by echo mode).
fn extract_prompt_text(prompt: &str) -> String {
    prompt
        .rsplit_once("\nText:\n")
        .map_or(prompt, |(_, text)| text)
        .trim()
        .to_string()
}

/// In-memory process control: versions, archives, and processes simulated
/// without touching a real distribution endpoint or spawning anything.
pub struct ScriptedProcessControl {
    manifest: Mutex<RuntimeManifest>,
    executable_name: String,
    alive: Mutex<HashMap<Uuid, u32>>,
    kills: Mutex<Vec<Uuid>>,
    downloads: AtomicU32,
    extracts: AtomicU32,
    spawns: AtomicU32,
    fail_download: AtomicBool,
    fail_spawn: AtomicBool,
    next_pid: AtomicU32,
    exits: broadcast::Sender<Uuid>,
}

impl ScriptedProcessControl {
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        let (exits, _) = broadcast::channel(16);
        Self {
            manifest: Mutex::new(RuntimeManifest {
                archive_url: format!("https://dist.invalid/runtime-{version}.zip"),
                version,
            }),
            executable_name: "chromium".to_string(),
            alive: Mutex::new(HashMap::new()),
            kills: Mutex::new(Vec::new()),
            downloads: AtomicU32::new(0),
            extracts: AtomicU32::new(0),
            spawns: AtomicU32::new(0),
            fail_download: AtomicBool::new(false),
            fail_spawn: AtomicBool::new(false),
            next_pid: AtomicU32::new(40_000),
            exits,
        }
    }

    /// Advance the remotely advertised version.
    pub fn publish_version(&self, version: impl Into<String>) {
        let version = version.into();
        let mut manifest = self.manifest.lock().expect("manifest poisoned");
        manifest.archive_url = format!("https://dist.invalid/runtime-{version}.zip");
        manifest.version = version;
    }

    pub fn set_fail_download(&self, fail: bool) {
        self.fail_download.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_spawn(&self, fail: bool) {
        self.fail_spawn.store(fail, Ordering::SeqCst);
    }

    pub fn download_count(&self) -> u32 {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn extract_count(&self) -> u32 {
        self.extracts.load(Ordering::SeqCst)
    }

    pub fn spawn_count(&self) -> u32 {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn killed(&self) -> Vec<Uuid> {
        self.kills.lock().expect("kill log poisoned").clone()
    }

    /// Simulate the process dying without anyone calling `kill`: the user
    /// closed the window, the OS reaped it.
    pub fn close_externally(&self, handle: &RuntimeHandle) {
        self.alive.lock().expect("alive set poisoned").remove(&handle.id);
        let _ = self.exits.send(handle.id);
    }
}

#[async_trait]
impl ProcessControl for ScriptedProcessControl {
    async fn fetch_manifest(&self, _url: &str) -> DomainResult<RuntimeManifest> {
        Ok(self.manifest.lock().expect("manifest poisoned").clone())
    }

    async fn download(&self, _url: &str, dest: &Path) -> DomainResult<()> {
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(DomainError::InstallFailed(
                "download interrupted".to_string(),
            ));
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, b"scripted-archive").await?;
        Ok(())
    }

    async fn extract(&self, _archive: &Path, dir: &Path) -> DomainResult<()> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(&self.executable_name), b"scripted-binary").await?;
        Ok(())
    }

    async fn spawn(&self, _executable: &Path, _args: &[String]) -> DomainResult<RuntimeHandle> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(DomainError::LaunchFailed("spawn refused".to_string()));
        }
        self.spawns.fetch_add(1, Ordering::SeqCst);
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let handle = RuntimeHandle::new(Some(pid));
        self.alive
            .lock()
            .expect("alive set poisoned")
            .insert(handle.id, pid);
        Ok(handle)
    }

    async fn is_alive(&self, handle: &RuntimeHandle) -> bool {
        self.alive
            .lock()
            .expect("alive set poisoned")
            .contains_key(&handle.id)
    }

    async fn kill(&self, handle: &RuntimeHandle, _grace: Duration) -> DomainResult<()> {
        self.alive.lock().expect("alive set poisoned").remove(&handle.id);
        self.kills.lock().expect("kill log poisoned").push(handle.id);
        Ok(())
    }

    async fn kill_rooted_under(&self, _dir: &Path, _grace: Duration) -> DomainResult<usize> {
        let mut alive = self.alive.lock().expect("alive set poisoned");
        let count = alive.len();
        let mut kills = self.kills.lock().expect("kill log poisoned");
        kills.extend(alive.keys().copied());
        alive.clear();
        Ok(count)
    }

    fn subscribe_exits(&self) -> broadcast::Receiver<Uuid> {
        self.exits.subscribe()
    }
}
