//! Shared helpers for the integration suites.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use dragoman::adapters::ScriptedProcessControl;
use dragoman::application::{OwnershipArbiter, RuntimeLifecycle};
use dragoman::domain::models::{DetectorConfig, RuntimeConfig};

/// Detector configuration tuned for tests: millisecond polling, sub-second
/// deadline, production stability threshold.
pub fn fast_detector_config() -> DetectorConfig {
    DetectorConfig {
        poll_interval_ms: 2,
        stability_threshold: 3,
        response_deadline_ms: 2_000,
    }
}

/// Runtime configuration rooted inside a temp directory.
pub fn runtime_config_in(dir: &Path) -> RuntimeConfig {
    RuntimeConfig {
        install_dir: dir.join("runtime"),
        profile_dir: dir.join("profile"),
        ..RuntimeConfig::default()
    }
}

/// A lifecycle plus arbiter wired over a scripted process control.
pub fn arbiter_fixture(
    dir: &Path,
    version: &str,
) -> (Arc<ScriptedProcessControl>, Arc<RuntimeLifecycle>, Arc<OwnershipArbiter>) {
    let control = Arc::new(ScriptedProcessControl::new(version));
    let lifecycle = Arc::new(RuntimeLifecycle::new(
        Arc::clone(&control) as Arc<dyn dragoman::domain::ports::ProcessControl>,
        runtime_config_in(dir),
    ));
    let arbiter = Arc::new(OwnershipArbiter::new(Arc::clone(&lifecycle)));
    (control, lifecycle, arbiter)
}
