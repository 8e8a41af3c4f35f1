//! Completion Detector
//!
//! Classifies the outcome of one conversational turn from periodic samples
//! of the interface. The target surface offers no completion event, so the
//! detector polls, and because streaming responses pause mid-generation and
//! rendering lags the underlying model, a turn only counts as complete after
//! several consecutive quiet samples with unchanged text.

use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::application::cancel::CancelFlag;
use crate::domain::models::{DetectorConfig, SurfaceObservation, TurnOutcome};
use crate::domain::ports::AutomationSurface;

/// Error-banner phrasings that classify a turn as failed. Matched as
/// case-insensitive substrings.
const FAILURE_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "something went wrong",
    "an error occurred",
    "network error",
    "i can't assist",
    "i cannot assist",
    "unable to help with",
];

/// Observable phase of the detection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    Idle,
    Sending,
    Generating,
    Stabilizing,
}

/// Polling-based turn completion detector.
pub struct CompletionDetector {
    config: DetectorConfig,
    failure_patterns: Vec<String>,
}

impl CompletionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            failure_patterns: FAILURE_PATTERNS.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    /// Deadline for one turn, measured from send.
    pub fn response_deadline(&self) -> Duration {
        self.config.response_deadline()
    }

    /// Replace the failure-pattern set (lowercased substrings).
    pub fn with_failure_patterns(mut self, patterns: Vec<String>) -> Self {
        self.failure_patterns = patterns
            .into_iter()
            .map(|p| p.to_lowercase())
            .collect();
        self
    }

    /// Watch the surface until the in-flight turn reaches a terminal state.
    ///
    /// Call immediately after the prompt has been sent. Yields between
    /// samples; this is the only place the orchestration truly waits.
    #[instrument(skip(self, surface, cancel))]
    pub async fn await_turn(
        &self,
        surface: &dyn AutomationSurface,
        cancel: &CancelFlag,
    ) -> TurnOutcome {
        let started = Instant::now();
        let mut phase = DetectorPhase::Sending;
        let mut stable_samples: u32 = 0;
        let mut candidate = String::new();

        loop {
            if cancel.is_cancelled() {
                debug!("cancellation observed mid-turn");
                return TurnOutcome::Cancelled;
            }

            if started.elapsed() >= self.config.response_deadline() {
                warn!(
                    elapsed_secs = started.elapsed().as_secs(),
                    "turn deadline exceeded, stopping generation"
                );
                if let Err(err) = surface.stop_generation().await {
                    warn!(error = %err, "best-effort stop failed");
                }
                return TurnOutcome::Timeout;
            }

            match surface.observe().await {
                Ok(observation) => {
                    if let Some(message) = self.match_failure(&observation) {
                        debug!(banner = %message, "error banner observed");
                        return TurnOutcome::GenerationError { message };
                    }

                    if observation.busy {
                        // Still generating: any stability progress is void.
                        phase = DetectorPhase::Generating;
                        stable_samples = 0;
                        candidate = observation.latest_text;
                    } else {
                        if phase == DetectorPhase::Sending {
                            // Busy was never observable for this turn.
                            phase = DetectorPhase::Generating;
                        }
                        if !candidate.is_empty() && observation.latest_text == candidate {
                            stable_samples += 1;
                        } else {
                            // New or changed text starts a fresh unchanged run.
                            candidate = observation.latest_text;
                            stable_samples = u32::from(!candidate.is_empty());
                        }
                        if stable_samples > 0 {
                            phase = DetectorPhase::Stabilizing;
                        }
                        if stable_samples >= self.config.stability_threshold {
                            debug!(
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                chars = candidate.chars().count(),
                                "turn stabilized"
                            );
                            return TurnOutcome::Success {
                                text: candidate,
                                elapsed: started.elapsed(),
                            };
                        }
                    }
                }
                Err(err) => {
                    // Transient DOM churn; the deadline bounds how long this
                    // can go on.
                    warn!(error = %err, ?phase, "observation failed, skipping sample");
                }
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Match the observation's error banner against the failure-pattern set.
    fn match_failure(&self, observation: &SurfaceObservation) -> Option<String> {
        let banner = observation.error_banner.as_deref()?;
        let lowered = banner.to_lowercase();
        if self
            .failure_patterns
            .iter()
            .any(|pattern| lowered.contains(pattern.as_str()))
        {
            Some(banner.to_string())
        } else {
            debug!(banner, "banner did not match any failure pattern, ignoring");
            None
        }
    }
}

impl std::fmt::Debug for CompletionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionDetector")
            .field("poll_interval_ms", &self.config.poll_interval_ms)
            .field("stability_threshold", &self.config.stability_threshold)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> CompletionDetector {
        CompletionDetector::new(DetectorConfig::default())
    }

    #[test]
    fn test_matches_rate_limit_banner() {
        let observation = SurfaceObservation::error("Rate limit reached for this model");
        assert_eq!(
            detector().match_failure(&observation).as_deref(),
            Some("Rate limit reached for this model")
        );
    }

    #[test]
    fn test_matches_refusal_banner_case_insensitive() {
        let observation = SurfaceObservation::error("I CAN'T assist with that request");
        assert!(detector().match_failure(&observation).is_some());
    }

    #[test]
    fn test_unknown_banner_is_ignored() {
        let observation = SurfaceObservation::error("cookie consent required");
        assert!(detector().match_failure(&observation).is_none());
    }

    #[test]
    fn test_no_banner_no_failure() {
        let observation = SurfaceObservation::idle("done");
        assert!(detector().match_failure(&observation).is_none());
    }

    #[test]
    fn test_custom_patterns_replace_defaults() {
        let detector = detector().with_failure_patterns(vec!["QUOTA".to_string()]);
        assert!(detector
            .match_failure(&SurfaceObservation::error("quota exceeded"))
            .is_some());
        assert!(detector
            .match_failure(&SurfaceObservation::error("rate limit"))
            .is_none());
    }
}
