//! Session Continuity Policy
//!
//! Decides, per work unit, whether the next conversational turn should reuse
//! the existing session or start a fresh one, based on accumulated evidence
//! of degradation: error streaks, success streaks, and latency trends. Also
//! owns adaptive chunk sizing and prompt construction.

use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::models::{PipelineConfig, PolicyConfig, SessionBounds, SessionState};
use crate::domain::ports::PromptPreset;

/// Why the policy asked for a session reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    RunStart,
    ErrorStreak,
    SuccessStreak,
    LatencyDegraded,
    LatencySpike,
}

/// Session continuity policy. Owns the session state exclusively.
pub struct ContinuityPolicy {
    config: PolicyConfig,
    sizing: PipelineConfig,
    preset: PromptPreset,
    state: SessionState,
}

impl ContinuityPolicy {
    pub fn new(config: PolicyConfig, sizing: PipelineConfig, preset: PromptPreset) -> Self {
        let bounds = SessionBounds {
            max_latency_samples: config.max_latency_samples,
            max_context_tails: config.max_context_tails,
            max_tail_chars: config.max_tail_chars,
            max_glossary_entries: config.max_glossary_entries,
        };
        let mut state = SessionState::new(bounds);
        for entry in &preset.glossary {
            state.glossary_insert(entry.term.clone(), entry.translation.clone());
        }
        Self {
            config,
            sizing,
            preset,
            state,
        }
    }

    /// Decide whether the session must be reset before processing `index`.
    ///
    /// Rules are evaluated top to bottom, first match wins. A positive
    /// decision zeroes the streak counter that triggered it.
    pub fn should_reset_before_unit(&mut self, index: usize) -> bool {
        match self.reset_reason(index) {
            Some(reason) => {
                info!(index, ?reason, "session reset requested");
                match reason {
                    ResetReason::RunStart => {}
                    ResetReason::ErrorStreak => self.state.consecutive_errors = 0,
                    ResetReason::SuccessStreak
                    | ResetReason::LatencyDegraded
                    | ResetReason::LatencySpike => self.state.consecutive_successes = 0,
                }
                true
            }
            None => false,
        }
    }

    fn reset_reason(&self, index: usize) -> Option<ResetReason> {
        if index == 0 {
            return Some(ResetReason::RunStart);
        }
        if self.state.consecutive_errors >= self.config.error_streak_reset {
            return Some(ResetReason::ErrorStreak);
        }
        if self.state.consecutive_successes >= self.config.success_streak_reset {
            return Some(ResetReason::SuccessStreak);
        }
        if let (Some(recent), Some(running)) = (
            self.state.recent_avg(self.config.recent_sample_count),
            self.state.running_avg(),
        ) {
            let degraded = recent.as_millis() as f64
                > running.as_millis() as f64 * self.config.latency_degradation_ratio;
            if degraded && recent > self.config.latency_degradation_floor() {
                return Some(ResetReason::LatencyDegraded);
            }
        }
        if let Some(last) = self.state.last_latency() {
            if last > self.config.latency_single_ceiling() {
                return Some(ResetReason::LatencySpike);
            }
        }
        None
    }

    /// Record a successful turn: extend the success streak, break the error
    /// streak, and fold the latency sample into the window.
    pub fn record_success(&mut self, elapsed: Duration) {
        self.state.consecutive_successes += 1;
        self.state.consecutive_errors = 0;
        self.state.push_latency(elapsed);
        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            streak = self.state.consecutive_successes,
            "turn succeeded"
        );
    }

    /// Record a failed turn: extend the error streak, break the success
    /// streak.
    pub fn record_error(&mut self) {
        self.state.consecutive_errors += 1;
        self.state.consecutive_successes = 0;
        debug!(streak = self.state.consecutive_errors, "turn failed");
    }

    /// Current chunk size: degrading latency shrinks future work units to
    /// reduce per-turn risk.
    pub fn optimal_chunk_size(&self) -> usize {
        match self.state.running_avg() {
            Some(avg) if avg.as_millis() as u64 > self.sizing.chunk_slow_latency_ms => {
                self.sizing.chunk_size_small
            }
            Some(avg) if avg.as_millis() as u64 > self.sizing.chunk_degraded_latency_ms => {
                self.sizing.chunk_size_medium
            }
            _ => self.sizing.chunk_size_large,
        }
    }

    /// Build the prompt for one work unit: instructions (caller override or
    /// built-in), glossary pins, recent context tails, then the unit text.
    pub fn build_prompt(&self, text: &str) -> String {
        let mut prompt = String::new();

        match self.preset.instructions.as_deref() {
            Some(instructions) => prompt.push_str(instructions.trim()),
            None => {
                prompt.push_str(&format!(
                    "Translate the following text into {}. \
                     Output only the translation, preserving paragraph breaks.",
                    self.sizing.target_language
                ));
            }
        }
        prompt.push('\n');

        if self.state.glossary_len() > 0 {
            prompt.push_str("\nUse these fixed term translations:\n");
            for (term, translation) in self.state.glossary_entries() {
                prompt.push_str(&format!("- {term} => {translation}\n"));
            }
        }

        if self.state.context_tails().count() > 0 {
            prompt.push_str("\nThe translation so far ended with:\n");
            for tail in self.state.context_tails() {
                prompt.push_str(&format!("…{tail}\n"));
            }
            prompt.push_str("Continue consistently with it.\n");
        }

        prompt.push_str("\nText:\n");
        prompt.push_str(text);
        prompt
    }

    /// Note that a fresh conversation thread was started.
    pub fn begin_conversation(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        self.state.active_conversation = Some(id.clone());
        id
    }

    /// Feed a completed unit's cleaned output into the context-tail window.
    pub fn push_context_tail(&mut self, text: &str) {
        self.state.push_context_tail(text);
    }

    /// Clear all session state back to a fresh run.
    pub fn reset_all(&mut self) {
        self.state.reset();
        for entry in &self.preset.glossary {
            self.state
                .glossary_insert(entry.term.clone(), entry.translation.clone());
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.state.consecutive_errors
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.state.consecutive_successes
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.state.active_conversation.as_deref()
    }
}

impl std::fmt::Debug for ContinuityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuityPolicy")
            .field("consecutive_successes", &self.state.consecutive_successes)
            .field("consecutive_errors", &self.state.consecutive_errors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::GlossaryEntry;

    fn policy() -> ContinuityPolicy {
        ContinuityPolicy::new(
            PolicyConfig::default(),
            PipelineConfig::default(),
            PromptPreset::default(),
        )
    }

    #[test]
    fn test_first_unit_always_resets() {
        let mut p = policy();
        assert!(p.should_reset_before_unit(0));
        // Even with a healthy session.
        p.record_success(Duration::from_millis(800));
        assert!(p.should_reset_before_unit(0));
    }

    #[test]
    fn test_error_streak_resets_then_zeroes() {
        let mut p = policy();
        p.record_error();
        assert!(!p.should_reset_before_unit(1));
        p.record_error();
        assert_eq!(p.consecutive_errors(), 2);
        assert!(p.should_reset_before_unit(2));
        assert_eq!(p.consecutive_errors(), 0);
        assert!(!p.should_reset_before_unit(3));
    }

    #[test]
    fn test_success_streak_resets_independent_of_latency() {
        let mut p = policy();
        for _ in 0..20 {
            p.record_success(Duration::from_millis(500));
        }
        assert!(p.should_reset_before_unit(20));
        assert_eq!(p.consecutive_successes(), 0);
    }

    #[test]
    fn test_latency_degradation_requires_ratio_and_floor() {
        // Recent spike above 1.5x running average and above 3000ms.
        let mut p = policy();
        for _ in 0..5 {
            p.record_success(Duration::from_millis(1_000));
        }
        for _ in 0..3 {
            p.record_success(Duration::from_millis(6_000));
        }
        assert!(p.should_reset_before_unit(9));

        // Same ratio but all under the 3000ms floor: no reset.
        let mut p = policy();
        for _ in 0..5 {
            p.record_success(Duration::from_millis(200));
        }
        for _ in 0..3 {
            p.record_success(Duration::from_millis(900));
        }
        assert!(!p.should_reset_before_unit(9));
    }

    #[test]
    fn test_single_slow_response_resets() {
        let mut p = policy();
        p.record_success(Duration::from_millis(900));
        p.record_success(Duration::from_millis(11_000));
        assert!(p.should_reset_before_unit(2));
    }

    #[test]
    fn test_healthy_session_continues() {
        let mut p = policy();
        for _ in 0..5 {
            p.record_success(Duration::from_millis(1_200));
        }
        assert!(!p.should_reset_before_unit(5));
    }

    #[test]
    fn test_chunk_size_shrinks_with_latency() {
        let mut p = policy();
        assert_eq!(p.optimal_chunk_size(), 5_000);

        for _ in 0..10 {
            p.record_success(Duration::from_millis(4_000));
        }
        assert_eq!(p.optimal_chunk_size(), 3_500);

        for _ in 0..10 {
            p.record_success(Duration::from_millis(8_000));
        }
        assert_eq!(p.optimal_chunk_size(), 2_000);
    }

    #[test]
    fn test_success_breaks_error_streak() {
        let mut p = policy();
        p.record_error();
        p.record_success(Duration::from_millis(500));
        assert_eq!(p.consecutive_errors(), 0);
        assert_eq!(p.consecutive_successes(), 1);
    }

    #[test]
    fn test_prompt_includes_glossary_and_tails() {
        let preset = PromptPreset {
            instructions: None,
            glossary: vec![GlossaryEntry {
                term: "魔王".into(),
                translation: "Demon Lord".into(),
            }],
        };
        let mut p = ContinuityPolicy::new(
            PolicyConfig::default(),
            PipelineConfig::default(),
            preset,
        );
        p.push_context_tail("and so the journey began.");

        let prompt = p.build_prompt("次の章");
        assert!(prompt.contains("魔王 => Demon Lord"));
        assert!(prompt.contains("and so the journey began."));
        assert!(prompt.contains("次の章"));
        assert!(prompt.contains("English"));
    }

    #[test]
    fn test_instruction_override_replaces_builtin() {
        let preset = PromptPreset {
            instructions: Some("Translate into pirate speak.".into()),
            glossary: vec![],
        };
        let p = ContinuityPolicy::new(
            PolicyConfig::default(),
            PipelineConfig::default(),
            preset,
        );
        let prompt = p.build_prompt("hello");
        assert!(prompt.contains("pirate speak"));
        assert!(!prompt.contains("Output only the translation"));
    }
}
