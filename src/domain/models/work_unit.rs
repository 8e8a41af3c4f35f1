//! Work units, interface observations, and turn outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One bounded slice of the overall input text, submitted as a single
/// conversational turn. Immutable after creation; consumed in strict
/// ascending index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub index: usize,
    pub source_text: String,
}

impl WorkUnit {
    pub fn new(index: usize, source_text: impl Into<String>) -> Self {
        Self {
            index,
            source_text: source_text.into(),
        }
    }

    pub fn char_count(&self) -> usize {
        self.source_text.chars().count()
    }
}

/// One polled sample of the conversational interface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SurfaceObservation {
    /// Whether the interface reports a response still being generated.
    pub busy: bool,
    /// The latest visible response text.
    pub latest_text: String,
    /// Error banner text, when the interface displays one.
    pub error_banner: Option<String>,
}

impl SurfaceObservation {
    /// A busy sample, optionally with partial streamed text.
    pub fn busy(latest_text: impl Into<String>) -> Self {
        Self {
            busy: true,
            latest_text: latest_text.into(),
            error_banner: None,
        }
    }

    /// A quiet sample showing the given response text.
    pub fn idle(latest_text: impl Into<String>) -> Self {
        Self {
            busy: false,
            latest_text: latest_text.into(),
            error_banner: None,
        }
    }

    /// A sample with an error banner displayed.
    pub fn error(banner: impl Into<String>) -> Self {
        Self {
            busy: false,
            latest_text: String::new(),
            error_banner: Some(banner.into()),
        }
    }
}

/// Terminal classification of a single conversational turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The response stabilized; `text` is the final response.
    Success { text: String, elapsed: Duration },
    /// The interface surfaced a model-side failure or refusal.
    GenerationError { message: String },
    /// The turn exceeded the response deadline.
    Timeout,
    /// Cancellation was requested externally.
    Cancelled,
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Serializable partial results written alongside an interrupted run so the
/// pipeline can resume from where it stopped.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialResults {
    pub completed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_constructors() {
        assert!(SurfaceObservation::busy("partial").busy);
        assert!(!SurfaceObservation::idle("done").busy);
        assert_eq!(
            SurfaceObservation::error("rate limit").error_banner.as_deref(),
            Some("rate limit")
        );
    }

    #[test]
    fn test_outcome_success() {
        let outcome = TurnOutcome::Success {
            text: "hola".into(),
            elapsed: Duration::from_millis(1200),
        };
        assert!(outcome.is_success());
        assert!(!TurnOutcome::Timeout.is_success());
    }

    #[test]
    fn test_unit_char_count() {
        let unit = WorkUnit::new(0, "héllo");
        assert_eq!(unit.char_count(), 5);
    }
}
