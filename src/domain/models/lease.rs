//! Ownership lease over the single automation-controlled browser runtime.
//!
//! Exactly one internal client may hold the lease at any instant. Transitions
//! are published to observers in the order they occur.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal clients that compete for exclusive use of the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseHolder {
    /// The chunked batch translation pipeline.
    BatchTranslator,
    /// The interactive chat passthrough.
    InteractiveChat,
}

impl LeaseHolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchTranslator => "batch_translator",
            Self::InteractiveChat => "interactive_chat",
        }
    }
}

impl std::fmt::Display for LeaseHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A change of lease ownership.
///
/// `previous == None` means the lease was vacant; `next == None` means it
/// became vacant (explicit release, forced release, or the runtime exiting
/// out-of-band).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseTransition {
    pub previous: Option<LeaseHolder>,
    pub next: Option<LeaseHolder>,
    pub at: DateTime<Utc>,
}

impl LeaseTransition {
    pub fn new(previous: Option<LeaseHolder>, next: Option<LeaseHolder>) -> Self {
        Self {
            previous,
            next,
            at: Utc::now(),
        }
    }

    /// True when this transition vacated the lease.
    pub fn is_vacated(&self) -> bool {
        self.previous.is_some() && self.next.is_none()
    }
}
