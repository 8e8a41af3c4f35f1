//! Session continuity state.
//!
//! Rolling statistics and bounded context caches for one logical translation
//! session. Owned exclusively by the continuity policy; nothing else mutates
//! this state.

use std::collections::VecDeque;
use std::time::Duration;

/// Bounds for the session state windows.
#[derive(Debug, Clone, Copy)]
pub struct SessionBounds {
    /// Retained latency samples (oldest dropped on overflow).
    pub max_latency_samples: usize,
    /// Retained trimmed response tails used as contextual hints.
    pub max_context_tails: usize,
    /// Maximum characters kept per context tail.
    pub max_tail_chars: usize,
    /// Glossary capacity; the oldest-inserted key is evicted on overflow.
    pub max_glossary_entries: usize,
}

impl Default for SessionBounds {
    fn default() -> Self {
        Self {
            max_latency_samples: 10,
            max_context_tails: 3,
            max_tail_chars: 200,
            max_glossary_entries: 50,
        }
    }
}

/// Rolling per-session state: streak counters, latency window, context tails,
/// and the glossary cache.
#[derive(Debug, Clone)]
pub struct SessionState {
    bounds: SessionBounds,
    pub active_conversation: Option<String>,
    pub consecutive_successes: u32,
    pub consecutive_errors: u32,
    response_times: VecDeque<Duration>,
    context_tails: VecDeque<String>,
    // Insertion-ordered so eviction is FIFO, not LRU.
    glossary: VecDeque<(String, String)>,
}

impl SessionState {
    pub fn new(bounds: SessionBounds) -> Self {
        Self {
            bounds,
            active_conversation: None,
            consecutive_successes: 0,
            consecutive_errors: 0,
            response_times: VecDeque::new(),
            context_tails: VecDeque::new(),
            glossary: VecDeque::new(),
        }
    }

    /// Clear every field back to a fresh session.
    pub fn reset(&mut self) {
        self.active_conversation = None;
        self.consecutive_successes = 0;
        self.consecutive_errors = 0;
        self.response_times.clear();
        self.context_tails.clear();
        self.glossary.clear();
    }

    /// Record one response latency, dropping the oldest sample past capacity.
    pub fn push_latency(&mut self, elapsed: Duration) {
        if self.response_times.len() == self.bounds.max_latency_samples {
            self.response_times.pop_front();
        }
        self.response_times.push_back(elapsed);
    }

    pub fn latency_samples(&self) -> usize {
        self.response_times.len()
    }

    /// Mean over the whole latency window, if any samples exist.
    pub fn running_avg(&self) -> Option<Duration> {
        mean(self.response_times.iter())
    }

    /// Mean over the most recent `n` samples, if at least `n` exist.
    pub fn recent_avg(&self, n: usize) -> Option<Duration> {
        if self.response_times.len() < n {
            return None;
        }
        mean(self.response_times.iter().rev().take(n))
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.response_times.back().copied()
    }

    /// Push a response tail into the context window, trimmed to the tail cap.
    pub fn push_context_tail(&mut self, text: &str) {
        let tail = trim_tail(text, self.bounds.max_tail_chars);
        if tail.is_empty() {
            return;
        }
        if self.context_tails.len() == self.bounds.max_context_tails {
            self.context_tails.pop_front();
        }
        self.context_tails.push_back(tail);
    }

    pub fn context_tails(&self) -> impl Iterator<Item = &str> {
        self.context_tails.iter().map(String::as_str)
    }

    /// Insert a glossary pair. An existing key is updated in place (keeping
    /// its insertion position); a new key past capacity evicts the
    /// oldest-inserted entry.
    pub fn glossary_insert(&mut self, term: impl Into<String>, translation: impl Into<String>) {
        let term = term.into();
        let translation = translation.into();

        if let Some(entry) = self.glossary.iter_mut().find(|(t, _)| *t == term) {
            entry.1 = translation;
            return;
        }
        if self.glossary.len() == self.bounds.max_glossary_entries {
            self.glossary.pop_front();
        }
        self.glossary.push_back((term, translation));
    }

    pub fn glossary_len(&self) -> usize {
        self.glossary.len()
    }

    pub fn glossary_get(&self, term: &str) -> Option<&str> {
        self.glossary
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, tr)| tr.as_str())
    }

    pub fn glossary_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.glossary.iter().map(|(t, tr)| (t.as_str(), tr.as_str()))
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SessionBounds::default())
    }
}

fn mean<'a>(samples: impl Iterator<Item = &'a Duration>) -> Option<Duration> {
    let mut total = Duration::ZERO;
    let mut count = 0u32;
    for sample in samples {
        total += *sample;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(total / count)
    }
}

/// Keep the last `max_chars` characters of `text`, trimmed of surrounding
/// whitespace.
fn trim_tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    trimmed
        .chars()
        .skip(count - max_chars)
        .collect::<String>()
        .trim_start()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_window_capped_at_bound() {
        let mut state = SessionState::default();
        for i in 0..15 {
            state.push_latency(Duration::from_millis(100 + i));
        }
        assert_eq!(state.latency_samples(), 10);
        // Oldest five samples were dropped.
        assert_eq!(state.last_latency(), Some(Duration::from_millis(114)));
        assert_eq!(state.running_avg(), Some(Duration::from_micros(109_500)));
    }

    #[test]
    fn test_recent_avg_needs_enough_samples() {
        let mut state = SessionState::default();
        state.push_latency(Duration::from_millis(100));
        state.push_latency(Duration::from_millis(200));
        assert!(state.recent_avg(3).is_none());

        state.push_latency(Duration::from_millis(300));
        assert_eq!(state.recent_avg(3), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_context_tails_bounded_and_trimmed() {
        let mut state = SessionState::default();
        state.push_context_tail(&"x".repeat(500));
        state.push_context_tail("second");
        state.push_context_tail("third");
        state.push_context_tail("fourth");

        let tails: Vec<_> = state.context_tails().collect();
        assert_eq!(tails.len(), 3);
        assert_eq!(tails, vec!["second", "third", "fourth"]);

        let mut state = SessionState::default();
        state.push_context_tail(&"y".repeat(500));
        assert_eq!(state.context_tails().next().unwrap().chars().count(), 200);
    }

    #[test]
    fn test_glossary_fifo_eviction() {
        let mut state = SessionState::default();
        for i in 0..50 {
            state.glossary_insert(format!("term{i}"), format!("tr{i}"));
        }
        assert_eq!(state.glossary_len(), 50);

        // The 51st insert evicts exactly the oldest-inserted key.
        state.glossary_insert("overflow", "tr");
        assert_eq!(state.glossary_len(), 50);
        assert!(state.glossary_get("term0").is_none());
        assert_eq!(state.glossary_get("term1"), Some("tr1"));
        assert_eq!(state.glossary_get("overflow"), Some("tr"));
    }

    #[test]
    fn test_glossary_update_keeps_position() {
        let mut state = SessionState::default();
        state.glossary_insert("alpha", "a");
        state.glossary_insert("beta", "b");
        state.glossary_insert("alpha", "a2");
        assert_eq!(state.glossary_len(), 2);
        assert_eq!(state.glossary_get("alpha"), Some("a2"));
        // alpha kept its original insertion slot.
        let first = state.glossary_entries().next().unwrap();
        assert_eq!(first.0, "alpha");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = SessionState::default();
        state.active_conversation = Some("conv-1".into());
        state.consecutive_successes = 4;
        state.consecutive_errors = 1;
        state.push_latency(Duration::from_millis(100));
        state.push_context_tail("tail");
        state.glossary_insert("term", "tr");

        state.reset();

        assert!(state.active_conversation.is_none());
        assert_eq!(state.consecutive_successes, 0);
        assert_eq!(state.consecutive_errors, 0);
        assert_eq!(state.latency_samples(), 0);
        assert_eq!(state.context_tails().count(), 0);
        assert_eq!(state.glossary_len(), 0);
    }
}
