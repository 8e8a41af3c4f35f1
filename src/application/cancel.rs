//! Cooperative cancellation flag.
//!
//! Checked at work-unit boundaries and once per completion-polling sample,
//! so a cancellation request may take up to one polling interval to land.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation flag shared between a running pipeline and its
/// controller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_across_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());

        flag.cancel();
        assert!(observer.is_cancelled());

        // Idempotent.
        flag.cancel();
        assert!(observer.is_cancelled());
    }
}
