//! Cooperative cancellation shared between a caller and a running scan.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flag a caller flips to abandon an in-flight scan.
///
/// Clones share the same flag. One-shot runs kill their process group when
/// they observe it; session calls stop waiting for their response.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_cancellation() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());

        token.cancel();

        assert!(observer.is_cancelled());
    }
}
