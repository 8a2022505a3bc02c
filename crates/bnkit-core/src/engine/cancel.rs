//! Cooperative cancellation.
//!
//! Long-running enumerations and searches poll a [`CancellationToken`] at every
//! produced element or expansion. A cancelled operation stops and reports that no
//! further work is available; it does not return an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. Cloning shares the flag.
///
/// The default token can never be cancelled and costs nothing to poll.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Option<Arc<AtomicBool>>,
}

impl CancellationToken {
    /// Creates a token that can be cancelled through [`cancel`](Self::cancel).
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { flag: None }
    }

    /// Requests cancellation. No-op on a [`never`](Self::never) token.
    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
