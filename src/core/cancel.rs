//! Cancellation of superseded or abandoned network requests.

use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Hands out one token per logical request purpose.
///
/// Starting a new request cancels the previous one. Tearing the slot down cancels
/// whatever is in flight and every token issued afterwards.
#[derive(Debug, Default)]
pub struct RequestSlot {
    root: CancellationToken,
    current: Mutex<Option<CancellationToken>>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the in-flight request, if any, and returns a token for the next one.
    pub fn begin(&self) -> CancellationToken {
        let token = self.root.child_token();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Cancels the in-flight request without starting a new one.
    pub fn cancel_current(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.take() {
            previous.cancel();
        }
    }

    /// The owning context is gone: cancel everything, now and later.
    pub fn teardown(&self) {
        self.root.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.root.is_cancelled()
    }
}
