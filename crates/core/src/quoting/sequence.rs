use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one in-flight validation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Hands out increasing tokens; only the most recently issued one is current.
/// A response carrying an older token has been superseded and must be dropped.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::Acquire) == token.0
    }

    /// Invalidates every outstanding token.
    pub fn cancel_pending(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }
}
