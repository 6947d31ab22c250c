//! Process-wide abort flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Set-once abort request shared between signal handlers and the step loop
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    set: AtomicBool,
    reason: OnceLock<String>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort; returns `true` only for the first request
    pub fn request(&self, reason: &str) -> bool {
        let first = self.inner.reason.set(reason.to_string()).is_ok();
        self.inner.set.store(true, Ordering::SeqCst);
        if first {
            tracing::info!(reason, "abort requested");
        }
        first
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::SeqCst)
    }

    /// Reason given by the first request
    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.get().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let flag = AbortFlag::new();
        assert!(!flag.is_set());
        let handle = flag.clone();
        assert!(handle.request("SIGTERM"));
        assert!(!flag.request("SIGINT"));
        assert!(flag.is_set());
        assert_eq!(flag.reason(), Some("SIGTERM"));
    }
}
