//! Process-wide cooperative cancellation.
//!
//! One `CancelToken` is created in `main` and cloned into every worker
//! thread, DB connection loop, and external-subprocess watcher. Unlike the
//! single-query `QueryTimeout` this replaces, there's no per-token
//! deadline: cancellation is driven either by Ctrl-C or by a worker
//! reporting a fatal failure (spec §5), and observers just poll
//! `is_cancelled`/`check`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    /// Whether anyone has ever registered interest in this token firing
    /// from a background watcher; lets `extsolve` skip spawning a watcher
    /// thread for tokens nobody will ever cancel out-of-band.
    live: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            live: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// True once this token (or a clone) has been marked as having a live
    /// out-of-band watcher, e.g. the process-wide Ctrl-C handler.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    pub fn mark_live(&self) {
        self.live.store(true, Ordering::Relaxed);
    }

    /// Convenience for loops: `cancel.check()?` bails with `Error::Interrupted`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a Ctrl-C handler that cancels `token` and marks it live. Safe to
/// call once per process.
pub fn install_sigint_handler(token: CancelToken) -> Result<()> {
    token.mark_live();
    ctrlc::set_handler(move || token.cancel())
        .map_err(|e| Error::InvariantViolation(format!("failed to install SIGINT handler: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_propagates_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(Error::Interrupted)));
    }

    #[test]
    fn fresh_token_is_not_live() {
        let token = CancelToken::new();
        assert!(!token.is_live());
        token.mark_live();
        assert!(token.is_live());
    }
}
