//! Cooperative shutdown flag

use crate::BridgeResult;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::info;

/// Shared stop request, observed by the poll loop between reads.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    /// Routes SIGINT and SIGTERM to [`request`](Self::request).
    ///
    /// Can only be installed once per process.
    pub fn install_signal_handler(&self) -> BridgeResult<()> {
        let requested = Arc::clone(&self.requested);
        ctrlc::set_handler(move || {
            info!("Termination signal received, stopping after the current read");
            requested.store(true, Ordering::Relaxed);
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_visible_to_clones() {
        let signal = ShutdownSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_requested());
        signal.request();
        assert!(observer.is_requested());
    }
}
