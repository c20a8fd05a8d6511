use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::info;

/// Shared stop flag checked by the scrobbler between sleep quanta.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancels this token on SIGINT or SIGTERM.
    pub fn cancel_on_signal(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if !token.cancelled.swap(true, Ordering::SeqCst) {
                info!("Received stop signal, shutting down");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!handle.is_cancelled());
        token.cancel();
        assert!(handle.is_cancelled());
    }
}
