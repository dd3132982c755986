//! Cooperative cancellation for long-running extraction work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{ArchiveError, Result};

/// A cancellation token shared between the caller and in-progress extraction
/// work. Extractors check it at every entry boundary; a fired token surfaces
/// as [`ArchiveError::Canceled`], never as an I/O error.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// A fresh, unsignaled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the token. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether the token has been signaled.
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Bails out with [`ArchiveError::Canceled`] if the token has fired.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_canceled() {
            Err(ArchiveError::Canceled)
        } else {
            Ok(())
        }
    }
}
