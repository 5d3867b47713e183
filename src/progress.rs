//! Progress reporting for long-running pulls.
//!
//! Console rendering lives outside this crate: only the interface and a
//! no-op default live here, so a pull can report progress through a
//! single-method trait without this crate depending on any particular
//! way of displaying it.

use std::fmt;

/// A snapshot of pull progress, derived from the object store's own
/// progress reporting.
#[derive(Debug, Clone, Default)]
pub struct PullState {
    /// Objects transferred so far.
    pub transferred: u64,
    /// Total objects the puller expects to transfer, if known.
    pub total: Option<u64>,
    /// Bytes transferred so far.
    pub bytes_transferred: u64,
}

impl fmt::Display for PullState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "{}/{} objects, {} bytes", self.transferred, total, self.bytes_transferred),
            None => write!(f, "{} objects, {} bytes", self.transferred, self.bytes_transferred),
        }
    }
}

/// Receives progress updates during [`crate::deploy::Engine::pull`].
///
/// Implemented by callers that want to render progress; a console renderer
/// is one such implementation and lives outside this crate.
pub trait Progress {
    /// Called whenever the underlying pull reports new progress.
    fn progress(&self, state: &PullState);
}

/// A [`Progress`] implementation that discards every update. Used when the
/// caller does not care to observe pull progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn progress(&self, _state: &PullState) {}
}
