//! Cooperative cancellation threaded through long-running operations.
//!
//! The engine is single-threaded and synchronous: there is no task to
//! abort, only a flag polled at I/O suspension points (network fetch,
//! filesystem read/write/rename/enumerate, subprocess spawn).

use ostree::gio;

use crate::error::Error;

/// A cancellation handle, cheap to clone and pass by reference through an
/// operation's call tree.
#[derive(Clone)]
pub struct Cancellable(gio::Cancellable);

impl Default for Cancellable {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellable {
    /// A handle that is never cancelled.
    pub fn new() -> Self {
        Cancellable(gio::Cancellable::new())
    }

    /// Request cancellation. Already-completed operations are unaffected;
    /// an operation that checked [`Cancellable::check`] before this call
    /// will run to its next checkpoint.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// True if [`Cancellable::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Return `Err(Error::Cancelled)` if cancelled, tagged with `context`.
    pub fn check(&self, context: impl Into<String>) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled {
                context: context.into(),
            })
        } else {
            Ok(())
        }
    }

    /// Borrow the underlying `gio::Cancellable` for APIs (like
    /// `ostree::Repo`) that expect one directly.
    pub fn as_gio(&self) -> &gio::Cancellable {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handle_not_cancelled() {
        let c = Cancellable::new();
        assert!(!c.is_cancelled());
        assert!(c.check("op").is_ok());
    }

    #[test]
    fn cancel_is_observed() {
        let c = Cancellable::new();
        c.cancel();
        assert!(c.is_cancelled());
        let e = c.check("op").unwrap_err();
        assert_eq!(e.kind(), crate::error::ErrorKind::Cancelled);
    }
}
