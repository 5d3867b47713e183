//! Installation root handles, including the process-wide user/system
//! singletons: identity is keyed by a fixed path, so a lazily-initialized
//! handle per scope is sufficient.

use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::OnceCell;

use crate::overrides::Scope;

const SYSTEM_BASE: &str = "/var/lib/depot";
const INSTALLATION_NAME: &str = "depot";

/// An installation root: either the per-user store or the shared
/// system-wide store. Construction takes `(path, scope)`; no polymorphism
/// is needed since the two scopes differ only in default base path and
/// object store mode.
#[derive(Debug, Clone)]
pub struct Installation {
    base: Utf8PathBuf,
    scope: Scope,
}

impl Installation {
    /// Construct a handle for an arbitrary base path. Most callers want
    /// [`Installation::user`] or [`Installation::system`] instead.
    pub fn new(base: impl Into<Utf8PathBuf>, scope: Scope) -> Self {
        Installation {
            base: base.into(),
            scope,
        }
    }

    /// The process-wide per-user installation handle, rooted under
    /// `$XDG_DATA_HOME` (or `~/.local/share` if unset).
    pub fn user() -> &'static Installation {
        static USER: OnceCell<Installation> = OnceCell::new();
        USER.get_or_init(|| Installation::new(user_base(), Scope::User))
    }

    /// The process-wide system-wide installation handle.
    pub fn system() -> &'static Installation {
        static SYSTEM: OnceCell<Installation> = OnceCell::new();
        SYSTEM.get_or_init(|| Installation::new(SYSTEM_BASE, Scope::System))
    }

    /// The installation's base directory.
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    /// Whether this is the user or system installation.
    pub fn scope(&self) -> Scope {
        self.scope
    }
}

fn user_base() -> Utf8PathBuf {
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .map(Utf8PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| Utf8PathBuf::from(home).join(".local/share"))
        })
        .unwrap_or_else(|| Utf8PathBuf::from("."));
    data_home.join(INSTALLATION_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_and_system_are_distinct_singletons() {
        let a = Installation::user();
        let b = Installation::user();
        assert_eq!(a.base(), b.base());
        assert_ne!(Installation::user().base(), Installation::system().base());
        assert_eq!(Installation::system().base(), Utf8Path::new(SYSTEM_BASE));
    }
}
