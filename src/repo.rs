//! Thin wrapper over the content-addressed object repository (`repo/`).
//!
//! This module owns the `ostree::Repo` handle and translates its glib-error
//! surface into this crate's [`Error`] taxonomy. It does not interpret
//! commits or trees beyond what `ostree::Repo` already exposes structurally
//! — see [`crate::fetch`] and [`crate::metaprefetch`] for direct wire-format
//! parsing used to bypass a full pull.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use ostree::gio;

use crate::cancel::Cancellable;
use crate::error::{Error, Result};
use crate::overrides::Scope;
use crate::refs;

/// How a checkout should preserve ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    /// Preserve uid/gid of the calling user (used for user installations).
    User,
    /// No ownership remapping (used for system installations, bare repos).
    None,
}

/// Counts returned by [`Adapter::prune`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneStats {
    /// Total objects examined.
    pub total: u64,
    /// Objects removed.
    pub pruned: u64,
    /// Bytes freed.
    pub freed_bytes: u64,
}

/// A handle onto one installation's object store.
pub struct Adapter {
    base: Utf8PathBuf,
    scope: Scope,
    repo: ostree::Repo,
}

impl Adapter {
    /// Create the base directory if missing, then open `repo/` if it
    /// exists, or create a new repository (`bare-user` for user
    /// installations, `bare` for system installations) otherwise. On
    /// create failure the partially created `repo/` is removed.
    pub fn ensure(base: &Utf8Path, scope: Scope) -> Result<Self> {
        let ctx = || format!("Ensuring repository at {base}");
        std::fs::create_dir_all(base.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))?;

        let repo_path = refs::repo_dir(base);
        let repo_file = gio::File::for_path(repo_path.as_std_path());
        let repo = ostree::Repo::new(&repo_file);

        if repo_path.exists() {
            repo.open(gio::Cancellable::NONE)
                .map_err(|e| Error::io(ctx(), e.into()))?;
        } else {
            let mode = match scope {
                Scope::User => ostree::RepoMode::BareUser,
                Scope::System => ostree::RepoMode::Bare,
            };
            if let Err(e) = repo.create(mode, gio::Cancellable::NONE) {
                let _ = std::fs::remove_dir_all(repo_path.as_std_path());
                return Err(Error::io(ctx(), e.into()));
            }
        }

        Ok(Adapter {
            base: base.to_owned(),
            scope,
            repo,
        })
    }

    /// Borrow the underlying `ostree::Repo`, for callers that need lower
    /// level access than this adapter exposes.
    pub fn inner(&self) -> &ostree::Repo {
        &self.repo
    }

    /// Pull `ref_str` from `remote` into the local store with default
    /// flags. `cancellable` is polled by the pull itself, so a cancel
    /// requested mid-transfer is observed inside the call, not only
    /// before/after it.
    pub fn pull(&self, remote: &str, ref_str: &str, cancellable: &Cancellable) -> Result<()> {
        let ctx = || format!("While pulling {ref_str} from {remote}");
        self.repo
            .pull(remote, &[ref_str], ostree::RepoPullFlags::NONE, Some(cancellable.as_gio()))
            .map_err(|e| Error::io(ctx(), e.into()))
    }

    /// Pull a single checksum from `remote`, bypassing ref resolution.
    pub fn pull_commit(&self, remote: &str, checksum: &str, cancellable: &Cancellable) -> Result<()> {
        let ctx = || format!("While pulling {checksum} from {remote}");
        self.repo
            .pull(remote, &[checksum], ostree::RepoPullFlags::NONE, Some(cancellable.as_gio()))
            .map_err(|e| Error::io(ctx(), e.into()))
    }

    /// Translate a symbolic ref to a checksum.
    pub fn resolve(&self, ref_str: &str) -> Result<String> {
        let ctx = || format!("Resolving {ref_str}");
        self.repo
            .resolve_rev(ref_str, true)
            .map_err(|e| Error::io(ctx(), e.into()))?
            .map(|s| s.to_string())
            .ok_or_else(|| Error::not_found(ctx(), format!("no such ref {ref_str}")))
    }

    /// Open the root tree of `checksum` without checking it out.
    pub fn read_commit(&self, checksum: &str) -> Result<gio::File> {
        let ctx = || format!("Reading commit {checksum}");
        let (root, _checksum) = self
            .repo
            .read_commit(checksum, gio::Cancellable::NONE)
            .map_err(|e| Error::not_found(ctx(), e.to_string()))?;
        Ok(root)
    }

    /// True if `checksum` is present in the local store (commit object
    /// loads successfully).
    pub fn has_commit(&self, checksum: &str) -> bool {
        self.repo.load_commit(checksum).is_ok()
    }

    /// Materialize `checksum` into `dest`. Fails if `dest` already exists
    /// (overwrite policy is "none").
    pub fn checkout_tree(
        &self,
        checksum: &str,
        dest: &Utf8Path,
        mode: CheckoutMode,
        cancellable: &Cancellable,
    ) -> Result<()> {
        let ctx = || format!("Checking out {checksum} to {dest}");
        if dest.exists() {
            return Err(Error::io(
                ctx(),
                anyhow::anyhow!("destination {dest} already exists"),
            ));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))?;
        }
        let checkout_mode = match mode {
            CheckoutMode::User => ostree::RepoCheckoutMode::User,
            CheckoutMode::None => ostree::RepoCheckoutMode::None,
        };
        let options = ostree::RepoCheckoutAtOptions {
            mode: checkout_mode,
            overwrite_mode: ostree::RepoCheckoutOverwriteMode::None,
            ..Default::default()
        };
        self.repo
            .checkout_at(
                Some(&options),
                libc::AT_FDCWD,
                dest.as_str(),
                checksum,
                Some(cancellable.as_gio()),
            )
            .map_err(|e| Error::io(ctx(), e.into()))
    }

    /// Remove unreferenced objects. `refs_only` restricts the prune to
    /// objects no longer reachable from any ref (used by
    /// [`crate::deploy::Engine::prune`], which only ever wants this mode).
    pub fn prune(&self, refs_only: bool) -> Result<PruneStats> {
        let ctx = || "Pruning repository".to_string();
        let flags = if refs_only {
            ostree::RepoPruneFlags::REFS_ONLY
        } else {
            ostree::RepoPruneFlags::NONE
        };
        let (total, pruned, freed_bytes) = self
            .repo
            .prune(flags, -1, gio::Cancellable::NONE)
            .map_err(|e| Error::io(ctx(), e.into()))?;
        Ok(PruneStats {
            total: total as u64,
            pruned: pruned as u64,
            freed_bytes: freed_bytes as u64,
        })
    }

    /// List configured remote names.
    pub fn remote_list(&self) -> Vec<String> {
        self.repo
            .remote_list()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// List refs advertised by `remote` (cached summary).
    pub fn remote_list_refs(&self, remote: &str) -> Result<BTreeMap<String, String>> {
        let ctx = || format!("Listing refs for remote {remote}");
        let refs = self
            .repo
            .remote_list_refs(remote, gio::Cancellable::NONE)
            .map_err(|e| Error::io(ctx(), e.into()))?;
        Ok(refs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect())
    }

    /// The configured URL of `remote`.
    pub fn remote_get_url(&self, remote: &str) -> Result<String> {
        let ctx = || format!("Reading URL for remote {remote}");
        self.repo
            .remote_get_url(remote)
            .map(|s| s.to_string())
            .map_err(|e| Error::not_found(ctx(), e.to_string()))
    }

    /// Read a single config key for `remote`, e.g. `gpg-verify`.
    pub fn remote_config_get(&self, remote: &str, key: &str) -> Option<String> {
        self.repo
            .remote_get_option(remote, key, None)
            .ok()
            .flatten()
            .map(|s| s.to_string())
    }

    /// The scope (user/system) this adapter was opened for.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// The installation base directory.
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }
}
