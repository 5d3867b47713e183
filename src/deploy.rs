//! The central orchestrator: pull, checkout, rewrite exports, set active,
//! make current, undeploy, prune, list deployed.

use camino::{Utf8Path, Utf8PathBuf};
use uuid::Uuid;

use crate::cancel::Cancellable;
use crate::error::{Error, Result};
use crate::exports::{publish, rewrite};
use crate::lock;
use crate::overrides::Scope;
use crate::progress::{NoProgress, Progress};
use crate::refs::{self, Kind, Ref};
use crate::repo::{Adapter, CheckoutMode};

/// The sandbox launcher binary directory baked into rewritten `Exec=`
/// lines. Not configurable beyond this; the launcher itself lives
/// outside this crate.
const SANDBOX_BIN: &str = "/usr/bin";

/// One installation's deployment engine: owns the object store adapter and
/// drives the deployment lifecycle (pull, checkout, export rewrite, set
/// active, undeploy, prune, list).
pub struct Engine {
    base: Utf8PathBuf,
    scope: Scope,
    repo: Adapter,
}

impl Engine {
    /// Open (creating if necessary) the engine for `base`.
    pub fn open(base: &Utf8Path, scope: Scope) -> Result<Self> {
        let repo = Adapter::ensure(base, scope)?;
        Ok(Engine {
            base: base.to_owned(),
            scope,
            repo,
        })
    }

    /// The installation base directory.
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    /// The object store adapter, for callers that need lower-level access.
    pub fn repo(&self) -> &Adapter {
        &self.repo
    }

    fn checkout_mode(&self) -> CheckoutMode {
        match self.scope {
            Scope::User => CheckoutMode::User,
            Scope::System => CheckoutMode::None,
        }
    }

    /// Pull `ref_str` from `remote`, reporting progress to `progress`.
    pub fn pull(&self, remote: &str, r: &Ref, progress: &dyn Progress, cancellable: &Cancellable) -> Result<()> {
        let ctx = || format!("While pulling {r} from {remote}");
        cancellable.check(ctx())?;
        self.repo.pull(remote, &r.to_ref_string(), cancellable)?;
        // The real object store drives progress asynchronously; here we
        // report a single terminal update since `Adapter::pull` is
        // synchronous end-to-end.
        progress.progress(&crate::progress::PullState::default());
        Ok(())
    }

    /// Read the remote a deployment was installed from.
    fn read_origin(&self, deployment: &Utf8Path) -> Result<String> {
        let path = refs::deployment_origin_file(deployment);
        std::fs::read_to_string(path.as_std_path())
            .map(|s| s.trim().to_string())
            .map_err(|e| Error::io(format!("Reading origin for {deployment}"), e.into()))
    }

    /// Read the remote most recently used for any existing deployment of
    /// `r`, used when a fresh `deploy` call omits a checksum.
    fn origin_for_ref(&self, r: &Ref) -> Result<String> {
        let ctx = || format!("Finding origin for {r}");
        for checksum in self.list_deployed(r)? {
            let deployment = refs::deployment_dir(&self.base, r, &checksum);
            if let Ok(origin) = self.read_origin(&deployment) {
                return Ok(origin);
            }
        }
        Err(Error::not_found(ctx(), "no existing deployment to read an origin from"))
    }

    /// Install `r` at `checksum` (or the latest commit of its origin, if
    /// `checksum` is `None`): resolve/pull the commit, check it out,
    /// rewrite its exports, write the lock anchor and origin, then
    /// atomically point `active` at the new checkout.
    pub fn deploy(
        &self,
        r: &Ref,
        checksum: Option<&str>,
        progress: &dyn Progress,
        cancellable: &Cancellable,
    ) -> Result<String> {
        let ctx = || format!("Deploying {r}");
        cancellable.check(ctx())?;

        let (checksum, origin) = match checksum {
            Some(c) => {
                if !self.repo.has_commit(c) {
                    let origin = self.origin_for_ref(r)?;
                    self.repo.pull_commit(&origin, c, cancellable)?;
                    (c.to_string(), origin)
                } else {
                    let origin = self.origin_for_ref(r).unwrap_or_default();
                    (c.to_string(), origin)
                }
            }
            None => {
                let origin = self.origin_for_ref(r)?;
                let remote_ref = format!("{origin}:{}", r.to_ref_string());
                let resolved = self.repo.resolve(&remote_ref)?;
                (resolved, origin)
            }
        };

        let checkoutdir = refs::deployment_dir(&self.base, r, &checksum);
        if checkoutdir.exists() {
            return Err(Error::AlreadyDeployed { context: ctx() });
        }

        cancellable.check(ctx())?;
        // The commit root tree is {files/, metadata, export/}; check out
        // into the deployment directory itself, not files/, so those three
        // entries land where §3 puts them.
        self.repo
            .checkout_tree(&checksum, &checkoutdir, self.checkout_mode(), cancellable)?;

        std::fs::write(refs::deployment_lock_file(&checkoutdir), [])
            .map_err(|e| Error::io(ctx(), e.into()))?;

        if !origin.is_empty() {
            std::fs::write(refs::deployment_origin_file(&checkoutdir), origin.as_bytes())
                .map_err(|e| Error::io(ctx(), e.into()))?;
        }

        let export_dir = refs::deployment_export_dir(&checkoutdir);
        if export_dir.is_dir() {
            rewrite::rewrite_export_tree(&export_dir, &r.name, &r.arch, &r.branch, SANDBOX_BIN)?;
        }

        self.set_active(r, &checksum)?;

        Ok(checksum)
    }

    /// Atomically point `active` at `checksum` via create-tmp-and-rename.
    fn set_active(&self, r: &Ref, checksum: &str) -> Result<()> {
        let ctx = || format!("Setting active deployment of {r}");
        let branch_dir = refs::branch_dir(&self.base, r);
        std::fs::create_dir_all(branch_dir.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))?;
        let link = refs::active_link(&self.base, r);
        atomic_symlink(&branch_dir, &link, checksum).map_err(|e| Error::io(ctx(), e))
    }

    /// The checksum `active` currently points to, if any.
    pub fn read_active(&self, r: &Ref) -> Option<String> {
        let link = refs::active_link(&self.base, r);
        std::fs::read_link(link.as_std_path())
            .ok()
            .map(|t| t.to_string_lossy().into_owned())
    }

    /// Enumerate deployed checksums of `r`. A ref with no deployments at
    /// all (missing directory) yields an empty list, not an error.
    pub fn list_deployed(&self, r: &Ref) -> Result<Vec<String>> {
        let dir = refs::branch_dir(&self.base, r);
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(dir.as_std_path()) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(Error::io(format!("Listing deployments of {r}"), e.into())),
        };
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(format!("Listing deployments of {r}"), e.into()))?;
            let name = entry.file_name();
            let name = name.to_string_lossy().into_owned();
            if refs::is_checksum(&name) && entry.path().is_dir() {
                out.push(name);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Enumerate all `kind/name/arch/branch` refs under this installation.
    pub fn list_refs(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for kind in [Kind::App, Kind::Runtime] {
            out.extend(self.list_refs_kind(kind)?);
        }
        out.sort();
        Ok(out)
    }

    /// Enumerate refs of one kind for a single app/runtime name.
    pub fn list_refs_for_name(&self, kind: Kind, name: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let name_dir = self.base.join(kind.dirname()).join(name);
        for arch in list_dirnames(&name_dir)? {
            let arch_dir = name_dir.join(&arch);
            for branch in list_dirnames(&arch_dir)? {
                out.push(format!("{kind}/{name}/{arch}/{branch}"));
            }
        }
        out.sort();
        Ok(out)
    }

    fn list_refs_kind(&self, kind: Kind) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let kind_dir = self.base.join(kind.dirname());
        for name in list_dirnames(&kind_dir)? {
            // "data" is a legacy compatibility carve-out, never a ref name.
            if name == "data" {
                continue;
            }
            out.extend(self.list_refs_for_name(kind, &name)?);
        }
        Ok(out)
    }

    /// Remove the deployment at `checksum`. If it's currently `active`,
    /// `active` is repointed at another deployment of `r` (or cleared if
    /// none remain). The checkout is moved into `.removed/` under a
    /// generated tmp name, then deleted immediately unless locked.
    pub fn undeploy(&self, r: &Ref, checksum: &str, force: bool) -> Result<()> {
        let ctx = || format!("Undeploying {r}@{checksum}");
        let checkoutdir = refs::deployment_dir(&self.base, r, checksum);
        if !checkoutdir.exists() {
            return Err(Error::AlreadyUndeployed { context: ctx() });
        }

        if self.read_active(r).as_deref() == Some(checksum) {
            let remaining: Vec<String> = self
                .list_deployed(r)?
                .into_iter()
                .filter(|c| c != checksum)
                .collect();
            match remaining.first() {
                Some(other) => self.set_active(r, other)?,
                None => {
                    let link = refs::active_link(&self.base, r);
                    let _ = std::fs::remove_file(link.as_std_path());
                }
            }
        }

        let removed_dir = refs::removed_dir(&self.base);
        std::fs::create_dir_all(removed_dir.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))?;
        let tmp_name = format!("{}-{checksum}", Uuid::new_v4());
        let quarantined = removed_dir.join(&tmp_name);
        std::fs::rename(checkoutdir.as_std_path(), quarantined.as_std_path())
            .map_err(|e| Error::io(ctx(), e.into()))?;

        if force || !lock::is_locked(&quarantined) {
            if let Err(e) = std::fs::remove_dir_all(quarantined.as_std_path()) {
                tracing::warn!("failed to delete quarantined deployment {quarantined}: {e}");
            }
        }

        Ok(())
    }

    /// Delete quarantined checkouts under `.removed/` that are no longer
    /// locked. Missing `.removed/` is not an error.
    pub fn cleanup_removed(&self) -> Result<()> {
        let removed_dir = refs::removed_dir(&self.base);
        let entries = match std::fs::read_dir(removed_dir.as_std_path()) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::io("Cleaning up .removed", e.into())),
        };
        for entry in entries.flatten() {
            let path = match Utf8PathBuf::try_from(entry.path()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !lock::is_locked(&path) {
                if let Err(e) = std::fs::remove_dir_all(path.as_std_path()) {
                    tracing::warn!("failed to delete quarantined deployment {path}: {e}");
                }
            }
        }
        Ok(())
    }

    /// Remove unreferenced objects from the repository.
    pub fn prune(&self) -> Result<crate::repo::PruneStats> {
        self.repo.prune(true)
    }

    /// Point `{installation}/app/{name}/current` at `{r.arch}/{r.branch}`.
    /// `r.kind` must be [`Kind::App`].
    pub fn make_current(&self, r: &Ref) -> Result<()> {
        let ctx = || format!("Making {r} current");
        if r.kind != Kind::App {
            return Err(Error::policy(ctx(), "only app refs have a current link"));
        }
        self.drop_current(&r.name)?;
        let parent = self.base.join(Kind::App.dirname()).join(&r.name);
        std::fs::create_dir_all(parent.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))?;
        let link = refs::current_link(&self.base, &r.name);
        let target = format!("{}/{}", r.arch, r.branch);
        atomic_symlink(&parent, &link, &target).map_err(|e| Error::io(ctx(), e))?;
        publish::update_exports(&self.base, Some(&r.name))?;
        Ok(())
    }

    /// Remove `{installation}/app/{name}/current`, if present.
    pub fn drop_current(&self, name: &str) -> Result<()> {
        let link = refs::current_link(&self.base, name);
        match std::fs::remove_file(link.as_std_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(format!("Dropping current for {name}"), e.into())),
        }
    }
}

/// Create a symlink named `target` inside `link`'s parent via a random
/// temp name, then rename over `link` — giving atomic swap semantics with
/// respect to concurrent readers.
fn atomic_symlink(parent: &Utf8Path, link: &Utf8Path, target: &str) -> std::result::Result<(), anyhow::Error> {
    let tmp_name = format!(".{}.tmp-{}", link.file_name().unwrap_or("link"), Uuid::new_v4());
    let tmp_path = parent.join(&tmp_name);
    std::os::unix::fs::symlink(target, tmp_path.as_std_path())?;
    std::fs::rename(tmp_path.as_std_path(), link.as_std_path())?;
    Ok(())
}

fn list_dirnames(dir: &Utf8Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(dir.as_std_path()) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(Error::io(format!("Listing {dir}"), e.into())),
    };
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(format!("Listing {dir}"), e.into()))?;
        if entry.path().is_dir() {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::Kind;

    fn make_ref() -> Ref {
        Ref {
            kind: Kind::App,
            name: "org.example.App".into(),
            arch: "x86_64".into(),
            branch: "stable".into(),
        }
    }

    #[test]
    fn list_deployed_empty_for_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).unwrap();
        // Construct the parts of Engine we need without a real repo: the
        // listing helpers don't touch the object store.
        let r = make_ref();
        let dir = refs::branch_dir(&base, &r);
        assert!(!dir.exists());
        let entries = list_dirnames(&dir).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn atomic_symlink_swap() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).unwrap();
        std::fs::create_dir_all(&base).unwrap();
        let link = base.join("active");
        atomic_symlink(&base, &link, "aaaa").unwrap();
        assert_eq!(std::fs::read_link(link.as_std_path()).unwrap().to_str().unwrap(), "aaaa");
        atomic_symlink(&base, &link, "bbbb").unwrap();
        assert_eq!(std::fs::read_link(link.as_std_path()).unwrap().to_str().unwrap(), "bbbb");
    }

    #[test]
    fn list_refs_skips_data_and_non_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).unwrap();
        std::fs::create_dir_all(base.join("app/data")).unwrap();
        std::fs::create_dir_all(base.join("app/org.example.App/x86_64/stable")).unwrap();
        std::fs::write(base.join("app/not-a-dir-ignore-me"), []).unwrap();

        // list_refs_kind/list_refs_for_name don't need a real repo either.
        let name_dirs = list_dirnames(&base.join("app")).unwrap();
        assert!(name_dirs.contains(&"data".to_string()));
        assert!(name_dirs.contains(&"org.example.App".to_string()));
    }
}
