//! Read-only metadata queries against a deployed ref: its parsed
//! `metadata` file and merged system/user override context.

use camino::{Utf8Path, Utf8PathBuf};
use ostree::glib;

use crate::error::{Error, Result};
use crate::overrides::{self, Scope};
use crate::refs::{self, Ref};

/// A resolved deployment, with its metadata and (lazily merged) override
/// context available to callers.
pub struct DeployHandle {
    deployment: Utf8PathBuf,
    metadata: glib::KeyFile,
    system_override: Option<glib::KeyFile>,
    user_override: glib::KeyFile,
}

impl DeployHandle {
    /// The deployment's root directory,
    /// `{base}/{kind}/{name}/{arch}/{branch}/{checksum}/`.
    pub fn path(&self) -> &Utf8Path {
        &self.deployment
    }

    /// The deployment's `files/` directory.
    pub fn files_path(&self) -> Utf8PathBuf {
        refs::deployment_files_dir(&self.deployment)
    }

    /// The deployment's parsed `metadata` key-value file.
    pub fn metadata(&self) -> &glib::KeyFile {
        &self.metadata
    }

    /// The merged sandbox-context keyfile: system override (if this is a
    /// system installation) overlaid by the user override. Merging is
    /// performed lazily here rather than at load time, since most callers
    /// of [`load_deployed`] only want the deployment path and never touch
    /// overrides at all.
    pub fn merged_context(&self) -> glib::KeyFile {
        let merged = glib::KeyFile::new();
        if let Some(system) = &self.system_override {
            copy_keyfile_into(system, &merged);
        }
        copy_keyfile_into(&self.user_override, &merged);
        merged
    }
}

fn copy_keyfile_into(src: &glib::KeyFile, dst: &glib::KeyFile) {
    for group in src.groups() {
        for key in src.keys(&group).unwrap_or_default() {
            if let Ok(value) = src.string(&group, &key) {
                dst.set_string(&group, &key, &value);
            }
        }
    }
}

/// Resolve `ref`'s deployment (explicit `checksum`, or via `active` if
/// `None`), read its `metadata`, and for [`crate::refs::Kind::App`] refs
/// load the user override (and, on a system installation, the system
/// override too).
pub fn load_deployed(
    base: &Utf8Path,
    scope: Scope,
    r: &Ref,
    checksum: Option<&str>,
) -> Result<DeployHandle> {
    let ctx = || format!("Loading deployed {r}");
    let checksum = match checksum {
        Some(c) => c.to_string(),
        None => {
            let active = refs::active_link(base, r);
            std::fs::read_link(active.as_std_path())
                .map_err(|_| Error::NotDeployed { context: ctx() })?
                .to_string_lossy()
                .into_owned()
        }
    };

    let deployment = refs::deployment_dir(base, r, &checksum);
    if !deployment.is_dir() {
        return Err(Error::NotDeployed { context: ctx() });
    }

    let metadata_path = refs::deployment_metadata_file(&deployment);
    let metadata = glib::KeyFile::new();
    if metadata_path.exists() {
        metadata
            .load_from_file(metadata_path.as_std_path(), glib::KeyFileFlags::NONE)
            .map_err(|e| Error::parse(ctx(), e.to_string()))?;
    }

    let (system_override, user_override) = match r.kind {
        refs::Kind::App => {
            // The user override always comes from the user installation,
            // even when inspecting a system-scoped deployment: a running
            // user session's overrides still apply on top of any
            // system-wide override.
            let user_base = crate::installation::Installation::user().base();
            let user_override = overrides::load_override(user_base, &r.name)?;
            let system_override = if scope == Scope::System {
                Some(overrides::load_override(base, &r.name)?)
            } else {
                None
            };
            (system_override, user_override)
        }
        refs::Kind::Runtime => (None, glib::KeyFile::new()),
    };

    Ok(DeployHandle {
        deployment,
        metadata,
        system_override,
        user_override,
    })
}
