//! Ref parsing and canonical path layout.
//!
//! A ref is a `kind/name/arch/branch` identifier. All functions here are
//! pure: no filesystem access, no allocation beyond the values returned.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{Error, Result};

/// The two deployment kinds an installation manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// An application deployment, e.g. under `app/`.
    App,
    /// A runtime deployment, e.g. under `runtime/`.
    Runtime,
}

impl Kind {
    /// The directory name this kind is stored under.
    pub fn dirname(self) -> &'static str {
        match self {
            Kind::App => "app",
            Kind::Runtime => "runtime",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "app" => Ok(Kind::App),
            "runtime" => Ok(Kind::Runtime),
            other => Err(Error::parse(
                "parsing ref",
                format!("unknown kind {other:?}, expected \"app\" or \"runtime\""),
            )),
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dirname())
    }
}

/// A parsed `kind/name/arch/branch` ref.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ref {
    /// `app` or `runtime`.
    pub kind: Kind,
    /// Reverse-DNS application or runtime id.
    pub name: String,
    /// CPU architecture tag.
    pub arch: String,
    /// Version/branch label.
    pub branch: String,
}

impl Ref {
    /// Parse a `kind/name/arch/branch` string. Fails with a parse error
    /// unless the string splits into exactly four `/`-separated parts.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        let [kind, name, arch, branch]: [&str; 4] = parts.as_slice().try_into().map_err(|_| {
            Error::parse(
                "parsing ref",
                format!("expected exactly 4 \"/\"-separated parts, got {}: {s:?}", parts.len()),
            )
        })?;
        Ok(Ref {
            kind: Kind::parse(kind)?,
            name: name.to_string(),
            arch: arch.to_string(),
            branch: branch.to_string(),
        })
    }

    /// Reconstruct the canonical `kind/name/arch/branch` string.
    pub fn to_ref_string(&self) -> String {
        format!("{}/{}/{}/{}", self.kind, self.name, self.arch, self.branch)
    }
}

impl std::fmt::Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_ref_string())
    }
}

/// A checksum is 64 lowercase hex characters. This validates the shape only;
/// it does not check that the checksum exists in any object store.
pub fn is_checksum(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// `{base}/repo`
pub fn repo_dir(base: &Utf8Path) -> Utf8PathBuf {
    base.join("repo")
}

/// `{base}/overrides`
pub fn overrides_dir(base: &Utf8Path) -> Utf8PathBuf {
    base.join("overrides")
}

/// `{base}/overrides/{app_id}`
pub fn override_file(base: &Utf8Path, app_id: &str) -> Utf8PathBuf {
    overrides_dir(base).join(app_id)
}

/// `{base}/exports`
pub fn exports_dir(base: &Utf8Path) -> Utf8PathBuf {
    base.join("exports")
}

/// `{base}/.removed`
pub fn removed_dir(base: &Utf8Path) -> Utf8PathBuf {
    base.join(".removed")
}

/// `{base}/{kind}/{name}/{arch}/{branch}` — the directory all deployments of
/// one ref live under (siblings are 64-hex checksum directories plus the
/// `active` symlink).
pub fn branch_dir(base: &Utf8Path, r: &Ref) -> Utf8PathBuf {
    base.join(r.kind.dirname())
        .join(&r.name)
        .join(&r.arch)
        .join(&r.branch)
}

/// The literal `base/ref` path join; equal to [`branch_dir`].
pub fn get_deploy_dir(base: &Utf8Path, r: &Ref) -> Utf8PathBuf {
    base.join(r.to_ref_string())
}

/// `{branch_dir}/{checksum}` — one specific deployment.
pub fn deployment_dir(base: &Utf8Path, r: &Ref, checksum: &str) -> Utf8PathBuf {
    branch_dir(base, r).join(checksum)
}

/// `{deployment}/files`
pub fn deployment_files_dir(deployment: &Utf8Path) -> Utf8PathBuf {
    deployment.join("files")
}

/// `{deployment}/files/.ref` — the lock anchor.
pub fn deployment_lock_file(deployment: &Utf8Path) -> Utf8PathBuf {
    deployment_files_dir(deployment).join(".ref")
}

/// `{deployment}/metadata`
pub fn deployment_metadata_file(deployment: &Utf8Path) -> Utf8PathBuf {
    deployment.join("metadata")
}

/// `{deployment}/export`
pub fn deployment_export_dir(deployment: &Utf8Path) -> Utf8PathBuf {
    deployment.join("export")
}

/// `{deployment}/origin`
pub fn deployment_origin_file(deployment: &Utf8Path) -> Utf8PathBuf {
    deployment.join("origin")
}

/// `{branch_dir}/active`
pub fn active_link(base: &Utf8Path, r: &Ref) -> Utf8PathBuf {
    branch_dir(base, r).join("active")
}

/// `{base}/app/{name}/current` — only meaningful for [`Kind::App`].
pub fn current_link(base: &Utf8Path, name: &str) -> Utf8PathBuf {
    base.join(Kind::App.dirname()).join(name).join("current")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid() {
        let r = Ref::parse("app/org.example.App/x86_64/stable").unwrap();
        assert_eq!(r.kind, Kind::App);
        assert_eq!(r.name, "org.example.App");
        assert_eq!(r.arch, "x86_64");
        assert_eq!(r.branch, "stable");
        assert_eq!(r.to_ref_string(), "app/org.example.App/x86_64/stable");
    }

    #[test]
    fn parse_too_few_parts() {
        let e = Ref::parse("a/b/c").unwrap_err();
        assert_eq!(e.kind(), crate::error::ErrorKind::Parse);
    }

    #[test]
    fn parse_too_many_parts() {
        let e = Ref::parse("a/b/c/d/e").unwrap_err();
        assert_eq!(e.kind(), crate::error::ErrorKind::Parse);
    }

    #[test]
    fn parse_bad_kind() {
        let e = Ref::parse("lib/org.example/x86_64/stable").unwrap_err();
        assert_eq!(e.kind(), crate::error::ErrorKind::Parse);
    }

    #[test]
    fn checksum_shape() {
        assert!(is_checksum(&"a".repeat(64)));
        assert!(!is_checksum(&"A".repeat(64)));
        assert!(!is_checksum("deadbeef"));
    }

    #[test]
    fn paths() {
        let base = Utf8Path::new("/srv/depot");
        let r = Ref::parse("app/org.example.App/x86_64/stable").unwrap();
        assert_eq!(
            branch_dir(base, &r),
            Utf8Path::new("/srv/depot/app/org.example.App/x86_64/stable")
        );
        assert_eq!(get_deploy_dir(base, &r), branch_dir(base, &r));
        assert_eq!(
            current_link(base, "org.example.App"),
            Utf8Path::new("/srv/depot/app/org.example.App/current")
        );
    }
}
