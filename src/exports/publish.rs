//! Maintains the installation-wide `exports/` tree as symlinks into the
//! current deployment's `export/` directory, and runs post-export trigger
//! scripts.

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{Error, Result};
use crate::refs;

/// Directory scanned for `*.trigger` scripts to run after an export
/// update. Not configurable here; callers embedding this crate on a
/// non-standard layout can bypass [`run_triggers`] and invoke their own.
const TRIGGER_DIR: &str = "/usr/lib/depot/system-triggers.d";
const TRIGGER_HELPER: &str = "/usr/lib/depot/trigger-helper";

/// Mirror `export_dir` (a deployment's `export/` subtree) into
/// `exports_dir`, replacing every regular file with a relative symlink back
/// into `export_dir`. Directories are created as needed; files that no
/// longer exist on the source side are left for [`prune_dangling`].
///
/// `down` is the path from `base` down to `export_dir` (e.g.
/// `app/{app}/current/active/export`), used to build each symlink's
/// `../…/{down}/{rel}` target with the right number of `..` segments for
/// its depth under `exports_dir`.
fn mirror_tree(export_dir: &Utf8Path, exports_dir: &Utf8Path, down: &Utf8Path, rel: &Utf8Path) -> Result<()> {
    let ctx = || format!("Mirroring {export_dir} into {exports_dir}");
    let src_dir = export_dir.join(rel);
    let dst_dir = exports_dir.join(rel);
    std::fs::create_dir_all(dst_dir.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))?;

    for entry in std::fs::read_dir(src_dir.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))? {
        let entry = entry.map_err(|e| Error::io(ctx(), e.into()))?;
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();
        let file_type = entry.file_type().map_err(|e| Error::io(ctx(), e.into()))?;
        let child_rel = rel.join(&name);

        if file_type.is_dir() {
            mirror_tree(export_dir, exports_dir, down, &child_rel)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let link_path = exports_dir.join(&child_rel);
        // ".." once per path component of child_rel: one to leave the
        // symlink's own directory nesting, one more to leave `exports/`
        // itself and land back at `base`.
        let up_count = child_rel.components().count();
        let mut target = Utf8PathBuf::new();
        for _ in 0..up_count {
            target.push("..");
        }
        target.push(down);
        target.push(&child_rel);

        let _ = std::fs::remove_file(link_path.as_std_path());
        std::os::unix::fs::symlink(target.as_std_path(), link_path.as_std_path())
            .map_err(|e| Error::io(ctx(), e.into()))?;
    }
    Ok(())
}

/// Update the exported files visible for `app_id`, if it has a `current`
/// link resolving to a ref whose active deployment has an `export/`
/// subdirectory. Absence of any of those is not an error.
pub fn update_exports(base: &Utf8Path, app_id: Option<&str>) -> Result<()> {
    if let Some(app_id) = app_id {
        if let Some(export_dir) = resolve_current_export_dir(base, app_id)? {
            let exports_dir = refs::exports_dir(base);
            std::fs::create_dir_all(exports_dir.as_std_path())
                .map_err(|e| Error::io(format!("Updating exports for {app_id}"), e.into()))?;
            let down = Utf8PathBuf::from("app")
                .join(app_id)
                .join("current")
                .join("active")
                .join("export");
            mirror_tree(&export_dir, &exports_dir, &down, Utf8Path::new(""))?;
        }
    }
    prune_dangling(base)?;
    run_triggers(base);
    Ok(())
}

/// Resolve `{base}/app/{app_id}/current` → `{arch}/{branch}` → `active` →
/// `{checksum}/export`, returning `None` if any link in the chain is
/// absent or the export directory doesn't exist.
fn resolve_current_export_dir(base: &Utf8Path, app_id: &str) -> Result<Option<Utf8PathBuf>> {
    let current = refs::current_link(base, app_id);
    let arch_branch = match std::fs::read_link(current.as_std_path()) {
        Ok(target) => target,
        Err(_) => return Ok(None),
    };
    let arch_branch = Utf8PathBuf::try_from(arch_branch)
        .map_err(|e| Error::parse(format!("Reading current link for {app_id}"), e.to_string()))?;
    let mut parts = arch_branch.components();
    let arch = parts.next().map(|c| c.as_str().to_string());
    let branch = parts.next().map(|c| c.as_str().to_string());
    let (arch, branch) = match (arch, branch) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(None),
    };

    let r = crate::refs::Ref {
        kind: crate::refs::Kind::App,
        name: app_id.to_string(),
        arch,
        branch,
    };
    let active = refs::active_link(base, &r);
    let checksum = match std::fs::read_link(active.as_std_path()) {
        Ok(t) => t.to_string_lossy().into_owned(),
        Err(_) => return Ok(None),
    };
    let export_dir = refs::deployment_export_dir(&refs::deployment_dir(base, &r, &checksum));
    if export_dir.is_dir() {
        Ok(Some(export_dir))
    } else {
        Ok(None)
    }
}

/// Remove symlinks under `exports/` whose target no longer resolves.
pub fn prune_dangling(base: &Utf8Path) -> Result<()> {
    let exports_dir = refs::exports_dir(base);
    if !exports_dir.exists() {
        return Ok(());
    }
    let ctx = || format!("Pruning dangling exports under {base}");
    let mut stack = vec![exports_dir.clone()];
    let mut visited_dirs = BTreeSet::new();
    while let Some(dir) = stack.pop() {
        if !visited_dirs.insert(dir.clone()) {
            continue;
        }
        for entry in std::fs::read_dir(dir.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))? {
            let entry = entry.map_err(|e| Error::io(ctx(), e.into()))?;
            let path = Utf8PathBuf::try_from(entry.path())
                .map_err(|e| Error::parse(ctx(), e.to_string()))?;
            let file_type = entry.file_type().map_err(|e| Error::io(ctx(), e.into()))?;
            if file_type.is_symlink() {
                if std::fs::metadata(path.as_std_path()).is_err() {
                    let _ = std::fs::remove_file(path.as_std_path());
                }
            } else if file_type.is_dir() {
                stack.push(path);
            }
        }
    }
    Ok(())
}

/// Run every `*.trigger` script in the system trigger directory, logging
/// failures as warnings without propagating them.
pub fn run_triggers(base: &Utf8Path) {
    let dir = match std::fs::read_dir(TRIGGER_DIR) {
        Ok(d) => d,
        Err(_) => return,
    };
    for entry in dir.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("trigger") {
            continue;
        }
        let status = std::process::Command::new(TRIGGER_HELPER)
            .arg("-a")
            .arg(base.as_str())
            .arg("-e")
            .arg("-F")
            .arg("/usr")
            .arg(&path)
            .status();
        match status {
            Ok(s) if s.success() => {}
            Ok(s) => tracing::warn!("trigger {path:?} exited with {s}"),
            Err(e) => tracing::warn!("failed to run trigger {path:?}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_tree_builds_depth_correct_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).unwrap();
        let export_dir = base
            .join("app/org.example.App/current/active/export");
        std::fs::create_dir_all(export_dir.join("share/applications")).unwrap();
        std::fs::write(
            export_dir.join("share/applications/org.example.App.desktop"),
            b"[Desktop Entry]\n",
        )
        .unwrap();

        let exports_dir = refs::exports_dir(&base);
        let down = Utf8PathBuf::from("app/org.example.App/current/active/export");
        mirror_tree(&export_dir, &exports_dir, &down, Utf8Path::new("")).unwrap();

        let link = exports_dir.join("share/applications/org.example.App.desktop");
        let target = std::fs::read_link(link.as_std_path()).unwrap();
        let target = Utf8PathBuf::try_from(target).unwrap();
        assert_eq!(
            target,
            Utf8PathBuf::from("../../../app/org.example.App/current/active/export/share/applications/org.example.App.desktop")
        );
        // And the symlink actually resolves to the real file's contents.
        let resolved = std::fs::read(link.as_std_path()).unwrap();
        assert_eq!(resolved, b"[Desktop Entry]\n");
    }

    #[test]
    fn prune_dangling_removes_broken_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).unwrap();
        let exports = refs::exports_dir(&base);
        std::fs::create_dir_all(&exports).unwrap();
        let broken = exports.join("org.example.App.desktop");
        std::os::unix::fs::symlink("/nonexistent", &broken).unwrap();
        prune_dangling(&base).unwrap();
        assert!(std::fs::symlink_metadata(&broken).is_err());
    }
}
