//! Per-app override files under `overrides/`.

use cap_std_ext::cap_std::fs::DirBuilder;
use cap_std_ext::cap_std::fs_utf8::Dir as Utf8Dir;
use cap_std_ext::dirext::CapStdExtDirExt;
use ostree::glib;
use std::io::Write;

use crate::error::{Error, Result};
use crate::refs;

/// Which installation an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The per-user installation rooted under the user's data directory.
    User,
    /// The shared system-wide installation.
    System,
}

/// Load the override file for `app_id` under `base`. Returns an empty
/// [`glib::KeyFile`] if the file does not exist; fails with
/// [`Error::Parse`] if it exists but is not a valid key-value file.
pub fn load_override(base: &camino::Utf8Path, app_id: &str) -> Result<glib::KeyFile> {
    let path = refs::override_file(base, app_id);
    let kf = glib::KeyFile::new();
    match kf.load_from_file(path.as_std_path(), glib::KeyFileFlags::NONE) {
        Ok(()) => Ok(kf),
        Err(e) if e.kind::<glib::FileError>() == Some(glib::FileError::Noent) => {
            Ok(glib::KeyFile::new())
        }
        Err(e) => Err(Error::parse(
            format!("Loading override for {app_id}"),
            e.to_string(),
        )),
    }
}

/// Write `keyfile` as the override file for `app_id` under `base`, creating
/// `overrides/` (mode 0755) if it does not already exist.
pub fn save_override(base: &camino::Utf8Path, app_id: &str, keyfile: &glib::KeyFile) -> Result<()> {
    let ctx = || format!("Saving override for {app_id}");
    let overrides = refs::overrides_dir(base);
    let parent_dir = Utf8Dir::open_ambient_dir(base, cap_std_ext::cap_std::ambient_authority())
        .or_else(|_| {
            std::fs::create_dir_all(base.as_std_path())
                .map_err(|e| Error::io(ctx(), e.into()))?;
            Utf8Dir::open_ambient_dir(base, cap_std_ext::cap_std::ambient_authority())
                .map_err(|e| Error::io(ctx(), e.into()))
        })?;
    parent_dir
        .create_dir_with("overrides", DirBuilder::new().mode(0o755).recursive(true))
        .or_else(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                Ok(())
            } else {
                Err(e)
            }
        })
        .map_err(|e| Error::io(ctx(), e.into()))?;

    let data = keyfile.to_data();
    let rel = overrides.join(app_id);
    let rel = rel.strip_prefix(base).unwrap_or(&rel);
    parent_dir
        .atomic_replace_with(rel, |w| w.write_all(data.as_bytes()))
        .map_err(|e| Error::io(ctx(), e.into()))?;
    Ok(())
}
