//! Rewrites `.desktop`/`.service` files inside a deployment's `export/`
//! tree so their `Exec=` launches under the sandbox, and enforces
//! filename/service-name policy on everything else in that tree.

use std::collections::BTreeSet;

use camino::Utf8Path;
use cap_std_ext::dirext::CapStdExtDirExt;
use ostree::glib;

use crate::error::{Error, Result};
use crate::keyfileext::remove_key_everywhere;

/// Characters an `Exec=` token may contain without being shell-quoted.
fn is_bare_safe(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_%.=:/@".contains(&b))
}

/// Quote `token` for inclusion in a shell command line unless every
/// character is already bare-safe.
fn quote_token(token: &str) -> String {
    if is_bare_safe(token) {
        token.to_string()
    } else {
        shlex::try_quote(token)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| format!("'{}'", token.replace('\'', "'\\''")))
    }
}

/// Build the replacement `Exec=` command line:
/// `{sandbox_bin}/launch --branch={branch} --arch={arch}[ --command={argv0}] {app_id}[ argv[1:]...]`
pub fn rewrite_exec_line(
    sandbox_bin: &str,
    app_id: &str,
    arch: &str,
    branch: &str,
    old_exec: &str,
) -> String {
    let mut out = vec![
        format!("{sandbox_bin}/launch"),
        format!("--branch={branch}"),
        format!("--arch={arch}"),
    ];

    let argv = shlex::split(old_exec).filter(|v| !v.is_empty());
    match argv {
        Some(argv) => {
            out.push(format!("--command={}", quote_token(&argv[0])));
            out.push(app_id.to_string());
            out.extend(argv[1..].iter().map(|t| quote_token(t)));
        }
        None => {
            out.push(app_id.to_string());
        }
    }
    out.join(" ")
}

/// Rewrite one `.desktop` or `.service` keyfile in place (already loaded),
/// returning the serialized bytes to write back.
fn rewrite_keyfile(
    basename: &str,
    is_service: bool,
    data: &[u8],
    app_id: &str,
    arch: &str,
    branch: &str,
    sandbox_bin: &str,
) -> Result<Vec<u8>> {
    let ctx = || format!("Rewriting {basename}");
    let kf = glib::KeyFile::new();
    let text = String::from_utf8_lossy(data);
    kf.load_from_data(&text, glib::KeyFileFlags::KEEP_TRANSLATIONS)
        .map_err(|e| Error::parse(ctx(), e.to_string()))?;

    if is_service {
        let expected = basename.strip_suffix(".service").unwrap_or(basename);
        let name = kf
            .string("D-BUS Service", "Name")
            .map_err(|e| Error::parse(ctx(), e.to_string()))?;
        if name.as_str() != expected {
            return Err(Error::policy(
                ctx(),
                format!("D-BUS Service/Name {name:?} does not match filename {expected:?}"),
            ));
        }
    }

    remove_key_everywhere(&kf, "TryExec");
    remove_key_everywhere(&kf, "X-GNOME-Bugzilla-ExtraInfoScript");
    for group in kf.groups() {
        if let Ok(old_exec) = kf.string(&group, "Exec") {
            let new_exec = rewrite_exec_line(sandbox_bin, app_id, arch, branch, old_exec.as_str());
            kf.set_string(&group, "Exec", &new_exec);
        }
    }

    Ok(kf.to_data().as_bytes().to_vec())
}

/// Recursively walk `export_dir`, rewriting `.desktop`/`.service` files and
/// removing anything that violates the naming/content policy. Returns the
/// number of files rewritten.
pub fn rewrite_export_tree(
    export_dir: &Utf8Path,
    app_id: &str,
    arch: &str,
    branch: &str,
    sandbox_bin: &str,
) -> Result<usize> {
    let ctx = || format!("Rewriting exports under {export_dir}");
    let mut rewritten = 0;
    walk_dir(export_dir, app_id, arch, branch, sandbox_bin, &ctx, &mut rewritten)?;
    Ok(rewritten)
}

fn walk_dir(
    dir: &Utf8Path,
    app_id: &str,
    arch: &str,
    branch: &str,
    sandbox_bin: &str,
    ctx: &dyn Fn() -> String,
    rewritten: &mut usize,
) -> Result<()> {
    let entries = std::fs::read_dir(dir.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))?;
    // Process each basename at most once, even if a rewrite recreates a
    // file the directory iterator would otherwise revisit.
    let mut seen = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(ctx(), e.into()))?;
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();
        if !seen.insert(name.clone()) {
            continue;
        }
        let path = dir.join(&name);
        let file_type = entry.file_type().map_err(|e| Error::io(ctx(), e.into()))?;

        if file_type.is_dir() {
            walk_dir(&path, app_id, arch, branch, sandbox_bin, ctx, rewritten)?;
            continue;
        }

        if !file_type.is_file() {
            tracing::warn!("removing non-regular export entry {path}");
            let _ = std::fs::remove_file(path.as_std_path());
            continue;
        }

        let prefix = format!("{app_id}.");
        if !name.starts_with(&prefix) {
            tracing::warn!("removing export {path} not named after {app_id}");
            let _ = std::fs::remove_file(path.as_std_path());
            continue;
        }

        let is_desktop = name.ends_with(".desktop");
        let is_service = name.ends_with(".service");
        if !is_desktop && !is_service {
            // Properly prefixed non-desktop/service files (icons, etc.) are
            // left alone so the exports publisher can link them through.
            continue;
        }

        let data = std::fs::read(path.as_std_path()).map_err(|e| Error::io(ctx(), e.into()))?;
        let new_data = rewrite_keyfile(&name, is_service, &data, app_id, arch, branch, sandbox_bin)?;
        write_atomic(&path, &new_data)?;
        *rewritten += 1;
    }
    Ok(())
}

fn write_atomic(path: &Utf8Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Utf8Path::new("."));
    let name = path.file_name().unwrap_or_default();
    let d = cap_std_ext::cap_std::fs_utf8::Dir::open_ambient_dir(
        dir,
        cap_std_ext::cap_std::ambient_authority(),
    )
    .map_err(|e| Error::io(format!("Opening {dir}"), e.into()))?;
    d.atomic_replace_with(name, |w| std::io::Write::write_all(w, data))
        .map_err(|e| Error::io(format!("Writing {path}"), e.into()))?;
    Ok(())
}
