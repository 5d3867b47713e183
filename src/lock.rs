//! Advisory lock probing on a deployment's `files/.ref` anchor.
//!
//! The installer never takes a lock itself — it only probes before
//! deletion. A launched application holds a shared lock on its
//! deployment's `.ref` file while running.

use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use camino::Utf8Path;

/// True if some process holds a conflicting write lock on `deployment`'s
/// `files/.ref`. Returns `false` if the probe reports unlocked, or if the
/// file is missing or cannot be opened (an absent lock file cannot be
/// "in use").
#[allow(unsafe_code)]
pub fn is_locked(deployment: &Utf8Path) -> bool {
    let path = crate::refs::deployment_lock_file(deployment);
    let file = match std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_CLOEXEC)
        .open(path.as_std_path())
    {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut lock = libc::flock {
        l_type: libc::F_WRLCK as libc::c_short,
        l_whence: libc::SEEK_SET as libc::c_short,
        l_start: 0,
        l_len: 0,
        l_pid: 0,
    };

    // SAFETY: `lock` is a fully-initialized flock struct, and `file`'s fd
    // stays open for the duration of the call.
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETLK, &mut lock) };
    if rc != 0 {
        return false;
    }
    lock.l_type as i32 != libc::F_UNLCK
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn missing_ref_file_is_not_locked() {
        let tmp = tempfile::tempdir().unwrap();
        let deployment = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).unwrap();
        assert!(!is_locked(&deployment));
    }

    #[test]
    fn present_unlocked_ref_file_is_not_locked() {
        let tmp = tempfile::tempdir().unwrap();
        let deployment = Utf8PathBuf::from_path_buf(tmp.path().to_owned()).unwrap();
        std::fs::create_dir_all(deployment.join("files")).unwrap();
        std::fs::write(deployment.join("files/.ref"), []).unwrap();
        assert!(!is_locked(&deployment));
    }
}
