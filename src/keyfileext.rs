//! Helper methods for [`glib::KeyFile`].

use ostree::glib;

/// Remove a key from every group of `kf` that has it, ignoring groups or
/// keys that don't exist. Used by the exports rewriter to strip `TryExec`
/// and similar keys that may or may not be present in any given group.
pub fn remove_key_everywhere(kf: &glib::KeyFile, key: &str) {
    for group in kf.groups() {
        if let Err(e) = kf.remove_key(&group, key) {
            if !matches!(
                e.kind::<glib::KeyFileError>(),
                Some(glib::KeyFileError::GroupNotFound | glib::KeyFileError::KeyNotFound)
            ) {
                tracing::debug!("removing key {key} from group {group}: {e}");
            }
        }
    }
}
