//! Access-time refresh for LRU ordering.

use std::path::Path;

use filetime::FileTime;

/// Mark `path` as just used by setting its access and modification times to now.
///
/// Best effort: the timestamp is only an eviction hint, so failures are
/// logged and swallowed. Returns whether the update succeeded.
pub fn touch(path: &Path) -> bool {
    let now = FileTime::now();
    match filetime::set_file_times(path, now, now) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Failed to refresh access time of {}: {}", path.display(), e);
            false
        }
    }
}
