//! Mount-path utilities for the prefetch engine.
//!
//! Paths handled here are plain UTF-8 strings: index files list one member
//! path per line and the engine never round-trips them through `PathBuf`.

/// Check whether an absolute path lies under the given mount point.
///
/// # Arguments
/// * `path` - Absolute path to check
/// * `mount_point` - Mount prefix that must lead every accepted path
pub fn is_under_mount(path: &str, mount_point: &str) -> bool {
    path.starts_with(mount_point)
}

/// Remove the first occurrence of the mount prefix from a path.
///
/// Index lines may or may not carry the mount prefix; the remainder is the
/// filesystem-relative path used for lookups.
///
/// # Arguments
/// * `path` - Path as read from an index line
/// * `mount_point` - Mount prefix to strip
pub fn strip_mount_prefix(path: &str, mount_point: &str) -> String {
    if mount_point.is_empty() {
        return path.to_string();
    }
    path.replacen(mount_point, "", 1)
}

/// Join a filesystem-relative path under the mount point.
///
/// # Arguments
/// * `mount_point` - Mount prefix
/// * `relative` - Path relative to the mount root (leading slash optional)
pub fn join_mount(mount_point: &str, relative: &str) -> String {
    let base: &str = mount_point.trim_end_matches('/');
    let rest: &str = relative.trim_start_matches('/');
    if rest.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base, rest)
}

/// Split a path into its directory and final component.
///
/// The directory keeps its trailing slash, so `"/d1/f1"` becomes
/// `("/d1/", "f1")` and a bare name splits to an empty directory.
///
/// # Arguments
/// * `path` - Path to split
pub fn split_dir_file(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_under_mount() {
        assert!(is_under_mount("/mnt/v/d1/f1", "/mnt/v"));
        assert!(!is_under_mount("/elsewhere/x", "/mnt/v"));
    }

    #[test]
    fn test_strip_mount_prefix() {
        assert_eq!(strip_mount_prefix("/mnt/v/d1/f1", "/mnt/v"), "/d1/f1");
        assert_eq!(strip_mount_prefix("/d1/f1", "/mnt/v"), "/d1/f1");
        assert_eq!(strip_mount_prefix("/d1/f1", ""), "/d1/f1");
    }

    #[test]
    fn test_strip_mount_prefix_first_occurrence_only() {
        assert_eq!(strip_mount_prefix("/mnt/v/mnt/v/f", "/mnt/v"), "/mnt/v/f");
    }

    #[test]
    fn test_join_mount() {
        assert_eq!(join_mount("/mnt/v", "/d1/f1"), "/mnt/v/d1/f1");
        assert_eq!(join_mount("/mnt/v/", "d1/f1"), "/mnt/v/d1/f1");
        assert_eq!(join_mount("/mnt/v", ""), "/mnt/v");
    }

    #[test]
    fn test_split_dir_file() {
        assert_eq!(split_dir_file("/d1/f1"), ("/d1/", "f1"));
        assert_eq!(split_dir_file("/f1"), ("/", "f1"));
        assert_eq!(split_dir_file("f1"), ("", "f1"));
        assert_eq!(split_dir_file("/d1/"), ("/d1/", ""));
    }
}
