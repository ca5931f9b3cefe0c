//! Containment-checked resolution of user-supplied paths.
//!
//! Every path that reaches the filesystem goes through here. The textual
//! strip of `../` sequences is defense-in-depth only; the canonical-prefix
//! check after `canonicalize` (which also resolves symlinks) is the actual
//! enforcement point and runs unconditionally.

use std::path::{Path, PathBuf};

/// Strip a leading `scheme://host` prefix, leaving only the path portion.
fn strip_scheme_host(path: &str) -> &str {
    if let Some(idx) = path.find("://") {
        let scheme = &path[..idx];
        if !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            let rest = &path[idx + 3..];
            return match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "",
            };
        }
    }
    path
}

/// Textually sanitize a user-supplied path: drop any URL prefix, remove
/// `../` / `..\` sequences, and trim leading/trailing separators.
///
/// Not sufficient on its own (encoding tricks can survive it); always pair
/// with [`resolve`] or [`resolve_for_write`].
pub fn sanitize(path: &str) -> String {
    let path = strip_scheme_host(path);
    let path = path.replace("../", "").replace("..\\", "");
    path.trim_matches(|c| c == '/' || c == '\\').to_string()
}

/// Resolve `user_path` against `base_dir` for reading.
///
/// Returns the canonical path iff it exists on disk and still lies under
/// the canonical form of `base_dir`. Missing files, canonicalization
/// failures, and escapes (including via symlink) all yield `None`.
pub fn resolve(base_dir: &Path, user_path: &str) -> Option<PathBuf> {
    let sanitized = sanitize(user_path);
    let base = base_dir.canonicalize().ok()?;
    let canonical = base.join(sanitized).canonicalize().ok()?;
    canonical.starts_with(&base).then_some(canonical)
}

/// Resolve `user_path` against `base_dir` for writing.
///
/// The target file may not exist yet, so containment is checked on its
/// parent directory (which must exist). Returns the full write path with
/// the canonical parent substituted in.
pub fn resolve_for_write(base_dir: &Path, user_path: &str) -> Option<PathBuf> {
    let sanitized = sanitize(user_path);
    if sanitized.is_empty() {
        return None;
    }
    let base = base_dir.canonicalize().ok()?;
    let candidate = base.join(&sanitized);
    let file_name = candidate.file_name()?.to_os_string();
    let canonical_parent = candidate.parent()?.canonicalize().ok()?;
    canonical_parent
        .starts_with(&base)
        .then(|| canonical_parent.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_strips_traversal_and_url_prefix() {
        assert_eq!(sanitize("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize("..\\..\\windows"), "windows");
        assert_eq!(sanitize("http://evil.host/box/a.json"), "box/a.json");
        assert_eq!(sanitize("/box/a.json"), "box/a.json");
        assert_eq!(sanitize("sub/dir/file.json"), "sub/dir/file.json");
    }

    #[test]
    fn resolve_accepts_contained_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.json");
        std::fs::write(&file, b"{}").unwrap();

        let resolved = resolve(dir.path(), "a.json").unwrap();
        assert_eq!(resolved, file.canonicalize().unwrap());
    }

    #[test]
    fn resolve_rejects_missing_file() {
        let dir = tempdir().unwrap();
        assert!(resolve(dir.path(), "nope.json").is_none());
    }

    #[test]
    fn resolve_rejects_traversal() {
        let dir = tempdir().unwrap();
        // Even if the sanitized remainder happened to exist, it is looked up
        // under the base, never above it.
        assert!(resolve(dir.path(), "../../etc/passwd").is_none());
        assert!(resolve(dir.path(), "/etc/passwd").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlink_escape() {
        let outside = tempdir().unwrap();
        let secret = outside.path().join("secret.txt");
        std::fs::write(&secret, b"top secret").unwrap();

        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(&secret, dir.path().join("link.txt")).unwrap();

        assert!(resolve(dir.path(), "link.txt").is_none());
    }

    #[test]
    fn resolve_for_write_accepts_new_file_in_existing_dir() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let target = resolve_for_write(dir.path(), "sub/new.json").unwrap();
        assert!(target.starts_with(dir.path().canonicalize().unwrap()));
        assert!(target.ends_with("sub/new.json"));
    }

    #[test]
    fn resolve_for_write_rejects_missing_parent() {
        let dir = tempdir().unwrap();
        assert!(resolve_for_write(dir.path(), "no-such-dir/new.json").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_for_write_rejects_symlinked_parent_escape() {
        let outside = tempdir().unwrap();
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("out")).unwrap();

        assert!(resolve_for_write(dir.path(), "out/new.json").is_none());
    }

    #[test]
    fn resolve_for_write_rejects_empty() {
        let dir = tempdir().unwrap();
        assert!(resolve_for_write(dir.path(), "").is_none());
        assert!(resolve_for_write(dir.path(), "///").is_none());
    }
}
