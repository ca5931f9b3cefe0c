//! Rewriting of spider asset references.
//!
//! Rule-set documents point at their spider jar through a composite field,
//! `{path}[;md5;{hex32}]`. The hash is advisory: it is recomputed from the
//! on-disk asset every time a document is served, and any previous hash in
//! the field is discarded. A missing or unreadable asset degrades to the
//! bare path part so a stale document still displays.

use std::path::Path;

use md5::{Digest, Md5};

/// Literal separator between the asset path and its MD5 suffix.
pub const HASH_SEPARATOR: &str = ";md5;";

/// Recompute the hash suffix of a spider field.
///
/// The path part is resolved relative to `document_dir` (the directory of
/// the JSON document that carries the field) unless it is absolute. Returns
/// `"{path};md5;{hex32}"` when the asset is readable, otherwise the path
/// part alone. Idempotent: re-applying to its own output changes nothing.
pub fn rewrite(document_dir: &Path, spider_field: &str) -> String {
    let path_part = spider_field
        .split(HASH_SEPARATOR)
        .next()
        .unwrap_or_default();

    match hash_asset(document_dir, path_part) {
        Some(hash) => format!("{path_part}{HASH_SEPARATOR}{hash}"),
        None => path_part.to_string(),
    }
}

/// MD5 the referenced asset, if it resolves to a readable file.
fn hash_asset(document_dir: &Path, path_part: &str) -> Option<String> {
    if path_part.is_empty() {
        return None;
    }
    let raw = Path::new(path_part);
    let candidate = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        document_dir.join(raw)
    };
    let resolved = candidate.canonicalize().ok()?;
    if !resolved.is_file() {
        return None;
    }
    let bytes = std::fs::read(resolved).ok()?;
    let mut hasher = Md5::new();
    hasher.update(&bytes);
    Some(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // MD5("hello world")
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    #[test]
    fn rewrite_replaces_stale_hash() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("lib.jar"), b"hello world").unwrap();

        let out = rewrite(dir.path(), "./lib.jar;md5;deadbeefdeadbeefdeadbeefdeadbeef");
        assert_eq!(out, format!("./lib.jar;md5;{HELLO_MD5}"));
    }

    #[test]
    fn rewrite_adds_hash_when_absent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("lib.jar"), b"hello world").unwrap();

        assert_eq!(
            rewrite(dir.path(), "./lib.jar"),
            format!("./lib.jar;md5;{HELLO_MD5}")
        );
    }

    #[test]
    fn rewrite_is_idempotent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("lib.jar"), b"spider bytes").unwrap();

        let once = rewrite(dir.path(), "./lib.jar;md5;oldhash");
        let twice = rewrite(dir.path(), &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn rewrite_degrades_to_bare_path_on_missing_asset() {
        let dir = tempdir().unwrap();
        assert_eq!(rewrite(dir.path(), "./gone.jar;md5;oldhash"), "./gone.jar");
        assert_eq!(rewrite(dir.path(), "./gone.jar"), "./gone.jar");
    }

    #[test]
    fn rewrite_discards_all_trailing_segments() {
        let dir = tempdir().unwrap();
        // A field mangled by repeated naive appends still reduces to one hash.
        assert_eq!(rewrite(dir.path(), "a.jar;md5;x;md5;y"), "a.jar");
    }

    #[test]
    fn rewrite_resolves_subdirectory_assets() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("jar")).unwrap();
        std::fs::write(dir.path().join("jar/spider.jar"), b"hello world").unwrap();

        assert_eq!(
            rewrite(dir.path(), "./jar/spider.jar"),
            format!("./jar/spider.jar;md5;{HELLO_MD5}")
        );
    }

    #[test]
    fn rewrite_empty_field_stays_empty() {
        let dir = tempdir().unwrap();
        assert_eq!(rewrite(dir.path(), ""), "");
    }
}
