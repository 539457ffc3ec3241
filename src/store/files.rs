//! Whole-file read and atomic write helpers.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::StoreError;

/// Reads a file to a string, treating a missing file as `None`.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Reads raw file bytes, treating a missing file as `None`.
pub(crate) fn read_optional_bytes(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Returns the sibling temp path used while rewriting `path`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("records"), ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `contents` to a temp file next to `path` and renames it into place.
pub(crate) fn atomic_write(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp = temp_path(path);
    std::fs::write(&tmp, contents).map_err(|e| StoreError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Returns `content` with a trailing newline added if it is non-empty and lacks one.
pub(crate) fn ensure_trailing_newline(mut content: String) -> String {
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("nope.txt")).unwrap().is_none());
        assert!(read_optional_bytes(&dir.path().join("nope.txt")).unwrap().is_none());
    }

    #[test]
    fn test_atomic_write_replaces_and_cleans_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("USERS.txt");
        std::fs::write(&path, "old\n").unwrap();

        atomic_write(&path, "new\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_atomic_write_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("KEYS.txt");
        atomic_write(&path, "KEY1\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "KEY1\n");
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let path = Path::new("/var/lib/bot/KEYS.txt");
        assert_eq!(temp_path(path), PathBuf::from("/var/lib/bot/KEYS.txt.tmp"));
    }

    #[test]
    fn test_ensure_trailing_newline() {
        assert_eq!(ensure_trailing_newline("a".to_owned()), "a\n");
        assert_eq!(ensure_trailing_newline("a\n".to_owned()), "a\n");
        assert_eq!(ensure_trailing_newline(String::new()), "");
    }
}
