//! Positionally joined key and user files.
//!
//! Line *i* of the key file and line *i* of the user file describe the same
//! user. There is no join column: the line position is the only link, so any
//! operation that adds or removes a line must do it at the same index in both
//! files. Status changes only ever touch the user file.
//!
//! Every operation re-reads the files, transforms them in memory and writes
//! them back through a temp file and rename, all under one per-store lock.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::files::{atomic_write, ensure_trailing_newline, read_optional, read_optional_bytes};
use super::records::{DELIMITER, UserRecord, compose_status, join_lines, split_lines};

/// Errors raised by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Key file has {keys} lines but user file has {users}; refusing to {operation}")]
    LengthMismatch {
        operation: &'static str,
        keys: usize,
        users: usize,
    },

    #[error("Invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of a batch status update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchUpdate {
    /// Number of user lines rewritten.
    pub count: usize,

    /// Distinct names that matched at least one line, in file order.
    pub matched: Vec<String>,
}

/// Read-only consistency report over both files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreAudit {
    pub keys_present: bool,
    pub users_present: bool,
    pub key_count: usize,
    pub user_count: usize,
    /// 1-based line numbers of user lines without the `" -> "` delimiter.
    pub malformed_lines: Vec<usize>,
}

impl StoreAudit {
    /// Whether both files have the same number of lines.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.key_count == self.user_count
    }
}

/// Owner of the key file and the user file.
#[derive(Debug)]
pub struct RecordStore {
    keys_path: PathBuf,
    users_path: PathBuf,
    lock: Mutex<()>,
}

impl RecordStore {
    /// Creates a store over the given key and user files.
    ///
    /// Files are not touched until the first operation.
    #[must_use]
    pub fn new(keys_path: impl Into<PathBuf>, users_path: impl Into<PathBuf>) -> Self {
        Self {
            keys_path: keys_path.into(),
            users_path: users_path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the key file.
    #[must_use]
    pub fn keys_path(&self) -> &Path {
        &self.keys_path
    }

    /// Path of the user file.
    #[must_use]
    pub fn users_path(&self) -> &Path {
        &self.users_path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a new key/user pair at the end of both files.
    ///
    /// Refuses with [`StoreError::LengthMismatch`] when the files already
    /// differ in length, since the new pair would land at different indices.
    pub fn append(&self, key: &str, name: &str, status: &str) -> Result<(), StoreError> {
        check_key(key)?;
        check_name(name)?;
        check_single_line("status", status)?;

        let _guard = self.guard();

        let keys = read_optional(&self.keys_path)?.unwrap_or_default();
        let users = read_optional(&self.users_path)?.unwrap_or_default();
        check_aligned("append", &split_lines(&keys), &split_lines(&users))?;

        let mut keys = ensure_trailing_newline(keys);
        let mut users = ensure_trailing_newline(users);

        keys.push_str(key);
        keys.push('\n');
        users.push_str(&UserRecord::new(name, status).to_string());
        users.push('\n');

        atomic_write(&self.keys_path, &keys)?;
        atomic_write(&self.users_path, &users)?;

        debug!("Appended record for {}", name);
        Ok(())
    }

    /// Sets the status of every user line whose name is in `targets`.
    ///
    /// The new status is `"{status_base} {extra}"`, trimmed.
    pub fn batch_update_status<S: AsRef<str>>(
        &self,
        targets: &[S],
        status_base: &str,
        extra: &str,
    ) -> Result<BatchUpdate, StoreError> {
        let status = compose_status(status_base, extra);
        check_single_line("status", &status)?;
        let targets: HashSet<&str> = targets.iter().map(AsRef::as_ref).collect();

        let _guard = self.guard();

        let Some(content) = read_optional(&self.users_path)? else {
            return Ok(BatchUpdate::default());
        };

        let mut result = BatchUpdate::default();
        let lines: Vec<String> = split_lines(&content)
            .into_iter()
            .map(|line| match UserRecord::name_of(line) {
                Some(name) if targets.contains(name) => {
                    result.count += 1;
                    if !result.matched.iter().any(|m| m == name) {
                        result.matched.push(name.to_owned());
                    }
                    UserRecord::new(name, status.as_str()).to_string()
                }
                _ => line.to_owned(),
            })
            .collect();

        if result.count > 0 {
            atomic_write(&self.users_path, &join_lines(&lines))?;
            debug!("Set status '{}' on {} line(s)", status, result.count);
        }

        Ok(result)
    }

    /// Renames the first user named `old_name`, keeping its status.
    ///
    /// Returns `false` if no line matched.
    pub fn rename_user(&self, old_name: &str, new_name: &str) -> Result<bool, StoreError> {
        check_name(new_name)?;

        let _guard = self.guard();

        let Some(content) = read_optional(&self.users_path)? else {
            return Ok(false);
        };

        let mut lines: Vec<String> = split_lines(&content).into_iter().map(str::to_owned).collect();
        let position = lines
            .iter()
            .position(|line| UserRecord::name_of(line) == Some(old_name));

        let Some(idx) = position else {
            return Ok(false);
        };

        if let Some(record) = UserRecord::parse(&lines[idx]) {
            lines[idx] = UserRecord::new(new_name, record.status).to_string();
        }

        atomic_write(&self.users_path, &join_lines(&lines))?;
        debug!("Renamed {} to {}", old_name, new_name);
        Ok(true)
    }

    /// Removes every user whose name is in `targets` from both files.
    ///
    /// Lines are removed by index from the key file, since it has no names.
    /// Refuses with [`StoreError::LengthMismatch`] when the files have drifted
    /// to different lengths, leaving both untouched.
    pub fn delete_users<S: AsRef<str>>(&self, targets: &[S]) -> Result<usize, StoreError> {
        let targets: HashSet<&str> = targets.iter().map(AsRef::as_ref).collect();
        self.remove_pairs("delete", |_, user| {
            UserRecord::name_of(user).is_some_and(|n| targets.contains(n))
        })
    }

    /// Removes every pair whose key line, trimmed, is in `keys`.
    ///
    /// Same index-based removal and drift refusal as [`Self::delete_users`].
    pub fn delete_keys<S: AsRef<str>>(&self, keys: &[S]) -> Result<usize, StoreError> {
        let keys: HashSet<&str> = keys.iter().map(AsRef::as_ref).collect();
        self.remove_pairs("remove", |key, _| keys.contains(key.trim()))
    }

    /// Drops line pairs selected by `doomed(key_line, user_line)`.
    ///
    /// The predicate sees `""` for a line missing from the shorter file; a
    /// match there turns into a refusal rather than a write.
    fn remove_pairs<F>(&self, operation: &'static str, doomed: F) -> Result<usize, StoreError>
    where
        F: Fn(&str, &str) -> bool,
    {
        let _guard = self.guard();

        let (Some(keys), Some(users)) = (
            read_optional(&self.keys_path)?,
            read_optional(&self.users_path)?,
        ) else {
            return Ok(0);
        };

        let key_lines = split_lines(&keys);
        let user_lines = split_lines(&users);

        let indices: HashSet<usize> = (0..key_lines.len().max(user_lines.len()))
            .filter(|&idx| {
                let key = key_lines.get(idx).copied().unwrap_or_default();
                let user = user_lines.get(idx).copied().unwrap_or_default();
                doomed(key, user)
            })
            .collect();

        if indices.is_empty() {
            return Ok(0);
        }

        check_aligned(operation, &key_lines, &user_lines)?;

        atomic_write(&self.keys_path, &join_lines(&without_indices(key_lines, &indices)))?;
        atomic_write(&self.users_path, &join_lines(&without_indices(user_lines, &indices)))?;

        debug!("Removed {} record pair(s) on {}", indices.len(), operation);
        Ok(indices.len())
    }

    /// Rewrites every well-formed user line to carry `status`.
    pub fn clear_all_to_status(&self, status: &str) -> Result<usize, StoreError> {
        check_single_line("status", status)?;

        let _guard = self.guard();

        let Some(content) = read_optional(&self.users_path)? else {
            return Ok(0);
        };

        let mut count = 0;
        let lines: Vec<String> = split_lines(&content)
            .into_iter()
            .map(|line| match UserRecord::parse(line) {
                Some(record) => {
                    count += 1;
                    UserRecord::new(record.name, status).to_string()
                }
                None => line.to_owned(),
            })
            .collect();

        if count > 0 {
            atomic_write(&self.users_path, &join_lines(&lines))?;
        }

        Ok(count)
    }

    /// Empties the user file. The key file is left as is.
    pub fn truncate_approved(&self) -> Result<(), StoreError> {
        let _guard = self.guard();
        atomic_write(&self.users_path, "")
    }

    /// Returns the user file verbatim, or `None` if it does not exist.
    pub fn list_users(&self) -> Result<Option<String>, StoreError> {
        let _guard = self.guard();
        read_optional(&self.users_path)
    }

    /// Raw bytes of the key file.
    pub fn raw_keys(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let _guard = self.guard();
        read_optional_bytes(&self.keys_path)
    }

    /// Raw bytes of the user file.
    pub fn raw_users(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let _guard = self.guard();
        read_optional_bytes(&self.users_path)
    }

    /// Checks line counts and malformed user lines without modifying anything.
    pub fn audit(&self) -> Result<StoreAudit, StoreError> {
        let _guard = self.guard();

        let keys = read_optional(&self.keys_path)?;
        let users = read_optional(&self.users_path)?;

        let malformed_lines: Vec<usize> = users
            .as_deref()
            .map(|content| {
                split_lines(content)
                    .into_iter()
                    .enumerate()
                    .filter(|(_, line)| UserRecord::name_of(line).is_none())
                    .map(|(idx, _)| idx + 1)
                    .collect()
            })
            .unwrap_or_default();

        Ok(StoreAudit {
            keys_present: keys.is_some(),
            users_present: users.is_some(),
            key_count: keys.as_deref().map_or(0, |c| split_lines(c).len()),
            user_count: users.as_deref().map_or(0, |c| split_lines(c).len()),
            malformed_lines,
        })
    }
}

fn check_aligned(operation: &'static str, keys: &[&str], users: &[&str]) -> Result<(), StoreError> {
    if keys.len() != users.len() {
        return Err(StoreError::LengthMismatch {
            operation,
            keys: keys.len(),
            users: users.len(),
        });
    }
    Ok(())
}

fn without_indices<'a>(lines: Vec<&'a str>, doomed: &HashSet<usize>) -> Vec<&'a str> {
    lines
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !doomed.contains(idx))
        .map(|(_, line)| line)
        .collect()
}

fn check_single_line(field: &'static str, value: &str) -> Result<(), StoreError> {
    if value.contains(['\n', '\r']) {
        return Err(StoreError::InvalidField {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}

fn check_key(key: &str) -> Result<(), StoreError> {
    check_single_line("key", key)?;
    if key.is_empty() {
        return Err(StoreError::InvalidField {
            field: "key",
            value: key.to_owned(),
        });
    }
    Ok(())
}

fn check_name(name: &str) -> Result<(), StoreError> {
    check_single_line("name", name)?;
    if name.is_empty() || name.contains(DELIMITER) {
        return Err(StoreError::InvalidField {
            field: "name",
            value: name.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(keys: Option<&str>, users: Option<&str>) -> (TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("KEYS.txt"), dir.path().join("USERS.txt"));
        if let Some(keys) = keys {
            std::fs::write(store.keys_path(), keys).unwrap();
        }
        if let Some(users) = users {
            std::fs::write(store.users_path(), users).unwrap();
        }
        (dir, store)
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_append_to_empty_store() {
        let (_dir, store) = store_with(None, None);
        store.append("AA:BB:CC", "alice", "SAFE").unwrap();

        assert_eq!(read(store.keys_path()), "AA:BB:CC\n");
        assert_eq!(read(store.users_path()), "alice -> SAFE\n");
    }

    #[test]
    fn test_append_preserves_prior_lines() {
        let (_dir, store) = store_with(Some("KEY1\n"), Some("alice -> SAFE\n"));
        store.append("KEY2", "bob", "BAN").unwrap();

        assert_eq!(read(store.keys_path()), "KEY1\nKEY2\n");
        assert_eq!(read(store.users_path()), "alice -> SAFE\nbob -> BAN\n");
    }

    #[test]
    fn test_append_inserts_missing_newline() {
        let (_dir, store) = store_with(Some("KEY1"), Some("alice -> SAFE"));
        store.append("KEY2", "bob", "SAFE").unwrap();

        assert_eq!(read(store.keys_path()), "KEY1\nKEY2\n");
        assert_eq!(read(store.users_path()), "alice -> SAFE\nbob -> SAFE\n");
    }

    #[test]
    fn test_append_rejects_multiline_fields() {
        let (_dir, store) = store_with(None, None);
        assert!(matches!(
            store.append("KEY\nEVIL", "alice", "SAFE"),
            Err(StoreError::InvalidField { field: "key", .. })
        ));
        assert!(matches!(
            store.append("KEY", "a -> b", "SAFE"),
            Err(StoreError::InvalidField { field: "name", .. })
        ));
        assert!(!store.keys_path().exists());
    }

    #[test]
    fn test_batch_update_only_touches_matches() {
        let users = "alice -> SAFE\ngarbage line\nbob -> SAFE\ncarol -> BAN\n";
        let (_dir, store) = store_with(Some("K1\nK2\nK3\nK4\n"), Some(users));

        let result = store
            .batch_update_status(&["alice", "carol", "nobody"], "BAN", "")
            .unwrap();

        assert_eq!(result.count, 2);
        assert_eq!(result.matched, vec!["alice".to_owned(), "carol".to_owned()]);
        assert_eq!(
            read(store.users_path()),
            "alice -> BAN\ngarbage line\nbob -> SAFE\ncarol -> BAN\n"
        );
        assert_eq!(read(store.keys_path()), "K1\nK2\nK3\nK4\n");
    }

    #[test]
    fn test_batch_update_with_extra_text() {
        let (_dir, store) = store_with(Some("K1\n"), Some("alice -> SAFE\n"));
        store
            .batch_update_status(&["alice"], "CUSTOM", "trial ends monday")
            .unwrap();
        assert_eq!(read(store.users_path()), "alice -> CUSTOM trial ends monday\n");
    }

    #[test]
    fn test_batch_update_keeps_carriage_returns_on_other_lines() {
        let (_dir, store) = store_with(None, Some("alice -> SAFE\r\nbob -> SAFE\r\n"));
        store.batch_update_status(&["bob"], "BAN", "").unwrap();
        assert_eq!(read(store.users_path()), "alice -> SAFE\r\nbob -> BAN\n");
    }

    #[test]
    fn test_batch_update_missing_file() {
        let (_dir, store) = store_with(None, None);
        let result = store.batch_update_status(&["alice"], "BAN", "").unwrap();
        assert_eq!(result, BatchUpdate::default());
        assert!(!store.users_path().exists());
    }

    #[test]
    fn test_rename_user() {
        let (_dir, store) = store_with(Some("K1\n"), Some("alice -> SAFE\n"));
        assert!(store.rename_user("alice", "alicia").unwrap());
        assert_eq!(read(store.users_path()), "alicia -> SAFE\n");
        assert_eq!(read(store.keys_path()), "K1\n");
    }

    #[test]
    fn test_rename_not_found_leaves_file() {
        let (_dir, store) = store_with(None, Some("bob -> BAN\nnot a record\n"));
        assert!(!store.rename_user("alice", "alicia").unwrap());
        assert_eq!(read(store.users_path()), "bob -> BAN\nnot a record\n");
    }

    #[test]
    fn test_delete_preserves_positional_join() {
        let (_dir, store) = store_with(Some("KEY1\nKEY2\n"), Some("alice -> SAFE\nbob -> BAN\n"));

        assert_eq!(store.delete_users(&["alice"]).unwrap(), 1);
        assert_eq!(read(store.users_path()), "bob -> BAN\n");
        assert_eq!(read(store.keys_path()), "KEY2\n");
    }

    #[test]
    fn test_delete_with_malformed_line_keeps_alignment() {
        let (_dir, store) = store_with(
            Some("K1\nK2\nK3\n"),
            Some("garbage\nalice -> SAFE\nbob -> SAFE\n"),
        );

        assert_eq!(store.delete_users(&["bob"]).unwrap(), 1);
        assert_eq!(read(store.users_path()), "garbage\nalice -> SAFE\n");
        assert_eq!(read(store.keys_path()), "K1\nK2\n");
    }

    #[test]
    fn test_delete_twice_is_idempotent() {
        let (_dir, store) = store_with(Some("KEY1\nKEY2\n"), Some("alice -> SAFE\nbob -> BAN\n"));

        assert_eq!(store.delete_users(&["alice"]).unwrap(), 1);
        assert_eq!(store.delete_users(&["alice"]).unwrap(), 0);
        assert_eq!(read(store.keys_path()), "KEY2\n");
    }

    #[test]
    fn test_delete_missing_file_is_noop() {
        let (_dir, store) = store_with(None, Some("alice -> SAFE\n"));
        assert_eq!(store.delete_users(&["alice"]).unwrap(), 0);
        assert_eq!(read(store.users_path()), "alice -> SAFE\n");
    }

    #[test]
    fn test_delete_refuses_on_length_mismatch() {
        let (_dir, store) = store_with(Some("KEY1\n"), Some("alice -> SAFE\nbob -> BAN\n"));

        let err = store.delete_users(&["bob"]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::LengthMismatch {
                operation: "delete",
                keys: 1,
                users: 2
            }
        ));
        assert_eq!(read(store.keys_path()), "KEY1\n");
        assert_eq!(read(store.users_path()), "alice -> SAFE\nbob -> BAN\n");
    }

    #[test]
    fn test_append_refuses_after_truncate() {
        let (_dir, store) = store_with(None, None);
        store.append("OLDKEY1", "alice", "SAFE").unwrap();
        store.append("OLDKEY2", "carol", "SAFE").unwrap();
        store.truncate_approved().unwrap();

        let err = store.append("NEWKEY", "bob", "SAFE").unwrap_err();
        assert!(matches!(
            err,
            StoreError::LengthMismatch {
                operation: "append",
                keys: 2,
                users: 0
            }
        ));
        assert!(err.to_string().ends_with("refusing to append"));
        assert_eq!(read(store.keys_path()), "OLDKEY1\nOLDKEY2\n");
        assert_eq!(read(store.users_path()), "");
    }

    #[test]
    fn test_append_refuses_when_only_users_exist() {
        let (_dir, store) = store_with(None, Some("alice -> SAFE\n"));
        assert!(matches!(
            store.append("K2", "bob", "SAFE"),
            Err(StoreError::LengthMismatch { keys: 0, users: 1, .. })
        ));
        assert!(!store.keys_path().exists());
    }

    #[test]
    fn test_delete_keys_removes_pair_by_index() {
        let (_dir, store) = store_with(
            Some("AA:01\nBB:02\r\nCC:03\n"),
            Some("alice -> SAFE\nbob -> BAN\ncarol -> SAFE\n"),
        );

        assert_eq!(store.delete_keys(&["BB:02", "ZZ:99"]).unwrap(), 1);
        assert_eq!(read(store.keys_path()), "AA:01\nCC:03\n");
        assert_eq!(read(store.users_path()), "alice -> SAFE\ncarol -> SAFE\n");
    }

    #[test]
    fn test_delete_keys_removes_duplicates_and_malformed_partners() {
        let (_dir, store) = store_with(
            Some("K1\nK2\nK1\n"),
            Some("garbage\nbob -> SAFE\nx -> BAN\n"),
        );

        assert_eq!(store.delete_keys(&["K1"]).unwrap(), 2);
        assert_eq!(read(store.keys_path()), "K2\n");
        assert_eq!(read(store.users_path()), "bob -> SAFE\n");
    }

    #[test]
    fn test_delete_keys_refuses_on_length_mismatch() {
        let (_dir, store) = store_with(Some("K1\nK2\n"), Some("alice -> SAFE\n"));

        let err = store.delete_keys(&["K2"]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::LengthMismatch {
                operation: "remove",
                keys: 2,
                users: 1
            }
        ));
        assert_eq!(read(store.keys_path()), "K1\nK2\n");
        assert_eq!(read(store.users_path()), "alice -> SAFE\n");
    }

    #[test]
    fn test_delete_keys_no_match_is_zero() {
        let (_dir, store) = store_with(Some("K1\n"), Some("alice -> SAFE\nbob -> SAFE\n"));
        assert_eq!(store.delete_keys(&["K9"]).unwrap(), 0);
        assert_eq!(read(store.keys_path()), "K1\n");
    }

    #[test]
    fn test_clear_all_to_status() {
        let (_dir, store) = store_with(Some("K1\nK2\n"), Some("a -> SAFE\nb -> CUSTOM\n"));

        assert_eq!(store.clear_all_to_status("BAN").unwrap(), 2);
        assert_eq!(read(store.users_path()), "a -> BAN\nb -> BAN\n");
        assert_eq!(read(store.keys_path()), "K1\nK2\n");
    }

    #[test]
    fn test_clear_all_skips_malformed() {
        let (_dir, store) = store_with(None, Some("a -> SAFE\n???\n"));
        assert_eq!(store.clear_all_to_status("BAN").unwrap(), 1);
        assert_eq!(read(store.users_path()), "a -> BAN\n???\n");
    }

    #[test]
    fn test_truncate_approved() {
        let (_dir, store) = store_with(Some("K1\n"), Some("a -> SAFE\n"));
        store.truncate_approved().unwrap();
        assert_eq!(read(store.users_path()), "");
        assert_eq!(read(store.keys_path()), "K1\n");
    }

    #[test]
    fn test_list_users_reflects_last_write() {
        let (_dir, store) = store_with(None, None);
        assert_eq!(store.list_users().unwrap(), None);

        store.append("K1", "alice", "SAFE").unwrap();
        assert_eq!(store.list_users().unwrap().as_deref(), Some("alice -> SAFE\n"));

        store.batch_update_status(&["alice"], "BAN", "").unwrap();
        assert_eq!(store.list_users().unwrap().as_deref(), Some("alice -> BAN\n"));
    }

    #[test]
    fn test_audit() {
        let (_dir, store) = store_with(Some("K1\nK2\n"), Some("a -> SAFE\nbroken\nc -> BAN\n"));
        let audit = store.audit().unwrap();

        assert!(audit.keys_present && audit.users_present);
        assert_eq!(audit.key_count, 2);
        assert_eq!(audit.user_count, 3);
        assert_eq!(audit.malformed_lines, vec![2]);
        assert!(!audit.is_aligned());
    }

    #[test]
    fn test_audit_empty_store() {
        let (_dir, store) = store_with(None, None);
        let audit = store.audit().unwrap();
        assert!(!audit.keys_present);
        assert!(audit.is_aligned());
    }
}
