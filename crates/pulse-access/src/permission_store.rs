//! Email-keyed permission table and its snapshot-swap store.
//!
//! The table is parsed from a JSON document shaped like
//! `{"admin": ["ops@example.com"], "tablespace": ["dba@example.com"]}`.
//! Readers always observe a complete table: reloads build a new
//! [`PermissionTable`] and replace the shared pointer in one store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use thiserror::Error;

/// Reserved table key holding admin emails.
pub const ADMIN_PERMISSION_KEY: &str = "admin";

#[derive(Debug, Error)]
pub enum PermissionLoadError {
    #[error("failed to read permission file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed permission file {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// Immutable mapping of capability name to authorized emails.
///
/// Keys are kept exactly as written in the source document and matched
/// ASCII case-insensitively at lookup time. Emails are matched trimmed and
/// case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionTable {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl PermissionTable {
    pub fn from_entries<I, K, E, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, E)>,
        K: Into<String>,
        E: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, emails)| {
                let emails = emails
                    .into_iter()
                    .map(|email| email.as_ref().trim().to_string())
                    .filter(|email| !email.is_empty())
                    .collect::<BTreeSet<_>>();
                (key.into(), emails)
            })
            .collect();
        Self { entries }
    }

    /// Parses a permission document. Every value must be an array of strings.
    pub fn parse_json(raw: &str) -> Result<Self, String> {
        let document = serde_json::from_str::<Value>(raw).map_err(|error| error.to_string())?;
        let Value::Object(map) = document else {
            return Err("expected a JSON object at the document root".to_string());
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            if key.trim().is_empty() {
                return Err("permission keys must not be empty".to_string());
            }
            let Value::Array(items) = value else {
                return Err(format!("entry '{key}' must be an array of email strings"));
            };
            let mut emails = BTreeSet::new();
            for item in items {
                let Value::String(email) = item else {
                    return Err(format!("entry '{key}' contains a non-string value"));
                };
                let email = email.trim();
                if !email.is_empty() {
                    emails.insert(email.to_string());
                }
            }
            entries.insert(key, emails);
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Capability keys as written in the source document, admin excluded.
    pub fn capability_keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .keys()
            .filter(|key| !is_admin_key(key))
            .map(String::as_str)
    }

    pub fn is_admin(&self, email: &str) -> bool {
        self.grants(ADMIN_PERMISSION_KEY, email)
    }

    /// True when `email` is listed under `capability`. An absent key grants nothing.
    pub fn grants(&self, capability: &str, email: &str) -> bool {
        let capability = capability.trim();
        self.entries
            .iter()
            .filter(|(key, _)| key.trim().eq_ignore_ascii_case(capability))
            .any(|(_, emails)| contains_email(emails, email))
    }

    /// True when `email` appears under any entry other than `admin`.
    pub fn grants_any_capability(&self, email: &str) -> bool {
        self.entries
            .iter()
            .filter(|(key, _)| !is_admin_key(key))
            .any(|(_, emails)| contains_email(emails, email))
    }
}

fn is_admin_key(key: &str) -> bool {
    key.trim().eq_ignore_ascii_case(ADMIN_PERMISSION_KEY)
}

fn contains_email(emails: &BTreeSet<String>, email: &str) -> bool {
    let email = email.trim();
    !email.is_empty()
        && emails
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(email))
}

/// Outcome of a fail-soft reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionReloadReport {
    pub applied: bool,
    pub reason_code: String,
    pub entries: usize,
    pub diagnostics: Vec<String>,
}

/// Holds the current [`PermissionTable`] and reloads it from disk.
#[derive(Debug)]
pub struct PermissionStore {
    path: PathBuf,
    table: ArcSwap<PermissionTable>,
}

impl PermissionStore {
    /// Creates a store with an empty table. Nothing is read until [`Self::reload`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_table(path, PermissionTable::default())
    }

    pub fn with_table(path: impl Into<PathBuf>, table: PermissionTable) -> Self {
        Self {
            path: path.into(),
            table: ArcSwap::from_pointee(table),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Reads and parses the permission file without touching the current table.
    pub fn load(&self) -> Result<PermissionTable, PermissionLoadError> {
        let raw =
            std::fs::read_to_string(&self.path).map_err(|source| PermissionLoadError::Read {
                path: self.path.clone(),
                source,
            })?;
        PermissionTable::parse_json(&raw).map_err(|reason| PermissionLoadError::Malformed {
            path: self.path.clone(),
            reason,
        })
    }

    /// Loads the permission file and swaps it in. On failure the previous
    /// table stays in place and the error is only logged.
    pub fn reload(&self) -> PermissionReloadReport {
        match self.load() {
            Ok(table) => {
                let entries = table.len();
                self.table.store(Arc::new(table));
                tracing::info!(
                    path = %self.path.display(),
                    entries,
                    "permission table reloaded"
                );
                PermissionReloadReport {
                    applied: true,
                    reason_code: "permission_reload_applied".to_string(),
                    entries,
                    diagnostics: Vec::new(),
                }
            }
            Err(error) => {
                let retained = self.table.load().len();
                tracing::warn!(
                    path = %self.path.display(),
                    retained_entries = retained,
                    error = %error,
                    "permission reload failed; keeping previous table"
                );
                let reason_code = match error {
                    PermissionLoadError::Read { .. } => "permission_reload_read_failed",
                    PermissionLoadError::Malformed { .. } => "permission_reload_malformed",
                };
                PermissionReloadReport {
                    applied: false,
                    reason_code: reason_code.to_string(),
                    entries: retained,
                    diagnostics: vec![error.to_string()],
                }
            }
        }
    }

    /// Last successfully loaded table, or an empty one.
    pub fn current(&self) -> Arc<PermissionTable> {
        self.table.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_permissions(path: &Path, payload: &Value) {
        std::fs::write(path, format!("{payload}\n")).expect("write permissions");
    }

    #[test]
    fn unit_table_lookup_normalizes_capability_case_and_email_case() {
        let table = PermissionTable::from_entries([
            ("admin", vec!["root@x.com"]),
            ("ORCL", vec!["A@x.com"]),
        ]);
        assert!(table.grants("orcl", "a@x.com"));
        assert!(table.grants(" Orcl ", "a@X.com"));
        assert!(!table.grants("fra", "a@x.com"));
        assert!(table.is_admin("ROOT@x.com"));
        assert!(!table.is_admin("a@x.com"));
    }

    #[test]
    fn unit_grants_any_capability_excludes_admin_entries() {
        let table = PermissionTable::from_entries([
            ("admin", vec!["b@x.com"]),
            ("orcl", vec!["a@x.com"]),
        ]);
        assert!(table.grants_any_capability("a@x.com"));
        assert!(!table.grants_any_capability("b@x.com"));
        assert!(!table.grants_any_capability(""));
    }

    #[test]
    fn unit_parse_json_rejects_non_array_and_non_string_entries() {
        let error = PermissionTable::parse_json(r#"{"orcl": "a@x.com"}"#).expect_err("string");
        assert!(error.contains("must be an array"));
        let error = PermissionTable::parse_json(r#"{"orcl": ["a@x.com", 7]}"#).expect_err("num");
        assert!(error.contains("non-string"));
        let error = PermissionTable::parse_json(r#"["a@x.com"]"#).expect_err("root array");
        assert!(error.contains("JSON object"));
    }

    #[test]
    fn functional_reload_applies_table_and_reports_entry_count() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("permissions.json");
        write_permissions(
            &path,
            &serde_json::json!({"admin": ["b@x.com"], "tablespace": ["a@x.com"]}),
        );

        let store = PermissionStore::new(&path);
        assert!(store.current().is_empty());
        let report = store.reload();
        assert!(report.applied);
        assert_eq!(report.reason_code, "permission_reload_applied");
        assert_eq!(report.entries, 2);
        assert!(store.current().grants("tablespace", "a@x.com"));
    }

    #[test]
    fn functional_reload_is_idempotent_for_unchanged_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("permissions.json");
        write_permissions(
            &path,
            &serde_json::json!({"admin": [], "orcl": ["a@x.com", "c@x.com"]}),
        );

        let store = PermissionStore::new(&path);
        store.reload();
        let first = store.current();
        store.reload();
        let second = store.current();
        assert_eq!(*first, *second);
    }

    #[test]
    fn regression_failed_reload_keeps_previous_table() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("permissions.json");
        write_permissions(&path, &serde_json::json!({"orcl": ["a@x.com"]}));

        let store = PermissionStore::new(&path);
        assert!(store.reload().applied);

        std::fs::write(&path, "{not json").expect("corrupt file");
        let report = store.reload();
        assert!(!report.applied);
        assert_eq!(report.reason_code, "permission_reload_malformed");
        assert!(store.current().grants("orcl", "a@x.com"));

        std::fs::remove_file(&path).expect("remove file");
        let report = store.reload();
        assert_eq!(report.reason_code, "permission_reload_read_failed");
        assert!(store.current().grants("orcl", "a@x.com"));
    }

    #[test]
    fn regression_first_load_failure_leaves_empty_table() {
        let temp = tempdir().expect("tempdir");
        let store = PermissionStore::new(temp.path().join("missing.json"));
        let report = store.reload();
        assert!(!report.applied);
        assert!(store.current().is_empty());
    }

    #[test]
    fn integration_concurrent_readers_only_observe_whole_snapshots() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("permissions.json");
        let store = Arc::new(PermissionStore::new(&path));

        // Both snapshots keep the two capabilities in lockstep, so a mixed view
        // would show one grant without the other.
        let snapshot_a = serde_json::json!({"fra": ["a@x.com"], "tablespace": ["a@x.com"]});
        let snapshot_b = serde_json::json!({"fra": ["b@x.com"], "tablespace": ["b@x.com"]});

        let reader_store = Arc::clone(&store);
        let reader = std::thread::spawn(move || {
            for _ in 0..2_000 {
                let table = reader_store.current();
                assert_eq!(
                    table.grants("fra", "a@x.com"),
                    table.grants("tablespace", "a@x.com")
                );
                assert_eq!(
                    table.grants("fra", "b@x.com"),
                    table.grants("tablespace", "b@x.com")
                );
            }
        });

        for round in 0..200 {
            let payload = if round % 2 == 0 {
                &snapshot_a
            } else {
                &snapshot_b
            };
            write_permissions(&path, payload);
            store.reload();
        }
        reader.join().expect("reader thread");
    }
}
