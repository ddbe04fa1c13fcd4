//! Change detection against the stored graph
//!
//! Classifies the on-disk state of the note root against the store's file
//! records into added/modified/deleted sets. The three sets are pairwise
//! disjoint by construction: added files have no prior record, while
//! modified and deleted split the recorded files by existence.

use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use globset::{Glob, GlobMatcher};
use miette::{IntoDiagnostic, Result};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::core::graph::GraphStore;

/// The detector's partition of the current filesystem state.
/// All paths are relative to the note root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Changes {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Filenames that must be purged before reprocessing
    pub fn stale(&self) -> Vec<String> {
        self.modified
            .iter()
            .chain(self.deleted.iter())
            .cloned()
            .collect()
    }

    /// Filenames that must be (re-)processed
    pub fn pending(&self) -> Vec<String> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .cloned()
            .collect()
    }
}

/// Classifies on-disk files against the stored graph
#[derive(Debug)]
pub struct ChangeDetector {
    matchers: Vec<GlobMatcher>,
}

impl ChangeDetector {
    /// Compile the ordered pattern list. First match governs inclusion.
    pub fn new(patterns: &[String]) -> Result<Self, DetectError> {
        let mut matchers = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|source| DetectError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            matchers.push(glob.compile_matcher());
        }
        Ok(Self { matchers })
    }

    /// Whether a root-relative path counts as a note
    pub fn is_note(&self, relative: &str) -> bool {
        for matcher in &self.matchers {
            if matcher.is_match(relative) {
                return true;
            }
        }
        false
    }

    /// Classify the note root against the store
    pub fn detect(&self, root: &Path, store: &GraphStore) -> Result<Changes> {
        let timestamp = store.timestamp()?;
        let recorded: HashMap<String, f64> = store
            .list_files()?
            .into_iter()
            .map(|f| (f.filename, f.mtime))
            .collect();

        let mut changes = Changes::default();

        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let relative = match entry.path().strip_prefix(root) {
                Ok(rel) => rel.to_string_lossy().to_string(),
                Err(_) => continue,
            };
            if self.is_note(&relative) && !recorded.contains_key(&relative) {
                changes.added.push(relative);
            }
        }

        for filename in recorded.keys() {
            match file_mtime(&root.join(filename)) {
                // A stat failure between detection passes is a deletion,
                // not a crash.
                Err(_) => changes.deleted.push(filename.clone()),
                Ok(mtime) => {
                    if mtime > timestamp {
                        changes.modified.push(filename.clone());
                    }
                }
            }
        }

        changes.added.sort();
        changes.modified.sort();
        changes.deleted.sort();
        Ok(changes)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// File modification time as epoch seconds, sub-second where available
pub fn file_mtime(path: &Path) -> Result<f64> {
    let metadata = std::fs::metadata(path).into_diagnostic()?;
    let mtime = metadata
        .modified()
        .into_diagnostic()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(mtime)
}

/// Errors raised while compiling the pattern list
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid glob pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::NoteRecord;
    use tempfile::tempdir;

    fn detector() -> ChangeDetector {
        ChangeDetector::new(&["*.md".to_string(), "*.markdown".to_string()]).unwrap()
    }

    fn store_in(dir: &Path) -> GraphStore {
        GraphStore::open_path(&dir.join("graph.db")).unwrap()
    }

    fn record(id: i64, filename: &str) -> NoteRecord {
        NoteRecord {
            id,
            filename: filename.to_string(),
            title: filename.to_string(),
            html: String::new(),
            mtime: 0.0,
            aliases: Vec::new(),
            links: Vec::new(),
        }
    }

    #[test]
    fn test_new_files_are_added() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "# 1 A").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "not a note").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/b.md"), "# 2 B").unwrap();

        let db = tempdir().unwrap();
        let store = store_in(db.path());

        let changes = detector().detect(tmp.path(), &store).unwrap();
        assert_eq!(changes.added, vec!["a.md", "sub/b.md"]);
        assert!(changes.modified.is_empty());
        assert!(changes.deleted.is_empty());
    }

    #[test]
    fn test_hidden_directories_are_skipped() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(".arbor")).unwrap();
        std::fs::write(tmp.path().join(".arbor/x.md"), "not a note").unwrap();
        std::fs::write(tmp.path().join("a.md"), "# 1 A").unwrap();

        let db = tempdir().unwrap();
        let store = store_in(db.path());

        let changes = detector().detect(tmp.path(), &store).unwrap();
        assert_eq!(changes.added, vec!["a.md"]);
    }

    #[test]
    fn test_recorded_file_newer_than_timestamp_is_modified() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "# 1 A").unwrap();

        let db = tempdir().unwrap();
        let mut store = store_in(db.path());
        store.upsert_note(&record(1, "a.md")).unwrap();
        store.set_timestamp(0.0).unwrap();

        let changes = detector().detect(tmp.path(), &store).unwrap();
        assert!(changes.added.is_empty());
        assert_eq!(changes.modified, vec!["a.md"]);
        assert!(changes.deleted.is_empty());
    }

    #[test]
    fn test_recorded_file_older_than_timestamp_is_unchanged() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "# 1 A").unwrap();

        let db = tempdir().unwrap();
        let mut store = store_in(db.path());
        store.upsert_note(&record(1, "a.md")).unwrap();
        let far_future = file_mtime(&tmp.path().join("a.md")).unwrap() + 3600.0;
        store.set_timestamp(far_future).unwrap();

        let changes = detector().detect(tmp.path(), &store).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_missing_recorded_file_is_deleted() {
        let tmp = tempdir().unwrap();

        let db = tempdir().unwrap();
        let mut store = store_in(db.path());
        store.upsert_note(&record(1, "gone.md")).unwrap();
        store.set_timestamp(0.0).unwrap();

        let changes = detector().detect(tmp.path(), &store).unwrap();
        assert!(changes.added.is_empty());
        assert!(changes.modified.is_empty());
        assert_eq!(changes.deleted, vec!["gone.md"]);
    }

    #[test]
    fn test_partition_is_disjoint() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("new.md"), "# 1 New").unwrap();
        std::fs::write(tmp.path().join("edited.md"), "# 2 Edited").unwrap();

        let db = tempdir().unwrap();
        let mut store = store_in(db.path());
        store.upsert_note(&record(2, "edited.md")).unwrap();
        store.upsert_note(&record(3, "gone.md")).unwrap();
        store.set_timestamp(0.0).unwrap();

        let changes = detector().detect(tmp.path(), &store).unwrap();
        assert_eq!(changes.added, vec!["new.md"]);
        assert_eq!(changes.modified, vec!["edited.md"]);
        assert_eq!(changes.deleted, vec!["gone.md"]);

        for a in &changes.added {
            assert!(!changes.modified.contains(a));
            assert!(!changes.deleted.contains(a));
        }
        for m in &changes.modified {
            assert!(!changes.deleted.contains(m));
        }
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = ChangeDetector::new(&["a{".to_string()]).unwrap_err();
        assert!(matches!(err, DetectError::InvalidPattern { .. }));
    }

    #[test]
    fn test_stale_and_pending_sets() {
        let changes = Changes {
            added: vec!["a.md".into()],
            modified: vec!["m.md".into()],
            deleted: vec!["d.md".into()],
        };
        assert_eq!(changes.stale(), vec!["m.md", "d.md"]);
        assert_eq!(changes.pending(), vec!["a.md", "m.md"]);
    }
}
