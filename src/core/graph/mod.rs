//! SQLite-backed note graph store
//!
//! This module owns the persisted link/alias graph:
//! - Files: change-detection markers, one row per on-disk note
//! - Notes: one row per file, id declared in the note itself
//! - Aliases/Links: the reference graph, cascade-deleted with their notes
//! - Meta: the timestamp of the last completed successful run
//!
//! All mutations happen through `purge`, `upsert_note` and `commit_batch`;
//! every write path runs inside a transaction with foreign-key cascades
//! enforced, so a crash mid-batch never leaves a dangling partial note.

mod queries;
mod schema;
mod types;

pub use types::*;

use std::fs;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::project::Project;

/// Current schema version - the store is rebuilt on version mismatch
const SCHEMA_VERSION: i32 = 2;

/// The note graph backed by SQLite
pub struct GraphStore {
    conn: Connection,
    db_path: PathBuf,
}

impl GraphStore {
    /// Open or create the graph store for a project
    pub fn open(project: &Project) -> Result<Self> {
        Self::open_path(&project.db_path())
    }

    /// Open or create the graph store at an explicit path
    pub fn open_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).into_diagnostic()?;
        }

        let needs_init = !db_path.exists();
        let conn = Connection::open(db_path).into_diagnostic()?;

        // WAL for read concurrency; cascades must hold on every mutating
        // connection, so foreign_keys goes on right here at open.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .into_diagnostic()?;

        let mut store = Self {
            conn,
            db_path: db_path.to_path_buf(),
        };

        if needs_init {
            store.init_schema()?;
        } else if store.needs_schema_rebuild()? {
            store.reinitialize_schema()?;
        }

        Ok(store)
    }

    /// Timestamp of the last completed successful run (epoch seconds)
    pub fn timestamp(&self) -> Result<f64> {
        self.conn
            .query_row("SELECT value FROM meta WHERE key = 'timestamp'", [], |row| {
                row.get(0)
            })
            .into_diagnostic()
    }

    /// Advance the stored timestamp
    pub fn set_timestamp(&mut self, value: f64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE meta SET value = ?1 WHERE key = 'timestamp'",
                params![value],
            )
            .into_diagnostic()?;
        Ok(())
    }

    /// All currently recorded filenames with their stored markers
    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT filename, mtime FROM files ORDER BY filename")
            .into_diagnostic()?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FileRecord {
                    filename: row.get(0)?,
                    mtime: row.get(1)?,
                })
            })
            .into_diagnostic()?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .into_diagnostic()
    }

    /// Delete file and note rows for the given filenames, cascading their
    /// aliases and any link touching them. One transaction.
    pub fn purge(&mut self, filenames: &[String]) -> Result<usize> {
        if filenames.is_empty() {
            return Ok(0);
        }

        // Cascading-delete enforcement must be active for the duration of
        // this call; the pragma is connection-level, so assert it before
        // opening the transaction.
        self.conn
            .execute_batch("PRAGMA foreign_keys=ON;")
            .into_diagnostic()?;

        let tx = self.conn.transaction().into_diagnostic()?;
        let sql = format!(
            "DELETE FROM files WHERE filename IN ({})",
            repeat_vars(filenames.len())
        );
        let purged = tx
            .execute(&sql, rusqlite::params_from_iter(filenames.iter()))
            .into_diagnostic()?;
        tx.commit().into_diagnostic()?;

        Ok(purged)
    }

    /// Replace one note's row and its alias/link rows as one transaction.
    /// Link targets that resolve to no note are dropped and reported.
    pub fn upsert_note(&mut self, record: &NoteRecord) -> Result<Vec<DroppedLink>> {
        let tx = self.conn.transaction().into_diagnostic()?;
        write_note_row(&tx, record)?;
        let dropped = write_reference_rows(&tx, record)?;
        tx.commit().into_diagnostic()?;
        Ok(dropped)
    }

    /// Fold a whole batch of conversion results into the graph atomically.
    ///
    /// Note rows are written before any alias/link row so that references
    /// between files of the same batch resolve regardless of order. A
    /// constraint violation anywhere aborts the entire batch.
    pub fn commit_batch(&mut self, records: &[NoteRecord]) -> Result<Vec<DroppedLink>> {
        let mut dropped = Vec::new();
        let tx = self.conn.transaction().into_diagnostic()?;
        for record in records {
            write_note_row(&tx, record)?;
        }
        for record in records {
            dropped.extend(write_reference_rows(&tx, record)?);
        }
        tx.commit().into_diagnostic()?;
        Ok(dropped)
    }
}

/// Upsert the files row and the notes row for one record
fn write_note_row(conn: &Connection, record: &NoteRecord) -> Result<()> {
    // An id collision with a different live filename is a graph error,
    // not something to overwrite silently.
    let holder: Option<String> = conn
        .query_row(
            "SELECT filename FROM notes WHERE id = ?1",
            params![record.id],
            |row| row.get(0),
        )
        .optional()
        .into_diagnostic()?;
    if let Some(holder) = holder {
        if holder != record.filename {
            return Err(miette::miette!(
                "note id {} declared by {} is already used by {}",
                record.id,
                record.filename,
                holder
            ));
        }
    }

    conn.execute(
        r#"INSERT INTO files (filename, mtime) VALUES (?1, ?2)
           ON CONFLICT(filename) DO UPDATE SET mtime = excluded.mtime"#,
        params![record.filename, record.mtime],
    )
    .into_diagnostic()?;

    // If the file now declares a different id, the old note row for this
    // filename is superseded.
    conn.execute(
        "DELETE FROM notes WHERE filename = ?1 AND id <> ?2",
        params![record.filename, record.id],
    )
    .into_diagnostic()?;

    conn.execute(
        r#"INSERT INTO notes (id, title, filename, html) VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               filename = excluded.filename,
               html = excluded.html"#,
        params![record.id, record.title, record.filename, record.html],
    )
    .into_diagnostic()?;

    Ok(())
}

/// Replace one note's alias and link rows. The note row must exist.
fn write_reference_rows(conn: &Connection, record: &NoteRecord) -> Result<Vec<DroppedLink>> {
    conn.execute(
        "DELETE FROM aliases WHERE owner = ?1",
        params![record.id],
    )
    .into_diagnostic()?;

    for alias in &record.aliases {
        // A duplicate alias id owned by another note violates the primary
        // key and aborts the batch, by contract.
        conn.execute(
            "INSERT INTO aliases (id, owner) VALUES (?1, ?2)",
            params![alias, record.id],
        )
        .into_diagnostic()?;
    }

    conn.execute("DELETE FROM links WHERE src = ?1", params![record.id])
        .into_diagnostic()?;

    let mut dropped = Vec::new();
    for target in &record.links {
        match resolve_target(conn, target)? {
            Some(dest) => {
                conn.execute(
                    "INSERT OR IGNORE INTO links (src, dest) VALUES (?1, ?2)",
                    params![record.id, dest],
                )
                .into_diagnostic()?;
            }
            None => dropped.push(DroppedLink {
                src_filename: record.filename.clone(),
                target: match target {
                    LinkTarget::Id(id) => id.to_string(),
                    LinkTarget::Filename(f) => f.clone(),
                },
            }),
        }
    }

    Ok(dropped)
}

/// Resolve a link target to an existing note id, or None if dangling
fn resolve_target(conn: &Connection, target: &LinkTarget) -> Result<Option<i64>> {
    match target {
        LinkTarget::Id(id) => conn
            .query_row("SELECT id FROM notes WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .into_diagnostic(),
        LinkTarget::Filename(filename) => conn
            .query_row(
                "SELECT id FROM notes WHERE filename = ?1",
                params![filename],
                |row| row.get(0),
            )
            .optional()
            .into_diagnostic(),
    }
}

/// "?,?,?" placeholder list for parameterized IN clauses
fn repeat_vars(count: usize) -> String {
    let mut vars = "?,".repeat(count);
    vars.pop();
    vars
}
