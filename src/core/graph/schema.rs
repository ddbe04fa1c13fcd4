//! Database schema initialization

use miette::{IntoDiagnostic, Result};
use rusqlite::params;

use super::{GraphStore, SCHEMA_VERSION};

impl GraphStore {
    /// Initialize database schema
    pub(super) fn init_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- Single-row run metadata (last successful run timestamp)
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value REAL NOT NULL
            );

            -- Change-detection markers, one per on-disk note
            CREATE TABLE IF NOT EXISTS files (
                filename TEXT PRIMARY KEY,
                mtime REAL NOT NULL
            );

            -- One note per file; id is declared in the note itself
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                filename TEXT NOT NULL UNIQUE
                    REFERENCES files(filename) ON DELETE CASCADE,
                html TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_notes_filename ON notes(filename);

            -- Alias ids are unique graph-wide
            CREATE TABLE IF NOT EXISTS aliases (
                id TEXT PRIMARY KEY,
                owner INTEGER NOT NULL
                    REFERENCES notes(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_aliases_owner ON aliases(owner);

            -- Directed references; duplicate (src,dest) pairs collapse
            CREATE TABLE IF NOT EXISTS links (
                src INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                dest INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                PRIMARY KEY (src, dest)
            );
            CREATE INDEX IF NOT EXISTS idx_links_dest ON links(dest);
            "#,
            )
            .into_diagnostic()?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO meta (key, value) VALUES ('timestamp', 0.0)",
                [],
            )
            .into_diagnostic()?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .into_diagnostic()?;

        Ok(())
    }

    /// Check if schema version matches current version
    pub(super) fn needs_schema_rebuild(&self) -> Result<bool> {
        let current_version: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        Ok(current_version != SCHEMA_VERSION)
    }

    /// Drop all tables and reinitialize. Losing the graph is safe: an empty
    /// files table makes the next run re-detect every note as added.
    pub(super) fn reinitialize_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                DROP TABLE IF EXISTS schema_version;
                DROP TABLE IF EXISTS links;
                DROP TABLE IF EXISTS aliases;
                DROP TABLE IF EXISTS notes;
                DROP TABLE IF EXISTS files;
                DROP TABLE IF EXISTS meta;
                "#,
            )
            .into_diagnostic()?;

        self.init_schema()
    }
}
