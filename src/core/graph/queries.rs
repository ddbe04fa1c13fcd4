//! Read-side queries over the note graph
//!
//! The impact analyzer lives here, alongside the lookups backing
//! `arbor info`, the compile step and `arbor graph`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;

use miette::{IntoDiagnostic, Result};
use rusqlite::{params, OptionalExtension};

use super::{repeat_vars, AffectedNote, Fragment, GraphStats, GraphStore, NoteInfo};

impl GraphStore {
    /// Impact analysis over the current (pre-purge) graph.
    ///
    /// Returns every still-valid note that references a stale filename:
    /// owners of aliases matching a stale note's id, plus sources of links
    /// pointing at a stale note. Notes that are themselves in the deleted
    /// subset are excluded, even when also referenced. Deduplicated,
    /// ordered by id ascending.
    pub fn find_affected(
        &self,
        stale: &[String],
        deleted: &[String],
    ) -> Result<Vec<AffectedNote>> {
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let stale_ids = self.ids_for_filenames(stale)?;
        if stale_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut affected: BTreeSet<i64> = BTreeSet::new();

        // (a) notes that declared an alias matching a stale note's id
        {
            let sql = format!(
                "SELECT owner FROM aliases WHERE id IN ({})",
                repeat_vars(stale_ids.len())
            );
            let mut stmt = self.conn.prepare(&sql).into_diagnostic()?;
            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(stale_ids.iter().map(i64::to_string)),
                    |row| row.get::<_, i64>(0),
                )
                .into_diagnostic()?;
            for row in rows {
                affected.insert(row.into_diagnostic()?);
            }
        }

        // (b) notes linking to a stale note
        {
            let sql = format!(
                "SELECT src FROM links WHERE dest IN ({})",
                repeat_vars(stale_ids.len())
            );
            let mut stmt = self.conn.prepare(&sql).into_diagnostic()?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(stale_ids.iter()), |row| {
                    row.get::<_, i64>(0)
                })
                .into_diagnostic()?;
            for row in rows {
                affected.insert(row.into_diagnostic()?);
            }
        }

        if affected.is_empty() {
            return Ok(Vec::new());
        }

        let deleted: HashSet<&str> = deleted.iter().map(String::as_str).collect();
        let ids: Vec<i64> = affected.into_iter().collect();
        let sql = format!(
            "SELECT id, title, filename FROM notes WHERE id IN ({}) ORDER BY id",
            repeat_vars(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql).into_diagnostic()?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                Ok(AffectedNote {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    filename: row.get(2)?,
                })
            })
            .into_diagnostic()?;

        let mut result = Vec::new();
        for row in rows {
            let note = row.into_diagnostic()?;
            if !deleted.contains(note.filename.as_str()) {
                result.push(note);
            }
        }
        Ok(result)
    }

    /// Note ids for the given filenames (missing filenames are skipped)
    fn ids_for_filenames(&self, filenames: &[String]) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT id FROM notes WHERE filename IN ({})",
            repeat_vars(filenames.len())
        );
        let mut stmt = self.conn.prepare(&sql).into_diagnostic()?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(filenames.iter()), |row| {
                row.get::<_, i64>(0)
            })
            .into_diagnostic()?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .into_diagnostic()
    }

    /// Everything `arbor info` shows about one note
    pub fn note_info(&self, id: i64) -> Result<Option<NoteInfo>> {
        let head: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT title, filename FROM notes WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .into_diagnostic()?;

        let Some((title, filename)) = head else {
            return Ok(None);
        };

        let mut aliases = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM aliases WHERE owner = ?1 ORDER BY id")
                .into_diagnostic()?;
            let rows = stmt
                .query_map(params![id], |row| row.get::<_, String>(0))
                .into_diagnostic()?;
            for row in rows {
                aliases.push(row.into_diagnostic()?);
            }
        }

        let outgoing = self.neighbor_titles(
            "SELECT n.id, n.title FROM links JOIN notes n ON n.id = links.dest
             WHERE links.src = ?1 ORDER BY n.id",
            id,
        )?;
        let incoming = self.neighbor_titles(
            "SELECT n.id, n.title FROM links JOIN notes n ON n.id = links.src
             WHERE links.dest = ?1 ORDER BY n.id",
            id,
        )?;

        Ok(Some(NoteInfo {
            id,
            title,
            filename,
            aliases,
            outgoing,
            incoming,
        }))
    }

    fn neighbor_titles(&self, sql: &str, id: i64) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare(sql).into_diagnostic()?;
        let rows = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))
            .into_diagnostic()?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .into_diagnostic()
    }

    /// All rendered fragments, id-ordered, for the compile step
    pub fn fragments(&self) -> Result<Vec<Fragment>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, html FROM notes ORDER BY id")
            .into_diagnostic()?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Fragment {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    html: row.get(2)?,
                })
            })
            .into_diagnostic()?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .into_diagnostic()
    }

    /// filename → id map served to converter subprocesses
    pub fn filename_ids(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT filename, id FROM notes ORDER BY filename")
            .into_diagnostic()?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .into_diagnostic()?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .into_diagnostic()
    }

    /// Graph statistics for `arbor graph status`
    pub fn stats(&self) -> Result<GraphStats> {
        let count = |table: &str| -> Result<usize> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as usize)
                .into_diagnostic()
        };

        let mut by_extension: HashMap<String, usize> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT filename FROM files")
                .into_diagnostic()?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .into_diagnostic()?;
            for row in rows {
                let filename = row.into_diagnostic()?;
                let ext = filename
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_string())
                    .unwrap_or_else(|| "(none)".to_string());
                *by_extension.entry(ext).or_insert(0) += 1;
            }
        }

        Ok(GraphStats {
            notes: count("notes")?,
            files: count("files")?,
            links: count("links")?,
            aliases: count("aliases")?,
            by_extension,
            last_run: self.timestamp()?,
            db_path: self.db_path.clone(),
            db_size_bytes: fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0),
        })
    }

    /// Execute raw SQL query (read-only)
    pub fn query_raw(&self, sql: &str) -> Result<Vec<Vec<String>>> {
        let mut stmt = self.conn.prepare(sql).into_diagnostic()?;
        let column_count = stmt.column_count();

        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let value: String = row
                        .get::<_, rusqlite::types::Value>(i)
                        .map(|v| match v {
                            rusqlite::types::Value::Null => "NULL".to_string(),
                            rusqlite::types::Value::Integer(i) => i.to_string(),
                            rusqlite::types::Value::Real(f) => f.to_string(),
                            rusqlite::types::Value::Text(s) => s,
                            rusqlite::types::Value::Blob(_) => "<blob>".to_string(),
                        })
                        .unwrap_or_default();
                    values.push(value);
                }
                Ok(values)
            })
            .into_diagnostic()?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .into_diagnostic()
    }

    /// Get column names for a query
    pub fn query_columns(&self, sql: &str) -> Result<Vec<String>> {
        let stmt = self.conn.prepare(sql).into_diagnostic()?;
        Ok(stmt.column_names().iter().map(|s| s.to_string()).collect())
    }
}
