//! Graph store type definitions

use std::collections::HashMap;
use std::path::PathBuf;

/// A link target as emitted by the converter: either a note id, or a
/// filename that still needs resolution against the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    Id(i64),
    Filename(String),
}

/// One file's structured conversion result, ready to be folded into the
/// graph. Produced by the batch orchestrator, consumed by `upsert_note`.
#[derive(Debug, Clone)]
pub struct NoteRecord {
    /// Note id declared in the file itself; stable across re-processing
    pub id: i64,
    /// Normalized path relative to the note root
    pub filename: String,
    pub title: String,
    /// Rendered per-note fragment
    pub html: String,
    /// Modification marker captured when the file was read
    pub mtime: f64,
    /// Alias ids this note declares
    pub aliases: Vec<String>,
    /// Outgoing references
    pub links: Vec<LinkTarget>,
}

/// A filename with its stored modification marker
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub filename: String,
    pub mtime: f64,
}

/// A note flagged for review by the impact analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedNote {
    pub id: i64,
    pub title: String,
    pub filename: String,
}

/// A rendered fragment, in document order
#[derive(Debug, Clone)]
pub struct Fragment {
    pub id: i64,
    pub title: String,
    pub html: String,
}

/// Everything `arbor info` shows about one note
#[derive(Debug, Clone)]
pub struct NoteInfo {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub aliases: Vec<String>,
    /// (id, title) of notes this note links to
    pub outgoing: Vec<(i64, String)>,
    /// (id, title) of notes linking to this note
    pub incoming: Vec<(i64, String)>,
}

/// A link dropped during a batch commit because its target could not be
/// resolved to an existing note.
#[derive(Debug, Clone)]
pub struct DroppedLink {
    pub src_filename: String,
    pub target: String,
}

/// Graph statistics for `arbor graph status`
#[derive(Debug, Default)]
pub struct GraphStats {
    pub notes: usize,
    pub files: usize,
    pub links: usize,
    pub aliases: usize,
    pub by_extension: HashMap<String, usize>,
    /// Epoch seconds of the last completed run, 0.0 if never
    pub last_run: f64,
    pub db_path: PathBuf,
    pub db_size_bytes: u64,
}
