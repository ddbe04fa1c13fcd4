//! Concurrent batch conversion
//!
//! Groups pending files by content-type discriminator, fans each file out
//! to one external converter invocation on a bounded worker pool, then
//! folds all successful results into the graph in a single transaction.
//! Workers never touch the store; the orchestrator is the only writer.

use std::collections::BTreeMap;
use std::path::Path;

use miette::{IntoDiagnostic, Result};
use rayon::prelude::*;

use crate::core::convert::{ConvertError, Converter};
use crate::core::graph::{DroppedLink, GraphStore, NoteRecord};

/// What happened to one run's pending set
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Files successfully converted and committed
    pub processed: usize,
    /// Conversion failures, each carrying its path
    pub failures: Vec<ConvertError>,
    /// Files that disappeared between detection and read
    pub vanished: Vec<String>,
    /// Links whose targets resolved to no note
    pub dropped_links: Vec<DroppedLink>,
}

impl BatchReport {
    /// A clean report lets the timestamp advance
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Farms pending files out to the external converter
pub struct BatchOrchestrator<'a> {
    root: &'a Path,
    converter: Converter,
    jobs: usize,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(root: &'a Path, converter: Converter, jobs: usize) -> Self {
        Self {
            root,
            converter,
            jobs,
        }
    }

    /// Convert the pending files and commit the results.
    ///
    /// Failed files are left un-upserted: their purged state means the
    /// next run re-detects them. The whole set of successes commits as one
    /// transaction, so a crash mid-commit leaves no partial note.
    pub fn process(&self, store: &mut GraphStore, pending: &[String]) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        let mut files: Vec<String> = pending.to_vec();
        files.sort();
        files.dedup();
        if files.is_empty() {
            return Ok(report);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .into_diagnostic()?;

        let mut records: Vec<NoteRecord> = Vec::with_capacity(files.len());
        for (discriminator, batch) in group_by_discriminator(&files) {
            let results: Vec<std::result::Result<NoteRecord, ConvertError>> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|relative| self.converter.convert(self.root, relative, &discriminator))
                    .collect()
            });

            for result in results {
                match result {
                    Ok(record) => records.push(record),
                    Err(ConvertError::Vanished { path }) => report.vanished.push(path),
                    Err(err) => report.failures.push(err),
                }
            }
        }

        // Join barrier passed: every worker has returned. Commit what
        // succeeded before anything downstream reads the graph.
        report.processed = records.len();
        report.dropped_links = store.commit_batch(&records)?;

        Ok(report)
    }
}

/// Partition root-relative paths into batches by file-extension
/// discriminator. BTreeMap keeps batch order stable.
fn group_by_discriminator(files: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in files {
        let discriminator = Path::new(file)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "txt".to_string());
        groups.entry(discriminator).or_default().push(file.clone());
    }
    groups
}
