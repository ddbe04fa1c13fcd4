//! The full-run driving sequence
//!
//! detect → impact analysis over the pre-mutation graph → purge →
//! process → compile → advisory report. Stages are strictly ordered and
//! none is skipped on an empty input set; an empty purge/process/compile
//! is a correct no-op.

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use miette::Result;

use crate::core::batch::{BatchOrchestrator, BatchReport};
use crate::core::compile::Compiler;
use crate::core::config::Config;
use crate::core::convert::Converter;
use crate::core::detect::{ChangeDetector, Changes};
use crate::core::graph::{AffectedNote, GraphStore};
use crate::core::project::Project;
use crate::core::service::{MetadataService, RunMeta, ServiceHandle};

/// Everything one run did, for the CLI to report
#[derive(Debug)]
pub struct RunSummary {
    pub changes: Changes,
    pub report: BatchReport,
    /// Notes whose links/aliases may now be stale (advisory)
    pub affected: Vec<AffectedNote>,
    pub artifact: PathBuf,
    pub timestamp_advanced: bool,
}

/// Drives one complete incremental build
pub struct Engine<'a> {
    project: &'a Project,
    config: &'a Config,
}

impl<'a> Engine<'a> {
    pub fn new(project: &'a Project, config: &'a Config) -> Self {
        Self { project, config }
    }

    pub fn run(&self, store: &mut GraphStore) -> Result<RunSummary> {
        let root = self.project.root();

        let patterns = self
            .project
            .patterns()
            .map_err(|e| miette::miette!("{}", e))?;
        let detector = ChangeDetector::new(&patterns).map_err(|e| miette::miette!("{}", e))?;

        let changes = detector.detect(root, store)?;

        // Impact analysis must see the graph as it was before this run
        // mutates it.
        let affected = store.find_affected(&changes.stale(), &changes.deleted)?;

        store.purge(&changes.stale())?;

        let service = self.start_service(store)?;
        let converter = Converter::new(self.config.converter(), self.config.content_options())
            .with_meta_url(service.as_ref().map(|s| s.url().to_string()));

        let orchestrator = BatchOrchestrator::new(root, converter, self.config.jobs());
        let report = orchestrator.process(store, &changes.pending())?;

        // All workers are joined once process returns; shut the service
        // down before anything else happens.
        if let Some(service) = service {
            service.stop();
        }

        let compiler = Compiler::new(
            root,
            self.config.renderer(),
            self.config.document_options(),
            self.config.output(),
        );
        let artifact = compiler.compile(store)?;

        // The timestamp only advances after a clean process+compile cycle,
        // and a run that changed nothing leaves the store untouched.
        let timestamp_advanced = report.is_clean() && !changes.is_empty();
        if timestamp_advanced {
            store.set_timestamp(now_epoch())?;
        }

        Ok(RunSummary {
            changes,
            report,
            affected,
            artifact,
            timestamp_advanced,
        })
    }

    fn start_service(&self, store: &GraphStore) -> Result<Option<ServiceHandle>> {
        if !self.config.metadata_service() {
            return Ok(None);
        }
        let meta = RunMeta {
            root: self.project.root().to_string_lossy().to_string(),
            content_options: self.config.content_options(),
            notes: store.filename_ids()?.into_iter().collect(),
        };
        MetadataService::start(meta).map(Some)
    }
}

fn now_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
