//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::project::Project;

/// Arbor configuration with layered hierarchy
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-note converter command
    pub converter: Option<String>,

    /// Document-assembly renderer command
    pub renderer: Option<String>,

    /// Opaque option string passed to every converter invocation
    pub content_options: Option<String>,

    /// Opaque option string passed to the document renderer
    pub document_options: Option<String>,

    /// Output artifact path, relative to the note root
    pub output: Option<PathBuf>,

    /// Worker pool size for conversion
    pub jobs: Option<usize>,

    /// Host a per-run metadata endpoint for converter subprocesses
    pub metadata_service: Option<bool>,
}

/// Characters that make an option string invalid. The options are passed
/// to the external tools as argv entries, never through a shell, so any
/// shell metacharacter in them is a configuration mistake.
const FORBIDDEN: &[char] = &[';', '&', '|', '`', '$', '<', '>', '"', '\''];

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(project: &Project) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/arbor/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Ok(contents) = std::fs::read_to_string(&global_path) {
                    if let Ok(global) = serde_yml::from_str::<Config>(&contents) {
                        config.merge(global);
                    }
                }
            }
        }

        // 3. Project config (.arbor/config.yaml)
        let project_config_path = project.arbor_dir().join("config.yaml");
        if project_config_path.exists() {
            if let Ok(contents) = std::fs::read_to_string(&project_config_path) {
                if let Ok(project_config) = serde_yml::from_str::<Config>(&contents) {
                    config.merge(project_config);
                }
            }
        }

        // 4. Environment variables
        if let Ok(converter) = std::env::var("ARBOR_CONVERTER") {
            config.converter = Some(converter);
        }
        if let Ok(renderer) = std::env::var("ARBOR_RENDERER") {
            config.renderer = Some(renderer);
        }

        config
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "arbor")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.converter.is_some() {
            self.converter = other.converter;
        }
        if other.renderer.is_some() {
            self.renderer = other.renderer;
        }
        if other.content_options.is_some() {
            self.content_options = other.content_options;
        }
        if other.document_options.is_some() {
            self.document_options = other.document_options;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.jobs.is_some() {
            self.jobs = other.jobs;
        }
        if other.metadata_service.is_some() {
            self.metadata_service = other.metadata_service;
        }
    }

    /// The converter command name
    pub fn converter(&self) -> String {
        self.converter
            .clone()
            .unwrap_or_else(|| "arbor-render".to_string())
    }

    /// The document renderer command name
    pub fn renderer(&self) -> String {
        self.renderer
            .clone()
            .unwrap_or_else(|| "arbor-weave".to_string())
    }

    /// Content options, split into argv entries
    pub fn content_options(&self) -> Vec<String> {
        split_options(self.content_options.as_deref().unwrap_or(""))
    }

    /// Document options, split into argv entries
    pub fn document_options(&self) -> Vec<String> {
        split_options(self.document_options.as_deref().unwrap_or(""))
    }

    /// Output artifact path relative to the note root
    pub fn output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from("index.html"))
    }

    /// Worker pool size
    pub fn jobs(&self) -> usize {
        self.jobs.filter(|&n| n > 0).unwrap_or_else(num_cpus::get)
    }

    /// Whether to host the per-run metadata service
    pub fn metadata_service(&self) -> bool {
        self.metadata_service.unwrap_or(false)
    }

    /// Reject malformed option strings before any stage runs
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("content_options", self.content_options.as_deref()),
            ("document_options", self.document_options.as_deref()),
        ] {
            if let Some(value) = value {
                if let Some(bad) = value.chars().find(|c| FORBIDDEN.contains(c)) {
                    return Err(ConfigError::InvalidOptions {
                        field,
                        offending: bad,
                    });
                }
            }
        }
        Ok(())
    }
}

fn split_options(options: &str) -> Vec<String> {
    options.split_whitespace().map(String::from).collect()
}

/// Errors raised while validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} value: contains {offending:?} (options are passed as plain arguments, not through a shell)")]
    InvalidOptions {
        field: &'static str,
        offending: char,
    },
}
