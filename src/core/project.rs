//! Note-root discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Represents an initialized note directory
#[derive(Debug)]
pub struct Project {
    /// Root directory of the notes (parent of .arbor/)
    root: PathBuf,
}

/// File inside .arbor/ holding the ordered glob patterns, one per line
const PATTERNS_FILE: &str = "patterns";

impl Project {
    /// Find the note root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current =
            std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find the note root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            let arbor_dir = current.join(".arbor");
            if arbor_dir.is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create the .arbor/ structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let arbor_dir = root.join(".arbor");
        if arbor_dir.exists() {
            return Err(ProjectError::AlreadyExists(root.clone()));
        }

        Self::write_structure(&arbor_dir)?;
        Ok(Self { root })
    }

    /// Force initialization even if .arbor/ exists
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::write_structure(&root.join(".arbor"))?;
        Ok(Self { root })
    }

    fn write_structure(arbor_dir: &Path) -> Result<(), ProjectError> {
        std::fs::create_dir_all(arbor_dir)
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        let patterns = arbor_dir.join(PATTERNS_FILE);
        if !patterns.exists() {
            std::fs::write(&patterns, "*.md\n*.markdown\n")
                .map_err(|e| ProjectError::IoError(e.to_string()))?;
        }

        let config = arbor_dir.join("config.yaml");
        if !config.exists() {
            std::fs::write(&config, Self::default_config())
                .map_err(|e| ProjectError::IoError(e.to_string()))?;
        }

        Ok(())
    }

    fn default_config() -> &'static str {
        r#"# Arbor project configuration

# Per-note converter command (must emit arbor's JSON metadata on stdout)
# converter: arbor-render

# Document-assembly renderer command (fragments on stdin, page on stdout)
# renderer: arbor-weave

# Opaque option strings passed through to the external tools
# content_options: ""
# document_options: ""

# Where the compiled page is written, relative to the note root
# output: index.html

# Worker pool size for conversion (default: number of CPUs)
# jobs: 4

# Serve per-run metadata to converter subprocesses over localhost
# metadata_service: false
"#
    }

    /// Get the note root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .arbor configuration directory
    pub fn arbor_dir(&self) -> PathBuf {
        self.root.join(".arbor")
    }

    /// Path of the graph database
    pub fn db_path(&self) -> PathBuf {
        self.arbor_dir().join("graph.db")
    }

    /// Ordered glob patterns defining which files are notes.
    /// First match governs inclusion.
    pub fn patterns(&self) -> Result<Vec<String>, ProjectError> {
        let text = std::fs::read_to_string(self.arbor_dir().join(PATTERNS_FILE))
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect())
    }

    /// Replace the pattern list
    pub fn set_patterns(&self, patterns: &[String]) -> Result<(), ProjectError> {
        let mut text = String::new();
        for pattern in patterns {
            if !pattern.is_empty() {
                text.push_str(pattern);
                text.push('\n');
            }
        }
        std::fs::write(self.arbor_dir().join(PATTERNS_FILE), text)
            .map_err(|e| ProjectError::IoError(e.to_string()))
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not an arbor note directory (searched from {searched_from:?}). Run 'arbor init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("arbor note directory already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}
