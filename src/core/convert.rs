//! External converter invocation
//!
//! One converter process per note file. The converter receives the path,
//! a content-type discriminator and the opaque content options, and emits
//! structured metadata plus the rendered fragment as JSON on stdout.

use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;
use thiserror::Error;

use crate::core::detect::file_mtime;
use crate::core::graph::{LinkTarget, NoteRecord};

/// Environment variable carrying the metadata service URL, when running
pub const META_URL_VAR: &str = "ARBOR_META_URL";

/// Structured output emitted by the converter for one note
#[derive(Debug, Deserialize)]
pub struct NoteOutput {
    /// Note id declared in the file
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub links: Vec<RawTarget>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A link target as serialized by the converter: a note id or a filename
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawTarget {
    Id(i64),
    Filename(String),
}

impl From<RawTarget> for LinkTarget {
    fn from(raw: RawTarget) -> Self {
        match raw {
            RawTarget::Id(id) => LinkTarget::Id(id),
            RawTarget::Filename(f) => LinkTarget::Filename(f),
        }
    }
}

/// Invokes the external per-note converter
#[derive(Debug, Clone)]
pub struct Converter {
    command: String,
    options: Vec<String>,
    meta_url: Option<String>,
}

impl Converter {
    pub fn new(command: String, options: Vec<String>) -> Self {
        Self {
            command,
            options,
            meta_url: None,
        }
    }

    /// Expose the metadata service to converter subprocesses
    pub fn with_meta_url(mut self, url: Option<String>) -> Self {
        self.meta_url = url;
        self
    }

    /// Convert one note file into a graph record
    pub fn convert(
        &self,
        root: &Path,
        relative: &str,
        discriminator: &str,
    ) -> Result<NoteRecord, ConvertError> {
        let path = root.join(relative);

        let mtime = match file_mtime(&path) {
            Ok(mtime) => mtime,
            // Deleted between detection and read: a deletion, not a crash
            Err(_) => {
                return Err(ConvertError::Vanished {
                    path: relative.to_string(),
                })
            }
        };

        let mut cmd = Command::new(&self.command);
        cmd.arg("--from")
            .arg(discriminator)
            .args(&self.options)
            .arg(&path)
            .current_dir(root)
            .stdin(Stdio::null());
        if let Some(url) = &self.meta_url {
            cmd.env(META_URL_VAR, url);
        }

        let output = cmd.output().map_err(|source| ConvertError::Io {
            path: relative.to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(ConvertError::Failed {
                path: relative.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed: NoteOutput =
            serde_json::from_slice(&output.stdout).map_err(|source| ConvertError::Parse {
                path: relative.to_string(),
                source,
            })?;

        Ok(NoteRecord {
            id: parsed.id,
            filename: relative.to_string(),
            title: parsed.title,
            html: parsed.html,
            mtime,
            aliases: parsed.aliases,
            links: parsed.links.into_iter().map(LinkTarget::from).collect(),
        })
    }
}

/// Probe an external tool before the store is even opened.
/// A missing tool is fatal at startup.
pub fn ensure_tool(command: &str) -> Result<(), ToolError> {
    match Command::new(command)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::Missing {
            command: command.to_string(),
        }),
        Err(source) => Err(ToolError::Io {
            command: command.to_string(),
            source,
        }),
    }
}

/// A single file's conversion failure, carrying the offending path
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{path}: converter exited with status {status}: {stderr}")]
    Failed {
        path: String,
        status: i32,
        stderr: String,
    },

    #[error("{path}: unreadable converter output")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: vanished before conversion")]
    Vanished { path: String },
}

impl ConvertError {
    /// The root-relative path of the file that failed
    pub fn path(&self) -> &str {
        match self {
            ConvertError::Failed { path, .. }
            | ConvertError::Parse { path, .. }
            | ConvertError::Io { path, .. }
            | ConvertError::Vanished { path } => path,
        }
    }
}

/// Errors raised by the startup tool probe
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("external tool not found: {command}")]
    Missing { command: String },

    #[error("cannot probe {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn write_script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_convert_parses_structured_output() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "# 1 Note A").unwrap();
        let script = write_script(
            tmp.path(),
            "fake-render",
            "#!/bin/sh\nprintf '%s' '{\"id\":1,\"title\":\"Note A\",\"html\":\"<p>A</p>\",\"links\":[2,\"b.md\"],\"aliases\":[\"a-alias\"]}'\n",
        );

        let converter = Converter::new(script, vec!["--mathjax".to_string()]);
        let record = converter.convert(tmp.path(), "a.md", "md").unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(record.title, "Note A");
        assert_eq!(record.filename, "a.md");
        assert_eq!(
            record.links,
            vec![
                LinkTarget::Id(2),
                LinkTarget::Filename("b.md".to_string())
            ]
        );
        assert_eq!(record.aliases, vec!["a-alias"]);
        assert!(record.mtime > 0.0);
    }

    #[test]
    fn test_failed_converter_reports_path_and_stderr() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "# 1 A").unwrap();
        let script = write_script(tmp.path(), "fake-render", "#!/bin/sh\necho boom >&2\nexit 3\n");

        let converter = Converter::new(script, Vec::new());
        let err = converter.convert(tmp.path(), "a.md", "md").unwrap_err();

        match err {
            ConvertError::Failed { path, status, stderr } => {
                assert_eq!(path, "a.md");
                assert_eq!(status, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_output_is_a_parse_error() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "# 1 A").unwrap();
        let script = write_script(tmp.path(), "fake-render", "#!/bin/sh\necho not-json\n");

        let converter = Converter::new(script, Vec::new());
        let err = converter.convert(tmp.path(), "a.md", "md").unwrap_err();
        assert!(matches!(err, ConvertError::Parse { .. }));
        assert_eq!(err.path(), "a.md");
    }

    #[test]
    fn test_vanished_file() {
        let tmp = tempdir().unwrap();
        let script = write_script(tmp.path(), "fake-render", "#!/bin/sh\nexit 0\n");

        let converter = Converter::new(script, Vec::new());
        let err = converter.convert(tmp.path(), "never-existed.md", "md").unwrap_err();
        assert!(matches!(err, ConvertError::Vanished { .. }));
    }

    #[test]
    fn test_ensure_tool_missing() {
        let err = ensure_tool("definitely-not-a-real-tool-3720").unwrap_err();
        assert!(matches!(err, ToolError::Missing { .. }));
    }

    #[test]
    fn test_ensure_tool_present() {
        assert!(ensure_tool("sh").is_ok());
    }
}
