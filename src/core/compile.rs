//! Document assembly via the external renderer
//!
//! Folds every current per-note fragment into one artifact. Reads the
//! graph, never writes it; safe to call repeatedly.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use miette::{IntoDiagnostic, Result};

use crate::core::graph::GraphStore;

/// Invokes the external renderer in document-assembly mode
pub struct Compiler<'a> {
    root: &'a Path,
    renderer: String,
    options: Vec<String>,
    output: PathBuf,
}

impl<'a> Compiler<'a> {
    pub fn new(root: &'a Path, renderer: String, options: Vec<String>, output: PathBuf) -> Self {
        Self {
            root,
            renderer,
            options,
            output,
        }
    }

    /// Assemble all fragments, pipe them through the renderer, and write
    /// the consolidated artifact. Returns the artifact path.
    pub fn compile(&self, store: &GraphStore) -> Result<PathBuf> {
        let fragments = store.fragments()?;

        let mut document = String::new();
        for fragment in &fragments {
            document.push_str(&format!(
                "<section class=\"note\" id=\"note-{}\" data-title=\"{}\">\n",
                fragment.id,
                attr_escape(&fragment.title)
            ));
            document.push_str(&fragment.html);
            document.push_str("\n</section>\n");
        }

        let mut child = Command::new(&self.renderer)
            .args(&self.options)
            .current_dir(self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .into_diagnostic()?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(document.as_bytes()).into_diagnostic()?;
        }
        drop(child.stdin.take());

        let output = child.wait_with_output().into_diagnostic()?;
        if !output.status.success() {
            return Err(miette::miette!(
                "renderer exited with status {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let artifact = self.root.join(&self.output);
        if let Some(parent) = artifact.parent() {
            std::fs::create_dir_all(parent).into_diagnostic()?;
        }
        std::fs::write(&artifact, &output.stdout).into_diagnostic()?;

        Ok(artifact)
    }
}

fn attr_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::core::graph::NoteRecord;
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

    fn record(id: i64, filename: &str, title: &str, html: &str) -> NoteRecord {
        NoteRecord {
            id,
            filename: filename.to_string(),
            title: title.to_string(),
            html: html.to_string(),
            mtime: 1.0,
            aliases: Vec::new(),
            links: Vec::new(),
        }
    }

    #[test]
    fn test_compile_assembles_fragments_in_id_order() {
        let tmp = tempdir().unwrap();
        let mut store = GraphStore::open_path(&tmp.path().join(".arbor/graph.db")).unwrap();
        store.upsert_note(&record(2, "b.md", "B", "<p>two</p>")).unwrap();
        store.upsert_note(&record(1, "a.md", "A", "<p>one</p>")).unwrap();

        // A pass-through renderer makes the assembled document observable.
        let renderer = write_script(tmp.path(), "fake-weave", "#!/bin/sh\ncat\n");
        let compiler = Compiler::new(
            tmp.path(),
            renderer,
            Vec::new(),
            PathBuf::from("index.html"),
        );

        let artifact = compiler.compile(&store).unwrap();
        let page = std::fs::read_to_string(&artifact).unwrap();
        let one = page.find("<p>one</p>").unwrap();
        let two = page.find("<p>two</p>").unwrap();
        assert!(one < two);
        assert!(page.contains("id=\"note-1\""));
        assert!(page.contains("data-title=\"A\""));
    }

    #[test]
    fn test_compile_escapes_title_attribute() {
        let tmp = tempdir().unwrap();
        let mut store = GraphStore::open_path(&tmp.path().join(".arbor/graph.db")).unwrap();
        store
            .upsert_note(&record(1, "a.md", "Tags & \"quotes\"", "<p>x</p>"))
            .unwrap();

        let renderer = write_script(tmp.path(), "fake-weave", "#!/bin/sh\ncat\n");
        let compiler = Compiler::new(
            tmp.path(),
            renderer,
            Vec::new(),
            PathBuf::from("index.html"),
        );

        let page = std::fs::read_to_string(compiler.compile(&store).unwrap()).unwrap();
        assert!(page.contains("data-title=\"Tags &amp; &quot;quotes&quot;\""));
    }

    #[test]
    fn test_compile_empty_graph_still_produces_artifact() {
        let tmp = tempdir().unwrap();
        let store = GraphStore::open_path(&tmp.path().join(".arbor/graph.db")).unwrap();

        let renderer = write_script(tmp.path(), "fake-weave", "#!/bin/sh\ncat\n");
        let compiler = Compiler::new(
            tmp.path(),
            renderer,
            Vec::new(),
            PathBuf::from("out/index.html"),
        );

        let artifact = compiler.compile(&store).unwrap();
        assert!(artifact.exists());
    }

    #[test]
    fn test_failing_renderer_surfaces_stderr() {
        let tmp = tempdir().unwrap();
        let store = GraphStore::open_path(&tmp.path().join(".arbor/graph.db")).unwrap();

        let renderer = write_script(
            tmp.path(),
            "fake-weave",
            "#!/bin/sh\necho render-broke >&2\nexit 2\n",
        );
        let compiler = Compiler::new(
            tmp.path(),
            renderer,
            Vec::new(),
            PathBuf::from("index.html"),
        );

        let err = compiler.compile(&store).unwrap_err();
        assert!(err.to_string().contains("render-broke"));
    }

    #[test]
    fn test_compile_does_not_mutate_the_store() {
        let tmp = tempdir().unwrap();
        let mut store = GraphStore::open_path(&tmp.path().join(".arbor/graph.db")).unwrap();
        store.upsert_note(&record(1, "a.md", "A", "<p>one</p>")).unwrap();
        store.set_timestamp(42.0).unwrap();

        let renderer = write_script(tmp.path(), "fake-weave", "#!/bin/sh\ncat\n");
        let compiler = Compiler::new(
            tmp.path(),
            renderer,
            Vec::new(),
            PathBuf::from("index.html"),
        );
        compiler.compile(&store).unwrap();
        compiler.compile(&store).unwrap();

        assert_eq!(store.timestamp().unwrap(), 42.0);
        let stats = store.stats().unwrap();
        assert_eq!(stats.notes, 1);
    }
}
