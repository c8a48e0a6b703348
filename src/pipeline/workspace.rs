//! Per-request working directory.
//!
//! A [`Workspace`] owns a `TempDir`: dropping the handle removes the
//! directory, so early returns, panics and cancelled request futures all
//! clean up without help. [`Workspace::release`] does the same thing
//! explicitly and reports a failed removal.
//!
//! Work that outlives the request future (a `spawn_blocking` merge) holds a
//! [`WorkspaceLease`]; the directory is removed only once the last lease is
//! gone.

use crate::error::AssembleError;
use crate::pipeline::form::UploadedFile;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Name the sidecar JSON is written under.
pub const SIDECAR_NAME: &str = "data.json";

const DIR_PREFIX: &str = "typst-";

/// Exclusively owned scratch directory for one request.
#[derive(Debug)]
pub struct Workspace {
    dir: Arc<TempDir>,
    written: HashSet<String>,
}

/// Keeps a workspace directory on disk while background work uses it.
#[derive(Debug, Clone)]
pub struct WorkspaceLease {
    _dir: Arc<TempDir>,
}

impl Workspace {
    /// Create a fresh, uniquely named directory under `parent`
    /// (the system temp dir when `None`).
    pub fn acquire(parent: Option<&Path>) -> Result<Self, AssembleError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIR_PREFIX);
        let dir = match parent {
            Some(p) => builder.tempdir_in(p),
            None => builder.tempdir(),
        }
        .map_err(AssembleError::WorkspaceCreate)?;

        debug!("Acquired workspace {}", dir.path().display());
        Ok(Self {
            dir: Arc::new(dir),
            written: HashSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn lease(&self) -> WorkspaceLease {
        WorkspaceLease {
            _dir: Arc::clone(&self.dir),
        }
    }

    /// Write one uploaded entry into the workspace under its own name.
    ///
    /// The name must already be a single path component. A later entry with
    /// the same name replaces the earlier one.
    pub fn materialize(&mut self, entry: &UploadedFile) -> Result<PathBuf, AssembleError> {
        self.write_named(&entry.name, &entry.bytes)
    }

    /// Write the raw sidecar text to `data.json`, unchanged.
    pub fn write_sidecar(&mut self, json: &str) -> Result<PathBuf, AssembleError> {
        self.write_named(SIDECAR_NAME, json.as_bytes())
    }

    fn write_named(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf, AssembleError> {
        let path = self.dir.path().join(name);
        if !self.written.insert(name.to_string()) {
            warn!("Upload '{}' written more than once; keeping the last copy", name);
        }
        std::fs::write(&path, bytes).map_err(|source| AssembleError::FileWrite {
            name: name.to_string(),
            source,
        })?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Recursively delete the directory.
    ///
    /// With a lease still outstanding, removal falls to the last lease holder.
    pub fn release(self) -> Result<(), AssembleError> {
        let path = self.dir.path().to_path_buf();
        match Arc::try_unwrap(self.dir) {
            Ok(dir) => {
                dir.close()
                    .map_err(|source| AssembleError::WorkspaceRelease { path: path.clone(), source })?;
                debug!("Released workspace {}", path.display());
            }
            Err(_leased) => {
                debug!("Workspace {} still leased; removal deferred", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn acquire_creates_prefixed_directory_under_parent() {
        let parent = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(Some(parent.path())).unwrap();
        assert!(ws.root().is_dir());
        assert!(ws.root().starts_with(parent.path()));
        let name = ws.root().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("typst-"), "got {name}");
    }

    #[test]
    fn two_workspaces_never_share_a_directory() {
        let parent = tempfile::tempdir().unwrap();
        let a = Workspace::acquire(Some(parent.path())).unwrap();
        let b = Workspace::acquire(Some(parent.path())).unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn materialize_writes_bytes_verbatim() {
        let mut ws = Workspace::acquire(None).unwrap();
        let path = ws.materialize(&entry("main.typ", b"= Hello\n")).unwrap();
        assert_eq!(path, ws.root().join("main.typ"));
        assert_eq!(std::fs::read(&path).unwrap(), b"= Hello\n");
    }

    #[test]
    fn later_entry_with_same_name_wins() {
        let mut ws = Workspace::acquire(None).unwrap();
        ws.materialize(&entry("logo.png", b"first")).unwrap();
        let path = ws.materialize(&entry("logo.png", b"second")).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"second");
    }

    #[test]
    fn sidecar_is_written_unchanged() {
        let mut ws = Workspace::acquire(None).unwrap();
        let raw = "{ \"a\" : 1 }";
        let path = ws.write_sidecar(raw).unwrap();
        assert_eq!(path.file_name().unwrap(), "data.json");
        assert_eq!(std::fs::read_to_string(path).unwrap(), raw);
    }

    #[test]
    fn release_removes_directory_and_contents() {
        let mut ws = Workspace::acquire(None).unwrap();
        ws.materialize(&entry("pre_a.pdf", b"%PDF-1.7")).unwrap();
        let root = ws.root().to_path_buf();
        ws.release().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn drop_without_release_still_cleans_up() {
        let root = {
            let ws = Workspace::acquire(None).unwrap();
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn lease_keeps_directory_until_dropped() {
        let ws = Workspace::acquire(None).unwrap();
        let root = ws.root().to_path_buf();
        let lease = ws.lease();
        drop(ws);
        assert!(root.is_dir());
        drop(lease);
        assert!(!root.exists());
    }

    #[test]
    fn release_with_outstanding_lease_defers_removal() {
        let ws = Workspace::acquire(None).unwrap();
        let root = ws.root().to_path_buf();
        let lease = ws.lease();
        ws.release().unwrap();
        assert!(root.is_dir());
        drop(lease);
        assert!(!root.exists());
    }

    #[test]
    fn missing_parent_is_a_create_error() {
        let parent = tempfile::tempdir().unwrap();
        let gone = parent.path().join("does-not-exist");
        let err = Workspace::acquire(Some(&gone)).unwrap_err();
        assert!(matches!(err, AssembleError::WorkspaceCreate(_)));
    }
}
