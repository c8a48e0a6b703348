//! Merge orchestration: pre fragments, compiled artifact, post fragments.
//!
//! When a request carries no fragments the compiled PDF is returned byte for
//! byte and the engine is never touched. Otherwise the engine writes
//! `merged.pdf` into the workspace and that file becomes the response.
//!
//! The engine is synchronous and CPU-bound, so it runs on
//! `tokio::task::spawn_blocking`. The blocking task holds a workspace lease,
//! so a cancelled request cannot remove the directory under a running merge.

use crate::error::AssembleError;
use crate::pipeline::classify::FragmentSet;
use crate::pipeline::workspace::Workspace;
use pdf_concat::{ConcatError, MergeSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed name of the merge output inside the workspace.
pub const MERGED_NAME: &str = "merged.pdf";

/// Ordered list of PDFs to concatenate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    inputs: Vec<PathBuf>,
}

impl MergePlan {
    /// `[pre..., artifact, post...]`, fragment names resolved in `workspace`.
    pub fn new(workspace: &Path, artifact: &Path, pre: &FragmentSet, post: &FragmentSet) -> Self {
        let inputs = pre
            .names()
            .iter()
            .map(|n| workspace.join(n))
            .chain(std::iter::once(artifact.to_path_buf()))
            .chain(post.names().iter().map(|n| workspace.join(n)))
            .collect();
        Self { inputs }
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// True when the plan is just the compiled artifact.
    pub fn is_passthrough(&self) -> bool {
        self.inputs.len() == 1
    }
}

/// Concatenates PDFs in order into a single output file.
pub trait MergeEngine: Send + Sync {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergeSummary, ConcatError>;
}

/// [`MergeEngine`] backed by the `pdf-concat` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfEngine;

impl MergeEngine for LopdfEngine {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergeSummary, ConcatError> {
        pdf_concat::merge_files(inputs, output)
    }
}

/// Produce the final PDF bytes for a request.
pub async fn assemble(
    engine: Arc<dyn MergeEngine>,
    workspace: &Workspace,
    artifact: &Path,
    pre: &FragmentSet,
    post: &FragmentSet,
) -> Result<Vec<u8>, AssembleError> {
    let plan = MergePlan::new(workspace.root(), artifact, pre, post);
    if plan.is_passthrough() {
        debug!("No fragments; returning {} unchanged", artifact.display());
        return read_pdf(artifact).await;
    }

    let output = workspace.root().join(MERGED_NAME);
    let target = output.clone();
    let lease = workspace.lease();
    let summary = tokio::task::spawn_blocking(move || {
        let _lease = lease;
        engine.merge(plan.inputs(), &target)
    })
    .await
    .map_err(|e| AssembleError::Internal(format!("merge task failed: {e}")))??;
    info!(
        "Merged {} documents ({} pages, {} pre, {} post)",
        summary.documents,
        summary.pages,
        pre.len(),
        post.len()
    );

    read_pdf(&output).await
}

async fn read_pdf(path: &Path) -> Result<Vec<u8>, AssembleError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| AssembleError::FileRead {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source,
        })
}
