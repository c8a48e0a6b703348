//! Error types for the typst-assemble service.
//!
//! Every pipeline stage returns `Result<_, AssembleError>`, so the first
//! failing stage decides the response. Variants fall into five kinds (see
//! [`ErrorKind`]), and the kind alone decides the HTTP status:
//!
//! | Kind | Status |
//! |------|--------|
//! | [`ErrorKind::BadRequest`] | 400 |
//! | [`ErrorKind::MethodNotAllowed`] | 405 |
//! | [`ErrorKind::Resource`] | 500 |
//! | [`ErrorKind::Compile`] | 500, compiler diagnostics in the body |
//! | [`ErrorKind::Merge`] | 500 |
//!
//! Nothing is retried.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use pdf_concat::ConcatError;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// All errors a request can end with.
#[derive(Debug, Error)]
pub enum AssembleError {
    // ── Request errors ────────────────────────────────────────────────────
    /// Anything other than POST on the compile route.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The URL's final segment is empty or the route's own name.
    #[error("Invalid filename")]
    InvalidFilename,

    /// The body is not a readable `multipart/form-data` payload.
    #[error("Failed to parse form: {0}")]
    MalformedForm(String),

    /// An uploaded part's file name cannot be used inside the workspace.
    #[error("Invalid upload file name '{name}'")]
    InvalidUploadName { name: String },

    /// The `data` field is not a JSON object.
    #[error("Invalid JSON data: {reason}")]
    InvalidSidecar { reason: String },

    // ── Resource errors ───────────────────────────────────────────────────
    /// The per-request temporary directory could not be created.
    #[error("Failed to create temporary directory: {0}")]
    WorkspaceCreate(#[source] std::io::Error),

    /// The per-request temporary directory could not be removed.
    #[error("Failed to remove temporary directory '{path}': {source}")]
    WorkspaceRelease {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing an uploaded file or the sidecar failed.
    #[error("Failed to save file '{name}': {source}")]
    FileWrite {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the compiled or merged PDF back failed.
    #[error("Failed to read generated PDF '{name}': {source}")]
    FileRead {
        name: String,
        #[source]
        source: std::io::Error,
    },

    // ── Compile errors ────────────────────────────────────────────────────
    /// The compiler executable could not be started.
    #[error("Failed to start compiler '{program}': {source}\nIs it installed and on PATH?")]
    CompilerLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The compiler exited unsuccessfully. `diagnostics` is its stderr, verbatim.
    #[error("Failed to compile document: {status}\n\nCompiler output:\n{diagnostics}")]
    Compile { status: String, diagnostics: String },

    /// The compiler ran past the configured deadline and was killed.
    #[error("Compiler did not finish within {secs}s and was terminated")]
    CompileTimeout { secs: u64 },

    // ── Merge errors ──────────────────────────────────────────────────────
    /// The merge engine rejected the plan.
    #[error("Failed to merge PDFs: {0}")]
    Merge(#[from] ConcatError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked task, closed semaphore).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`AssembleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    MethodNotAllowed,
    Resource,
    Compile,
    Merge,
}

impl AssembleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFilename
            | Self::MalformedForm(_)
            | Self::InvalidUploadName { .. }
            | Self::InvalidSidecar { .. } => ErrorKind::BadRequest,
            Self::MethodNotAllowed => ErrorKind::MethodNotAllowed,
            Self::WorkspaceCreate(_)
            | Self::WorkspaceRelease { .. }
            | Self::FileWrite { .. }
            | Self::FileRead { .. }
            | Self::Internal(_) => ErrorKind::Resource,
            Self::CompilerLaunch { .. } | Self::Compile { .. } | Self::CompileTimeout { .. } => {
                ErrorKind::Compile
            }
            Self::Merge(_) => ErrorKind::Merge,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Resource | ErrorKind::Compile | ErrorKind::Merge => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AssembleError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{self}\n"),
        )
            .into_response()
    }
}
