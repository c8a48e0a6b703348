use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by pdf-concat operations.
#[derive(Error, Debug)]
pub enum ConcatError {
    /// Nothing to concatenate.
    #[error("No input documents were given")]
    EmptyInput,

    /// An input could not be read, or the output could not be created.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An input is not a parseable PDF.
    #[error("Failed to parse PDF '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    /// Serialising the merged document failed.
    #[error("Failed to write merged PDF '{path}': {detail}")]
    Write { path: PathBuf, detail: String },

    /// Object-level lookup failed while copying pages.
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// The document structure is unusable (broken page tree, cycles, …).
    #[error("Malformed PDF structure: {0}")]
    Structure(String),
}
