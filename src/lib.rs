//! # typst-assemble
//!
//! An HTTP service that compiles an uploaded Typst document to PDF and
//! splices it between caller-supplied PDF fragments.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /typst/main.typ  (multipart: main.typ, logo.png, pre_1.pdf, post_a.pdf, data=…)
//!  │
//!  ├─ 1. Workspace  fresh temp dir `typst-XXXX`, removed on every exit path
//!  ├─ 2. Inputs     write uploads; `data` field → data.json (must be a JSON object)
//!  ├─ 3. Classify   pre_*.pdf / post_*.pdf, byte-sorted
//!  ├─ 4. Compile    `typst compile main.typ` in the workspace (bounded, timed)
//!  ├─ 5. Merge      [pre…, main.pdf, post…] via pdf-concat (skipped if no fragments)
//!  └─ 6. Respond    application/pdf, gzip when Accept-Encoding allows
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use typst_assemble::{router, Assembler, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().port(8080).build()?;
//!     let addr = config.bind_address();
//!     let app = router(Arc::new(Assembler::new(config)));
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `typst-assemble` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod observer;
pub mod pipeline;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::Assembler;
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{AssembleError, ErrorKind};
pub use observer::{NoopObserver, Outcome, PipelineObserver, Stage, TracingObserver};
pub use pipeline::compile::{Compiler, TypstCompiler};
pub use pipeline::merge::{LopdfEngine, MergeEngine};
pub use server::{router, AppState};
