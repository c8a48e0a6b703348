//! Pipeline stages for document assembly.
//!
//! Each submodule implements exactly one step of a request, so each can be
//! tested on its own and the external collaborators (compiler, merge engine)
//! can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! form ──▶ workspace ──▶ classify ──▶ compile ──▶ merge ──▶ respond
//! (multipart) (TempDir)   (names)     (typst)     (lopdf)   (gzip?)
//! ```
//!
//! 1. [`form`]      : drain the multipart body into uploads and the sidecar
//! 2. [`workspace`] : per-request directory; removed on every exit path
//! 3. [`classify`]  : compile target, ordered `pre_`/`post_` fragments,
//!    sidecar validation
//! 4. [`compile`]   : run the compiler subprocess with a deadline
//! 5. [`merge`]     : concatenate fragments around the compiled PDF; runs in
//!    `spawn_blocking` because the engine is synchronous
//! 6. [`respond`]   : negotiate gzip and build the PDF response

pub mod classify;
pub mod compile;
pub mod form;
pub mod merge;
pub mod respond;
pub mod workspace;
