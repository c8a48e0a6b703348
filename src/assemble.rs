//! Request orchestration: drive one request through every pipeline stage.
//!
//! [`Assembler`] is the only stateful piece of the service and its state is
//! either immutable (configuration, collaborators) or synchronised (the
//! compile semaphore, the request counter). It is shared across requests as
//! an `Arc`.
//!
//! Teardown is unconditional: whatever a stage returns, the workspace is
//! released before the response leaves [`Assembler::handle`]. A failed
//! removal after a successful request is logged and the PDF still goes out.

use crate::config::ServiceConfig;
use crate::error::AssembleError;
use crate::observer::{Outcome, PipelineObserver, SharedObserver, Stage, TracingObserver};
use crate::pipeline::classify;
use crate::pipeline::compile::{Compiler, TypstCompiler};
use crate::pipeline::form::{self, UploadedFile};
use crate::pipeline::merge::{self, LopdfEngine, MergeEngine};
use crate::pipeline::respond;
use crate::pipeline::workspace::Workspace;
use axum::extract::{FromRequest, FromRequestParts, Multipart, Path, Request};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::warn;

/// A response ready for the transport plus what the observer is told.
struct Delivery {
    response: Response,
    bytes: usize,
    gzip: bool,
}

/// Runs the document pipeline for incoming requests.
pub struct Assembler {
    config: Arc<ServiceConfig>,
    compiler: Arc<dyn Compiler>,
    engine: Arc<dyn MergeEngine>,
    compile_slots: Arc<Semaphore>,
    observer: SharedObserver,
    next_id: AtomicU64,
}

impl Assembler {
    /// Production wiring: `typst` subprocess, lopdf merge, tracing observer.
    pub fn new(config: ServiceConfig) -> Self {
        let compiler = TypstCompiler::new(
            config.compiler_program.clone(),
            config.compiler_args.clone(),
            config.compile_timeout(),
        );
        Self {
            compile_slots: Arc::new(Semaphore::new(config.max_concurrent_compiles)),
            config: Arc::new(config),
            compiler: Arc::new(compiler),
            engine: Arc::new(LopdfEngine),
            observer: Arc::new(TracingObserver),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_merge_engine(mut self, engine: Arc<dyn MergeEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Handle one request end to end. Never fails: errors become responses.
    ///
    /// Expects a request routed through [`crate::router`]: the compile
    /// target comes from the decoded `/typst/*path` capture.
    pub async fn handle(&self, request: Request) -> Response {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();

        let result = self.process(id, request).await;
        self.observer.on_stage(id, Stage::Released);

        let (response, outcome) = match result {
            Ok(delivery) => (
                delivery.response,
                Outcome::Delivered {
                    bytes: delivery.bytes,
                    gzip: delivery.gzip,
                },
            ),
            Err(e) => {
                let outcome = Outcome::Failed {
                    status: e.status().as_u16(),
                    message: e.to_string(),
                };
                (e.into_response(), outcome)
            }
        };
        self.observer.on_finished(id, &outcome, started.elapsed());
        response
    }

    async fn process(&self, id: u64, request: Request) -> Result<Delivery, AssembleError> {
        let (mut parts, body) = request.into_parts();
        if parts.method != Method::POST {
            return Err(AssembleError::MethodNotAllowed);
        }
        // `/typst` and `/typst/` carry no capture; undecodable paths land here too.
        let route_path = Path::<String>::from_request_parts(&mut parts, &())
            .await
            .map(|Path(path)| path)
            .unwrap_or_default();
        let target = classify::primary_target(&route_path)?;
        self.observer.on_request(id, &target);
        let gzip = respond::accepts_gzip(&parts.headers);
        let request = Request::from_parts(parts, body);

        let mut workspace = Workspace::acquire(self.config.workspace_parent.as_deref())?;
        self.observer.on_stage(id, Stage::WorkspaceAcquired);

        let result = self.run_stages(id, &mut workspace, target, gzip, request).await;

        match (result, workspace.release()) {
            (Ok(delivery), Ok(())) => Ok(delivery),
            (Ok(delivery), Err(e)) => {
                warn!(request_id = id, "{}", e);
                Ok(delivery)
            }
            (Err(e), released) => {
                if let Err(re) = released {
                    warn!(request_id = id, "{}", re);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        id: u64,
        workspace: &mut Workspace,
        target: String,
        gzip: bool,
        request: Request,
    ) -> Result<Delivery, AssembleError> {
        // ── Inputs ───────────────────────────────────────────────────────
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AssembleError::MalformedForm(e.body_text()))?;
        let form = form::read_form(multipart).await?;

        let sidecar = form
            .data
            .as_deref()
            .map(classify::validate_sidecar)
            .transpose()?;

        let uploads = form
            .files
            .into_iter()
            .map(|f| {
                Ok(UploadedFile {
                    name: classify::upload_name(&f.name)?,
                    bytes: f.bytes,
                })
            })
            .collect::<Result<Vec<_>, AssembleError>>()?;

        let inputs = classify::classify(target, &uploads, sidecar);
        for upload in &uploads {
            workspace.materialize(upload)?;
        }
        if let Some(json) = &inputs.sidecar {
            workspace.write_sidecar(json)?;
        }
        self.observer.on_stage(id, Stage::InputsClassified);

        // ── Compile ──────────────────────────────────────────────────────
        let artifact = {
            let _permit = self
                .compile_slots
                .acquire()
                .await
                .map_err(|e| AssembleError::Internal(format!("compile slots closed: {e}")))?;
            self.compiler.compile(workspace.root(), &inputs.target).await?
        };
        self.observer.on_stage(id, Stage::Compiled);

        // ── Merge ────────────────────────────────────────────────────────
        let pdf = merge::assemble(
            Arc::clone(&self.engine),
            workspace,
            &artifact,
            &inputs.pre,
            &inputs.post,
        )
        .await?;
        self.observer.on_stage(id, Stage::Assembled);

        // ── Respond ──────────────────────────────────────────────────────
        let bytes = pdf.len();
        let response = respond::encode(pdf, gzip)?;
        self.observer.on_stage(id, Stage::Sent);

        Ok(Delivery {
            response,
            bytes,
            gzip,
        })
    }
}

impl fmt::Debug for Assembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembler")
            .field("config", &self.config)
            .field("compile_slots", &self.compile_slots.available_permits())
            .field("requests", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
