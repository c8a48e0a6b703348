//! Observer trait for per-request pipeline events.
//!
//! Every request walks the same state machine:
//!
//! ```text
//! Idle ─▶ WorkspaceAcquired ─▶ InputsClassified ─▶ Compiled ─▶ Assembled ─▶ Sent ─▶ Released
//!   │            │                    │               │            │
//!   └────────────┴────────────────────┴───────────────┴────────────┴──────────────▶ Released
//! ```
//!
//! `Released` is reachable from any state: a failing stage skips straight to
//! teardown. Inject an [`Arc<dyn PipelineObserver>`] into
//! [`crate::Assembler::with_observer`] to receive each transition as it
//! happens. The default is [`TracingObserver`].
//!
//! # Example
//!
//! ```rust
//! use typst_assemble::{PipelineObserver, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CompileCounter(AtomicUsize);
//!
//! impl PipelineObserver for CompileCounter {
//!     fn on_stage(&self, _request_id: u64, stage: Stage) {
//!         if stage == Stage::Compiled {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = CompileCounter(AtomicUsize::new(0));
//! counter.on_stage(1, Stage::Compiled);
//! assert_eq!(counter.0.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pipeline states a request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    WorkspaceAcquired,
    InputsClassified,
    Compiled,
    Assembled,
    Sent,
    Released,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::WorkspaceAcquired => "workspace-acquired",
            Stage::InputsClassified => "inputs-classified",
            Stage::Compiled => "compiled",
            Stage::Assembled => "assembled",
            Stage::Sent => "sent",
            Stage::Released => "released",
        };
        f.write_str(name)
    }
}

/// How a request ended, as reported to [`PipelineObserver::on_finished`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The PDF was handed to the transport.
    Delivered { bytes: usize, gzip: bool },
    /// A stage failed; `status` is the HTTP status sent back.
    Failed { status: u16, message: String },
}

/// Called by the pipeline as a request moves between stages.
///
/// Implementations must be `Send + Sync`: requests run concurrently on the
/// tokio runtime and share one observer. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// A request entered the pipeline.
    ///
    /// # Arguments
    /// * `request_id`: process-unique, monotonically increasing
    /// * `target`: primary compile target taken from the URL
    fn on_request(&self, request_id: u64, target: &str) {
        let _ = (request_id, target);
    }

    /// The request reached `stage`.
    fn on_stage(&self, request_id: u64, stage: Stage) {
        let _ = (request_id, stage);
    }

    /// Called exactly once per request, after [`Stage::Released`].
    fn on_finished(&self, request_id: u64, outcome: &Outcome, elapsed: Duration) {
        let _ = (request_id, outcome, elapsed);
    }
}

/// Discards every event.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Forwards events to `tracing`. Stage transitions go to `debug`, request
/// boundaries to `info`, failures to `warn`.
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_request(&self, request_id: u64, target: &str) {
        info!(request_id, document = target, "Assembling document");
    }

    fn on_stage(&self, request_id: u64, stage: Stage) {
        debug!(request_id, %stage, "Pipeline stage reached");
    }

    fn on_finished(&self, request_id: u64, outcome: &Outcome, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Outcome::Delivered { bytes, gzip } => {
                info!(request_id, bytes, gzip, elapsed_ms, "Document delivered");
            }
            Outcome::Failed { status, message } => {
                warn!(request_id, status, elapsed_ms, "Request failed: {}", message);
            }
        }
    }
}

/// Shared observer handle as stored in [`crate::Assembler`].
pub type SharedObserver = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<(u64, Stage)>>,
        finished: Mutex<Vec<Outcome>>,
    }

    impl PipelineObserver for Recorder {
        fn on_stage(&self, request_id: u64, stage: Stage) {
            self.stages.lock().unwrap().push((request_id, stage));
        }

        fn on_finished(&self, _request_id: u64, outcome: &Outcome, _elapsed: Duration) {
            self.finished.lock().unwrap().push(outcome.clone());
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_request(1, "main.typ");
        o.on_stage(1, Stage::Compiled);
        o.on_finished(1, &Outcome::Delivered { bytes: 10, gzip: false }, Duration::ZERO);
    }

    #[test]
    fn tracing_observer_handles_both_outcomes() {
        let o: SharedObserver = Arc::new(TracingObserver);
        o.on_request(7, "report.typ");
        o.on_stage(7, Stage::WorkspaceAcquired);
        o.on_finished(
            7,
            &Outcome::Failed { status: 500, message: "boom".into() },
            Duration::from_millis(3),
        );
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let r = Recorder::default();
        for s in [Stage::WorkspaceAcquired, Stage::InputsClassified, Stage::Released] {
            r.on_stage(3, s);
        }
        r.on_finished(3, &Outcome::Failed { status: 400, message: "x".into() }, Duration::ZERO);

        let stages: Vec<Stage> = r.stages.lock().unwrap().iter().map(|(_, s)| *s).collect();
        assert_eq!(
            stages,
            vec![Stage::WorkspaceAcquired, Stage::InputsClassified, Stage::Released]
        );
        assert_eq!(r.finished.lock().unwrap().len(), 1);
    }

    #[test]
    fn stage_display_is_kebab_case() {
        assert_eq!(Stage::WorkspaceAcquired.to_string(), "workspace-acquired");
        assert_eq!(Stage::Released.to_string(), "released");
    }
}
