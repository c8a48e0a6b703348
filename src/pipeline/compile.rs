//! Compiler adapter: run the external typesetter inside the workspace.
//!
//! ## Why a trait?
//!
//! The pipeline only needs "turn this file into a PDF next to it". Keeping
//! that behind [`Compiler`] lets the router tests run without a `typst`
//! binary and lets deployments point at a wrapper script.
//!
//! The child inherits nothing from the request except the working directory.
//! Its stderr is captured in full and returned as diagnostics on failure.
//! `kill_on_drop` ties the child's life to the request future: a timeout or a
//! dropped connection kills the process instead of leaking it.

use crate::error::AssembleError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Turns a source file inside a workspace into a PDF.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile `target` (a file name relative to `workspace`) and return the
    /// path of the produced PDF.
    async fn compile(&self, workspace: &Path, target: &str) -> Result<PathBuf, AssembleError>;
}

/// Name of the PDF the compiler writes for `target`.
///
/// ```rust
/// use typst_assemble::pipeline::compile::artifact_name;
/// assert_eq!(artifact_name("main.typ"), "main.pdf");
/// assert_eq!(artifact_name("notes"), "notes.pdf");
/// ```
pub fn artifact_name(target: &str) -> String {
    Path::new(target)
        .with_extension("pdf")
        .to_string_lossy()
        .into_owned()
}

/// Runs `<program> <args...> <target>` as a subprocess.
#[derive(Debug, Clone)]
pub struct TypstCompiler {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl TypstCompiler {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

impl Default for TypstCompiler {
    fn default() -> Self {
        Self::new("typst", vec!["compile".to_string()], Duration::from_secs(120))
    }
}

#[async_trait]
impl Compiler for TypstCompiler {
    async fn compile(&self, workspace: &Path, target: &str) -> Result<PathBuf, AssembleError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(target)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Running {} {} {} in {}",
            self.program,
            self.args.join(" "),
            target,
            workspace.display()
        );

        let child = cmd.spawn().map_err(|source| AssembleError::CompilerLaunch {
            program: self.program.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| AssembleError::CompilerLaunch {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                warn!(
                    "Compiler exceeded {}s on '{}'; killed",
                    self.timeout.as_secs(),
                    target
                );
                return Err(AssembleError::CompileTimeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(AssembleError::Compile {
                status: output.status.to_string(),
                diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(workspace.join(artifact_name(target)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A compiler that runs `script` through `sh`, with the target as `$1`.
    fn shell(script: &str, timeout: Duration) -> TypstCompiler {
        TypstCompiler::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            timeout,
        )
    }

    #[test]
    fn artifact_name_replaces_extension() {
        assert_eq!(artifact_name("main.typ"), "main.pdf");
        assert_eq!(artifact_name("report.v2.typ"), "report.v2.pdf");
        assert_eq!(artifact_name("plain"), "plain.pdf");
    }

    #[tokio::test]
    async fn success_returns_artifact_path_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let c = shell(r#"printf '%%PDF-1.7' > "${1%.*}.pdf""#, Duration::from_secs(10));
        let path = c.compile(dir.path(), "main.typ").await.unwrap();
        assert_eq!(path, dir.path().join("main.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn runs_inside_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.typ"), "x").unwrap();
        let c = shell(r#"test -f "$1""#, Duration::from_secs(10));
        c.compile(dir.path(), "main.typ").await.unwrap();
    }

    #[tokio::test]
    async fn failure_carries_stderr_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let c = shell(
            r#"echo "error: unknown variable: titel" >&2; exit 3"#,
            Duration::from_secs(10),
        );
        match c.compile(dir.path(), "main.typ").await {
            Err(AssembleError::Compile { status, diagnostics }) => {
                assert!(status.contains('3'), "status: {status}");
                assert_eq!(diagnostics, "error: unknown variable: titel\n");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_compiler_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let c = shell("sleep 5", Duration::from_millis(200));
        let err = c.compile(dir.path(), "main.typ").await.unwrap_err();
        assert!(matches!(err, AssembleError::CompileTimeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let c = TypstCompiler::new(
            "definitely-not-a-real-compiler-binary",
            vec![],
            Duration::from_secs(1),
        );
        let err = c.compile(dir.path(), "main.typ").await.unwrap_err();
        assert!(matches!(err, AssembleError::CompilerLaunch { .. }));
    }
}
