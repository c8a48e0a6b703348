//! Service configuration.
//!
//! Everything the service needs to know is decided once at startup and
//! carried in a [`ServiceConfig`], built via [`ServiceConfigBuilder`]. Request
//! handlers only ever read it; nothing consults the environment mid-request.

use crate::error::AssembleError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default listen port when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 8080;

/// Configuration for the document-assembly service.
///
/// # Example
/// ```rust
/// use typst_assemble::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .port(9000)
///     .compile_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 9000);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ServiceConfig {
    /// Interface to bind. Default: `0.0.0.0`.
    pub host: String,

    /// Listen port. Default: 8080.
    pub port: u16,

    /// Compiler executable, resolved through `PATH` unless absolute. Default: `typst`.
    pub compiler_program: String,

    /// Arguments placed before the target file name. Default: `["compile"]`.
    pub compiler_args: Vec<String>,

    /// Wall-clock limit for one compiler run, in seconds. Default: 120.
    ///
    /// A compiler still running at the deadline is killed and the request
    /// fails with a compile error.
    pub compile_timeout_secs: u64,

    /// Maximum compiler subprocesses running at once. Default: available parallelism.
    ///
    /// Requests beyond the limit wait for a slot before compiling; everything
    /// before the compile stage (upload, validation) still runs concurrently.
    pub max_concurrent_compiles: usize,

    /// Maximum accepted request body, in bytes. Default: 256 MiB.
    pub max_upload_bytes: usize,

    /// Directory under which per-request workspaces are created.
    /// If None, uses the system temporary directory.
    pub workspace_parent: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            compiler_program: "typst".to_string(),
            compiler_args: vec!["compile".to_string()],
            compile_timeout_secs: 120,
            max_concurrent_compiles: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_upload_bytes: 256 * 1024 * 1024,
            workspace_parent: None,
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn compiler_program(mut self, program: impl Into<String>) -> Self {
        self.config.compiler_program = program.into();
        self
    }

    pub fn compiler_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.compiler_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn compile_timeout_secs(mut self, secs: u64) -> Self {
        self.config.compile_timeout_secs = secs;
        self
    }

    pub fn max_concurrent_compiles(mut self, n: usize) -> Self {
        self.config.max_concurrent_compiles = n;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn workspace_parent(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workspace_parent = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, AssembleError> {
        let c = &self.config;
        if c.port == 0 {
            return Err(invalid("port must be non-zero"));
        }
        if c.compiler_program.trim().is_empty() {
            return Err(invalid("compiler program must not be empty"));
        }
        if c.compile_timeout_secs == 0 {
            return Err(invalid("compile timeout must be ≥ 1 second"));
        }
        if c.max_concurrent_compiles == 0 {
            return Err(invalid("concurrent compile limit must be ≥ 1"));
        }
        if c.max_upload_bytes == 0 {
            return Err(invalid("upload limit must be ≥ 1 byte"));
        }
        Ok(self.config)
    }
}

fn invalid(reason: &str) -> AssembleError {
    AssembleError::Internal(format!("Invalid configuration: {reason}"))
}
