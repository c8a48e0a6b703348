//! Server binary for typst-assemble.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServiceConfig`, installs logging and serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use typst_assemble::{router, Assembler, ServiceConfig};

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port
  typst-assemble

  # Compile a document with a cover page and an appendix
  curl -F main.typ=@main.typ -F pre_cover.pdf=@pre_cover.pdf \
       -F post_appendix.pdf=@post_appendix.pdf -F 'data={"title":"Q3"}' \
       --compressed -o out.pdf http://localhost:8080/typst/main.typ

ENVIRONMENT VARIABLES:
  PORT                             Listen port (default 8080)
  TYPST_ASSEMBLE_HOST              Interface to bind
  TYPST_ASSEMBLE_COMPILER          Compiler executable
  TYPST_ASSEMBLE_COMPILER_ARGS     Space-separated arguments before the file name
  TYPST_ASSEMBLE_COMPILE_TIMEOUT   Seconds before a compile is killed
  TYPST_ASSEMBLE_MAX_COMPILES      Concurrent compiler processes
  TYPST_ASSEMBLE_MAX_UPLOAD        Maximum request body in bytes
  TYPST_ASSEMBLE_WORKDIR           Parent directory for per-request workspaces
  RUST_LOG                         Log filter, overrides -v / -q
"#;

/// Compile uploaded Typst documents to PDF over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "typst-assemble",
    version,
    about = "Compile uploaded Typst documents to PDF over HTTP",
    long_about = "Accepts a multipart upload of a Typst document and its assets, compiles it \
with the typst CLI, splices pre_*.pdf and post_*.pdf fragments around the result and returns \
the PDF, gzip-compressed when the client allows it.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "TYPST_ASSEMBLE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(short, long, env = "PORT", default_value_t = typst_assemble::config::DEFAULT_PORT)]
    port: u16,

    /// Compiler executable.
    #[arg(long, env = "TYPST_ASSEMBLE_COMPILER", default_value = "typst")]
    compiler: String,

    /// Argument placed before the file name; repeat for several.
    #[arg(
        long = "compiler-arg",
        env = "TYPST_ASSEMBLE_COMPILER_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true,
        default_value = "compile"
    )]
    compiler_args: Vec<String>,

    /// Seconds a single compile may run before it is killed.
    #[arg(long, env = "TYPST_ASSEMBLE_COMPILE_TIMEOUT", default_value_t = 120)]
    compile_timeout: u64,

    /// Concurrent compiler processes. Default: available parallelism.
    #[arg(long, env = "TYPST_ASSEMBLE_MAX_COMPILES")]
    max_compiles: Option<usize>,

    /// Maximum request body in bytes.
    #[arg(long, env = "TYPST_ASSEMBLE_MAX_UPLOAD", default_value_t = 256 * 1024 * 1024)]
    max_upload: usize,

    /// Parent directory for per-request workspaces. Default: system temp dir.
    #[arg(long, env = "TYPST_ASSEMBLE_WORKDIR")]
    workdir: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TYPST_ASSEMBLE_VERBOSE")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, env = "TYPST_ASSEMBLE_QUIET")]
    quiet: bool,
}

impl Cli {
    fn into_config(self) -> Result<ServiceConfig> {
        let mut builder = ServiceConfig::builder()
            .host(self.host)
            .port(self.port)
            .compiler_program(self.compiler)
            .compiler_args(self.compiler_args.into_iter().filter(|a| !a.is_empty()))
            .compile_timeout_secs(self.compile_timeout)
            .max_upload_bytes(self.max_upload);
        if let Some(n) = self.max_compiles {
            builder = builder.max_concurrent_compiles(n);
        }
        if let Some(dir) = self.workdir {
            builder = builder.workspace_parent(dir);
        }
        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Configuration ────────────────────────────────────────────────────
    let config = cli.into_config()?;
    info!(
        "Configuration: {}",
        serde_json::to_string(&config).unwrap_or_else(|_| format!("{config:?}"))
    );

    // ── Serve ────────────────────────────────────────────────────────────
    let addr = config.bind_address();
    let app = router(Arc::new(Assembler::new(config)));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server starting on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received; draining in-flight requests");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_flow_into_config() {
        let cli = Cli::try_parse_from([
            "typst-assemble",
            "--port",
            "9001",
            "--compiler",
            "/opt/typst/bin/typst",
            "--compiler-arg",
            "compile",
            "--compiler-arg",
            "--root=.",
            "--max-compiles",
            "2",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.compiler_program, "/opt/typst/bin/typst");
        assert_eq!(config.compiler_args, vec!["compile", "--root=."]);
        assert_eq!(config.max_concurrent_compiles, 2);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["typst-assemble", "--compile-timeout", "0"]).unwrap();
        assert!(cli.into_config().is_err());
    }
}
