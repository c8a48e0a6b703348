//! End-to-end tests against a real `typst` binary.
//!
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested, and additionally skip when no
//! `typst` executable is on `PATH`.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use lopdf::Document;
use std::process::Command;
use std::sync::Arc;
use tower::ServiceExt;
use typst_assemble::{router, Assembler, ServiceConfig};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set *and* typst is installed.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if Command::new("typst").arg("--version").output().is_err() {
            println!("SKIP: typst not found on PATH");
            return;
        }
    }};
}

const MAIN_TYP: &str = r#"#let data = json("data.json")
= #data.title

Generated for #data.customer.
"#;

const FRAGMENT_TYP: &str = "= Fragment\nThis page is spliced in.\n";

fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "e2eTypstAssembleBoundary";
    let mut body = Vec::new();
    for (name, file_name, bytes) in parts {
        let disposition = match file_name {
            Some(f) => format!("form-data; name=\"{name}\"; filename=\"{f}\""),
            None => format!("form-data; name=\"{name}\""),
        };
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: {disposition}\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

/// Compile a standalone document with the typst CLI to use as a fragment.
fn compile_fragment() -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("fragment.typ"), FRAGMENT_TYP).unwrap();
    let status = Command::new("typst")
        .args(["compile", "fragment.typ"])
        .current_dir(dir.path())
        .status()
        .unwrap();
    assert!(status.success(), "typst failed to compile the fragment");
    std::fs::read(dir.path().join("fragment.pdf")).unwrap()
}

async fn post(
    app: axum::Router,
    uri: &str,
    parts: &[(&str, Option<&str>, &[u8])],
) -> (StatusCode, Vec<u8>) {
    let (content_type, body) = multipart(parts);
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, bytes)
}

fn app() -> axum::Router {
    let config = ServiceConfig::builder()
        .compile_timeout_secs(60)
        .build()
        .unwrap();
    router(Arc::new(Assembler::new(config)))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_compile_with_sidecar() {
    e2e_skip_unless_ready!();

    let (status, pdf) = post(
        app(),
        "/typst/main.typ",
        &[
            ("main.typ", Some("main.typ"), MAIN_TYP.as_bytes()),
            ("data", None, &br#"{"title":"Quarterly Report","customer":"ACME"}"#[..]),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&pdf));
    assert!(pdf.starts_with(b"%PDF"));
    let doc = Document::load_mem(&pdf).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
}

#[tokio::test]
async fn test_compile_is_deterministic() {
    e2e_skip_unless_ready!();

    let parts: &[(&str, Option<&str>, &[u8])] = &[
        ("main.typ", Some("main.typ"), MAIN_TYP.as_bytes()),
        ("data", None, &br#"{"title":"Same","customer":"Same"}"#[..]),
    ];
    let (_, first) = post(app(), "/typst/main.typ", parts).await;
    let (_, second) = post(app(), "/typst/main.typ", parts).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_fragments_are_merged() {
    e2e_skip_unless_ready!();

    let fragment = compile_fragment();
    let (status, pdf) = post(
        app(),
        "/typst/main.typ",
        &[
            ("main.typ", Some("main.typ"), MAIN_TYP.as_bytes()),
            ("data", None, &br#"{"title":"Merged","customer":"ACME"}"#[..]),
            ("pre_1.pdf", Some("pre_1.pdf"), &fragment[..]),
            ("post_1.pdf", Some("post_1.pdf"), &fragment[..]),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&pdf));
    let doc = Document::load_mem(&pdf).unwrap();
    assert_eq!(doc.get_pages().len(), 3);
}

#[tokio::test]
async fn test_typst_error_is_reported() {
    e2e_skip_unless_ready!();

    let (status, body) = post(
        app(),
        "/typst/main.typ",
        &[("main.typ", Some("main.typ"), &b"#undefined-function()"[..])],
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("Compiler output:"), "got: {text}");
    assert!(text.contains("error"), "got: {text}");
}
