//! Response encoding and content negotiation.
//!
//! The body is compressed in full before the response is built, so a
//! compression failure is still a clean 500. Once axum starts writing, I/O
//! errors belong to the transport.

use crate::error::AssembleError;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const CONTENT_DISPOSITION: &str = "attachment; filename=output.pdf";

/// Chunk size used when streaming the body to the client.
const CHUNK_SIZE: usize = 64 * 1024;

/// Whether the client's `Accept-Encoding` allows gzip.
///
/// `gzip` or `*` with a non-zero (or absent) `q` value counts; `gzip;q=0`
/// is an explicit refusal.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|item| {
            let mut parts = item.split(';');
            let coding = parts.next()?.trim();
            let quality = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((coding, quality))
        })
        .any(|(coding, q)| {
            (coding.eq_ignore_ascii_case("gzip") || coding == "*") && q > 0.0
        })
}

/// Gzip `bytes` with the default compression level.
pub fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Build the 200 response carrying the PDF.
pub fn encode(bytes: Vec<u8>, gzip_body: bool) -> Result<Response, AssembleError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE))
        .header(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static(CONTENT_DISPOSITION),
        );

    let payload = if gzip_body {
        builder = builder
            .header(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"))
            .header(header::VARY, HeaderValue::from_static("accept-encoding"));
        gzip(&bytes).map_err(|e| AssembleError::Internal(format!("gzip failed: {e}")))?
    } else {
        bytes
    };

    // Slices share the one buffer.
    let payload = Bytes::from(payload);
    let chunks: Vec<Result<Bytes, std::io::Error>> = (0..payload.len())
        .step_by(CHUNK_SIZE)
        .map(|start| Ok(payload.slice(start..payload.len().min(start + CHUNK_SIZE))))
        .collect();
    let body = Body::from_stream(futures::stream::iter(chunks));

    builder
        .body(body)
        .map_err(|e| AssembleError::Internal(format!("failed to build response: {e}")))
}
