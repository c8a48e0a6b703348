//! Multipart body reader.
//!
//! Drains an axum [`Multipart`] stream into memory. Parts that declare a
//! non-empty file name are uploads; the first non-empty text field called
//! `data` is the JSON sidecar. Other text fields are ignored, and so is a
//! file part with `filename=""` (an optional file input left blank).

use crate::error::AssembleError;
use axum::extract::Multipart;
use tracing::debug;

/// Form field carrying the JSON sidecar.
pub const SIDECAR_FIELD: &str = "data";

/// One uploaded part, named by its declared file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Everything the pipeline takes from the request body.
#[derive(Debug, Default)]
pub struct FormInput {
    /// Uploads in the order they appeared in the body.
    pub files: Vec<UploadedFile>,
    /// Raw text of the `data` field, if present and non-empty.
    pub data: Option<String>,
}

/// Read the whole multipart body.
pub async fn read_form(mut multipart: Multipart) -> Result<FormInput, AssembleError> {
    let mut input = FormInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AssembleError::MalformedForm(e.body_text()))?
    {
        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .map(str::to_owned);
        let field_name = field.name().map(str::to_owned);

        match file_name {
            Some(name) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AssembleError::MalformedForm(e.body_text()))?;
                debug!("Received upload '{}' ({} bytes)", name, bytes.len());
                input.files.push(UploadedFile {
                    name,
                    bytes: bytes.to_vec(),
                });
            }
            None if field_name.as_deref() == Some(SIDECAR_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AssembleError::MalformedForm(e.body_text()))?;
                if input.data.is_none() && !text.is_empty() {
                    input.data = Some(text);
                }
            }
            None => {
                debug!("Ignoring form field {:?}", field_name);
            }
        }
    }

    Ok(input)
}
