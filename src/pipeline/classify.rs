//! Input classification: compile target, fragment sets, sidecar.
//!
//! Classification is pure. It decides names and ordering only; every upload
//! is still written to the workspace whatever its class.
//!
//! Fragments are PDFs whose name starts with `pre_` or `post_` (exact case)
//! and ends in `.pdf` (any case). Each set is sorted by raw byte order, so
//! `pre_10.pdf` sorts before `pre_2.pdf` and upload order never matters.

use crate::error::AssembleError;
use crate::pipeline::form::UploadedFile;

pub const PRE_PREFIX: &str = "pre_";
pub const POST_PREFIX: &str = "post_";

/// URL segment that names the route itself rather than a document.
const ROUTE_NAME: &str = "typst";

/// Ordered, de-duplicated fragment names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentSet(Vec<String>);

impl FragmentSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

/// Result of classifying one request's inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedInputs {
    pub target: String,
    pub pre: FragmentSet,
    pub post: FragmentSet,
    pub sidecar: Option<String>,
}

/// The document to compile: the final segment of the route path.
///
/// `route_path` must already be percent-decoded. A segment that is empty,
/// names the route itself, or would resolve outside the workspace is
/// rejected.
pub fn primary_target(route_path: &str) -> Result<String, AssembleError> {
    let name = last_component(route_path.trim_end_matches('/'));
    if name == ROUTE_NAME || !is_usable_name(name) {
        return Err(AssembleError::InvalidFilename);
    }
    Ok(name.to_string())
}

/// Reduce an uploaded part's declared file name to a bare file name.
///
/// Both `/` and `\` count as separators. Empty, `.` and `..` are rejected.
pub fn upload_name(declared: &str) -> Result<String, AssembleError> {
    let name = last_component(declared);
    if !is_usable_name(name) {
        return Err(AssembleError::InvalidUploadName {
            name: declared.to_string(),
        });
    }
    Ok(name.to_string())
}

/// Check that the sidecar is a JSON object and hand back the raw text.
pub fn validate_sidecar(raw: &str) -> Result<String, AssembleError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| AssembleError::InvalidSidecar {
            reason: e.to_string(),
        })?;
    if !value.is_object() {
        return Err(AssembleError::InvalidSidecar {
            reason: "expected a JSON object".to_string(),
        });
    }
    Ok(raw.to_string())
}

/// Names carrying `prefix` and a `.pdf` suffix, byte-sorted and unique.
pub fn fragment_set<'a, I>(names: I, prefix: &str) -> FragmentSet
where
    I: IntoIterator<Item = &'a str>,
{
    let mut picked: Vec<String> = names
        .into_iter()
        .filter(|n| is_fragment(n, prefix))
        .map(str::to_owned)
        .collect();
    picked.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
    picked.dedup();
    FragmentSet(picked)
}

/// Classify a request whose uploads already carry sanitized names.
pub fn classify(
    target: String,
    uploads: &[UploadedFile],
    sidecar: Option<String>,
) -> ClassifiedInputs {
    let names = || uploads.iter().map(|u| u.name.as_str());
    ClassifiedInputs {
        pre: fragment_set(names(), PRE_PREFIX),
        post: fragment_set(names(), POST_PREFIX),
        target,
        sidecar,
    }
}

fn is_fragment(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix)
        && name.len() >= 4
        && name
            .get(name.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf"))
}

fn last_component(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or_default()
}

fn is_usable_name(name: &str) -> bool {
    !(name.is_empty() || name == "." || name == ".." || name.contains('\0'))
}
