//! Resolves the collection endpoint from an `EndpointConfig` JSON file, with
//! a hardcoded fallback. Deliberately permissive: any failure (missing
//! file, bad JSON, missing member) is swallowed and reported as "use the
//! default" rather than propagated — per §4.2 the parse is best-effort.

use std::fs;
use std::path::Path;

use serde::Deserialize;

#[derive(Deserialize)]
struct EndpointConfigFile {
    endpoint: String,
}

/// Read and parse `path` as an `EndpointConfig`, returning the `endpoint`
/// member on success. Returns `None` for any I/O or parse failure, or if
/// the `endpoint` member is absent — callers substitute their own default.
pub fn resolve_endpoint(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let parsed: EndpointConfigFile = serde_json::from_str(&contents).ok()?;
    Some(parsed.endpoint)
}
