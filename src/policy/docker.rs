//! Read-only allowlist for the Docker Engine API.
//!
//! The dashboard only ever observes a Docker host, so the guard accepts
//! GET/HEAD against a fixed set of inspection endpoints and rejects
//! everything else before the request is built.

use regex::Regex;
use reqwest::Method;

use super::PolicyViolation;

/// Allowlisted, unversioned Docker Engine paths. Container/image ids are
/// constrained to the characters Docker actually emits.
const ALLOWED_PATH_PATTERNS: &[&str] = &[
    r"^/_ping$",
    r"^/version$",
    r"^/info$",
    r"^/containers/json$",
    r"^/containers/[A-Za-z0-9_.\-]+/json$",
    r"^/containers/[A-Za-z0-9_.\-]+/stats$",
    r"^/containers/[A-Za-z0-9_.\-]+/logs$",
    r"^/images/json$",
    r"^/images/[A-Za-z0-9_.\-:/@]+/json$",
];

/// Validates Docker Engine requests against the read-only allowlist.
#[derive(Debug, Clone)]
pub struct DockerRequestPolicy {
    patterns: Vec<Regex>,
}

impl DockerRequestPolicy {
    pub fn new() -> Self {
        let patterns = ALLOWED_PATH_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("allowlist pattern is a valid regex"))
            .collect();
        Self { patterns }
    }

    /// Accepts only GET/HEAD against an allowlisted path; anything else is
    /// a policy violation and the request is never sent.
    pub fn validate_request(&self, method: &Method, path: &str) -> Result<(), PolicyViolation> {
        if method != Method::GET && method != Method::HEAD {
            return Err(PolicyViolation::new(format!(
                "Docker access is read-only: method {} is not permitted",
                method
            )));
        }

        let normalized = normalize_path(path);
        if self.patterns.iter().any(|p| p.is_match(&normalized)) {
            Ok(())
        } else {
            Err(PolicyViolation::new(format!(
                "Docker endpoint {} is not on the read-only allowlist",
                normalized
            )))
        }
    }
}

impl Default for DockerRequestPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip any query string and ensure a leading slash so callers cannot
/// smuggle an unlisted path past the regex anchors.
fn normalize_path(path: &str) -> String {
    let without_query = path.split('?').next().unwrap_or(path);
    if without_query.starts_with('/') {
        without_query.to_string()
    } else {
        format!("/{}", without_query)
    }
}
