//! SignalK path helpers and subscription pattern matching.
//!
//! SignalK paths are dot-separated strings like "navigation.speedOverGround".
//! The store keeps them flat; the tree is only materialized when rendering.
//!
//! Pattern matching is a single-wildcard glob rather than a regex so that it
//! stays cheap when run for every changed path against every client.

/// A subscription pattern.
///
/// Supported patterns:
/// - Everything: `*` (or an empty pattern)
/// - Prefix: `navigation.*`
/// - Suffix: `*.position`
/// - Prefix and suffix: `propulsion.*.revolutions`
/// - Exact: `navigation.speedOverGround`
///
/// Only the first `*` is a wildcard. The path must start with the text before
/// it and end with the text after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternKind {
    Any,
    Glob { prefix: String, suffix: String },
    Exact,
}

impl PathPattern {
    /// Compile a pattern. Never fails; an empty pattern matches everything.
    pub fn new(pattern: &str) -> Self {
        let kind = if pattern.is_empty() || pattern == "*" {
            PatternKind::Any
        } else if let Some((prefix, suffix)) = pattern.split_once('*') {
            PatternKind::Glob {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            }
        } else {
            PatternKind::Exact
        };

        Self {
            raw: pattern.to_string(),
            kind,
        }
    }

    /// Check if a path matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match &self.kind {
            PatternKind::Any => true,
            PatternKind::Glob { prefix, suffix } => {
                path.starts_with(prefix.as_str())
                    && (suffix.is_empty() || path.ends_with(suffix.as_str()))
            }
            PatternKind::Exact => path == self.raw,
        }
    }

    /// Get the raw pattern string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Match a path against a raw pattern string without compiling it first.
pub fn glob_matches(pattern: &str, path: &str) -> bool {
    PathPattern::new(pattern).matches(path)
}

/// Strip a `vessels.self.` or `vessels.<self urn>.` prefix from a path
/// written by a client, leaving a store-relative path.
///
/// `self_urn` is the bare URN (e.g. "urn:mrn:signalk:uuid:...").
pub fn strip_vessel_prefix<'a>(path: &'a str, self_urn: &str) -> &'a str {
    if let Some(rest) = path.strip_prefix("vessels.self.") {
        return rest;
    }
    if let Some(rest) = path
        .strip_prefix("vessels.")
        .and_then(|p| p.strip_prefix(self_urn))
        .and_then(|p| p.strip_prefix('.'))
    {
        return rest;
    }
    path
}

/// Convert a REST URL tail ("navigation/speedOverGround") to a dotted path.
pub fn rest_path_to_dotted(path: &str) -> String {
    path.trim_matches('/').replace('/', ".")
}
