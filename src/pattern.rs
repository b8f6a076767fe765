//! Path patterns and the segment matcher.
//!
//! A pattern is split on `/` exactly the way a request path is. A segment
//! starting with `:` is a parameter and matches any single segment, including
//! an empty one. Every other segment is a literal and must be byte-equal.
//!
//! ```text
//! pattern  /api/users/:id      → ["", "api", "users", Param(id)]
//! path     /api/users/42       → ["", "api", "users", "42"]       → {id: "42"}
//! path     /api/users/42/      → 5 segments                        → no match
//! ```
//!
//! There are no wildcards and no optional segments: a pattern only ever
//! matches paths with the same number of segments.

use std::collections::HashMap;
use std::fmt;

/// Parameter name → matched path segment.
pub type Params = HashMap<String, String>;

const PARAM_MARKER: char = ':';

/// One `/`-delimited component of a pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed route pattern. Immutable once built.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .map(|s| match s.strip_prefix(PARAM_MARKER) {
                Some(name) => Segment::Param(name.to_owned()),
                None => Segment::Literal(s.to_owned()),
            })
            .collect();
        Self { raw: raw.to_owned(), segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Matches a concrete request path, returning the parameter bindings.
    ///
    /// If a name appears twice in the pattern, the rightmost binding wins.
    pub fn matches(&self, path: &str) -> Option<Params> {
        // Counting first keeps the walk below allocation-free on mismatch.
        if path.split('/').count() != self.segments.len() {
            return None;
        }

        let mut params = Params::new();
        for (segment, value) in self.segments.iter().zip(path.split('/')) {
            match segment {
                Segment::Param(name) => {
                    params.insert(name.clone(), value.to_owned());
                }
                Segment::Literal(lit) if lit == value => {}
                Segment::Literal(_) => return None,
            }
        }
        Some(params)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals_and_params() {
        let p = Pattern::parse("/api/users/:id");
        assert_eq!(
            p.segments(),
            &[
                Segment::Literal(String::new()),
                Segment::Literal("api".into()),
                Segment::Literal("users".into()),
                Segment::Param("id".into()),
            ]
        );
        assert_eq!(p.to_string(), "/api/users/:id");
    }

    #[test]
    fn binds_param_segment() {
        let params = Pattern::parse("/api/users/:id").matches("/api/users/42").unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params["id"], "42");
    }

    #[test]
    fn binds_several_params() {
        let params = Pattern::parse("/orgs/:org/repos/:repo")
            .matches("/orgs/rust-lang/repos/cargo")
            .unwrap();
        assert_eq!(params["org"], "rust-lang");
        assert_eq!(params["repo"], "cargo");
    }

    #[test]
    fn param_binds_regardless_of_content() {
        let p = Pattern::parse("/files/:key");
        for value in ["a", "with space", "%2F", ":colon", "üñí", ""] {
            let path = format!("/files/{value}");
            assert_eq!(p.matches(&path).unwrap()["key"], value);
        }
    }

    #[test]
    fn literal_mismatch_never_matches() {
        let p = Pattern::parse("/api/users/:id");
        assert_eq!(p.matches("/api/user/42"), None);
        assert_eq!(p.matches("/API/users/42"), None);
        assert_eq!(p.matches("api/users/42/x"), None);
        assert!(p.matches("/api/users/42").is_some());
    }

    #[test]
    fn literals_are_case_sensitive() {
        assert_eq!(Pattern::parse("/Health").matches("/health"), None);
    }

    #[test]
    fn segment_count_must_be_equal() {
        let p = Pattern::parse("/api/users/:id");
        for path in ["/api/users", "/api/users/42/", "/api/users/42/posts", "/", ""] {
            assert_eq!(p.matches(path), None, "{path} should not match");
        }
    }

    #[test]
    fn literal_only_pattern_yields_no_params() {
        let params = Pattern::parse("/health").matches("/health").unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn root_pattern_matches_root_only() {
        let p = Pattern::parse("/");
        assert!(p.matches("/").is_some());
        assert!(p.matches("/x").is_none());
        assert!(p.matches("").is_none());
    }
}
