//! A minimal request pattern matcher following `net/http`-style ServeMux
//! precedence, used to pick the most specific registered pattern for a path.
//!
//! Patterns look like `[METHOD ][HOST]/PATH`:
//!
//! - `/` matches every path, `/static/` matches that subtree and `/about`
//!   matches only itself.
//! - `{name}` matches one path segment; a final `{name...}` matches the rest of
//!   the path; a final `{$}` only matches the path ending in `/`.
//! - A `GET` pattern also matches `HEAD` requests. Methods are case-sensitive.
//! - Literal segments and request path segments are percent-decoded one
//!   segment at a time, so an encoded `/` never splits a segment.
//!
//! Two patterns that can match the same request must be ordered: one of them
//! has to match a strict subset of the other's requests. Patterns that overlap
//! without such an order conflict and cannot be registered together.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
}

/// How the last pattern segment relates to the rest of the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    /// `/a/b`: the path must end here.
    Exact,
    /// `/a/b/{$}`: the path must end here with a trailing slash.
    Slash,
    /// `/a/b/` or `/a/b/{rest...}`: the path may continue.
    Subtree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePatternError {
    pattern: String,
    reason: &'static str,
}

impl fmt::Display for ParsePatternError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid pattern {:?}: {}", self.pattern, self.reason)
    }
}

impl std::error::Error for ParsePatternError {}

/// The parts of a pattern that decide what it matches. Two patterns with equal
/// keys match exactly the same requests.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PatternKey {
    method: Option<String>,
    host: Option<String>,
    segments: Vec<Segment>,
    end: End,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    key: PatternKey,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self, ParsePatternError> {
        let fail = |reason| ParsePatternError {
            pattern: raw.to_owned(),
            reason,
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(fail("empty pattern"));
        }

        let (method, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((method, rest)) => {
                if !method.bytes().all(|b| b.is_ascii_alphabetic()) {
                    return Err(fail("bad method"));
                }
                (Some(method.to_owned()), rest.trim_start())
            }
            None => (None, trimmed),
        };

        let slash = rest
            .find('/')
            .ok_or_else(|| fail("host/path missing /"))?;
        let (host, path) = rest.split_at(slash);
        let host = (!host.is_empty()).then(|| host.to_ascii_lowercase());

        let mut segments = Vec::new();
        let mut end = End::Exact;
        let parts: Vec<&str> = path[1..].split('/').collect();
        let last = parts.len() - 1;

        for (i, part) in parts.iter().enumerate() {
            let is_last = i == last;
            if part.is_empty() {
                if is_last {
                    end = End::Subtree;
                    break;
                }
                return Err(fail("empty path segment"));
            }

            if let Some(inner) = part.strip_prefix('{') {
                let name = inner
                    .strip_suffix('}')
                    .ok_or_else(|| fail("bad wildcard segment"))?;
                if name == "$" {
                    if !is_last {
                        return Err(fail("{$} not at end"));
                    }
                    end = End::Slash;
                    break;
                }
                if let Some(name) = name.strip_suffix("...") {
                    if !is_last {
                        return Err(fail("{...} wildcard not at end"));
                    }
                    if !is_wildcard_name(name) {
                        return Err(fail("bad wildcard name"));
                    }
                    end = End::Subtree;
                    break;
                }
                if !is_wildcard_name(name) {
                    return Err(fail("bad wildcard name"));
                }
                segments.push(Segment::Wildcard);
            } else if part.contains(['{', '}']) {
                return Err(fail("bad wildcard segment"));
            } else {
                segments.push(Segment::Literal(unescape(part)));
            }
        }

        Ok(Self {
            raw: raw.to_owned(),
            key: PatternKey {
                method,
                host,
                segments,
                end,
            },
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this pattern matches `request`.
    pub(crate) fn matches(&self, request: &RequestTarget<'_>) -> bool {
        let key = &self.key;

        if let Some(method) = &key.method {
            let allowed =
                method == request.method || (method == "GET" && request.method == "HEAD");
            if !allowed {
                return false;
            }
        }

        if let Some(host) = &key.host {
            match request.host {
                Some(request_host) if request_host.eq_ignore_ascii_case(host) => {}
                _ => return false,
            }
        }

        let len = key.segments.len();
        let path_len = request.segments.len();
        let shape_fits = match key.end {
            End::Exact => path_len == len && !request.trailing_slash,
            End::Slash => path_len == len && request.trailing_slash,
            End::Subtree => path_len > len || (path_len == len && request.trailing_slash),
        };
        if !shape_fits {
            return false;
        }

        key.segments
            .iter()
            .zip(&request.segments)
            .all(|(segment, part)| match segment {
                Segment::Literal(literal) => literal == part,
                Segment::Wildcard => true,
            })
    }

    /// Orders two registered patterns that both match a request; the greater
    /// one wins. A host-specific pattern beats a host-less one, otherwise the
    /// pattern matching fewer requests wins.
    pub(crate) fn precedence(&self, other: &Pattern) -> Ordering {
        let (a, b) = (&self.key, &other.key);
        a.host
            .is_some()
            .cmp(&b.host.is_some())
            .then_with(|| match a.compare(b) {
                Relationship::MoreSpecific => Ordering::Greater,
                Relationship::MoreGeneral => Ordering::Less,
                _ => Ordering::Equal,
            })
    }

    /// Whether both patterns can match some request with neither one taking
    /// precedence. Equivalent patterns conflict.
    pub(crate) fn conflicts_with(&self, other: &Pattern) -> bool {
        // Different hosts never match the same request, and a host-specific
        // pattern always beats a host-less one.
        if self.key.host != other.key.host {
            return false;
        }
        matches!(
            self.key.compare(&other.key),
            Relationship::Equivalent | Relationship::Overlaps
        )
    }

    fn is_subtree(&self) -> bool {
        self.key.end == End::Subtree
    }

    fn segment_count(&self) -> usize {
        self.key.segments.len()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_wildcard_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn unescape(segment: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes())).into_owned()
}

/// How the set of requests one pattern matches relates to another's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relationship {
    Equivalent,
    /// Matches a strict superset of the other pattern's requests.
    MoreGeneral,
    /// Matches a strict subset of the other pattern's requests.
    MoreSpecific,
    /// Some requests match both, neither set contains the other.
    Overlaps,
    Disjoint,
}

impl Relationship {
    /// Relationship of two patterns built from independent parts, given the
    /// relationship of each part.
    fn combine(self, other: Relationship) -> Relationship {
        use Relationship::*;
        match (self, other) {
            (Disjoint, _) | (_, Disjoint) => Disjoint,
            (Equivalent, r) | (r, Equivalent) => r,
            (a, b) if a == b => a,
            _ => Overlaps,
        }
    }
}

/// One position of a pattern path, with the pattern end spelled out.
#[derive(Debug, Clone, Copy)]
enum Piece<'a> {
    Literal(&'a str),
    Wildcard,
    /// `{$}`: the empty segment after a trailing slash.
    Slash,
    /// Trailing `/` or `{name...}`: zero or more segments.
    Rest,
}

impl PatternKey {
    fn compare(&self, other: &PatternKey) -> Relationship {
        let methods = compare_methods(self.method.as_deref(), other.method.as_deref());
        if methods == Relationship::Disjoint {
            return methods;
        }
        methods.combine(self.compare_paths(other))
    }

    fn compare_paths(&self, other: &PatternKey) -> Relationship {
        let (left, right) = (self.pieces(), other.pieces());
        let mut relationship = Relationship::Equivalent;
        for (a, b) in left.iter().zip(&right) {
            relationship = relationship.combine(compare_pieces(*a, *b));
            if relationship == Relationship::Disjoint {
                return relationship;
            }
        }

        // A longer pattern can only meet a shorter one that ends in `Rest`.
        match left.len().cmp(&right.len()) {
            Ordering::Equal => relationship,
            Ordering::Less if self.end == End::Subtree => {
                relationship.combine(Relationship::MoreGeneral)
            }
            Ordering::Greater if other.end == End::Subtree => {
                relationship.combine(Relationship::MoreSpecific)
            }
            _ => Relationship::Disjoint,
        }
    }

    fn pieces(&self) -> Vec<Piece<'_>> {
        let mut pieces: Vec<Piece<'_>> = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => Piece::Literal(literal),
                Segment::Wildcard => Piece::Wildcard,
            })
            .collect();
        match self.end {
            End::Exact => {}
            End::Slash => pieces.push(Piece::Slash),
            End::Subtree => pieces.push(Piece::Rest),
        }
        pieces
    }
}

fn compare_methods(a: Option<&str>, b: Option<&str>) -> Relationship {
    match (a, b) {
        (a, b) if a == b => Relationship::Equivalent,
        (None, _) => Relationship::MoreGeneral,
        (_, None) => Relationship::MoreSpecific,
        (Some("GET"), Some("HEAD")) => Relationship::MoreGeneral,
        (Some("HEAD"), Some("GET")) => Relationship::MoreSpecific,
        _ => Relationship::Disjoint,
    }
}

fn compare_pieces(a: Piece<'_>, b: Piece<'_>) -> Relationship {
    use Piece::*;
    match (a, b) {
        (Rest, Rest) => Relationship::Equivalent,
        (Rest, _) => Relationship::MoreGeneral,
        (_, Rest) => Relationship::MoreSpecific,
        (Wildcard, Wildcard) | (Slash, Slash) => Relationship::Equivalent,
        // A wildcard never matches the empty segment.
        (Wildcard, Slash) | (Slash, Wildcard) => Relationship::Disjoint,
        (Wildcard, Literal(_)) => Relationship::MoreGeneral,
        (Literal(_), Wildcard) => Relationship::MoreSpecific,
        (Literal(x), Literal(y)) if x == y => Relationship::Equivalent,
        _ => Relationship::Disjoint,
    }
}

/// The parts of a request a [`Pattern`] is matched against.
#[derive(Debug)]
pub(crate) struct RequestTarget<'a> {
    method: &'a str,
    host: Option<&'a str>,
    segments: Vec<String>,
    trailing_slash: bool,
}

impl<'a> RequestTarget<'a> {
    /// `host` may carry a port, which is ignored. `path` is cleaned first.
    pub(crate) fn new(method: &'a str, host: Option<&'a str>, path: &str) -> Self {
        let host = host.map(strip_port).filter(|host| !host.is_empty());
        let (segments, trailing_slash) = clean_path(path);
        Self {
            method,
            host,
            segments,
            trailing_slash,
        }
    }

    /// The same request with a trailing slash appended to its path.
    fn with_trailing_slash(&self) -> Self {
        Self {
            method: self.method,
            host: self.host,
            segments: self.segments.clone(),
            trailing_slash: true,
        }
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal, e.g. [::1]:8080
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Splits `path` into percent-decoded segments, dropping empty and `.`
/// segments and resolving `..`. The root path has no segments and counts as
/// having a trailing slash.
fn clean_path(path: &str) -> (Vec<String>, bool) {
    let mut segments: Vec<String> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            part => segments.push(unescape(part)),
        }
    }

    let trailing_slash = segments.is_empty() || path.ends_with('/');
    (segments, trailing_slash)
}

/// A set of patterns searched for the most specific match.
#[derive(Debug, Default)]
pub(crate) struct PatternTable {
    patterns: Vec<Pattern>,
}

impl PatternTable {
    /// Returns a registered pattern that `pattern` conflicts with, if any.
    pub(crate) fn conflict(&self, pattern: &Pattern) -> Option<&Pattern> {
        self.patterns
            .iter()
            .find(|existing| existing.conflicts_with(pattern))
    }

    pub(crate) fn insert(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    pub(crate) fn len(&self) -> usize {
        self.patterns.len()
    }

    /// The most specific pattern matching `request`.
    ///
    /// A request naming a subtree root without its trailing slash (`/docs`
    /// when only `/docs/` is registered) resolves to that subtree, the same
    /// pattern its redirect would land on.
    pub(crate) fn best_match(&self, request: &RequestTarget<'_>) -> Option<&Pattern> {
        let best = self.most_specific(request);
        let matched_exactly = best.is_some_and(|pattern| !pattern.is_subtree());
        if request.trailing_slash || matched_exactly {
            return best;
        }

        let redirected = request.with_trailing_slash();
        match self.most_specific(&redirected) {
            Some(pattern) if pattern.segment_count() == redirected.segments.len() => Some(pattern),
            _ => best,
        }
    }

    fn most_specific(&self, request: &RequestTarget<'_>) -> Option<&Pattern> {
        self.patterns
            .iter()
            .filter(|pattern| pattern.matches(request))
            .max_by(|a, b| a.precedence(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(patterns: &[&str]) -> PatternTable {
        let mut table = PatternTable::default();
        for pattern in patterns {
            table.insert(Pattern::parse(pattern).expect("valid pattern"));
        }
        table
    }

    fn lookup<'t>(table: &'t PatternTable, method: &str, host: &str, path: &str) -> Option<&'t str> {
        let host = (!host.is_empty()).then_some(host);
        table
            .best_match(&RequestTarget::new(method, host, path))
            .map(Pattern::as_str)
    }

    #[test]
    fn rejects_malformed_patterns() {
        for raw in [
            "",
            "   ",
            "api",
            "G3T /x",
            "/a//b",
            "/{id",
            "/a{id}",
            "/{}",
            "/{1x}",
            "/{$}/x",
            "/{rest...}/x",
        ] {
            assert!(Pattern::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn parse_error_names_the_pattern() {
        let err = Pattern::parse("/a//b").unwrap_err();
        assert_eq!(err.to_string(), "invalid pattern \"/a//b\": empty path segment");
    }

    #[test]
    fn equivalent_patterns_share_a_key() {
        let key = |raw: &str| Pattern::parse(raw).expect("valid").key;
        assert_eq!(key("/a/{x}"), key("/a/{y}"));
        assert_eq!(key("/a/"), key("/a/{rest...}"));
        assert_eq!(key("/caf%C3%A9"), key("/café"));
        assert_ne!(key("get /a"), key("GET /a"));
        assert_ne!(key("/a"), key("/a/"));
        assert_ne!(key("/a/{$}"), key("/a/"));
        assert_ne!(key("GET /a"), key("/a"));
    }

    fn conflicts(a: &str, b: &str) -> bool {
        let a = Pattern::parse(a).expect("valid pattern");
        let b = Pattern::parse(b).expect("valid pattern");
        assert_eq!(a.conflicts_with(&b), b.conflicts_with(&a));
        a.conflicts_with(&b)
    }

    #[test]
    fn overlapping_patterns_without_an_order_conflict() {
        // Both match /a/b; neither matches a subset of the other.
        assert!(conflicts("/a/{x}", "/{y}/b"));
        assert!(conflicts("/a/{x}", "/a/{y}"));
        assert!(conflicts("/a/", "/a/{rest...}"));
        // More specific method, more general path.
        assert!(conflicts("GET /posts/", "/posts/latest"));
    }

    #[test]
    fn ordered_or_disjoint_patterns_do_not_conflict() {
        assert!(!conflicts("/a/{x}", "/a/b"));
        assert!(!conflicts("/", "/api/"));
        assert!(!conflicts("/a", "/a/"));
        assert!(!conflicts("/docs/", "/docs/{$}"));
        assert!(!conflicts("/{x}/", "/{y}/{$}"));
        assert!(!conflicts("/a/{x}", "/b/{x}"));
        assert!(!conflicts("GET /a", "POST /a"));
        assert!(!conflicts("GET /a", "HEAD /a"));
        assert!(!conflicts("/form", "POST /form"));
        assert!(!conflicts("example.com/", "/a/{x}"));
        assert!(!conflicts("a.example/x", "b.example/x"));
    }

    #[test]
    fn root_matches_everything() {
        let table = table(&["/"]);
        assert_eq!(lookup(&table, "GET", "", "/"), Some("/"));
        assert_eq!(lookup(&table, "POST", "", "/deep/nested/path"), Some("/"));
    }

    #[test]
    fn longer_prefix_wins() {
        let table = table(&["/", "/api/", "/api/v1/"]);
        assert_eq!(lookup(&table, "GET", "", "/api/data"), Some("/api/"));
        assert_eq!(lookup(&table, "GET", "", "/api/v1/users"), Some("/api/v1/"));
        assert_eq!(lookup(&table, "GET", "", "/other"), Some("/"));
    }

    #[test]
    fn exact_pattern_only_matches_itself() {
        let table = table(&["/about"]);
        assert_eq!(lookup(&table, "GET", "", "/about"), Some("/about"));
        assert_eq!(lookup(&table, "GET", "", "/about/"), None);
        assert_eq!(lookup(&table, "GET", "", "/about/team"), None);
    }

    #[test]
    fn exact_beats_subtree_of_same_length() {
        let table = table(&["/docs/", "/docs/{$}"]);
        assert_eq!(lookup(&table, "GET", "", "/docs/"), Some("/docs/{$}"));
        assert_eq!(lookup(&table, "GET", "", "/docs/intro"), Some("/docs/"));
    }

    #[test]
    fn literal_beats_wildcard() {
        let table = table(&["/users/{id}", "/users/me", "/files/{path...}"]);
        assert_eq!(lookup(&table, "GET", "", "/users/me"), Some("/users/me"));
        assert_eq!(lookup(&table, "GET", "", "/users/42"), Some("/users/{id}"));
        assert_eq!(lookup(&table, "GET", "", "/users/42/posts"), None);
        assert_eq!(lookup(&table, "GET", "", "/files/a/b/c.txt"), Some("/files/{path...}"));
    }

    #[test]
    fn subtree_root_without_slash_resolves_to_subtree() {
        let with_root = table(&["/", "/api/"]);
        assert_eq!(lookup(&with_root, "GET", "", "/api"), Some("/api/"));
        assert_eq!(lookup(&with_root, "GET", "", "/apis"), Some("/"));

        let without_root = table(&["/api/"]);
        assert_eq!(lookup(&without_root, "GET", "", "/api"), Some("/api/"));
        assert_eq!(lookup(&without_root, "GET", "", "/apis"), None);

        // An exact registration for the bare path is preferred.
        let both = table(&["/api", "/api/"]);
        assert_eq!(lookup(&both, "GET", "", "/api"), Some("/api"));
    }

    #[test]
    fn method_patterns_win_over_method_less_ones() {
        let table = table(&["/form", "POST /form", "GET /page"]);
        assert_eq!(lookup(&table, "POST", "", "/form"), Some("POST /form"));
        assert_eq!(lookup(&table, "GET", "", "/form"), Some("/form"));
        assert_eq!(lookup(&table, "HEAD", "", "/page"), Some("GET /page"));
        assert_eq!(lookup(&table, "DELETE", "", "/page"), None);
    }

    #[test]
    fn methods_are_case_sensitive() {
        let table = table(&["get /a", "GET /b"]);
        assert_eq!(lookup(&table, "get", "", "/a"), Some("get /a"));
        assert_eq!(lookup(&table, "GET", "", "/a"), None);
        assert_eq!(lookup(&table, "head", "", "/b"), None);
        assert_eq!(lookup(&table, "HEAD", "", "/b"), Some("GET /b"));
    }

    #[test]
    fn request_segments_are_percent_decoded() {
        let table = table(&["/café/", "/a/b"]);
        assert_eq!(lookup(&table, "GET", "", "/caf%C3%A9/menu"), Some("/café/"));
        assert_eq!(lookup(&table, "GET", "", "/%61/b"), Some("/a/b"));
        // An encoded slash stays inside its segment.
        assert_eq!(lookup(&table, "GET", "", "/a%2Fb"), None);
    }

    #[test]
    fn host_patterns_win_over_host_less_ones() {
        let table = table(&["/static/", "example.com/"]);
        assert_eq!(
            lookup(&table, "GET", "example.com:8080", "/static/app.js"),
            Some("example.com/")
        );
        assert_eq!(lookup(&table, "GET", "other.org", "/static/app.js"), Some("/static/"));
        assert_eq!(lookup(&table, "GET", "", "/static/app.js"), Some("/static/"));
    }

    #[test]
    fn request_paths_are_cleaned_before_matching() {
        let table = table(&["/", "/api/", "/private/"]);
        assert_eq!(lookup(&table, "GET", "", "//api//data"), Some("/api/"));
        assert_eq!(lookup(&table, "GET", "", "/private/../api/x"), Some("/api/"));
        assert_eq!(lookup(&table, "GET", "", "/api/./x"), Some("/api/"));
        assert_eq!(lookup(&table, "GET", "", "/../../etc"), Some("/"));
    }

    #[test]
    fn strips_ports_from_hosts() {
        assert_eq!(strip_port("example.com:443"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }
}
