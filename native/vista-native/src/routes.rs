//! Route patterns derived from the directory convention, and the minimal
//! matcher the renderer needs to locate a page.
//!
//! `[name]` is a dynamic segment (`:name`), `[...name]` a catch-all
//! (`:name*`, one or more segments) and `(name)` a group that does not
//! appear in the URL. Routes are tried in sorted order and the first match
//! wins.

#[cfg(feature = "napi")]
use napi_derive::napi;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    Static,
    Dynamic,
    CatchAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Dynamic(String),
    CatchAll(String),
}

impl Segment {
    fn parse(part: &str) -> Self {
        if let Some(name) = part.strip_prefix(':') {
            match name.strip_suffix('*') {
                Some(name) => Segment::CatchAll(name.to_string()),
                None => Segment::Dynamic(name.to_string()),
            }
        } else {
            Segment::Static(part.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub pattern: String,
    pub page_path: String,
    /// Root first.
    pub layout_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_path: Option<String>,
    pub kind: RouteKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundEntry {
    pub pattern: String,
    pub path: String,
    pub layout_paths: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERNS
// ═══════════════════════════════════════════════════════════════════════════════

/// URL pattern and kind for a page directory relative to the app root.
pub fn pattern_for_dir(rel_dir: &str) -> (String, RouteKind) {
    let mut kind = RouteKind::Static;
    let mut parts = Vec::new();

    for part in rel_dir.split('/').filter(|p| !p.is_empty()) {
        if part.starts_with('(') && part.ends_with(')') {
            continue;
        }
        if let Some(inner) = part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
            if let Some(name) = inner.strip_prefix("...") {
                kind = RouteKind::CatchAll;
                parts.push(format!(":{}*", name));
            } else {
                if kind == RouteKind::Static {
                    kind = RouteKind::Dynamic;
                }
                parts.push(format!(":{}", inner));
            }
            continue;
        }
        parts.push(part.to_string());
    }

    (format!("/{}", parts.join("/")), kind)
}

/// A catch-all consumes every remaining segment, so anything after it could
/// never bind.
pub fn catch_all_is_last(segments: &[Segment]) -> bool {
    segments
        .iter()
        .position(|s| matches!(s, Segment::CatchAll(_)))
        .map_or(true, |index| index + 1 == segments.len())
}

pub fn parse_pattern(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|p| !p.is_empty())
        .map(Segment::parse)
        .collect()
}

/// Static before dynamic before catch-all; within a kind, more static
/// segments first, then more segments, then pattern text.
pub fn sort_routes(routes: &mut [RouteEntry]) {
    routes.sort_by_cached_key(|route| {
        let segments = parse_pattern(&route.pattern);
        let statics = segments
            .iter()
            .filter(|s| matches!(s, Segment::Static(_)))
            .count();
        (
            route.kind,
            Reverse(statics),
            Reverse(segments.len()),
            route.pattern.clone(),
        )
    });
}

// ═══════════════════════════════════════════════════════════════════════════════
// MATCHING
// ═══════════════════════════════════════════════════════════════════════════════

fn decode(part: &str) -> String {
    percent_decode_str(part).decode_utf8_lossy().to_string()
}

/// Path segments with query and fragment removed, empty segments dropped.
pub fn split_path(path: &str) -> Vec<String> {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    path[..end]
        .split('/')
        .filter(|p| !p.is_empty())
        .map(decode)
        .collect()
}

fn match_segments(pattern: &[Segment], parts: &[String]) -> Option<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();

    for (index, segment) in pattern.iter().enumerate() {
        match segment {
            Segment::Static(expected) => {
                if parts.get(index) != Some(expected) {
                    return None;
                }
            }
            Segment::Dynamic(name) => {
                params.insert(name.clone(), parts.get(index)?.clone());
            }
            Segment::CatchAll(name) => {
                let rest = parts.get(index..).filter(|rest| !rest.is_empty())?;
                params.insert(name.clone(), rest.join("/"));
                return Some(params);
            }
        }
    }

    (parts.len() == pattern.len()).then_some(params)
}

fn is_prefix(pattern: &[Segment], parts: &[String]) -> bool {
    for (index, segment) in pattern.iter().enumerate() {
        match segment {
            Segment::Static(expected) => {
                if parts.get(index) != Some(expected) {
                    return false;
                }
            }
            Segment::Dynamic(_) => {
                if parts.get(index).is_none() {
                    return false;
                }
            }
            Segment::CatchAll(_) => return parts.len() > index,
        }
    }
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteEntry,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<(RouteEntry, Vec<Segment>)>,
    not_found: Vec<(NotFoundEntry, Vec<Segment>)>,
}

impl RouteTable {
    /// `routes` must already be in match order. Patterns with a catch-all
    /// before their last segment are dropped.
    pub fn new(routes: &[RouteEntry], not_found: &[NotFoundEntry]) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|r| (r.clone(), parse_pattern(&r.pattern)))
                .filter(|(r, segments)| {
                    let ok = catch_all_is_last(segments);
                    if !ok {
                        tracing::warn!(pattern = %r.pattern, page = %r.page_path, "catch-all is not the last segment, route ignored");
                    }
                    ok
                })
                .collect(),
            not_found: not_found
                .iter()
                .map(|n| (n.clone(), parse_pattern(&n.pattern)))
                .collect(),
        }
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.iter().map(|(route, _)| route)
    }

    /// First route in order whose pattern matches. Params come from the
    /// matched pattern only.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        let parts = split_path(path);
        self.routes.iter().find_map(|(route, segments)| {
            match_segments(segments, &parts).map(|params| RouteMatch { route, params })
        })
    }

    /// The not-found component closest to `path`: the one whose pattern is
    /// the longest segment prefix.
    pub fn not_found_for(&self, path: &str) -> Option<&NotFoundEntry> {
        let parts = split_path(path);
        self.not_found
            .iter()
            .filter(|(_, segments)| is_prefix(segments, &parts))
            .max_by_key(|(_, segments)| segments.len())
            .map(|(entry, _)| entry)
    }
}

/// Query string into search params. The last value of a repeated key wins.
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut kv = pair.splitn(2, '=');
            let key = kv.next().unwrap_or_default().replace('+', " ");
            let value = kv.next().unwrap_or_default().replace('+', " ");
            (decode(&key), decode(&value))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct RouteMatchOutput {
    pub pattern: String,
    pub page_path: String,
    pub params: std::collections::HashMap<String, String>,
}

#[cfg(feature = "napi")]
#[napi]
pub fn match_route_native(
    routes_json: String,
    path: String,
) -> napi::Result<Option<RouteMatchOutput>> {
    let routes: Vec<RouteEntry> = serde_json::from_str(&routes_json)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    let table = RouteTable::new(&routes, &[]);
    Ok(table.match_path(&path).map(|m| RouteMatchOutput {
        pattern: m.route.pattern.clone(),
        page_path: m.route.page_path.clone(),
        params: m.params.into_iter().collect(),
    }))
}
