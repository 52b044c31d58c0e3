//! # Dependency Graph
//!
//! Parses a restricted subset of the Mermaid flowchart language into
//! dependency relationships between repositories.
//!
//! ```text
//! graph TD
//!     app[Application] --> lib
//!     app -.-> tools
//!     lib ==>|links| core
//!     core <--> proto
//! ```
//!
//! `A --> B` reads "A depends on B": `B` is added to the forward adjacency
//! of `A` and `A` to the reverse adjacency of `B`. Bidirectional operators
//! add both directions.
//!
//! ## Grammar
//!
//! - A node reference is an identifier optionally followed by a `[...]`,
//!   `(...)` or `{...}` label; only the identifier matters.
//! - Recognized operators are `-->`, dotted `-.->`, thick `==>` (any number
//!   of repeated dashes, dots or equals signs) and bidirectional `<-->`, each
//!   optionally followed by a `|label|`. Dotted edges may also carry inline
//!   text: `A -. uses .-> B`.
//! - Either side of an edge may be an `&` group: `A & B --> C` makes both
//!   `A` and `B` depend on `C`.
//! - Only the first operator of a line is used. In `A --> B --> C` the
//!   second hop is ignored.
//! - Links without an arrowhead (`A --- B`) carry no dependency.
//! - Header lines (`graph TD`, `flowchart LR`), `%%` comments, code fences
//!   and styling statements are skipped.
//!
//! Every edge endpoint must be a known repository identifier; otherwise the
//! whole parse fails and no partial graph is returned.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Language tag used when the graph source is fenced in markdown.
pub const FENCE_LANGUAGE: &str = "mermaid";

const KEYWORDS: [&str; 10] = [
    "graph", "flowchart", "subgraph", "end", "classDef", "class", "style", "linkStyle", "click",
    "direction",
];

fn operator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(<)?(?:-{2,}|-\.+-|={2,}|-\.\s[^>|]*?\s\.+-)>(?:\s*\|[^|]*\|)?")
            .expect("valid operator regex")
    })
}

fn node_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z0-9_.]+(?:-[A-Za-z0-9_.]+)*)\s*(?:\[[^\]]*\]|\([^)]*\)|\{[^}]*\})?")
            .expect("valid node regex")
    })
}

/// Node labels, class suffixes and quoted text; none of them name nodes.
fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}|\|[^|]*\||"[^"]*"|:::[A-Za-z0-9_-]+"#)
            .expect("valid label regex")
    })
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_.]*(?:-[A-Za-z0-9_.]+)*").expect("valid token regex")
    })
}

/// Forward and reverse dependency adjacency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    forward: BTreeMap<String, Vec<String>>,
    reverse: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Identifiers `id` depends on.
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.forward.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Identifiers that depend on `id`.
    pub fn dependents(&self, id: &str) -> &[String] {
        self.reverse.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn forward(&self) -> &BTreeMap<String, Vec<String>> {
        &self.forward
    }

    pub fn reverse(&self) -> &BTreeMap<String, Vec<String>> {
        &self.reverse
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        push_unique(self.forward.entry(from.to_string()).or_default(), to);
        push_unique(self.reverse.entry(to.to_string()).or_default(), from);
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}

/// One recognized edge: left and right identifier groups and direction.
#[derive(Debug, PartialEq, Eq)]
struct Edge<'a> {
    from: Vec<&'a str>,
    to: Vec<&'a str>,
    bidirectional: bool,
}

fn leading_identifier(text: &str) -> Option<&str> {
    node_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Splits an `a & b` node group on `&` outside of bracketed labels.
fn split_group(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            '&' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn group_identifiers(text: &str) -> Option<Vec<&str>> {
    split_group(text).into_iter().map(leading_identifier).collect()
}

fn normalize(raw: &str) -> &str {
    raw.trim().trim_end_matches(';').trim_end()
}

fn is_ignorable(line: &str) -> bool {
    line.is_empty() || line.starts_with("%%") || line.starts_with("```")
}

/// First keyword of a statement that is not a node or an edge.
fn statement_keyword(line: &str) -> Option<&str> {
    let first = line.split_whitespace().next()?;
    KEYWORDS.contains(&first).then_some(first)
}

fn edge_of(raw: &str) -> Option<Edge<'_>> {
    let line = normalize(raw);
    if is_ignorable(line) {
        return None;
    }
    let op = operator_regex().captures(line)?;
    let whole = op.get(0)?.range();
    let rest = &line[whole.end..];
    let right = operator_regex()
        .find(rest)
        .map_or(rest, |next| &rest[..next.start()]);
    Some(Edge {
        from: group_identifiers(&line[..whole.start])?,
        to: group_identifiers(right)?,
        bidirectional: op.get(1).is_some(),
    })
}

/// Parses `text` into a graph whose identifiers all belong to `valid`.
pub fn parse(text: &str, valid: &HashSet<String>) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::default();
    for edge in text.lines().filter_map(edge_of) {
        if let Some(id) = edge.from.iter().chain(&edge.to).find(|id| !valid.contains(**id)) {
            return Err(Error::InvalidDependency { id: id.to_string() });
        }
        for from in &edge.from {
            for to in &edge.to {
                graph.add_edge(from, to);
                if edge.bidirectional {
                    graph.add_edge(to, from);
                }
            }
        }
    }
    Ok(graph)
}

/// Reads and parses a graph file.
pub fn load(path: &Path, valid: &HashSet<String>) -> Result<(String, DependencyGraph)> {
    let text = std::fs::read_to_string(path)?;
    let graph = parse(&text, valid)?;
    Ok((text, graph))
}

/// Every identifier a line mentions, wherever it appears: edge endpoints,
/// `&` groups, plain links such as `a --- b` and node definitions.
fn mentioned_identifiers(line: &str) -> Vec<String> {
    if operator_regex().find(line).is_none() {
        match statement_keyword(line) {
            // `style a ...`, `class a,b ...` and `click a ...` name nodes.
            Some("style" | "class" | "click") => {
                return line
                    .split_whitespace()
                    .nth(1)
                    .map(|targets| targets.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
            }
            Some(_) => return Vec::new(),
            None => {}
        }
    }

    let unlabeled = label_regex().replace_all(line, " ");
    let bare = operator_regex().replace_all(&unlabeled, " ");
    token_regex()
        .find_iter(&bare)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drops every node definition or edge line that mentions an identifier
/// outside `valid`. Other lines are kept verbatim.
pub fn redact(text: &str, valid: &HashSet<String>) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|raw| {
            let line = normalize(raw);
            is_ignorable(line)
                || mentioned_identifiers(line)
                    .iter()
                    .all(|id| valid.contains(id))
        })
        .collect();
    let mut out = kept.join("\n");
    if text.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }
    out
}

/// The graph source without surrounding code fences, ready to be fenced
/// again.
pub fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
