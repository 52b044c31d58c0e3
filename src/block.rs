//! # Metadata Block
//!
//! Every pull request opened by mistletoe carries a metadata block in its
//! description. The block links the pull requests of all repositories in the
//! change set, and records the snapshot and the dependency graph they were
//! created from.
//!
//! ## Recognition
//!
//! A block is a markdown fragment around a heading made of one or more `#`
//! followed by the word `Mistletoe`:
//!
//! ```text
//! -------
//! ## Mistletoe
//! ...
//! ----------
//! ```
//!
//! The line directly above the heading is the start when it consists of three
//! or more `-`; otherwise the heading itself is the start. The end is the next
//! dash-only line below the heading, and it is mandatory: a heading without a
//! terminating line is not a block.
//!
//! ## Delimiters
//!
//! The opening line has a random length `n` in `4..=16` and the closing line
//! has a different length (`2n - 2` for odd `n`, `2n - 1` for even `n`).
//! The mismatch keeps the pair from looking like two ordinary horizontal
//! rules written by a person, while staying trivial to recognize. It is a
//! heuristic and recognition depends on it; keep it as is.

use std::ops::Range;
use std::sync::OnceLock;

use base64::Engine;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{self, DependencyGraph};
use crate::snapshot::Snapshot;

/// Shortest and longest opening delimiter.
pub const MIN_DELIMITER: usize = 4;
pub const MAX_DELIMITER: usize = 16;

const HEADING: &str = "## Mistletoe";
const DISCLAIMER: &str = "*This section is maintained by mistletoe. \
    Anything between the separator lines is replaced on the next update.*";
const RELATED_JSON_SUMMARY: &str = "<summary>Related pull requests (JSON)</summary>";
const SNAPSHOT_SUMMARY: &str = "<summary>Snapshot</summary>";
const SNAPSHOT_BASE64_SUMMARY: &str = "<summary>Snapshot (base64)</summary>";
const GRAPH_SUMMARY: &str = "<summary>Dependency graph</summary>";

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#+\s*Mistletoe\b").expect("valid heading regex"))
}

fn delimiter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-{3,}\s*$").expect("valid delimiter regex"))
}

/// A pull request of another repository in the same change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedPr {
    pub id: String,
    pub url: String,
}

/// Related pull request URLs, grouped by their dependency relation to the
/// repository whose description holds the block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedLinks {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub others: Vec<String>,
}

impl RelatedLinks {
    /// Groups `related` for `current_id`. Without a graph everything lands
    /// in `others`.
    pub fn categorize(
        current_id: &str,
        related: &[RelatedPr],
        graph: Option<&DependencyGraph>,
    ) -> Self {
        let mut links = Self::default();
        for pr in related.iter().filter(|pr| pr.id != current_id) {
            let bucket = match graph {
                Some(g) if g.dependencies(current_id).contains(&pr.id) => &mut links.dependencies,
                Some(g) if g.dependents(current_id).contains(&pr.id) => &mut links.dependents,
                _ => &mut links.others,
            };
            bucket.push(pr.url.clone());
        }
        links
    }
}

/// Everything that goes into one block.
#[derive(Debug, Clone)]
pub struct BlockInput<'a> {
    /// Repository whose pull request description receives the block.
    pub current_id: &'a str,
    pub related: &'a [RelatedPr],
    pub snapshot: &'a Snapshot,
    pub graph: Option<&'a DependencyGraph>,
    /// Graph source, published verbatim (already redacted by the caller).
    pub graph_source: Option<&'a str>,
}

/// Length of the closing delimiter for an opening delimiter of length `n`.
pub fn closing_length(n: usize) -> usize {
    if n % 2 == 1 {
        2 * n - 2
    } else {
        2 * n - 1
    }
}

/// Renders a block with a random opening delimiter length.
pub fn encode(input: &BlockInput<'_>) -> Result<String> {
    let n = rand::thread_rng().gen_range(MIN_DELIMITER..=MAX_DELIMITER);
    encode_with_delimiter(input, n)
}

/// Renders a block with an opening delimiter of exactly `n` dashes.
pub fn encode_with_delimiter(input: &BlockInput<'_>, n: usize) -> Result<String> {
    let links = RelatedLinks::categorize(input.current_id, input.related, input.graph);
    let snapshot_json = input.snapshot.to_json()?;
    let snapshot_base64 = base64::engine::general_purpose::STANDARD.encode(snapshot_json.as_bytes());

    let mut out: Vec<String> = vec![
        "-".repeat(n),
        HEADING.to_string(),
        DISCLAIMER.to_string(),
        String::new(),
        "### Related pull requests".to_string(),
        String::new(),
    ];
    if input.graph.is_some() {
        push_link_group(&mut out, "Dependencies", &links.dependencies);
        push_link_group(&mut out, "Dependents", &links.dependents);
        push_link_group(&mut out, "Others", &links.others);
    } else if links.others.is_empty() {
        out.push("_None_".to_string());
        out.push(String::new());
    } else {
        out.extend(links.others.iter().map(|url| format!("- {}", url)));
        out.push(String::new());
    }

    out.extend([
        "<details>".to_string(),
        RELATED_JSON_SUMMARY.to_string(),
        String::new(),
        "```json".to_string(),
        serde_json::to_string(&links)?,
        "```".to_string(),
        "</details>".to_string(),
        String::new(),
        "<details>".to_string(),
        SNAPSHOT_SUMMARY.to_string(),
        String::new(),
        "```json".to_string(),
        snapshot_json,
        "```".to_string(),
        String::new(),
        "<details>".to_string(),
        SNAPSHOT_BASE64_SUMMARY.to_string(),
        String::new(),
        "```".to_string(),
        snapshot_base64,
        "```".to_string(),
        "</details>".to_string(),
        "</details>".to_string(),
        String::new(),
    ]);

    if let Some(source) = input.graph_source {
        out.extend([
            "<details>".to_string(),
            GRAPH_SUMMARY.to_string(),
            String::new(),
            format!("```{}", graph::FENCE_LANGUAGE),
            sanitize_graph_source(source),
            "```".to_string(),
            "</details>".to_string(),
            String::new(),
        ]);
    }

    out.push("-".repeat(closing_length(n)));
    Ok(out.join("\n"))
}

fn push_link_group(out: &mut Vec<String>, title: &str, urls: &[String]) {
    out.push(format!("**{}**", title));
    out.push(String::new());
    if urls.is_empty() {
        out.push("_None_".to_string());
    } else {
        out.extend(urls.iter().map(|url| format!("- {}", url)));
    }
    out.push(String::new());
}

/// Graph source without fences or dash-only lines, which would end the
/// block early.
fn sanitize_graph_source(source: &str) -> String {
    graph::strip_fences(source)
        .lines()
        .filter(|l| !is_delimiter(l))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_delimiter(line: &str) -> bool {
    delimiter_regex().is_match(line.trim_end_matches('\r'))
}

fn is_heading(line: &str) -> bool {
    heading_regex().is_match(line.trim_end_matches('\r'))
}

/// Byte range of the recognized block in `text`, from the start of its first
/// line to the end of its last line (line break excluded).
pub fn decode(text: &str) -> Option<Range<usize>> {
    // (offset, line) pairs; the offset is where the line starts.
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        lines.push((offset, line));
        offset += line.len() + 1;
    }

    for (h, (_, line)) in lines.iter().enumerate() {
        if !is_heading(line) {
            continue;
        }
        let start = if h > 0 && is_delimiter(lines[h - 1].1) { h - 1 } else { h };
        let Some(end) = (h + 1..lines.len()).find(|&j| is_delimiter(lines[j].1)) else {
            continue;
        };
        let (end_offset, end_line) = lines[end];
        return Some(lines[start].0..end_offset + end_line.trim_end_matches('\r').len());
    }
    None
}

/// Puts `block` into `text`: a recognized block is replaced in place,
/// otherwise the block is appended.
pub fn embed(text: &str, block: &str) -> String {
    match decode(text) {
        Some(span) => format!("{}{}{}", &text[..span.start], block, &text[span.end..]),
        None if text.trim().is_empty() => block.to_string(),
        None => format!("{}\n\n{}", text.trim_end(), block),
    }
}

/// Whether two descriptions differ at most in the delimiter lines of their
/// blocks. Every encoding picks a fresh delimiter length.
pub fn same_content(a: &str, b: &str) -> bool {
    without_delimiters(a) == without_delimiters(b)
}

fn without_delimiters(text: &str) -> String {
    let Some(span) = decode(text) else {
        return text.to_string();
    };
    let inner: Vec<&str> = text[span.clone()]
        .split('\n')
        .filter(|l| !is_delimiter(l))
        .collect();
    format!("{}{}{}", &text[..span.start], inner.join("\n"), &text[span.end..])
}

/// Content of the first code fence following the line `marker` inside the
/// recognized block.
fn fenced_after(block: &str, marker: &str) -> Option<String> {
    let mut lines = block.lines().map(|l| l.trim_end_matches('\r'));
    lines.find(|l| l.trim() == marker)?;
    lines.find(|l| l.trim_start().starts_with("```"))?;
    let body: Vec<&str> = lines.take_while(|l| l.trim() != "```").collect();
    Some(body.join("\n"))
}

/// Reads the snapshot back out of the block in `text`. The JSON copy is
/// preferred; the base64 copy is used when the JSON does not parse.
pub fn extract_snapshot(text: &str) -> Result<Option<Snapshot>> {
    let Some(span) = decode(text) else {
        return Ok(None);
    };
    let block = &text[span];

    if let Some(json) = fenced_after(block, SNAPSHOT_SUMMARY) {
        if let Ok(snapshot) = Snapshot::from_json(&json) {
            return Ok(Some(snapshot));
        }
    }
    let encoded = fenced_after(block, SNAPSHOT_BASE64_SUMMARY).ok_or_else(|| Error::Block {
        message: "block holds no readable snapshot".to_string(),
    })?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    let json = String::from_utf8(decoded).map_err(|e| Error::Block {
        message: format!("snapshot is not UTF-8: {}", e),
    })?;
    Snapshot::from_json(&json).map(Some)
}

/// Reads the related pull request links back out of the block in `text`.
pub fn extract_related(text: &str) -> Result<Option<RelatedLinks>> {
    let Some(span) = decode(text) else {
        return Ok(None);
    };
    match fenced_after(&text[span], RELATED_JSON_SUMMARY) {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Reads the dependency graph source back out of the block in `text`.
pub fn extract_graph_source(text: &str) -> Option<String> {
    let span = decode(text)?;
    fenced_after(&text[span], GRAPH_SUMMARY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotRepository;
    use std::collections::HashSet;

    fn snapshot() -> Snapshot {
        Snapshot {
            repositories: vec![SnapshotRepository {
                id: "app".to_string(),
                url: "https://github.com/o/app.git".to_string(),
                branch: "feature".to_string(),
                revision: "abc".to_string(),
                base_branch: "main".to_string(),
            }],
        }
    }

    fn related() -> Vec<RelatedPr> {
        ["app", "lib", "docs", "tool"]
            .iter()
            .enumerate()
            .map(|(i, id)| RelatedPr {
                id: id.to_string(),
                url: format!("https://github.com/o/{}/pull/{}", id, i + 1),
            })
            .collect()
    }

    fn block(n: usize) -> String {
        let snapshot = snapshot();
        let related = related();
        encode_with_delimiter(
            &BlockInput {
                current_id: "app",
                related: &related,
                snapshot: &snapshot,
                graph: None,
                graph_source: None,
            },
            n,
        )
        .unwrap()
    }

    #[test]
    fn test_closing_length() {
        assert_eq!(closing_length(4), 7);
        assert_eq!(closing_length(5), 8);
        assert_eq!(closing_length(16), 31);
        for n in MIN_DELIMITER..=MAX_DELIMITER {
            assert_ne!(closing_length(n), n);
        }
    }

    #[test]
    fn test_encode_delimiters() {
        let text = block(5);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "-----");
        assert_eq!(lines[1], "## Mistletoe");
        assert_eq!(*lines.last().unwrap(), "--------");
    }

    #[test]
    fn test_encode_random_length_in_range() {
        let snapshot = snapshot();
        for _ in 0..20 {
            let text = encode(&BlockInput {
                current_id: "app",
                related: &[],
                snapshot: &snapshot,
                graph: None,
                graph_source: None,
            })
            .unwrap();
            let first = text.lines().next().unwrap().len();
            let last = text.lines().last().unwrap().len();
            assert!((MIN_DELIMITER..=MAX_DELIMITER).contains(&first));
            assert_eq!(last, closing_length(first));
        }
    }

    #[test]
    fn test_encoded_block_is_recognized_whole() {
        let text = block(6);
        assert_eq!(decode(&text), Some(0..text.len()));
    }

    #[test]
    fn test_flat_links_exclude_current_repository() {
        let text = block(4);
        assert!(!text.contains("/app/pull/1"));
        assert!(text.contains("- https://github.com/o/lib/pull/2"));
        assert!(!text.contains("**Dependencies**"));
    }

    #[test]
    fn test_categorized_links_with_graph() {
        let valid: HashSet<String> = ["app", "lib", "docs", "tool"].iter().map(|s| s.to_string()).collect();
        let graph = crate::graph::parse("app --> lib\ndocs --> app\n", &valid).unwrap();
        let links = RelatedLinks::categorize("app", &related(), Some(&graph));
        assert_eq!(links.dependencies, vec!["https://github.com/o/lib/pull/2"]);
        assert_eq!(links.dependents, vec!["https://github.com/o/docs/pull/3"]);
        assert_eq!(links.others, vec!["https://github.com/o/tool/pull/4"]);

        let snapshot = snapshot();
        let related = related();
        let text = encode_with_delimiter(
            &BlockInput {
                current_id: "app",
                related: &related,
                snapshot: &snapshot,
                graph: Some(&graph),
                graph_source: Some("```mermaid\n---\ntitle: deps\n---\ngraph TD\napp --> lib\n```"),
            },
            8,
        )
        .unwrap();
        assert!(text.contains("**Dependencies**"));
        assert!(text.contains("```mermaid\ntitle: deps\ngraph TD\napp --> lib\n```"));
        assert_eq!(decode(&text), Some(0..text.len()));
        assert_eq!(extract_related(&text).unwrap(), Some(links));
        assert_eq!(
            extract_graph_source(&text).as_deref(),
            Some("title: deps\ngraph TD\napp --> lib")
        );
    }

    #[test]
    fn test_decode_infers_start_without_opening_delimiter() {
        let text = "intro\n## Mistletoe\nbody\n---\noutro";
        let span = decode(text).unwrap();
        assert_eq!(&text[span], "## Mistletoe\nbody\n---");
    }

    #[test]
    fn test_decode_any_heading_level() {
        let text = "----\n#### Mistletoe\n-----";
        assert_eq!(decode(text), Some(0..text.len()));
    }

    #[test]
    fn test_header_without_terminator_is_not_a_block() {
        let text = "intro\n-----\n## Mistletoe\nno end here";
        assert_eq!(decode(text), None);
        let embedded = embed(text, "NEW");
        assert_eq!(embedded, format!("{}\n\nNEW", text));
    }

    #[test]
    fn test_embed_replaces_in_place() {
        let prefix = "Fixes the widget.\n\n";
        let suffix = "\n\nThanks!";
        let text = format!("{}{}{}", prefix, block(4), suffix);
        let new_block = block(9);
        let embedded = embed(&text, &new_block);
        assert_eq!(embedded, format!("{}{}{}", prefix, new_block, suffix));
        // Embedding again replaces rather than appending a second copy.
        assert_eq!(embed(&embedded, &new_block), embedded);
    }

    #[test]
    fn test_same_content_ignores_delimiter_length() {
        let text = format!("Fixes the widget.\n\n{}\n\nThanks!", block(4));
        assert!(same_content(&text, &embed(&text, &block(13))));
        assert!(!same_content(&text, &embed(&text, "## Mistletoe\nother\n-------")));
        assert!(!same_content(&text, &text.replace("Thanks!", "Bye")));
    }

    #[test]
    fn test_embed_appends_when_absent() {
        assert_eq!(embed("", "BLOCK"), "BLOCK");
        assert_eq!(embed("Body text\n\n", "BLOCK"), "Body text\n\nBLOCK");
    }

    #[test]
    fn test_crlf_bodies_are_recognized() {
        let text = "hello\r\n-----\r\n## Mistletoe\r\nbody\r\n--------\r\nbye";
        let span = decode(text).unwrap();
        assert!(text[span.clone()].starts_with("-----"));
        assert_eq!(&text[span.end..], "\r\nbye");
    }

    #[test]
    fn test_extract_snapshot_roundtrip() {
        let text = format!("PR body\n\n{}", block(7));
        assert_eq!(extract_snapshot(&text).unwrap(), Some(snapshot()));
    }

    #[test]
    fn test_extract_snapshot_falls_back_to_base64() {
        let text = block(7).replace("\"feature\"", "\"feat");
        assert_eq!(extract_snapshot(&text).unwrap(), Some(snapshot()));
    }

    #[test]
    fn test_extract_snapshot_without_block() {
        assert_eq!(extract_snapshot("no block").unwrap(), None);
    }
}
