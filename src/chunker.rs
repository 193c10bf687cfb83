//! AST-aware chunking for semantic search
//!
//! Splits source files into semantic units (functions, classes, impls) with
//! stable ids, names, signatures, and docstrings. Files without a supported
//! grammar fall back to line-windowed chunks. The chunker is pure: the same
//! input always produces the same chunks.

use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};
use tracing::{debug, warn};

use crate::cache::TtlLru;
use crate::languages::{detect_language, Lang};
use crate::paths::{chunk_id, chunk_part_id, strip_bom};

/// Node kind assigned to line-windowed fallback chunks.
pub const FALLBACK_NODE_KIND: &str = "fallback_chunk";

/// Chunks smaller than this are discarded.
const MIN_CHUNK_CHARS: usize = 50;
const MIN_CHUNK_LINES: usize = 2;

/// Overlap carried between split parts and fallback windows.
const OVERLAP_RATIO: f64 = 0.15;

/// Display cap for extracted signatures.
const MAX_SIGNATURE_CHARS: usize = 200;

/// A semantic chunk of source code with metadata for search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier derived from path and start line
    pub id: String,
    /// Source file path (relative to index root)
    pub file_path: String,
    /// Detected language, if any grammar covers the file
    pub language: Option<Lang>,
    /// Grammar node kind, or `fallback_chunk`
    pub node_kind: String,
    /// Entity name, when the grammar exposes one
    pub name: Option<String>,
    /// Declaration text up to the body opener
    pub signature: Option<String>,
    /// Leading comment run or body docstring
    pub docstring: Option<String>,
    /// The chunk text
    pub content: String,
    /// Starting line number (1-indexed)
    pub start_line: usize,
    /// Ending line number (1-indexed, inclusive)
    pub end_line: usize,
}

/// Splits source files into semantic chunks
pub struct Chunker {
    target_size: usize,
    grammars: Mutex<TtlLru<Lang, tree_sitter::Language>>,
}

impl Chunker {
    /// Create a chunker with the given target chunk size in characters.
    pub fn new(target_size: usize) -> Self {
        Self {
            target_size,
            // One slot per supported language, no expiry
            grammars: Mutex::new(TtlLru::new(8, None)),
        }
    }

    /// Chunk a source buffer.
    ///
    /// Empty or whitespace-only sources return no chunks. Unsupported
    /// extensions and unparseable files take the line-windowed fallback.
    pub fn chunk(&self, source: &str, file_path: &str) -> Vec<Chunk> {
        let source = strip_bom(source);
        if source.trim().is_empty() {
            return vec![];
        }

        let Some(lang) = detect_language(Path::new(file_path)) else {
            return self.fallback_chunks(source, file_path, None);
        };

        let grammar = {
            let mut cache = self.grammars.lock().expect("grammar cache lock");
            cache.get_or_insert_with(lang, || lang.grammar()).clone()
        };

        let mut parser = Parser::new();
        if parser.set_language(&grammar).is_err() {
            warn!(file = file_path, lang = %lang, "grammar rejected by parser, using fallback");
            return self.fallback_chunks(source, file_path, Some(lang));
        }

        // Parse errors do not abort: walk whatever tree came back.
        let Some(tree) = parser.parse(source, None) else {
            warn!(file = file_path, "parse produced no tree, using fallback");
            return self.fallback_chunks(source, file_path, Some(lang));
        };
        if tree.root_node().has_error() {
            debug!(file = file_path, "parse tree has errors, walking best-effort");
        }

        let mut chunks = Vec::new();
        let root = tree.root_node();
        let kinds = lang.chunk_node_kinds();
        let count = root.named_child_count();

        for i in 0..count {
            let Some(node) = root.named_child(i) else {
                continue;
            };
            if !kinds.contains(&node.kind()) {
                continue;
            }
            self.emit_node(source, file_path, lang, &node, &mut chunks);
        }

        finalize(chunks)
    }

    /// Build one or more chunks from a semantic node.
    fn emit_node(
        &self,
        source: &str,
        file_path: &str,
        lang: Lang,
        node: &Node,
        output: &mut Vec<Chunk>,
    ) {
        let content = &source[node.byte_range()];
        let start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;

        let name = extract_name(node, source, lang);
        let signature = extract_signature(content, lang);
        let docstring = extract_docstring(node, source, lang);

        let base_id = chunk_id(file_path, start_line);

        if content.chars().count() <= self.target_size {
            output.push(Chunk {
                id: base_id,
                file_path: file_path.to_string(),
                language: Some(lang),
                node_kind: node.kind().to_string(),
                name,
                signature,
                docstring,
                content: content.to_string(),
                start_line,
                end_line,
            });
            return;
        }

        // Oversized node: split into overlapping parts that inherit the
        // parent's metadata.
        let windows = line_windows(content, self.target_size, overlap_for(self.target_size));
        for (part, (line_offset, text)) in windows.into_iter().enumerate() {
            let part_no = part + 1;
            let part_start = start_line + line_offset;
            let part_lines = text.lines().count().max(1);
            output.push(Chunk {
                id: chunk_part_id(&base_id, part_no),
                file_path: file_path.to_string(),
                language: Some(lang),
                node_kind: node.kind().to_string(),
                name: name.as_ref().map(|n| format!("{n}_part{part_no}")),
                signature: signature.clone(),
                docstring: if part == 0 { docstring.clone() } else { None },
                content: text,
                start_line: part_start,
                end_line: part_start + part_lines - 1,
            });
        }
    }

    /// Line-windowed chunking for unsupported or unparseable files.
    fn fallback_chunks(&self, source: &str, file_path: &str, lang: Option<Lang>) -> Vec<Chunk> {
        let windows = line_windows(source, self.target_size, overlap_for(self.target_size));
        let chunks = windows
            .into_iter()
            .map(|(line_offset, text)| {
                let start_line = line_offset + 1;
                let lines = text.lines().count().max(1);
                Chunk {
                    id: chunk_id(file_path, start_line),
                    file_path: file_path.to_string(),
                    language: lang,
                    node_kind: FALLBACK_NODE_KIND.to_string(),
                    name: None,
                    signature: None,
                    docstring: None,
                    content: text,
                    start_line,
                    end_line: start_line + lines - 1,
                }
            })
            .collect();
        finalize(chunks)
    }
}

fn overlap_for(target: usize) -> usize {
    (target as f64 * OVERLAP_RATIO) as usize
}

/// Drop undersized chunks and disambiguate id collisions.
fn finalize(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(chunks.len());

    for mut chunk in chunks {
        if chunk.content.chars().count() < MIN_CHUNK_CHARS
            || chunk.content.lines().count() < MIN_CHUNK_LINES
        {
            continue;
        }
        // Two nodes starting on the same line share a base id; reuse the
        // part suffix to keep ids unique within the run.
        if !seen.insert(chunk.id.clone()) {
            let mut n = 2;
            let mut candidate = chunk_part_id(&chunk.id, n);
            while !seen.insert(candidate.clone()) {
                n += 1;
                candidate = chunk_part_id(&chunk.id, n);
            }
            chunk.id = candidate;
        }
        out.push(chunk);
    }
    out
}

/// Split text into windows of roughly `target` characters on line
/// boundaries, carrying `overlap` characters of trailing context into the
/// next window. Returns `(zero-indexed line offset, text)` pairs.
fn line_windows(text: &str, target: usize, overlap: usize) -> Vec<(usize, String)> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return vec![];
    }

    let mut windows = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0;
    let mut window_start = 0;

    for (i, line) in lines.iter().enumerate() {
        let line_len = line.chars().count() + 1;

        if current_size + line_len > target && !current.is_empty() {
            windows.push((window_start, current.join("\n")));

            // Keep trailing lines for overlap/context
            let keep = overlap_line_count(&current, overlap).min(current.len());
            if keep > 0 {
                let start_idx = current.len() - keep;
                current = current[start_idx..].to_vec();
                current_size = current.iter().map(|l| l.chars().count() + 1).sum();
                window_start = i - keep;
            } else {
                current.clear();
                current_size = 0;
                window_start = i;
            }
        }

        current.push(line);
        current_size += line_len;
    }

    if !current.is_empty() {
        windows.push((window_start, current.join("\n")));
    }

    windows
}

/// How many trailing lines fit within the overlap size.
fn overlap_line_count(lines: &[&str], overlap: usize) -> usize {
    let mut size = 0;
    let mut count = 0;
    for line in lines.iter().rev() {
        size += line.chars().count() + 1;
        if size > overlap {
            break;
        }
        count += 1;
    }
    count.max(1)
}

/// Extract the entity name: the first child whose kind is in the language's
/// name-node set, searching one level deeper for wrapper nodes like
/// decorated or exported definitions.
fn extract_name(node: &Node, source: &str, lang: Lang) -> Option<String> {
    let name_kinds = lang.name_node_kinds();

    let direct = named_children(node)
        .into_iter()
        .find(|c| name_kinds.contains(&c.kind()));
    if let Some(n) = direct {
        return Some(source[n.byte_range()].to_string());
    }

    if let Some(n) = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
    {
        return Some(source[n.byte_range()].to_string());
    }

    for child in named_children(node) {
        if let Some(n) = named_children(&child)
            .into_iter()
            .find(|c| name_kinds.contains(&c.kind()))
        {
            return Some(source[n.byte_range()].to_string());
        }
    }
    None
}

/// Extract the declaration text up to (not including) the body opener,
/// capped at a display length.
fn extract_signature(content: &str, lang: Lang) -> Option<String> {
    let open = lang.body_open();
    let head = content.split(open).next()?;
    if head.is_empty() || head.len() == content.len() {
        return None;
    }
    let collapsed: String = head.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(MAX_SIGNATURE_CHARS).collect())
}

/// Extract the docstring: a body-leading string literal for the Python
/// family, the immediately-preceding contiguous comment run otherwise.
fn extract_docstring(node: &Node, source: &str, lang: Lang) -> Option<String> {
    if lang.docstring_in_body() {
        return body_docstring(node, source);
    }

    let comment_kinds = lang.comment_kinds();
    let mut parts: Vec<String> = Vec::new();
    let mut cursor = node.prev_named_sibling();
    let mut boundary = node.start_position().row;

    while let Some(prev) = cursor {
        if !comment_kinds.contains(&prev.kind()) {
            break;
        }
        // The run must be contiguous: no blank gap larger than one line.
        if boundary.saturating_sub(prev.end_position().row) > 1 {
            break;
        }
        boundary = prev.start_position().row;
        parts.push(source[prev.byte_range()].to_string());
        cursor = prev.prev_named_sibling();
    }

    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    Some(parts.join("\n"))
}

/// A string literal as the first statement of the body.
fn body_docstring(node: &Node, source: &str) -> Option<String> {
    // decorated_definition wraps the actual definition
    let def = node
        .child_by_field_name("definition")
        .unwrap_or_else(|| *node);
    let body = def.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    let text = &source[literal.byte_range()];
    Some(
        text.trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string(),
    )
}

fn named_children<'a>(node: &Node<'a>) -> Vec<Node<'a>> {
    let count = node.named_child_count();
    (0..count).filter_map(|i| node.named_child(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> Chunker {
        Chunker::new(1500)
    }

    #[test]
    fn empty_source_returns_nothing() {
        assert!(chunker().chunk("", "empty.rs").is_empty());
        assert!(chunker().chunk("   \n\t\n", "blank.rs").is_empty());
    }

    #[test]
    fn rust_function_becomes_chunk() {
        let source = r#"
fn handle_login(username: &str, password: &str) -> bool {
    let hashed = hash_password(password);
    verify(username, &hashed)
}
"#;
        let chunks = chunker().chunk(source, "src/auth.rs");
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.node_kind, "function_item");
        assert_eq!(c.name.as_deref(), Some("handle_login"));
        assert_eq!(c.language, Some(Lang::Rust));
        assert!(c.id.starts_with("src_auth_rs_L"));
        assert!(c.end_line >= c.start_line);
    }

    #[test]
    fn signature_stops_at_body_opener() {
        let source = r#"
fn compute_totals(items: &[Item], tax: f64) -> f64 {
    items.iter().map(|i| i.price * (1.0 + tax)).sum()
}
"#;
        let chunks = chunker().chunk(source, "src/billing.rs");
        let sig = chunks[0].signature.as_deref().unwrap();
        assert!(sig.contains("fn compute_totals"));
        assert!(!sig.contains("iter()"));
    }

    #[test]
    fn rust_doc_comments_collected() {
        let source = r#"
/// Verifies a session token.
/// Returns false when expired.
fn verify_token(token: &str) -> bool {
    !token.is_empty()
}
"#;
        let chunks = chunker().chunk(source, "src/token.rs");
        let doc = chunks[0].docstring.as_deref().unwrap();
        assert!(doc.contains("Verifies a session token"));
        assert!(doc.contains("Returns false when expired"));
    }

    #[test]
    fn python_body_docstring_extracted() {
        let source = r#"
def authenticate(username, password):
    """Check credentials against the user database."""
    return lookup(username) == hash(password)
"#;
        let chunks = chunker().chunk(source, "app/auth.py");
        assert_eq!(chunks.len(), 1);
        let doc = chunks[0].docstring.as_deref().unwrap();
        assert!(doc.contains("Check credentials"));
    }

    #[test]
    fn ids_unique_within_run() {
        let source = r#"
fn alpha() {
    let a = 1;
    let b = 2;
}

fn beta() {
    let c = 3;
    let d = 4;
}

struct Gamma {
    field: String,
    other: u32,
}
"#;
        let chunks = chunker().chunk(source, "src/lib.rs");
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn top_level_nodes_covered() {
        let source = r#"
fn first_function() {
    println!("one");
    println!("two");
}

struct CoveredStruct {
    a: u32,
    b: u32,
}

impl CoveredStruct {
    fn method(&self) -> u32 {
        self.a + self.b
    }
}
"#;
        let chunks = chunker().chunk(source, "src/cover.rs");
        // Every sizable top-level construct falls inside some chunk span
        for needle in ["first_function", "CoveredStruct"] {
            assert!(
                chunks.iter().any(|c| c.content.contains(needle)),
                "no chunk covers {needle}"
            );
        }
        for c in &chunks {
            assert!(c.end_line >= c.start_line);
        }
    }

    #[test]
    fn oversized_node_splits_with_part_suffixes() {
        let mut body = String::from("fn big_function() {\n");
        for i in 0..120 {
            body.push_str(&format!("    let variable_number_{i} = {i} * 42;\n"));
        }
        body.push_str("}\n");

        let chunks = Chunker::new(400).chunk(&body, "src/big.rs");
        assert!(chunks.len() > 1, "expected split, got {}", chunks.len());
        assert!(chunks.iter().all(|c| c.id.contains("_p")));
        assert!(chunks
            .iter()
            .any(|c| c.name.as_deref() == Some("big_function_part1")));
        // Parts stay within the parent's line span ordering
        for pair in chunks.windows(2) {
            assert!(pair[1].start_line >= pair[0].start_line);
        }
    }

    #[test]
    fn unsupported_extension_uses_fallback() {
        let text = (0..40)
            .map(|i| format!("line number {i} with some content"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunker().chunk(&text, "notes.txt");
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.node_kind == FALLBACK_NODE_KIND));
        assert!(chunks.iter().all(|c| c.name.is_none()));
        assert!(chunks.iter().all(|c| c.signature.is_none()));
    }

    #[test]
    fn fallback_windows_overlap() {
        let text = (0..200)
            .map(|i| format!("filler line {i} with enough text to count"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = Chunker::new(500).chunk(&text, "big.txt");
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            // Next window starts before the previous one ends
            assert!(pair[1].start_line <= pair[0].end_line + 1);
        }
    }

    #[test]
    fn tiny_chunks_discarded() {
        let source = "fn a() {}\n";
        let chunks = chunker().chunk(source, "src/tiny.rs");
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunking_is_deterministic() {
        let source = r#"
fn stable_output() -> u64 {
    let seed = 42;
    seed * 2
}
"#;
        let a = chunker().chunk(source, "src/det.rs");
        let b = chunker().chunk(source, "src/det.rs");
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.content, y.content);
        }
    }

    #[test]
    fn bom_stripped_before_parsing() {
        let source = "\u{feff}fn bom_test() {\n    let x = 1;\n    let y = 2;\n}\n";
        let chunks = chunker().chunk(source, "src/bom.rs");
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].content.starts_with('\u{feff}'));
    }

    #[test]
    fn typescript_interface_chunked() {
        let source = r#"
interface UserSession {
    id: string;
    token: string;
    expiresAt: number;
}
"#;
        let chunks = chunker().chunk(source, "src/session.ts");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].node_kind, "interface_declaration");
        assert_eq!(chunks[0].name.as_deref(), Some("UserSession"));
    }
}
