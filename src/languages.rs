//! Language detection and tree-sitter grammar registry.
//!
//! Everything language-specific lives here: which grammar parses a file,
//! which node kinds become chunks, where names and docstrings are found.
//! Adding a language means adding a variant and its table entries.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Supported language with its tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
}

impl Lang {
    /// Identifier used in record payloads and filter predicates.
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
        }
    }

    /// Load the tree-sitter grammar for this language.
    pub fn grammar(self) -> tree_sitter::Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }

    /// Top-level AST node kinds that become chunks.
    pub fn chunk_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &[
                "function_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
                "type_item",
                "const_item",
                "static_item",
                "macro_definition",
                "mod_item",
            ],
            Self::Python => &[
                "function_definition",
                "class_definition",
                "decorated_definition",
            ],
            Self::JavaScript => &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "method_definition",
                "export_statement",
                "lexical_declaration",
            ],
            Self::TypeScript => &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "abstract_class_declaration",
                "method_definition",
                "interface_declaration",
                "type_alias_declaration",
                "enum_declaration",
                "export_statement",
                "lexical_declaration",
            ],
            Self::Go => &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
                "const_declaration",
                "var_declaration",
            ],
        }
    }

    /// Node kinds that carry the entity name when found among a chunk
    /// node's children.
    pub fn name_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["identifier", "type_identifier", "field_identifier"],
            Self::Python => &["identifier"],
            Self::JavaScript => &["identifier", "property_identifier"],
            Self::TypeScript => &["identifier", "type_identifier", "property_identifier"],
            Self::Go => &["identifier", "type_identifier", "field_identifier"],
        }
    }

    /// Delimiter that opens a body; the signature is the node text before it.
    pub fn body_open(self) -> char {
        match self {
            Self::Python => ':',
            _ => '{',
        }
    }

    /// Node kinds treated as comments when collecting a leading docstring.
    pub fn comment_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["line_comment", "block_comment"],
            _ => &["comment"],
        }
    }

    /// Whether docstrings are leading string literals in the body
    /// (the Python convention) rather than preceding comments.
    pub fn docstring_in_body(self) -> bool {
        matches!(self, Self::Python)
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?;
    language_for_extension(ext)
}

/// Closed extension → language table, shared with the filter builder.
pub fn language_for_extension(ext: &str) -> Option<Lang> {
    match ext.to_lowercase().as_str() {
        "rs" => Some(Lang::Rust),
        "py" | "pyi" => Some(Lang::Python),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" | "tsx" | "mts" | "cts" => Some(Lang::TypeScript),
        "go" => Some(Lang::Go),
        _ => None,
    }
}

/// Check if a file has a language with an available grammar.
pub fn is_supported(path: &Path) -> bool {
    detect_language(path).is_some()
}
