//! Safe filter construction for search predicates
//!
//! The sole producer of predicate strings consumed by the vector store.
//! Every user-supplied character passes a whitelist before it can appear in
//! a predicate; quoting is handled here, never by callers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SemcodeError};
use crate::languages::language_for_extension;

/// Maximum accepted pattern length.
const MAX_PATTERN_LEN: usize = 500;

/// User-facing filter options for a search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Directory prefix, e.g. `src/auth` or `src_auth`
    pub path: Option<String>,
    /// File glob, e.g. `*.ts` or `**/tests/*.py`
    pub file_pattern: Option<String>,
}

impl FilterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = Some(pattern.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.file_pattern.is_none()
    }
}

/// Validate a raw pattern against the glob alphabet.
///
/// Quotes, spaces, semicolons and every other character that could carry an
/// injection are rejected up front.
pub fn validate_filter_pattern(pattern: &str) -> bool {
    !pattern.is_empty()
        && pattern.len() <= MAX_PATTERN_LEN
        && pattern.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '%' | '*' | '?' | '.' | '/' | '\\')
        })
}

/// Build a predicate string from filter options.
///
/// Returns `None` when no options are set. Raises an invalid-filter error
/// for any input that fails validation - filters never degrade silently.
pub fn build_filter(options: &FilterOptions) -> Result<Option<String>> {
    let mut conditions = Vec::new();

    if let Some(path) = options.path.as_deref() {
        conditions.push(path_condition(path)?);
    }

    if let Some(pattern) = options.file_pattern.as_deref() {
        conditions.push(file_pattern_condition(pattern)?);
    }

    if conditions.is_empty() {
        return Ok(None);
    }
    Ok(Some(conditions.join(" AND ")))
}

/// `path` becomes an id prefix match.
fn path_condition(path: &str) -> Result<String> {
    if !validate_filter_pattern(path) {
        return Err(SemcodeError::InvalidFilter(path.to_string()));
    }
    let sanitized = sanitize(path);
    ensure_sanitized(&sanitized, path)?;
    Ok(format!("id LIKE '{sanitized}%'"))
}

/// `*.ext` patterns become a language equality via the closed extension
/// table; everything else takes the generic glob path.
fn file_pattern_condition(pattern: &str) -> Result<String> {
    if !validate_filter_pattern(pattern) {
        return Err(SemcodeError::InvalidFilter(pattern.to_string()));
    }

    if let Some(ext) = simple_extension(pattern) {
        if let Some(lang) = language_for_extension(ext) {
            let id = lang.id();
            // Languages come from a closed table, but check the shape anyway
            if id.chars().all(|c| c.is_ascii_lowercase()) {
                return Ok(format!("language = '{id}'"));
            }
        }
    }

    let sanitized = sanitize(&pattern.replace("**", "%").replace('*', "%").replace('?', "_"));
    ensure_sanitized(&sanitized, pattern)?;
    Ok(format!("id LIKE '%{sanitized}'"))
}

/// Extract `ext` from a pattern of exactly the shape `*.ext`.
fn simple_extension(pattern: &str) -> Option<&str> {
    let ext = pattern.strip_prefix("*.")?;
    if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext)
    } else {
        None
    }
}

/// Map separators and dots to underscores, matching chunk-id derivation.
fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' => '_',
            other => other,
        })
        .collect()
}

/// The translated pattern may only contain id characters and wildcards.
fn ensure_sanitized(sanitized: &str, original: &str) -> Result<()> {
    if sanitized.is_empty()
        || !sanitized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '%'))
    {
        return Err(SemcodeError::InvalidFilter(original.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INJECTION_CORPUS: &[&str] = &[
        "' OR '1'='1",
        "'; DROP TABLE records--",
        "' UNION SELECT * FROM records --",
        "*.ts'; DROP TABLE--",
        "a' AND language = 'rust",
        "src/../../../etc/passwd; rm -rf /",
        "pattern with spaces",
        "quote\"inside",
        "back`tick",
        "semi;colon",
        "paren()attack",
    ];

    #[test]
    fn injection_corpus_rejected_everywhere() {
        for payload in INJECTION_CORPUS {
            assert!(
                !validate_filter_pattern(payload),
                "pattern should fail validation: {payload}"
            );

            let by_path = build_filter(&FilterOptions::new().with_path(*payload));
            assert!(
                matches!(by_path, Err(SemcodeError::InvalidFilter(_))),
                "path filter should be rejected: {payload}"
            );

            let by_pattern = build_filter(&FilterOptions::new().with_file_pattern(*payload));
            assert!(
                matches!(by_pattern, Err(SemcodeError::InvalidFilter(_))),
                "file pattern should be rejected: {payload}"
            );
        }
    }

    #[test]
    fn overlong_pattern_rejected() {
        let long = "a".repeat(501);
        assert!(!validate_filter_pattern(&long));
        assert!(build_filter(&FilterOptions::new().with_path(long)).is_err());
    }

    #[test]
    fn empty_options_build_nothing() {
        assert_eq!(build_filter(&FilterOptions::new()).unwrap(), None);
    }

    #[test]
    fn path_becomes_id_prefix() {
        let predicate = build_filter(&FilterOptions::new().with_path("src/auth"))
            .unwrap()
            .unwrap();
        assert_eq!(predicate, "id LIKE 'src_auth%'");
    }

    #[test]
    fn presanitized_path_accepted() {
        let predicate = build_filter(&FilterOptions::new().with_path("src_auth"))
            .unwrap()
            .unwrap();
        assert_eq!(predicate, "id LIKE 'src_auth%'");
    }

    #[test]
    fn known_extension_becomes_language_equality() {
        for (pattern, lang) in [
            ("*.ts", "typescript"),
            ("*.tsx", "typescript"),
            ("*.rs", "rust"),
            ("*.py", "python"),
            ("*.go", "go"),
        ] {
            let predicate = build_filter(&FilterOptions::new().with_file_pattern(pattern))
                .unwrap()
                .unwrap();
            assert_eq!(predicate, format!("language = '{lang}'"));
        }
    }

    #[test]
    fn unknown_extension_falls_through_to_glob() {
        let predicate = build_filter(&FilterOptions::new().with_file_pattern("*.xyz"))
            .unwrap()
            .unwrap();
        assert_eq!(predicate, "id LIKE '%%_xyz'");
    }

    #[test]
    fn generic_glob_translation() {
        let predicate = build_filter(&FilterOptions::new().with_file_pattern("**/tests/util?.py"))
            .unwrap()
            .unwrap();
        assert_eq!(predicate, "id LIKE '%%_tests_util__py'");
    }

    #[test]
    fn conditions_joined_with_and() {
        let predicate = build_filter(
            &FilterOptions::new()
                .with_path("src/auth")
                .with_file_pattern("*.ts"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            predicate,
            "id LIKE 'src_auth%' AND language = 'typescript'"
        );
    }

    #[test]
    fn built_predicates_parse_in_the_store() {
        // The builder and the store's parser must agree on the grammar
        let options = FilterOptions::new()
            .with_path("src/auth")
            .with_file_pattern("*.ts");
        let predicate = build_filter(&options).unwrap().unwrap();
        assert!(crate::store::Predicate::parse(&predicate).is_ok());
    }
}
