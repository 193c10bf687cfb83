//! Path normalization, stable chunk-id derivation, and root containment
//!
//! Chunk ids must be identical across platforms for the same logical path,
//! so all separator handling happens here.

use std::path::{Component, Path, PathBuf};

/// Replace platform separators with forward slashes for display and id work.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Derive a stable chunk id from a file path and 1-indexed start line.
///
/// Separators and dots collapse to underscores so the id stays within
/// `[A-Za-z0-9_]` and is identical on every platform:
/// `src/utils/index.ts` + line 42 → `src_utils_index_ts_L42`.
pub fn chunk_id(file_path: &str, start_line: usize) -> String {
    let sanitized: String = normalize_separators(file_path)
        .chars()
        .map(|c| match c {
            '/' | '.' => '_',
            c if c.is_ascii_alphanumeric() || c == '_' => c,
            _ => '_',
        })
        .collect();
    format!("{sanitized}_L{start_line}")
}

/// Append the part suffix used when a chunk is split.
pub fn chunk_part_id(base_id: &str, part: usize) -> String {
    format!("{base_id}_p{part}")
}

/// Strip a single leading UTF-8 BOM. Interior BOMs are preserved.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Check whether `test` lies within `root` after lexical resolution.
///
/// Both paths are resolved component-wise (`.` dropped, `..` popped) without
/// touching the filesystem, so the check also holds for paths that do not
/// exist yet. Comparison is case-insensitive on platforms with
/// case-insensitive filesystems.
pub fn is_within_root(test: &Path, root: &Path) -> bool {
    let resolved_root = lexical_resolve(root);
    let resolved_test = if test.is_absolute() {
        lexical_resolve(test)
    } else {
        lexical_resolve(&resolved_root.join(test))
    };

    let root_s = comparable(&resolved_root);
    let test_s = comparable(&resolved_test);

    test_s == root_s || test_s.starts_with(&format!("{root_s}/"))
}

/// Resolve `.` and `..` components lexically.
fn lexical_resolve(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn comparable(path: &Path) -> String {
    let s = normalize_separators(&path.to_string_lossy());
    let s = s.trim_end_matches('/').to_string();
    if cfg!(any(windows, target_os = "macos")) {
        s.to_lowercase()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_platform_independent() {
        assert_eq!(
            chunk_id("src/utils/index.ts", 42),
            "src_utils_index_ts_L42"
        );
        assert_eq!(
            chunk_id("src\\utils\\index.ts", 42),
            "src_utils_index_ts_L42"
        );
    }

    #[test]
    fn chunk_id_sanitizes_unusual_characters() {
        let id = chunk_id("a b/c-d.py", 1);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(id.ends_with("_L1"));
    }

    #[test]
    fn part_suffix_appended() {
        assert_eq!(chunk_part_id("src_lib_rs_L10", 2), "src_lib_rs_L10_p2");
    }

    #[test]
    fn strip_bom_leading_only() {
        assert_eq!(strip_bom("\u{feff}hello"), "hello");
        assert_eq!(strip_bom("hello"), "hello");
        // Interior BOM untouched
        assert_eq!(strip_bom("he\u{feff}llo"), "he\u{feff}llo");
    }

    #[test]
    fn containment_rejects_traversal() {
        assert!(!is_within_root(
            Path::new("../../../etc/passwd"),
            Path::new("/home/user/project")
        ));
    }

    #[test]
    fn containment_accepts_subdirectory() {
        assert!(is_within_root(
            Path::new("/home/user/project/src"),
            Path::new("/home/user/project")
        ));
    }

    #[test]
    fn containment_rejects_sibling_prefix() {
        // "project2" starts with "project" but is not inside it
        assert!(!is_within_root(
            Path::new("/home/user/project2"),
            Path::new("/home/user/project")
        ));
    }

    #[test]
    fn containment_accepts_root_itself() {
        assert!(is_within_root(
            Path::new("/home/user/project"),
            Path::new("/home/user/project")
        ));
    }

    #[test]
    fn containment_resolves_dotdot_inside_absolute_paths() {
        assert!(!is_within_root(
            Path::new("/home/user/project/../other"),
            Path::new("/home/user/project")
        ));
        assert!(is_within_root(
            Path::new("/home/user/project/src/../lib"),
            Path::new("/home/user/project")
        ));
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        assert!(is_within_root(
            Path::new("src/auth"),
            Path::new("/home/user/project")
        ));
        assert!(!is_within_root(
            Path::new("src/../../escape"),
            Path::new("/home/user/project")
        ));
    }
}
