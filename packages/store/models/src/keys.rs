//! Key and prefix normalization.
//!
//! Object stores have no real directories, only `/`-separated keys. These
//! helpers give every caller the same answer to "what is the prefix for
//! this directory" and "what is the key for this file in that directory".

/// Normalizes a directory-like path into a listing prefix.
///
/// Leading and trailing slashes are stripped and exactly one trailing `/`
/// is appended. The root (`""`, `"/"`, whitespace) normalizes to `""`.
///
/// ```
/// use bucket_browser_store_models::keys::normalize_prefix;
///
/// assert_eq!(normalize_prefix("/photos//"), "photos/");
/// assert_eq!(normalize_prefix("/"), "");
/// ```
#[must_use]
pub fn normalize_prefix(dir: &str) -> String {
    let trimmed = dir.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Joins a destination directory and a relative path into a full key.
#[must_use]
pub fn join_key(dir: &str, relative_path: &str) -> String {
    format!(
        "{}{}",
        normalize_prefix(dir),
        relative_path.trim_start_matches('/')
    )
}

/// Returns `true` if the key names a folder (ends with `/`).
#[must_use]
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with('/')
}

/// Returns the last non-empty segment of a key.
///
/// `"a/b/c.txt"` → `"c.txt"`, `"a/b/"` → `"b"`.
#[must_use]
pub fn basename(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Returns the prefix containing `key`, including its trailing `/`.
///
/// Keys at the root return `""`. Folder keys return their parent.
#[must_use]
pub fn parent_prefix(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    trimmed.rfind('/').map_or("", |idx| &trimmed[..=idx])
}

/// Returns the first segment of a relative path when the path is nested.
///
/// Flat paths (no `/`) return `None`.
#[must_use]
pub fn top_level_segment(relative_path: &str) -> Option<&str> {
    let path = relative_path.trim_start_matches('/');
    path.split_once('/').map(|(first, _)| first)
}

/// Splits a file name into stem and extension (with its dot).
///
/// Dot-files and names without a dot have an empty extension.
#[must_use]
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    }
}

/// Returns `true` if the final segment looks like a file name
/// (contains a `.` and is not a dot-file).
#[must_use]
pub fn looks_like_file(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or(path);
    last.contains('.') && !last.starts_with('.')
}

/// Derives the `n`-th "keep both" candidate for a key by inserting
/// ` (n)` before the extension.
///
/// ```
/// use bucket_browser_store_models::keys::keep_both_key;
///
/// assert_eq!(keep_both_key("docs/a.txt", 1), "docs/a (1).txt");
/// assert_eq!(keep_both_key("README", 2), "README (2)");
/// ```
#[must_use]
pub fn keep_both_key(key: &str, n: u32) -> String {
    let parent = parent_prefix(key);
    let name = basename(key);
    let (stem, ext) = split_extension(name);
    let suffix = if is_folder_key(key) { "/" } else { "" };
    format!("{parent}{stem} ({n}){ext}{suffix}")
}

/// Re-roots `key` from `src_prefix` to `dst_prefix`.
///
/// Returns `None` if `key` is not under `src_prefix`.
#[must_use]
pub fn reroot(key: &str, src_prefix: &str, dst_prefix: &str) -> Option<String> {
    key.strip_prefix(src_prefix)
        .map(|rest| format!("{dst_prefix}{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_prefixes() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("  / "), "");
        assert_eq!(normalize_prefix("a"), "a/");
        assert_eq!(normalize_prefix("/a/b/"), "a/b/");
        assert_eq!(normalize_prefix("a/b///"), "a/b/");
    }

    #[test]
    fn joins_keys() {
        assert_eq!(join_key("/", "a.txt"), "a.txt");
        assert_eq!(join_key("docs", "/sub/a.txt"), "docs/sub/a.txt");
    }

    #[test]
    fn splits_names() {
        assert_eq!(basename("a/b/c.txt"), "c.txt");
        assert_eq!(basename("a/b/"), "b");
        assert_eq!(parent_prefix("a/b/c.txt"), "a/b/");
        assert_eq!(parent_prefix("a/b/"), "a/");
        assert_eq!(parent_prefix("c.txt"), "");
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension(".env"), (".env", ""));
        assert_eq!(top_level_segment("photos/2024/a.jpg"), Some("photos"));
        assert_eq!(top_level_segment("a.jpg"), None);
    }

    #[test]
    fn keep_both_inserts_suffix_before_extension() {
        assert_eq!(keep_both_key("a.txt", 1), "a (1).txt");
        assert_eq!(keep_both_key("x/y/a.tar.gz", 3), "x/y/a.tar (3).gz");
        assert_eq!(keep_both_key("x/folder/", 1), "x/folder (1)/");
    }

    #[test]
    fn detects_file_like_names() {
        assert!(looks_like_file("dir/a.txt"));
        assert!(!looks_like_file("dir/sub"));
        assert!(!looks_like_file(".hidden"));
    }

    #[test]
    fn reroots_keys() {
        assert_eq!(
            reroot("a/b/c.txt", "a/", "z/").as_deref(),
            Some("z/b/c.txt")
        );
        assert_eq!(reroot("q/c.txt", "a/", "z/"), None);
    }
}
