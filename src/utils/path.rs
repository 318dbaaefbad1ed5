//! Slash-delimited key path helpers.
//!
//! Keys are always `/`-separated regardless of platform, so these helpers
//! work on strings rather than `std::path`.

/// Lexically cleans a key path: collapses repeated separators, resolves
/// `.` and `..` elements and drops any trailing separator.
/// An empty path cleans to `"."`.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            p => parts.push(p),
        }
    }
    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Joins elements with `/` and cleans the result. Empty elements are
/// ignored; joining nothing yields an empty string.
pub fn join<'a>(elems: impl IntoIterator<Item = &'a str>) -> String {
    let parts: Vec<&str> = elems.into_iter().filter(|e| !e.is_empty()).collect();
    if parts.is_empty() {
        return String::new();
    }
    clean(&parts.join("/"))
}

/// All but the last element of `path`, cleaned.
pub fn dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => clean(&path[..=idx]),
        None => ".".to_string(),
    }
}

/// Last element of `path`. Trailing separators are removed first.
pub fn base(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Splits a cleaned path into its terms; `/a/b` becomes `["", "a", "b"]`.
pub(crate) fn terms(path: &str) -> Vec<String> {
    clean(path).split('/').map(str::to_string).collect()
}

/// Whether `test` starts with every term of `prefix`.
pub(crate) fn same_prefix_terms(
    prefix: &[String],
    test: &[String],
) -> bool {
    test.len() >= prefix.len() && prefix.iter().zip(test).all(|(a, b)| a == b)
}
