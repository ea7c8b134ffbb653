use std::sync::LazyLock;

use hashbrown::HashSet;
use regex::Regex;

/// `@` then a letter and up to 17 letters, digits, underscores or hyphens,
/// not glued to a preceding word and not directly followed by another `@`.
/// Word boundaries are ASCII only, so accented neighbours do not hide a handle.
static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u:\B)@([a-zA-Z][a-zA-Z0-9_-]{0,17})(?:(?-u:\b)[^@]|$)")
        .expect("mention pattern is valid")
});

static HANDLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]{0,17}$").expect("handle pattern is valid")
});

/// Returns true if `username` could be mentioned.
pub fn is_valid_handle(username: &str) -> bool {
    HANDLE.is_match(username)
}

/// Returns the handles mentioned in `content`, in order of first appearance
/// and without duplicates.
pub fn collect_mentions(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    MENTION
        .captures_iter(content)
        .filter_map(|captures| captures.get(1))
        .map(|handle| handle.as_str())
        .filter(|handle| seen.insert(*handle))
        .map(String::from)
        .collect()
}
