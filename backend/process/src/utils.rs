use std::sync::LazyLock;

use regex::Regex;

use crate::models::ImportEntry;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Cc}&&[^\s]]").expect("control pattern"));

/// Strips non-whitespace control characters, then collapses whitespace runs to one space and trims.
pub fn sanitize(input: &str) -> String {
    let stripped = CONTROL.replace_all(input, "");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");

    collapsed.trim().to_string()
}

/// `None` when nothing displayable is left.
pub fn sanitize_entry(entry: &ImportEntry) -> Option<ImportEntry> {
    let content = sanitize(&entry.content);
    if content.is_empty() {
        return None;
    }

    let image_url = entry
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(String::from);

    Some(ImportEntry { content, image_url })
}
