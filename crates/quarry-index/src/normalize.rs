//! Storage-format HTML to plain text conversion.
//!
//! Keeps just enough structure for retrieval: headings become `#` lines and
//! list items become `-` lines, everything else flattens to text.

use std::sync::LazyLock;

use regex::Regex;

static HEADING_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h[1-6][^>]*>").expect("static regex"));
static HEADING_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</h[1-6]>").expect("static regex"));
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<li[^>]*>").expect("static regex"));
static BLOCK_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:/p|/div|/tr|/li|br\s*/?)>").expect("static regex"));
static CELL_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</t[dh]>").expect("static regex"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("static regex"));
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("static regex"));

/// Convert storage-format HTML into plain text suitable for chunking.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let text = HEADING_OPEN.replace_all(html, "\n# ");
    let text = HEADING_CLOSE.replace_all(&text, "\n");
    let text = LIST_ITEM.replace_all(&text, "\n- ");
    let text = BLOCK_BREAK.replace_all(&text, "\n");
    let text = CELL_BREAK.replace_all(&text, " | ");
    let text = ANY_TAG.replace_all(&text, " ");

    let text = unescape_entities(&text);

    let text = SPACE_RUN.replace_all(&text, " ");
    let text = BLANK_RUN.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

fn unescape_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
