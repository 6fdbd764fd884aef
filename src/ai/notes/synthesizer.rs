//! Note synthesis
//!
//! Builds the final `StickyNoteData` from a cleaned answer and an optional
//! thinking chain, generating the title from the answer text.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{StickyNoteData, ThinkingChain};

/// Title used when the answer has no usable text
pub const UNTITLED: &str = "Untitled";
/// Longest generated title, in characters, before the ellipsis
pub const MAX_TITLE_CHARS: usize = 30;
const ELLIPSIS: &str = "...";

struct MarkdownRules {
    image: Regex,
    link: Regex,
    heading: Regex,
    emphasis: Regex,
    inline_code: Regex,
    list_marker: Regex,
    whitespace: Regex,
}

fn markdown_rules() -> &'static MarkdownRules {
    static RULES: OnceLock<MarkdownRules> = OnceLock::new();
    RULES.get_or_init(|| MarkdownRules {
        image: Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid image pattern"),
        link: Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid link pattern"),
        heading: Regex::new(r"(?m)^\s{0,3}#{1,6}\s*").expect("valid heading pattern"),
        emphasis: Regex::new(r"\*{1,3}|_{2,3}|~~").expect("valid emphasis pattern"),
        inline_code: Regex::new(r"`+").expect("valid code pattern"),
        list_marker: Regex::new(r"(?m)^\s*(?:[-+>]|\d+\.)\s+").expect("valid list pattern"),
        whitespace: Regex::new(r"\s+").expect("valid whitespace pattern"),
    })
}

/// Remove heading, emphasis, code and link syntax, keeping the visible text
pub fn strip_markdown(text: &str) -> String {
    let rules = markdown_rules();

    let text = rules.image.replace_all(text, "$1");
    let text = rules.link.replace_all(&text, "$1");
    let text = rules.heading.replace_all(&text, "");
    let text = rules.list_marker.replace_all(&text, "");
    let text = rules.emphasis.replace_all(&text, "");
    let text = rules.inline_code.replace_all(&text, "");

    text.into_owned()
}

/// Derive a short title from note content
///
/// Takes the first non-empty line of the stripped text with whitespace
/// collapsed, cut at `MAX_TITLE_CHARS` characters with an ellipsis.
pub fn generate_title(content: &str) -> String {
    let stripped = strip_markdown(content);
    let first_line = stripped
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    let line = markdown_rules().whitespace.replace_all(first_line, " ");

    if line.is_empty() {
        return UNTITLED.to_string();
    }

    if line.chars().count() > MAX_TITLE_CHARS {
        let truncated: String = line.chars().take(MAX_TITLE_CHARS).collect();
        format!("{}{}", truncated.trim_end(), ELLIPSIS)
    } else {
        line.into_owned()
    }
}

/// Assemble the finished note
///
/// With a thinking chain, the content is exactly the chain's final answer.
pub fn synthesize(clean_content: &str, thinking_chain: Option<ThinkingChain>) -> StickyNoteData {
    match thinking_chain {
        Some(chain) => StickyNoteData {
            title: generate_title(&chain.final_answer),
            content: chain.final_answer.clone(),
            thinking_chain: Some(chain),
            has_thinking: Some(true),
        },
        None => StickyNoteData {
            title: generate_title(clean_content),
            content: clean_content.to_string(),
            thinking_chain: None,
            has_thinking: None,
        },
    }
}

/// Assemble a note whose title came with the response
pub fn synthesize_titled(title: &str, content: &str) -> StickyNoteData {
    let mut note = synthesize(content, None);
    if !title.trim().is_empty() {
        note.title = title.trim().to_string();
    }
    note
}
