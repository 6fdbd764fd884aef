//! Retrospective response parsing
//!
//! Once the stream has ended, the full raw response is re-scanned to split
//! reasoning from answer. Phase tracking from the live stream is never used
//! for this. Variants are tried in a fixed order and the first that matches
//! wins, unless the caller names the wrapper it wrote (`finalize_as`):
//!
//! 1. generic `<thinking>` blocks
//! 2. provider `<think>` blocks (DeepSeek/Qwen style)
//! 3. a structured JSON note list
//! 4. plain text

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::models::ThinkingChain;

use super::segmenter::segment;

/// A pair of start/end markers wrapping reasoning text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagConvention {
    /// `<thinking>...</thinking>`, also what the session writes
    Generic,
    /// `<think>...</think>`
    Provider,
}

impl TagConvention {
    pub fn open(&self) -> &'static str {
        match self {
            TagConvention::Generic => "<thinking>",
            TagConvention::Provider => "<think>",
        }
    }

    pub fn close(&self) -> &'static str {
        match self {
            TagConvention::Generic => "</thinking>",
            TagConvention::Provider => "</think>",
        }
    }

    /// The response variant that matches blocks of this convention
    pub fn variant(&self) -> ResponseVariant {
        match self {
            TagConvention::Generic => ResponseVariant::GenericTag,
            TagConvention::Provider => ResponseVariant::ProviderTag,
        }
    }

    fn pattern(&self) -> &'static Regex {
        static GENERIC: OnceLock<Regex> = OnceLock::new();
        static PROVIDER: OnceLock<Regex> = OnceLock::new();

        // A block needs both markers; a lone opening marker is ordinary text
        match self {
            TagConvention::Generic => GENERIC.get_or_init(|| {
                Regex::new(r"(?s)<thinking>(.*?)</thinking>").expect("valid thinking pattern")
            }),
            TagConvention::Provider => PROVIDER.get_or_init(|| {
                Regex::new(r"(?s)<think>(.*?)</think>").expect("valid think pattern")
            }),
        }
    }

    /// Split `raw` into reasoning and answer, if it holds any block of this kind
    ///
    /// Inner texts of several blocks are joined with a blank line. The answer
    /// is everything outside the blocks, trimmed.
    pub fn split(&self, raw: &str) -> Option<(String, String)> {
        let mut blocks = Vec::new();
        let mut answer = String::new();
        let mut last_end = 0;

        for captures in self.pattern().captures_iter(raw) {
            let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            answer.push_str(&raw[last_end..whole.start()]);
            blocks.push(inner.as_str());
            last_end = whole.end();
        }

        if blocks.is_empty() {
            return None;
        }
        answer.push_str(&raw[last_end..]);

        Some((blocks.join("\n\n"), answer.trim().to_string()))
    }
}

/// A note parsed straight out of a structured response
#[derive(Debug, Clone, PartialEq)]
pub struct DraftNote {
    pub title: String,
    pub content: String,
}

/// What a variant pulled out of the raw response
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Tagged { reasoning: String, answer: String },
    Notes(Vec<DraftNote>),
    Plain(String),
}

/// The shapes a finished response can take, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseVariant {
    GenericTag,
    ProviderTag,
    JsonArray,
    PlainText,
}

impl ResponseVariant {
    pub const PRIORITY: [ResponseVariant; 4] = [
        ResponseVariant::GenericTag,
        ResponseVariant::ProviderTag,
        ResponseVariant::JsonArray,
        ResponseVariant::PlainText,
    ];

    /// Try this variant alone against the raw response
    pub fn extract(&self, raw: &str) -> Option<Extraction> {
        match self {
            ResponseVariant::GenericTag => TagConvention::Generic
                .split(raw)
                .map(|(reasoning, answer)| Extraction::Tagged { reasoning, answer }),
            ResponseVariant::ProviderTag => TagConvention::Provider
                .split(raw)
                .map(|(reasoning, answer)| Extraction::Tagged { reasoning, answer }),
            ResponseVariant::JsonArray => extract_json_notes(raw).map(Extraction::Notes),
            ResponseVariant::PlainText => Some(Extraction::Plain(raw.trim().to_string())),
        }
    }
}

/// Result of the finalize step
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedResponse {
    pub variant: ResponseVariant,
    /// User-facing answer, never containing reasoning text
    pub clean_content: String,
    pub thinking_chain: Option<ThinkingChain>,
    /// Notes from a structured response, empty for every other variant
    pub structured_notes: Vec<DraftNote>,
}

/// Re-derive the reasoning/answer split from the full raw response
///
/// With `display_mode` off, a tagged response yields only its answer and no
/// thinking chain. A tagged response whose reasoning segments into zero steps
/// also yields no chain.
pub fn finalize(raw: &str, display_mode: bool, prompt: &str) -> FinalizedResponse {
    let (variant, extraction) = ResponseVariant::PRIORITY
        .iter()
        .find_map(|variant| variant.extract(raw).map(|e| (*variant, e)))
        .unwrap_or_else(|| {
            (
                ResponseVariant::PlainText,
                Extraction::Plain(raw.trim().to_string()),
            )
        });

    finalize_extracted(variant, extraction, display_mode, prompt)
}

/// Like `finalize`, but try `variant` alone first
///
/// Used when the caller knows which wrapper the raw text was written with.
pub fn finalize_as(
    raw: &str,
    variant: ResponseVariant,
    display_mode: bool,
    prompt: &str,
) -> FinalizedResponse {
    match variant.extract(raw) {
        Some(extraction) => finalize_extracted(variant, extraction, display_mode, prompt),
        None => finalize(raw, display_mode, prompt),
    }
}

/// Build the finalized response from an already extracted split
pub fn finalize_extracted(
    variant: ResponseVariant,
    extraction: Extraction,
    display_mode: bool,
    prompt: &str,
) -> FinalizedResponse {
    log::debug!("[ResponseParser] Finalizing as {:?}", variant);

    match extraction {
        Extraction::Tagged { reasoning, answer } => {
            let thinking_chain = if display_mode {
                build_chain(&reasoning, &answer, prompt)
            } else {
                None
            };
            FinalizedResponse {
                variant,
                clean_content: answer,
                thinking_chain,
                structured_notes: Vec::new(),
            }
        }
        Extraction::Notes(notes) => FinalizedResponse {
            variant,
            clean_content: notes
                .iter()
                .map(|n| n.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            thinking_chain: None,
            structured_notes: notes,
        },
        Extraction::Plain(text) => FinalizedResponse {
            variant,
            clean_content: text,
            thinking_chain: None,
            structured_notes: Vec::new(),
        },
    }
}

fn build_chain(reasoning: &str, answer: &str, prompt: &str) -> Option<ThinkingChain> {
    let steps = segment(reasoning);
    if steps.is_empty() {
        log::warn!(
            "[ResponseParser] Reasoning block yielded no steps, falling back to plain answer"
        );
        return None;
    }
    Some(ThinkingChain::new(prompt, steps, answer.to_string()))
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("valid code fence pattern")
    })
}

fn extract_json_notes(raw: &str) -> Option<Vec<DraftNote>> {
    let trimmed = raw.trim();
    let text = code_fence()
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    if !(text.starts_with('[') || text.starts_with('{')) {
        return None;
    }

    let value: Value = serde_json::from_str(text).ok()?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("notes") {
            Some(Value::Array(items)) => items,
            Some(_) => return None,
            None => vec![Value::Object(map)],
        },
        _ => return None,
    };

    let notes: Vec<DraftNote> = items.iter().filter_map(draft_from_value).collect();
    if notes.is_empty() {
        None
    } else {
        Some(notes)
    }
}

fn draft_from_value(value: &Value) -> Option<DraftNote> {
    let content = value.get("content")?.as_str()?;
    let title = value.get("title").and_then(|t| t.as_str()).unwrap_or("");
    Some(DraftNote {
        title: title.trim().to_string(),
        content: content.trim().to_string(),
    })
}
