//! Reasoning segmentation
//!
//! Splits a reasoning blob into blank-line-delimited paragraphs and
//! classifies each one by keyword. Keyword lists cover English and Chinese,
//! the two languages reasoning models in use here write in.

use chrono::{Duration, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::models::{StepType, ThinkingStep};

/// Spacing between synthetic step timestamps
const STEP_INTERVAL_MS: i64 = 100;

const ANALYSIS_KEYWORDS: &[&str] = &[
    "analy", "examine", "break down", "look at", "consider", "let me understand",
    "分析", "考虑", "观察", "理解",
];

const CONCLUSION_KEYWORDS: &[&str] = &[
    "in conclusion", "therefore", "in summary", "to summarize", "so the answer",
    "finally", "overall",
    "结论", "因此", "所以", "总结", "综上", "最终",
];

const QUESTION_MARKERS: &[&str] = &["?", "？", "wonder", "是否", "为什么", "怎么"];

const IDEA_KEYWORDS: &[&str] = &[
    "suggest", "recommend", "idea", "could try", "might try", "alternatively",
    "建议", "可以尝试", "想法", "或许",
];

/// Ordered classification rules; the first match wins
const RULES: &[(&[&str], StepType)] = &[
    (ANALYSIS_KEYWORDS, StepType::Analysis),
    (CONCLUSION_KEYWORDS, StepType::Conclusion),
    (QUESTION_MARKERS, StepType::Question),
    (IDEA_KEYWORDS, StepType::Idea),
];

fn paragraph_break() -> &'static Regex {
    static BREAK: OnceLock<Regex> = OnceLock::new();
    BREAK.get_or_init(|| Regex::new(r"\n[ \t\r]*\n").expect("valid paragraph pattern"))
}

/// Classify a single paragraph
pub fn classify(paragraph: &str) -> StepType {
    let lowered = paragraph.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, step_type)| *step_type)
        .unwrap_or(StepType::Reasoning)
}

/// Turn a reasoning blob into ordered, classified steps
///
/// Returns an empty list for empty or whitespace-only input.
pub fn segment(reasoning: &str) -> Vec<ThinkingStep> {
    let base = Utc::now();

    paragraph_break()
        .split(reasoning)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(i, paragraph)| ThinkingStep {
            id: uuid::Uuid::new_v4().to_string(),
            content: paragraph.to_string(),
            step_type: classify(paragraph),
            order: i + 1,
            timestamp: base + Duration::milliseconds(STEP_INTERVAL_MS * i as i64),
        })
        .collect()
}
