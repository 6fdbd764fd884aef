use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Thinking Chain Models
// ============================================================================

/// Classification of a single reasoning paragraph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Analysis,
    Reasoning,
    Conclusion,
    Question,
    Idea,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Analysis => "analysis",
            StepType::Reasoning => "reasoning",
            StepType::Conclusion => "conclusion",
            StepType::Question => "question",
            StepType::Idea => "idea",
        }
    }
}

/// One paragraph of a model's reasoning, classified
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingStep {
    pub id: String,
    pub content: String,
    pub step_type: StepType,
    /// 1-based position of the paragraph in the reasoning text
    pub order: usize,
    pub timestamp: DateTime<Utc>,
}

/// Structured reasoning attached to a generated note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingChain {
    pub id: String,
    pub prompt: String,
    pub steps: Vec<ThinkingStep>,
    pub final_answer: String,
    /// Wall-clock reasoning time in milliseconds
    pub total_thinking_time: u64,
    pub created_at: DateTime<Utc>,
}

impl ThinkingChain {
    pub fn new(prompt: &str, steps: Vec<ThinkingStep>, final_answer: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.to_string(),
            steps,
            final_answer,
            total_thinking_time: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_thinking_time(mut self, millis: u64) -> Self {
        self.total_thinking_time = millis;
        self
    }
}

// ============================================================================
// Note Models
// ============================================================================

/// A generated sticky note, handed to the caller once generation finishes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StickyNoteData {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_chain: Option<ThinkingChain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_thinking: Option<bool>,
}

impl StickyNoteData {
    pub fn has_thinking(&self) -> bool {
        self.has_thinking.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_serialization_omits_missing_chain() {
        let note = StickyNoteData {
            title: "Hello".to_string(),
            content: "Hello world.".to_string(),
            thinking_chain: None,
            has_thinking: None,
        };

        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("\"title\":\"Hello\""));
        assert!(!json.contains("thinkingChain"));
        assert!(!json.contains("hasThinking"));
        assert!(!note.has_thinking());
    }

    #[test]
    fn test_step_type_serialization() {
        let json = serde_json::to_string(&StepType::Conclusion).unwrap();
        assert_eq!(json, "\"conclusion\"");
        assert_eq!(StepType::Idea.as_str(), "idea");
    }

    #[test]
    fn test_chain_camel_case_fields() {
        let chain = ThinkingChain::new("why?", Vec::new(), "because".to_string())
            .with_thinking_time(1500);
        let json = serde_json::to_string(&chain).unwrap();
        assert!(json.contains("\"finalAnswer\":\"because\""));
        assert!(json.contains("\"totalThinkingTime\":1500"));
    }
}
