//! Per-call streaming state
//!
//! A `GenerationSession` folds decoded events into the accumulated response.
//! `raw_accumulated` is protocol-faithful: every delta in arrival order, with
//! reasoning-channel text wrapped in a thinking tag so the finalize step can
//! recover the split by re-scanning it. The wrapper is the generic tag unless
//! the streamed text itself mentions its markers. The displayed text
//! is a separate overlay that may carry presentation markers; those never
//! reach `raw_accumulated`.

use serde::{Deserialize, Serialize};

use crate::ai::llm::DeltaEvent;

use super::parser::{self, Extraction, FinalizedResponse, TagConvention};

/// Shown once when the model starts reasoning, if reasoning is displayed
pub const THINKING_BANNER: &str = "> Thinking...\n\n";
/// Shown once between displayed reasoning and the first answer text
pub const ANSWER_SEPARATOR: &str = "\n\n---\n\n";

/// Tag conventions the session may wrap reasoning in, in preference order
const WRAPPERS: [TagConvention; 2] = [TagConvention::Generic, TagConvention::Provider];

/// Which channel the stream is currently believed to be writing
///
/// Only moves forward: Idle -> Reasoning -> Answering, or Idle -> Answering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Reasoning,
    Answering,
}

/// A piece of text forwarded to the live view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayChunk {
    pub delta: String,
    /// Everything displayed so far, this delta included
    pub cumulative: String,
}

/// A contiguous run of one channel, in arrival order
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Reasoning(String),
    Answer(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSession {
    segments: Vec<Segment>,
    raw_accumulated: String,
    answer_accumulated: String,
    reasoning_accumulated: String,
    /// Wrapper used in `raw_accumulated`; None once the text mentions
    /// the markers of every convention
    convention: Option<TagConvention>,
    phase: Phase,
    display_mode: bool,
    reasoning_tag_open: bool,
    displayed: String,
}

impl GenerationSession {
    pub fn new(display_mode: bool) -> Self {
        Self {
            segments: Vec::new(),
            raw_accumulated: String::new(),
            answer_accumulated: String::new(),
            reasoning_accumulated: String::new(),
            convention: Some(TagConvention::Generic),
            phase: Phase::Idle,
            display_mode,
            reasoning_tag_open: false,
            displayed: String::new(),
        }
    }

    /// Pure transition: consume one event, returning the next session and
    /// whatever it forwards to the live view
    pub fn reduce(mut self, event: &DeltaEvent) -> (Self, Vec<DisplayChunk>) {
        let chunks = self.consume(event);
        (self, chunks)
    }

    /// Apply one event in place
    ///
    /// Reasoning is applied before content when an event carries both.
    /// Empty strings are treated as absent fields.
    pub fn consume(&mut self, event: &DeltaEvent) -> Vec<DisplayChunk> {
        let mut chunks = Vec::new();

        if let Some(delta) = non_empty(&event.reasoning_content) {
            chunks.extend(self.push_reasoning(delta));
        }
        if let Some(delta) = non_empty(&event.content) {
            chunks.push(self.push_answer(delta));
        }

        chunks
    }

    /// Close a reasoning wrapper left open by an interrupted stream
    ///
    /// Call once no more events will arrive, before finalizing.
    pub fn finish(&mut self) {
        if self.reasoning_tag_open {
            let close = self.wrapper().close();
            self.raw_accumulated.push_str(close);
            self.reasoning_tag_open = false;
        }
    }

    /// Split the accumulated response into reasoning and answer
    ///
    /// Raw text is re-scanned with the convention the session wrapped
    /// reasoning in. When the streamed text itself mentioned the markers of
    /// every convention, the recorded segments are used instead.
    pub fn finalize(&self, prompt: &str) -> FinalizedResponse {
        if !self.has_reasoning() {
            return parser::finalize(&self.raw_accumulated, self.display_mode, prompt);
        }

        match self.convention {
            Some(convention) => parser::finalize_as(
                &self.raw_accumulated,
                convention.variant(),
                self.display_mode,
                prompt,
            ),
            None => {
                log::debug!("[GenerationSession] Finalizing from recorded segments");
                let (reasoning, answer) = self.split_segments();
                parser::finalize_extracted(
                    TagConvention::Generic.variant(),
                    Extraction::Tagged { reasoning, answer },
                    self.display_mode,
                    prompt,
                )
            }
        }
    }

    fn push_reasoning(&mut self, delta: &str) -> Option<DisplayChunk> {
        let first_reasoning = !self.has_reasoning();
        if !self.reasoning_tag_open {
            let open = self.wrapper().open();
            self.segments.push(Segment::Reasoning(String::new()));
            self.raw_accumulated.push_str(open);
            self.reasoning_tag_open = true;
        }
        self.append(delta);
        self.reasoning_accumulated.push_str(delta);

        if first_reasoning {
            // Answer text seen so far now shares the raw record with a wrapper
            self.reselect_convention();
        }

        match self.phase {
            Phase::Idle => {
                self.phase = Phase::Reasoning;
                if self.display_mode {
                    Some(self.display(format!("{}{}", THINKING_BANNER, delta)))
                } else {
                    None
                }
            }
            Phase::Reasoning if self.display_mode => Some(self.display(delta.to_string())),
            Phase::Reasoning => None,
            Phase::Answering => {
                // Kept in the raw record, but the live view has moved on
                log::debug!(
                    "[GenerationSession] Reasoning delta after answer started ({} chars)",
                    delta.len()
                );
                None
            }
        }
    }

    fn push_answer(&mut self, delta: &str) -> DisplayChunk {
        if self.reasoning_tag_open {
            let close = self.wrapper().close();
            self.raw_accumulated.push_str(close);
            self.reasoning_tag_open = false;
        }
        if !matches!(self.segments.last(), Some(Segment::Answer(_))) {
            self.segments.push(Segment::Answer(String::new()));
        }
        self.append(delta);
        self.answer_accumulated.push_str(delta);

        let shown = match self.phase {
            Phase::Reasoning if self.display_mode => format!("{}{}", ANSWER_SEPARATOR, delta),
            _ => delta.to_string(),
        };
        self.phase = Phase::Answering;
        self.display(shown)
    }

    /// Append to the open segment and the raw record, switching wrapper if
    /// the new text completes one of the current wrapper's markers
    fn append(&mut self, delta: &str) {
        let Some(segment) = self.segments.last_mut() else {
            return;
        };
        let text = match segment {
            Segment::Reasoning(text) | Segment::Answer(text) => text,
        };
        let tail = text.len().saturating_sub(max_marker_len());
        let window_start = char_floor(text, tail);
        text.push_str(delta);
        self.raw_accumulated.push_str(delta);

        let Some(convention) = self.convention else {
            return;
        };
        let mentioned = mentions(&text[window_start..], convention);
        if mentioned && self.has_reasoning() {
            self.reselect_convention();
        }
    }

    fn reselect_convention(&mut self) {
        let selected = WRAPPERS
            .into_iter()
            .find(|c| !self.segments.iter().any(|s| mentions(s.text(), *c)));
        if selected == self.convention {
            return;
        }

        match selected {
            Some(convention) => log::debug!(
                "[GenerationSession] Streamed text mentions reasoning markers, wrapping with {}",
                convention.open()
            ),
            None => log::warn!(
                "[GenerationSession] Streamed text mentions every reasoning marker, \
                 keeping segment boundaries instead"
            ),
        }
        self.convention = selected;
        self.raw_accumulated = self.render();
    }

    /// Rebuild the raw record from segments with the current wrapper
    fn render(&self) -> String {
        let wrapper = self.wrapper();
        let last = self.segments.len().saturating_sub(1);
        let mut raw = String::new();

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Answer(text) => raw.push_str(text),
                Segment::Reasoning(text) => {
                    raw.push_str(wrapper.open());
                    raw.push_str(text);
                    if index != last || !self.reasoning_tag_open {
                        raw.push_str(wrapper.close());
                    }
                }
            }
        }
        raw
    }

    fn split_segments(&self) -> (String, String) {
        let mut blocks = Vec::new();
        let mut answer = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Reasoning(text) => blocks.push(text.as_str()),
                Segment::Answer(text) => answer.push_str(text),
            }
        }
        (blocks.join("\n\n"), answer.trim().to_string())
    }

    fn wrapper(&self) -> TagConvention {
        self.convention.unwrap_or(TagConvention::Generic)
    }

    fn has_reasoning(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Reasoning(_)))
    }

    fn display(&mut self, delta: String) -> DisplayChunk {
        self.displayed.push_str(&delta);
        DisplayChunk {
            delta,
            cumulative: self.displayed.clone(),
        }
    }

    pub fn raw_accumulated(&self) -> &str {
        &self.raw_accumulated
    }

    pub fn answer_accumulated(&self) -> &str {
        &self.answer_accumulated
    }

    pub fn reasoning_accumulated(&self) -> &str {
        &self.reasoning_accumulated
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn display_mode(&self) -> bool {
        self.display_mode
    }

    /// Presentation overlay shown to the caller so far
    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    /// True until the first non-empty delta arrives
    pub fn is_empty(&self) -> bool {
        self.raw_accumulated.is_empty()
    }
}

impl Segment {
    fn text(&self) -> &str {
        match self {
            Segment::Reasoning(text) | Segment::Answer(text) => text,
        }
    }
}

fn mentions(text: &str, convention: TagConvention) -> bool {
    text.contains(convention.open()) || text.contains(convention.close())
}

fn max_marker_len() -> usize {
    WRAPPERS
        .iter()
        .map(|c| c.open().len().max(c.close().len()))
        .max()
        .unwrap_or(0)
}

fn char_floor(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Fold a finite event sequence through a fresh session
///
/// The returned session is not finished, so an open reasoning wrapper stays
/// open in `raw_accumulated`.
pub fn replay<'a, I>(events: I, display_mode: bool) -> (GenerationSession, Vec<DisplayChunk>)
where
    I: IntoIterator<Item = &'a DeltaEvent>,
{
    events.into_iter().fold(
        (GenerationSession::new(display_mode), Vec::new()),
        |(session, mut displayed), event| {
            let (session, chunks) = session.reduce(event);
            displayed.extend(chunks);
            (session, displayed)
        },
    )
}
