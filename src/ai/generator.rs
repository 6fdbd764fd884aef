//! Streaming Note Generator
//!
//! Runs one generation call end to end: opens the completion stream, folds
//! decoded events into a `GenerationSession` while forwarding displayable
//! text to the caller, then reconstructs the finished note(s) from the raw
//! response once the stream ends.
//!
//! Every call owns its session and its response stream. The stream is
//! dropped, releasing the connection, on every exit path.

use serde::Serialize;
use std::future::pending;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::config::{GenerationConfig, ProviderConfig};
use super::llm::{
    create_transport, sse::decode_events, ChatRequest, CompletionTransport, DeltaEvent, LlmError,
};
use super::notes::{synthesize, synthesize_titled, GenerationSession, Phase};
use crate::models::StickyNoteData;

/// Title shown for a note while it is still streaming
pub const TITLE_PLACEHOLDER: &str = "Generating...";

/// Errors that end a generation call
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("LLM error: {0}")]
    Transport(#[from] LlmError),
    #[error("Generation was cancelled")]
    Cancelled,
    #[error("Generation timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl GenerationError {
    /// True for caller- or timeout-initiated aborts, false for provider failures
    pub fn is_cancellation(&self) -> bool {
        matches!(self, GenerationError::Cancelled | GenerationError::TimedOut(_))
    }
}

/// A failed generation call, with a note rebuilt from whatever had streamed
#[derive(Error, Debug)]
#[error("{error}")]
pub struct GenerationFailure {
    #[source]
    pub error: GenerationError,
    /// None when nothing had been received yet
    pub fallback_note: Option<StickyNoteData>,
}

/// Receives progress from a generation call
///
/// Exactly one of `on_all_complete` / `on_error` fires per call.
pub trait GenerationCallbacks: Send {
    fn on_note_start(&mut self, _index: usize, _title_placeholder: &str) {}
    fn on_content_chunk(&mut self, _index: usize, _delta: &str, _cumulative: &str) {}
    fn on_note_complete(&mut self, _index: usize, _note: &StickyNoteData) {}
    fn on_all_complete(&mut self, _notes: &[StickyNoteData]) {}
    fn on_error(&mut self, _message: &str) {}
}

/// Callbacks that ignore everything
pub struct NoopCallbacks;

impl GenerationCallbacks for NoopCallbacks {}

/// Serializable form of the callbacks, for forwarding to a UI
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteStreamEvent {
    NoteStart {
        index: usize,
        title: String,
    },
    Chunk {
        index: usize,
        delta: String,
        cumulative: String,
    },
    NoteComplete {
        index: usize,
        note: StickyNoteData,
    },
    AllComplete {
        notes: Vec<StickyNoteData>,
    },
    Error {
        message: String,
    },
}

/// Forwards every callback into a channel as a `NoteStreamEvent`
pub struct ChannelCallbacks {
    tx: mpsc::UnboundedSender<NoteStreamEvent>,
}

impl ChannelCallbacks {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NoteStreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: NoteStreamEvent) {
        // A closed receiver only means nobody is watching anymore
        let _ = self.tx.send(event);
    }
}

impl GenerationCallbacks for ChannelCallbacks {
    fn on_note_start(&mut self, index: usize, title_placeholder: &str) {
        self.send(NoteStreamEvent::NoteStart {
            index,
            title: title_placeholder.to_string(),
        });
    }

    fn on_content_chunk(&mut self, index: usize, delta: &str, cumulative: &str) {
        self.send(NoteStreamEvent::Chunk {
            index,
            delta: delta.to_string(),
            cumulative: cumulative.to_string(),
        });
    }

    fn on_note_complete(&mut self, index: usize, note: &StickyNoteData) {
        self.send(NoteStreamEvent::NoteComplete {
            index,
            note: note.clone(),
        });
    }

    fn on_all_complete(&mut self, notes: &[StickyNoteData]) {
        self.send(NoteStreamEvent::AllComplete {
            notes: notes.to_vec(),
        });
    }

    fn on_error(&mut self, message: &str) {
        self.send(NoteStreamEvent::Error {
            message: message.to_string(),
        });
    }
}

/// Cancellation signal shared between a caller and a running generation
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut cancel_rx = self.cancel_tx.subscribe();
        loop {
            let cancelled = *cancel_rx.borrow_and_update();
            if cancelled {
                return;
            }
            if cancel_rx.changed().await.is_err() {
                return pending().await;
            }
        }
    }
}

async fn wait_for_cancel(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => pending().await,
    }
}

/// State of one call's read loop
struct StreamRun {
    session: GenerationSession,
    note_started: bool,
    reasoning_started: Option<Instant>,
    reasoning_finished: Option<Instant>,
}

impl StreamRun {
    fn new(display_mode: bool) -> Self {
        Self {
            session: GenerationSession::new(display_mode),
            note_started: false,
            reasoning_started: None,
            reasoning_finished: None,
        }
    }

    fn apply(&mut self, event: &DeltaEvent, callbacks: &mut dyn GenerationCallbacks) {
        if let Some(ref reason) = event.finish_reason {
            log::debug!("[NoteGenerator] finish_reason: {}", reason);
        }

        let chunks = self.session.consume(event);

        let now = Instant::now();
        if self.reasoning_started.is_none() && !self.session.reasoning_accumulated().is_empty() {
            self.reasoning_started = Some(now);
        }
        if self.reasoning_started.is_some()
            && self.reasoning_finished.is_none()
            && self.session.phase() == Phase::Answering
        {
            self.reasoning_finished = Some(now);
        }

        if chunks.is_empty() {
            return;
        }
        if !self.note_started {
            callbacks.on_note_start(0, TITLE_PLACEHOLDER);
            self.note_started = true;
        }
        for chunk in chunks {
            callbacks.on_content_chunk(0, &chunk.delta, &chunk.cumulative);
        }
    }

    fn thinking_time_ms(&self) -> u64 {
        let elapsed = match (self.reasoning_started, self.reasoning_finished) {
            (Some(started), Some(finished)) => finished.duration_since(started),
            (Some(started), None) => started.elapsed(),
            _ => Duration::ZERO,
        };
        elapsed.as_millis() as u64
    }

    /// Rebuild note(s) from the response received so far
    ///
    /// Expects the session to be finished.
    fn build_notes(&self, prompt: &str) -> Vec<StickyNoteData> {
        let finalized = self.session.finalize(prompt);

        if finalized.structured_notes.is_empty() {
            let chain = finalized
                .thinking_chain
                .map(|chain| chain.with_thinking_time(self.thinking_time_ms()));
            vec![synthesize(&finalized.clean_content, chain)]
        } else {
            finalized
                .structured_notes
                .iter()
                .map(|draft| synthesize_titled(&draft.title, &draft.content))
                .collect()
        }
    }

    /// The first note rebuilt from a failed call's partial response
    ///
    /// A structured response may already hold several notes; only the first
    /// is kept, and the rest are logged as dropped.
    fn fallback_note(&self, prompt: &str) -> Option<StickyNoteData> {
        if self.session.is_empty() {
            return None;
        }
        let mut notes = self.build_notes(prompt).into_iter();
        let first = notes.next();
        let dropped = notes.count();
        if dropped > 0 {
            log::warn!(
                "[NoteGenerator] Fallback keeps the first note, dropping {} more",
                dropped
            );
        }
        first
    }
}

/// Generates sticky notes from a prompt over a streaming completion
pub struct NoteGenerator {
    transport: Box<dyn CompletionTransport>,
    model: String,
    config: GenerationConfig,
}

impl NoteGenerator {
    pub fn new(
        transport: Box<dyn CompletionTransport>,
        model: &str,
        config: GenerationConfig,
    ) -> Self {
        Self {
            transport,
            model: model.to_string(),
            config,
        }
    }

    /// Build a generator for a configured provider
    pub fn from_provider(
        provider: &ProviderConfig,
        config: GenerationConfig,
    ) -> Result<Self, LlmError> {
        if provider.model.is_empty() {
            return Err(LlmError::NotConfigured(format!(
                "Provider '{}' has no model selected",
                provider.id
            )));
        }
        let transport = create_transport(provider)?;
        Ok(Self::new(transport, &provider.model, config))
    }

    /// Run one generation call
    ///
    /// On failure the returned `GenerationFailure` carries a fallback note
    /// built from the text received before the failure, if any. For a
    /// structured response that is the first of its notes.
    pub async fn generate(
        &self,
        prompt: &str,
        callbacks: &mut dyn GenerationCallbacks,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<StickyNoteData>, GenerationFailure> {
        log::info!(
            "[NoteGenerator] Generating note with {} (display_thinking={}, timeout={}ms)",
            self.model,
            self.config.display_thinking_mode,
            self.config.timeout_ms
        );

        let mut run = StreamRun::new(self.config.display_thinking_mode);

        let outcome = self.read_stream(prompt, &mut run, callbacks, cancel).await;
        run.session.finish();

        if let Err(error) = outcome {
            if error.is_cancellation() {
                log::info!("[NoteGenerator] Stopped: {}", error);
            } else {
                log::error!("[NoteGenerator] Generation failed: {}", error);
            }
            let fallback_note = run.fallback_note(prompt);
            callbacks.on_error(&error.to_string());
            return Err(GenerationFailure {
                error,
                fallback_note,
            });
        }

        let notes = run.build_notes(prompt);
        for (index, note) in notes.iter().enumerate() {
            if index > 0 || !run.note_started {
                callbacks.on_note_start(index, TITLE_PLACEHOLDER);
            }
            callbacks.on_note_complete(index, note);
        }
        callbacks.on_all_complete(&notes);

        log::info!(
            "[NoteGenerator] Completed: {} note(s), {} raw chars, thinking={}",
            notes.len(),
            run.session.raw_accumulated().len(),
            notes.iter().any(|n| n.has_thinking())
        );

        Ok(notes)
    }

    /// Read loop: the only writer of the session
    async fn read_stream(
        &self,
        prompt: &str,
        run: &mut StreamRun,
        callbacks: &mut dyn GenerationCallbacks,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), GenerationError> {
        let timeout = self.config.timeout();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let request = ChatRequest::for_note(&self.model, prompt, &self.config);
        let bytes = tokio::select! {
            biased;
            _ = wait_for_cancel(cancel) => return Err(GenerationError::Cancelled),
            _ = &mut deadline => return Err(GenerationError::TimedOut(timeout)),
            opened = self.transport.open_stream(request) => opened?,
        };

        let mut events = Box::pin(decode_events(bytes));
        let mut received = 0usize;

        let result = loop {
            tokio::select! {
                biased;
                _ = wait_for_cancel(cancel) => break Err(GenerationError::Cancelled),
                _ = &mut deadline => break Err(GenerationError::TimedOut(timeout)),
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        received += 1;
                        run.apply(&event, callbacks);
                    }
                    Some(Err(e)) => break Err(GenerationError::from(e)),
                    None => break Ok(()),
                },
            }
        };

        drop(events);
        log::debug!(
            "[NoteGenerator] Released response stream after {} events",
            received
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::llm::ByteStream;
    use crate::ai::notes::{ANSWER_SEPARATOR, THINKING_BANNER};
    use async_trait::async_trait;
    use futures_util::stream;

    const NOTE_LIST: &str =
        r#"[{"title":"One","content":"first"},{"title":"Two","content":"second"}]"#;

    /// Replays a fixed body, optionally hanging afterwards instead of ending
    struct ScriptedTransport {
        chunks: Vec<Vec<u8>>,
        hang: bool,
    }

    impl ScriptedTransport {
        fn boxed(chunks: &[&str], hang: bool) -> Box<dyn CompletionTransport> {
            Box::new(Self {
                chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
                hang,
            })
        }
    }

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        async fn open_stream(&self, _request: ChatRequest) -> Result<ByteStream, LlmError> {
            let items = stream::iter(self.chunks.clone().into_iter().map(Ok));
            if self.hang {
                Ok(Box::pin(items.chain(stream::pending())))
            } else {
                Ok(Box::pin(items))
            }
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl CompletionTransport for FailingTransport {
        async fn open_stream(&self, _request: ChatRequest) -> Result<ByteStream, LlmError> {
            Err(LlmError::ApiError {
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        started: Vec<usize>,
        chunks: Vec<(usize, String, String)>,
        completed: Vec<(usize, StickyNoteData)>,
        all_complete: usize,
        errors: Vec<String>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl GenerationCallbacks for Recorder {
        fn on_note_start(&mut self, index: usize, _title_placeholder: &str) {
            self.started.push(index);
        }

        fn on_content_chunk(&mut self, index: usize, delta: &str, cumulative: &str) {
            self.chunks
                .push((index, delta.to_string(), cumulative.to_string()));
            if let Some((limit, ref token)) = self.cancel_after {
                if self.chunks.len() == limit {
                    token.cancel();
                }
            }
        }

        fn on_note_complete(&mut self, index: usize, note: &StickyNoteData) {
            self.completed.push((index, note.clone()));
        }

        fn on_all_complete(&mut self, _notes: &[StickyNoteData]) {
            self.all_complete += 1;
        }

        fn on_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    fn content_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    fn reasoning_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"reasoning_content": text, "content": null}}]})
        )
    }

    fn generator(chunks: &[&str], hang: bool, config: GenerationConfig) -> NoteGenerator {
        NoteGenerator::new(ScriptedTransport::boxed(chunks, hang), "test-model", config)
    }

    fn display_config() -> GenerationConfig {
        GenerationConfig {
            display_thinking_mode: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reasoning_stream_produces_thinking_note() {
        let r1 = reasoning_line("Step one.\n\n");
        let r2 = reasoning_line("Step two?");
        let c1 = content_line("Hello");
        let c2 = content_line(" world.");
        let body = [r1.as_str(), r2.as_str(), c1.as_str(), c2.as_str(), "data: [DONE]\n\n"];

        let mut recorder = Recorder::default();
        let notes = generator(&body, false, display_config())
            .generate("greet me", &mut recorder, None)
            .await
            .unwrap();

        assert_eq!(notes.len(), 1);
        let note = &notes[0];
        let chain = note.thinking_chain.as_ref().unwrap();
        assert_eq!(note.content, "Hello world.");
        assert_eq!(chain.final_answer, note.content);
        assert_eq!(chain.steps.len(), 2);
        assert_eq!(chain.steps[1].step_type, crate::models::StepType::Question);
        assert!(note.has_thinking());

        assert_eq!(recorder.started, vec![0]);
        assert_eq!(recorder.chunks.len(), 4);
        assert!(recorder.chunks[0].1.starts_with(THINKING_BANNER));
        assert!(recorder.chunks[2].1.starts_with(ANSWER_SEPARATOR));
        assert_eq!(recorder.completed.len(), 1);
        assert_eq!(recorder.all_complete, 1);
        assert!(recorder.errors.is_empty());
    }

    #[tokio::test]
    async fn test_hidden_reasoning_never_leaks() {
        let r1 = reasoning_line("secret plan");
        let c1 = content_line("Public answer.");
        let body = [r1.as_str(), c1.as_str(), "data: [DONE]\n"];

        let mut recorder = Recorder::default();
        let notes = generator(&body, false, GenerationConfig::default())
            .generate("p", &mut recorder, None)
            .await
            .unwrap();

        assert!(notes[0].thinking_chain.is_none());
        assert_eq!(notes[0].content, "Public answer.");
        assert!(recorder.chunks.iter().all(|(_, delta, _)| !delta.contains("secret")));
    }

    #[tokio::test]
    async fn test_plain_stream_split_across_chunks() {
        let line = content_line("Just a plain answer, no tags.");
        let (head, tail) = line.split_at(17);
        let body = [head, tail, "data: [DONE]\n"];

        let mut recorder = Recorder::default();
        let notes = generator(&body, false, display_config())
            .generate("p", &mut recorder, None)
            .await
            .unwrap();

        assert_eq!(notes[0].content, "Just a plain answer, no tags.");
        assert!(!notes[0].has_thinking());
        assert_eq!(recorder.chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_done_before_any_delta_yields_empty_note() {
        let mut recorder = Recorder::default();
        let notes = generator(&["data: [DONE]\n\n"], false, display_config())
            .generate("p", &mut recorder, None)
            .await
            .unwrap();

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "");
        assert_eq!(notes[0].title, crate::ai::notes::UNTITLED);
        assert_eq!(recorder.started, vec![0]);
        assert_eq!(recorder.all_complete, 1);
    }

    #[tokio::test]
    async fn test_cancellation_mid_stream() {
        let a = content_line("a");
        let b = content_line("b");
        let c = content_line("c");
        let body = [a.as_str(), b.as_str(), c.as_str()];

        let token = CancellationToken::new();
        let mut recorder = Recorder {
            cancel_after: Some((3, token.clone())),
            ..Default::default()
        };

        let failure = generator(&body, true, display_config())
            .generate("p", &mut recorder, Some(&token))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, GenerationError::Cancelled));
        assert!(failure.error.is_cancellation());
        assert_eq!(recorder.errors.len(), 1);
        assert_eq!(recorder.all_complete, 0);
        assert_eq!(recorder.chunks.len(), 3);
        assert_eq!(failure.fallback_note.unwrap().content, "abc");
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());

        let mut recorder = Recorder::default();
        let failure = generator(&["data: [DONE]\n"], false, GenerationConfig::default())
            .generate("p", &mut recorder, Some(&token))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, GenerationError::Cancelled));
        assert!(failure.fallback_note.is_none());
        assert_eq!(recorder.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_triggers_cancellation_path() {
        let first = content_line("partial");
        let config = GenerationConfig {
            timeout_ms: 50,
            ..Default::default()
        };

        let mut recorder = Recorder::default();
        let failure = generator(&[first.as_str()], true, config)
            .generate("p", &mut recorder, None)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, GenerationError::TimedOut(_)));
        assert!(failure.error.is_cancellation());
        assert_eq!(failure.fallback_note.unwrap().content, "partial");
        assert_eq!(recorder.errors.len(), 1);
        assert_eq!(recorder.all_complete, 0);
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let generator =
            NoteGenerator::new(Box::new(FailingTransport), "m", GenerationConfig::default());
        let mut recorder = Recorder::default();
        let failure = generator
            .generate("p", &mut recorder, None)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            GenerationError::Transport(LlmError::ApiError { status: 503, .. })
        ));
        assert!(!failure.error.is_cancellation());
        assert!(failure.fallback_note.is_none());
        assert_eq!(recorder.errors, vec!["LLM error: API error: 503 - unavailable".to_string()]);
    }

    #[tokio::test]
    async fn test_in_stream_error_keeps_partial_note() {
        let first = content_line("Half an ");
        let body = [first.as_str(), "data: {\"error\":{\"message\":\"overloaded\"}}\n"];

        let mut recorder = Recorder::default();
        let failure = generator(&body, false, GenerationConfig::default())
            .generate("p", &mut recorder, None)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            GenerationError::Transport(LlmError::StreamError(_))
        ));
        assert_eq!(failure.fallback_note.unwrap().content, "Half an");
        assert_eq!(recorder.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_structured_response_yields_several_notes() {
        let line = content_line(NOTE_LIST);
        let body = [line.as_str(), "data: [DONE]\n"];

        let mut recorder = Recorder::default();
        let notes = generator(&body, false, GenerationConfig::default())
            .generate("p", &mut recorder, None)
            .await
            .unwrap();

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].title, "Two");
        assert_eq!(recorder.started, vec![0, 1]);
        assert_eq!(recorder.completed.len(), 2);
    }

    #[tokio::test]
    async fn test_identical_streams_replay_identically() {
        let r1 = reasoning_line("think");
        let c1 = content_line("Answer");
        let body = [r1.as_str(), c1.as_str(), "data: [DONE]\n"];

        let mut first = Recorder::default();
        let mut second = Recorder::default();
        generator(&body, false, display_config())
            .generate("p", &mut first, None)
            .await
            .unwrap();
        generator(&body, false, display_config())
            .generate("p", &mut second, None)
            .await
            .unwrap();

        assert_eq!(first.chunks, second.chunks);
        assert_eq!(first.completed[0].1.content, second.completed[0].1.content);
    }

    #[tokio::test]
    async fn test_channel_callbacks_forward_events() {
        let c1 = content_line("Hi");
        let body = [c1.as_str(), "data: [DONE]\n"];

        let (mut callbacks, mut rx) = ChannelCallbacks::new();
        generator(&body, false, GenerationConfig::default())
            .generate("p", &mut callbacks, None)
            .await
            .unwrap();
        drop(callbacks);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], NoteStreamEvent::NoteStart { index: 0, .. }));
        assert!(matches!(events[3], NoteStreamEvent::AllComplete { .. }));
        let json = serde_json::to_string(&events[1]).unwrap();
        assert!(json.contains("\"type\":\"chunk\""));
    }

    #[test]
    fn test_from_provider_requires_model() {
        let provider = ProviderConfig {
            id: "openai".to_string(),
            provider_type: crate::ai::config::ProviderType::OpenAI,
            api_key: Some("key".to_string()),
            ..Default::default()
        };

        match NoteGenerator::from_provider(&provider, GenerationConfig::default()) {
            Err(LlmError::NotConfigured(_)) => (),
            Err(other) => panic!("Expected NotConfigured error, got: {:?}", other),
            Ok(_) => panic!("Expected error, got Ok"),
        }
    }

    #[tokio::test]
    async fn test_reasoning_quoting_close_marker_never_leaks() {
        let r1 = reasoning_line("The user wants the </thinking> tag explained. SECRET plan.");
        let c1 = content_line("Answer.");
        let body = [r1.as_str(), c1.as_str(), "data: [DONE]\n"];

        let mut recorder = Recorder::default();
        let notes = generator(&body, false, GenerationConfig::default())
            .generate("p", &mut recorder, None)
            .await
            .unwrap();

        assert_eq!(notes[0].content, "Answer.");
        assert!(!notes[0].title.contains("SECRET"));
    }

    #[tokio::test]
    async fn test_timeout_mid_reasoning_keeps_reasoning_out_of_fallback() {
        let r1 = reasoning_line("SECRET unfinished thought");
        let config = GenerationConfig {
            timeout_ms: 50,
            ..Default::default()
        };

        let mut recorder = Recorder::default();
        let failure = generator(&[r1.as_str()], true, config)
            .generate("p", &mut recorder, None)
            .await
            .unwrap_err();

        let note = failure.fallback_note.unwrap();
        assert_eq!(note.content, "");
        assert!(note.thinking_chain.is_none());

        let config = GenerationConfig {
            timeout_ms: 50,
            display_thinking_mode: true,
            ..Default::default()
        };
        let failure = generator(&[r1.as_str()], true, config)
            .generate("p", &mut Recorder::default(), None)
            .await
            .unwrap_err();
        let chain = failure.fallback_note.unwrap().thinking_chain.unwrap();
        assert_eq!(chain.steps[0].content, "SECRET unfinished thought");
    }

    #[tokio::test]
    async fn test_fallback_from_structured_response_keeps_first_note() {
        let line = content_line(NOTE_LIST);
        let body = [line.as_str(), "data: {\"error\":{\"message\":\"overloaded\"}}\n"];

        let mut recorder = Recorder::default();
        let failure = generator(&body, false, GenerationConfig::default())
            .generate("p", &mut recorder, None)
            .await
            .unwrap_err();

        let note = failure.fallback_note.unwrap();
        assert_eq!(note.title, "One");
        assert_eq!(note.content, "first");
        assert_eq!(recorder.errors.len(), 1);
    }
}
