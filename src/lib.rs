//! Streaming sticky-note generation from OpenAI-compatible chat completions.
//!
//! A `NoteGenerator` streams one completion, forwards displayable text as it
//! arrives, and reconstructs the finished note, including a structured
//! thinking chain when the model exposes its reasoning.

pub mod ai;
pub mod models;

pub use ai::{
    CancellationToken, GenerationCallbacks, GenerationConfig, GenerationError, GenerationFailure,
    NoteGenerator, ProviderConfig, ProviderType,
};
pub use models::{StepType, StickyNoteData, ThinkingChain, ThinkingStep};

/// Initialize the logger: debug for this crate, warn for everything else.
/// `RUST_LOG` overrides the default. Later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("notestream=debug,warn"),
    )
    .format_timestamp_secs()
    .try_init();
}
