//! AI module for note generation
//!
//! Provider configuration, the streaming completion client, and the
//! pipeline that turns a streamed response into sticky notes.

pub mod config;
pub mod generator;
pub mod llm;
pub mod notes;

pub use config::{GenerationConfig, ProviderConfig, ProviderType};
pub use generator::{
    CancellationToken, ChannelCallbacks, GenerationCallbacks, GenerationError, GenerationFailure,
    NoteGenerator, NoteStreamEvent, NoopCallbacks, TITLE_PLACEHOLDER,
};
