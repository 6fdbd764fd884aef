//! Note reconstruction from streamed completions
//!
//! - `session`: live accumulation of reasoning and answer deltas
//! - `parser`: post-stream split of the raw response
//! - `segmenter`: reasoning blob to classified steps
//! - `synthesizer`: final note with generated title

pub mod parser;
pub mod segmenter;
pub mod session;
pub mod synthesizer;

pub use parser::{
    finalize, finalize_as, finalize_extracted, DraftNote, Extraction, FinalizedResponse,
    ResponseVariant, TagConvention,
};
pub use segmenter::{classify, segment};
pub use session::{
    replay, DisplayChunk, GenerationSession, Phase, ANSWER_SEPARATOR, THINKING_BANNER,
};
pub use synthesizer::{generate_title, strip_markdown, synthesize, synthesize_titled, UNTITLED};
