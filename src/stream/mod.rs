pub mod decoder;
pub mod framer;
pub mod orchestrator;
pub mod sse;
pub mod translator;

pub use decoder::decode_line;
pub use framer::LineFramer;
pub use orchestrator::{spawn_chunk_stream, StreamOrchestrator, StreamPhase};
pub use translator::{translate, ChunkContext};
