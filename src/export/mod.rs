//! Video export: encoder invocation, timeline assembly, and the
//! interactive fallback document.

pub mod assembler;
pub mod encoder;
pub mod fallback;

pub use assembler::VideoAssembler;
pub use encoder::{FfmpegEncoder, SegmentSpec, StillSpec, VideoEncoder};
pub use fallback::render_fallback_document;
