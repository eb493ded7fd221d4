//! Shared-memory frame buffer subsystem

pub mod block;
pub mod frame_buffer;
pub mod reader;
pub mod sizing;
pub mod writer;

pub use block::OutputBlock;
pub use frame_buffer::{FrameSegment, FrameSegmentMut, SegmentProgress, SharedFrameBuffer};
pub use reader::FrameBufferReader;
pub use sizing::{frame_buffer_size, round_up_to_block, FillerFrameBufferConfig, FrameBufferConfig};
pub use writer::FrameBufferWriter;
