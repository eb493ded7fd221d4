//! Frame buffer sizing and shared buffer descriptors

use std::sync::Arc;
use std::time::Duration;

use crate::buffer::frame_buffer::SharedFrameBuffer;
use crate::buffer::reader::FrameBufferReader;
use crate::buffer::writer::FrameBufferWriter;
use crate::error::BufferError;

/// Handle to a shared frame buffer, passed to whichever context attaches
/// the writer or the reader
#[derive(Debug, Clone)]
pub struct FrameBufferConfig {
    shared: Arc<SharedFrameBuffer>,
}

impl FrameBufferConfig {
    /// Allocate the sample store and counters
    pub fn new(frame_buffer_size: usize, channel_count: usize) -> Result<Self, BufferError> {
        Ok(Self {
            shared: Arc::new(SharedFrameBuffer::new(frame_buffer_size, channel_count)?),
        })
    }

    /// Attach the producer side. Fails if a writer was already created.
    pub fn create_writer(&self) -> Result<FrameBufferWriter, BufferError> {
        FrameBufferWriter::new(self.shared.clone())
    }

    /// Attach the consumer side. Fails if a reader was already created.
    pub fn create_reader(&self) -> Result<FrameBufferReader, BufferError> {
        FrameBufferReader::new(self.shared.clone())
    }

    pub fn channel_count(&self) -> usize {
        self.shared.channel_count()
    }

    /// Capacity in frames
    pub fn frame_count(&self) -> usize {
        self.shared.frame_count()
    }

    pub fn usage(&self) -> usize {
        self.shared.usage()
    }

    pub fn total_write_frames(&self) -> u64 {
        self.shared.total_write_frames()
    }

    pub fn total_read_frames(&self) -> u64 {
        self.shared.total_read_frames()
    }
}

/// Buffer descriptor for strategies that refill on a timer
#[derive(Debug, Clone)]
pub struct FillerFrameBufferConfig {
    pub buffer: FrameBufferConfig,
    pub sample_rate: u32,
    pub fill_interval_ms: u32,
}

impl FillerFrameBufferConfig {
    /// Size and allocate a buffer holding `chunks` fill intervals of audio
    pub fn new(
        channel_count: usize,
        sample_rate: u32,
        fill_interval_ms: u32,
        chunks: u32,
        block_size: usize,
    ) -> Result<Self, BufferError> {
        let frames = frame_buffer_size(sample_rate, fill_interval_ms, chunks, block_size);
        Ok(Self {
            buffer: FrameBufferConfig::new(frames, channel_count)?,
            sample_rate,
            fill_interval_ms,
        })
    }

    pub fn fill_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.fill_interval_ms))
    }
}

/// Round `frames` up to the next multiple of `block_size`
#[inline]
pub fn round_up_to_block(frames: usize, block_size: usize) -> usize {
    if block_size == 0 {
        return frames;
    }
    frames.div_ceil(block_size) * block_size
}

/// Capacity in frames for `chunks` fill intervals at `sample_rate`, each
/// interval rounded up to whole render blocks
pub fn frame_buffer_size(
    sample_rate: u32,
    fill_interval_ms: u32,
    chunks: u32,
    block_size: usize,
) -> usize {
    let interval_frames = u64::from(sample_rate) * u64::from(fill_interval_ms) / 1000;
    round_up_to_block(interval_frames as usize, block_size) * chunks as usize
}
