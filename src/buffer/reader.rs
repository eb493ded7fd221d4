//! Consumer side of the frame ring buffer

use std::sync::Arc;

use crate::buffer::frame_buffer::{FrameSegment, SharedFrameBuffer};
use crate::error::BufferError;

/// Sole reader of a [`SharedFrameBuffer`]
///
/// Never waits: a read returns whatever is buffered, possibly nothing.
pub struct FrameBufferReader {
    buffer: Arc<SharedFrameBuffer>,
    index: usize,
}

impl FrameBufferReader {
    pub(crate) fn new(buffer: Arc<SharedFrameBuffer>) -> Result<Self, BufferError> {
        buffer.attach_reader()?;
        let index = (buffer.total_read_frames() % buffer.frame_count() as u64) as usize;
        Ok(Self { buffer, index })
    }

    /// Frames buffered and ready to read
    #[inline]
    pub fn available_frames(&self) -> usize {
        self.buffer.usage()
    }

    /// Total frames read since the buffer was created
    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.buffer.total_read_frames()
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.buffer.channel_count()
    }

    /// Drain the readable segments through `process`.
    ///
    /// `process` receives each segment and the number of frames already
    /// read during this call, and returns how many frames it consumed.
    /// Returning fewer than offered ends the call early. Returns the total
    /// frames consumed.
    pub fn read<F>(&mut self, mut process: F) -> Result<usize, BufferError>
    where
        F: FnMut(FrameSegment<'_>, usize) -> usize,
    {
        let buffer = &self.buffer;
        let channels = buffer.channel_count();
        let available = self.available_frames();
        let progress = buffer.enum_frame_segments(self.index, available, |index, frames, offset| {
            // SAFETY: these frames are covered by `usage`, so the writer will
            // not touch them until `commit_read` releases them.
            let samples = unsafe { buffer.frames(index, frames) };
            process(FrameSegment::new(samples, channels), offset)
        })?;
        self.index = progress.next_index;
        buffer.commit_read(progress.total_processed_frames);
        Ok(progress.total_processed_frames)
    }

    /// Copy as many whole frames as fit into interleaved `target`.
    /// Returns the number of frames read.
    pub fn read_interleaved(&mut self, target: &mut [f32]) -> Result<usize, BufferError> {
        let channels = self.channel_count();
        let frames = target.len() / channels;
        self.read(|segment, offset| {
            let count = segment.frames().min(frames - offset);
            let source = &segment.samples()[..count * channels];
            target[offset * channels..(offset + count) * channels].copy_from_slice(source);
            count
        })
    }

    #[cfg(test)]
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Debug for FrameBufferReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBufferReader")
            .field("index", &self.index)
            .field("buffer", &self.buffer)
            .finish()
    }
}
