//! Producer side of the frame ring buffer

use std::sync::Arc;

use crate::buffer::frame_buffer::{FrameSegmentMut, SharedFrameBuffer};
use crate::error::BufferError;

/// Sole writer of a [`SharedFrameBuffer`]
///
/// Keeps its own position modulo capacity and publishes whole runs of
/// frames through the usage counter after each `write`.
pub struct FrameBufferWriter {
    buffer: Arc<SharedFrameBuffer>,
    index: usize,
}

impl FrameBufferWriter {
    pub(crate) fn new(buffer: Arc<SharedFrameBuffer>) -> Result<Self, BufferError> {
        buffer.attach_writer()?;
        let index = (buffer.total_write_frames() % buffer.frame_count() as u64) as usize;
        Ok(Self { buffer, index })
    }

    /// Frames that can be written before the buffer is full
    #[inline]
    pub fn available_frames(&self) -> usize {
        self.buffer.frame_count() - self.buffer.usage()
    }

    /// Total frames written since the buffer was created
    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.buffer.total_write_frames()
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.buffer.channel_count()
    }

    /// Capacity of the underlying buffer in frames
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.buffer.frame_count()
    }

    /// Fill the writable segments through `process`.
    ///
    /// `process` receives each segment and the number of frames already
    /// written during this call, and returns how many frames it wrote.
    /// Returning fewer than offered ends the call early. Returns the total
    /// frames written.
    pub fn write<F>(&mut self, mut process: F) -> Result<usize, BufferError>
    where
        F: FnMut(FrameSegmentMut<'_>, usize) -> usize,
    {
        let buffer = &self.buffer;
        let channels = buffer.channel_count();
        let available = self.available_frames();
        let progress = buffer.enum_frame_segments(self.index, available, |index, frames, offset| {
            // SAFETY: these frames lie outside `usage`, so the reader will not
            // touch them until `commit_write` publishes them.
            let samples = unsafe { buffer.frames_mut(index, frames) };
            process(FrameSegmentMut::new(samples, channels), offset)
        })?;
        self.index = progress.next_index;
        buffer.commit_write(progress.total_processed_frames);
        Ok(progress.total_processed_frames)
    }

    /// Copy as many whole frames of interleaved `samples` as fit.
    /// Returns the number of frames written.
    pub fn write_interleaved(&mut self, samples: &[f32]) -> Result<usize, BufferError> {
        let channels = self.channel_count();
        if samples.len() % channels != 0 {
            return Err(BufferError::MisalignedSamples {
                samples: samples.len(),
                channels,
            });
        }
        let frames = samples.len() / channels;
        self.write(|mut segment, offset| {
            let count = segment.frames().min(frames - offset);
            let source = &samples[offset * channels..(offset + count) * channels];
            segment.samples_mut()[..source.len()].copy_from_slice(source);
            count
        })
    }

    #[cfg(test)]
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Debug for FrameBufferWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBufferWriter")
            .field("index", &self.index)
            .field("buffer", &self.buffer)
            .finish()
    }
}
