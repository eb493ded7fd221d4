//! Shared lock-free frame ring buffer
//!
//! One interleaved `f32` sample store plus three atomic counters, shared by
//! exactly one writer and one reader. Neither side locks or allocates; the
//! usage counter is the only synchronization point between them.

use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::buffer::block::OutputBlock;
use crate::error::BufferError;

/// Result of a segment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentProgress {
    /// Frames processed across all segments
    pub total_processed_frames: usize,
    /// Index to start the next enumeration from
    pub next_index: usize,
}

/// Fixed-capacity interleaved sample store with usage and cursor counters
pub struct SharedFrameBuffer {
    samples: Box<[UnsafeCell<f32>]>,
    channel_count: usize,
    frame_count: usize,
    /// Frames written and not yet read
    usage: CachePadded<AtomicU32>,
    /// Total frames ever written
    write_cursor: CachePadded<AtomicU64>,
    /// Total frames ever read
    read_cursor: CachePadded<AtomicU64>,
    writer_attached: AtomicBool,
    reader_attached: AtomicBool,
}

// SAFETY: sample cells are only touched through FrameBufferWriter and
// FrameBufferReader, at most one of each exists per buffer, and the ranges
// they access never overlap: the writer only touches free frames and the
// reader only frames published through `usage` with Release/Acquire.
unsafe impl Send for SharedFrameBuffer {}
unsafe impl Sync for SharedFrameBuffer {}

impl SharedFrameBuffer {
    /// Create a zeroed buffer holding `frame_count` frames of `channel_count` samples
    pub fn new(frame_count: usize, channel_count: usize) -> Result<Self, BufferError> {
        if frame_count == 0 || channel_count == 0 {
            return Err(BufferError::InvalidLayout(format!(
                "{} frames x {} channels",
                frame_count, channel_count
            )));
        }
        if u32::try_from(frame_count).is_err() {
            return Err(BufferError::InvalidLayout(format!(
                "{} frames exceeds the usage counter range",
                frame_count
            )));
        }
        let len = frame_count
            .checked_mul(channel_count)
            .ok_or_else(|| BufferError::InvalidLayout("sample count overflows".to_string()))?;

        let samples: Box<[UnsafeCell<f32>]> = (0..len)
            .map(|_| UnsafeCell::new(0.0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            samples,
            channel_count,
            frame_count,
            usage: CachePadded::new(AtomicU32::new(0)),
            write_cursor: CachePadded::new(AtomicU64::new(0)),
            read_cursor: CachePadded::new(AtomicU64::new(0)),
            writer_attached: AtomicBool::new(false),
            reader_attached: AtomicBool::new(false),
        })
    }

    /// Capacity in frames
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Samples per frame
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Frames currently buffered and unread
    #[inline]
    pub fn usage(&self) -> usize {
        self.usage.load(Ordering::Acquire) as usize
    }

    /// Total frames ever written
    #[inline]
    pub fn total_write_frames(&self) -> u64 {
        self.write_cursor.load(Ordering::Acquire)
    }

    /// Total frames ever read
    #[inline]
    pub fn total_read_frames(&self) -> u64 {
        self.read_cursor.load(Ordering::Acquire)
    }

    /// Walk the contiguous ranges starting at `start_index`, at most two of
    /// them (split at the wraparound), calling `process(index, frames, offset)`
    /// for each. `offset` is the number of frames already processed in this
    /// call. A short return stops the walk; an overlong one is an error and
    /// nothing is committed. `start_index` must lie inside the buffer and
    /// `available_frames` must not exceed its capacity.
    pub fn enum_frame_segments<F>(
        &self,
        start_index: usize,
        available_frames: usize,
        mut process: F,
    ) -> Result<SegmentProgress, BufferError>
    where
        F: FnMut(usize, usize, usize) -> usize,
    {
        if start_index >= self.frame_count || available_frames > self.frame_count {
            return Err(BufferError::SegmentRange {
                start_index,
                available_frames,
                frame_count: self.frame_count,
            });
        }
        let mut index = start_index;
        let mut total_processed_frames = 0;
        while total_processed_frames < available_frames {
            let segment_frames =
                (self.frame_count - index).min(available_frames - total_processed_frames);
            let processed = process(index, segment_frames, total_processed_frames);
            if processed > segment_frames {
                return Err(BufferError::SegmentOverrun {
                    processed,
                    offered: segment_frames,
                });
            }
            total_processed_frames += processed;
            index = (index + processed) % self.frame_count;
            if processed < segment_frames {
                break;
            }
        }
        Ok(SegmentProgress {
            total_processed_frames,
            next_index: index,
        })
    }

    /// Shared view of `frames` frames starting at frame `index`.
    ///
    /// # Safety
    /// The range must be published (covered by `usage`) and owned by the
    /// single reader for the lifetime of the slice.
    #[inline]
    pub(crate) unsafe fn frames(&self, index: usize, frames: usize) -> &[f32] {
        debug_assert!(index + frames <= self.frame_count);
        let start = index * self.channel_count;
        let ptr = UnsafeCell::raw_get(self.samples.as_ptr().add(start));
        std::slice::from_raw_parts(ptr, frames * self.channel_count)
    }

    /// Exclusive view of `frames` frames starting at frame `index`.
    ///
    /// # Safety
    /// The range must be free (not covered by `usage`) and owned by the
    /// single writer for the lifetime of the slice.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn frames_mut(&self, index: usize, frames: usize) -> &mut [f32] {
        debug_assert!(index + frames <= self.frame_count);
        let start = index * self.channel_count;
        let ptr = UnsafeCell::raw_get(self.samples.as_ptr().add(start));
        std::slice::from_raw_parts_mut(ptr, frames * self.channel_count)
    }

    /// Publish frames written by the writer. The cursor moves before usage so
    /// the reader can never observe `read_cursor > write_cursor`.
    #[inline]
    pub(crate) fn commit_write(&self, frames: usize) {
        if frames == 0 {
            return;
        }
        self.write_cursor.fetch_add(frames as u64, Ordering::Release);
        self.usage.fetch_add(frames as u32, Ordering::Release);
    }

    /// Release frames consumed by the reader
    #[inline]
    pub(crate) fn commit_read(&self, frames: usize) {
        if frames == 0 {
            return;
        }
        self.usage.fetch_sub(frames as u32, Ordering::AcqRel);
        self.read_cursor.fetch_add(frames as u64, Ordering::Release);
    }

    pub(crate) fn attach_writer(&self) -> Result<(), BufferError> {
        if self.writer_attached.swap(true, Ordering::AcqRel) {
            return Err(BufferError::SideAlreadyAttached("writer"));
        }
        Ok(())
    }

    pub(crate) fn attach_reader(&self) -> Result<(), BufferError> {
        if self.reader_attached.swap(true, Ordering::AcqRel) {
            return Err(BufferError::SideAlreadyAttached("reader"));
        }
        Ok(())
    }
}

impl fmt::Debug for SharedFrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFrameBuffer")
            .field("frame_count", &self.frame_count)
            .field("channel_count", &self.channel_count)
            .field("usage", &self.usage())
            .field("total_write_frames", &self.total_write_frames())
            .field("total_read_frames", &self.total_read_frames())
            .finish()
    }
}

/// Writable run of whole frames handed to a writer callback
pub struct FrameSegmentMut<'a> {
    samples: &'a mut [f32],
    channel_count: usize,
}

impl<'a> FrameSegmentMut<'a> {
    pub(crate) fn new(samples: &'a mut [f32], channel_count: usize) -> Self {
        Self {
            samples,
            channel_count,
        }
    }

    /// Frames in this segment
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channel_count
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Raw interleaved samples
    pub fn samples_mut(&mut self) -> &mut [f32] {
        self.samples
    }

    /// Iterate frame by frame, each item holding one sample per channel
    pub fn frames_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        self.samples.chunks_exact_mut(self.channel_count)
    }

    /// Copy interleaved `source` samples in at `frame_index`.
    /// Returns the number of frames copied.
    pub fn set_frames(&mut self, frame_index: usize, source: &[f32]) -> Result<usize, BufferError> {
        if source.len() % self.channel_count != 0 {
            return Err(BufferError::MisalignedSamples {
                samples: source.len(),
                channels: self.channel_count,
            });
        }
        let frames = source.len() / self.channel_count;
        let available = self.frames().saturating_sub(frame_index);
        if frames > available {
            return Err(BufferError::SegmentOverrun {
                processed: frames,
                offered: available,
            });
        }
        let start = frame_index * self.channel_count;
        self.samples[start..start + source.len()].copy_from_slice(source);
        Ok(frames)
    }
}

/// Readable run of whole frames handed to a reader callback
pub struct FrameSegment<'a> {
    samples: &'a [f32],
    channel_count: usize,
}

impl<'a> FrameSegment<'a> {
    pub(crate) fn new(samples: &'a [f32], channel_count: usize) -> Self {
        Self {
            samples,
            channel_count,
        }
    }

    /// Frames in this segment
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channel_count
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Raw interleaved samples
    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    /// Split the first `frames` frames into the per-channel blocks of
    /// `output`, starting at `output_offset` frames into each block.
    pub fn deinterleave_into(&self, frames: usize, output: &mut OutputBlock, output_offset: usize) {
        let frames = frames
            .min(self.frames())
            .min(output.frames().saturating_sub(output_offset));
        let channels = self.channel_count.min(output.channel_count());
        for channel in 0..channels {
            let target = &mut output.channel_mut(channel)[output_offset..output_offset + frames];
            for (i, sample) in target.iter_mut().enumerate() {
                *sample = self.samples[i * self.channel_count + channel];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_zero_available_never_calls_back() {
        let buffer = SharedFrameBuffer::new(16, 2).unwrap();
        let mut calls = 0;
        let progress = buffer
            .enum_frame_segments(5, 0, |_, frames, _| {
                calls += 1;
                frames
            })
            .unwrap();

        assert_eq!(calls, 0);
        assert_eq!(progress.total_processed_frames, 0);
        assert_eq!(progress.next_index, 5);
    }

    #[test]
    fn test_enum_splits_at_wraparound() {
        let buffer = SharedFrameBuffer::new(16, 1).unwrap();
        let mut seen = Vec::new();
        let progress = buffer
            .enum_frame_segments(12, 10, |index, frames, offset| {
                seen.push((index, frames, offset));
                frames
            })
            .unwrap();

        assert_eq!(seen, vec![(12, 4, 0), (0, 6, 4)]);
        assert_eq!(progress.total_processed_frames, 10);
        assert_eq!(progress.next_index, 6);
    }

    #[test]
    fn test_enum_short_return_stops() {
        let buffer = SharedFrameBuffer::new(16, 1).unwrap();
        let mut calls = 0;
        let progress = buffer
            .enum_frame_segments(12, 10, |_, _, _| {
                calls += 1;
                2
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(progress.total_processed_frames, 2);
        assert_eq!(progress.next_index, 14);
    }

    #[test]
    fn test_enum_overrun_is_error() {
        let buffer = SharedFrameBuffer::new(16, 1).unwrap();
        let result = buffer.enum_frame_segments(0, 4, |_, frames, _| frames + 1);

        assert_eq!(
            result,
            Err(BufferError::SegmentOverrun {
                processed: 5,
                offered: 4
            })
        );
    }

    #[test]
    fn test_enum_rejects_out_of_range_walk() {
        let buffer = SharedFrameBuffer::new(16, 1).unwrap();
        let mut calls = 0;

        let past_end = buffer.enum_frame_segments(16, 1, |_, frames, _| {
            calls += 1;
            frames
        });
        assert_eq!(
            past_end,
            Err(BufferError::SegmentRange {
                start_index: 16,
                available_frames: 1,
                frame_count: 16
            })
        );

        let too_many = buffer.enum_frame_segments(0, 17, |_, frames, _| {
            calls += 1;
            frames
        });
        assert!(matches!(too_many, Err(BufferError::SegmentRange { .. })));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_invalid_layout() {
        assert!(SharedFrameBuffer::new(0, 2).is_err());
        assert!(SharedFrameBuffer::new(16, 0).is_err());
    }

    #[test]
    fn test_set_frames_requires_whole_frames() {
        let mut storage = vec![0.0f32; 8];
        let mut segment = FrameSegmentMut::new(&mut storage, 2);

        assert_eq!(
            segment.set_frames(0, &[1.0, 2.0, 3.0]),
            Err(BufferError::MisalignedSamples {
                samples: 3,
                channels: 2
            })
        );
        assert_eq!(segment.set_frames(1, &[1.0, 2.0, 3.0, 4.0]), Ok(2));
        assert_eq!(storage, vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_set_frames_past_end() {
        let mut storage = vec![0.0f32; 4];
        let mut segment = FrameSegmentMut::new(&mut storage, 2);

        assert!(matches!(
            segment.set_frames(1, &[1.0, 2.0, 3.0, 4.0]),
            Err(BufferError::SegmentOverrun { .. })
        ));
    }

    #[test]
    fn test_deinterleave_into() {
        let samples = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let segment = FrameSegment::new(&samples, 2);
        let mut output = OutputBlock::new(2, 4);

        segment.deinterleave_into(3, &mut output, 1);

        assert_eq!(output.channel(0), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(output.channel(1), &[0.0, -1.0, -2.0, -3.0]);
    }
}
