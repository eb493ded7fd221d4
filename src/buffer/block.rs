//! Planar render output block
//!
//! The host hands the render callback one block per quantum: a fixed number
//! of frames for each output channel, stored channel after channel.

/// Per-channel output storage for one render quantum
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBlock {
    data: Vec<f32>,
    channel_count: usize,
    frames: usize,
}

impl OutputBlock {
    /// Allocate a zeroed block. Hosts do this once, outside the render path.
    pub fn new(channel_count: usize, frames: usize) -> Self {
        Self {
            data: vec![0.0; channel_count * frames],
            channel_count,
            frames,
        }
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Frames per channel
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.frames;
        &self.data[start..start + self.frames]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        let start = channel * self.frames;
        &mut self.data[start..start + self.frames]
    }

    /// Zero every channel from frame `from` to the end of the block
    pub fn silence_from(&mut self, from: usize) {
        if from >= self.frames {
            return;
        }
        for channel in 0..self.channel_count {
            self.channel_mut(channel)[from..].fill(0.0);
        }
    }

    /// Write the block into an interleaved slice, one frame at a time.
    /// Returns the number of frames written.
    pub fn interleave_into(&self, from: usize, target: &mut [f32]) -> usize {
        if self.channel_count == 0 || from >= self.frames {
            return 0;
        }
        let frames = (self.frames - from).min(target.len() / self.channel_count);
        for (i, frame) in target
            .chunks_exact_mut(self.channel_count)
            .take(frames)
            .enumerate()
        {
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = self.data[channel * self.frames + from + i];
            }
        }
        frames
    }

    /// Peak absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.data.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}
