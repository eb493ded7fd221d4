//! Render-side stream processor
//!
//! Runs inside the host's real-time callback. Each quantum it drains what
//! the writer has published into the output block, keeps a running
//! underrun tally and decides when to stop.

use crate::buffer::{FrameBufferReader, OutputBlock};
use crate::host::RenderCallback;
use crate::stream::message::{MessageToNode, MessageToProcessor, ProcessorPort};

/// Consumer half of a stream, attached to a [`RenderHost`](crate::host::RenderHost)
pub struct OutputStreamProcessor {
    /// Sole consumer of the ring buffer
    reader: FrameBufferReader,
    /// Render end of the control channel
    port: ProcessorPort,
    /// Stop at the end of the current quantum
    should_stop: bool,
    /// Total read count at which to stop, from `Stop { frames }`
    stop_frames: Option<u64>,
    /// Shortfall since the last fully rendered quantum
    underrun_frames: u32,
}

impl OutputStreamProcessor {
    pub fn new(reader: FrameBufferReader, port: ProcessorPort) -> Self {
        Self {
            reader,
            port,
            should_stop: false,
            stop_frames: None,
            underrun_frames: 0,
        }
    }

    /// Underrun frames accumulated and not yet reported
    pub fn pending_underrun(&self) -> u32 {
        self.underrun_frames
    }

    fn handle_messages(&mut self) {
        while let Ok(message) = self.port.try_recv() {
            match message {
                MessageToProcessor::Stop { frames: 0 } => self.should_stop = true,
                MessageToProcessor::Stop { frames } => self.stop_frames = Some(frames),
            }
        }
    }

    /// Accumulate a shortfall, or report the accumulated one once a
    /// quantum renders in full
    fn update_underrun(&mut self, frames: u32) {
        if frames != 0 {
            self.underrun_frames = self.underrun_frames.saturating_add(frames);
            return;
        }
        if self.underrun_frames == 0 {
            return;
        }
        self.port.post(MessageToNode::Underrun {
            frames: self.underrun_frames,
        });
        self.underrun_frames = 0;
    }

    /// Frames this quantum may consume without passing a pending stop target
    fn frame_limit(&self, block_frames: usize) -> usize {
        match self.stop_frames {
            Some(target) => {
                let remaining = target.saturating_sub(self.reader.total_frames());
                remaining.min(block_frames as u64) as usize
            }
            None => block_frames,
        }
    }
}

impl RenderCallback for OutputStreamProcessor {
    fn process(&mut self, output: &mut OutputBlock) -> bool {
        self.handle_messages();

        let block_frames = output.frames();
        let limit = self.frame_limit(block_frames);
        let read = self
            .reader
            .read(|segment, offset| {
                let frames = segment.frames().min(limit - offset);
                segment.deinterleave_into(frames, output, offset);
                frames
            })
            .unwrap_or(0);
        output.silence_from(read);

        let total_frames = self.reader.total_frames();
        if matches!(self.stop_frames, Some(target) if total_frames >= target) {
            self.should_stop = true;
        }
        if self.should_stop {
            self.update_underrun(0);
            self.port.post(MessageToNode::Stop {
                frames: total_frames,
            });
            return false;
        }

        // Nothing has been played yet; an empty buffer is not an underrun
        if total_frames != 0 {
            self.update_underrun((block_frames - read) as u32);
        }
        true
    }
}
