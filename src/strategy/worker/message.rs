//! Handshake messages between a worker strategy and its fill thread

use crate::buffer::FillerFrameBufferConfig;

/// Control side to worker thread
#[derive(Debug)]
pub enum MessageToWorker<P> {
    /// Build the filler from `filler_params`, attach the writer and prime
    /// the buffer
    Init {
        config: FillerFrameBufferConfig,
        filler_params: P,
    },
    /// Begin periodic filling
    Start,
    /// Stop filling and exit
    Stop,
}

/// Worker thread to control side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageToStrategy {
    InitDone,
    InitFailed(String),
    /// The filler finished (or failed, with `stop_frames == 0`)
    Stop { stop_frames: u64 },
}
