//! Error types for the output streaming library

use thiserror::Error;

use crate::stream::StreamState;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ring buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A segment callback reported more frames than it was offered.
    /// The enumeration is aborted and no counter is touched.
    #[error("Processed frames ({processed}) exceeds segment frames ({offered})")]
    SegmentOverrun { processed: usize, offered: usize },

    #[error(
        "Segment walk of {available_frames} frames from {start_index} exceeds {frame_count} frames"
    )]
    SegmentRange {
        start_index: usize,
        available_frames: usize,
        frame_count: usize,
    },

    #[error("Sample count {samples} is not a multiple of the channel count {channels}")]
    MisalignedSamples { samples: usize, channels: usize },

    #[error("Invalid buffer layout: {0}")]
    InvalidLayout(String),

    #[error("The {0} side of the frame buffer is already attached")]
    SideAlreadyAttached(&'static str),
}

/// Stream lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Invalid parameter: {0}")]
    Validation(String),

    #[error("Cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: StreamState,
    },

    #[error("Initialization failed: {0}")]
    Initialization(String),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
