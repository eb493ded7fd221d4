//! Events published to the application

/// Observable stream event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// Rendering ended; `frame` is the total number of frames played
    Stopped { frame: u64 },
    /// An underrun has resolved, or the stream stopped during one.
    /// `frames` is how many frames went unrendered.
    Underrun { frames: u32 },
}
