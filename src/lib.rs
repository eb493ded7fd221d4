//! # Audio Output Stream
//!
//! Lock-free streaming of generated audio into a host-scheduled real-time
//! render callback over a shared-memory ring buffer.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── CONTROL CONTEXT ────────────────────────────┐
//! │                                                                          │
//! │   StreamNodeFactory ──creates──▶ OutputStreamNode (state machine)        │
//! │                                   │  owns BufferWriteStrategy            │
//! │                                   │  start() / stop(frame)               │
//! │                                   ▼                                      │
//! │        ┌────────────── Manual ─┬─ Timed ─────────┬─ Worker ──────────┐   │
//! │        │ caller writes         │ tokio interval  │ handshake over    │   │
//! │        │ directly              │ task fills      │ mpsc with thread  │   │
//! │        └───────────┬───────────┴────────┬────────┴─────────┬─────────┘   │
//! └────────────────────┼────────────────────┼──────────────────┼─────────────┘
//!                      │                    │                  │
//!                      ▼                    ▼                  ▼ (worker thread)
//!             ┌──────────────────────────────────────────────────────┐
//!             │            FrameBufferWriter (sole producer)          │
//!             └──────────────────────────┬───────────────────────────┘
//!                                        ▼
//!             ┌──────────────────────────────────────────────────────┐
//!             │  SharedFrameBuffer: interleaved f32 samples           │
//!             │  usage: AtomicU32   write/read cursors: AtomicU64     │
//!             └──────────────────────────┬───────────────────────────┘
//!                                        ▼
//!             ┌──────────────────────────────────────────────────────┐
//!             │            FrameBufferReader (sole consumer)          │
//!             └──────────────────────────┬───────────────────────────┘
//! ┌──────────────────────────── RENDER CONTEXT ─────────────────────────────┐
//! │   OutputStreamProcessor::process(block)  ◀── RenderHost (fixed cadence)  │
//! │     deinterleave → OutputBlock, underrun accounting, stop detection      │
//! │     ◀── Stop{frames} ──  control channel  ── Stop{total} / Underrun ──▶  │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod host;
pub mod strategy;
pub mod stream;

pub use error::{Error, Result};

/// Library-wide constants
pub mod constants {
    /// Default sample rate for hosts that do not dictate one
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: usize = 2;

    /// Host render quantum in frames. Buffer sizes round up to this.
    pub const RENDER_BLOCK_SIZE: usize = 128;

    /// Default refill interval in milliseconds
    pub const DEFAULT_FILL_INTERVAL_MS: u32 = 20;

    /// Default number of fill intervals the buffer can hold
    pub const DEFAULT_FRAME_BUFFER_CHUNKS: u32 = 5;

    /// How often the control side drains render messages
    pub const DEFAULT_MESSAGE_POLL_INTERVAL_MS: u32 = 5;

    /// Capacity of each direction of the render control channel
    pub const CONTROL_CHANNEL_CAPACITY: usize = 16;

    /// Capacity of the application event broadcast
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
}
