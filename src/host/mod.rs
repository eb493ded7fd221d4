//! Render host abstraction
//!
//! The host owns the real-time schedule: it invokes the attached
//! [`RenderCallback`] once per fixed-size quantum until the callback asks
//! to finish or the host is detached.

#[cfg(feature = "device-output")]
pub mod device;
pub mod manual;
pub mod threaded;

#[cfg(feature = "device-output")]
pub use device::DeviceRenderHost;
pub use manual::ManualRenderHost;
pub use threaded::ThreadedRenderHost;

use crate::buffer::OutputBlock;
use crate::error::StreamError;

/// Consumer invoked by the host on its real-time schedule
///
/// Implementations must not block, lock or allocate.
pub trait RenderCallback: Send + 'static {
    /// Fill one render quantum. Returning `false` asks the host to stop
    /// invoking this callback.
    fn process(&mut self, output: &mut OutputBlock) -> bool;
}

/// Output endpoint a stream node attaches its render callback to
pub trait RenderHost: Send {
    /// Frames per second the host renders at
    fn sample_rate(&self) -> u32;

    /// Frames per render quantum
    fn block_size(&self) -> usize;

    /// Start invoking `callback` with `channel_count`-channel blocks
    fn attach(
        &mut self,
        channel_count: usize,
        callback: Box<dyn RenderCallback>,
    ) -> Result<(), StreamError>;

    /// Stop invoking the callback and drop it
    fn detach(&mut self);

    /// Whether a callback is attached and still running
    fn is_attached(&self) -> bool;
}
