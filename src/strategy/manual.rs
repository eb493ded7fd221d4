//! Strategy for callers that write the buffer themselves

use crate::error::StreamError;
use crate::stream::OutputStreamNode;

/// The caller keeps the `FrameBufferWriter`; every hook is a no-op
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualStrategy;

impl ManualStrategy {
    pub fn on_init(&mut self, _node: &OutputStreamNode) -> Result<(), StreamError> {
        Ok(())
    }

    pub fn on_start(&mut self, _node: &OutputStreamNode) -> bool {
        true
    }

    pub fn on_stopped(&mut self) {}
}
