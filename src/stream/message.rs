//! Control messages between a stream node and its render processor
//!
//! Both directions are bounded crossbeam channels used with `try_send` and
//! `try_recv` only, so the render side never blocks or allocates.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Sent from the control context to the render processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageToProcessor {
    /// Stop once the total read frames reach `frames`; `0` stops at the
    /// next render quantum
    Stop { frames: u64 },
}

/// Sent from the render processor to the control context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageToNode {
    /// The processor finished after reading `frames` frames in total
    Stop { frames: u64 },
    /// `frames` frames could not be rendered since the last report
    Underrun { frames: u32 },
}

/// Control-side end of the channel pair
#[derive(Debug)]
pub struct NodePort {
    to_processor: Sender<MessageToProcessor>,
    from_processor: Receiver<MessageToNode>,
}

/// Render-side end of the channel pair
#[derive(Debug)]
pub struct ProcessorPort {
    to_node: Sender<MessageToNode>,
    from_node: Receiver<MessageToProcessor>,
}

/// Create a connected pair of ports
pub fn control_channel(capacity: usize) -> (NodePort, ProcessorPort) {
    let (to_processor, from_node) = bounded(capacity);
    let (to_node, from_processor) = bounded(capacity);
    (
        NodePort {
            to_processor,
            from_processor,
        },
        ProcessorPort { to_node, from_node },
    )
}

impl NodePort {
    /// Returns `false` if the message could not be queued
    pub fn post(&self, message: MessageToProcessor) -> bool {
        self.to_processor.try_send(message).is_ok()
    }

    pub fn try_recv(&self) -> Option<MessageToNode> {
        self.from_processor.try_recv().ok()
    }
}

impl ProcessorPort {
    /// Returns `false` if the message was dropped
    #[inline]
    pub fn post(&self, message: MessageToNode) -> bool {
        self.to_node.try_send(message).is_ok()
    }

    #[inline]
    pub fn try_recv(&self) -> Result<MessageToProcessor, TryRecvError> {
        self.from_node.try_recv()
    }
}
