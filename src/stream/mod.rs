//! Stream node, render-side processor and the channel between them

pub mod events;
pub mod factory;
pub mod message;
pub mod node;
pub mod processor;

pub use events::StreamEvent;
pub use factory::{
    ManualBufferNodeParams, StreamNodeFactory, TimedBufferNodeParams, WorkerBufferNodeParams,
};
pub use message::{MessageToNode, MessageToProcessor};
pub use node::{OutputStreamNode, StopCompletion, StreamState, WeakOutputStreamNode};
pub use processor::OutputStreamProcessor;
