//! Buffer-write strategies
//!
//! A strategy decides who produces audio for a stream node and when. The
//! node calls the hooks below at initialization, on start and once the
//! stream has stopped.

pub mod manual;
pub mod timed;
pub mod worker;

pub use manual::ManualStrategy;
pub use timed::TimedStrategy;
pub use worker::{MessageToStrategy, MessageToWorker, WorkerEntry, WorkerStrategy};

use std::panic::{self, AssertUnwindSafe};

use crate::buffer::FrameBufferWriter;
use crate::error::StreamError;
use crate::stream::OutputStreamNode;

/// Application code that produces audio into a frame buffer
///
/// Called once to prime the buffer and then once per fill interval.
/// Returning `Ok(false)` ends the stream after everything written so far
/// has played; an error forces an immediate stop.
pub trait Filler: Send {
    fn fill(&mut self, writer: &mut FrameBufferWriter) -> anyhow::Result<bool>;
}

impl<F> Filler for F
where
    F: FnMut(&mut FrameBufferWriter) -> anyhow::Result<bool> + Send,
{
    fn fill(&mut self, writer: &mut FrameBufferWriter) -> anyhow::Result<bool> {
        self(writer)
    }
}

/// Run one fill, turning a panic inside the filler into an error so the
/// owning strategy can force a stop instead of losing its fill context
pub(crate) fn fill_guarded(
    filler: &mut dyn Filler,
    writer: &mut FrameBufferWriter,
) -> anyhow::Result<bool> {
    match panic::catch_unwind(AssertUnwindSafe(|| filler.fill(writer))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow::anyhow!("filler panicked: {}", reason))
        }
    }
}

/// Strategy owned by a stream node
pub enum BufferWriteStrategy {
    Manual(ManualStrategy),
    Timed(TimedStrategy),
    Worker(WorkerStrategy),
}

impl BufferWriteStrategy {
    /// Prepare the producer before the node is handed to the caller
    pub(crate) async fn on_init(&mut self, node: &OutputStreamNode) -> Result<(), StreamError> {
        match self {
            BufferWriteStrategy::Manual(strategy) => strategy.on_init(node),
            BufferWriteStrategy::Timed(strategy) => strategy.on_init(node),
            BufferWriteStrategy::Worker(strategy) => strategy.on_init(node).await,
        }
    }

    /// Begin producing. `false` means the producer has already finished and
    /// the node should stop once the primed audio has played.
    pub(crate) fn on_start(&mut self, node: &OutputStreamNode) -> bool {
        match self {
            BufferWriteStrategy::Manual(strategy) => strategy.on_start(node),
            BufferWriteStrategy::Timed(strategy) => strategy.on_start(node),
            BufferWriteStrategy::Worker(strategy) => strategy.on_start(node),
        }
    }

    /// Release the producer
    pub(crate) fn on_stopped(&mut self) {
        match self {
            BufferWriteStrategy::Manual(strategy) => strategy.on_stopped(),
            BufferWriteStrategy::Timed(strategy) => strategy.on_stopped(),
            BufferWriteStrategy::Worker(strategy) => strategy.on_stopped(),
        }
    }
}

impl From<ManualStrategy> for BufferWriteStrategy {
    fn from(strategy: ManualStrategy) -> Self {
        BufferWriteStrategy::Manual(strategy)
    }
}

impl From<TimedStrategy> for BufferWriteStrategy {
    fn from(strategy: TimedStrategy) -> Self {
        BufferWriteStrategy::Timed(strategy)
    }
}

impl From<WorkerStrategy> for BufferWriteStrategy {
    fn from(strategy: WorkerStrategy) -> Self {
        BufferWriteStrategy::Worker(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameBufferConfig;

    #[test]
    fn test_fill_guarded_reports_panic() {
        let config = FrameBufferConfig::new(16, 1).unwrap();
        let mut writer = config.create_writer().unwrap();
        let mut filler =
            |_: &mut FrameBufferWriter| -> anyhow::Result<bool> { panic!("decoder state lost") };

        let err = fill_guarded(&mut filler, &mut writer).unwrap_err();
        assert!(err.to_string().contains("decoder state lost"));
    }

    #[test]
    fn test_fill_guarded_passes_results_through() {
        let config = FrameBufferConfig::new(16, 1).unwrap();
        let mut writer = config.create_writer().unwrap();
        let mut filler = |writer: &mut FrameBufferWriter| -> anyhow::Result<bool> {
            writer.write_interleaved(&[0.5; 4])?;
            Ok(false)
        };

        assert!(!fill_guarded(&mut filler, &mut writer).unwrap());
        assert_eq!(writer.total_frames(), 4);
    }
}
