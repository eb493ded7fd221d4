//! Strategy that refills the buffer from a periodic task on the control runtime

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::buffer::{FillerFrameBufferConfig, FrameBufferWriter};
use crate::error::StreamError;
use crate::strategy::{fill_guarded, Filler};
use crate::stream::{OutputStreamNode, WeakOutputStreamNode};

/// Calls a [`Filler`] every fill interval while the node is started
pub struct TimedStrategy {
    /// Fill interval
    period: Duration,
    /// Result of the priming fill
    keep_going: bool,
    /// Moved into the fill task on start
    producer: Option<(FrameBufferWriter, Box<dyn Filler>)>,
    /// Runtime the node was created on
    runtime: Option<Handle>,
    task: Option<JoinHandle<()>>,
}

impl TimedStrategy {
    /// Attach the writer and prime the buffer with one fill
    pub fn new(
        config: &FillerFrameBufferConfig,
        mut filler: Box<dyn Filler>,
    ) -> Result<Self, StreamError> {
        let mut writer = config
            .buffer
            .create_writer()
            .map_err(|e| StreamError::Initialization(e.to_string()))?;
        let keep_going = fill_guarded(filler.as_mut(), &mut writer)
            .map_err(|e| StreamError::Initialization(format!("initial fill failed: {:#}", e)))?;

        tracing::debug!(
            "Primed {} of {} frames, fill interval {} ms",
            writer.total_frames(),
            writer.frame_count(),
            config.fill_interval_ms
        );

        Ok(Self {
            period: config.fill_interval(),
            keep_going,
            producer: Some((writer, filler)),
            runtime: None,
            task: None,
        })
    }

    pub fn on_init(&mut self, _node: &OutputStreamNode) -> Result<(), StreamError> {
        let runtime =
            Handle::try_current().map_err(|e| StreamError::Initialization(e.to_string()))?;
        self.runtime = Some(runtime);
        Ok(())
    }

    pub fn on_start(&mut self, node: &OutputStreamNode) -> bool {
        if !self.keep_going {
            return false;
        }
        let Some(runtime) = self.runtime.as_ref() else {
            return true;
        };
        let Some((writer, filler)) = self.producer.take() else {
            return true;
        };
        self.task = Some(runtime.spawn(fill_loop(node.downgrade(), writer, filler, self.period)));
        true
    }

    pub fn on_stopped(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.producer = None;
    }
}

async fn fill_loop(
    node: WeakOutputStreamNode,
    mut writer: FrameBufferWriter,
    mut filler: Box<dyn Filler>,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(node) = node.upgrade() else {
            break;
        };
        if !node.is_started() {
            continue;
        }

        match fill_guarded(filler.as_mut(), &mut writer) {
            Ok(true) => {}
            Ok(false) => {
                let frames = writer.total_frames();
                tracing::debug!("Filler finished after {} frames", frames);
                let _ = node.stop(frames);
                break;
            }
            Err(e) => {
                tracing::warn!("Filler failed, stopping stream: {:#}", e);
                let _ = node.stop(0);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FillerFrameBufferConfig {
        FillerFrameBufferConfig::new(1, 6400, 20, 3, 128).unwrap()
    }

    #[test]
    fn test_new_primes_buffer() {
        let config = config();
        let filler = |writer: &mut FrameBufferWriter| -> anyhow::Result<bool> {
            let silence = vec![0.0; writer.available_frames()];
            writer.write_interleaved(&silence)?;
            Ok(true)
        };
        let strategy = TimedStrategy::new(&config, Box::new(filler)).unwrap();

        assert!(strategy.keep_going);
        assert_eq!(config.buffer.total_write_frames(), 384);
        assert_eq!(strategy.period, Duration::from_millis(20));
    }

    #[test]
    fn test_failing_first_fill_is_an_init_error() {
        let filler =
            |_: &mut FrameBufferWriter| -> anyhow::Result<bool> { anyhow::bail!("no source") };
        let result = TimedStrategy::new(&config(), Box::new(filler));
        assert!(matches!(result, Err(StreamError::Initialization(_))));
    }

    #[test]
    fn test_finished_filler_declines_start() {
        let config = config();
        let filler = |_: &mut FrameBufferWriter| -> anyhow::Result<bool> { Ok(false) };
        let strategy = TimedStrategy::new(&config, Box::new(filler)).unwrap();
        assert!(!strategy.keep_going);
    }
}
