//! Entry points that build a stream node with its buffer and strategy

use std::time::Duration;

use crate::buffer::{FillerFrameBufferConfig, FrameBufferConfig, FrameBufferWriter};
use crate::config::StreamConfig;
use crate::error::{Error, StreamError};
use crate::host::RenderHost;
use crate::strategy::{
    BufferWriteStrategy, Filler, ManualStrategy, TimedStrategy, WorkerEntry, WorkerStrategy,
};
use crate::stream::node::OutputStreamNode;

/// Parameters for a node the caller writes to directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualBufferNodeParams {
    pub channel_count: usize,
    /// Ring buffer capacity in frames
    pub frame_buffer_size: usize,
}

/// Parameters for a node refilled on a timer. Unset values fall back to
/// the factory's [`StreamConfig`] and the host's sample rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimedBufferNodeParams {
    pub channel_count: usize,
    pub fill_interval_ms: Option<u32>,
    pub sample_rate: Option<u32>,
    pub frame_buffer_chunks: Option<u32>,
}

/// Parameters for a node refilled from a worker thread
#[derive(Debug, Clone)]
pub struct WorkerBufferNodeParams<P> {
    pub timed: TimedBufferNodeParams,
    /// Handed to the [`WorkerEntry`] on the worker thread
    pub filler_params: P,
}

/// Builds stream nodes. Must be used from within a tokio runtime; the
/// message pump and timed fill tasks are spawned on it.
#[derive(Debug, Clone, Default)]
pub struct StreamNodeFactory {
    config: StreamConfig,
}

impl StreamNodeFactory {
    /// Fails if any interval, chunk count or channel capacity is zero
    pub fn new(config: StreamConfig) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Node plus the writer the caller fills
    pub async fn create_manual_buffer_node(
        &self,
        host: Box<dyn RenderHost>,
        params: ManualBufferNodeParams,
    ) -> Result<(OutputStreamNode, FrameBufferWriter), Error> {
        positive("channel_count", params.channel_count)?;
        positive("frame_buffer_size", params.frame_buffer_size)?;

        let buffer = FrameBufferConfig::new(params.frame_buffer_size, params.channel_count)
            .map_err(|e| StreamError::Validation(e.to_string()))?;
        let writer = buffer.create_writer()?;
        let node = self
            .create(host, &buffer, ManualStrategy.into())
            .await?;
        Ok((node, writer))
    }

    /// Node refilled by `filler` every fill interval on the current runtime
    pub async fn create_timed_buffer_node(
        &self,
        host: Box<dyn RenderHost>,
        filler: Box<dyn Filler>,
        params: TimedBufferNodeParams,
    ) -> Result<OutputStreamNode, Error> {
        let config = self.filler_buffer_config(host.as_ref(), &params)?;
        let strategy = TimedStrategy::new(&config, filler)?;
        self.create(host, &config.buffer, strategy.into()).await
    }

    /// Node refilled by a filler built and run on a dedicated thread
    pub async fn create_worker_buffer_node<P: Send + 'static>(
        &self,
        host: Box<dyn RenderHost>,
        entry: WorkerEntry<P>,
        params: WorkerBufferNodeParams<P>,
    ) -> Result<OutputStreamNode, Error> {
        let config = self.filler_buffer_config(host.as_ref(), &params.timed)?;
        let buffer = config.buffer.clone();
        let strategy = WorkerStrategy::new(config, entry, params.filler_params);
        self.create(host, &buffer, strategy.into()).await
    }

    fn filler_buffer_config(
        &self,
        host: &dyn RenderHost,
        params: &TimedBufferNodeParams,
    ) -> Result<FillerFrameBufferConfig, Error> {
        let fill_interval_ms = params.fill_interval_ms.unwrap_or(self.config.fill_interval_ms);
        let sample_rate = params.sample_rate.unwrap_or_else(|| host.sample_rate());
        let chunks = params.frame_buffer_chunks.unwrap_or(self.config.frame_buffer_chunks);

        positive("channel_count", params.channel_count)?;
        positive("fill_interval_ms", fill_interval_ms as usize)?;
        positive("sample_rate", sample_rate as usize)?;
        positive("frame_buffer_chunks", chunks as usize)?;

        let config = FillerFrameBufferConfig::new(
            params.channel_count,
            sample_rate,
            fill_interval_ms,
            chunks,
            host.block_size(),
        )
        .map_err(|e| StreamError::Validation(e.to_string()))?;
        Ok(config)
    }

    async fn create(
        &self,
        host: Box<dyn RenderHost>,
        buffer: &FrameBufferConfig,
        mut strategy: BufferWriteStrategy,
    ) -> Result<OutputStreamNode, Error> {
        let node = OutputStreamNode::connect(host, buffer, &self.config)?;

        if let Err(e) = strategy.on_init(&node).await {
            let _ = node.stop(0);
            return Err(e.into());
        }
        node.set_strategy(strategy);
        let poll_interval = Duration::from_millis(u64::from(self.config.message_poll_interval_ms));
        node.spawn_message_pump(poll_interval);

        tracing::debug!(
            "Created stream node: {} channels, {} frame buffer",
            node.channel_count(),
            node.frame_buffer_size()
        );
        Ok(node)
    }
}

fn positive(name: &str, value: usize) -> Result<(), StreamError> {
    if value == 0 {
        return Err(StreamError::Validation(format!("{} must be positive", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualRenderHost;
    use crate::stream::StreamState;

    fn host() -> Box<dyn RenderHost> {
        Box::new(ManualRenderHost::new(48000, 128))
    }

    #[tokio::test]
    async fn test_manual_node_validation() {
        let factory = StreamNodeFactory::default();
        let result = factory
            .create_manual_buffer_node(
                host(),
                ManualBufferNodeParams {
                    channel_count: 0,
                    frame_buffer_size: 512,
                },
            )
            .await;
        assert!(matches!(result, Err(Error::Stream(StreamError::Validation(_)))));

        let result = factory
            .create_manual_buffer_node(
                host(),
                ManualBufferNodeParams {
                    channel_count: 2,
                    frame_buffer_size: 0,
                },
            )
            .await;
        assert!(matches!(result, Err(Error::Stream(StreamError::Validation(_)))));
    }

    #[test]
    fn test_factory_rejects_unusable_config() {
        let config = StreamConfig {
            event_channel_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            StreamNodeFactory::new(config),
            Err(StreamError::Validation(_))
        ));

        let config = StreamConfig {
            message_poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            StreamNodeFactory::new(config),
            Err(StreamError::Validation(_))
        ));

        assert!(StreamNodeFactory::new(StreamConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_timed_node_sized_from_host() {
        let factory = StreamNodeFactory::default();
        let filler = |_: &mut FrameBufferWriter| -> anyhow::Result<bool> { Ok(true) };
        let node = factory
            .create_timed_buffer_node(
                host(),
                Box::new(filler),
                TimedBufferNodeParams {
                    channel_count: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(node.frame_buffer_size(), 5120);
        assert_eq!(node.channel_count(), 2);
        assert_eq!(node.state(), StreamState::Ready);
    }

    #[tokio::test]
    async fn test_timed_node_rejects_zero_interval() {
        let factory = StreamNodeFactory::default();
        let filler = |_: &mut FrameBufferWriter| -> anyhow::Result<bool> { Ok(true) };
        let result = factory
            .create_timed_buffer_node(
                host(),
                Box::new(filler),
                TimedBufferNodeParams {
                    channel_count: 2,
                    fill_interval_ms: Some(0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::Stream(StreamError::Validation(_)))));
    }
}
