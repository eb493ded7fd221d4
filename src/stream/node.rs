//! Stream node: lifecycle state machine on the control side
//!
//! The node owns the host endpoint its processor is attached to, the
//! control-side message port and the buffer-write strategy. Cloning a node
//! clones a handle; all clones drive the same stream.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

use crate::buffer::FrameBufferConfig;
use crate::config::StreamConfig;
use crate::error::{Error, StreamError};
use crate::host::RenderHost;
use crate::strategy::BufferWriteStrategy;
use crate::stream::events::StreamEvent;
use crate::stream::message::{control_channel, MessageToNode, MessageToProcessor, NodePort};
use crate::stream::processor::OutputStreamProcessor;

/// Stream lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Created and connected; playback can start
    Ready,
    /// Playback running
    Started,
    /// Stop requested, waiting for the render side to confirm
    Stopping,
    /// Terminal
    Stopped,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Ready => "ready",
            StreamState::Started => "started",
            StreamState::Stopping => "stopping",
            StreamState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Resolves once the render side has confirmed a stop
#[derive(Debug)]
pub struct StopCompletion {
    receiver: Option<oneshot::Receiver<u64>>,
}

impl StopCompletion {
    fn ready() -> Self {
        Self { receiver: None }
    }

    fn pending(receiver: oneshot::Receiver<u64>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }
}

impl Future for StopCompletion {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Poll::Ready(());
        };
        match Pin::new(receiver).poll(cx) {
            Poll::Ready(_) => {
                self.receiver = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

struct NodeCore {
    state: StreamState,
    host: Box<dyn RenderHost>,
    port: Option<NodePort>,
    strategy: Option<BufferWriteStrategy>,
    stop_waiters: Vec<oneshot::Sender<u64>>,
}

impl NodeCore {
    /// Release the strategy, detach from the host and close the port
    fn release(&mut self) {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.on_stopped();
        }
        self.host.detach();
        self.port = None;
        self.state = StreamState::Stopped;
    }
}

struct NodeInner {
    buffer: FrameBufferConfig,
    events: broadcast::Sender<StreamEvent>,
    core: Mutex<NodeCore>,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if core.state != StreamState::Stopped {
            tracing::debug!("Releasing stream dropped in state {}", core.state);
            core.release();
        }
    }
}

/// Control-side handle of an output stream
#[derive(Clone)]
pub struct OutputStreamNode {
    inner: Arc<NodeInner>,
}

/// Non-owning node handle for background tasks
#[derive(Clone)]
pub struct WeakOutputStreamNode {
    inner: Weak<NodeInner>,
}

impl WeakOutputStreamNode {
    pub fn upgrade(&self) -> Option<OutputStreamNode> {
        self.inner.upgrade().map(|inner| OutputStreamNode { inner })
    }
}

impl OutputStreamNode {
    /// Attach a processor reading `buffer` to `host`. The node starts in
    /// `Ready` with no strategy.
    pub fn connect(
        mut host: Box<dyn RenderHost>,
        buffer: &FrameBufferConfig,
        config: &StreamConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let reader = buffer.create_reader()?;
        let (node_port, processor_port) = control_channel(config.control_channel_capacity);
        let processor = OutputStreamProcessor::new(reader, processor_port);
        host.attach(buffer.channel_count(), Box::new(processor))?;

        let (events, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            inner: Arc::new(NodeInner {
                buffer: buffer.clone(),
                events,
                core: Mutex::new(NodeCore {
                    state: StreamState::Ready,
                    host,
                    port: Some(node_port),
                    strategy: None,
                    stop_waiters: Vec::new(),
                }),
            }),
        })
    }

    pub(crate) fn set_strategy(&self, strategy: BufferWriteStrategy) {
        self.inner.core.lock().strategy = Some(strategy);
    }

    /// Begin playback
    pub fn start(&self) -> Result<(), StreamError> {
        let mut core = self.inner.core.lock();
        if !core.host.is_attached() {
            return Err(StreamError::InvalidState {
                operation: "start without an attached output",
                state: core.state,
            });
        }
        match core.state {
            StreamState::Ready => {
                core.state = StreamState::Started;
                tracing::debug!("Stream started");

                let proceed = match core.strategy.as_mut() {
                    Some(strategy) => strategy.on_start(self),
                    None => true,
                };
                if !proceed {
                    let frames = self.total_write_frames();
                    tracing::debug!("Strategy declined to continue, stopping at frame {}", frames);
                    let _ = self.stop_locked(&mut core, frames);
                }
                Ok(())
            }
            state => Err(StreamError::InvalidState {
                operation: "start",
                state,
            }),
        }
    }

    /// Request a stop once `frames` frames have been read in total; `0`
    /// stops at the next render quantum
    pub fn stop(&self, frames: u64) -> StopCompletion {
        let mut core = self.inner.core.lock();
        self.stop_locked(&mut core, frames)
    }

    fn stop_locked(&self, core: &mut NodeCore, frames: u64) -> StopCompletion {
        match core.state {
            StreamState::Started => {
                let posted = core
                    .port
                    .as_ref()
                    .map(|port| port.post(MessageToProcessor::Stop { frames }))
                    .unwrap_or(false);
                if !posted {
                    // The render side is gone and will never confirm
                    let frame = self.total_read_frames();
                    tracing::warn!("Render side unreachable, stopping at frame {}", frame);
                    self.finish_stop(core, frame);
                    return StopCompletion::ready();
                }
                core.state = StreamState::Stopping;
                tracing::debug!("Stream stopping at frame {}", frames);

                let (sender, receiver) = oneshot::channel();
                core.stop_waiters.push(sender);
                StopCompletion::pending(receiver)
            }
            StreamState::Ready => {
                core.release();
                tracing::debug!("Stream stopped before start");
                StopCompletion::ready()
            }
            StreamState::Stopping | StreamState::Stopped => StopCompletion::ready(),
        }
    }

    /// Release everything, publish `Stopped` and resolve pending completions
    fn finish_stop(&self, core: &mut NodeCore, frame: u64) {
        core.release();
        let _ = self.inner.events.send(StreamEvent::Stopped { frame });
        for waiter in core.stop_waiters.drain(..) {
            let _ = waiter.send(frame);
        }
    }

    /// Handle every message the render side has posted. Returns the number
    /// of messages handled.
    pub fn dispatch_messages(&self) -> usize {
        let mut core = self.inner.core.lock();
        let mut handled = 0;
        while let Some(message) = core.port.as_ref().and_then(NodePort::try_recv) {
            handled += 1;
            match message {
                MessageToNode::Stop { frames } => {
                    if core.state == StreamState::Stopped {
                        continue;
                    }
                    tracing::debug!("Stream stopped at frame {}", frames);
                    self.finish_stop(&mut core, frames);
                }
                MessageToNode::Underrun { frames } => {
                    tracing::debug!("Underrun of {} frames", frames);
                    let _ = self.inner.events.send(StreamEvent::Underrun { frames });
                }
            }
        }
        handled
    }

    /// Poll render messages on the current tokio runtime until the stream
    /// stops or every handle is dropped
    pub fn spawn_message_pump(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let node = self.downgrade();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(node) = node.upgrade() else {
                    break;
                };
                node.dispatch_messages();
                if node.state() == StreamState::Stopped {
                    break;
                }
            }
        })
    }

    /// Subscribe to `Stopped` and `Underrun` events
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    pub fn downgrade(&self) -> WeakOutputStreamNode {
        WeakOutputStreamNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn state(&self) -> StreamState {
        self.inner.core.lock().state
    }

    pub fn is_started(&self) -> bool {
        self.state() == StreamState::Started
    }

    pub fn channel_count(&self) -> usize {
        self.inner.buffer.channel_count()
    }

    /// Ring buffer capacity in frames
    pub fn frame_buffer_size(&self) -> usize {
        self.inner.buffer.frame_count()
    }

    /// Frames consumed by the render side so far
    pub fn total_read_frames(&self) -> u64 {
        self.inner.buffer.total_read_frames()
    }

    /// Frames produced by the writer so far
    pub fn total_write_frames(&self) -> u64 {
        self.inner.buffer.total_write_frames()
    }
}

impl fmt::Debug for OutputStreamNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStreamNode")
            .field("state", &self.state())
            .field("buffer", &self.inner.buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameBufferWriter;
    use crate::host::ManualRenderHost;

    fn node(frames: usize) -> (OutputStreamNode, FrameBufferWriter, ManualRenderHost) {
        let host = ManualRenderHost::new(48000, 128);
        let buffer = FrameBufferConfig::new(frames, 2).unwrap();
        let writer = buffer.create_writer().unwrap();
        let config = StreamConfig::default();
        let node = OutputStreamNode::connect(Box::new(host.clone()), &buffer, &config).unwrap();
        (node, writer, host)
    }

    #[tokio::test]
    async fn test_stop_after_start() {
        let (node, mut writer, host) = node(512);
        let mut events = node.subscribe();
        writer.write_interleaved(&[0.1; 512]).unwrap();

        node.start().unwrap();
        let completion = node.stop(0);
        assert_eq!(node.state(), StreamState::Stopping);

        assert!(!host.render());
        assert_eq!(node.dispatch_messages(), 1);
        completion.await;

        assert_eq!(node.state(), StreamState::Stopped);
        assert_eq!(events.try_recv().unwrap(), StreamEvent::Stopped { frame: 128 });
        assert!(events.try_recv().is_err());
        assert!(!host.is_attached());
    }

    #[tokio::test]
    async fn test_stop_while_ready_is_synchronous() {
        let (node, _writer, host) = node(512);
        let mut events = node.subscribe();

        node.stop(0).await;

        assert_eq!(node.state(), StreamState::Stopped);
        assert!(!host.is_attached());
        assert_eq!(host.quanta(), 0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_start_twice_is_invalid() {
        let (node, _writer, _host) = node(512);
        node.start().unwrap();
        assert_eq!(
            node.start(),
            Err(StreamError::InvalidState {
                operation: "start",
                state: StreamState::Started
            })
        );
    }

    #[test]
    fn test_start_after_stop_is_invalid() {
        let (node, _writer, _host) = node(512);
        let _ = node.stop(0);
        assert!(matches!(node.start(), Err(StreamError::InvalidState { .. })));
    }

    #[test]
    fn test_start_requires_attached_output() {
        let (node, _writer, mut host) = node(512);
        host.detach();
        assert!(matches!(node.start(), Err(StreamError::InvalidState { .. })));
        assert_eq!(node.state(), StreamState::Ready);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_while_stopping() {
        let (node, mut writer, host) = node(512);
        writer.write_interleaved(&[0.1; 600]).unwrap();
        node.start().unwrap();

        let first = node.stop(256);
        node.stop(0).await;
        assert_eq!(node.state(), StreamState::Stopping);

        assert!(host.render());
        assert!(!host.render());
        node.dispatch_messages();
        first.await;
        assert_eq!(node.total_read_frames(), 256);
    }

    #[tokio::test]
    async fn test_underrun_event_keeps_state() {
        let (node, mut writer, host) = node(512);
        let mut events = node.subscribe();
        node.start().unwrap();

        writer.write_interleaved(&[0.1; 160]).unwrap();
        host.render();
        writer.write_interleaved(&[0.1; 256]).unwrap();
        host.render();
        node.dispatch_messages();

        assert_eq!(events.try_recv().unwrap(), StreamEvent::Underrun { frames: 48 });
        assert_eq!(node.state(), StreamState::Started);
    }

    #[tokio::test]
    async fn test_stop_without_render_side_finishes_at_once() {
        let (node, mut writer, host) = node(512);
        let mut events = node.subscribe();
        writer.write_interleaved(&[0.1; 512]).unwrap();
        node.start().unwrap();
        host.render();

        // Dropping the callback closes the processor's end of the channel
        host.clone().detach();
        node.stop(0).await;

        assert_eq!(node.state(), StreamState::Stopped);
        assert_eq!(events.try_recv().unwrap(), StreamEvent::Stopped { frame: 128 });
    }

    #[test]
    fn test_connect_rejects_zero_capacities() {
        for config in [
            StreamConfig {
                control_channel_capacity: 0,
                ..Default::default()
            },
            StreamConfig {
                event_channel_capacity: 0,
                ..Default::default()
            },
            StreamConfig {
                message_poll_interval_ms: 0,
                ..Default::default()
            },
        ] {
            let host = ManualRenderHost::new(48000, 128);
            let buffer = FrameBufferConfig::new(512, 2).unwrap();
            let result = OutputStreamNode::connect(Box::new(host.clone()), &buffer, &config);

            assert!(matches!(result, Err(Error::Stream(StreamError::Validation(_)))));
            assert!(!host.is_attached());
        }
    }

    #[test]
    fn test_drop_detaches_host() {
        let (node, _writer, host) = node(512);
        node.start().unwrap();
        assert!(host.is_attached());
        drop(node);
        assert!(!host.is_attached());
    }
}
