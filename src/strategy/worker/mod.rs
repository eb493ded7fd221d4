//! Strategy that fills the buffer from a dedicated background thread
//!
//! The worker shares the ring buffer with the render side; only the
//! handshake and stop requests travel over channels:
//!
//! ```text
//! control                     worker thread
//!    │ ── Init{config, params} ──▶ │  build filler, prime buffer
//!    │ ◀──── InitDone ──────────── │
//!    │ ── Start ─────────────────▶ │  fill every interval
//!    │ ◀──── Stop{stop_frames} ─── │  filler finished or failed
//!    │ ── Stop ──────────────────▶ │  exit
//! ```

mod message;
mod runtime;

pub use message::{MessageToStrategy, MessageToWorker};

use std::thread::JoinHandle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::buffer::FillerFrameBufferConfig;
use crate::error::StreamError;
use crate::strategy::Filler;
use crate::stream::{OutputStreamNode, WeakOutputStreamNode};

type BuildFiller<P> = Box<dyn FnOnce(P) -> anyhow::Result<Box<dyn Filler>> + Send>;

/// Constructor the worker thread runs to build its filler from the
/// parameters sent with `Init`
pub struct WorkerEntry<P> {
    build: BuildFiller<P>,
}

impl<P: Send + 'static> WorkerEntry<P> {
    pub fn new<F, T>(build: F) -> Self
    where
        F: FnOnce(P) -> anyhow::Result<T> + Send + 'static,
        T: Filler + 'static,
    {
        Self {
            build: Box::new(move |params| Ok(Box::new(build(params)?) as Box<dyn Filler>)),
        }
    }
}

impl<P> WorkerEntry<P> {
    pub(crate) fn build(self, params: P) -> anyhow::Result<Box<dyn Filler>> {
        (self.build)(params)
    }
}

/// Type-erased command sender to the worker thread
trait WorkerPort: Send {
    fn post(&self, command: WorkerCommand) -> bool;
}

enum WorkerCommand {
    Start,
    Stop,
}

impl<P: Send> WorkerPort for UnboundedSender<MessageToWorker<P>> {
    fn post(&self, command: WorkerCommand) -> bool {
        let message = match command {
            WorkerCommand::Start => MessageToWorker::Start,
            WorkerCommand::Stop => MessageToWorker::Stop,
        };
        self.send(message).is_ok()
    }
}

struct LaunchedWorker {
    port: Box<dyn WorkerPort>,
    replies: UnboundedReceiver<MessageToStrategy>,
    thread: JoinHandle<()>,
}

type Launch =
    Box<dyn FnOnce(FillerFrameBufferConfig) -> Result<LaunchedWorker, StreamError> + Send>;

/// Runs a [`Filler`] on its own thread and forwards its stop requests
pub struct WorkerStrategy {
    /// Buffer and fill interval handed to the worker with `Init`
    config: FillerFrameBufferConfig,
    /// Spawns the worker thread; consumed by `on_init`
    launch: Option<Launch>,
    /// Command sender to the worker thread
    port: Option<Box<dyn WorkerPort>>,
    /// Control-side task forwarding worker stop requests to the node
    forwarder: Option<tokio::task::JoinHandle<()>>,
    /// Worker thread handle (detached on stop)
    thread: Option<JoinHandle<()>>,
}

impl WorkerStrategy {
    pub fn new<P: Send + 'static>(
        config: FillerFrameBufferConfig,
        entry: WorkerEntry<P>,
        filler_params: P,
    ) -> Self {
        let launch: Launch = Box::new(move |config| {
            let worker = runtime::spawn_worker(entry)
                .map_err(|e| StreamError::Initialization(e.to_string()))?;
            worker
                .commands
                .send(MessageToWorker::Init { config, filler_params })
                .map_err(|_| StreamError::Initialization("worker exited before init".to_string()))?;
            Ok(LaunchedWorker {
                port: Box::new(worker.commands),
                replies: worker.replies,
                thread: worker.thread,
            })
        });

        Self {
            config,
            launch: Some(launch),
            port: None,
            forwarder: None,
            thread: None,
        }
    }

    /// Spawn the worker and wait for it to report the buffer primed
    pub async fn on_init(&mut self, node: &OutputStreamNode) -> Result<(), StreamError> {
        let launch = self
            .launch
            .take()
            .ok_or_else(|| StreamError::Initialization("worker already launched".to_string()))?;
        let LaunchedWorker {
            port,
            mut replies,
            thread,
        } = launch(self.config.clone())?;
        self.port = Some(port);
        self.thread = Some(thread);

        match replies.recv().await {
            Some(MessageToStrategy::InitDone) => {
                tracing::debug!("Buffer fill worker initialized");
            }
            Some(MessageToStrategy::InitFailed(reason)) => {
                self.on_stopped();
                return Err(StreamError::Initialization(reason));
            }
            Some(MessageToStrategy::Stop { .. }) => {
                self.on_stopped();
                return Err(StreamError::Initialization("worker stopped during init".to_string()));
            }
            None => {
                self.on_stopped();
                return Err(StreamError::Initialization("worker exited during init".to_string()));
            }
        }

        self.forwarder = Some(tokio::spawn(forward_replies(node.downgrade(), replies)));
        Ok(())
    }

    pub fn on_start(&mut self, _node: &OutputStreamNode) -> bool {
        if let Some(port) = self.port.as_ref() {
            if !port.post(WorkerCommand::Start) {
                tracing::error!("Buffer fill worker is gone");
            }
        }
        true
    }

    pub fn on_stopped(&mut self) {
        if let Some(port) = self.port.take() {
            let _ = port.post(WorkerCommand::Stop);
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        // The thread exits on its own once the channel closes
        self.thread = None;
    }
}

/// Turn worker stop requests into node stops. The forwarder is aborted
/// when the node stops, so a closed channel means the worker died.
async fn forward_replies(
    node: WeakOutputStreamNode,
    mut replies: UnboundedReceiver<MessageToStrategy>,
) {
    while let Some(reply) = replies.recv().await {
        if let MessageToStrategy::Stop { stop_frames } = reply {
            let Some(node) = node.upgrade() else {
                return;
            };
            tracing::debug!("Worker requested stop at frame {}", stop_frames);
            let _ = node.stop(stop_frames);
        }
    }

    if let Some(node) = node.upgrade() {
        tracing::error!("Buffer fill worker exited unexpectedly, stopping stream");
        let _ = node.stop(0);
    }
}
