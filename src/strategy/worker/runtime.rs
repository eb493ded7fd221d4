//! Fill loop running on the worker thread
//!
//! The thread owns a single-threaded tokio runtime; commands and the fill
//! ticker are multiplexed with `select!`.

use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::buffer::{FillerFrameBufferConfig, FrameBufferWriter};
use crate::strategy::worker::message::{MessageToStrategy, MessageToWorker};
use crate::strategy::worker::WorkerEntry;
use crate::strategy::{fill_guarded, Filler};

/// Channels and thread of a spawned worker
pub(crate) struct SpawnedWorker<P> {
    pub commands: UnboundedSender<MessageToWorker<P>>,
    pub replies: UnboundedReceiver<MessageToStrategy>,
    pub thread: JoinHandle<()>,
}

/// Start the worker thread. It idles until it receives `Init`.
pub(crate) fn spawn_worker<P: Send + 'static>(
    entry: WorkerEntry<P>,
) -> std::io::Result<SpawnedWorker<P>> {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (reply_tx, replies) = mpsc::unbounded_channel();

    let thread = thread::Builder::new()
        .name("buffer-fill-worker".to_string())
        .spawn(move || {
            let built = tokio::runtime::Builder::new_current_thread().enable_time().build();
            let runtime = match built {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!("Failed to build worker runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(BufferFillWorker::new(entry, command_rx, reply_tx).run());
            tracing::debug!("Buffer fill worker exited");
        })?;

    Ok(SpawnedWorker {
        commands,
        replies,
        thread,
    })
}

struct BufferFillWorker<P> {
    /// Filler constructor, consumed by `Init`
    entry: Option<WorkerEntry<P>>,
    commands: UnboundedReceiver<MessageToWorker<P>>,
    replies: UnboundedSender<MessageToStrategy>,
    producer: Option<(FrameBufferWriter, Box<dyn Filler>)>,
    period: Duration,
    keep_going: bool,
    /// Set while started
    ticker: Option<Interval>,
}

impl<P> BufferFillWorker<P> {
    fn new(
        entry: WorkerEntry<P>,
        commands: UnboundedReceiver<MessageToWorker<P>>,
        replies: UnboundedSender<MessageToStrategy>,
    ) -> Self {
        Self {
            entry: Some(entry),
            commands,
            replies,
            producer: None,
            period: Duration::ZERO,
            keep_going: true,
            ticker: None,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = next_tick(&mut self.ticker) => self.fill(),
            }
        }
    }

    /// Returns `false` once the worker should exit
    fn handle_command(&mut self, command: MessageToWorker<P>) -> bool {
        match command {
            MessageToWorker::Init { config, filler_params } => {
                let reply = match self.init(&config, filler_params) {
                    Ok(()) => MessageToStrategy::InitDone,
                    Err(reason) => MessageToStrategy::InitFailed(reason),
                };
                let _ = self.replies.send(reply);
            }
            MessageToWorker::Start => {
                if !self.keep_going {
                    self.finish(self.total_frames());
                    return true;
                }
                if self.producer.is_some() && self.ticker.is_none() {
                    let mut ticker = interval_at(Instant::now() + self.period, self.period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.ticker = Some(ticker);
                }
            }
            MessageToWorker::Stop => {
                self.ticker = None;
                self.producer = None;
                return false;
            }
        }
        true
    }

    fn init(&mut self, config: &FillerFrameBufferConfig, params: P) -> Result<(), String> {
        let entry = self.entry.take().ok_or_else(|| "worker already initialized".to_string())?;
        let mut filler = entry.build(params).map_err(|e| format!("{:#}", e))?;
        let mut writer = config.buffer.create_writer().map_err(|e| e.to_string())?;
        self.keep_going = fill_guarded(filler.as_mut(), &mut writer)
            .map_err(|e| format!("initial fill failed: {:#}", e))?;
        self.period = config.fill_interval();

        tracing::debug!("Worker primed {} frames", writer.total_frames());
        self.producer = Some((writer, filler));
        Ok(())
    }

    fn fill(&mut self) {
        let Some((writer, filler)) = self.producer.as_mut() else {
            self.ticker = None;
            return;
        };
        match fill_guarded(filler.as_mut(), writer) {
            Ok(true) => {}
            Ok(false) => {
                let frames = writer.total_frames();
                tracing::debug!("Worker filler finished after {} frames", frames);
                self.finish(frames);
            }
            Err(e) => {
                tracing::warn!("Worker filler failed, stopping stream: {:#}", e);
                self.finish(0);
            }
        }
    }

    /// Stop ticking and ask the control side to stop at `stop_frames`
    fn finish(&mut self, stop_frames: u64) {
        self.ticker = None;
        let _ = self.replies.send(MessageToStrategy::Stop { stop_frames });
    }

    fn total_frames(&self) -> u64 {
        self.producer
            .as_ref()
            .map(|(writer, _)| writer.total_frames())
            .unwrap_or(0)
    }
}

/// Next tick of `ticker`, or never when there is none
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
