//! Sine Stream Demo
//!
//! Plays a sine tone through an output stream node for a few seconds.
//!
//! Usage: `sine-stream [timed|worker|manual] [seconds]`

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_output_stream::{
    buffer::FrameBufferWriter,
    config::AppConfig,
    host::RenderHost,
    strategy::{Filler, WorkerEntry},
    stream::{
        ManualBufferNodeParams, OutputStreamNode, StreamEvent, StreamNodeFactory,
        TimedBufferNodeParams, WorkerBufferNodeParams,
    },
};

/// Sine generator that ends after a fixed number of frames
struct SineFiller {
    frequency: f32,
    sample_rate: u32,
    phase: f32,
    remaining_frames: u64,
    scratch: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
struct SineParams {
    frequency: f32,
    sample_rate: u32,
    seconds: u64,
}

impl SineFiller {
    fn new(params: SineParams) -> Self {
        Self {
            frequency: params.frequency,
            sample_rate: params.sample_rate,
            phase: 0.0,
            remaining_frames: u64::from(params.sample_rate) * params.seconds,
            scratch: Vec::new(),
        }
    }
}

impl Filler for SineFiller {
    fn fill(&mut self, writer: &mut FrameBufferWriter) -> anyhow::Result<bool> {
        let frames = (writer.available_frames() as u64).min(self.remaining_frames) as usize;
        let channels = writer.channel_count();
        let step = std::f32::consts::TAU * self.frequency / self.sample_rate as f32;

        self.scratch.clear();
        for _ in 0..frames {
            let sample = self.phase.sin() * 0.2;
            self.scratch.extend(std::iter::repeat(sample).take(channels));
            self.phase = (self.phase + step) % std::f32::consts::TAU;
        }

        let written = writer.write_interleaved(&self.scratch)?;
        self.remaining_frames -= written as u64;
        Ok(self.remaining_frames > 0)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load_or_default().context("Failed to load config")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "timed".to_string());
    let seconds: u64 = match std::env::args().nth(2) {
        Some(arg) => arg.parse().context("Invalid duration")?,
        None => 3,
    };

    tracing::info!("Starting sine stream ({} mode, {} s)", mode, seconds);

    let peak = Arc::new(AtomicU32::new(0));
    let host = create_host(&config, peak.clone())?;
    let params = SineParams {
        frequency: 440.0,
        sample_rate: host.sample_rate(),
        seconds,
    };
    let timed = TimedBufferNodeParams {
        channel_count: config.host.channels,
        ..Default::default()
    };
    let factory = StreamNodeFactory::new(config.stream.clone())?;

    let node = match mode.as_str() {
        "timed" => {
            factory
                .create_timed_buffer_node(host, Box::new(SineFiller::new(params)), timed)
                .await?
        }
        "worker" => {
            let entry = WorkerEntry::new(|params: SineParams| Ok(SineFiller::new(params)));
            factory
                .create_worker_buffer_node(
                    host,
                    entry,
                    WorkerBufferNodeParams {
                        timed,
                        filler_params: params,
                    },
                )
                .await?
        }
        "manual" => {
            let frame_buffer_size = host.block_size() * 64;
            let (node, writer) = factory
                .create_manual_buffer_node(
                    host,
                    ManualBufferNodeParams {
                        channel_count: config.host.channels,
                        frame_buffer_size,
                    },
                )
                .await?;
            tokio::spawn(write_manually(node.clone(), writer, SineFiller::new(params)));
            node
        }
        other => anyhow::bail!("Unknown mode '{}', expected timed, worker or manual", other),
    };

    let mut events = node.subscribe();
    node.start()?;

    loop {
        tokio::select! {
            event = events.recv() => {
                if !handle_event(event) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                node.stop(0).await;
            }
        }
    }

    tracing::info!(
        "Played {} frames, peak level {:.3}",
        node.total_read_frames(),
        f32::from_bits(peak.load(Ordering::Relaxed))
    );
    Ok(())
}

/// Log one stream event. Returns `false` once playback is over.
fn handle_event(event: Result<StreamEvent, RecvError>) -> bool {
    match event {
        Ok(StreamEvent::Underrun { frames }) => {
            tracing::warn!("Underrun: {} frames", frames);
            true
        }
        Ok(StreamEvent::Stopped { frame }) => {
            tracing::info!("Stopped after {} frames", frame);
            false
        }
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!("Missed {} stream events", skipped);
            true
        }
        Err(RecvError::Closed) => {
            tracing::error!("Event stream closed");
            false
        }
    }
}

#[cfg(feature = "device-output")]
fn create_host(config: &AppConfig, _peak: Arc<AtomicU32>) -> Result<Box<dyn RenderHost>> {
    let host = audio_output_stream::host::DeviceRenderHost::new(config.host.block_size)?;
    tracing::info!("Output device: {} @ {} Hz", host.device_name(), host.sample_rate());
    Ok(Box::new(host))
}

#[cfg(not(feature = "device-output"))]
fn create_host(config: &AppConfig, peak: Arc<AtomicU32>) -> Result<Box<dyn RenderHost>> {
    use audio_output_stream::host::ThreadedRenderHost;

    let host = ThreadedRenderHost::new(config.host.sample_rate, config.host.block_size)
        .with_sink(move |block| {
            let level = block.peak();
            if level > f32::from_bits(peak.load(Ordering::Relaxed)) {
                peak.store(level.to_bits(), Ordering::Relaxed);
            }
        });
    Ok(Box::new(host))
}

/// Feed a manual node from the control runtime until the tone ends
async fn write_manually(
    node: OutputStreamNode,
    mut writer: FrameBufferWriter,
    mut filler: SineFiller,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(10));
    loop {
        ticker.tick().await;
        match filler.fill(&mut writer) {
            Ok(true) => {}
            Ok(false) => {
                let _ = node.stop(writer.total_frames());
                break;
            }
            Err(e) => {
                tracing::error!("Fill failed: {:#}", e);
                let _ = node.stop(0);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lagged_events_keep_playing() {
        assert!(handle_event(Err(RecvError::Lagged(12))));
        assert!(handle_event(Ok(StreamEvent::Underrun { frames: 64 })));
    }

    #[test]
    fn test_stop_or_close_ends_playback() {
        assert!(!handle_event(Ok(StreamEvent::Stopped { frame: 4800 })));
        assert!(!handle_event(Err(RecvError::Closed)));
    }
}
