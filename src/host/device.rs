//! Host that plays to the default output device through cpal
//!
//! The cpal stream lives on its own thread, as the stream handle is not
//! `Send` on every platform. Fixed-size render blocks are adapted to the
//! device's variable callback buffers.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::buffer::OutputBlock;
use crate::error::StreamError;
use crate::host::{RenderCallback, RenderHost};

/// Default output device host
pub struct DeviceRenderHost {
    device_name: String,
    sample_rate: u32,
    block_size: usize,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DeviceRenderHost {
    /// Open the default output device at its default sample rate
    pub fn new(block_size: usize) -> Result<Self, StreamError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| StreamError::Initialization("No default output device".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| StreamError::Initialization(e.to_string()))?;

        Ok(Self {
            device_name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate: config.sample_rate().0,
            block_size,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// Feeds interleaved device buffers from fixed-size render blocks
struct BlockAdapter {
    callback: Box<dyn RenderCallback>,
    block: OutputBlock,
    cursor: usize,
    finished: bool,
    running: Arc<AtomicBool>,
}

impl BlockAdapter {
    fn fill(&mut self, data: &mut [f32]) {
        let channels = self.block.channel_count();
        let mut written = 0;
        while written < data.len() {
            if self.cursor >= self.block.frames() {
                if self.finished || !self.running.load(Ordering::Relaxed) {
                    data[written..].fill(0.0);
                    return;
                }
                // The final block is still played out
                if !self.callback.process(&mut self.block) {
                    self.finished = true;
                    self.running.store(false, Ordering::SeqCst);
                }
                self.cursor = 0;
            }
            let frames = self.block.interleave_into(self.cursor, &mut data[written..]);
            if frames == 0 {
                data[written..].fill(0.0);
                return;
            }
            self.cursor += frames;
            written += frames * channels;
        }
    }
}

impl RenderHost for DeviceRenderHost {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn attach(
        &mut self,
        channel_count: usize,
        callback: Box<dyn RenderCallback>,
    ) -> Result<(), StreamError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(StreamError::Initialization(
                "output stream already running".to_string(),
            ));
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let config = cpal::StreamConfig {
            channels: channel_count as u16,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let mut adapter = BlockAdapter {
            callback,
            block: OutputBlock::new(channel_count, self.block_size),
            cursor: self.block_size,
            finished: false,
            running: running.clone(),
        };

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("device-output".to_string())
            .spawn(move || {
                let device = match cpal::default_host().default_output_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err("No default output device".to_string()));
                        return;
                    }
                };

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| adapter.fill(data),
                    move |err| {
                        tracing::error!("Output stream error: {}", err);
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                        let _ = ready_tx.send(Ok(()));

                        // Keep the stream alive while running
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                    }
                }
            })
            .map_err(|e| StreamError::Initialization(e.to_string()))?;

        self.thread_handle = Some(handle);

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::debug!("Output stream started on {}", self.device_name);
                Ok(())
            }
            Ok(Err(reason)) => {
                self.detach();
                Err(StreamError::Initialization(reason))
            }
            Err(_) => {
                self.detach();
                Err(StreamError::Initialization("output thread exited".to_string()))
            }
        }
    }

    fn detach(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    fn is_attached(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceRenderHost {
    fn drop(&mut self) {
        self.detach();
    }
}
