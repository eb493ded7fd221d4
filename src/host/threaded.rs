//! Host that renders on a dedicated thread at the block cadence
//!
//! Each quantum is handed to an optional sink once the callback has filled
//! it, so a demo or soak test can observe the output without a device.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::buffer::OutputBlock;
use crate::error::StreamError;
use crate::host::{RenderCallback, RenderHost};

/// Receives every rendered block on the render thread
pub type BlockSink = Box<dyn FnMut(&OutputBlock) + Send>;

/// Fixed-cadence render thread
pub struct ThreadedRenderHost {
    sample_rate: u32,
    /// Frames per render quantum
    block_size: usize,
    /// Receives every rendered block; taken by the render thread on attach
    sink: Option<BlockSink>,
    /// Whether the render thread should keep running
    running: Arc<AtomicBool>,
    /// Quanta rendered since creation
    quanta: Arc<AtomicU64>,
    /// Render thread handle
    thread_handle: Option<JoinHandle<()>>,
}

impl ThreadedRenderHost {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            sink: None,
            running: Arc::new(AtomicBool::new(false)),
            quanta: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        }
    }

    /// Observe each rendered block
    pub fn with_sink(mut self, sink: impl FnMut(&OutputBlock) + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Wall-clock length of one quantum
    pub fn quantum_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate))
    }

    /// Quanta rendered so far
    pub fn quanta(&self) -> u64 {
        self.quanta.load(Ordering::Relaxed)
    }
}

impl RenderHost for ThreadedRenderHost {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn attach(
        &mut self,
        channel_count: usize,
        mut callback: Box<dyn RenderCallback>,
    ) -> Result<(), StreamError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(StreamError::Initialization(
                "render thread already running".to_string(),
            ));
        }
        // Reap a thread whose callback already finished
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        let running = self.running.clone();
        let quanta = self.quanta.clone();
        let period = self.quantum_duration();
        let mut sink = self.sink.take();
        let mut block = OutputBlock::new(channel_count, self.block_size);

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("render-host".to_string())
            .spawn(move || {
                let mut deadline = Instant::now();
                while running.load(Ordering::Relaxed) {
                    let keep_going = callback.process(&mut block);
                    quanta.fetch_add(1, Ordering::Relaxed);
                    if let Some(sink) = sink.as_mut() {
                        sink(&block);
                    }
                    if !keep_going {
                        running.store(false, Ordering::SeqCst);
                        break;
                    }

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        // Fell behind; resync rather than burst
                        deadline = now;
                    }
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                StreamError::Initialization(e.to_string())
            })?;

        self.thread_handle = Some(handle);
        Ok(())
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

impl Drop for ThreadedRenderHost {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Limited {
        remaining: usize,
    }

    impl RenderCallback for Limited {
        fn process(&mut self, output: &mut OutputBlock) -> bool {
            output.channel_mut(0).fill(0.25);
            self.remaining -= 1;
            self.remaining > 0
        }
    }

    #[test]
    fn test_runs_until_callback_finishes() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_sink = seen.clone();
        let mut host = ThreadedRenderHost::new(48000, 48).with_sink(move |block| {
            assert_eq!(block.channel(0), &[0.25; 48]);
            seen_in_sink.fetch_add(1, Ordering::SeqCst);
        });

        host.attach(1, Box::new(Limited { remaining: 5 })).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while host.is_attached() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(!host.is_attached());
        assert_eq!(host.quanta(), 5);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_detach_stops_thread() {
        let mut host = ThreadedRenderHost::new(48000, 128);
        host.attach(2, Box::new(Limited { remaining: usize::MAX })).unwrap();
        assert!(host.is_attached());

        host.detach();
        assert!(!host.is_attached());
    }

    #[test]
    fn test_quantum_duration() {
        let host = ThreadedRenderHost::new(48000, 480);
        assert_eq!(host.quantum_duration(), Duration::from_millis(10));
    }
}
