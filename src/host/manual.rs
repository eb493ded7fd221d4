//! Host driven by explicit `render()` calls
//!
//! Stands in for the real-time scheduler in tests: each call runs exactly
//! one render quantum on the calling thread.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::buffer::OutputBlock;
use crate::error::StreamError;
use crate::host::{RenderCallback, RenderHost};

struct ManualHostState {
    callback: Option<Box<dyn RenderCallback>>,
    block: Option<OutputBlock>,
    quanta: u64,
}

/// Cloneable manually clocked host. Clones share the attached callback, so
/// a test can keep one clone while the stream node owns another.
#[derive(Clone)]
pub struct ManualRenderHost {
    sample_rate: u32,
    block_size: usize,
    state: Arc<Mutex<ManualHostState>>,
}

impl ManualRenderHost {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            state: Arc::new(Mutex::new(ManualHostState {
                callback: None,
                block: None,
                quanta: 0,
            })),
        }
    }

    /// Run one render quantum. Returns `true` if the callback ran and wants
    /// to keep going; a callback that returns `false` is dropped.
    pub fn render(&self) -> bool {
        let mut state = self.state.lock();
        let ManualHostState {
            callback,
            block,
            quanta,
        } = &mut *state;
        let (Some(active), Some(block)) = (callback.as_mut(), block.as_mut()) else {
            return false;
        };
        *quanta += 1;
        let keep_going = active.process(block);
        if !keep_going {
            *callback = None;
        }
        keep_going
    }

    /// Run up to `count` quanta, stopping early once the callback finishes.
    /// Returns the number of quanta run.
    pub fn render_quanta(&self, count: usize) -> usize {
        let mut ran = 0;
        for _ in 0..count {
            let attached = self.state.lock().callback.is_some();
            if !attached {
                break;
            }
            ran += 1;
            if !self.render() {
                break;
            }
        }
        ran
    }

    /// Copy of the most recently rendered block
    pub fn last_block(&self) -> Option<OutputBlock> {
        self.state.lock().block.clone()
    }

    /// Quanta rendered so far
    pub fn quanta(&self) -> u64 {
        self.state.lock().quanta
    }
}

impl RenderHost for ManualRenderHost {
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
        let mut state = self.state.lock();
        if state.callback.is_some() {
            return Err(StreamError::Initialization(
                "host already has a render callback".to_string(),
            ));
        }
        state.callback = Some(callback);
        state.block = Some(OutputBlock::new(channel_count, self.block_size));
        Ok(())
    }

    fn detach(&mut self) {
        self.state.lock().callback = None;
    }

    fn is_attached(&self) -> bool {
        self.state.lock().callback.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountDown(u32);

    impl RenderCallback for CountDown {
        fn process(&mut self, output: &mut OutputBlock) -> bool {
            output.channel_mut(0).fill(self.0 as f32);
            self.0 = self.0.saturating_sub(1);
            self.0 > 0
        }
    }

    #[test]
    fn test_render_until_finished() {
        let mut host = ManualRenderHost::new(48000, 4);
        host.attach(1, Box::new(CountDown(3))).unwrap();

        assert_eq!(host.render_quanta(10), 3);
        assert!(!host.is_attached());
        assert_eq!(host.quanta(), 3);
        assert_eq!(host.last_block().unwrap().channel(0), &[1.0; 4]);
        assert!(!host.render());
    }

    #[test]
    fn test_double_attach_rejected() {
        let mut host = ManualRenderHost::new(48000, 4);
        host.attach(1, Box::new(CountDown(3))).unwrap();
        assert!(host.attach(1, Box::new(CountDown(3))).is_err());

        host.detach();
        assert!(!host.is_attached());
        assert!(host.attach(1, Box::new(CountDown(3))).is_ok());
    }
}
