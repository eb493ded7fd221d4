//! Property tests for the frame ring buffer counters and ordering

use audio_output_stream::buffer::{frame_buffer_size, FrameBufferConfig};
use audio_output_stream::error::BufferError;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Write(usize),
    Read(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![(0usize..200).prop_map(Op::Write), (0usize..200).prop_map(Op::Read)]
}

proptest! {
    #[test]
    fn test_counters_and_order_hold(
        capacity in 1usize..160,
        channels in 1usize..4,
        ops in prop::collection::vec(op(), 1..64),
    ) {
        let config = FrameBufferConfig::new(capacity, channels).unwrap();
        let mut writer = config.create_writer().unwrap();
        let mut reader = config.create_reader().unwrap();
        let mut next_written = 0u64;
        let mut next_read = 0u64;

        for op in ops {
            match op {
                Op::Write(frames) => {
                    let expected = frames.min(writer.available_frames());
                    let samples: Vec<f32> = (0..frames as u64)
                        .flat_map(|i| std::iter::repeat((next_written + i) as f32).take(channels))
                        .collect();
                    let written = writer.write_interleaved(&samples).unwrap();
                    prop_assert_eq!(written, expected);
                    next_written += written as u64;
                }
                Op::Read(frames) => {
                    let expected = frames.min(reader.available_frames());
                    let mut target = vec![-1.0; frames * channels];
                    let read = reader.read_interleaved(&mut target).unwrap();
                    prop_assert_eq!(read, expected);
                    for (i, frame) in target[..read * channels].chunks_exact(channels).enumerate() {
                        let value = (next_read + i as u64) as f32;
                        prop_assert!(frame.iter().all(|&sample| sample == value));
                    }
                    next_read += read as u64;
                }
            }

            let usage = config.usage();
            prop_assert!(usage <= capacity);
            prop_assert!(config.total_read_frames() <= config.total_write_frames());
            prop_assert_eq!(config.total_write_frames() - config.total_read_frames(), usage as u64);
            prop_assert_eq!(config.total_write_frames(), next_written);
            prop_assert_eq!(config.total_read_frames(), next_read);
        }
    }

    #[test]
    fn test_overrun_changes_nothing(
        capacity in 1usize..64,
        prefill in 0usize..64,
        excess in 1usize..8,
    ) {
        let config = FrameBufferConfig::new(capacity, 1).unwrap();
        let mut writer = config.create_writer().unwrap();
        writer.write_interleaved(&vec![0.0; prefill]).unwrap();
        let before = (config.usage(), config.total_write_frames());

        let result = writer.write(|segment, _| segment.frames() + excess);

        let is_overrun = matches!(result, Err(BufferError::SegmentOverrun { .. }));
        if writer.available_frames() == 0 {
            prop_assert_eq!(result, Ok(0));
        } else {
            prop_assert!(is_overrun);
        }
        prop_assert_eq!((config.usage(), config.total_write_frames()), before);
    }

    #[test]
    fn test_buffer_size_covers_chunks(
        sample_rate in 8000u32..192_000,
        interval_ms in 1u32..100,
        chunks in 1u32..10,
        block_size in prop::sample::select(vec![32usize, 64, 128, 256]),
    ) {
        let frames = frame_buffer_size(sample_rate, interval_ms, chunks, block_size);
        let interval_frames = sample_rate as usize * interval_ms as usize / 1000;

        prop_assert_eq!(frames % block_size, 0);
        prop_assert!(frames >= interval_frames * chunks as usize);
        prop_assert!(frames < (interval_frames + block_size) * chunks as usize);
    }
}

#[test]
fn test_round_trips_across_wraparound() {
    for total in [100usize, 512, 513, 1025] {
        let config = FrameBufferConfig::new(512, 2).unwrap();
        let mut writer = config.create_writer().unwrap();
        let mut reader = config.create_reader().unwrap();
        let source: Vec<f32> = (0..total * 2).map(|i| i as f32).collect();
        let mut received = Vec::with_capacity(source.len());
        let mut chunk = vec![0.0; 96 * 2];

        let mut offset = 0;
        while received.len() < source.len() {
            offset += writer.write_interleaved(&source[offset * 2..]).unwrap();
            let read = reader.read_interleaved(&mut chunk).unwrap();
            received.extend_from_slice(&chunk[..read * 2]);
        }

        assert_eq!(received, source, "round trip of {} frames", total);
        assert_eq!(config.usage(), 0);
    }
}
