//! Pipeline property tests
//!
//! Byte stream → framer → codec → queue → fusion, without hardware:
//! - Framing is independent of how reads are chunked
//! - The queue keeps the newest samples within its bound
//! - Gyroscope bias converges while stationary
//! - The orientation stays normalized under arbitrary input
//! - One packet goes from the wire to a single orientation update
//! - A resting sensor stays near identity end to end
//!
//! Run with: `cargo test --test pipeline`

use approx::assert_relative_eq;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use revex_io::config::FusionConfig;
use revex_io::core::types::{Quaternion, SensorSample, Vector3};
use revex_io::fusion::{Ahrs, AhrsConfig, FusionEngine, GyroBias};
use revex_io::protocol::constants::{DEFAULT_START_MARKER, PACKET_SIZE};
use revex_io::protocol::{FlexionCalibration, RawPacket, StreamFramer, decode};
use revex_io::queue::{PushOutcome, SampleQueue};
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn random_packet(rng: &mut SmallRng) -> RawPacket {
    let mut field = || rng.gen_range(i16::MIN..=i16::MAX);
    RawPacket::from_fields(
        field(),
        [field(), field(), field()],
        [field(), field(), field()],
        [field(), field(), field()],
    )
}

fn stream(packets: &[RawPacket]) -> Vec<u8> {
    packets.iter().flat_map(|p| p.as_bytes().to_vec()).collect()
}

/// Feed the marker on its own, then `bytes` split at the given chunk sizes.
fn frame(
    framer: &mut StreamFramer,
    bytes: &[u8],
    chunk_sizes: &mut dyn FnMut() -> usize,
) -> Vec<RawPacket> {
    let mut out = Vec::new();
    framer
        .feed(DEFAULT_START_MARKER.as_bytes(), |p| out.push(p))
        .unwrap();
    assert!(framer.is_synchronized());

    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + chunk_sizes()).min(bytes.len());
        framer.feed(&bytes[offset..end], |p| out.push(p)).unwrap();
        assert!(framer.pending_len() < PACKET_SIZE);
        offset = end;
    }
    out
}

fn resting_packet(flexion_adc: i16) -> RawPacket {
    // 1 g on Z, (30, 0, -35) µT
    RawPacket::from_fields(flexion_adc, [0, 0, 0], [0, 0, 8192], [200, 0, -233])
}

// ============================================================================
// Framing
// ============================================================================

#[test]
fn test_framing_byte_by_byte_matches_all_at_once() {
    let mut rng = SmallRng::seed_from_u64(7);
    let packets: Vec<RawPacket> = (0..100).map(|_| random_packet(&mut rng)).collect();
    let bytes = stream(&packets);

    let mut whole = StreamFramer::new(DEFAULT_START_MARKER.as_bytes(), 4096);
    let all_at_once = frame(&mut whole, &bytes, &mut || 4096);

    let mut single = StreamFramer::new(DEFAULT_START_MARKER.as_bytes(), 4096);
    let byte_by_byte = frame(&mut single, &bytes, &mut || 1);

    assert_eq!(all_at_once, packets);
    assert_eq!(byte_by_byte, packets);
}

#[test]
fn test_framing_random_chunks_default_capacity() {
    let mut rng = SmallRng::seed_from_u64(42);
    let packets: Vec<RawPacket> = (0..500).map(|_| random_packet(&mut rng)).collect();
    let bytes = stream(&packets);

    // Pending never exceeds 21 bytes, so chunks up to 29 fit the 50-byte buffer
    let mut framer = StreamFramer::default();
    let mut sizes = SmallRng::seed_from_u64(43);
    let framed = frame(&mut framer, &bytes, &mut || sizes.gen_range(1..=29));

    assert_eq!(framed.len(), packets.len());
    assert_eq!(framed, packets);
}

#[test]
fn test_marker_split_across_noise() {
    let packet = resting_packet(2000);
    let mut framer = StreamFramer::default();
    let mut out = Vec::new();

    // Line noise, then the marker split over two reads, then data
    framer.feed(b"\x00\xffDa", |p| out.push(p)).unwrap();
    framer.feed(b"ta Start", |p| out.push(p)).unwrap();
    assert!(framer.is_synchronized());
    framer.feed(packet.as_bytes(), |p| out.push(p)).unwrap();

    assert_eq!(out, vec![packet]);
}

// ============================================================================
// Queue
// ============================================================================

#[test]
fn test_queue_keeps_newest_in_order() {
    let queue = SampleQueue::new(100);
    let calibration = FlexionCalibration::default();
    let mut evicted = 0;

    for adc in 0..250i16 {
        let sample = decode(&resting_packet(adc), &calibration);
        if queue.push(sample) == PushOutcome::Evicted {
            evicted += 1;
        }
        assert!(queue.len() <= queue.capacity());
    }

    assert_eq!(evicted, 150);
    assert_eq!(queue.overflow_count(), 150);

    let drained = queue.drain_all();
    assert_eq!(drained.len(), 100);
    for (i, sample) in drained.iter().enumerate() {
        let expected = calibration.angle(150 + i as i16);
        assert_relative_eq!(sample.flexion_angle_deg, expected, epsilon = 1e-3);
    }
    assert!(queue.is_empty());
}

// ============================================================================
// Fusion
// ============================================================================

#[test]
fn test_bias_converges_while_stationary() {
    let true_bias = Vector3::new(0.5, -0.3, 0.2);
    let mut bias = GyroBias::new(2.0, 5.0, 0.02);
    let dt = 0.01;

    let mut previous_timer = 0.0;
    for _ in 0..6000 {
        bias.update(true_bias, dt);
        assert!(bias.stationary_timer() >= previous_timer);
        previous_timer = bias.stationary_timer();
    }

    assert!(bias.is_active());
    let estimate = bias.bias();
    assert_relative_eq!(estimate.x, true_bias.x, epsilon = 0.01);
    assert_relative_eq!(estimate.y, true_bias.y, epsilon = 0.01);
    assert_relative_eq!(estimate.z, true_bias.z, epsilon = 0.01);

    // One reading above threshold resets the timer
    bias.update(Vector3::new(50.0, 0.0, 0.0), dt);
    assert_eq!(bias.stationary_timer(), 0.0);
    assert!(!bias.is_active());
}

#[test]
fn test_quaternion_normalized_under_random_input() {
    let mut rng = SmallRng::seed_from_u64(1234);
    let mut ahrs = Ahrs::new(AhrsConfig::default());

    for _ in 0..5000 {
        let mut axis = |range: f32| {
            Vector3::new(
                rng.gen_range(-range..range),
                rng.gen_range(-range..range),
                rng.gen_range(-range..range),
            )
        };
        let gyro = axis(500.0);
        let accel = axis(4.0);
        let mag = axis(80.0);
        let dt = rng.gen_range(0.001..0.05);

        ahrs.update(gyro, accel, mag, dt);
        let q = ahrs.quaternion();
        assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-4);
        assert!(q.w.is_finite() && q.x.is_finite() && q.y.is_finite() && q.z.is_finite());
    }
}

#[test]
fn test_single_packet_end_to_end() {
    let mut framer = StreamFramer::default();
    let calibration = FlexionCalibration::default();
    let queue = SampleQueue::new(100);

    // (10, -20, 2) deg/s, 1 g on Z, (30, 0, -34.95) µT, 135 deg flexion
    let packet = RawPacket::from_fields(2172, [655, -1310, 131], [0, 0, 8192], [200, 0, -233]);
    assert_eq!(framer.feed(DEFAULT_START_MARKER.as_bytes(), |_| {}).unwrap(), 0);
    let emitted = framer
        .feed(packet.as_bytes(), |p| {
            queue.push(decode(&p, &calibration));
        })
        .unwrap();
    assert_eq!(emitted, 1);
    assert_eq!(framer.pending_len(), 0);

    let samples = queue.drain_all();
    assert_eq!(samples.len(), 1);
    let sample = samples[0];
    assert_relative_eq!(sample.angular_velocity.x, 10.0, epsilon = 1e-4);
    assert_relative_eq!(sample.angular_velocity.y, -20.0, epsilon = 1e-4);
    assert_relative_eq!(sample.angular_velocity.z, 2.0, epsilon = 1e-4);
    assert_eq!(sample.linear_acceleration, Vector3::new(0.0, 0.0, 1.0));
    assert_relative_eq!(sample.magnetic_field.x, 30.0, epsilon = 1e-3);
    assert_eq!(sample.magnetic_field.y, 0.0);
    assert_relative_eq!(sample.magnetic_field.z, -34.95, epsilon = 1e-3);
    assert_relative_eq!(sample.flexion_angle_deg, 135.0, epsilon = 1e-3);

    // Gyroscope integration only, over one 10 ms step
    let mut engine = FusionEngine::new(FusionConfig {
        gain: 0.0,
        ..Default::default()
    });
    let output = engine.process_batch(&samples, Duration::from_millis(10));
    assert_eq!(engine.sample_count(), 1);

    let half_step = 0.5 * 0.01 * std::f32::consts::PI / 180.0;
    let mut expected = Quaternion::new(1.0, 10.0 * half_step, -20.0 * half_step, 2.0 * half_step);
    expected.normalize();
    let q = output.orientation;
    assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-6);
    assert_relative_eq!(q.w, expected.w, epsilon = 1e-6);
    assert_relative_eq!(q.x, expected.x, epsilon = 1e-6);
    assert_relative_eq!(q.y, expected.y, epsilon = 1e-6);
    assert_relative_eq!(q.z, expected.z, epsilon = 1e-6);
    assert_relative_eq!(output.flexion_angle_deg, 135.0, epsilon = 1e-3);
}

#[test]
fn test_resting_sensor_end_to_end() {
    let config = FusionConfig {
        gain: 5.0,
        ..Default::default()
    };
    let mut engine = FusionEngine::new(config);
    let calibration = FlexionCalibration::default();
    let queue = SampleQueue::new(100);
    let mut framer = StreamFramer::default();

    let packets: Vec<RawPacket> = (0..10).map(|_| resting_packet(2172)).collect();
    let bytes = stream(&packets);
    framer.feed(DEFAULT_START_MARKER.as_bytes(), |_| {}).unwrap();

    // 50 ticks of 10 packets at 100 Hz
    for _ in 0..50 {
        for chunk in bytes.chunks(PACKET_SIZE) {
            framer
                .feed(chunk, |p| {
                    queue.push(decode(&p, &calibration));
                })
                .unwrap();
        }
        let samples: Vec<SensorSample> = queue.drain_all();
        assert_eq!(samples.len(), 10);
        engine.process_batch(&samples, Duration::from_millis(100));
    }

    let output = engine.output();
    let q = output.orientation;
    assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-5);
    assert!((q.w.abs() - 1.0).abs() < 1e-3, "orientation drifted: {:?}", q);

    let (roll, pitch, yaw) = output.euler.to_degrees();
    assert!(roll.abs() < 0.5 && pitch.abs() < 0.5 && yaw.abs() < 0.5);
    assert!(output.linear_acceleration.magnitude() < 1e-2);
    assert_relative_eq!(output.flexion_angle_deg, 135.0, epsilon = 1e-3);
    assert_relative_eq!(output.smoothed_flexion_deg, 135.0, epsilon = 1e-3);
    assert_eq!(engine.sample_count(), 500);
}
