//! Heartbeat intervals from the BioHarness RR channel
//!
//! The RR channel repeats the latest R-R interval at 18 Hz and flips its
//! sign on every new beat, so each sign change marks one interval.

use crate::types::SignalPacket;

#[derive(Debug, Clone, Default)]
pub struct RrIntervalDetector {
    latest_sign: i8,
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

impl RrIntervalDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract `(timestamp, interval_secs)` events from an RR packet
    ///
    /// The first sample of a packet that starts a new segment only primes
    /// the sign, since the previous sign belongs to a lost stretch.
    pub fn process(&mut self, packet: &SignalPacket, starts_new_segment: bool) -> Vec<(f64, f64)> {
        let mut intervals = Vec::new();

        for (i, value) in packet.samples.iter().enumerate() {
            let Some(value) = value.as_scalar() else { continue };
            let value_sign = sign(value);
            let discontinuity = i == 0 && starts_new_segment;

            if value_sign != self.latest_sign && !discontinuity {
                intervals.push((packet.sample_timestamp(i), value.abs()));
            }
            self.latest_sign = value_sign;
        }

        intervals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SampleValue, SignalKind};

    fn rr_packet(timestamp: f64, values: &[f64]) -> SignalPacket {
        let samples = values.iter().map(|&v| SampleValue::Scalar(v)).collect();
        SignalPacket::new(SignalKind::Rr, timestamp, samples, 0)
    }

    #[test]
    fn sign_flips_emit_intervals() {
        let mut detector = RrIntervalDetector::new();
        let packet = rr_packet(100.0, &[0.8, 0.8, -0.81, -0.81, -0.81, 0.79]);
        let intervals = detector.process(&packet, false);

        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0], (100.0, 0.8));
        assert!((intervals[1].0 - (100.0 + 2.0 / 18.0)).abs() < 1e-12);
        assert_eq!(intervals[1].1, 0.81);
        assert!((intervals[2].0 - (100.0 + 5.0 / 18.0)).abs() < 1e-12);
    }

    #[test]
    fn new_segment_primes_without_emitting() {
        let mut detector = RrIntervalDetector::new();
        let intervals = detector.process(&rr_packet(0.0, &[0.9, 0.9, -0.9]), true);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].1, 0.9);
    }

    #[test]
    fn sign_carries_across_packets() {
        let mut detector = RrIntervalDetector::new();
        detector.process(&rr_packet(0.0, &[0.7, 0.7]), true);
        assert!(detector.process(&rr_packet(1.0, &[0.7, 0.7]), false).is_empty());
        assert_eq!(detector.process(&rr_packet(2.0, &[-0.75]), false), vec![(2.0, 0.75)]);
    }
}
