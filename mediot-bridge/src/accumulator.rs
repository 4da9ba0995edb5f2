//! Per-device combination of vital samples and waveform frames.
//!
//! Vitals and waveforms arrive on independent topics at independent rates.
//! A device's batch is emitted once it holds at least one sample and a
//! waveform frame, so clients receive synchronized updates.

use std::collections::HashMap;

use mediot_common::{VitalSample, WaveformFrame};

/// Samples and waveform waiting to be emitted for one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBatch {
    pub device_id: String,
    pub samples: Vec<VitalSample>,
    pub waveform: Option<WaveformFrame>,
}

impl PendingBatch {
    fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            ..Default::default()
        }
    }

    /// Whether the batch holds both kinds of data.
    pub fn is_complete(&self) -> bool {
        !self.samples.is_empty() && self.waveform.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.waveform.is_none()
    }
}

/// Accumulates pending batches for every device.
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    batches: HashMap<String, PendingBatch>,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample to the device's pending batch.
    pub fn add_sample(&mut self, device_id: &str, sample: VitalSample) {
        self.batch_mut(device_id).samples.push(sample);
    }

    /// Set the device's pending waveform.
    ///
    /// A frame already pending is replaced and lost (last write wins).
    pub fn set_waveform(&mut self, device_id: &str, frame: WaveformFrame) {
        if let Some(dropped) = self.batch_mut(device_id).waveform.replace(frame) {
            tracing::debug!(
                device = %device_id,
                frame = dropped.id,
                "Replaced unflushed waveform frame"
            );
        }
    }

    /// Take the device's batch if it is complete.
    ///
    /// The returned batch is exactly what is removed from the accumulator.
    pub fn try_flush(&mut self, device_id: &str) -> Option<PendingBatch> {
        let batch = self.batches.get_mut(device_id)?;
        if !batch.is_complete() {
            return None;
        }
        Some(std::mem::replace(batch, PendingBatch::new(device_id)))
    }

    /// The device's pending batch, if any data is waiting.
    pub fn pending(&self, device_id: &str) -> Option<&PendingBatch> {
        self.batches.get(device_id).filter(|b| !b.is_empty())
    }

    fn batch_mut(&mut self, device_id: &str) -> &mut PendingBatch {
        self.batches
            .entry(device_id.to_string())
            .or_insert_with(|| PendingBatch::new(device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediot_common::VitalReadings;

    fn sample(id: u64) -> VitalSample {
        let readings = VitalReadings {
            timestamp: id as i64,
            temperature: Some(37.0),
            spo2: Some(98.0),
            non_invasive_blood_pressure: Some("120/80".to_string()),
            pulse_rate: Some(70.0),
            heart_rate: Some(72.0),
        };
        VitalSample::new(id, "M1", readings)
    }

    fn frame(id: u64, bytes: &[u8]) -> WaveformFrame {
        WaveformFrame::new(id, "M1", bytes.to_vec())
    }

    #[test]
    fn test_no_flush_with_samples_only() {
        let mut acc = BatchAccumulator::new();
        acc.add_sample("M1", sample(1));
        acc.add_sample("M1", sample(2));

        assert!(acc.try_flush("M1").is_none());
        assert_eq!(acc.pending("M1").unwrap().samples.len(), 2);
    }

    #[test]
    fn test_no_flush_with_waveform_only() {
        let mut acc = BatchAccumulator::new();
        acc.set_waveform("M1", frame(1, b"\x00"));

        assert!(acc.try_flush("M1").is_none());
        assert!(acc.pending("M1").unwrap().waveform.is_some());
    }

    #[test]
    fn test_flush_when_both_present() {
        let mut acc = BatchAccumulator::new();
        acc.add_sample("M1", sample(1));
        assert!(acc.try_flush("M1").is_none());
        acc.add_sample("M1", sample(2));
        assert!(acc.try_flush("M1").is_none());
        acc.set_waveform("M1", frame(3, b"\x00\x01"));

        let batch = acc.try_flush("M1").expect("complete batch");
        assert_eq!(batch.device_id, "M1");
        assert_eq!(
            batch.samples.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(batch.waveform.unwrap().raw_bytes, b"\x00\x01");

        // Reset after flush
        assert!(acc.pending("M1").is_none());
        assert!(acc.try_flush("M1").is_none());
    }

    #[test]
    fn test_waveform_first_then_sample() {
        let mut acc = BatchAccumulator::new();
        acc.set_waveform("M1", frame(1, b"\x01"));
        assert!(acc.try_flush("M1").is_none());
        acc.add_sample("M1", sample(2));

        let batch = acc.try_flush("M1").unwrap();
        assert_eq!(batch.samples.len(), 1);
        assert!(batch.waveform.is_some());
    }

    #[test]
    fn test_waveform_last_write_wins() {
        let mut acc = BatchAccumulator::new();
        acc.set_waveform("M1", frame(1, b"old"));
        acc.set_waveform("M1", frame(2, b"new"));
        acc.add_sample("M1", sample(3));

        let batch = acc.try_flush("M1").unwrap();
        let wave = batch.waveform.unwrap();
        assert_eq!(wave.id, 2);
        assert_eq!(wave.raw_bytes, b"new");
    }

    #[test]
    fn test_devices_are_independent() {
        let mut acc = BatchAccumulator::new();
        acc.add_sample("M1", sample(1));
        acc.set_waveform("M2", WaveformFrame::new(2, "M2", b"\x00".to_vec()));

        assert!(acc.try_flush("M1").is_none());
        assert!(acc.try_flush("M2").is_none());
        assert!(acc.try_flush("unknown").is_none());
    }

    #[test]
    fn test_flush_invariant_over_interleavings() {
        // Every sequence of 4 operations: true = sample, false = waveform.
        for mask in 0u8..16 {
            let mut acc = BatchAccumulator::new();
            let mut samples = 0usize;
            let mut has_wave = false;

            for step in 0..4u64 {
                if mask & (1 << step) != 0 {
                    acc.add_sample("M1", sample(step));
                    samples += 1;
                } else {
                    acc.set_waveform("M1", frame(step, b"w"));
                    has_wave = true;
                }

                let flushed = acc.try_flush("M1");
                if samples > 0 && has_wave {
                    let batch = flushed.expect("flush when both present");
                    assert_eq!(batch.samples.len(), samples);
                    samples = 0;
                    has_wave = false;
                    assert!(acc.try_flush("M1").is_none());
                } else {
                    assert!(flushed.is_none(), "mask {mask:04b} step {step}");
                }
            }
        }
    }
}
