use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use domain::Reading;

/// Readings waiting for the next flush, one merged reading per remote device
#[derive(Debug, Default)]
pub struct PendingBatch {
    readings: BTreeMap<String, Reading>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a reading into its device's pending entry
    pub fn merge(&mut self, reading: Reading) {
        match self.readings.entry(reading.device_id.clone()) {
            Entry::Occupied(mut pending) => pending.get_mut().merge(reading),
            Entry::Vacant(slot) => {
                slot.insert(reading);
            }
        }
    }

    /// Number of distinct devices pending
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn get(&self, device_id: &str) -> Option<&Reading> {
        self.readings.get(device_id)
    }

    /// Take everything, leaving the batch empty
    pub fn drain(&mut self) -> Vec<Reading> {
        std::mem::take(&mut self.readings).into_values().collect()
    }

    /// Put back readings from a failed flush. Values recorded since the
    /// drain win over the requeued ones; devices no longer in `active` are
    /// dropped. Returns how many readings were requeued.
    pub fn requeue(&mut self, failed: Vec<Reading>, active: &HashSet<String>) -> usize {
        let mut requeued = 0;
        for mut reading in failed {
            if !active.contains(&reading.device_id) {
                continue;
            }
            if let Some(newer) = self.readings.remove(&reading.device_id) {
                reading.merge(newer);
            }
            self.readings.insert(reading.device_id.clone(), reading);
            requeued += 1;
        }
        requeued
    }

    /// Drop readings for devices outside `active`. Returns how many were dropped.
    pub fn retain_devices(&mut self, active: &HashSet<String>) -> usize {
        let before = self.readings.len();
        self.readings.retain(|device_id, _| active.contains(device_id));
        before - self.readings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power(device_id: &str, watts: f64) -> Reading {
        Reading {
            power_w: Some(watts),
            ..Reading::new(device_id)
        }
    }

    fn active(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_per_device() {
        let mut batch = PendingBatch::new();
        batch.merge(power("remote-1", 100.0));
        batch.merge(Reading {
            temperature_c: Some(60.0),
            ..Reading::new("remote-1")
        });
        batch.merge(power("remote-2", 5.0));

        assert_eq!(batch.len(), 2);
        let merged = batch.get("remote-1").unwrap();
        assert_eq!(merged.power_w, Some(100.0));
        assert_eq!(merged.temperature_c, Some(60.0));
    }

    #[test]
    fn test_drain_empties() {
        let mut batch = PendingBatch::new();
        batch.merge(power("remote-1", 100.0));
        assert_eq!(batch.drain().len(), 1);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_requeue_keeps_newer_values_and_drops_unmapped() {
        let mut batch = PendingBatch::new();
        batch.merge(power("remote-1", 100.0));
        batch.merge(power("remote-9", 1.0));
        let failed = batch.drain();

        batch.merge(power("remote-1", 250.0));
        let requeued = batch.requeue(failed, &active(&["remote-1"]));

        assert_eq!(requeued, 1);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get("remote-1").unwrap().power_w, Some(250.0));
    }

    #[test]
    fn test_retain_devices() {
        let mut batch = PendingBatch::new();
        batch.merge(power("remote-1", 1.0));
        batch.merge(power("remote-2", 2.0));
        assert_eq!(batch.retain_devices(&active(&["remote-2"])), 1);
        assert!(batch.get("remote-1").is_none());
    }
}
