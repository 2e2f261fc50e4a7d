//! Bookkeeping of sweeps by epoch, and of the batch numbers each sweep contributes to the
//! scaled data.
//!
//! Sweeps are keyed by their epoch (the time at which the first image was collected), so
//! iterating the handler visits them in the order they were measured. Before scaling every
//! sweep is given a contiguous range of batch numbers; the ranges are disjoint and ascend
//! with epoch, which makes a linear, first-match scan enough to find the owner of a batch.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;

use super::error::SweepError;

/// Batches from consecutive sweeps are separated onto multiples of this
const BATCH_BLOCK: u32 = 1000;

/// An inclusive range of batch numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRange {
    pub first: u32,
    pub last: u32,
}

impl BatchRange {
    pub fn new(first: u32, last: u32) -> Result<Self, SweepError> {
        if first > last {
            return Err(SweepError::InvalidRange(first, last));
        }
        Ok(Self { first, last })
    }

    pub fn contains(&self, batch: u32) -> bool {
        batch >= self.first && batch <= self.last
    }

    pub fn overlaps(&self, other: &BatchRange) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    pub fn number_of_batches(&self) -> u32 {
        self.last - self.first + 1
    }
}

impl Display for BatchRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// Everything the scaler needs to know about one integrated sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepInformation {
    pub sweep_name: String,
    /// First and last image, inclusive
    pub image_range: (u32, u32),
    #[serde(default)]
    pub batch_range: Option<BatchRange>,
    #[serde(default)]
    pub integrated_experiments: Option<PathBuf>,
    #[serde(default)]
    pub integrated_reflections: Option<PathBuf>,
    #[serde(default)]
    pub integrated_mtz: Option<PathBuf>,
}

impl SweepInformation {
    pub fn new(sweep_name: &str, first_image: u32, last_image: u32) -> Result<Self, SweepError> {
        if first_image > last_image {
            return Err(SweepError::InvalidRange(first_image, last_image));
        }
        Ok(Self {
            sweep_name: sweep_name.to_string(),
            image_range: (first_image, last_image),
            batch_range: None,
            integrated_experiments: None,
            integrated_reflections: None,
            integrated_mtz: None,
        })
    }

    /// Fails for an inverted image range, which can only come from a hand edited project
    pub fn number_of_images(&self) -> Result<u32, SweepError> {
        let (first, last) = self.image_range;
        if first > last {
            return Err(SweepError::InvalidRange(first, last));
        }
        (last - first)
            .checked_add(1)
            .ok_or(SweepError::InvalidRange(first, last))
    }
}

/// The sweeps of one crystal, keyed by epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SweepHandler {
    sweeps: BTreeMap<u64, SweepInformation>,
}

impl SweepHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sweep(&mut self, epoch: u64, sweep: SweepInformation) -> Result<(), SweepError> {
        if self.sweeps.contains_key(&epoch) {
            return Err(SweepError::DuplicateEpoch(epoch));
        }
        self.sweeps.insert(epoch, sweep);
        Ok(())
    }

    /// All epochs, earliest first
    pub fn get_epochs(&self) -> Vec<u64> {
        self.sweeps.keys().copied().collect()
    }

    pub fn get_sweep_information(&self, epoch: u64) -> Result<&SweepInformation, SweepError> {
        self.sweeps
            .get(&epoch)
            .ok_or(SweepError::UnknownEpoch(epoch))
    }

    pub fn sweeps(&self) -> impl Iterator<Item = (&u64, &SweepInformation)> {
        self.sweeps.iter()
    }

    pub fn len(&self) -> usize {
        self.sweeps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sweeps.is_empty()
    }

    pub fn set_batch_range(&mut self, epoch: u64, first: u32, last: u32) -> Result<(), SweepError> {
        let range = BatchRange::new(first, last)?;
        let sweep = self
            .sweeps
            .get_mut(&epoch)
            .ok_or(SweepError::UnknownEpoch(epoch))?;
        sweep.batch_range = Some(range);
        Ok(())
    }

    /// Give every sweep a batch range, in epoch order.
    ///
    /// The first sweep starts at batch 1, every later one at one past the next multiple of
    /// 1000 above the last batch of the sweep before it. The number of batches of a sweep
    /// is its number of images. Nothing is assigned if any sweep has a bad image range or
    /// the batch numbers run past `u32::MAX`.
    pub fn assign_batches(&mut self) -> Result<(), SweepError> {
        let mut ranges = Vec::with_capacity(self.sweeps.len());
        let mut previous_last: Option<u32> = None;
        for (epoch, sweep) in self.sweeps.iter() {
            let first = match previous_last {
                Some(last) => (last / BATCH_BLOCK + 1)
                    .checked_mul(BATCH_BLOCK)
                    .and_then(|block| block.checked_add(1))
                    .ok_or(SweepError::BatchOverflow(*epoch))?,
                None => 1,
            };
            let last = first
                .checked_add(sweep.number_of_images()? - 1)
                .ok_or(SweepError::BatchOverflow(*epoch))?;
            ranges.push(BatchRange { first, last });
            previous_last = Some(last);
        }

        for ((epoch, sweep), range) in self.sweeps.iter_mut().zip(ranges) {
            spdlog::debug!(
                "Sweep {} (epoch {epoch}) assigned batches {range}",
                sweep.sweep_name
            );
            sweep.batch_range = Some(range);
        }
        Ok(())
    }

    /// Check that every sweep has a sane image range and a batch range, and that the batch
    /// ranges ascend with epoch without overlapping
    pub fn validate(&self) -> Result<(), SweepError> {
        let mut previous: Option<(u64, BatchRange)> = None;
        for (epoch, sweep) in self.sweeps.iter() {
            sweep.number_of_images()?;
            let range = sweep.batch_range.ok_or(SweepError::Unassigned(*epoch))?;
            if let Some((previous_epoch, previous_range)) = previous {
                if range.overlaps(&previous_range) {
                    return Err(SweepError::Overlap(*epoch, previous_epoch));
                }
                if range.first < previous_range.first {
                    return Err(SweepError::OutOfOrder(*epoch, previous_epoch));
                }
            }
            previous = Some((*epoch, range));
        }
        Ok(())
    }

    /// Batch ranges paired with the epoch of the sweep they belong to, in epoch order.
    /// Sweeps without a batch range are left out.
    pub fn batch_map(&self) -> Vec<(BatchRange, u64)> {
        self.sweeps
            .iter()
            .filter_map(|(epoch, sweep)| sweep.batch_range.map(|range| (range, *epoch)))
            .collect()
    }

    /// The epoch of the sweep which contributed a batch, None if no range contains it
    pub fn find_batch(&self, batch: u32) -> Option<u64> {
        self.batch_map()
            .into_iter()
            .find(|(range, _)| range.contains(batch))
            .map(|(_, epoch)| epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_sweeps() -> SweepHandler {
        let mut handler = SweepHandler::new();
        handler
            .add_sweep(1_400_000_300, SweepInformation::new("SWEEP3", 1, 90).unwrap())
            .unwrap();
        handler
            .add_sweep(1_400_000_100, SweepInformation::new("SWEEP1", 1, 360).unwrap())
            .unwrap();
        handler
            .add_sweep(1_400_000_200, SweepInformation::new("SWEEP2", 11, 1010).unwrap())
            .unwrap();
        handler
    }

    #[test]
    fn test_epochs_ascend() {
        let handler = three_sweeps();
        assert_eq!(
            handler.get_epochs(),
            [1_400_000_100, 1_400_000_200, 1_400_000_300]
        );
        assert_eq!(
            handler
                .get_sweep_information(1_400_000_200)
                .unwrap()
                .sweep_name,
            "SWEEP2"
        );
        assert!(matches!(
            handler.get_sweep_information(5),
            Err(SweepError::UnknownEpoch(5))
        ));
    }

    #[test]
    fn test_duplicate_epoch() {
        let mut handler = three_sweeps();
        assert!(matches!(
            handler.add_sweep(1_400_000_100, SweepInformation::new("AGAIN", 1, 10).unwrap()),
            Err(SweepError::DuplicateEpoch(1_400_000_100))
        ));
        assert_eq!(handler.len(), 3);
    }

    #[test]
    fn test_assign_batches() {
        let mut handler = three_sweeps();
        assert!(matches!(handler.validate(), Err(SweepError::Unassigned(_))));
        handler.assign_batches().unwrap();
        let ranges: Vec<BatchRange> = handler.batch_map().into_iter().map(|(r, _)| r).collect();
        assert_eq!(
            ranges,
            [
                BatchRange { first: 1, last: 360 },
                BatchRange { first: 1001, last: 2000 },
                BatchRange { first: 3001, last: 3090 },
            ]
        );
        assert!(handler.validate().is_ok());
    }

    #[test]
    fn test_find_batch() {
        let mut handler = three_sweeps();
        handler.assign_batches().unwrap();
        assert_eq!(handler.find_batch(1), Some(1_400_000_100));
        assert_eq!(handler.find_batch(360), Some(1_400_000_100));
        assert_eq!(handler.find_batch(2000), Some(1_400_000_200));
        assert_eq!(handler.find_batch(3050), Some(1_400_000_300));
        assert_eq!(handler.find_batch(0), None);
        assert_eq!(handler.find_batch(361), None);
        assert_eq!(handler.find_batch(5000), None);
    }

    #[test]
    fn test_validate_catches_bad_ranges() {
        let mut handler = three_sweeps();
        handler.set_batch_range(1_400_000_100, 1, 360).unwrap();
        handler.set_batch_range(1_400_000_200, 300, 400).unwrap();
        handler.set_batch_range(1_400_000_300, 5001, 5090).unwrap();
        assert!(matches!(
            handler.validate(),
            Err(SweepError::Overlap(1_400_000_200, 1_400_000_100))
        ));

        handler.set_batch_range(1_400_000_200, 6001, 7000).unwrap();
        assert!(matches!(
            handler.validate(),
            Err(SweepError::OutOfOrder(1_400_000_300, 1_400_000_200))
        ));

        assert!(matches!(
            handler.set_batch_range(1_400_000_200, 10, 1),
            Err(SweepError::InvalidRange(10, 1))
        ));
        assert!(matches!(
            handler.set_batch_range(7, 1, 10),
            Err(SweepError::UnknownEpoch(7))
        ));
    }

    #[test]
    fn test_inverted_image_range_from_json() {
        let json = r#"{"1400000100": {"sweep_name": "SWEEP1", "image_range": [10, 1]}}"#;
        let mut handler: SweepHandler = serde_json::from_str(json).unwrap();
        assert!(matches!(
            handler.assign_batches(),
            Err(SweepError::InvalidRange(10, 1))
        ));
        assert!(handler.batch_map().is_empty());
        assert!(matches!(
            handler.validate(),
            Err(SweepError::InvalidRange(10, 1))
        ));
    }

    #[test]
    fn test_batch_overflow() {
        let mut handler = SweepHandler::new();
        handler
            .add_sweep(1, SweepInformation::new("SWEEP1", 1, 360).unwrap())
            .unwrap();
        handler
            .add_sweep(2, SweepInformation::new("HUGE", 0, u32::MAX - 10).unwrap())
            .unwrap();
        assert!(matches!(
            handler.assign_batches(),
            Err(SweepError::BatchOverflow(2))
        ));

        let mut handler = SweepHandler::new();
        handler
            .add_sweep(1, SweepInformation::new("ALL", 0, u32::MAX).unwrap())
            .unwrap();
        assert!(matches!(
            handler.assign_batches(),
            Err(SweepError::InvalidRange(0, u32::MAX))
        ));
    }

    #[test]
    fn test_batch_range() {
        let range = BatchRange::new(1001, 1360).unwrap();
        assert_eq!(range.number_of_batches(), 360);
        assert!(range.contains(1001) && range.contains(1360));
        assert!(!range.contains(1000) && !range.contains(1361));
        assert!(range.overlaps(&BatchRange::new(1360, 1400).unwrap()));
        assert!(!range.overlaps(&BatchRange::new(1361, 1400).unwrap()));
        assert_eq!(range.to_string(), "1001-1360");
    }
}
