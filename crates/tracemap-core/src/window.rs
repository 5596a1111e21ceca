//! Time windows - fixed-size buckets over a query range
//!
//! A [`TimeWindow`] snaps a query [`Range`] onto bucket boundaries. The
//! bucket width is chosen by a [`WindowSampler`] so that long ranges get
//! coarser buckets and the bucket count stays bounded.

use crate::error::{TopologyError, TopologyResult};
use crate::range::Range;
use serde::Serialize;

pub const ONE_MINUTE: i64 = 60_000;
pub const ONE_HOUR: i64 = ONE_MINUTE * 60;
pub const ONE_DAY: i64 = ONE_HOUR * 24;

/// Default upper bound on buckets per window
pub const DEFAULT_MAX_BUCKETS: usize = 200;

/// Maps a range's duration to a bucket width in milliseconds
pub trait WindowSampler: Send + Sync {
    fn window_size(&self, range: &Range) -> i64;
}

/// Step-function sampler: 1 minute buckets up to an hour, growing with the range
#[derive(Debug, Clone)]
pub struct DownSampler {
    max_buckets: usize,
}

impl DownSampler {
    pub fn new(max_buckets: usize) -> Self {
        Self {
            // two slack buckets cover the partial slots at each end
            max_buckets: max_buckets.max(3),
        }
    }
}

impl Default for DownSampler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUCKETS)
    }
}

impl WindowSampler for DownSampler {
    fn window_size(&self, range: &Range) -> i64 {
        let diff = range.duration();
        if diff <= ONE_HOUR {
            ONE_MINUTE
        } else if diff <= ONE_HOUR * 6 {
            ONE_MINUTE * 5
        } else if diff <= ONE_HOUR * 12 {
            ONE_MINUTE * 10
        } else if diff <= ONE_DAY {
            ONE_MINUTE * 20
        } else if diff <= ONE_DAY * 2 {
            ONE_MINUTE * 30
        } else {
            let spans = (self.max_buckets - 2) as i64;
            let hours = div_ceil(div_ceil(diff, spans), ONE_HOUR);
            hours.max(1) * ONE_HOUR
        }
    }
}

/// Sampler with a constant bucket width
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub i64);

impl WindowSampler for FixedSampler {
    fn window_size(&self, _range: &Range) -> i64 {
        self.0
    }
}

/// Bucketing of one query range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    slot_size: i64,
    range: Range,
    window_range: Range,
}

impl TimeWindow {
    pub fn new(range: Range, sampler: &dyn WindowSampler) -> TopologyResult<Self> {
        let slot_size = sampler.window_size(&range);
        if slot_size <= 0 {
            return Err(TopologyError::InvalidArgument(format!(
                "window sampler returned non-positive slot size {}",
                slot_size
            )));
        }
        let from = range.from().checked_sub(range.from().rem_euclid(slot_size));
        let Some(from) = from else {
            return Err(TopologyError::InvalidArgument(format!(
                "range start {} has no bucket boundary at slot size {}",
                range.from(),
                slot_size
            )));
        };
        let to = floor_to(range.to(), slot_size);
        Ok(Self {
            slot_size,
            range,
            window_range: Range::new(from, to)?,
        })
    }

    /// Build from raw bounds, rejecting `from > to`
    pub fn from_bounds(from: i64, to: i64, sampler: &dyn WindowSampler) -> TopologyResult<Self> {
        Self::new(Range::new(from, to)?, sampler)
    }

    pub fn slot_size(&self) -> i64 {
        self.slot_size
    }

    /// The range as queried, before snapping
    pub fn range(&self) -> Range {
        self.range
    }

    pub fn window_range(&self) -> Range {
        self.window_range
    }

    /// Floor `timestamp` to the bucket boundary at or before it
    pub fn snap(&self, timestamp: i64) -> i64 {
        floor_to(timestamp, self.slot_size)
    }

    pub fn bucket_count(&self) -> usize {
        (self.window_range.duration() / self.slot_size) as usize + 1
    }

    pub fn bucket_index(&self, timestamp: i64) -> TopologyResult<usize> {
        let index = self.raw_index(timestamp);
        match usize::try_from(index) {
            Ok(slot) if slot < self.bucket_count() => Ok(slot),
            _ => Err(TopologyError::OutOfRange { timestamp, index }),
        }
    }

    /// Bucket index with out-of-window timestamps pulled onto the edge buckets
    pub fn clamped_index(&self, timestamp: i64) -> usize {
        let last = self.bucket_count() as i64 - 1;
        self.raw_index(timestamp).clamp(0, last) as usize
    }

    /// Start of the bucket at `index`
    pub fn bucket_start(&self, index: usize) -> i64 {
        self.window_range.from() + index as i64 * self.slot_size
    }

    pub fn iter(&self) -> Slots {
        Slots {
            cursor: self.window_range.from(),
            step: self.slot_size,
            remaining: self.bucket_count(),
        }
    }

    fn raw_index(&self, timestamp: i64) -> i64 {
        self.snap(timestamp)
            .saturating_sub(self.window_range.from())
            / self.slot_size
    }
}

impl<'a> IntoIterator for &'a TimeWindow {
    type Item = i64;
    type IntoIter = Slots;

    fn into_iter(self) -> Slots {
        self.iter()
    }
}

/// Bucket start timestamps of a [`TimeWindow`], ascending
#[derive(Debug, Clone)]
pub struct Slots {
    cursor: i64,
    step: i64,
    remaining: usize,
}

impl Iterator for Slots {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.cursor;
        // the last slot may sit within one step of i64::MAX
        self.cursor = self.cursor.saturating_add(self.step);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Slots {}

/// Saturates at i64::MIN for timestamps below the lowest boundary
fn floor_to(timestamp: i64, slot_size: i64) -> i64 {
    timestamp.saturating_sub(timestamp.rem_euclid(slot_size))
}

fn div_ceil(value: i64, divisor: i64) -> i64 {
    value / divisor + i64::from(value % divisor != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(from: i64, to: i64) -> TimeWindow {
        TimeWindow::from_bounds(from, to, &DownSampler::default()).unwrap()
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let result = TimeWindow::from_bounds(10, 5, &DownSampler::default());
        assert!(matches!(result, Err(TopologyError::InvalidRange { .. })));
    }

    #[test]
    fn test_rejects_non_positive_slot() {
        let range = Range::new(0, 1000).unwrap();
        let result = TimeWindow::new(range, &FixedSampler(0));
        assert!(matches!(result, Err(TopologyError::InvalidArgument(_))));
    }

    #[test]
    fn test_short_range_uses_minute_buckets() {
        let w = window(1000, 5000);
        assert_eq!(w.slot_size(), ONE_MINUTE);
        assert_eq!(w.window_range(), Range::new(0, 0).unwrap());
        assert_eq!(w.bucket_count(), 1);
        assert_eq!(w.bucket_index(1200).unwrap(), 0);
    }

    #[test]
    fn test_sampler_is_monotonic() {
        let sampler = DownSampler::default();
        let mut previous = 0;
        for hours in [1, 2, 6, 7, 12, 13, 24, 25, 48, 49, 24 * 8, 24 * 30, 24 * 365] {
            let range = Range::new(0, hours * ONE_HOUR).unwrap();
            let size = sampler.window_size(&range);
            assert!(size >= previous, "slot shrank at {}h", hours);
            previous = size;
        }
    }

    #[test]
    fn test_bucket_count_stays_bounded() {
        for days in [1, 3, 10, 90, 365, 3650] {
            let w = window(123_456, 123_456 + days * ONE_DAY);
            assert!(
                w.bucket_count() <= DEFAULT_MAX_BUCKETS,
                "{} buckets for {} days",
                w.bucket_count(),
                days
            );
        }
    }

    #[test]
    fn test_snap_is_idempotent() {
        let w = window(0, 6 * ONE_HOUR);
        for t in [-70_001, -1, 0, 1, 299_999, 300_000, 1_234_567] {
            let snapped = w.snap(t);
            assert_eq!(w.snap(snapped), snapped);
            assert!(snapped <= t);
            assert!(t - snapped < w.slot_size());
        }
    }

    #[test]
    fn test_bucket_index_is_monotonic() {
        let w = window(0, ONE_HOUR);
        let mut previous = 0;
        for t in (0..ONE_HOUR).step_by(7_919) {
            let index = w.bucket_index(t).unwrap();
            assert!(index >= previous);
            previous = index;
        }
    }

    #[test]
    fn test_bucket_index_out_of_range() {
        let w = window(ONE_MINUTE, 10 * ONE_MINUTE);
        assert!(matches!(
            w.bucket_index(0),
            Err(TopologyError::OutOfRange { index: -1, .. })
        ));
        assert!(w.bucket_index(11 * ONE_MINUTE).is_err());
        assert_eq!(w.bucket_index(10 * ONE_MINUTE + 5).unwrap(), 9);
    }

    #[test]
    fn test_clamped_index_pulls_stragglers_in() {
        let w = window(ONE_MINUTE, 10 * ONE_MINUTE);
        assert_eq!(w.clamped_index(-ONE_HOUR), 0);
        assert_eq!(w.clamped_index(ONE_HOUR), w.bucket_count() - 1);
    }

    #[test]
    fn test_sequence_matches_bucket_count() {
        let w = window(12_345, 12_345 + 3 * ONE_HOUR);
        let slots: Vec<i64> = w.iter().collect();
        assert_eq!(slots.len(), w.bucket_count());
        assert_eq!(w.iter().len(), w.bucket_count());
        assert_eq!(slots[0], w.window_range().from());
        assert_eq!(*slots.last().unwrap(), w.window_range().to());
        assert!(slots.windows(2).all(|p| p[1] - p[0] == w.slot_size()));
        assert_eq!(slots[3], w.bucket_start(3));
    }

    #[test]
    fn test_sequence_is_restartable() {
        let w = window(0, ONE_HOUR);
        let first: Vec<i64> = (&w).into_iter().collect();
        let second: Vec<i64> = w.iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sampler_handles_widest_span() {
        let sampler = DownSampler::default();
        let range = Range::new(0, i64::MAX).unwrap();
        let size = sampler.window_size(&range);
        assert!(size > 0);
        assert_eq!(size % ONE_HOUR, 0);

        let w = TimeWindow::new(range, &sampler).unwrap();
        assert!(w.bucket_count() <= DEFAULT_MAX_BUCKETS);
        assert_eq!(w.iter().count(), w.bucket_count());
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let w = window(0, i64::MAX);
        assert_eq!(w.clamped_index(i64::MIN), 0);
        assert_eq!(w.clamped_index(i64::MAX), w.bucket_count() - 1);
        assert!(w.bucket_index(i64::MIN).is_err());
        assert!(w.bucket_index(i64::MAX).is_ok());
        assert_eq!(w.snap(i64::MIN), i64::MIN);

        let narrow = window(ONE_MINUTE, 10 * ONE_MINUTE);
        assert!(narrow.bucket_index(i64::MAX).is_err());
        assert_eq!(narrow.clamped_index(i64::MIN), 0);
    }

    #[test]
    fn test_start_without_bucket_boundary_is_rejected() {
        let range = Range::new(i64::MIN + 1, 0).unwrap();
        let result = TimeWindow::new(range, &FixedSampler(ONE_MINUTE));
        assert!(matches!(result, Err(TopologyError::InvalidArgument(_))));
    }

    #[test]
    fn test_slots_stop_near_max() {
        let w = TimeWindow::from_bounds(i64::MAX - 10, i64::MAX, &FixedSampler(4)).unwrap();
        let slots: Vec<i64> = w.iter().collect();
        assert_eq!(slots.len(), w.bucket_count());
        assert_eq!(*slots.last().unwrap(), w.window_range().to());
    }
}
