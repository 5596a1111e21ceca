//! Query time range

use crate::error::{TopologyError, TopologyResult};
use serde::Serialize;
use std::fmt;

/// Inclusive-exclusive span of epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    from: i64,
    to: i64,
}

impl Range {
    pub fn new(from: i64, to: i64) -> TopologyResult<Self> {
        if from > to {
            return Err(TopologyError::InvalidRange { from, to });
        }
        if to.checked_sub(from).is_none() {
            return Err(TopologyError::InvalidArgument(format!(
                "range [{}, {}) spans more than i64::MAX milliseconds",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> i64 {
        self.from
    }

    pub fn to(&self) -> i64 {
        self.to
    }

    /// Span length in milliseconds
    pub fn duration(&self) -> i64 {
        self.to - self.from
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.from && timestamp < self.to
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_range() {
        let err = Range::new(5000, 1000).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::InvalidRange { from: 5000, to: 1000 }
        ));
    }

    #[test]
    fn test_empty_range_is_valid() {
        let range = Range::new(1000, 1000).unwrap();
        assert_eq!(range.duration(), 0);
        assert!(!range.contains(1000));
    }

    #[test]
    fn test_contains_is_half_open() {
        let range = Range::new(1000, 5000).unwrap();
        assert!(range.contains(1000));
        assert!(range.contains(4999));
        assert!(!range.contains(5000));
        assert_eq!(range.to_string(), "[1000, 5000)");
    }

    #[test]
    fn test_rejects_unrepresentable_span() {
        let err = Range::new(i64::MIN, i64::MAX).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidArgument(_)));

        let widest = Range::new(0, i64::MAX).unwrap();
        assert_eq!(widest.duration(), i64::MAX);
        let negative = Range::new(i64::MIN, -1).unwrap();
        assert_eq!(negative.duration(), i64::MAX);
    }
}
