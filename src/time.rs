/*! Discrete and dense time models

The analysis is generic in the underlying notion of time: [Discrete]
time counts processor cycles (or any other integral quantum), whereas
[Dense] time is real-valued (e.g., microseconds). The [Time] trait
captures what the analysis needs from either model: ordinary arithmetic,
a *total* order, and three model-specific constants (`infinity`,
`epsilon`, and the deadline-miss tolerance).
*/

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::ops::{Add, Sub};

/// A point in time, or a duration, in one of the supported time models.
///
/// Implementations must behave like a totally ordered numeric type.
/// Floating-point models provide the total order via `total_cmp`, so
/// that sorting and hashing stay deterministic across runs.
pub trait Time:
    Copy + Debug + Display + PartialEq + PartialOrd + Add<Output = Self> + Sub<Output = Self>
{
    /// The origin of the time line.
    fn zero() -> Self;

    /// A value larger than any time that can occur in an analysis,
    /// used to denote "never".
    fn infinity() -> Self;

    /// Minimal time distance separating two distinct events.
    fn epsilon() -> Self;

    /// A deadline miss of a magnitude less than this tolerance is
    /// ignored as numerical noise.
    fn deadline_miss_tolerance() -> Self;

    /// Convert from an integral tick count. Job releases are integral
    /// multiples of task periods even under dense time.
    fn from_ticks(ticks: i64) -> Self;

    /// Convert to an integral tick count (truncating).
    fn to_ticks(self) -> i64;

    /// Total order on time values.
    fn total_order(self, other: Self) -> Ordering;

    /// A stable bit pattern used for hashing.
    fn key_bits(self) -> u64;

    /// The smaller of two time values under the total order.
    fn min_time(self, other: Self) -> Self {
        match self.total_order(other) {
            Ordering::Greater => other,
            _ => self,
        }
    }

    /// The larger of two time values under the total order.
    fn max_time(self, other: Self) -> Self {
        match self.total_order(other) {
            Ordering::Less => other,
            _ => self,
        }
    }
}

/// Discrete (integer) time.
pub type Discrete = i64;

/// Dense (real-valued) time.
pub type Dense = f64;

impl Time for Discrete {
    fn zero() -> Self {
        0
    }

    fn infinity() -> Self {
        i64::MAX
    }

    fn epsilon() -> Self {
        1
    }

    fn deadline_miss_tolerance() -> Self {
        0
    }

    fn from_ticks(ticks: i64) -> Self {
        ticks
    }

    fn to_ticks(self) -> i64 {
        self
    }

    fn total_order(self, other: Self) -> Ordering {
        self.cmp(&other)
    }

    fn key_bits(self) -> u64 {
        self as u64
    }
}

impl Time for Dense {
    fn zero() -> Self {
        0.0
    }

    fn infinity() -> Self {
        f64::INFINITY
    }

    fn epsilon() -> Self {
        f64::EPSILON
    }

    fn deadline_miss_tolerance() -> Self {
        // assuming we work with microseconds, this is one picosecond
        // (i.e., much less than one processor cycle)
        1e-6
    }

    fn from_ticks(ticks: i64) -> Self {
        ticks as f64
    }

    fn to_ticks(self) -> i64 {
        self as i64
    }

    fn total_order(self, other: Self) -> Ordering {
        self.total_cmp(&other)
    }

    fn key_bits(self) -> u64 {
        self.to_bits()
    }
}
