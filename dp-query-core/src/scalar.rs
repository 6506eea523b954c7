//! Core data model shared by the correlator, time-domain processor, and
//! sampled-block builder (§3).

use chrono::{DateTime, Utc};

use crate::error::{DpError, Result};

/// Wall-clock instant at nanosecond resolution.
pub type Instant = DateTime<Utc>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Image,
}

/// A single typed sample cell. `None` represents a missing/null cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Image(ImageSample),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSample {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// Timestamp descriptor: either a uniform clock or an explicit list (§3).
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampDescriptor {
    UniformClock {
        start: Instant,
        period_nanos: i64,
        count: i32,
    },
    TimestampList {
        times: Vec<Instant>,
    },
}

impl TimestampDescriptor {
    /// Validates the descriptor's own invariants (§3): `count >= 1` and
    /// `period_nanos >= 1` for a uniform clock, a non-empty, strictly
    /// increasing list otherwise.
    pub fn validate(&self) -> Result<()> {
        match self {
            TimestampDescriptor::UniformClock { period_nanos, count, .. } => {
                if *count < 1 {
                    return Err(DpError::InvalidRequest(
                        "uniform clock count must be >= 1".into(),
                    ));
                }
                if *period_nanos < 1 {
                    return Err(DpError::InvalidRequest(
                        "uniform clock period_nanos must be >= 1".into(),
                    ));
                }
                Ok(())
            }
            TimestampDescriptor::TimestampList { times } => {
                if times.is_empty() {
                    return Err(DpError::InvalidRequest(
                        "timestamp list must not be empty".into(),
                    ));
                }
                if times.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(DpError::InvalidRequest(
                        "timestamp list must be strictly increasing".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn count(&self) -> usize {
        match self {
            TimestampDescriptor::UniformClock { count, .. } => *count as usize,
            TimestampDescriptor::TimestampList { times } => times.len(),
        }
    }

    /// The closed time domain `[first, last]` implied by this descriptor.
    pub fn time_domain(&self) -> (Instant, Instant) {
        match self {
            TimestampDescriptor::UniformClock { start, period_nanos, count } => {
                let last = *start + chrono::Duration::nanoseconds(period_nanos * (*count as i64 - 1));
                (*start, last)
            }
            TimestampDescriptor::TimestampList { times } => {
                (*times.first().expect("validated non-empty"), *times.last().expect("validated non-empty"))
            }
        }
    }

    /// Materializes the full timestamp vector. Cheap for `TimestampList`
    /// (already a vec); computed on demand for `UniformClock`.
    pub fn materialize(&self) -> Vec<Instant> {
        match self {
            TimestampDescriptor::UniformClock { start, period_nanos, count } => (0..*count)
                .map(|i| *start + chrono::Duration::nanoseconds(period_nanos * i as i64))
                .collect(),
            TimestampDescriptor::TimestampList { times } => times.clone(),
        }
    }

    /// Canonical key used by the correlator (§4.4) to group buckets sharing
    /// an identical descriptor.
    pub fn canonical_key(&self) -> CanonicalTimestampKey {
        match self {
            TimestampDescriptor::UniformClock { start, period_nanos, count } => {
                CanonicalTimestampKey::Clock(start.timestamp_nanos_opt().unwrap_or_default(), *period_nanos, *count)
            }
            TimestampDescriptor::TimestampList { times } => {
                use std::hash::{Hash, Hasher};
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                for t in times {
                    t.timestamp_nanos_opt().unwrap_or_default().hash(&mut hasher);
                }
                CanonicalTimestampKey::List(hasher.finish())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalTimestampKey {
    Clock(i64, i64, i32),
    List(u64),
}

/// One source's samples over one timestamp descriptor (§3).
#[derive(Debug, Clone)]
pub struct DataBucket {
    pub source_name: String,
    pub data_type: ScalarType,
    pub values: Vec<Scalar>,
    pub timestamps: TimestampDescriptor,
}

impl DataBucket {
    pub fn validate(&self) -> Result<()> {
        self.timestamps.validate()?;
        if self.values.len() != self.timestamps.count() {
            return Err(DpError::InconsistentColumnSize {
                source: self.source_name.clone(),
                expected: self.timestamps.count(),
                actual: self.values.len(),
            });
        }
        if self.values.is_empty() {
            return Err(DpError::MissingResource(self.source_name.clone()));
        }
        Ok(())
    }

    pub fn time_domain(&self) -> (Instant, Instant) {
        self.timestamps.time_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> Instant {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn uniform_clock_time_domain() {
        let d = TimestampDescriptor::UniformClock { start: t(0), period_nanos: 1_000_000_000, count: 10 };
        d.validate().unwrap();
        let (first, last) = d.time_domain();
        assert_eq!(first, t(0));
        assert_eq!(last, t(9));
    }

    #[test]
    fn uniform_clock_rejects_zero_count() {
        let d = TimestampDescriptor::UniformClock { start: t(0), period_nanos: 1, count: 0 };
        assert!(d.validate().is_err());
    }

    #[test]
    fn timestamp_list_rejects_non_monotonic() {
        let d = TimestampDescriptor::TimestampList { times: vec![t(1), t(1)] };
        assert!(d.validate().is_err());
    }

    #[test]
    fn canonical_key_distinguishes_clocks() {
        let a = TimestampDescriptor::UniformClock { start: t(0), period_nanos: 1_000_000_000, count: 5 };
        let b = TimestampDescriptor::UniformClock { start: t(0), period_nanos: 1_000_000_000, count: 6 };
        assert_ne!(a.canonical_key(), b.canonical_key());
    }
}
