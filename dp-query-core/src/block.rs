//! Sampled-block builder and aggregate (C7, §3, §4.6).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::RawCorrelatedData;
use crate::error::{DpError, Result};
use crate::model::TimeRange;
use crate::scalar::{Instant, Scalar, ScalarType, TimestampDescriptor};

/// One source's samples over a block's shared timestamp axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTimeSeries {
    pub data_type: ScalarType,
    pub values: Vec<Scalar>,
}

/// Dense, per-source time series over one shared timestamp descriptor
/// (§3). `series` is a `BTreeMap` so iteration order is deterministic
/// (source-name order) without relying on `HashMap`'s unspecified order.
#[derive(Debug, Clone)]
pub struct UniformSamplingBlock {
    pub timestamps: TimestampDescriptor,
    pub series: BTreeMap<String, SampledTimeSeries>,
    seq: u64,
}

impl UniformSamplingBlock {
    /// Materializes a block from one correlated group (C7). Decodes each
    /// bucket's values into a typed series aligned with the block's shared
    /// timestamps.
    pub fn from_raw(raw: &RawCorrelatedData) -> Result<Self> {
        let timestamps = raw.timestamps();
        let count = timestamps.count();
        let mut series = BTreeMap::new();
        for bucket in raw.buckets() {
            if bucket.values.len() != count {
                return Err(DpError::InconsistentColumnSize {
                    source: bucket.source_name.clone(),
                    expected: count,
                    actual: bucket.values.len(),
                });
            }
            series.insert(
                bucket.source_name.clone(),
                SampledTimeSeries { data_type: bucket.data_type, values: bucket.values.clone() },
            );
        }
        Ok(Self { timestamps, series, seq: raw.seq() })
    }

    /// Fills `count` null cells to represent a source missing from this
    /// block, so a caller can unify the source set across several blocks
    /// (§4.6).
    pub fn insert_empty_time_series(&mut self, name: impl Into<String>, data_type: ScalarType) {
        let count = self.timestamps.count();
        self.series.insert(name.into(), SampledTimeSeries { data_type, values: vec![Scalar::Null; count] });
    }

    pub fn time_domain(&self) -> (Instant, Instant) {
        self.timestamps.time_domain()
    }

    pub fn start_instant(&self) -> Instant {
        self.time_domain().0
    }

    fn sort_key(&self) -> (Instant, Instant, u64) {
        let (begin, end) = self.time_domain();
        (begin, end, self.seq)
    }
}

impl PartialEq for UniformSamplingBlock {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}
impl Eq for UniformSamplingBlock {}

impl PartialOrd for UniformSamplingBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UniformSamplingBlock {
    /// Same natural order as [`RawCorrelatedData`] (§4.6): never `Equal`
    /// for distinct instances thanks to the insertion-sequence tie-break.
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Ordered list of sampled blocks covering a request (§3). `partial` and
/// `gaps` record server-side holes the recovery tolerated rather than
/// failed on (§4.7, §7).
#[derive(Debug, Clone)]
pub struct SampledAggregate {
    pub blocks: Vec<UniformSamplingBlock>,
    pub partial: bool,
    pub gaps: Vec<TimeRange>,
}

impl SampledAggregate {
    pub fn complete(blocks: Vec<UniformSamplingBlock>) -> Self {
        Self { blocks, partial: false, gaps: Vec::new() }
    }

    pub fn partial(blocks: Vec<UniformSamplingBlock>, gaps: Vec<TimeRange>) -> Self {
        Self { blocks, partial: true, gaps }
    }

    /// The union of every block's time domain, used to check aggregate
    /// coverage against the original request range (§8 property 4).
    pub fn covered_range(&self) -> Option<(Instant, Instant)> {
        let first = self.blocks.first()?.time_domain().0;
        let last = self.blocks.last()?.time_domain().1;
        Some((first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RawClockedData, RawCorrelatedData};
    use crate::scalar::DataBucket;
    use chrono::DateTime;

    fn t(secs: i64) -> Instant {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn raw_with_sources(names: &[&str]) -> RawCorrelatedData {
        let p = 1_000_000_000;
        let buckets = names
            .iter()
            .map(|name| DataBucket {
                source_name: name.to_string(),
                data_type: ScalarType::Float64,
                values: (0..10).map(|i| Scalar::Float64(i as f64)).collect(),
                timestamps: TimestampDescriptor::UniformClock { start: t(0), period_nanos: p, count: 10 },
            })
            .collect();
        RawCorrelatedData::Clocked(RawClockedData { start: t(0), period_nanos: p, count: 10, buckets, seq: 0 })
    }

    #[test]
    fn s1_boundary_scenario() {
        let raw = raw_with_sources(&["A", "B", "C"]);
        let block = UniformSamplingBlock::from_raw(&raw).unwrap();
        assert_eq!(block.timestamps.count(), 10);
        let keys: Vec<&String> = block.series.keys().collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(block.time_domain(), (t(0), t(9)));
        assert_eq!(block.start_instant(), t(0));
    }

    #[test]
    fn insert_empty_time_series_fills_nulls() {
        let raw = raw_with_sources(&["A"]);
        let mut block = UniformSamplingBlock::from_raw(&raw).unwrap();
        block.insert_empty_time_series("B", ScalarType::Float64);
        let b = &block.series["B"];
        assert_eq!(b.values.len(), 10);
        assert!(b.values.iter().all(|v| matches!(v, Scalar::Null)));
    }

    #[test]
    fn ordering_totality_never_equal_for_distinct_blocks() {
        let raw_a = raw_with_sources(&["A"]);
        let mut raw_b = raw_with_sources(&["A"]);
        if let RawCorrelatedData::Clocked(c) = &mut raw_b {
            c.seq = 1;
        }
        let a = UniformSamplingBlock::from_raw(&raw_a).unwrap();
        let b = UniformSamplingBlock::from_raw(&raw_b).unwrap();
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn aggregate_coverage_matches_request_range() {
        let raw = raw_with_sources(&["A"]);
        let block = UniformSamplingBlock::from_raw(&raw).unwrap();
        let aggregate = SampledAggregate::complete(vec![block]);
        assert_eq!(aggregate.covered_range(), Some((t(0), t(9))));
        assert!(!aggregate.partial);
    }
}
