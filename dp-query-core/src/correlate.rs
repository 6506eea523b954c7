//! Correlator (C5, §4.4): groups incoming buckets by identical timestamp
//! descriptor into raw correlated blocks.
//!
//! Rust has no direct analogue of a `TreeSet` keyed by a custom
//! never-`Equal` comparator that also dedups by a separate key, so the
//! correlator keeps groups in a `HashMap` during ingestion and emits a
//! `Vec` sorted once at drain time (§4.4), relying on the insertion
//! sequence tie-break in [`crate::domain::RawCorrelatedData`]'s `Ord` impl
//! to keep that sort total.

use std::collections::{HashMap, HashSet};

use crate::domain::{RawClockedData, RawCorrelatedData, RawTmsListData};
use crate::error::{DpError, Result};
use crate::scalar::{CanonicalTimestampKey, DataBucket, TimestampDescriptor};

struct Group {
    timestamps: TimestampDescriptor,
    buckets: Vec<DataBucket>,
    sources: HashSet<String>,
    seq: u64,
}

impl Group {
    fn into_raw(self) -> RawCorrelatedData {
        match self.timestamps {
            TimestampDescriptor::UniformClock { start, period_nanos, count } => {
                RawCorrelatedData::Clocked(RawClockedData { start, period_nanos, count, buckets: self.buckets, seq: self.seq })
            }
            TimestampDescriptor::TimestampList { times } => {
                RawCorrelatedData::TmsList(RawTmsListData { times, buckets: self.buckets, seq: self.seq })
            }
        }
    }
}

/// Restartable bucket correlator. Owned exclusively by the assembler's
/// consumer task (§5) — never shared behind a `Mutex`.
#[derive(Default)]
pub struct Correlator {
    groups: HashMap<CanonicalTimestampKey, Group>,
    next_seq: u64,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends one bucket to its group, creating the group on
    /// first sight of its timestamp descriptor. Fails with
    /// [`DpError::DuplicateSource`] if the group already holds a bucket for
    /// this source (§4.4 step 2).
    pub fn ingest(&mut self, bucket: DataBucket) -> Result<()> {
        bucket.validate()?;
        let key = bucket.timestamps.canonical_key();

        if !self.groups.contains_key(&key) {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.groups.insert(
                key,
                Group { timestamps: bucket.timestamps.clone(), buckets: Vec::new(), sources: HashSet::new(), seq },
            );
        }

        let group = self.groups.get_mut(&key).expect("just inserted or already present");
        if !group.sources.insert(bucket.source_name.clone()) {
            return Err(DpError::DuplicateSource(bucket.source_name));
        }
        group.buckets.push(bucket);
        Ok(())
    }

    /// Drains all groups into a sorted `Vec` using the natural order of
    /// §3. Leaves the correlator empty, ready to ingest a fresh run without
    /// an explicit `reset()`.
    pub fn correlated_set(&mut self) -> Vec<RawCorrelatedData> {
        let mut out: Vec<RawCorrelatedData> = self.groups.drain().map(|(_, g)| g.into_raw()).collect();
        out.sort();
        out
    }

    /// Clears all state, including the insertion-sequence counter.
    pub fn reset(&mut self) {
        self.groups.clear();
        self.next_seq = 0;
    }
}
