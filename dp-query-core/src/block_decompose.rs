//! `DataBlock` bookkeeping for the annotation/dataset client (§3, §9 open
//! question (a)). The Annotation service's business logic remains a
//! non-goal (§1); this module exists only to give the `DataBlock` type's
//! "pairwise disjoint" invariant an explicit, testable decomposition
//! policy, since the source left the policy unspecified for
//! non-rectangular intersections.
//!
//! **Policy** (resolved here, see DESIGN.md): two blocks are disjoint iff
//! their source-sets are disjoint OR their time ranges are disjoint.
//! Otherwise, the union of the two blocks is decomposed by a time-stripe
//! sweep: partition the union of the two time ranges at every boundary
//! instant that appears in either range, and for each resulting stripe
//! attribute the union of the source-sets of whichever original block(s)
//! cover that stripe. Two overlapping ranges produce at most 3 stripes, so
//! one pairwise intersection always decomposes into at most 3 of the "at
//! most five" rectangles §3 allows for.

use std::collections::BTreeSet;

use crate::model::TimeRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    pub sources: BTreeSet<String>,
    pub range: TimeRange,
}

impl DataBlock {
    pub fn new(sources: BTreeSet<String>, range: TimeRange) -> Self {
        Self { sources, range }
    }

    fn sources_disjoint(&self, other: &Self) -> bool {
        self.sources.is_disjoint(&other.sources)
    }

    fn ranges_disjoint(&self, other: &Self) -> bool {
        self.range.end <= other.range.begin || other.range.end <= self.range.begin
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.sources_disjoint(other) || self.ranges_disjoint(other)
    }
}

/// Decomposes the union of two overlapping (non-disjoint) blocks into
/// pairwise-disjoint blocks covering exactly that union (§3, §9 (a)).
/// Returns `[a.clone(), b.clone()]` unchanged if they are already disjoint.
pub fn decompose_intersection(a: &DataBlock, b: &DataBlock) -> Vec<DataBlock> {
    if a.is_disjoint(b) {
        return vec![a.clone(), b.clone()];
    }

    let mut boundaries = BTreeSet::new();
    boundaries.insert(a.range.begin);
    boundaries.insert(a.range.end);
    boundaries.insert(b.range.begin);
    boundaries.insert(b.range.end);
    let boundaries: Vec<_> = boundaries.into_iter().collect();

    let mut out = Vec::new();
    for window in boundaries.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        let in_a = lo >= a.range.begin && hi <= a.range.end;
        let in_b = lo >= b.range.begin && hi <= b.range.end;
        let sources: BTreeSet<String> = match (in_a, in_b) {
            (true, true) => a.sources.union(&b.sources).cloned().collect(),
            (true, false) => a.sources.clone(),
            (false, true) => b.sources.clone(),
            (false, false) => continue,
        };
        out.push(DataBlock::new(sources, TimeRange::new(lo, hi)));
    }
    out
}

/// A collection that keeps its stored blocks pairwise disjoint, resolving
/// intersections by [`decompose_intersection`] as new blocks are added.
#[derive(Debug, Clone, Default)]
pub struct BlockSet {
    blocks: Vec<DataBlock>,
}

impl BlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[DataBlock] {
        &self.blocks
    }

    /// Adds `block`, splitting it and any overlapping stored blocks so the
    /// set remains pairwise disjoint.
    pub fn add(&mut self, block: DataBlock) {
        let mut pending = vec![block];
        let mut resolved = Vec::with_capacity(self.blocks.len());

        for existing in std::mem::take(&mut self.blocks) {
            let mut still_pending = Vec::new();
            let mut existing_untouched = true;
            for candidate in pending.drain(..) {
                if existing.is_disjoint(&candidate) {
                    still_pending.push(candidate);
                } else {
                    existing_untouched = false;
                    still_pending.extend(decompose_intersection(&existing, &candidate));
                }
            }
            pending = still_pending;
            if existing_untouched {
                resolved.push(existing);
            }
        }

        resolved.extend(pending);
        self.blocks = resolved;
    }

    /// All pairs of stored blocks are disjoint (§8 testable property,
    /// exercised directly here since it is an invariant of this type).
    pub fn is_pairwise_disjoint(&self) -> bool {
        for i in 0..self.blocks.len() {
            for j in (i + 1)..self.blocks.len() {
                if !self.blocks[i].is_disjoint(&self.blocks[j]) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn t(secs: i64) -> crate::scalar::Instant {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn block(sources: &[&str], begin: i64, end: i64) -> DataBlock {
        DataBlock::new(sources.iter().map(|s| s.to_string()).collect(), TimeRange::new(t(begin), t(end)))
    }

    #[test]
    fn disjoint_by_sources_needs_no_decomposition() {
        let a = block(&["s1"], 0, 10);
        let b = block(&["s2"], 5, 15);
        assert!(a.is_disjoint(&b));
    }

    #[test]
    fn disjoint_by_time_needs_no_decomposition() {
        let a = block(&["s1"], 0, 10);
        let b = block(&["s1"], 10, 20);
        assert!(a.is_disjoint(&b));
    }

    #[test]
    fn overlapping_blocks_decompose_into_disjoint_pieces() {
        let a = block(&["s1"], 0, 10);
        let b = block(&["s1", "s2"], 5, 15);
        let pieces = decompose_intersection(&a, &b);
        assert!(pieces.len() <= 3);
        for i in 0..pieces.len() {
            for j in (i + 1)..pieces.len() {
                assert!(pieces[i].is_disjoint(&pieces[j]));
            }
        }
        // Union of time coverage per source matches the original spans.
        let total_s1: i64 = pieces.iter().filter(|p| p.sources.contains("s1")).map(|p| (p.range.end - p.range.begin).num_seconds()).sum();
        assert_eq!(total_s1, 15);
    }

    #[test]
    fn block_set_stays_pairwise_disjoint_after_overlapping_adds() {
        let mut set = BlockSet::new();
        set.add(block(&["s1"], 0, 10));
        set.add(block(&["s1", "s2"], 5, 15));
        set.add(block(&["s3"], 0, 100));
        assert!(set.is_pairwise_disjoint());
    }
}
