//! Performance and scoring (C9, §4.8). Per-run result records plus
//! summaries aggregated across many runs.

use std::cmp::Ordering;
use std::time::Duration;

/// Outcome of a §4.5 verification pass, as recorded on a result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Violated,
}

/// One completed `process()` run's measurements (§4.8).
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub request_id: String,
    pub recovered_messages: u64,
    pub recovered_bytes: u64,
    pub correlated_clocked_count: usize,
    pub correlated_tmslist_count: usize,
    pub duration_recovery: Duration,
    pub duration_assembly: Duration,
    pub ordering_status: CheckStatus,
    pub disjoint_status: CheckStatus,
}

impl ResultRecord {
    /// Megabytes/second over the recovery phase alone, matching the
    /// denominator the teacher's own rate calculations use for a
    /// network-bound phase (assembly is CPU-bound and excluded).
    pub fn data_rate_mbps(&self) -> f64 {
        let secs = self.duration_recovery.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.recovered_bytes as f64 / 1_000_000.0) / secs
    }

    /// Formats one `printOut`-style block for the CLI's persisted output
    /// file (§6, C15).
    pub fn print_out(&self) -> String {
        format!(
            "request_id={} messages={} bytes={} clocked={} tmslist={} recovery={:?} assembly={:?} rate_mbps={:.3} ordering={:?} disjoint={:?}",
            self.request_id,
            self.recovered_messages,
            self.recovered_bytes,
            self.correlated_clocked_count,
            self.correlated_tmslist_count,
            self.duration_recovery,
            self.duration_assembly,
            self.data_rate_mbps(),
            self.ordering_status,
            self.disjoint_status,
        )
    }
}

/// Aggregated view over many [`ResultRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    count: u64,
    sum_rate: f64,
    sum_rate_sq: f64,
    min_rate: f64,
    max_rate: f64,
    hits_by_request: std::collections::HashMap<String, u64>,
    threshold_hits: u64,
}

impl RunSummary {
    pub fn new() -> Self {
        Self { min_rate: f64::INFINITY, max_rate: f64::NEG_INFINITY, ..Default::default() }
    }

    pub fn record(&mut self, record: &ResultRecord, target_mbps: f64) {
        let rate = record.data_rate_mbps();
        self.count += 1;
        self.sum_rate += rate;
        self.sum_rate_sq += rate * rate;
        self.min_rate = self.min_rate.min(rate);
        self.max_rate = self.max_rate.max(rate);
        *self.hits_by_request.entry(record.request_id.clone()).or_insert(0) += 1;
        if rate >= target_mbps {
            self.threshold_hits += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn avg_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_rate / self.count as f64
        }
    }

    pub fn min_rate(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.min_rate }
    }

    pub fn max_rate(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.max_rate }
    }

    pub fn threshold_hits(&self) -> u64 {
        self.threshold_hits
    }

    pub fn hits_for(&self, request_id: &str) -> u64 {
        self.hits_by_request.get(request_id).copied().unwrap_or(0)
    }

    /// Standard deviation of the recorded data rates via the second-moment
    /// shortcut `sigma = sqrt(<r^2> - <r>^2)` (§4.8). Clamps to zero to
    /// absorb floating-point underflow when all rates are near-identical.
    pub fn rate_stddev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.avg_rate();
        let mean_sq = self.sum_rate_sq / self.count as f64;
        (mean_sq - mean * mean).max(0.0).sqrt()
    }
}

/// Running per-configuration score, keyed by the caller (e.g. one per
/// `(stream_count, decomposition)` pair under test).
#[derive(Debug, Clone)]
pub struct ConfigScore {
    pub label: String,
    pub runs: u64,
    pub sum_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub hits: u64,
    seq: u64,
}

impl ConfigScore {
    pub fn new(label: impl Into<String>, seq: u64) -> Self {
        Self { label: label.into(), runs: 0, sum_rate: 0.0, min_rate: f64::INFINITY, max_rate: f64::NEG_INFINITY, hits: 0, seq }
    }

    pub fn record(&mut self, rate: f64, target_mbps: f64) {
        self.runs += 1;
        self.sum_rate += rate;
        self.min_rate = self.min_rate.min(rate);
        self.max_rate = self.max_rate.max(rate);
        if rate >= target_mbps {
            self.hits += 1;
        }
    }

    pub fn avg_rate(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.sum_rate / self.runs as f64
        }
    }
}

/// Descending-rate comparator with a sequence-number tie-break so two
/// distinct `ConfigScore`s never compare `Equal` (§4.8, same idiom as §3).
pub struct ByRateDescending;

impl ByRateDescending {
    pub fn cmp(a: &ConfigScore, b: &ConfigScore) -> Ordering {
        b.avg_rate().partial_cmp(&a.avg_rate()).unwrap_or(Ordering::Equal).then_with(|| a.seq.cmp(&b.seq))
    }
}

/// Descending-hit-count comparator, same tie-break idiom.
pub struct ByHitsDescending;

impl ByHitsDescending {
    pub fn cmp(a: &ConfigScore, b: &ConfigScore) -> Ordering {
        b.hits.cmp(&a.hits).then_with(|| a.seq.cmp(&b.seq))
    }
}
