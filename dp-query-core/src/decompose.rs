//! Request decomposer (C2, §4.1): splits one logical request into `N`
//! sub-requests whose union covers the original domain exactly once.

use crate::error::{DpError, Result};
use crate::model::{Decomp, Request, Stream, SubRequest, TimeRange};
use crate::scalar::Instant;

pub fn decompose(request: &Request) -> Result<Vec<SubRequest>> {
    match request.decomposition {
        Decomp::None => Ok(vec![SubRequest {
            id: request.id.clone(),
            sub_index: 0,
            sources: request.sources.clone(),
            range: request.range,
            stream_type: request.stream_type,
        }]),
        Decomp::Horizontal => horizontal(request, request.stream_count),
        Decomp::Vertical => vertical(request, request.stream_count),
        Decomp::Grid => grid(request, request.stream_count),
    }
}

fn horizontal(request: &Request, n: usize) -> Result<Vec<SubRequest>> {
    if n < 1 {
        return Err(DpError::InvalidRequest("decomposition count must be >= 1".into()));
    }
    if request.sources.is_empty() {
        return Err(DpError::InvalidRequest("horizontal decomposition requires sources".into()));
    }
    Ok(partition_sources(&request.sources, n)
        .into_iter()
        .enumerate()
        .map(|(i, sources)| SubRequest {
            id: request.id.clone(),
            sub_index: i,
            sources,
            range: request.range,
            stream_type: request.stream_type,
        })
        .collect())
}

fn vertical(request: &Request, n: usize) -> Result<Vec<SubRequest>> {
    if n < 1 {
        return Err(DpError::InvalidRequest("decomposition count must be >= 1".into()));
    }
    if request.range.is_empty() {
        return Err(DpError::InvalidRequest("vertical decomposition requires a non-empty range".into()));
    }
    Ok(partition_range(request.range, n)
        .into_iter()
        .enumerate()
        .map(|(i, range)| SubRequest {
            id: request.id.clone(),
            sub_index: i,
            sources: request.sources.clone(),
            range,
            stream_type: request.stream_type,
        })
        .collect())
}

fn grid(request: &Request, n: usize) -> Result<Vec<SubRequest>> {
    if n < 1 {
        return Err(DpError::InvalidRequest("decomposition count must be >= 1".into()));
    }
    if request.sources.is_empty() {
        return Err(DpError::InvalidRequest("grid decomposition requires sources".into()));
    }
    if request.range.is_empty() {
        return Err(DpError::InvalidRequest("grid decomposition requires a non-empty range".into()));
    }

    // `n` is the stream-count along each axis, bounded so the total stream
    // count (n_h * n_v) stays close to `n` rather than growing to n^2.
    let axis = (n as f64).sqrt().ceil().max(1.0) as usize;
    let source_groups = partition_sources(&request.sources, axis);
    let time_groups = partition_range(request.range, axis);

    let mut sub_index = 0;
    let mut out = Vec::with_capacity(source_groups.len() * time_groups.len());
    for sources in &source_groups {
        for range in &time_groups {
            out.push(SubRequest {
                id: request.id.clone(),
                sub_index,
                sources: sources.clone(),
                range: *range,
                stream_type: request.stream_type,
            });
            sub_index += 1;
        }
    }
    Ok(out)
}

/// Splits `sources` into `n` (or fewer, if `sources.len() < n`) roughly
/// equal groups, distributing the remainder round-robin to the earliest
/// groups so the union and per-group sizes stay deterministic.
fn partition_sources(sources: &[String], n: usize) -> Vec<Vec<String>> {
    let n = n.min(sources.len().max(1));
    let base = sources.len() / n;
    let remainder = sources.len() % n;

    let mut groups = Vec::with_capacity(n);
    let mut idx = 0;
    for group_index in 0..n {
        let size = base + if group_index < remainder { 1 } else { 0 };
        groups.push(sources[idx..idx + size].to_vec());
        idx += size;
    }
    groups
}

/// Splits `range` into `n` contiguous, half-open `[begin, end)` sub-intervals
/// whose union is exactly `range`. The final sub-interval's upper bound is
/// `range.end` (closed there only in the sense that no sample beyond it is
/// ever requested), and a boundary instant shared between two adjacent
/// sub-intervals belongs to the later one (§4.1).
fn partition_range(range: TimeRange, n: usize) -> Vec<TimeRange> {
    let total_nanos = (range.end - range.begin).num_nanoseconds().unwrap_or(0).max(0);
    let n = n.max(1);
    let step = total_nanos / n as i64;
    let remainder = total_nanos % n as i64;

    let mut out = Vec::with_capacity(n);
    let mut cursor: Instant = range.begin;
    for i in 0..n {
        let width = step + if (i as i64) < remainder { 1 } else { 0 };
        let next = if i == n - 1 {
            range.end
        } else {
            cursor + chrono::Duration::nanoseconds(width)
        };
        out.push(TimeRange::new(cursor, next));
        cursor = next;
    }
    out
}
