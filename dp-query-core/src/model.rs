//! Request model (C1, §3): the logical request a caller hands to the
//! assembler, and the enums governing how it is transported and decomposed.

use crate::scalar::Instant;

/// Transport call kind. Forward-only ("client-stream") is illegal for
/// queries: a query always needs a response stream back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Unary,
    ServerStream,
    Bidirectional,
}

/// Decomposition policy (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decomp {
    None,
    Horizontal,
    Vertical,
    Grid,
}

/// Half-open-on-decomposition, closed-overall `[begin, end]` time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub begin: Instant,
    pub end: Instant,
}

impl TimeRange {
    pub fn new(begin: Instant, end: Instant) -> Self {
        Self { begin, end }
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

/// Per-request knobs, overridable defaults sourced from [`crate::config`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// When true, `process()` returns a `partial` aggregate instead of
    /// failing outright if some sub-requests could not be recovered.
    pub tolerate_partial: bool,
    /// Per-sub-request transient-transport retry budget.
    pub retry_limit: u32,
    /// Bound on the message buffer's queue depth (C4).
    pub queue_capacity: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            tolerate_partial: false,
            retry_limit: 2,
            queue_capacity: 256,
        }
    }
}

/// A logical, not-yet-decomposed query request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: String,
    pub sources: Vec<String>,
    pub range: TimeRange,
    pub stream_type: Stream,
    pub decomposition: Decomp,
    pub stream_count: usize,
    pub options: RequestOptions,
}

impl Request {
    pub fn new(id: impl Into<String>, sources: Vec<String>, range: TimeRange) -> Self {
        Self {
            id: id.into(),
            sources,
            range,
            stream_type: Stream::ServerStream,
            decomposition: Decomp::None,
            stream_count: 1,
            options: RequestOptions::default(),
        }
    }
}

/// One sub-request produced by the decomposer (§4.1). Carries the parent
/// request's identity plus a monotonic sub-index for diagnostics and
/// result correlation in [`crate::error::SubRequestFailure`].
#[derive(Debug, Clone)]
pub struct SubRequest {
    pub id: String,
    pub sub_index: usize,
    pub sources: Vec<String>,
    pub range: TimeRange,
    pub stream_type: Stream,
}
