//! Client-side query recovery, correlation, and sampled-aggregate assembly
//! pipeline for the Data Platform.
//!
//! The pipeline decomposes a logical [`model::Request`] into sub-requests,
//! recovers response messages concurrently over a gRPC transport, correlates
//! raw buckets by timestamp, fuses overlapping time domains into
//! super-domains, and materializes an ordered [`block::SampledAggregate`] of
//! uniform sampled blocks. [`client::Client`] is the entry point most callers
//! want; [`assembler::Assembler`] is the lower-level pipeline it wraps.

pub mod error;
pub mod model;
pub mod scalar;
pub mod decompose;
pub mod transport;
pub mod buffer;
pub mod channel;
pub mod correlate;
pub mod domain;
pub mod block;
pub mod block_decompose;
pub mod assembler;
pub mod client;
pub mod perf;
pub mod config;
pub mod proto_convert;

/// Generated protobuf types (`prost`/`tonic-build` output from `proto/dp_query.proto`).
pub mod proto {
    tonic::include_proto!("dp.query.v1");
}

pub use error::{DpError, Result};
pub use model::Request;
pub use assembler::Assembler;
pub use block::{SampledAggregate, UniformSamplingBlock};
pub use client::Client;
