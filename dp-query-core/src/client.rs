//! Client construction (design note 9): an explicit value owning its
//! transport, replacing the source's static singleton factory. `connect`
//! builds one directly from an endpoint; `from_config` is the convenience
//! constructor that consults C10 for the endpoint and channel timeouts.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::assembler::Assembler;
use crate::block::SampledAggregate;
use crate::channel::ChannelConfig;
use crate::config::Config;
use crate::error::Result;
use crate::model::Request;
use crate::perf::ResultRecord;
use crate::transport::{TonicTransport, Transport};

/// Owns a transport and the channel policy derived from it. No
/// process-global state: every caller constructs its own `Client`.
pub struct Client<T: Transport> {
    assembler: Assembler<T>,
}

impl Client<TonicTransport> {
    /// Connects directly to `endpoint` with the default channel policy.
    /// Most callers that already have a `Config` loaded want
    /// [`Self::from_config`] instead.
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        let transport = TonicTransport::connect(endpoint).await?;
        Ok(Self::with_transport(transport, ChannelConfig::default()))
    }

    /// Builds a client from a loaded [`Config`] (C10): connects to
    /// `config.transport.endpoint` and derives the channel's call timeout
    /// and retry limit from the same config tree.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let transport = TonicTransport::connect(config.transport.endpoint.clone()).await?;
        let channel_config = ChannelConfig {
            call_timeout: config.transport.call_timeout.to_duration(),
            retry_limit: config.recovery.retry_limit,
        };
        Ok(Self::with_transport(transport, channel_config))
    }
}

impl<T: Transport + 'static> Client<T> {
    /// Builds a client around an already-constructed transport (any
    /// [`Transport`] implementor, including test doubles).
    pub fn with_transport(transport: T, channel_config: ChannelConfig) -> Self {
        Self { assembler: Assembler::new(Arc::new(transport), channel_config) }
    }

    pub async fn process(&self, request: Request) -> Result<SampledAggregate> {
        self.assembler.process(request).await
    }

    pub async fn process_with_cancel(&self, request: Request, cancel: CancellationToken) -> Result<SampledAggregate> {
        self.assembler.process_with_cancel(request, cancel).await
    }

    pub async fn process_scored(&self, request: Request, cancel: CancellationToken) -> Result<(SampledAggregate, ResultRecord)> {
        self.assembler.process_scored(request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Decomp, RequestOptions, Stream, TimeRange};
    use crate::proto::{self, query_data_response, DataBucket as WireBucket, DataColumn, DataTimestamps, DataValue, SamplingClock};
    use crate::transport::fake::{FakeTransport, Script};
    use chrono::DateTime;

    fn t(secs: i64) -> crate::scalar::Instant {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn client_with_transport_runs_a_request() {
        let transport = FakeTransport::new();
        let bucket = WireBucket {
            source_name: "A".to_string(),
            data_type: proto::ScalarType::Float64 as i32,
            values: Some(DataColumn {
                values: (0..3).map(|i| DataValue { value: Some(proto::data_value::Value::Float64Value(i as f64)) }).collect(),
            }),
            timestamps: Some(DataTimestamps {
                descriptor: Some(proto::data_timestamps::Descriptor::SamplingClock(SamplingClock {
                    start_time: Some(crate::proto_convert::timestamp_to_wire(t(0))),
                    period_nanos: 1_000_000_000,
                    count: 3,
                })),
            }),
        };
        transport.set_script(
            0,
            Script::Stream(vec![Ok(proto::QueryDataResponse {
                result: Some(query_data_response::Result::Payload(proto::QueryDataResponsePayload { buckets: vec![bucket] })),
            })]),
        );

        let client = Client::with_transport(transport, ChannelConfig::default());
        let request = Request {
            id: "r1".into(),
            sources: vec!["A".into()],
            range: TimeRange::new(t(0), t(3)),
            stream_type: Stream::ServerStream,
            decomposition: Decomp::None,
            stream_count: 1,
            options: RequestOptions::default(),
        };
        let aggregate = client.process(request).await.unwrap();
        assert_eq!(aggregate.blocks.len(), 1);
    }
}
