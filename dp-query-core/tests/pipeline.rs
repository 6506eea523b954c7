//! End-to-end integration test for the recovery-to-aggregate pipeline,
//! driven entirely through the public `Client`/`Request` API against the
//! in-process fake transport (no live server). Mirrors the teacher's
//! `tests/*_integration.rs` layout, scaled down to this crate's actual
//! integration surface: the assembler wired to a transport, not a live
//! socket.

use chrono::DateTime;
use dp_query_core::channel::ChannelConfig;
use dp_query_core::model::{Decomp, Request, RequestOptions, Stream, TimeRange};
use dp_query_core::proto::{self, query_data_response, DataBucket, DataColumn, DataTimestamps, DataValue, SamplingClock};
use dp_query_core::proto_convert::timestamp_to_wire;
use dp_query_core::transport::fake::{FakeTransport, Script};
use dp_query_core::Client;

type Instant = chrono::DateTime<chrono::Utc>;

fn instant(secs: i64) -> Instant {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn wire_bucket(name: &str, start_secs: i64, count: u32) -> DataBucket {
    DataBucket {
        source_name: name.to_string(),
        data_type: proto::ScalarType::Float64 as i32,
        values: Some(DataColumn {
            values: (0..count).map(|i| DataValue { value: Some(proto::data_value::Value::Float64Value(i as f64)) }).collect(),
        }),
        timestamps: Some(DataTimestamps {
            descriptor: Some(proto::data_timestamps::Descriptor::SamplingClock(SamplingClock {
                start_time: Some(timestamp_to_wire(instant(start_secs))),
                period_nanos: 1_000_000_000,
                count,
            })),
        }),
    }
}

fn response(buckets: Vec<DataBucket>) -> proto::QueryDataResponse {
    proto::QueryDataResponse {
        result: Some(query_data_response::Result::Payload(proto::QueryDataResponsePayload { buckets })),
    }
}

fn request(id: &str, sources: Vec<&str>, begin: i64, end: i64) -> Request {
    Request {
        id: id.to_string(),
        sources: sources.into_iter().map(String::from).collect(),
        range: TimeRange::new(instant(begin), instant(end)),
        stream_type: Stream::ServerStream,
        decomposition: Decomp::None,
        stream_count: 1,
        options: RequestOptions::default(),
    }
}

#[tokio::test]
async fn recovers_correlates_and_assembles_a_dense_aggregate() {
    let transport = FakeTransport::new();
    transport.set_script(
        0,
        Script::Stream(vec![Ok(response(vec![wire_bucket("A", 0, 10), wire_bucket("B", 0, 10)]))]),
    );

    let client = Client::with_transport(transport, ChannelConfig::default());
    let aggregate = client.process(request("r1", vec!["A", "B"], 0, 10)).await.unwrap();

    assert_eq!(aggregate.blocks.len(), 1);
    assert!(!aggregate.partial);
    let block = &aggregate.blocks[0];
    assert_eq!(block.series.len(), 2);
    assert_eq!(block.timestamps.count(), 10);
}

#[tokio::test]
async fn horizontal_decomposition_fans_out_and_recorrelates() {
    let transport = FakeTransport::new();
    transport.set_script(0, Script::Stream(vec![Ok(response(vec![wire_bucket("A", 0, 5)]))]));
    transport.set_script(1, Script::Stream(vec![Ok(response(vec![wire_bucket("B", 0, 5)]))]));

    let mut req = request("r2", vec!["A", "B"], 0, 5);
    req.decomposition = Decomp::Horizontal;
    req.stream_count = 2;

    let client = Client::with_transport(transport, ChannelConfig::default());
    let aggregate = client.process(req).await.unwrap();

    assert_eq!(aggregate.blocks.len(), 1, "same time domain from both sub-requests correlates into one block");
    assert_eq!(aggregate.blocks[0].series.len(), 2);
}

#[tokio::test]
async fn server_side_exceptional_result_surfaces_as_server_error() {
    use dp_query_core::DpError;

    let transport = FakeTransport::new();
    transport.set_script(
        0,
        Script::Stream(vec![Ok(proto::QueryDataResponse {
            result: Some(query_data_response::Result::ExceptionalResult(proto::ExceptionalResult {
                kind: "QUOTA".into(),
                message: "quota exceeded".into(),
            })),
        })]),
    );

    let client = Client::with_transport(transport, ChannelConfig::default());
    let err = client.process(request("r3", vec!["A"], 0, 5)).await.unwrap_err();
    assert!(matches!(err, DpError::ServerError { message, .. } if message == "quota exceeded"));
}
