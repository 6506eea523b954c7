//! Transport binding (C14): a capability trait over the three gRPC call
//! kinds, plus a `tonic`-backed implementation and an in-process fake used
//! by tests (design note 9 — capability traits over a base-class hierarchy).

use async_trait::async_trait;
use futures::stream::BoxStream;
use tonic::transport::Channel;

use crate::error::{DpError, Result};
use crate::proto::query_service_client::QueryServiceClient;
use crate::proto::QueryDataRequest;
use crate::proto::QueryDataResponse;

/// One item from a streaming call: either a decoded response, or the
/// transient/fatal transport failure that ended the stream early.
pub type ResponseStream = BoxStream<'static, Result<QueryDataResponse>>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn unary(&self, request: QueryDataRequest) -> Result<QueryDataResponse>;
    async fn server_stream(&self, request: QueryDataRequest) -> Result<ResponseStream>;
    /// Bidirectional streaming. This binding only ever sends a single
    /// logical request per sub-request (§4.2), so the outbound side is a
    /// one-element stream; the return value is the server's response
    /// stream.
    async fn bidi_stream(&self, request: QueryDataRequest) -> Result<ResponseStream>;
}

/// `tonic`-backed transport, connected to a single `Channel`. Cloning is
/// cheap: `tonic::transport::Channel` pools connections internally, so
/// concurrent sub-request tasks (§5) share one `TonicTransport` instance.
#[derive(Clone)]
pub struct TonicTransport {
    client: QueryServiceClient<Channel>,
}

impl TonicTransport {
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        let channel = Channel::from_shared(endpoint.into())
            .map_err(|e| DpError::Config(e.to_string()))?
            .connect()
            .await
            .map_err(|e| DpError::TransportFatal(Box::new(e)))?;
        Ok(Self { client: QueryServiceClient::new(channel) })
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self { client: QueryServiceClient::new(channel) }
    }
}

#[async_trait]
impl Transport for TonicTransport {
    async fn unary(&self, request: QueryDataRequest) -> Result<QueryDataResponse> {
        let mut client = self.client.clone();
        let response = client
            .query_data_unary(request)
            .await
            .map_err(classify_status)?;
        Ok(response.into_inner())
    }

    async fn server_stream(&self, request: QueryDataRequest) -> Result<ResponseStream> {
        let mut client = self.client.clone();
        let response = client
            .query_data_stream(request)
            .await
            .map_err(classify_status)?;
        let stream = response.into_inner();
        Ok(Box::pin(tokio_stream::StreamExt::map(stream, |item| {
            item.map_err(classify_status)
        })))
    }

    async fn bidi_stream(&self, request: QueryDataRequest) -> Result<ResponseStream> {
        let mut client = self.client.clone();
        let outbound = tokio_stream::once(request);
        let response = client
            .query_data_bidi(outbound)
            .await
            .map_err(classify_status)?;
        let stream = response.into_inner();
        Ok(Box::pin(tokio_stream::StreamExt::map(stream, |item| {
            item.map_err(classify_status)
        })))
    }
}

/// Maps a `tonic::Status` to the transient/fatal split of §7: deadline and
/// transient transport codes are retried per sub-request (C3's retry
/// budget), everything else cancels the peer sub-requests.
fn classify_status(status: tonic::Status) -> DpError {
    use tonic::Code;
    match status.code() {
        Code::DeadlineExceeded => DpError::Deadline,
        Code::Unavailable | Code::ResourceExhausted | Code::Aborted => {
            DpError::TransportTransient(Box::new(status))
        }
        _ => DpError::TransportFatal(Box::new(status)),
    }
}

/// In-process test double. Not built by default; enabled via the
/// `test-support` feature so the CLI harness's self-test subcommand (§6,
/// C15) can also exercise the pipeline without a live server.
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Canned per-sub-request script: either a sequence of responses
    /// (possibly ending in an error) or a single unary response.
    #[derive(Clone)]
    pub enum Script {
        Stream(Vec<Result<QueryDataResponse>>),
        Unary(Result<QueryDataResponse>),
    }

    /// A transport whose responses are scripted per sub-index, keyed by the
    /// `request_id` field the assembler writes into each `QueryDataRequest`
    /// combined with position — callers register scripts by call order.
    #[derive(Clone, Default)]
    pub struct FakeTransport {
        scripts: Arc<std::sync::Mutex<HashMap<usize, Script>>>,
        next_call: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers the script for the `call_index`-th call made against
        /// this transport (calls are consumed in the order `unary`/
        /// `server_stream`/`bidi_stream` are invoked).
        pub fn set_script(&self, call_index: usize, script: Script) {
            self.scripts.lock().unwrap().insert(call_index, script);
        }

        fn take_script(&self) -> Option<Script> {
            let index = self.next_call.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.scripts.lock().unwrap().remove(&index)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn unary(&self, _request: QueryDataRequest) -> Result<QueryDataResponse> {
            match self.take_script() {
                Some(Script::Unary(result)) => result,
                Some(Script::Stream(mut items)) if !items.is_empty() => items.remove(0),
                _ => Err(DpError::MissingResource("no script registered for fake call".into())),
            }
        }

        async fn server_stream(&self, _request: QueryDataRequest) -> Result<ResponseStream> {
            match self.take_script() {
                Some(Script::Stream(items)) => Ok(Box::pin(tokio_stream::iter(items))),
                Some(Script::Unary(result)) => Ok(Box::pin(tokio_stream::iter(vec![result]))),
                None => Err(DpError::MissingResource("no script registered for fake call".into())),
            }
        }

        async fn bidi_stream(&self, request: QueryDataRequest) -> Result<ResponseStream> {
            self.server_stream(request).await
        }
    }
}
