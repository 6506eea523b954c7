//! Recovery channel (C3, §4.2): drives one transport call per sub-request,
//! concurrently, forwarding every message into the shared buffer and
//! aggregating per-sub-request failures into a single [`DpError::RecoveryError`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::buffer::{BufferProducer, BufferedMessage, MessageBuffer};
use crate::error::{DpError, Result, SubRequestFailure};
use crate::model::{Stream, SubRequest};
use crate::proto::QueryDataRequest;
use crate::transport::Transport;

/// Per-call timeout and retry policy (§4.2, §7).
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub call_timeout: Duration,
    pub retry_limit: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { call_timeout: Duration::from_secs(30), retry_limit: 2 }
    }
}

pub struct RecoveryChannel<T: Transport> {
    transport: Arc<T>,
    config: ChannelConfig,
}

impl<T: Transport + 'static> RecoveryChannel<T> {
    pub fn new(transport: Arc<T>, config: ChannelConfig) -> Self {
        Self { transport, config }
    }

    /// Drives every sub-request concurrently, one transport call each, and
    /// returns once all have completed or failed. Early fatal errors cancel
    /// all peer sub-requests; transient per-stream errors surface without
    /// cancellation (§4.2, §7).
    pub async fn recover_requests(
        &self,
        sub_requests: Vec<SubRequest>,
        buffer: &MessageBuffer,
        cancel: CancellationToken,
    ) -> Result<()> {
        let producer = buffer.producer().ok_or(DpError::BufferClosed)?;

        let mut tasks: JoinSet<(usize, Result<()>)> = JoinSet::new();
        for sub in sub_requests {
            let transport = self.transport.clone();
            let producer = producer.clone();
            let cancel = cancel.clone();
            let config = self.config;
            let sub_index = sub.sub_index;
            tasks.spawn(
                async move {
                    let result = drive_one(&*transport, sub, producer, cancel, config).await;
                    (sub_index, result)
                }
                .instrument(info_span!("recover_sub_request", sub_index)),
            );
        }

        drop(producer);

        let mut failures = Vec::new();
        let mut fatal = false;
        while let Some(joined) = tasks.join_next().await {
            let (sub_index, result) = joined.map_err(|e| DpError::TransportFatal(Box::new(e)))?;
            if let Err(e) = result {
                if is_fatal(&e) {
                    fatal = true;
                    cancel.cancel();
                }
                warn!(sub_index, error = %e, "sub-request failed");
                failures.push(SubRequestFailure {
                    sub_index,
                    kind: error_kind(&e),
                    message: e.to_string(),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DpError::RecoveryError { failures })
        }
    }
}

async fn drive_one(
    transport: &impl Transport,
    sub: SubRequest,
    producer: BufferProducer,
    cancel: CancellationToken,
    config: ChannelConfig,
) -> Result<()> {
    let request = to_wire_request(&sub);

    let mut attempt = 0;
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(DpError::Cancelled),
            outcome = tokio::time::timeout(config.call_timeout, run_call(transport, &sub, request.clone(), &producer, &cancel)) => outcome,
        };

        match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) if is_retryable(&e) && attempt < config.retry_limit => {
                attempt += 1;
                continue;
            }
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) if attempt < config.retry_limit => {
                attempt += 1;
                continue;
            }
            Err(_elapsed) => return Err(DpError::Deadline),
        }
    }
}

async fn run_call(
    transport: &impl Transport,
    sub: &SubRequest,
    request: QueryDataRequest,
    producer: &BufferProducer,
    cancel: &CancellationToken,
) -> Result<()> {
    match sub.stream_type {
        Stream::Unary => {
            let response = transport.unary(request).await?;
            producer.offer(BufferedMessage { sub_index: sub.sub_index, response }).await
        }
        Stream::ServerStream => {
            let mut stream = transport.server_stream(request).await?;
            drain_stream(&mut stream, sub.sub_index, producer, cancel).await
        }
        Stream::Bidirectional => {
            let mut stream = transport.bidi_stream(request).await?;
            drain_stream(&mut stream, sub.sub_index, producer, cancel).await
        }
    }
}

async fn drain_stream(
    stream: &mut crate::transport::ResponseStream,
    sub_index: usize,
    producer: &BufferProducer,
    cancel: &CancellationToken,
) -> Result<()> {
    use futures::StreamExt;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(DpError::Cancelled),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(response)) => producer.offer(BufferedMessage { sub_index, response }).await?,
            Some(Err(e)) => return Err(e),
            None => return Ok(()),
        }
    }
}

fn to_wire_request(sub: &SubRequest) -> QueryDataRequest {
    QueryDataRequest {
        request_id: sub.id.clone(),
        source_names: sub.sources.clone(),
        begin_time: Some(crate::proto_convert::timestamp_to_wire(sub.range.begin)),
        end_time: Some(crate::proto_convert::timestamp_to_wire(sub.range.end)),
    }
}

fn is_retryable(e: &DpError) -> bool {
    matches!(e, DpError::TransportTransient(_) | DpError::Deadline)
}

fn is_fatal(e: &DpError) -> bool {
    matches!(e, DpError::TransportFatal(_) | DpError::ServerError { .. })
}

fn error_kind(e: &DpError) -> String {
    match e {
        DpError::TransportTransient(_) => "TransportTransient",
        DpError::TransportFatal(_) => "TransportFatal",
        DpError::Deadline => "Deadline",
        DpError::ServerError { .. } => "ServerError",
        DpError::Cancelled => "Cancelled",
        DpError::BufferClosed => "BufferClosed",
        _ => "Unknown",
    }
    .to_string()
}
