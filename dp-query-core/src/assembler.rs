//! Aggregate assembler (C8, §4.7): the top-level orchestrator wiring the
//! decomposer, recovery channel, message buffer, correlator, time-domain
//! processor, and sampled-block builder into one `process()` call.

use std::sync::Arc;
use std::time::Instant as StdInstant;

use tokio_util::sync::CancellationToken;
use tracing::{debug_span, info_span};

use crate::block::{SampledAggregate, UniformSamplingBlock};
use crate::buffer::MessageBuffer;
use crate::channel::{ChannelConfig, RecoveryChannel};
use crate::correlate::Correlator;
use crate::decompose;
use crate::domain::{self, RawCorrelatedData};
use crate::error::{DpError, Result};
use crate::model::{Request, TimeRange};
use crate::perf::{CheckStatus, ResultRecord};
use crate::proto::{self, query_data_response};
use crate::proto_convert;
use crate::transport::Transport;

pub struct Assembler<T: Transport> {
    transport: Arc<T>,
    channel_config: ChannelConfig,
}

/// What the consumer task hands back once the buffer has drained: the
/// populated correlator plus the message/byte counters C9 reports.
type ConsumerOutcome = (Correlator, u64, u64);

impl<T: Transport + 'static> Assembler<T> {
    pub fn new(transport: Arc<T>, channel_config: ChannelConfig) -> Self {
        Self { transport, channel_config }
    }

    /// Runs the full pipeline for `request` with no external cancel
    /// signal. Most callers want this.
    pub async fn process(&self, request: Request) -> Result<SampledAggregate> {
        self.process_with_cancel(request, CancellationToken::new()).await
    }

    /// Same as [`Self::process`] but lets the caller supply (and hold onto)
    /// the cancellation token, so cancellation can be triggered from
    /// outside the call (§4.2, §5).
    pub async fn process_with_cancel(&self, request: Request, cancel: CancellationToken) -> Result<SampledAggregate> {
        let (aggregate, _record) = self.process_scored(request, cancel).await?;
        Ok(aggregate)
    }

    /// Runs the pipeline and also returns the [`ResultRecord`] (C9) for
    /// this run, for callers (the CLI harness) that persist scoring data.
    pub async fn process_scored(&self, request: Request, cancel: CancellationToken) -> Result<(SampledAggregate, ResultRecord)> {
        let request_id = request.id.clone();
        let tolerate_partial = request.options.tolerate_partial;
        let _span = info_span!("assemble", request_id = %request_id).entered();

        let sub_requests = decompose::decompose(&request)?;
        let sub_ranges: Vec<(usize, TimeRange)> = sub_requests.iter().map(|s| (s.sub_index, s.range)).collect();

        let mut buffer = MessageBuffer::new(request.options.queue_capacity);
        buffer.activate().await;
        let mut consumer = buffer.take_consumer().expect("freshly constructed buffer always has a consumer");

        let consumer_task = tokio::spawn(async move {
            let _span = debug_span!("correlate").entered();
            let mut correlator = Correlator::new();
            let mut recovered_messages = 0u64;
            let mut recovered_bytes = 0u64;
            while let Some(msg) = consumer.poll().await {
                recovered_messages += 1;
                match msg.response.result {
                    Some(query_data_response::Result::Payload(payload)) => {
                        for wire_bucket in payload.buckets {
                            recovered_bytes += estimate_wire_bucket_bytes(&wire_bucket);
                            let bucket = proto_convert::bucket_to_domain(wire_bucket)?;
                            correlator.ingest(bucket)?;
                        }
                    }
                    Some(query_data_response::Result::ExceptionalResult(exc)) => {
                        return Err(proto_convert::exceptional_result_to_error(&exc));
                    }
                    None => {}
                }
            }
            Ok::<ConsumerOutcome, DpError>((correlator, recovered_messages, recovered_bytes))
        });

        let recovery_started = StdInstant::now();
        let channel = RecoveryChannel::new(self.transport.clone(), self.channel_config);
        let recover_result = channel.recover_requests(sub_requests, &buffer, cancel.clone()).await;
        buffer.shutdown().await;
        let duration_recovery = recovery_started.elapsed();

        // Correlator/builder invariant violations abort immediately (§4.7);
        // they take priority over a tolerated recovery failure.
        let (mut correlator, recovered_messages, recovered_bytes, gaps) = match consumer_task
            .await
            .map_err(|e| DpError::TransportFatal(Box::new(e)))?
        {
            Err(e) => return Err(e),
            Ok((correlator, recovered_messages, recovered_bytes)) => match recover_result {
                Ok(()) => (correlator, recovered_messages, recovered_bytes, Vec::new()),
                Err(DpError::RecoveryError { failures }) if tolerate_partial => {
                    let gaps: Vec<TimeRange> = failures
                        .iter()
                        .filter_map(|f| sub_ranges.iter().find(|(idx, _)| *idx == f.sub_index).map(|(_, r)| *r))
                        .collect();
                    (correlator, recovered_messages, recovered_bytes, gaps)
                }
                Err(e) => return Err(e),
            },
        };

        let assembly_started = StdInstant::now();

        let raw = correlator.correlated_set();
        let ordering_status = if domain::verify_start_time_ordering(&raw).is_ok() { CheckStatus::Ok } else { CheckStatus::Violated };
        let disjoint_status = if domain::verify_disjoint_time_domains(&raw).is_ok() { CheckStatus::Ok } else { CheckStatus::Violated };

        let correlated_clocked_count = raw.iter().filter(|r| matches!(r, RawCorrelatedData::Clocked(_))).count();
        let correlated_tmslist_count = raw.len() - correlated_clocked_count;

        let final_raw = if disjoint_status == CheckStatus::Ok { raw } else { fuse_and_merge(raw)? };

        let mut blocks = Vec::with_capacity(final_raw.len());
        for r in &final_raw {
            blocks.push(UniformSamplingBlock::from_raw(r)?);
        }
        blocks.sort();

        let aggregate =
            if gaps.is_empty() { SampledAggregate::complete(blocks) } else { SampledAggregate::partial(blocks, gaps) };
        let duration_assembly = assembly_started.elapsed();

        let record = ResultRecord {
            request_id,
            recovered_messages,
            recovered_bytes,
            correlated_clocked_count,
            correlated_tmslist_count,
            duration_recovery,
            duration_assembly,
            ordering_status,
            disjoint_status,
        };

        Ok((aggregate, record))
    }
}

/// Re-sorts and fuses non-disjoint raw blocks (§4.7 step 6): each
/// super-domain with more than one contributing block is merged via
/// [`domain::merge_members`]; single-member super-domains pass through
/// unchanged.
fn fuse_and_merge(raw: Vec<RawCorrelatedData>) -> Result<Vec<RawCorrelatedData>> {
    let super_domains = domain::fuse_super_domains(&raw);
    let mut merged = Vec::with_capacity(super_domains.len());
    for sd in &super_domains {
        if sd.members.len() == 1 {
            merged.push(raw[sd.members[0]].clone());
        } else {
            let refs: Vec<&RawCorrelatedData> = sd.members.iter().map(|&i| &raw[i]).collect();
            merged.push(domain::merge_members(&refs)?);
        }
    }
    merged.sort();
    Ok(merged)
}

/// Rough wire-size estimate for scoring (C9) purposes; not used for any
/// correctness decision, only the reported `recovered_bytes` figure.
fn estimate_wire_bucket_bytes(bucket: &proto::DataBucket) -> u64 {
    use prost::Message;
    bucket.encoded_len() as u64
}
