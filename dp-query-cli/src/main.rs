//! Test-suite harness (C15, §6): drives the assembler over a YAML-described
//! suite of requests against a live transport (or, under `--self-test`,
//! the in-process fake transport) and persists one `printOut` block per
//! result record.
//!
//! Usage: `dp-query-cli <suite.yaml> --out-dir <dir> [--log-level LEVEL]
//! [--request-id ID] [--self-test]`
//!
//! Exit codes (§6): 0 success, 1 config error, 2 recovery error, 3
//! assembly-invariant violation, 4 I/O error.

mod suite;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use dp_query_core::config::Config;
use dp_query_core::perf::RunSummary;
use dp_query_core::{Client, DpError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use suite::TestSuite;

const TOOL_NAME: &str = "dp-query-cli";

#[derive(Debug, Parser)]
#[command(name = TOOL_NAME, about = "Test-suite harness for the Data Platform query client")]
struct Args {
    /// Path to the test-suite YAML (requests plus a config path, §6 C15).
    suite: PathBuf,

    /// Directory the result file is written into.
    #[arg(long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// `tracing` env-filter directive, e.g. `info`, `debug`, `dp_query_core=trace`.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// When set, only the request with this id is run.
    #[arg(long = "request-id")]
    request_id: Option<String>,

    /// Runs against the in-process fake transport instead of a live
    /// server, exercising the pipeline end-to-end for smoke-testing a
    /// build (requires the `test-support` feature, always enabled on this
    /// binary's dependency).
    #[arg(long = "self-test", action = clap::ArgAction::SetTrue)]
    self_test: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitKind {
    Success = 0,
    Config = 1,
    Recovery = 2,
    AssemblyInvariant = 3,
    Io = 4,
}

impl From<ExitKind> for ExitCode {
    fn from(kind: ExitKind) -> Self {
        ExitCode::from(kind as u8)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitKind::Io.into();
        }
    };
    runtime.block_on(run(args))
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn run(args: Args) -> ExitCode {
    let suite = match TestSuite::load(&args.suite) {
        Ok(suite) => suite,
        Err(e) => return report_config_error(&e),
    };

    let config = match Config::load(suite.config_path()) {
        Ok(config) => config,
        Err(e) => return report_config_error(&e),
    };

    let base_options = dp_query_core::model::RequestOptions {
        tolerate_partial: config.recovery.tolerate_partial,
        retry_limit: config.recovery.retry_limit,
        queue_capacity: config.recovery.queue_capacity,
    };

    let requests = match suite.requests(&base_options, args.request_id.as_deref()) {
        Ok(requests) => requests,
        Err(e) => return report_config_error(&e),
    };

    if requests.is_empty() {
        error!(request_id = ?args.request_id, "no requests matched the given filter");
        return ExitKind::Config.into();
    }

    if let Err(e) = std::fs::create_dir_all(&args.out_dir) {
        error!(error = %e, "failed to create output directory");
        return ExitKind::Io.into();
    }

    if args.self_test {
        let client = Client::with_transport(self_test_transport(), dp_query_core::channel::ChannelConfig::default());
        run_with_client(client, requests, &args, &config).await
    } else {
        let client = match Client::from_config(&config).await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to connect transport");
                return ExitKind::Config.into();
            }
        };
        run_with_client(client, requests, &args, &config).await
    }
}

async fn run_with_client<T: dp_query_core::transport::Transport + 'static>(
    client: Client<T>,
    requests: Vec<dp_query_core::model::Request>,
    args: &Args,
    config: &Config,
) -> ExitCode {
    let mut summary = RunSummary::new();
    let mut lines = Vec::new();
    let mut worst: Option<ExitKind> = None;

    for request in requests {
        let request_id = request.id.clone();
        info!(request_id = %request_id, "running request");
        match client.process_scored(request, tokio_util::sync::CancellationToken::new()).await {
            Ok((aggregate, record)) => {
                summary.record(&record, config.scoring.target_mbps);
                lines.push(record.print_out());
                if aggregate.partial {
                    info!(request_id = %request_id, gaps = aggregate.gaps.len(), "aggregate recovered partially");
                }
            }
            Err(e) => {
                error!(request_id = %request_id, error = %e, "request failed");
                lines.push(format!("request_id={request_id} error={e}"));
                worst = Some(worse(worst, exit_kind_for(&e)));
            }
        }
    }

    if let Err(e) = persist(&args.out_dir, &lines, &summary) {
        error!(error = %e, "failed to persist results");
        return ExitKind::Io.into();
    }

    worst.map(ExitCode::from).unwrap_or_else(|| ExitKind::Success.into())
}

fn worse(current: Option<ExitKind>, candidate: ExitKind) -> ExitKind {
    match current {
        None => candidate,
        Some(existing) if (existing as u8) >= (candidate as u8) => existing,
        Some(_) => candidate,
    }
}

fn exit_kind_for(e: &DpError) -> ExitKind {
    match e {
        DpError::Config(_) => ExitKind::Config,
        DpError::InvalidRequest(_) => ExitKind::Config,
        DpError::Io(_) | DpError::Yaml(_) => ExitKind::Io,
        DpError::OrderingViolation { .. }
        | DpError::DomainCollision { .. }
        | DpError::DuplicateSource(_)
        | DpError::MissingResource(_)
        | DpError::InconsistentColumnSize { .. }
        | DpError::UnsupportedType(_) => ExitKind::AssemblyInvariant,
        _ => ExitKind::Recovery,
    }
}

fn report_config_error(e: &DpError) -> ExitCode {
    error!(error = %e, "configuration error");
    ExitKind::Config.into()
}

/// Persists one line-oriented result file named
/// `<ToolName>-<ISO-timestamp>.txt` (§6): a header plus one `printOut`
/// block per result record.
fn persist(out_dir: &std::path::Path, lines: &[String], summary: &RunSummary) -> std::io::Result<()> {
    let timestamp = Utc::now().to_rfc3339();
    let path = out_dir.join(format!("{TOOL_NAME}-{timestamp}.txt"));
    let mut contents = format!(
        "# {TOOL_NAME} run at {timestamp}\n# runs={} avg_rate_mbps={:.3} min_rate_mbps={:.3} max_rate_mbps={:.3} stddev_mbps={:.3} threshold_hits={}\n",
        summary.count(),
        summary.avg_rate(),
        summary.min_rate(),
        summary.max_rate(),
        summary.rate_stddev(),
        summary.threshold_hits(),
    );
    for line in lines {
        contents.push_str(line);
        contents.push('\n');
    }
    std::fs::write(path, contents)
}

/// Builds the in-process fake transport used by `--self-test`: a single
/// trivial clocked response so a fresh build can be smoke-tested without a
/// live server.
fn self_test_transport() -> dp_query_core::transport::fake::FakeTransport {
    use dp_query_core::proto::{self, query_data_response, DataBucket, DataColumn, DataTimestamps, DataValue, SamplingClock};
    use dp_query_core::transport::fake::{FakeTransport, Script};

    let transport = FakeTransport::new();
    let bucket = DataBucket {
        source_name: "self-test-source".to_string(),
        data_type: proto::ScalarType::Float64 as i32,
        values: Some(DataColumn {
            values: (0..5).map(|i| DataValue { value: Some(proto::data_value::Value::Float64Value(i as f64)) }).collect(),
        }),
        timestamps: Some(DataTimestamps {
            descriptor: Some(proto::data_timestamps::Descriptor::SamplingClock(SamplingClock {
                start_time: Some(dp_query_core::proto_convert::timestamp_to_wire(Utc::now())),
                period_nanos: 1_000_000_000,
                count: 5,
            })),
        }),
    };
    let response = proto::QueryDataResponse {
        result: Some(query_data_response::Result::Payload(proto::QueryDataResponsePayload { buckets: vec![bucket] })),
    };
    transport.set_script(0, Script::Stream(vec![Ok(response)]));
    transport
}
