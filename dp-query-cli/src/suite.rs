//! Test-suite YAML schema (§6, C15): a config path plus one or more request
//! specs, loaded once per invocation and converted into
//! [`dp_query_core::model::Request`] values for the assembler.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dp_query_core::model::{Decomp, Request, RequestOptions, Stream, TimeRange};
use dp_query_core::{DpError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireStream {
    Unary,
    ServerStream,
    Bidirectional,
}

impl From<WireStream> for Stream {
    fn from(value: WireStream) -> Self {
        match value {
            WireStream::Unary => Stream::Unary,
            WireStream::ServerStream => Stream::ServerStream,
            WireStream::Bidirectional => Stream::Bidirectional,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireDecomp {
    None,
    Horizontal,
    Vertical,
    Grid,
}

impl From<WireDecomp> for Decomp {
    fn from(value: WireDecomp) -> Self {
        match value {
            WireDecomp::None => Decomp::None,
            WireDecomp::Horizontal => Decomp::Horizontal,
            WireDecomp::Vertical => Decomp::Vertical,
            WireDecomp::Grid => Decomp::Grid,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRange {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

fn default_stream_type() -> WireStream {
    WireStream::ServerStream
}

fn default_decomposition() -> WireDecomp {
    WireDecomp::None
}

fn default_stream_count() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct WireRequest {
    id: String,
    sources: Vec<String>,
    range: WireRange,
    #[serde(default = "default_stream_type")]
    stream_type: WireStream,
    #[serde(default = "default_decomposition")]
    decomposition: WireDecomp,
    #[serde(default = "default_stream_count")]
    stream_count: usize,
    #[serde(default)]
    tolerate_partial: bool,
}

#[derive(Debug, Deserialize)]
pub struct TestSuite {
    /// Path to the YAML config (C10), resolved relative to the suite file's
    /// own directory if not absolute.
    config: PathBuf,
    requests: Vec<WireRequest>,
}

impl TestSuite {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut suite: TestSuite = serde_yaml::from_str(&text)?;
        if suite.config.is_relative() {
            if let Some(parent) = path.parent() {
                suite.config = parent.join(&suite.config);
            }
        }
        Ok(suite)
    }

    pub fn config_path(&self) -> &Path {
        &self.config
    }

    /// Converts each request spec into a [`Request`], applying `base_options`
    /// (the options built from the loaded C10 config) as the per-request
    /// default before the suite's own `tolerate_partial` override.
    pub fn requests(&self, base_options: &RequestOptions, request_id_filter: Option<&str>) -> Result<Vec<Request>> {
        let mut out = Vec::new();
        for wire in &self.requests {
            if let Some(filter) = request_id_filter {
                if wire.id != filter {
                    continue;
                }
            }
            if wire.range.begin >= wire.range.end {
                return Err(DpError::InvalidRequest(format!("request '{}' has an empty or inverted range", wire.id)));
            }
            out.push(Request {
                id: wire.id.clone(),
                sources: wire.sources.clone(),
                range: TimeRange::new(wire.range.begin, wire.range.end),
                stream_type: Stream::from(wire.stream_type_ref()),
                decomposition: Decomp::from(wire.decomposition_ref()),
                stream_count: wire.stream_count,
                options: RequestOptions { tolerate_partial: wire.tolerate_partial, ..base_options.clone() },
            });
        }
        Ok(out)
    }
}

impl WireRequest {
    fn stream_type_ref(&self) -> WireStream {
        match self.stream_type {
            WireStream::Unary => WireStream::Unary,
            WireStream::ServerStream => WireStream::ServerStream,
            WireStream::Bidirectional => WireStream::Bidirectional,
        }
    }

    fn decomposition_ref(&self) -> WireDecomp {
        match self.decomposition {
            WireDecomp::None => WireDecomp::None,
            WireDecomp::Horizontal => WireDecomp::Horizontal,
            WireDecomp::Vertical => WireDecomp::Vertical,
            WireDecomp::Grid => WireDecomp::Grid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
config: config.yaml
requests:
  - id: r1
    sources: [A, B]
    range:
      begin: "2024-01-01T00:00:00Z"
      end: "2024-01-01T00:00:10Z"
"#;

    #[test]
    fn parses_defaults() {
        let suite: TestSuite = serde_yaml::from_str(SAMPLE).unwrap();
        let reqs = suite.requests(&RequestOptions::default(), None).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].stream_type, Stream::ServerStream);
        assert_eq!(reqs[0].decomposition, Decomp::None);
        assert_eq!(reqs[0].stream_count, 1);
    }

    #[test]
    fn request_id_filter_selects_one() {
        let multi = format!("{SAMPLE}  - id: r2\n    sources: [C]\n    range:\n      begin: \"2024-01-01T00:00:00Z\"\n      end: \"2024-01-01T00:00:05Z\"\n");
        let suite: TestSuite = serde_yaml::from_str(&multi).unwrap();
        let reqs = suite.requests(&RequestOptions::default(), Some("r2")).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].id, "r2");
    }

    #[test]
    fn rejects_inverted_range() {
        let bad = SAMPLE.replace("00:00:10Z", "00:00:00Z");
        let suite: TestSuite = serde_yaml::from_str(&bad).unwrap();
        assert!(suite.requests(&RequestOptions::default(), None).is_err());
    }
}
