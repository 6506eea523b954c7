//! Config/override facility (C10, §6). A tree of `serde`-deserializable
//! records loaded from YAML, with a manually-maintained descriptor table
//! standing in for the source's reflection-driven override walk (design
//! note 9: Rust has no runtime reflection).
//!
//! Override precedence, highest first: (1) "system properties", modeled as
//! a second, higher-precedence environment-variable tier since Rust has no
//! JVM-style system-property store (§9 open question (d)) — keys of the
//! form `DP_API_SYSPROP_<PATH>`; (2) plain environment variables of the
//! form `DP_API_<PATH>`; (3) the YAML value.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DpError, Result};

const SYSPROP_PREFIX: &str = "DP_API_SYSPROP_";
const ENV_PREFIX: &str = "DP_API_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Seconds,
    Millis,
    Nanos,
}

/// `duration {limit, unit}` config leaf (§6).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DurationSpec {
    pub limit: u64,
    pub unit: DurationUnit,
}

impl DurationSpec {
    pub fn to_duration(self) -> Duration {
        match self.unit {
            DurationUnit::Seconds => Duration::from_secs(self.limit),
            DurationUnit::Millis => Duration::from_millis(self.limit),
            DurationUnit::Nanos => Duration::from_nanos(self.limit),
        }
    }
}

fn default_connect_timeout() -> DurationSpec {
    DurationSpec { limit: 10, unit: DurationUnit::Seconds }
}

fn default_call_timeout() -> DurationSpec {
    DurationSpec { limit: 30, unit: DurationUnit::Seconds }
}

fn default_retry_limit() -> u32 {
    2
}

fn default_queue_capacity() -> usize {
    256
}

fn default_target_mbps() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Required; validated non-empty by [`Config::load`].
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: DurationSpec,
    #[serde(default = "default_call_timeout")]
    pub call_timeout: DurationSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub tolerate_partial: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { retry_limit: default_retry_limit(), queue_capacity: default_queue_capacity(), tolerate_partial: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_target_mbps")]
    pub target_mbps: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { target_mbps: default_target_mbps() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub transport: TransportConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// One overrideable leaf: its dotted path (for error messages), the
/// environment-key suffix appended to [`ENV_PREFIX`]/[`SYSPROP_PREFIX`],
/// and the parser that applies a raw string value to the config tree.
struct OverrideDescriptor {
    path: &'static str,
    suffix: &'static str,
    apply: fn(&mut Config, &str) -> Result<()>,
}

const OVERRIDES: &[OverrideDescriptor] = &[
    OverrideDescriptor {
        path: "transport.endpoint",
        suffix: "TRANSPORT_ENDPOINT",
        apply: |c, v| {
            c.transport.endpoint = v.to_string();
            Ok(())
        },
    },
    OverrideDescriptor {
        path: "transport.connect_timeout",
        suffix: "TRANSPORT_CONNECT_TIMEOUT_SECS",
        apply: |c, v| {
            c.transport.connect_timeout =
                DurationSpec { limit: parse_leaf(v, "transport.connect_timeout")?, unit: DurationUnit::Seconds };
            Ok(())
        },
    },
    OverrideDescriptor {
        path: "transport.call_timeout",
        suffix: "TRANSPORT_CALL_TIMEOUT_SECS",
        apply: |c, v| {
            c.transport.call_timeout =
                DurationSpec { limit: parse_leaf(v, "transport.call_timeout")?, unit: DurationUnit::Seconds };
            Ok(())
        },
    },
    OverrideDescriptor {
        path: "recovery.retry_limit",
        suffix: "RECOVERY_RETRY_LIMIT",
        apply: |c, v| {
            c.recovery.retry_limit = parse_leaf(v, "recovery.retry_limit")?;
            Ok(())
        },
    },
    OverrideDescriptor {
        path: "recovery.queue_capacity",
        suffix: "RECOVERY_QUEUE_CAPACITY",
        apply: |c, v| {
            c.recovery.queue_capacity = parse_leaf(v, "recovery.queue_capacity")?;
            Ok(())
        },
    },
    OverrideDescriptor {
        path: "recovery.tolerate_partial",
        suffix: "RECOVERY_TOLERATE_PARTIAL",
        apply: |c, v| {
            c.recovery.tolerate_partial = parse_leaf(v, "recovery.tolerate_partial")?;
            Ok(())
        },
    },
    OverrideDescriptor {
        path: "scoring.target_mbps",
        suffix: "SCORING_TARGET_MBPS",
        apply: |c, v| {
            c.scoring.target_mbps = parse_leaf(v, "scoring.target_mbps")?;
            Ok(())
        },
    },
];

fn parse_leaf<T: std::str::FromStr>(raw: &str, path: &str) -> Result<T> {
    raw.parse().map_err(|_| DpError::Config(format!("cannot parse override for '{path}': '{raw}'")))
}

impl Config {
    /// Loads `path`, parses it as YAML, then applies environment/system-
    /// property overrides in precedence order, then validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(text)?;
        apply_overrides(&mut config, std::env::var)?;
        config.validate()?;
        Ok(config)
    }

    /// Collects every null-valued required field at once rather than
    /// fail-fast on the first (§6).
    fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.transport.endpoint.trim().is_empty() {
            missing.push("transport.endpoint");
        }
        if !missing.is_empty() {
            return Err(DpError::Config(format!("missing required field(s): {}", missing.join(", "))));
        }
        Ok(())
    }
}

/// Applies [`OVERRIDES`] to `config` using `lookup` to read environment
/// values, so tests can substitute a fake environment instead of mutating
/// the real process environment.
fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> std::result::Result<String, std::env::VarError>) -> Result<()> {
    for descriptor in OVERRIDES {
        let sysprop_key = format!("{SYSPROP_PREFIX}{}", descriptor.suffix);
        let env_key = format!("{ENV_PREFIX}{}", descriptor.suffix);
        if let Ok(value) = lookup(&sysprop_key) {
            (descriptor.apply)(config, &value)?;
        } else if let Ok(value) = lookup(&env_key) {
            (descriptor.apply)(config, &value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE_YAML: &str = r#"
transport:
  endpoint: "https://example.invalid:443"
recovery:
  retry_limit: 2
"#;

    fn lookup_from(map: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> std::result::Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn loads_yaml_defaults() {
        let config = Config::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(config.transport.endpoint, "https://example.invalid:443");
        assert_eq!(config.recovery.retry_limit, 2);
        assert_eq!(config.recovery.queue_capacity, 256);
    }

    #[test]
    fn missing_endpoint_is_reported() {
        let err = Config::from_yaml_str("transport:\n  endpoint: \"\"\n").unwrap_err();
        assert!(matches!(err, DpError::Config(msg) if msg.contains("transport.endpoint")));
    }

    #[test]
    fn env_override_beats_yaml() {
        let mut config: Config = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        let lookup = lookup_from(HashMap::from([("DP_API_RECOVERY_RETRY_LIMIT", "5")]));
        apply_overrides(&mut config, lookup).unwrap();
        assert_eq!(config.recovery.retry_limit, 5);
    }

    #[test]
    fn sysprop_override_beats_env_override() {
        let mut config: Config = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        let lookup = lookup_from(HashMap::from([
            ("DP_API_RECOVERY_RETRY_LIMIT", "5"),
            ("DP_API_SYSPROP_RECOVERY_RETRY_LIMIT", "9"),
        ]));
        apply_overrides(&mut config, lookup).unwrap();
        assert_eq!(config.recovery.retry_limit, 9);
    }

    #[test]
    fn yaml_value_survives_when_no_override_present() {
        let mut config: Config = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        apply_overrides(&mut config, lookup_from(HashMap::new())).unwrap();
        assert_eq!(config.recovery.retry_limit, 2);
    }

    #[test]
    fn duration_spec_converts_units() {
        assert_eq!(DurationSpec { limit: 5, unit: DurationUnit::Seconds }.to_duration(), Duration::from_secs(5));
        assert_eq!(DurationSpec { limit: 5, unit: DurationUnit::Millis }.to_duration(), Duration::from_millis(5));
    }
}
