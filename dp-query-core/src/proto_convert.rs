//! Protobuf <-> domain conversion (C11, §4.9). Pure functions; no I/O, no
//! state. Each wire type gets a `*_to_domain` and, where round-tripped, a
//! `*_to_wire` counterpart.

use crate::error::{DpError, Result};
use crate::proto;
use crate::scalar::{DataBucket, ImageSample, Instant, Scalar, ScalarType, TimestampDescriptor};

// -- Timestamp ---------------------------------------------------------

pub fn timestamp_to_domain(wire: &proto::Timestamp) -> Instant {
    chrono::DateTime::from_timestamp(wire.epoch_seconds, wire.nanos).unwrap_or_else(|| chrono::DateTime::UNIX_EPOCH)
}

pub fn timestamp_to_wire(domain: Instant) -> proto::Timestamp {
    proto::Timestamp { epoch_seconds: domain.timestamp(), nanos: domain.timestamp_subsec_nanos() }
}

// -- ScalarType ----------------------------------------------------------

pub fn scalar_type_to_domain(wire: i32) -> Result<ScalarType> {
    match proto::ScalarType::try_from(wire).unwrap_or(proto::ScalarType::Unspecified) {
        proto::ScalarType::Bool => Ok(ScalarType::Bool),
        proto::ScalarType::Int32 => Ok(ScalarType::Int32),
        proto::ScalarType::Int64 => Ok(ScalarType::Int64),
        proto::ScalarType::Float32 => Ok(ScalarType::Float32),
        proto::ScalarType::Float64 => Ok(ScalarType::Float64),
        proto::ScalarType::String => Ok(ScalarType::String),
        proto::ScalarType::Image => Ok(ScalarType::Image),
        proto::ScalarType::Unspecified => Err(DpError::UnsupportedType(format!("scalar type tag {wire}"))),
    }
}

pub fn scalar_type_to_wire(domain: ScalarType) -> proto::ScalarType {
    match domain {
        ScalarType::Bool => proto::ScalarType::Bool,
        ScalarType::Int32 => proto::ScalarType::Int32,
        ScalarType::Int64 => proto::ScalarType::Int64,
        ScalarType::Float32 => proto::ScalarType::Float32,
        ScalarType::Float64 => proto::ScalarType::Float64,
        ScalarType::String => proto::ScalarType::String,
        ScalarType::Image => proto::ScalarType::Image,
    }
}

// -- DataValue / DataColumn -----------------------------------------------

pub fn data_value_to_domain(wire: &proto::DataValue) -> Scalar {
    match &wire.value {
        None => Scalar::Null,
        Some(proto::data_value::Value::BoolValue(v)) => Scalar::Bool(*v),
        Some(proto::data_value::Value::Int32Value(v)) => Scalar::Int32(*v),
        Some(proto::data_value::Value::Int64Value(v)) => Scalar::Int64(*v),
        Some(proto::data_value::Value::Float32Value(v)) => Scalar::Float32(*v),
        Some(proto::data_value::Value::Float64Value(v)) => Scalar::Float64(*v),
        Some(proto::data_value::Value::StringValue(v)) => Scalar::String(v.clone()),
        Some(proto::data_value::Value::ImageValue(v)) => Scalar::Image(ImageSample {
            data: v.data.clone(),
            width: v.width,
            height: v.height,
            format: v.format.clone(),
        }),
    }
}

pub fn data_value_to_wire(domain: &Scalar) -> proto::DataValue {
    let value = match domain {
        Scalar::Null => None,
        Scalar::Bool(v) => Some(proto::data_value::Value::BoolValue(*v)),
        Scalar::Int32(v) => Some(proto::data_value::Value::Int32Value(*v)),
        Scalar::Int64(v) => Some(proto::data_value::Value::Int64Value(*v)),
        Scalar::Float32(v) => Some(proto::data_value::Value::Float32Value(*v)),
        Scalar::Float64(v) => Some(proto::data_value::Value::Float64Value(*v)),
        Scalar::String(v) => Some(proto::data_value::Value::StringValue(v.clone())),
        Scalar::Image(v) => Some(proto::data_value::Value::ImageValue(proto::ImageValue {
            data: v.data.clone(),
            width: v.width,
            height: v.height,
            format: v.format.clone(),
        })),
    };
    proto::DataValue { value }
}

/// A wire `DataColumn` decodes to an ordered list of typed values; a
/// missing cell (unset oneof) decodes to `Scalar::Null` (§4.9).
pub fn data_column_to_domain(wire: &proto::DataColumn) -> Vec<Scalar> {
    wire.values.iter().map(data_value_to_domain).collect()
}

pub fn data_column_to_wire(domain: &[Scalar]) -> proto::DataColumn {
    proto::DataColumn { values: domain.iter().map(data_value_to_wire).collect() }
}

// -- SamplingClock / DataTimestamps ---------------------------------------

pub fn sampling_clock_to_domain(wire: &proto::SamplingClock) -> Result<TimestampDescriptor> {
    let start_wire = wire.start_time.as_ref().ok_or_else(|| DpError::UnsupportedType("sampling clock missing start_time".into()))?;
    Ok(TimestampDescriptor::UniformClock {
        start: timestamp_to_domain(start_wire),
        period_nanos: wire.period_nanos as i64,
        count: wire.count as i32,
    })
}

pub fn sampling_clock_to_wire(start: Instant, period_nanos: i64, count: i32) -> proto::SamplingClock {
    proto::SamplingClock {
        start_time: Some(timestamp_to_wire(start)),
        period_nanos: period_nanos as u64,
        count: count as u32,
    }
}

/// `DataTimestamps` with a `SamplingClock` branch decodes to `UniformClock`;
/// with the explicit list branch, to `TimestampList` (§4.9).
pub fn data_timestamps_to_domain(wire: &proto::DataTimestamps) -> Result<TimestampDescriptor> {
    match &wire.descriptor {
        Some(proto::data_timestamps::Descriptor::SamplingClock(clock)) => sampling_clock_to_domain(clock),
        Some(proto::data_timestamps::Descriptor::TimestampList(list)) => Ok(TimestampDescriptor::TimestampList {
            times: list.timestamps.iter().map(timestamp_to_domain).collect(),
        }),
        None => Err(DpError::UnsupportedType("DataTimestamps missing descriptor".into())),
    }
}

pub fn data_timestamps_to_wire(domain: &TimestampDescriptor) -> proto::DataTimestamps {
    let descriptor = match domain {
        TimestampDescriptor::UniformClock { start, period_nanos, count } => {
            proto::data_timestamps::Descriptor::SamplingClock(sampling_clock_to_wire(*start, *period_nanos, *count))
        }
        TimestampDescriptor::TimestampList { times } => {
            proto::data_timestamps::Descriptor::TimestampList(proto::TimestampList {
                timestamps: times.iter().map(|t| timestamp_to_wire(*t)).collect(),
            })
        }
    };
    proto::DataTimestamps { descriptor: Some(descriptor) }
}

// -- DataBucket ------------------------------------------------------------

pub fn bucket_to_domain(wire: proto::DataBucket) -> Result<DataBucket> {
    let data_type = scalar_type_to_domain(wire.data_type)?;
    let timestamps = wire
        .timestamps
        .as_ref()
        .ok_or_else(|| DpError::UnsupportedType("DataBucket missing timestamps".into()))
        .and_then(data_timestamps_to_domain)?;
    let values = wire.values.as_ref().map(data_column_to_domain).unwrap_or_default();
    Ok(DataBucket { source_name: wire.source_name, data_type, values, timestamps })
}

pub fn bucket_to_wire(domain: &DataBucket) -> proto::DataBucket {
    proto::DataBucket {
        source_name: domain.source_name.clone(),
        data_type: scalar_type_to_wire(domain.data_type) as i32,
        values: Some(data_column_to_wire(&domain.values)),
        timestamps: Some(data_timestamps_to_wire(&domain.timestamps)),
    }
}

// -- DataBlock / DataSet ---------------------------------------------------

pub fn data_block_to_domain(wire: &proto::DataBlock) -> Result<crate::block_decompose::DataBlock> {
    let begin = wire.begin_time.as_ref().ok_or_else(|| DpError::UnsupportedType("DataBlock missing begin_time".into()))?;
    let end = wire.end_time.as_ref().ok_or_else(|| DpError::UnsupportedType("DataBlock missing end_time".into()))?;
    Ok(crate::block_decompose::DataBlock::new(
        wire.source_names.iter().cloned().collect(),
        crate::model::TimeRange::new(timestamp_to_domain(begin), timestamp_to_domain(end)),
    ))
}

pub fn data_block_to_wire(domain: &crate::block_decompose::DataBlock) -> proto::DataBlock {
    proto::DataBlock {
        source_names: domain.sources.iter().cloned().collect(),
        begin_time: Some(timestamp_to_wire(domain.range.begin)),
        end_time: Some(timestamp_to_wire(domain.range.end)),
    }
}

/// Minimal domain counterpart of the wire `DataSet` message. The annotation
/// service's business logic is a non-goal (§1); this type exists only so
/// the shared transport binding's wire types round-trip (§4.9, §8 property 5).
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    pub name: String,
    pub blocks: Vec<crate::block_decompose::DataBlock>,
}

pub fn data_set_to_domain(wire: &proto::DataSet) -> Result<DataSet> {
    Ok(DataSet { name: wire.name.clone(), blocks: wire.blocks.iter().map(data_block_to_domain).collect::<Result<_>>()? })
}

pub fn data_set_to_wire(domain: &DataSet) -> proto::DataSet {
    proto::DataSet { name: domain.name.clone(), blocks: domain.blocks.iter().map(data_block_to_wire).collect() }
}

// -- ExceptionalResult ------------------------------------------------------

/// An `ExceptionalResult` branch in any response produces `ServerError`
/// (§4.9), surfaced unchanged with the server's message (§7).
pub fn exceptional_result_to_error(wire: &proto::ExceptionalResult) -> DpError {
    DpError::ServerError { kind: wire.kind.clone(), message: wire.message.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::ScalarType;
    use chrono::DateTime;

    fn t(secs: i64) -> Instant {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn timestamp_round_trips() {
        let original = t(1_700_000_000);
        let wire = timestamp_to_wire(original);
        assert_eq!(timestamp_to_domain(&wire), original);
    }

    #[test]
    fn scalar_type_round_trips_all_variants() {
        for ty in [
            ScalarType::Bool,
            ScalarType::Int32,
            ScalarType::Int64,
            ScalarType::Float32,
            ScalarType::Float64,
            ScalarType::String,
            ScalarType::Image,
        ] {
            let wire = scalar_type_to_wire(ty) as i32;
            assert_eq!(scalar_type_to_domain(wire).unwrap(), ty);
        }
    }

    #[test]
    fn data_value_round_trips_each_branch() {
        let samples = vec![
            Scalar::Null,
            Scalar::Bool(true),
            Scalar::Int32(7),
            Scalar::Int64(-9),
            Scalar::Float32(1.5),
            Scalar::Float64(2.5),
            Scalar::String("hello".into()),
            Scalar::Image(ImageSample { data: vec![1, 2, 3], width: 4, height: 5, format: "png".into() }),
        ];
        for s in samples {
            let wire = data_value_to_wire(&s);
            assert_eq!(data_value_to_domain(&wire), s);
        }
    }

    #[test]
    fn uniform_clock_descriptor_round_trips() {
        let domain = TimestampDescriptor::UniformClock { start: t(0), period_nanos: 1_000_000_000, count: 10 };
        let wire = data_timestamps_to_wire(&domain);
        assert_eq!(data_timestamps_to_domain(&wire).unwrap(), domain);
    }

    #[test]
    fn timestamp_list_descriptor_round_trips() {
        let domain = TimestampDescriptor::TimestampList { times: vec![t(0), t(2), t(5)] };
        let wire = data_timestamps_to_wire(&domain);
        assert_eq!(data_timestamps_to_domain(&wire).unwrap(), domain);
    }

    #[test]
    fn bucket_round_trips() {
        let domain = DataBucket {
            source_name: "A".into(),
            data_type: ScalarType::Float64,
            values: vec![Scalar::Float64(1.0), Scalar::Float64(2.0)],
            timestamps: TimestampDescriptor::UniformClock { start: t(0), period_nanos: 1_000_000_000, count: 2 },
        };
        let wire = bucket_to_wire(&domain);
        let back = bucket_to_domain(wire).unwrap();
        assert_eq!(back.source_name, domain.source_name);
        assert_eq!(back.data_type, domain.data_type);
        assert_eq!(back.values, domain.values);
        assert_eq!(back.timestamps, domain.timestamps);
    }

    #[test]
    fn exceptional_result_becomes_server_error() {
        let wire = proto::ExceptionalResult { kind: "QUOTA".into(), message: "quota exceeded".into() };
        let err = exceptional_result_to_error(&wire);
        assert!(matches!(err, DpError::ServerError { kind, message } if kind == "QUOTA" && message == "quota exceeded"));
    }
}
