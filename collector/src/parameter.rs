//! The statistics record produced by a collector snapshot.
//!
//! Serialized form is nested under the metric kind, e.g. `{"latency": {"id": 42, ...}}`.
//! Durations are integer nanoseconds.

use crate::{
    derive::MetricKind,
    source::TargetId,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Latency(LatencyStats),
    Cpu(CpuStats),
}

impl Parameter {
    pub fn kind(&self) -> MetricKind {
        match self {
            Parameter::Latency(_) => MetricKind::Latency,
            Parameter::Cpu(_) => MetricKind::Cpu,
        }
    }

    pub fn measurement(&self) -> &Measurement {
        match self {
            Parameter::Latency(latency) => &latency.measurement,
            Parameter::Cpu(cpu) => &cpu.measurement,
        }
    }
}

/// Identity, window and volume fields shared by every metric kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: TargetId,

    /// Elapsed measurement time, minus warmup.
    #[serde(with = "nanos")]
    pub duration: Duration,
    #[serde(default, with = "option_nanos", skip_serializing_if = "Option::is_none")]
    pub warmup: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,

    pub samples: u64,
    /// Reserved for sources that can lose events; never set by the polling collector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped: Option<u64>,
    #[serde(default, rename = "rate_per_sec", skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    #[serde(flatten)]
    pub measurement: Measurement,

    #[serde(rename = "mean_ns")]
    pub mean: u64,
    #[serde(rename = "stddev_ns")]
    pub std_dev: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv: Option<f64>,
    #[serde(default, rename = "min_ns", skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,
    #[serde(default, rename = "max_ns", skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,

    /// Keys like `p50`, `p99_9`. No sketch is kept, so this is always empty for now.
    #[serde(default, rename = "percentiles_ns", skip_serializing_if = "Option::is_none")]
    pub percentiles: Option<BTreeMap<String, u64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    #[serde(flatten)]
    pub measurement: Measurement,

    #[serde(rename = "mean_perc")]
    pub mean: f64,
    #[serde(rename = "stddev_perc")]
    pub std_dev: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv: Option<f64>,
    #[serde(default, rename = "min_perc", skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, rename = "max_perc", skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram: Option<String>,
}

mod nanos {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
    };
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

mod option_nanos {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
    };
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|nanos| nanos.map(Duration::from_nanos))
    }
}
