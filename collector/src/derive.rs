//! Turning raw cumulative counters into one sample per poll.

use crate::source::RawCounters;
use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;

/// What a collector measures.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    /// Average run time per invocation, in nanoseconds.
    Latency,
    /// Share of wall-clock time spent executing, in percent.
    Cpu,
}

/// Derives at most one sample from two consecutive successful observations.
///
/// `previous` is `None` on the first successful poll. `elapsed` is the wall-clock time
/// between the two observations.
pub trait Derivation: Send + Sync + 'static {
    fn kind(&self) -> MetricKind;

    fn derive(&self, previous: Option<&RawCounters>, current: &RawCounters, elapsed: Duration) -> Option<f64>;
}

/// Lifetime average run time per invocation, sampled whenever new invocations happened.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatencyDerivation;

impl Derivation for LatencyDerivation {
    fn kind(&self) -> MetricKind {
        MetricKind::Latency
    }

    fn derive(&self, previous: Option<&RawCounters>, current: &RawCounters, _elapsed: Duration) -> Option<f64> {
        let seen = previous.map_or(0, |previous| previous.run_count);
        if current.run_count == 0 || current.run_count <= seen {
            return None;
        }
        Some(current.run_time_ns as f64 / current.run_count as f64)
    }
}

/// Run time accumulated since the previous poll over the wall-clock time that passed.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuDerivation;

impl Derivation for CpuDerivation {
    fn kind(&self) -> MetricKind {
        MetricKind::Cpu
    }

    fn derive(&self, previous: Option<&RawCounters>, current: &RawCounters, elapsed: Duration) -> Option<f64> {
        let previous = previous?;
        // counters went backwards: program replaced or stats re-enabled
        let ran = current.run_time_ns.checked_sub(previous.run_time_ns)?;
        if elapsed.is_zero() {
            return None;
        }
        Some(ran as f64 / elapsed.as_nanos() as f64 * 100.0)
    }
}
