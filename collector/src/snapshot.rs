use crate::{
    derive::MetricKind,
    parameter::{
        CpuStats,
        LatencyStats,
        Measurement,
        Parameter,
    },
    source::TargetId,
    stats::Summary,
};
use chrono::{
    DateTime,
    Utc,
};
use std::time::Duration;

/// Collector metadata needed next to the accumulator to build a [`Parameter`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub(crate) target: TargetId,
    pub(crate) started: DateTime<Utc>,
    pub(crate) ended: DateTime<Utc>,
    /// Monotonic time between start and `ended`, warmup included.
    pub(crate) elapsed: Duration,
    pub(crate) warmup: Option<Duration>,
}

pub(crate) fn assemble(kind: MetricKind, summary: &Summary, window: &Window) -> Parameter {
    let duration = window.elapsed.saturating_sub(window.warmup.unwrap_or_default());
    let rate = (!duration.is_zero()).then(|| summary.count as f64 / duration.as_secs_f64());

    let measurement = Measurement {
        id: window.target,
        duration,
        warmup: window.warmup,
        started: Some(window.started),
        ended: Some(window.ended),
        samples: summary.count,
        dropped: None,
        rate,
    };

    let std_dev = summary.std_dev();
    let cv = summary.coefficient_of_variation();

    match kind {
        MetricKind::Latency => Parameter::Latency(LatencyStats {
            measurement,
            mean: to_nanos(summary.mean),
            std_dev: to_nanos(std_dev),
            cv,
            min: Some(to_nanos(summary.min)),
            max: Some(to_nanos(summary.max)),
            percentiles: None,
            clock: None,
            histogram: None,
        }),
        MetricKind::Cpu => Parameter::Cpu(CpuStats {
            measurement,
            mean: summary.mean,
            std_dev,
            cv,
            min: Some(summary.min),
            max: Some(summary.max),
            clock: None,
            histogram: None,
        }),
    }
}

fn to_nanos(value: f64) -> u64 {
    // `as` saturates and maps NaN to 0
    value.round() as u64
}
