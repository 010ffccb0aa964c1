use crate::{
    args::Command,
    percentiles::normalize_percentiles,
    Config,
};
use bpfstat_collector::{
    MetricKind,
    TargetId,
};
use std::{
    path::PathBuf,
    time::Duration,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("--id is required")]
    MissingId,
    #[error("--duration is required")]
    MissingDuration,
    #[error("the sampling interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json { pretty: bool },
}

/// Everything one measurement needs, validated before a collector is created.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureOptions {
    pub kind: MetricKind,
    pub target: TargetId,
    pub duration: Duration,
    pub warmup: Option<Duration>,
    pub interval: Duration,
    /// Refresh rate of live statistics; `None` waits silently for the window to end.
    pub progress: Option<Duration>,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    /// Normalized keys such as `p99_9`. Reported but not computed.
    pub percentiles: Vec<String>,
}

impl MeasureOptions {
    pub fn new(command: &Command, config: &Config) -> Result<Self, ValidationError> {
        let args = command.measure_args();

        let target = match args.id {
            Some(id) if id != 0 => TargetId(id),
            _ => return Err(ValidationError::MissingId),
        };
        let duration = args
            .duration
            .filter(|duration| !duration.is_zero())
            .ok_or(ValidationError::MissingDuration)?;
        if config.sampling_interval.is_zero() {
            return Err(ValidationError::ZeroInterval);
        }

        let format = if args.json {
            OutputFormat::Json {
                pretty: config.pretty_json,
            }
        } else {
            OutputFormat::Text
        };
        let progress = (format == OutputFormat::Text && !args.no_progress && !config.progress_interval.is_zero())
            .then_some(config.progress_interval);

        Ok(Self {
            kind: command.kind(),
            target,
            duration,
            warmup: args.warmup.filter(|warmup| !warmup.is_zero()),
            interval: config.sampling_interval,
            progress,
            format,
            output: args.output.clone(),
            percentiles: normalize_percentiles(&args.percentiles),
        })
    }
}
