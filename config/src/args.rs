use bpfstat_collector::MetricKind;
use clap::{
    Parser,
    Subcommand,
};
use std::{
    path::PathBuf,
    time::Duration,
};

/// Measure runtime statistics of loaded eBPF programs.
#[derive(Parser, Debug, Clone)]
#[command(name = "bpfstat", author, version = version(), about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Measure and report latency statistics for a specific eBPF program.
    #[command(long_about = LATENCY_LONG, after_help = LATENCY_EXAMPLES)]
    Latency(MeasureArgs),

    /// Measure and report CPU utilization statistics for a specific eBPF program.
    #[command(long_about = CPU_LONG, after_help = CPU_EXAMPLES)]
    Cpu(MeasureArgs),
}

impl Command {
    pub fn kind(&self) -> MetricKind {
        match self {
            Command::Latency(_) => MetricKind::Latency,
            Command::Cpu(_) => MetricKind::Cpu,
        }
    }

    pub fn measure_args(&self) -> &MeasureArgs {
        match self {
            Command::Latency(args) | Command::Cpu(args) => args,
        }
    }
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct MeasureArgs {
    /// eBPF program identifier to measure (the kernel bpf_prog id, see `bpftool prog`).
    #[arg(long, value_name = "ID")]
    pub id: Option<u32>,

    /// How long to collect samples for (e.g. 10s, 1m).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Optional warmup period whose samples are discarded (e.g. 5s).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub warmup: Option<Duration>,

    /// Sampling interval, overrides the configured `sampling_interval` (e.g. 50ms).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Percentile set: default, wide, tail, or a list such as 50,90,99.9.
    #[arg(long, value_delimiter = ',')]
    pub percentiles: Vec<String>,

    /// Output results as JSON.
    #[arg(long)]
    pub json: bool,

    /// Pretty-print JSON output (only applies with --json).
    #[arg(long)]
    pub pretty: bool,

    /// Write output to a file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Do not print live statistics while measuring.
    #[arg(long)]
    pub no_progress: bool,
}

const LATENCY_LONG: &str = "\
Measure and report latency statistics for a specific eBPF program.

Runs a time-bounded measurement of the selected program and prints mean, standard
deviation, coefficient of variation, min and max. The reported latency is the
per-invocation execution time of the program inside the kernel, not end-to-end
application latency. Output is human readable text unless --json is given.";

const LATENCY_EXAMPLES: &str = "\
Examples:
  # Measure latency statistics for eBPF program id 42 for 60 seconds
  bpfstat latency --id 42 --duration 60s

  # Same measurement, output as JSON written to a file
  bpfstat latency --id 42 --duration 60s --json -o latency_42.json

  # Discard the first 5 seconds
  bpfstat latency --id 42 --duration 60s --warmup 5s";

const CPU_LONG: &str = "\
Measure and report CPU utilization statistics for a specific eBPF program.

Every sampling interval the run time the kernel accounted to the program is
compared with the wall-clock time that passed, giving the share of one CPU the
program consumed, in percent.";

const CPU_EXAMPLES: &str = "\
Examples:
  # CPU utilization of program 42 over 30 seconds
  bpfstat cpu --id 42 --duration 30s

  # Sample every 500ms and print pretty JSON
  bpfstat cpu --id 42 --duration 30s --interval 500ms --json --pretty";

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let args = self.command.measure_args();
            let mut cache = HashMap::<String, Value>::new();
            if let Some(interval) = args.interval {
                cache.insert(
                    "sampling_interval".to_string(),
                    humantime::format_duration(interval).to_string().into(),
                );
            }
            if args.pretty {
                cache.insert("pretty_json".to_string(), true.into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let version = clap::crate_version!();
    let config_dir_path = crate::get_config_dir().display().to_string();

    format!(
        "\
{version}

Config directory: {config_dir_path}"
    )
}
