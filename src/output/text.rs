use bpfstat_collector::{
    CpuStats,
    LatencyStats,
    Measurement,
    Parameter,
};
use chrono::SecondsFormat;
use std::{
    collections::BTreeMap,
    io::{
        self,
        Write,
    },
    time::Duration,
};

const PERCENTILE_ORDER: [&str; 6] = ["p50", "p90", "p95", "p99", "p99_9", "p99_99"];

pub(super) fn render<W: Write>(parameter: &Parameter, out: &mut W) -> io::Result<()> {
    match parameter {
        Parameter::Latency(latency) => render_latency(latency, out),
        Parameter::Cpu(cpu) => render_cpu(cpu, out),
    }
}

fn render_latency<W: Write>(latency: &LatencyStats, out: &mut W) -> io::Result<()> {
    writeln!(out, "=== Latency Statistics ===")?;
    writeln!(out)?;
    render_measurement(&latency.measurement, out)?;

    writeln!(out, "--- Summary Statistics ---")?;
    writeln!(out, "Mean: {}", format_nanos(latency.mean))?;
    writeln!(out, "StdDev: {}", format_nanos(latency.std_dev))?;
    if let Some(cv) = latency.cv {
        writeln!(out, "CV: {cv:.4}")?;
    }
    if let Some(min) = latency.min {
        writeln!(out, "Min: {}", format_nanos(min))?;
    }
    if let Some(max) = latency.max {
        writeln!(out, "Max: {}", format_nanos(max))?;
    }
    writeln!(out)?;

    if let Some(percentiles) = latency.percentiles.as_ref().filter(|p| !p.is_empty()) {
        writeln!(out, "--- Percentiles ---")?;
        for (key, value) in ordered_percentiles(percentiles) {
            writeln!(out, "{key}: {}", format_nanos(value))?;
        }
        writeln!(out)?;
    }

    render_info(latency.clock.as_deref(), latency.histogram.as_deref(), out)
}

fn render_cpu<W: Write>(cpu: &CpuStats, out: &mut W) -> io::Result<()> {
    writeln!(out, "=== CPU Statistics ===")?;
    writeln!(out)?;
    render_measurement(&cpu.measurement, out)?;

    writeln!(out, "--- Summary Statistics ---")?;
    writeln!(out, "Mean: {:.2}%", cpu.mean)?;
    writeln!(out, "StdDev: {:.2}%", cpu.std_dev)?;
    if let Some(cv) = cpu.cv {
        writeln!(out, "CV: {cv:.4}")?;
    }
    if let Some(min) = cpu.min {
        writeln!(out, "Min: {min:.2}%")?;
    }
    if let Some(max) = cpu.max {
        writeln!(out, "Max: {max:.2}%")?;
    }
    writeln!(out)?;

    render_info(cpu.clock.as_deref(), cpu.histogram.as_deref(), out)
}

fn render_measurement<W: Write>(measurement: &Measurement, out: &mut W) -> io::Result<()> {
    writeln!(out, "ID: {}", measurement.id)?;
    writeln!(out, "Duration: {}", format_duration(measurement.duration))?;
    if let Some(warmup) = measurement.warmup {
        writeln!(out, "Warmup: {}", format_duration(warmup))?;
    }
    if let Some(started) = measurement.started {
        writeln!(out, "Started: {}", started.to_rfc3339_opts(SecondsFormat::Secs, true))?;
    }
    if let Some(ended) = measurement.ended {
        writeln!(out, "Ended: {}", ended.to_rfc3339_opts(SecondsFormat::Secs, true))?;
    }
    writeln!(out)?;

    writeln!(out, "Samples: {}", measurement.samples)?;
    if let Some(dropped) = measurement.dropped {
        writeln!(out, "Dropped: {dropped}")?;
    }
    if let Some(rate) = measurement.rate {
        writeln!(out, "Rate: {rate:.2} samples/sec")?;
    }
    writeln!(out)
}

fn render_info<W: Write>(clock: Option<&str>, histogram: Option<&str>, out: &mut W) -> io::Result<()> {
    if clock.is_none() && histogram.is_none() {
        return Ok(());
    }
    writeln!(out, "--- Measurement Info ---")?;
    if let Some(clock) = clock {
        writeln!(out, "Clock: {clock}")?;
    }
    if let Some(histogram) = histogram {
        writeln!(out, "Histogram: {histogram}")?;
    }
    Ok(())
}

/// Well-known keys first, anything else after in key order.
fn ordered_percentiles(percentiles: &BTreeMap<String, u64>) -> impl Iterator<Item = (&str, u64)> {
    let known = PERCENTILE_ORDER
        .iter()
        .filter_map(|key| percentiles.get_key_value(*key));
    let rest = percentiles
        .iter()
        .filter(|(key, _)| !PERCENTILE_ORDER.contains(&key.as_str()));
    known.chain(rest).map(|(key, value)| (key.as_str(), *value))
}

fn format_duration(duration: Duration) -> String {
    format_nanos(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}

/// Picks the unit by magnitude: `850ns`, `1.50µs`, `12.34ms`, `2.500s`.
pub(crate) fn format_nanos(ns: u64) -> String {
    match ns {
        0..1_000 => format!("{ns}ns"),
        1_000..1_000_000 => format!("{:.2}µs", ns as f64 / 1e3),
        1_000_000..1_000_000_000 => format!("{:.2}ms", ns as f64 / 1e6),
        _ => format!("{:.3}s", ns as f64 / 1e9),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpfstat_collector::TargetId;
    use chrono::{
        TimeZone,
        Utc,
    };
    use pretty_assertions::assert_eq;

    fn measurement() -> Measurement {
        Measurement {
            id: TargetId(42),
            duration: Duration::from_secs(10),
            warmup: Some(Duration::from_secs(2)),
            started: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            ended: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 12).unwrap()),
            samples: 100,
            dropped: None,
            rate: Some(10.0),
        }
    }

    fn latency() -> LatencyStats {
        LatencyStats {
            measurement: measurement(),
            mean: 1_500,
            std_dev: 250,
            cv: Some(0.1667),
            min: Some(900),
            max: Some(750_000),
            percentiles: None,
            clock: None,
            histogram: None,
        }
    }

    fn rendered(parameter: &Parameter) -> String {
        let mut out = Vec::new();
        render(parameter, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn latency_report() {
        assert_eq!(
            rendered(&Parameter::Latency(latency())),
            "\
=== Latency Statistics ===

ID: 42
Duration: 10.000s
Warmup: 2.000s
Started: 2024-05-01T12:00:00Z
Ended: 2024-05-01T12:00:12Z

Samples: 100
Rate: 10.00 samples/sec

--- Summary Statistics ---
Mean: 1.50µs
StdDev: 250ns
CV: 0.1667
Min: 900ns
Max: 750.00µs

"
        );
    }

    #[test]
    fn cpu_report_in_percent() {
        let cpu = CpuStats {
            measurement: Measurement {
                warmup: None,
                started: None,
                ended: None,
                rate: None,
                ..measurement()
            },
            mean: 12.5,
            std_dev: 0.25,
            cv: Some(0.02),
            min: Some(10.0),
            max: Some(15.5),
            clock: None,
            histogram: None,
        };

        assert_eq!(
            rendered(&Parameter::Cpu(cpu)),
            "\
=== CPU Statistics ===

ID: 42
Duration: 10.000s

Samples: 100

--- Summary Statistics ---
Mean: 12.50%
StdDev: 0.25%
CV: 0.0200
Min: 10.00%
Max: 15.50%

"
        );
    }

    #[test]
    fn percentiles_and_info_sections() {
        let latency = LatencyStats {
            cv: None,
            min: None,
            max: None,
            percentiles: Some(BTreeMap::from([
                ("p75".to_string(), 2_000),
                ("p99".to_string(), 9_000),
                ("p10".to_string(), 500),
                ("p50".to_string(), 1_400),
            ])),
            clock: Some("monotonic".to_string()),
            histogram: Some("hdr".to_string()),
            ..latency()
        };

        let text = rendered(&Parameter::Latency(latency));
        let tail = text.split_once("--- Percentiles ---\n").unwrap().1;
        assert_eq!(
            tail,
            "\
p50: 1.40µs
p99: 9.00µs
p10: 500ns
p75: 2.00µs

--- Measurement Info ---
Clock: monotonic
Histogram: hdr
"
        );
    }

    #[test]
    fn empty_percentiles_are_omitted() {
        let latency = LatencyStats {
            percentiles: Some(BTreeMap::new()),
            ..latency()
        };
        assert!(!rendered(&Parameter::Latency(latency)).contains("Percentiles"));
    }

    #[test]
    fn nanos_by_magnitude() {
        assert_eq!(format_nanos(0), "0ns");
        assert_eq!(format_nanos(999), "999ns");
        assert_eq!(format_nanos(1_000), "1.00µs");
        assert_eq!(format_nanos(12_346), "12.35µs");
        assert_eq!(format_nanos(999_999), "1000.00µs");
        assert_eq!(format_nanos(1_000_000), "1.00ms");
        assert_eq!(format_nanos(250_000_000), "250.00ms");
        assert_eq!(format_nanos(1_000_000_000), "1.000s");
        assert_eq!(format_nanos(61_500_000_000), "61.500s");
    }
}
