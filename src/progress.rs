use crate::output::format_nanos;
use bpfstat_collector::{
    CollectorError,
    Parameter,
};
use std::{
    io::{
        self,
        Write,
    },
    time::Duration,
};

const CLEAR_LINE: &str = "\r\x1b[K";

/// A single status line, redrawn in place on a terminal.
pub struct Progress<W> {
    out: W,
    window: Duration,
    drawn: bool,
}

impl Progress<io::Stderr> {
    pub fn stderr(window: Duration) -> Self {
        Self::new(io::stderr(), window)
    }
}

impl<W: Write> Progress<W> {
    pub fn new(out: W, window: Duration) -> Self {
        Self {
            out,
            window,
            drawn: false,
        }
    }

    pub fn update(&mut self, elapsed: Duration, snapshot: Result<Parameter, CollectorError>) -> io::Result<()> {
        let line = match snapshot {
            Ok(parameter) => status_line(&parameter),
            Err(CollectorError::NoSamples) => "waiting for samples".to_string(),
            Err(err) => err.to_string(),
        };
        write!(
            self.out,
            "{CLEAR_LINE}[{:.1}s / {:.1}s] {line}",
            elapsed.min(self.window).as_secs_f64(),
            self.window.as_secs_f64()
        )?;
        self.drawn = true;
        self.out.flush()
    }

    /// Erases the status line so the report starts on a clean line.
    pub fn clear(&mut self) -> io::Result<()> {
        if !self.drawn {
            return Ok(());
        }
        self.drawn = false;
        write!(self.out, "{CLEAR_LINE}")?;
        self.out.flush()
    }
}

fn status_line(parameter: &Parameter) -> String {
    match parameter {
        Parameter::Latency(latency) => {
            let mut line = format!(
                "samples: {}  mean: {}  stddev: {}",
                latency.measurement.samples,
                format_nanos(latency.mean),
                format_nanos(latency.std_dev)
            );
            if let (Some(min), Some(max)) = (latency.min, latency.max) {
                line.push_str(&format!("  min: {}  max: {}", format_nanos(min), format_nanos(max)));
            }
            line
        }
        Parameter::Cpu(cpu) => {
            let mut line = format!(
                "samples: {}  mean: {:.2}%  stddev: {:.2}%",
                cpu.measurement.samples, cpu.mean, cpu.std_dev
            );
            if let (Some(min), Some(max)) = (cpu.min, cpu.max) {
                line.push_str(&format!("  min: {min:.2}%  max: {max:.2}%"));
            }
            line
        }
    }
}
