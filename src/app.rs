use crate::{
    output,
    progress::Progress,
};
use bpfstat_collector::{
    BpfProgramSource,
    BpfStatsGuard,
    Collector,
    CounterSource,
    CpuDerivation,
    Derivation,
    LatencyDerivation,
    MetricKind,
    Parameter,
};
use bpfstat_config::{
    Args,
    Config,
    MeasureOptions,
};
use color_eyre::Result;
use eyre::WrapErr as _;
use std::{
    fs::File,
    future::Future,
    io::{
        self,
        BufWriter,
        Write,
    },
    sync::Arc,
};
use tokio::time::{
    interval_at,
    Instant,
    Interval,
};

pub struct App {
    options: MeasureOptions,
}

impl App {
    /// Loads the layered configuration and validates the command line against it.
    pub fn new(args: Args) -> Result<Self> {
        let config = Config::new(&args).wrap_err("Failed to load configuration")?;
        debug!(config_dir = %config.config_dir().display(), "Configuration ready");
        let options = MeasureOptions::new(&args.command, &config)?;
        Ok(Self { options })
    }

    #[instrument(skip_all, fields(id = %self.options.target, kind = %self.options.kind))]
    pub async fn run(self) -> Result<()> {
        let options = &self.options;
        info!(percentiles = ?options.percentiles, "Percentiles are reported by name only, no values are computed");

        let _stats = match BpfStatsGuard::enable() {
            Ok(guard) => Some(guard),
            Err(err) => {
                warn!("Could not enable eBPF run time statistics ({err}), relying on kernel.bpf_stats_enabled");
                None
            }
        };

        let progress = options.progress.map(|_| Progress::stderr(options.duration));
        let source = BpfProgramSource::new();
        let parameter = match options.kind {
            MetricKind::Latency => measure(options, source, LatencyDerivation, progress, shutdown_signal()).await?,
            MetricKind::Cpu => measure(options, source, CpuDerivation, progress, shutdown_signal()).await?,
        };

        write_report(&parameter, options)
    }
}

/// Runs one collector to completion and returns its final snapshot.
///
/// `interrupt` resolving stops the measurement early; whatever was sampled is still reported.
async fn measure<S, D, W>(
    options: &MeasureOptions,
    source: S,
    derivation: D,
    mut progress: Option<Progress<W>>,
    interrupt: impl Future<Output = ()>,
) -> Result<Parameter>
where
    S: CounterSource,
    D: Derivation,
    W: Write,
{
    let collector = Arc::new(Collector::new(
        options.target,
        options.interval,
        options.warmup,
        source,
        derivation,
    ));

    let mut state = collector.subscribe();
    let begun = Instant::now();
    let mut task = tokio::spawn({
        let collector = Arc::clone(&collector);
        let window = options.duration;
        async move { collector.start(window).await }
    });

    let mut ticker = options.progress.map(|period| interval_at(begun + period, period));
    tokio::pin!(interrupt);
    let mut interrupted = false;
    // Set when an interrupt arrives before the collector task got to run.
    let mut stop_pending = false;

    let termination = loop {
        tokio::select! {
            biased;

            joined = &mut task => break joined.wrap_err("Collector task failed")??,

            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                info!("Interrupted, finishing the measurement early");
                stop_pending = !collector.stop();
            }

            changed = state.changed(), if stop_pending => {
                stop_pending = changed.is_ok() && !collector.stop();
            }

            _ = next_tick(&mut ticker) => {
                let failed = progress
                    .as_mut()
                    .and_then(|progress| progress.update(begun.elapsed(), collector.snapshot()).err());
                if let Some(err) = failed {
                    warn!("Live statistics disabled, writing them failed: {err}");
                    progress = None;
                    ticker = None;
                }
            }
        }
    };

    if let Some(mut progress) = progress {
        if let Err(err) = progress.clear() {
            debug!("Failed to clear live statistics: {err}");
        }
    }
    collector.stop();
    debug!(?termination, "Measurement finished");

    let failed_polls = collector.failed_polls();
    let last_error = collector.last_error();
    if let Some(err) = &last_error {
        warn!(failed_polls, "Some polls of the eBPF program failed, last error: {err}");
    }

    match (collector.snapshot(), last_error) {
        (Ok(parameter), _) => Ok(parameter),
        (Err(err), Some(cause)) => Err(eyre::Report::new(cause).wrap_err(err)),
        (Err(err), None) => Err(err.into()),
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed the measurement simply runs its full window.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl-C handler: {err}");
        std::future::pending::<()>().await;
    }
}

fn write_report(parameter: &Parameter, options: &MeasureOptions) -> Result<()> {
    match &options.output {
        Some(path) => {
            let file = File::create(path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            output::render(parameter, options.format, &mut out)
                .and_then(|()| out.flush())
                .wrap_err_with(|| format!("Failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => {
            let mut out = io::stdout().lock();
            output::render(parameter, options.format, &mut out).wrap_err("Failed to write report")?;
        }
    }
    Ok(())
}
