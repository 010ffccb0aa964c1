use crate::{
    derive::{
        Derivation,
        MetricKind,
    },
    error::{
        CollectorError,
        SourceError,
    },
    parameter::Parameter,
    snapshot::{
        self,
        Window,
    },
    source::{
        CounterSource,
        RawCounters,
        TargetId,
    },
    stats::Stats,
};
use chrono::{
    DateTime,
    Utc,
};
use std::{
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Mutex,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::watch,
    time::{
        interval_at,
        sleep_until,
        Instant,
        MissedTickBehavior,
    },
};
use tokio_util::sync::CancellationToken;

const MIN_INTERVAL: Duration = Duration::from_millis(1);
/// Stand-in for deadlines that do not fit into an `Instant`; roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Lifecycle of a collector, published on a watch channel.
#[derive(Debug, Clone, Default)]
pub struct CollectorState {
    pub phase: Phase,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    ended: Option<Instant>,
}

/// Why a sampling loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The measurement window ran out.
    WindowElapsed,
    /// [`Collector::stop`] was called.
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    counters: RawCounters,
    at: Instant,
}

/// Polls one eBPF program at a fixed interval and folds derived samples into running statistics.
///
/// Share it behind an `Arc`: one task drives [`Collector::start`] while others call
/// [`Collector::snapshot`], [`Collector::stop`] and [`Collector::last_error`].
#[derive(Debug)]
pub struct Collector<S, D> {
    target: TargetId,
    interval: Duration,
    warmup: Option<Duration>,
    source: S,
    derivation: D,
    stats: Stats,
    state: watch::Sender<CollectorState>,
    stop: CancellationToken,
    last_error: Mutex<Option<SourceError>>,
    failed_polls: AtomicU64,
}

impl<S: CounterSource, D: Derivation> Collector<S, D> {
    /// A zero `warmup` means no warmup. The interval is raised to at least one millisecond.
    pub fn new(target: TargetId, interval: Duration, warmup: Option<Duration>, source: S, derivation: D) -> Self {
        let (state, _) = watch::channel(CollectorState::default());
        Self {
            target,
            interval: interval.max(MIN_INTERVAL),
            warmup: warmup.filter(|warmup| !warmup.is_zero()),
            source,
            derivation,
            stats: Stats::new(),
            state,
            stop: CancellationToken::new(),
            last_error: Mutex::new(None),
            failed_polls: AtomicU64::new(0),
        }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn kind(&self) -> MetricKind {
        self.derivation.kind()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn warmup(&self) -> Option<Duration> {
        self.warmup
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectorState> {
        self.state.subscribe()
    }

    /// Number of polls that failed since start, buffered or not.
    pub fn failed_polls(&self) -> u64 {
        self.failed_polls.load(Ordering::Relaxed)
    }

    /// Runs the sampling loop until `window` has elapsed or [`Collector::stop`] is called.
    ///
    /// A collector measures once: calling this again fails with
    /// [`CollectorError::AlreadyRunning`] or [`CollectorError::AlreadyFinished`].
    #[instrument(level = "debug", skip_all, fields(target = %self.target, kind = %self.derivation.kind()))]
    pub async fn start(&self, window: Duration) -> Result<Termination, CollectorError> {
        let started = self.begin()?;
        debug!(?window, interval = ?self.interval, warmup = ?self.warmup, "collector running");

        let deadline = sleep_until(saturating_add(started, window));
        tokio::pin!(deadline);

        let mut ticker = interval_at(saturating_add(started, self.interval), self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let warmup_end = saturating_add(started, self.warmup.unwrap_or_default());
        let mut last = None;

        loop {
            tokio::select! {
                biased;

                _ = self.stop.cancelled() => {
                    debug!(samples = self.stats.count(), "collector stopped");
                    return Ok(Termination::Stopped);
                }

                _ = &mut deadline => {
                    self.finish();
                    self.stop.cancel();
                    debug!(samples = self.stats.count(), "measurement window elapsed");
                    return Ok(Termination::WindowElapsed);
                }

                _ = ticker.tick() => self.poll(warmup_end, &mut last),
            }
        }
    }

    /// Ends a running measurement, keeping everything sampled so far.
    ///
    /// Returns `false` without doing anything if the collector was not running.
    pub fn stop(&self) -> bool {
        let stopped = self.finish();
        if stopped {
            self.stop.cancel();
        }
        stopped
    }

    /// Current statistics; fails with [`CollectorError::NoSamples`] until a sample was folded in.
    pub fn snapshot(&self) -> Result<Parameter, CollectorError> {
        let summary = self.stats.summary().ok_or(CollectorError::NoSamples)?;
        let state = self.state.borrow().clone();
        let (Some(started), Some(started_at)) = (state.started, state.started_at) else {
            return Err(CollectorError::NoSamples);
        };
        let (ended, ended_at) = match (state.ended, state.ended_at) {
            (Some(ended), Some(ended_at)) => (ended, ended_at),
            _ => (Instant::now(), Utc::now()),
        };

        let window = Window {
            target: self.target,
            started: started_at,
            ended: ended_at,
            elapsed: ended.saturating_duration_since(started),
            warmup: self.warmup,
        };
        Ok(snapshot::assemble(self.derivation.kind(), &summary, &window))
    }

    /// Takes the most recent poll failure, if one happened since the last call.
    pub fn last_error(&self) -> Option<SourceError> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn begin(&self) -> Result<Instant, CollectorError> {
        let now = Instant::now();
        let mut result = Ok(now);
        self.state.send_if_modified(|state| match state.phase {
            Phase::Idle => {
                *state = CollectorState {
                    phase: Phase::Running,
                    started_at: Some(Utc::now()),
                    ended_at: None,
                    started: Some(now),
                    ended: None,
                };
                true
            }
            Phase::Running => {
                result = Err(CollectorError::AlreadyRunning);
                false
            }
            Phase::Stopped => {
                result = Err(CollectorError::AlreadyFinished);
                false
            }
        });
        result
    }

    /// Running -> Stopped, freezing the end of the window.
    fn finish(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.phase != Phase::Running {
                return false;
            }
            state.phase = Phase::Stopped;
            state.ended = Some(Instant::now());
            state.ended_at = Some(Utc::now());
            true
        })
    }

    fn poll(&self, warmup_end: Instant, last: &mut Option<Observation>) {
        let counters = match self.source.query(self.target) {
            Ok(counters) => counters,
            Err(err) => {
                self.record_error(err);
                return;
            }
        };

        let now = Instant::now();
        let previous = last.replace(Observation { counters, at: now });
        let elapsed = previous.map_or(Duration::ZERO, |previous| now.saturating_duration_since(previous.at));

        let Some(sample) = self
            .derivation
            .derive(previous.as_ref().map(|previous| &previous.counters), &counters, elapsed)
        else {
            return;
        };

        if now < warmup_end {
            trace!(sample, "discarding warmup sample");
            return;
        }
        self.stats.add(sample);
    }

    fn record_error(&self, err: SourceError) {
        let failed = self.failed_polls.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(failed, "poll failed: {err}");
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }
}

fn saturating_add(instant: Instant, duration: Duration) -> Instant {
    instant
        .checked_add(duration)
        .unwrap_or_else(|| instant + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        derive::{
            CpuDerivation,
            LatencyDerivation,
        },
        parameter::Parameter,
    };
    use std::sync::{
        atomic::AtomicUsize,
        Arc,
    };

    const INTERVAL: Duration = Duration::from_millis(100);

    /// Replays a fixed list of responses, repeating the last one forever.
    #[derive(Debug)]
    struct Scripted {
        calls: AtomicUsize,
        steps: Vec<Option<RawCounters>>,
    }

    impl Scripted {
        fn new(steps: impl IntoIterator<Item = Option<RawCounters>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                steps: steps.into_iter().collect(),
            }
        }

        fn constant(run_time_ns: u64, run_count: u64) -> Self {
            Self::new([Some(RawCounters::new(run_time_ns, run_count))])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CounterSource for Scripted {
        fn query(&self, target: TargetId) -> Result<RawCounters, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.get(call).or(self.steps.last()).copied().flatten();
            step.ok_or(SourceError::NotFound(target))
        }
    }

    /// Every poll adds `per_poll` of run time and one invocation.
    #[derive(Debug, Default)]
    struct Steady {
        polls: AtomicU64,
        per_poll: u64,
    }

    impl CounterSource for Steady {
        fn query(&self, _target: TargetId) -> Result<RawCounters, SourceError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(RawCounters::new(n * self.per_poll + (n % 3) * 10, n))
        }
    }

    fn latency<S: CounterSource>(source: S, warmup: Option<Duration>) -> Arc<Collector<S, LatencyDerivation>> {
        Arc::new(Collector::new(TargetId(42), INTERVAL, warmup, source, LatencyDerivation))
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_before_any_poll_has_no_samples() {
        let collector = latency(Scripted::constant(1_000, 1), None);
        assert_eq!(collector.snapshot().unwrap_err(), CollectorError::NoSamples);
        assert_eq!(collector.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn single_latency_sample() {
        let collector = latency(Scripted::constant(1_000, 1), None);

        let termination = collector.start(Duration::from_secs(1)).await.unwrap();
        assert_eq!(termination, Termination::WindowElapsed);
        assert_eq!(collector.phase(), Phase::Stopped);

        let Parameter::Latency(latency) = collector.snapshot().unwrap() else {
            panic!("expected latency");
        };
        assert_eq!(latency.measurement.samples, 1);
        assert_eq!(latency.mean, 1_000);
        assert_eq!(latency.min, Some(1_000));
        assert_eq!(latency.max, Some(1_000));
        assert_eq!(latency.std_dev, 0);
        assert_eq!(latency.measurement.id, TargetId(42));
        assert_eq!(latency.measurement.duration, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn warmup_longer_than_run_discards_everything() {
        let source = Arc::new(Steady {
            per_poll: 500,
            ..Default::default()
        });
        let collector = latency(source.clone(), Some(Duration::from_secs(5)));

        collector.start(Duration::from_secs(1)).await.unwrap();

        assert!(source.polls.load(Ordering::SeqCst) >= 9);
        assert_eq!(collector.snapshot().unwrap_err(), CollectorError::NoSamples);
    }

    #[tokio::test(start_paused = true)]
    async fn warmup_keeps_later_samples_and_shortens_duration() {
        let collector = latency(
            Steady {
                per_poll: 500,
                ..Default::default()
            },
            Some(Duration::from_millis(450)),
        );

        collector.start(Duration::from_secs(1)).await.unwrap();

        // polls at 100..=900ms; those before 450ms are discarded
        let parameter = collector.snapshot().unwrap();
        assert_eq!(parameter.measurement().samples, 5);
        assert_eq!(parameter.measurement().duration, Duration::from_millis(550));
        assert_eq!(parameter.measurement().warmup, Some(Duration::from_millis(450)));
    }

    #[tokio::test(start_paused = true)]
    async fn cpu_utilization_from_consecutive_polls() {
        let steps = (0..20u64).map(|i| Some(RawCounters::new(i * 50_000_000, i + 1)));
        let collector = Arc::new(Collector::new(
            TargetId(7),
            INTERVAL,
            None,
            Scripted::new(steps),
            CpuDerivation,
        ));

        collector.start(Duration::from_millis(550)).await.unwrap();

        // five polls, the first one only seeds
        let Parameter::Cpu(cpu) = collector.snapshot().unwrap() else {
            panic!("expected cpu");
        };
        assert_eq!(cpu.measurement.samples, 4);
        assert_eq!(cpu.mean, 50.0);
        assert_eq!(cpu.min, Some(50.0));
        assert_eq!(cpu.max, Some(50.0));
        assert_eq!(cpu.std_dev, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn cpu_deltas_survive_warmup() {
        let steps = (0..20u64).map(|i| Some(RawCounters::new(i * 25_000_000, i + 1)));
        let collector = Arc::new(Collector::new(
            TargetId(7),
            INTERVAL,
            Some(Duration::from_millis(250)),
            Scripted::new(steps),
            CpuDerivation,
        ));

        collector.start(Duration::from_millis(550)).await.unwrap();

        // polls at 100 and 200 fall into warmup but still seed the delta for 300
        let parameter = collector.snapshot().unwrap();
        assert_eq!(parameter.measurement().samples, 3);
        let Parameter::Cpu(cpu) = parameter else {
            panic!("expected cpu");
        };
        assert_eq!(cpu.mean, 25.0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected() {
        let collector = latency(Scripted::constant(1_000, 1), None);
        let handle = tokio::spawn({
            let collector = collector.clone();
            async move { collector.start(Duration::from_secs(3600)).await }
        });
        tokio::task::yield_now().await;

        assert_eq!(collector.phase(), Phase::Running);
        assert_eq!(
            collector.start(Duration::from_secs(1)).await.unwrap_err(),
            CollectorError::AlreadyRunning
        );

        assert!(collector.stop());
        assert_eq!(handle.await.unwrap().unwrap(), Termination::Stopped);
        assert_eq!(
            collector.start(Duration::from_secs(1)).await.unwrap_err(),
            CollectorError::AlreadyFinished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let collector = latency(Scripted::constant(1_000, 1), None);
        assert!(!collector.stop(), "stopping an idle collector is a no-op");
        assert_eq!(collector.phase(), Phase::Idle);

        collector.start(Duration::from_millis(300)).await.unwrap();
        assert!(!collector.stop());
        assert!(!collector.stop());
        assert_eq!(collector.phase(), Phase::Stopped);
        assert_eq!(collector.snapshot().unwrap().measurement().samples, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn durations_beyond_instant_range_do_not_overflow() {
        let collector = Arc::new(Collector::new(
            TargetId(42),
            Duration::MAX,
            Some(Duration::MAX),
            Scripted::constant(1_000, 1),
            LatencyDerivation,
        ));
        let handle = tokio::spawn({
            let collector = collector.clone();
            async move { collector.start(Duration::MAX).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(collector.phase(), Phase::Running);
        assert!(collector.stop());
        assert_eq!(handle.await.unwrap(), Ok(Termination::Stopped));
        assert_eq!(collector.snapshot().unwrap_err(), CollectorError::NoSamples);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_long_window_and_freezes_duration() {
        let collector = latency(
            Steady {
                per_poll: 500,
                ..Default::default()
            },
            None,
        );
        let handle = tokio::spawn({
            let collector = collector.clone();
            async move { collector.start(Duration::from_secs(3600)).await }
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(collector.stop());
        assert_eq!(handle.await.unwrap().unwrap(), Termination::Stopped);

        let first = collector.snapshot().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = collector.snapshot().unwrap();

        assert_eq!(first.measurement().samples, 2);
        assert_eq!(first.measurement().duration, Duration::from_millis(250));
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_are_buffered_once() {
        let ok = Some(RawCounters::new(2_000, 2));
        let source = Arc::new(Scripted::new([None, None, None, ok]));
        let collector = latency(source.clone(), None);

        collector.start(Duration::from_millis(650)).await.unwrap();

        assert_eq!(source.calls(), 6);
        assert_eq!(collector.failed_polls(), 3);
        assert!(matches!(collector.last_error(), Some(SourceError::NotFound(TargetId(42)))));
        assert!(collector.last_error().is_none());
        assert_eq!(collector.snapshot().unwrap().measurement().samples, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_target_never_produces_samples() {
        let collector = latency(Scripted::new([None]), None);
        collector.start(Duration::from_millis(500)).await.unwrap();
        assert_eq!(collector.failed_polls(), 4);
        assert_eq!(collector.snapshot().unwrap_err(), CollectorError::NoSamples);
    }

    #[tokio::test(start_paused = true)]
    async fn live_snapshots_are_consistent() {
        let collector = latency(
            Steady {
                per_poll: 1_000,
                ..Default::default()
            },
            None,
        );
        let mut state = collector.subscribe();
        let handle = tokio::spawn({
            let collector = collector.clone();
            async move { collector.start(Duration::from_secs(5)).await }
        });

        state.wait_for(|state| state.phase == Phase::Running).await.unwrap();

        let mut seen = 0;
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(70)).await;
            let Ok(Parameter::Latency(latency)) = collector.snapshot() else {
                continue;
            };
            let (min, max) = (latency.min.unwrap(), latency.max.unwrap());
            assert!(min <= latency.mean && latency.mean <= max, "{latency:?}");
            assert!(latency.measurement.samples >= seen);
            seen = latency.measurement.samples;
        }

        assert_eq!(handle.await.unwrap().unwrap(), Termination::WindowElapsed);
        assert_eq!(collector.snapshot().unwrap().measurement().samples, 49);
    }
}
