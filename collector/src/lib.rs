//! # bpfstat collector
//!
//! Time-bounded sampling of a running eBPF program's kernel counters.
//!
//! - **`stats`**: online accumulator (Welford) shared between the polling task and snapshot readers
//! - **`derive`**: per-metric strategies turning raw cumulative counters into one scalar sample
//! - **`source`**: the counter source contract and its `bpf(2)` implementation
//! - **`collector`**: the generic polling loop and its lifecycle
//! - **`snapshot`**: assembles an immutable [`Parameter`] from the accumulator
//! - **`parameter`**: the output record handed to renderers

#[macro_use]
extern crate tracing;

mod collector;
pub mod derive;
mod error;
pub mod parameter;
mod snapshot;
pub mod source;
mod stats;

pub use collector::{
    Collector,
    CollectorState,
    Phase,
    Termination,
};
pub use derive::{
    CpuDerivation,
    Derivation,
    LatencyDerivation,
    MetricKind,
};
pub use error::{
    CollectorError,
    SourceError,
};
pub use parameter::{
    CpuStats,
    LatencyStats,
    Measurement,
    Parameter,
};
pub use source::{
    BpfProgramSource,
    BpfStatsGuard,
    CounterSource,
    RawCounters,
    TargetId,
};
pub use stats::{
    Stats,
    Summary,
};
