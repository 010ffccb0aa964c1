//! Where raw counters come from.
//!
//! The collector only relies on [`CounterSource`]; [`BpfProgramSource`] is the kernel-backed
//! implementation used by the command line tool.

mod bpf;

use crate::error::SourceError;
pub use bpf::{
    BpfProgramSource,
    BpfStatsGuard,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};

/// Kernel id of the eBPF program being measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub u32);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for TargetId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl FromStr for TargetId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Cumulative counters of one program, as reported by the kernel.
///
/// Both values only ever grow while stats are enabled. They are read together but the
/// source does not promise that they are mutually atomic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounters {
    pub run_time_ns: u64,
    pub run_count: u64,
}

impl RawCounters {
    pub fn new(run_time_ns: u64, run_count: u64) -> Self {
        Self { run_time_ns, run_count }
    }
}

/// Supplies the current cumulative counters for a target.
///
/// Queries are synchronous and expected to be cheap; the collector calls this once per tick.
pub trait CounterSource: Send + Sync + 'static {
    fn query(&self, target: TargetId) -> Result<RawCounters, SourceError>;
}

impl<S: CounterSource + ?Sized> CounterSource for std::sync::Arc<S> {
    fn query(&self, target: TargetId) -> Result<RawCounters, SourceError> {
        (**self).query(target)
    }
}

impl<S: CounterSource + ?Sized> CounterSource for Box<S> {
    fn query(&self, target: TargetId) -> Result<RawCounters, SourceError> {
        (**self).query(target)
    }
}
