use crate::source::TargetId;
use std::io;

/// A failed query against the counter source. Never fatal to a running collector.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("eBPF program {0} not found")]
    NotFound(TargetId),
    #[error("reading stats of eBPF program {target} failed: {source}")]
    Unavailable {
        target: TargetId,
        #[source]
        source: io::Error,
    },
    #[error("eBPF program statistics are only available on Linux")]
    Unsupported,
}

/// Lifecycle misuse, reported synchronously to the caller of the offending operation.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorError {
    #[error("collector already running")]
    AlreadyRunning,
    #[error("collector already finished its measurement")]
    AlreadyFinished,
    #[error("no samples collected yet")]
    NoSamples,
}
