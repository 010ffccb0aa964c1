use super::{
    CounterSource,
    RawCounters,
    TargetId,
};
use crate::error::SourceError;
use std::io;

/// Reads `run_time_ns` / `run_cnt` of a loaded eBPF program from the kernel.
///
/// Every query walks the loaded programs afresh, so a program that gets unloaded
/// mid-measurement shows up as [`SourceError::NotFound`] on the next poll.
#[derive(Debug, Default, Clone, Copy)]
pub struct BpfProgramSource;

impl BpfProgramSource {
    pub fn new() -> Self {
        Self
    }
}

impl CounterSource for BpfProgramSource {
    #[cfg(target_os = "linux")]
    fn query(&self, target: TargetId) -> Result<RawCounters, SourceError> {
        let programs = aya::programs::loaded_programs().map(|program| {
            program.map_err(into_io_error).map(|info| {
                let run_time_ns = u64::try_from(info.run_time().as_nanos()).unwrap_or(u64::MAX);
                (info.id(), RawCounters::new(run_time_ns, info.run_count()))
            })
        });
        find_program(target, programs)
    }

    #[cfg(not(target_os = "linux"))]
    fn query(&self, _target: TargetId) -> Result<RawCounters, SourceError> {
        Err(SourceError::Unsupported)
    }
}

#[cfg(target_os = "linux")]
fn into_io_error(err: aya::programs::ProgramError) -> io::Error {
    match err {
        aya::programs::ProgramError::SyscallError(err) => err.io_error,
        other => io::Error::other(other.to_string()),
    }
}

/// Picks `target` out of a listing of `(id, counters)`.
///
/// Programs that vanish while being listed report `ENOENT` and are skipped. Any other
/// failure means the listing is incomplete, so the target is `Unavailable` rather than
/// `NotFound`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn find_program<I>(target: TargetId, programs: I) -> Result<RawCounters, SourceError>
where
    I: IntoIterator<Item = io::Result<(u32, RawCounters)>>,
{
    let mut failure = None;
    for program in programs {
        match program {
            Ok((id, counters)) if id == target.0 => return Ok(counters),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }
    Err(match failure {
        Some(source) => SourceError::Unavailable { target, source },
        None => SourceError::NotFound(target),
    })
}

/// Keeps kernel run-time accounting for eBPF programs switched on while alive.
///
/// The kernel only advances the counters while at least one such fd is open or the
/// `kernel.bpf_stats_enabled` sysctl is set.
#[derive(Debug)]
pub struct BpfStatsGuard {
    #[cfg(target_os = "linux")]
    _fd: std::os::fd::OwnedFd,
}

impl BpfStatsGuard {
    #[cfg(target_os = "linux")]
    pub fn enable() -> io::Result<Self> {
        let fd = aya::sys::enable_stats(aya::sys::Stats::RunTime).map_err(|err| err.io_error)?;
        debug!("enabled eBPF run time stats");
        Ok(Self { _fd: fd })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn enable() -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            SourceError::Unsupported.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn listed(id: u32, run_time_ns: u64, run_count: u64) -> io::Result<(u32, RawCounters)> {
        Ok((id, RawCounters::new(run_time_ns, run_count)))
    }

    #[test]
    fn finds_target_among_loaded_programs() {
        let programs = [listed(3, 10, 1), listed(42, 9_000, 3), listed(57, 1, 1)];
        assert_eq!(
            find_program(TargetId(42), programs).unwrap(),
            RawCounters::new(9_000, 3)
        );
    }

    #[test]
    fn vanished_programs_are_skipped() {
        let programs = [
            Err(io::Error::from_raw_os_error(2)),
            listed(42, 500, 5),
        ];
        assert_eq!(find_program(TargetId(42), programs).unwrap(), RawCounters::new(500, 5));
    }

    #[test]
    fn absent_target_is_not_found() {
        let programs = [listed(3, 10, 1), Err(io::Error::from(io::ErrorKind::NotFound))];
        assert!(matches!(
            find_program(TargetId(42), programs),
            Err(SourceError::NotFound(TargetId(42)))
        ));
    }

    #[test]
    fn listing_failure_is_unavailable() {
        let programs = [Err(io::Error::from(io::ErrorKind::PermissionDenied))];
        match find_program(TargetId(42), programs) {
            Err(SourceError::Unavailable { target, source }) => {
                assert_eq!(target, TargetId(42));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn unknown_program_is_not_found_or_unavailable() {
        // id 0 is never assigned; without CAP_SYS_ADMIN the listing fails with EPERM instead
        match BpfProgramSource::new().query(TargetId(0)) {
            Err(SourceError::NotFound(TargetId(0))) | Err(SourceError::Unavailable { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
