use std::error::Error;
use std::fmt;

/// Typed outcome of a user-initiated command. Every variant carries
/// enough context for a human-readable message; none of them is fatal to
/// the monitor itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    ProcessNotFound(u32),
    AccessDenied(u32),
    /// `Realtime` priority was requested without the explicit
    /// confirmation step the contract demands.
    RealtimeNotConfirmed,
    Unsupported(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::ProcessNotFound(pid) => {
                write!(f, "process {pid} not found; it may have already exited")
            }
            CommandError::AccessDenied(pid) => {
                write!(f, "access denied for process {pid}; insufficient privileges")
            }
            CommandError::RealtimeNotConfirmed => {
                write!(
                    f,
                    "realtime priority affects host stability and requires explicit confirmation"
                )
            }
            CommandError::Unsupported(what) => write!(f, "unsupported operation: {what}"),
        }
    }
}

impl Error for CommandError {}

/// Failure modes of the per-process utilization tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricError {
    /// The process exited between observation and attach, or the
    /// sampling backend refused the registration.
    Unavailable,
    /// The tracker handle was already released.
    Closed,
}

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricError::Unavailable => write!(f, "utilization sampling unavailable"),
            MetricError::Closed => write!(f, "tracker already closed"),
        }
    }
}

impl Error for MetricError {}
