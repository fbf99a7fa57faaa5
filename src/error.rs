/*!
 * Error types for Tether
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::eventlog::EventLogError;

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum SupervisorError {
    /// Configuration error (bad file, invalid remote spec)
    Config(String),

    /// I/O error
    Io(io::Error),

    /// Mount-table probe failed; callers treat the mount as inactive
    Probe(String),

    /// Failed to deliver a termination signal to one managing process
    Signal { pid: u32, message: String },

    /// Forced unmount of a stale mount entry failed; fatal for that
    /// remote's pass, activation must not run
    ForcedUnmount {
        mount_point: PathBuf,
        message: String,
    },

    /// The mount session launch command was rejected by the OS or
    /// exited non-zero
    ActivationLaunch { remote: String, message: String },

    /// The launch was accepted but the mount never attached within the
    /// confirmation window
    ActivationUnconfirmed { remote: String, waited_secs: u64 },

    /// Event log error
    EventLog(String),
}

impl SupervisorError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // Fatal: the supervisor cannot run at all without valid config
            SupervisorError::Config(_) => EXIT_FATAL,
            // Everything else is scoped to a single remote's pass
            _ => EXIT_PARTIAL,
        }
    }

    /// Check if this error ends the remote's pass before activation.
    ///
    /// A stale mount that cannot be forced off must never be mounted
    /// over; every other teardown-stage error is tolerated.
    pub fn halts_remote_pass(&self) -> bool {
        matches!(self, SupervisorError::ForcedUnmount { .. })
    }
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            SupervisorError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            SupervisorError::Probe(msg) => {
                write!(f, "Mount probe error: {}", msg)
            }
            SupervisorError::Signal { pid, message } => {
                write!(f, "Failed to signal PID {}: {}", pid, message)
            }
            SupervisorError::ForcedUnmount {
                mount_point,
                message,
            } => {
                write!(
                    f,
                    "Forced unmount of '{}' failed: {}",
                    mount_point.display(),
                    message
                )
            }
            SupervisorError::ActivationLaunch { remote, message } => {
                write!(f, "Mount launch for '{}' failed: {}", remote, message)
            }
            SupervisorError::ActivationUnconfirmed {
                remote,
                waited_secs,
            } => {
                write!(
                    f,
                    "Mount for '{}' did not attach within {}s of launch",
                    remote, waited_secs
                )
            }
            SupervisorError::EventLog(msg) => {
                write!(f, "Event log error: {}", msg)
            }
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SupervisorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SupervisorError {
    fn from(err: io::Error) -> Self {
        SupervisorError::Io(err)
    }
}

impl From<EventLogError> for SupervisorError {
    fn from(err: EventLogError) -> Self {
        SupervisorError::EventLog(err.to_string())
    }
}
