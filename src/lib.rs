/*!
 * Tether - mount health supervision for rclone-backed remotes
 *
 * Keeps a set of remote-storage mounts continuously healthy: each
 * configured remote is probed against the live mount table, a stuck
 * session is torn down (signal, settle, forced unmount), and the mount
 * is re-established as a detached long-running rclone session with a
 * fixed set of caching and resilience options. A backup job that is
 * about to write into a mount calls [`ensure_remote_healthy`] first and
 * treats any non-success terminal state as a hard failure.
 *
 * The supervisor is stateless and idempotent per invocation; it is
 * meant to be run periodically by an external scheduler.
 */

pub mod config;
pub mod error;
pub mod eventlog;
pub mod logging;
pub mod supervisor;

pub use config::{RemoteMountSpec, SupervisorConfig};
pub use error::{Result, SupervisorError, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS};
pub use eventlog::EventLog;
pub use supervisor::{
    ensure_remote_healthy, HostSystem, MountSystem, PassReport, Reconciler, TerminalState,
};
