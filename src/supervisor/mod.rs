/*!
 * Mount health supervision: probe, teardown, activation, reconciliation
 */

pub mod activate;
pub mod command;
pub mod reconcile;
pub mod system;
pub mod teardown;

pub use command::MountCommand;
pub use reconcile::{ensure_remote_healthy, PassReport, Reconciler, RemoteOutcome, TerminalState};
pub use system::{HostSystem, MountSystem};
pub use teardown::TeardownReport;
