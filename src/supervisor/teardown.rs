/*!
 * Teardown of a non-healthy mount session
 *
 * Invoked only after the probe reported the mount inactive. Signals any
 * managing processes (tolerating per-PID failures), lets the kernel
 * settle, and forces off a stale mount-table entry if one remains. A
 * stale entry that cannot be forced off is fatal for the remote's pass:
 * mounting over it risks undefined behavior.
 */

use std::time::Duration;

use crate::config::RemoteMountSpec;
use crate::error::Result;
use crate::eventlog::EventLog;
use crate::supervisor::system::MountSystem;

/// What teardown actually had to do; empty-handed teardown is a no-op
/// success (idempotence)
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// PIDs that were successfully signalled
    pub signalled: Vec<u32>,

    /// PIDs whose signal could not be delivered, with the reason
    pub signal_failures: Vec<(u32, String)>,

    /// A stale mount entry was found and forced off
    pub stale_unmounted: bool,
}

pub fn teardown(
    system: &dyn MountSystem,
    log: &EventLog,
    spec: &RemoteMountSpec,
    settle: Duration,
) -> Result<TeardownReport> {
    let mut report = TeardownReport::default();

    let pids = system.find_managing_processes(&spec.remote_name);
    if pids.is_empty() {
        log.record(&format!(
            "no managing process found for remote '{}'",
            spec.remote_name
        ));
    } else {
        log.record(&format!(
            "found mount session process(es) for remote '{}' (PID: {}); terminating",
            spec.remote_name,
            join_pids(&pids)
        ));
        for pid in pids {
            match system.terminate(pid) {
                Ok(()) => {
                    log.record(&format!("PID {} terminated", pid));
                    report.signalled.push(pid);
                }
                Err(e) => {
                    // One refused signal must not strand the rest
                    log.record(&format!("failed to terminate PID {}: {}", pid, e));
                    report.signal_failures.push((pid, e.to_string()));
                }
            }
        }
        system.settle(settle);
    }

    if system.is_mount_active(&spec.mount_point) {
        log.record(&format!(
            "mount point '{}' still attached after process cleanup; forcing unmount",
            spec.mount_point.display()
        ));
        match system.force_unmount(&spec.mount_point) {
            Ok(()) => {
                log.record(&format!(
                    "mount point '{}' unmounted",
                    spec.mount_point.display()
                ));
                report.stale_unmounted = true;
                system.settle(settle);
            }
            Err(e) => {
                // Possibly busy; do not mount over a live stale entry
                log.record(&format!("{} (mount may be busy)", e));
                return Err(e);
            }
        }
    }

    Ok(report)
}

fn join_pids(pids: &[u32]) -> String {
    pids.iter()
        .map(|pid| pid.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
