/*!
 * OS seam for mount supervision
 *
 * Every OS-facing call the supervisor makes (mount-table probe, process
 * enumeration, signal delivery, forced unmount, session launch, settle
 * sleep) goes through the `MountSystem` trait, so the reconciliation
 * logic can be driven against a scripted implementation in tests.
 */

use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use sysinfo::{Pid, Signal, System};
use tracing::debug;

use crate::error::{Result, SupervisorError};
use crate::supervisor::command::MountCommand;

/// Blocking OS operations used during a reconciliation pass
pub trait MountSystem {
    /// Whether `path` is currently an active mount. Any probe error is
    /// reported as `false`: an unprobeable mount is treated as unhealthy
    /// rather than crashing the pass.
    fn is_mount_active(&self, path: &Path) -> bool;

    /// PIDs of processes running a mount session for `remote_name`.
    /// Empty when none exist; never an error.
    fn find_managing_processes(&self, remote_name: &str) -> Vec<u32>;

    /// Deliver a termination signal to one managing process
    fn terminate(&self, pid: u32) -> Result<()>;

    /// Forcibly unmount a stale mount entry
    fn force_unmount(&self, path: &Path) -> Result<()>;

    /// Launch the mount session; success means the launch command was
    /// accepted (exit status 0), not that the mount is attached
    fn launch(&self, command: &MountCommand) -> Result<()>;

    /// Wait for kernel state to converge after a disruptive operation
    fn settle(&self, interval: Duration);
}

/// `MountSystem` backed by the live host
pub struct HostSystem;

impl MountSystem for HostSystem {
    fn is_mount_active(&self, path: &Path) -> bool {
        Command::new("mountpoint")
            .arg("-q")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn find_managing_processes(&self, remote_name: &str) -> Vec<u32> {
        let system = System::new_all();
        let target_prefix = format!("{}:", remote_name);

        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, process)| {
                // Match the full command signature, not a bare substring:
                // an rclone binary, the mount subcommand, and the remote
                // with its colon suffix
                let cmd = process.cmd();
                let is_rclone = cmd.first().is_some_and(|argv0| {
                    Path::new(argv0)
                        .file_name()
                        .is_some_and(|name| name == "rclone")
                });
                let is_mount = cmd.get(1).and_then(|a| a.to_str()) == Some("mount");
                let targets_remote = cmd.iter().skip(2).any(|a| {
                    a.to_str()
                        .is_some_and(|a| a == target_prefix || a.starts_with(&target_prefix))
                });
                is_rclone && is_mount && targets_remote
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        let system = System::new_all();
        let Some(process) = system.process(Pid::from_u32(pid)) else {
            // Already gone; the goal state is reached
            debug!("PID {} exited before it could be signalled", pid);
            return Ok(());
        };
        match process.kill_with(Signal::Term) {
            Some(true) => Ok(()),
            Some(false) => Err(SupervisorError::Signal {
                pid,
                message: "signal delivery refused (insufficient permission?)".to_string(),
            }),
            None => Err(SupervisorError::Signal {
                pid,
                message: "SIGTERM not supported on this platform".to_string(),
            }),
        }
    }

    fn force_unmount(&self, path: &Path) -> Result<()> {
        let output = Command::new("umount")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SupervisorError::ForcedUnmount {
                mount_point: path.to_path_buf(),
                message: format!("failed to run umount: {}", e),
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(SupervisorError::ForcedUnmount {
            mount_point: path.to_path_buf(),
            message: format!(
                "umount exited {}: {}",
                output.status,
                stderr.trim()
            ),
        })
    }

    fn launch(&self, command: &MountCommand) -> Result<()> {
        let output =
            command
                .to_command()
                .output()
                .map_err(|e| SupervisorError::ActivationLaunch {
                    remote: command.remote_name().to_string(),
                    message: format!("failed to spawn launch command: {}", e),
                })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(SupervisorError::ActivationLaunch {
            remote: command.remote_name().to_string(),
            message: format!(
                "launch command exited {}: {}",
                output.status,
                stderr.trim()
            ),
        })
    }

    fn settle(&self, interval: Duration) {
        thread::sleep(interval);
    }
}
