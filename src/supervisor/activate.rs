/*!
 * Mount session activation
 *
 * Prepares the mount point directory, launches the detached rclone
 * session via the structured command builder, and confirms attachment.
 * Launch success only means the OS accepted the launch; FUSE attachment
 * can lag by several seconds, so the default behavior re-probes until
 * the mount appears or the confirmation window expires. The original
 * fire-and-forget behavior remains available as `confirm.mode = "assume"`.
 */

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::{ConfirmMode, ConfirmPolicy};
use crate::error::{Result, SupervisorError};
use crate::eventlog::EventLog;
use crate::supervisor::command::MountCommand;
use crate::supervisor::system::MountSystem;

pub fn activate(
    system: &dyn MountSystem,
    log: &EventLog,
    command: &MountCommand,
    confirm: &ConfirmPolicy,
) -> Result<()> {
    prepare_mount_point(log, command.mount_point())?;

    log.record(&format!(
        "launching mount session for '{}': {}",
        command.remote_name(),
        command.rendered()
    ));
    system.launch(command)?;

    match confirm.mode {
        ConfirmMode::Assume => {
            log.record(&format!(
                "launch command for '{}' accepted; assuming the session will attach \
                 (legacy mode, not re-probed)",
                command.remote_name()
            ));
            Ok(())
        }
        ConfirmMode::Poll => confirm_attached(system, log, command, confirm),
    }
}

/// Bounded post-launch confirmation poll
fn confirm_attached(
    system: &dyn MountSystem,
    log: &EventLog,
    command: &MountCommand,
    confirm: &ConfirmPolicy,
) -> Result<()> {
    let interval = Duration::from_secs(confirm.interval_secs);
    let attempts = (confirm.timeout_secs.div_ceil(confirm.interval_secs)).max(1);

    for _ in 0..attempts {
        system.settle(interval);
        if system.is_mount_active(command.mount_point()) {
            log.record(&format!(
                "mount for '{}' confirmed attached at '{}'",
                command.remote_name(),
                command.mount_point().display()
            ));
            return Ok(());
        }
    }

    Err(SupervisorError::ActivationUnconfirmed {
        remote: command.remote_name().to_string(),
        waited_secs: confirm.timeout_secs,
    })
}

/// Create the mount point directory when missing; warn when it exists
/// but is not writable (VFS operations may fail later)
fn prepare_mount_point(log: &EventLog, mount_point: &Path) -> Result<()> {
    if !mount_point.exists() {
        log.record(&format!(
            "mount point '{}' does not exist; creating it",
            mount_point.display()
        ));
        fs::create_dir_all(mount_point)?;
        return Ok(());
    }
    if let Ok(metadata) = mount_point.metadata() {
        if metadata.permissions().readonly() {
            log.record(&format!(
                "warning: mount point '{}' is not writable",
                mount_point.display()
            ));
        }
    }
    Ok(())
}
