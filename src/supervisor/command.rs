/*!
 * Structured builder for the mount session launch command
 *
 * The launch command is an ordered list of flags and (flag, value) pairs
 * rendered into argv entries, never into an interpolated shell string;
 * values reach the OS exactly as configured.
 */

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::RemoteMountSpec;

/// One argv element of the launch command
#[derive(Debug, Clone, PartialEq)]
enum MountArg {
    Flag(&'static str),
    Value(&'static str, OsString),
}

/// A fully specified `rclone mount` invocation for one remote.
///
/// The option set is fixed: these are product requirements for a
/// long-running backup-destination mount, not tunables.
#[derive(Debug, Clone)]
pub struct MountCommand {
    binary: PathBuf,
    remote_name: String,
    target: String,
    mount_point: PathBuf,
    args: Vec<MountArg>,
}

impl MountCommand {
    pub fn new(binary: &Path, rclone_config: &Path, spec: &RemoteMountSpec) -> Self {
        let args = vec![
            MountArg::Value("--config", rclone_config.into()),
            MountArg::Flag("--allow-other"),
            // Cache is populated on write, not full-file prefetch
            MountArg::Value("--vfs-cache-mode", "writes".into()),
            MountArg::Value("--vfs-cache-max-age", "24h".into()),
            MountArg::Value("--vfs-cache-max-size", spec.cache_budget.as_str().into()),
            MountArg::Value("--dir-cache-time", "72h".into()),
            MountArg::Value("--poll-interval", "1m".into()),
            MountArg::Value("--log-file", spec.log_path.as_os_str().into()),
            MountArg::Value("--log-level", "INFO".into()),
            MountArg::Value("--timeout", "1h".into()),
            MountArg::Value("--retries", "3".into()),
            // The session forks into a daemon and survives this process
            MountArg::Flag("--daemon"),
        ];
        Self {
            binary: binary.to_path_buf(),
            remote_name: spec.remote_name.clone(),
            target: spec.remote_target(),
            mount_point: spec.mount_point.clone(),
            args,
        }
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Render into an executable `Command` with discrete argv entries
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg("mount").arg(&self.target).arg(&self.mount_point);
        for arg in &self.args {
            match arg {
                MountArg::Flag(flag) => {
                    command.arg(flag);
                }
                MountArg::Value(flag, value) => {
                    command.arg(flag).arg(value);
                }
            }
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command
    }

    /// Human-readable rendering for the event log
    pub fn rendered(&self) -> String {
        let mut parts: Vec<String> = vec![
            self.binary.to_string_lossy().into_owned(),
            "mount".to_string(),
            self.target.clone(),
            self.mount_point.to_string_lossy().into_owned(),
        ];
        for arg in &self.args {
            match arg {
                MountArg::Flag(flag) => parts.push(flag.to_string()),
                MountArg::Value(flag, value) => {
                    parts.push(flag.to_string());
                    parts.push(value.to_string_lossy().into_owned());
                }
            }
        }
        parts.join(" ")
    }
}
