/*!
 * Configuration types for Tether
 *
 * The whole configuration is read once at startup into an immutable
 * `SupervisorConfig` and passed by reference into every component; no
 * component reads ambient global state.
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::warn;

use crate::error::{Result, SupervisorError};

/// Default location of the supervisor configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tether/tether.toml";

/// Fallback rclone binary path when `which rclone` finds nothing
const RCLONE_FALLBACK_PATH: &str = "/usr/bin/rclone";

/// Top-level supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Path to the rclone binary (None = discover via `which rclone`)
    #[serde(default)]
    pub rclone_binary: Option<PathBuf>,

    /// Path to the rclone configuration file
    #[serde(default = "default_rclone_config")]
    pub rclone_config: PathBuf,

    /// Path to the supervisor's own event log (separate from each
    /// remote's rclone session log)
    #[serde(default = "default_event_log")]
    pub event_log: PathBuf,

    /// Event log rotation thresholds
    #[serde(default)]
    pub rotation: RotationPolicy,

    /// Settle interval in seconds after a disruptive OS operation
    /// (signal, unmount), to let kernel state converge
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,

    /// Post-activation confirmation behavior
    #[serde(default)]
    pub confirm: ConfirmPolicy,

    /// Remotes to supervise, processed sequentially in this order
    #[serde(default)]
    pub remotes: Vec<RemoteMountSpec>,
}

/// Line-count rotation policy for the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Rotate once the log reaches this many lines
    #[serde(default = "default_trim_threshold")]
    pub trim_threshold: usize,

    /// Number of oldest lines removed per rotation
    #[serde(default = "default_trim_lines")]
    pub trim_lines: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            trim_threshold: default_trim_threshold(),
            trim_lines: default_trim_lines(),
        }
    }
}

/// How activation success is confirmed after the launch command exits 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMode {
    /// Re-probe the mount point until it attaches or the window expires
    Poll,
    /// Legacy parity: report success as soon as the launch is accepted,
    /// without re-probing (FUSE attachment can lag the launch)
    Assume,
}

/// Bounded post-activation confirmation poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPolicy {
    #[serde(default = "default_confirm_mode")]
    pub mode: ConfirmMode,

    /// Total confirmation window in seconds
    #[serde(default = "default_confirm_timeout_secs")]
    pub timeout_secs: u64,

    /// Re-probe interval in seconds
    #[serde(default = "default_confirm_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            mode: default_confirm_mode(),
            timeout_secs: default_confirm_timeout_secs(),
            interval_secs: default_confirm_interval_secs(),
        }
    }
}

/// Configuration for one monitored remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMountSpec {
    /// rclone remote name; doubles as the process-matching token
    pub remote_name: String,

    /// Absolute mount point path
    pub mount_point: PathBuf,

    /// rclone session log for this remote
    pub log_path: PathBuf,

    /// VFS cache size bound, e.g. "100G"
    pub cache_budget: String,
}

impl RemoteMountSpec {
    /// The remote as rclone names it on the command line ("name:")
    pub fn remote_target(&self) -> String {
        format!("{}:", self.remote_name)
    }

    /// Return a copy with the mount point stripped of trailing separators
    pub fn normalized(&self) -> Self {
        let raw = self.mount_point.to_string_lossy();
        let trimmed = raw.trim_end_matches('/');
        let mount_point = if trimmed.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(trimmed)
        };
        Self {
            mount_point,
            ..self.clone()
        }
    }

    /// Validate one remote spec. Called per remote by the reconciler so
    /// that a bad entry skips only itself.
    pub fn validate(&self) -> Result<()> {
        if self.remote_name.is_empty() {
            return Err(SupervisorError::Config(
                "remote_name must not be empty".to_string(),
            ));
        }
        if self
            .remote_name
            .chars()
            .any(|c| c == ':' || c == '/' || c.is_whitespace())
        {
            return Err(SupervisorError::Config(format!(
                "remote_name '{}' must not contain ':', '/' or whitespace",
                self.remote_name
            )));
        }
        if !self.mount_point.is_absolute() {
            return Err(SupervisorError::Config(format!(
                "mount_point '{}' must be an absolute path",
                self.mount_point.display()
            )));
        }
        if self.normalized().mount_point == Path::new("/") {
            return Err(SupervisorError::Config(
                "mount_point must not be the filesystem root".to_string(),
            ));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(SupervisorError::Config(format!(
                "log_path for remote '{}' must not be empty",
                self.remote_name
            )));
        }
        if !is_valid_size(&self.cache_budget) {
            return Err(SupervisorError::Config(format!(
                "cache_budget '{}' for remote '{}' is not a valid size (e.g. \"100G\")",
                self.cache_budget, self.remote_name
            )));
        }
        Ok(())
    }
}

impl SupervisorConfig {
    /// Load and validate the configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            SupervisorError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        let config: SupervisorConfig = toml::from_str(&raw).map_err(|e| {
            SupervisorError::Config(format!("failed to parse '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate pass-wide invariants. Per-remote field validation is
    /// deferred to the reconciler, which isolates a bad entry to itself;
    /// duplicate names are rejected here because two entries sharing a
    /// name would tear down each other's mount sessions.
    pub fn validate(&self) -> Result<()> {
        if self.rotation.trim_lines == 0 {
            return Err(SupervisorError::Config(
                "rotation.trim_lines must be greater than zero".to_string(),
            ));
        }
        if self.rotation.trim_lines > self.rotation.trim_threshold {
            return Err(SupervisorError::Config(format!(
                "rotation.trim_lines ({}) must not exceed rotation.trim_threshold ({})",
                self.rotation.trim_lines, self.rotation.trim_threshold
            )));
        }
        if self.confirm.interval_secs == 0 {
            return Err(SupervisorError::Config(
                "confirm.interval_secs must be greater than zero".to_string(),
            ));
        }

        let mut seen: Vec<&str> = Vec::new();
        for remote in &self.remotes {
            if seen.contains(&remote.remote_name.as_str()) {
                return Err(SupervisorError::Config(format!(
                    "duplicate remote_name '{}'",
                    remote.remote_name
                )));
            }
            seen.push(&remote.remote_name);
        }
        Ok(())
    }

    /// Resolve the rclone binary: the configured path if set, otherwise
    /// `which rclone`, otherwise a common default with a warning.
    pub fn resolve_rclone_binary(&self) -> PathBuf {
        if let Some(ref binary) = self.rclone_binary {
            return binary.clone();
        }
        if let Ok(output) = Command::new("which").arg("rclone").output() {
            if output.status.success() {
                let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !found.is_empty() {
                    return PathBuf::from(found);
                }
            }
        }
        warn!(
            "rclone not found in PATH; falling back to {}",
            RCLONE_FALLBACK_PATH
        );
        PathBuf::from(RCLONE_FALLBACK_PATH)
    }
}

/// Accept rclone-style size strings: an integer count with an optional
/// binary-unit suffix (K/M/G/T/P, with optional "B" or "iB")
fn is_valid_size(value: &str) -> bool {
    let value = value.trim();
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return false;
    }
    let suffix = &value[digits.len()..];
    matches!(
        suffix,
        "" | "B"
            | "K" | "KB" | "KiB"
            | "M" | "MB" | "MiB"
            | "G" | "GB" | "GiB"
            | "T" | "TB" | "TiB"
            | "P" | "PB" | "PiB"
    )
}

fn default_rclone_config() -> PathBuf {
    PathBuf::from("/root/.config/rclone/rclone.conf")
}

fn default_event_log() -> PathBuf {
    PathBuf::from("/var/log/tether/tether.log")
}

fn default_settle_secs() -> u64 {
    2
}

fn default_trim_threshold() -> usize {
    2000
}

fn default_trim_lines() -> usize {
    1000
}

fn default_confirm_mode() -> ConfirmMode {
    ConfirmMode::Poll
}

fn default_confirm_timeout_secs() -> u64 {
    30
}

fn default_confirm_interval_secs() -> u64 {
    2
}
