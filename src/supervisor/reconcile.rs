/*!
 * Remote health reconciliation
 *
 * One pass over the configured remotes, each driven through the state
 * machine Checking -> {Healthy | TearingDown -> Activating ->
 * {Activated | ActivationFailed} | TeardownFailed} to a terminal state.
 * Remotes are processed sequentially, in configured order: mount and
 * unmount operations must not race, and every OS call here blocks over
 * multi-second settle windows anyway. One remote's failure never stops
 * the remotes after it.
 */

use std::time::Duration;

use tracing::error;

use crate::config::{RemoteMountSpec, SupervisorConfig};
use crate::eventlog::EventLog;
use crate::supervisor::activate::activate;
use crate::supervisor::command::MountCommand;
use crate::supervisor::system::MountSystem;
use crate::supervisor::teardown::teardown;

/// Terminal state of one remote's pass
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalState {
    /// Probe found the mount already active; nothing done
    Healthy,

    /// Mount session relaunched (and, outside legacy mode, confirmed)
    Activated,

    /// A stale mount entry could not be forced off; activation was not
    /// attempted
    TeardownFailed(String),

    /// The relaunch was rejected or never attached
    ActivationFailed(String),

    /// The remote spec failed validation and never entered Checking;
    /// counted separately from operational failures
    InvalidSpec(String),
}

impl TerminalState {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalState::Healthy | TerminalState::Activated)
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, TerminalState::InvalidSpec(_))
    }
}

/// Outcome of one remote within a pass
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOutcome {
    pub remote: String,
    pub state: TerminalState,
}

/// Outcome of a whole reconciliation pass
#[derive(Debug, Default)]
pub struct PassReport {
    pub outcomes: Vec<RemoteOutcome>,
}

impl PassReport {
    pub fn all_successful(&self) -> bool {
        self.outcomes.iter().all(|o| o.state.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RemoteOutcome> {
        self.outcomes.iter().filter(|o| !o.state.is_success())
    }

    /// Operational failures, excluding rejected specs
    pub fn operational_failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.state.is_success() && !o.state.is_config_error())
            .count()
    }

    pub fn config_error_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state.is_config_error())
            .count()
    }
}

/// Drives every configured remote to a terminal state once per run.
///
/// Stateless across invocations: mount health is re-derived from the
/// live OS on every pass, so repeated runs converge without durable
/// state and overlapping scheduled runs only repeat idempotent work.
pub struct Reconciler<'a> {
    config: &'a SupervisorConfig,
    system: &'a dyn MountSystem,
    log: &'a EventLog,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a SupervisorConfig, system: &'a dyn MountSystem, log: &'a EventLog) -> Self {
        Self {
            config,
            system,
            log,
        }
    }

    /// Run one reconciliation pass over all configured remotes
    pub fn run_pass(&self) -> PassReport {
        self.log
            .record("starting mount check for all configured remotes");

        let mut report = PassReport::default();
        for spec in &self.config.remotes {
            report.outcomes.push(RemoteOutcome {
                remote: spec.remote_name.clone(),
                state: self.reconcile_remote(spec),
            });
        }

        self.log.record(&format!(
            "mount check finished: {} ok, {} failed, {} invalid",
            report.outcomes.iter().filter(|o| o.state.is_success()).count(),
            report.operational_failure_count(),
            report.config_error_count()
        ));
        report
    }

    /// Drive one remote to its terminal state
    pub fn reconcile_remote(&self, spec: &RemoteMountSpec) -> TerminalState {
        if let Err(e) = spec.validate() {
            self.log.record(&format!(
                "invalid remote configuration, skipping this entry: {}",
                e
            ));
            return TerminalState::InvalidSpec(e.to_string());
        }
        let spec = spec.normalized();
        let settle = Duration::from_secs(self.config.settle_secs);

        self.log.record(&format!(
            "checking mount for remote '{}' at '{}'",
            spec.remote_name,
            spec.mount_point.display()
        ));

        if self.system.is_mount_active(&spec.mount_point) {
            self.log.record(&format!(
                "mount for '{}' is active; no intervention needed",
                spec.remote_name
            ));
            return TerminalState::Healthy;
        }

        self.log.record(&format!(
            "mount for '{}' is not active; starting cleanup and remount",
            spec.remote_name
        ));

        if let Err(e) = teardown(self.system, self.log, &spec, settle) {
            error!("teardown for '{}' failed: {}", spec.remote_name, e);
            return TerminalState::TeardownFailed(e.to_string());
        }

        let command = MountCommand::new(
            &self.config.resolve_rclone_binary(),
            &self.config.rclone_config,
            &spec,
        );
        match activate(self.system, self.log, &command, &self.config.confirm) {
            Ok(()) => {
                self.log
                    .record(&format!("remote '{}' activated", spec.remote_name));
                TerminalState::Activated
            }
            Err(e) => {
                self.log.record(&format!("{}", e));
                TerminalState::ActivationFailed(e.to_string())
            }
        }
    }
}

/// The single "ensure mount is healthy" operation collaborators call
/// before depending on a mount (e.g. a backup job about to move an
/// artifact into it). Any non-success terminal state is a hard failure
/// for the caller: do not write into an unconfirmed mount.
pub fn ensure_remote_healthy(
    config: &SupervisorConfig,
    system: &dyn MountSystem,
    log: &EventLog,
    remote_name: &str,
) -> TerminalState {
    let Some(spec) = config
        .remotes
        .iter()
        .find(|spec| spec.remote_name == remote_name)
    else {
        let message = format!("remote '{}' is not configured", remote_name);
        log.record(&message);
        return TerminalState::InvalidSpec(message);
    };
    Reconciler::new(config, system, log).reconcile_remote(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfirmMode, ConfirmPolicy, RotationPolicy};
    use crate::supervisor::testing::MockSystem;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::{tempdir, TempDir};

    fn spec(name: &str, mount: &str) -> RemoteMountSpec {
        RemoteMountSpec {
            remote_name: name.to_string(),
            mount_point: PathBuf::from(mount),
            log_path: PathBuf::from(format!("/var/log/rclone_{}.log", name)),
            cache_budget: "100G".to_string(),
        }
    }

    fn config(dir: &TempDir, remotes: Vec<RemoteMountSpec>) -> SupervisorConfig {
        let mut config: SupervisorConfig = toml::from_str("").unwrap();
        config.rclone_binary = Some(PathBuf::from("/usr/bin/rclone"));
        config.settle_secs = 0;
        config.confirm = ConfirmPolicy {
            mode: ConfirmMode::Poll,
            timeout_secs: 4,
            interval_secs: 2,
        };
        // Mount points live under the temp dir so activation's mkdir is
        // harmless, but the paths recorded in the specs stay absolute
        config.event_log = dir.path().join("events.log");
        config.remotes = remotes;
        config
    }

    fn event_log(config: &SupervisorConfig) -> EventLog {
        EventLog::new(config.event_log.clone(), RotationPolicy::default())
    }

    fn mount_under(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn test_healthy_fleet_is_left_untouched() {
        let dir = tempdir().unwrap();
        let a = mount_under(&dir, "a");
        let b = mount_under(&dir, "b");
        let config = config(&dir, vec![spec("drive", &a), spec("dropbox", &b)]);
        let log = event_log(&config);
        let system = MockSystem::new();
        system.set_active(Path::new(&a), true);
        system.set_active(Path::new(&b), true);

        // Two passes in a row: no signals, no unmounts, no launches
        for _ in 0..2 {
            let report = Reconciler::new(&config, &system, &log).run_pass();
            assert!(report.all_successful());
            assert!(report
                .outcomes
                .iter()
                .all(|o| o.state == TerminalState::Healthy));
        }
        assert!(system.terminated.borrow().is_empty());
        assert_eq!(system.unmount_calls.get(), 0);
        assert!(system.launches.borrow().is_empty());
    }

    #[test]
    fn test_dead_session_is_relaunched() {
        // Remote down, no managing process, no stale mount: teardown is
        // a no-op and activation brings it back
        let dir = tempdir().unwrap();
        let mount = mount_under(&dir, "drive");
        let config = config(&dir, vec![spec("drive", &mount)]);
        let log = event_log(&config);
        let system = MockSystem::new();

        let report = Reconciler::new(&config, &system, &log).run_pass();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].state, TerminalState::Activated);
        assert_eq!(system.launches.borrow().len(), 1);
        assert!(system.launches.borrow()[0].contains("drive:"));
        assert_eq!(system.unmount_calls.get(), 0);

        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("no managing process found"));
        assert!(contents.contains("remote 'drive' activated"));
    }

    #[test]
    fn test_stuck_stale_mount_never_reaches_activation() {
        let dir = tempdir().unwrap();
        let mount = mount_under(&dir, "dropbox");
        let config = config(&dir, vec![spec("dropbox", &mount)]);
        let log = event_log(&config);
        let system = MockSystem::new();
        system.set_pids("dropbox", vec![4242]);
        // Inactive at the initial check, still attached at the re-probe
        system.script_probe(Path::new(&mount), vec![false, true]);
        system.fail_unmount.set(true);

        let report = Reconciler::new(&config, &system, &log).run_pass();

        assert!(matches!(
            report.outcomes[0].state,
            TerminalState::TeardownFailed(_)
        ));
        assert_eq!(*system.terminated.borrow(), vec![4242]);
        assert_eq!(system.unmount_calls.get(), 1);
        assert!(system.launches.borrow().is_empty());
    }

    #[test]
    fn test_one_remote_failure_does_not_stop_the_next() {
        let dir = tempdir().unwrap();
        let a = mount_under(&dir, "a");
        let b = mount_under(&dir, "b");
        let config = config(&dir, vec![spec("drive", &a), spec("dropbox", &b)]);
        let log = event_log(&config);
        let system = MockSystem::new();
        // Remote A: stale mount that cannot be forced off
        system.script_probe(Path::new(&a), vec![false, true]);
        system.fail_unmount.set(true);
        // Remote B: healthy
        system.set_active(Path::new(&b), true);

        let report = Reconciler::new(&config, &system, &log).run_pass();

        assert_eq!(report.outcomes.len(), 2);
        assert!(matches!(
            report.outcomes[0].state,
            TerminalState::TeardownFailed(_)
        ));
        assert_eq!(report.outcomes[1].state, TerminalState::Healthy);
        assert_eq!(report.operational_failure_count(), 1);
        assert!(!report.all_successful());
    }

    #[test]
    fn test_invalid_spec_is_isolated_and_counted_separately() {
        let dir = tempdir().unwrap();
        let b = mount_under(&dir, "b");
        let config = config(&dir, vec![spec("", "/mnt/broken"), spec("dropbox", &b)]);
        let log = event_log(&config);
        let system = MockSystem::new();
        system.set_active(Path::new(&b), true);

        let report = Reconciler::new(&config, &system, &log).run_pass();

        assert!(matches!(
            report.outcomes[0].state,
            TerminalState::InvalidSpec(_)
        ));
        assert_eq!(report.outcomes[1].state, TerminalState::Healthy);
        assert_eq!(report.config_error_count(), 1);
        assert_eq!(report.operational_failure_count(), 0);

        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("invalid remote configuration"));
    }

    #[test]
    fn test_rejected_launch_is_activation_failure() {
        let dir = tempdir().unwrap();
        let mount = mount_under(&dir, "drive");
        let config = config(&dir, vec![spec("drive", &mount)]);
        let log = event_log(&config);
        let system = MockSystem::new();
        system.fail_launch.set(true);

        let report = Reconciler::new(&config, &system, &log).run_pass();
        assert!(matches!(
            report.outcomes[0].state,
            TerminalState::ActivationFailed(_)
        ));
    }

    #[test]
    fn test_unconfirmed_mount_is_activation_failure() {
        let dir = tempdir().unwrap();
        let mount = mount_under(&dir, "drive");
        let config = config(&dir, vec![spec("drive", &mount)]);
        let log = event_log(&config);
        let system = MockSystem::new();
        system.launch_attaches.set(false);

        let report = Reconciler::new(&config, &system, &log).run_pass();
        match &report.outcomes[0].state {
            TerminalState::ActivationFailed(message) => {
                assert!(message.contains("did not attach"));
            }
            other => panic!("expected ActivationFailed, got {:?}", other),
        }
        // The launch itself happened
        assert_eq!(system.launches.borrow().len(), 1);
    }

    #[test]
    fn test_legacy_assume_mode_reports_activated_without_probe() {
        let dir = tempdir().unwrap();
        let mount = mount_under(&dir, "drive");
        let mut config = config(&dir, vec![spec("drive", &mount)]);
        config.confirm.mode = ConfirmMode::Assume;
        let log = event_log(&config);
        let system = MockSystem::new();
        system.launch_attaches.set(false);

        let report = Reconciler::new(&config, &system, &log).run_pass();
        assert_eq!(report.outcomes[0].state, TerminalState::Activated);
    }

    #[test]
    fn test_ensure_remote_healthy_for_configured_remote() {
        let dir = tempdir().unwrap();
        let mount = mount_under(&dir, "drive");
        let config = config(&dir, vec![spec("drive", &mount)]);
        let log = event_log(&config);
        let system = MockSystem::new();
        system.set_active(Path::new(&mount), true);

        let state = ensure_remote_healthy(&config, &system, &log, "drive");
        assert_eq!(state, TerminalState::Healthy);
        assert!(state.is_success());
    }

    #[test]
    fn test_ensure_remote_healthy_for_unknown_remote() {
        let dir = tempdir().unwrap();
        let config = config(&dir, vec![]);
        let log = event_log(&config);
        let system = MockSystem::new();

        let state = ensure_remote_healthy(&config, &system, &log, "nope");
        assert!(matches!(state, TerminalState::InvalidSpec(_)));
        assert!(!state.is_success());
    }
}
