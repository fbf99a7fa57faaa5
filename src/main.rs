/*!
 * Tether CLI - run one reconciliation pass and exit
 *
 * Intended to be invoked periodically by an external scheduler (cron,
 * a systemd timer); there is nothing to do beyond "run".
 */

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};

use tether::config::DEFAULT_CONFIG_PATH;
use tether::{
    logging, EventLog, HostSystem, Reconciler, SupervisorConfig, EXIT_FATAL, EXIT_PARTIAL,
    EXIT_SUCCESS,
};

#[derive(Parser)]
#[command(name = "tether")]
#[command(
    version,
    about = "Keeps rclone-backed remote mounts healthy for backup jobs"
)]
struct Cli {
    /// Path to the supervisor configuration file
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    /// Verbose console diagnostics
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = match SupervisorConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_FATAL as u8);
        }
    };

    let log = EventLog::new(config.event_log.clone(), config.rotation.clone());
    let system = HostSystem;
    let report = Reconciler::new(&config, &system, &log).run_pass();

    for outcome in report.failures() {
        warn!("remote '{}': {:?}", outcome.remote, outcome.state);
    }

    if report.all_successful() {
        ExitCode::from(EXIT_SUCCESS as u8)
    } else {
        ExitCode::from(EXIT_PARTIAL as u8)
    }
}
