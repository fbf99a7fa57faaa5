/*!
 * Console diagnostics initialization
 *
 * The durable record of each pass is the event log; this is operator
 * diagnostics on stdout.
 */

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize tracing output. `RUST_LOG` overrides the verbosity flag.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "tether=debug" } else { "tether=info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    // try_init so tests may call this more than once
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();
}
