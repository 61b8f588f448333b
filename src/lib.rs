pub mod config;
pub mod models;
pub mod pipeline;
pub mod rubric_store;

use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber. `RUST_LOG` wins over the
/// built-in filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
