use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
}

/// Pin the calling thread to `core`. Failure is logged, not fatal.
pub fn pin_current_thread(core: usize) -> bool {
    let Some(cores) = core_affinity::get_core_ids() else {
        warn!("Unable to enumerate CPU cores, not pinning");
        return false;
    };
    match cores.into_iter().find(|c| c.id == core) {
        Some(id) if core_affinity::set_for_current(id) => {
            info!(core, "Pinned decode thread");
            true
        }
        Some(_) => {
            warn!(core, "Failed to pin decode thread");
            false
        }
        None => {
            warn!(core, "No such CPU core, not pinning");
            false
        }
    }
}
