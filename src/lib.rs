pub mod commands;
pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::events::{LauncherEvent, ProcessEvent, ProcessOutcome};
pub use crate::core::instance::Instance;
pub use crate::core::state::Launcher;

/// Initialize structured logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,plauncher_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
