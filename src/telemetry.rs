//! Logging setup.

use std::{io, sync::OnceLock};

use is_terminal::IsTerminal;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

const DEFAULT_FILTER: &str = "pyrunner=info,tower_http=info";

/// Installs the global subscriber once. `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr);
        let installed = if json {
            builder.json().with_current_span(false).try_init()
        } else {
            builder.with_ansi(io::stderr().is_terminal()).try_init()
        };
        if let Err(e) = installed {
            eprintln!("tracing already initialised: {e}");
        }
    });
}
