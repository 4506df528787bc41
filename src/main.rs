mod cli;

use anyhow::{Context, Result};
use pyrunner::{
    api::{self, AppState},
    config::{Config, Settings},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // CLI flags override rc file and environment
    let mut cfg = Config::load(args.config.as_deref());
    if let Some(host) = &args.host {
        cfg.set("HOST", host.as_str());
    }
    if let Some(port) = args.port {
        cfg.set("PORT", port.to_string());
    }
    if let Some(python) = &args.python {
        cfg.set("PYTHON_BIN", python.as_str());
    }
    if let Some(secs) = args.timeout_secs {
        cfg.set("EXEC_TIMEOUT_SECS", secs.to_string());
    }
    for (key, dir) in [
        ("SCRATCH_DIR", &args.scratch_dir),
        ("DATA_DIR", &args.data_dir),
        ("PUBLIC_DIR", &args.public_dir),
        ("DANGER_PATTERNS_PATH", &args.danger_patterns),
    ] {
        if let Some(dir) = dir {
            cfg.set(key, dir.to_string_lossy());
        }
    }
    if args.log_json {
        cfg.set("LOG_FORMAT", "json");
    }

    let settings = Settings::from_config(&cfg)
        .with_context(|| format!("invalid configuration ({})", cfg.config_path.display()))?;
    telemetry::init_tracing(settings.json_logs);

    let state = AppState::new(settings)?;
    api::serve(state).await
}
