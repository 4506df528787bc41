use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "pyrunner", about = "Python snippet runner with live output streaming", version)]
pub struct Cli {
    /// Path to a KEY=VALUE config file (default: ~/.config/pyrunner/.pyrunnerrc).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Python interpreter to launch for each submission.
    #[arg(long, value_name = "PROGRAM")]
    pub python: Option<String>,

    /// Wall-clock limit per execution, in seconds.
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Directory for temporary scripts.
    #[arg(long = "scratch-dir", value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Directory holding tutorial and section JSON files.
    #[arg(long = "data-dir", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory of static assets served at `/`.
    #[arg(long = "public-dir", value_name = "DIR")]
    pub public_dir: Option<PathBuf>,

    /// Replaces the built-in danger patterns (one regex per line).
    #[arg(long = "danger-patterns", value_name = "PATH")]
    pub danger_patterns: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long = "log-json")]
    pub log_json: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
