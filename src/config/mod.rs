use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::BaseDirs;

/// Raw key/value configuration: defaults, then the rc file, then environment.
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let rc = fs::read_to_string(&config_path).ok();
        Self::from_parts(config_path, rc.as_deref(), env::vars())
    }

    /// Builds a config from rc-file text and an environment snapshot.
    pub fn from_parts(
        config_path: PathBuf,
        rc: Option<&str>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut map = default_map();

        if let Some(text) = rc {
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((k, v)) = line.split_once('=') {
                    map.insert(k.trim().to_string(), v.trim().to_string());
                }
            }
        }

        // Environment takes precedence over the rc file
        for (k, v) in vars {
            if is_config_key(&k) {
                let key = k.strip_prefix("PYRUNNER_").unwrap_or(&k).to_string();
                map.insert(key, v);
            }
        }

        Self { inner: map, config_path }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned().filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        let raw = self.get(key).with_context(|| format!("missing config key {key}"))?;
        raw.parse::<u64>()
            .with_context(|| format!("config key {key} is not a number: {raw:?}"))
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }
}

/// Typed settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub python_bin: String,
    pub exec_timeout: Duration,
    pub kill_grace: Duration,
    pub scratch_dir: PathBuf,
    pub data_dir: PathBuf,
    pub public_dir: PathBuf,
    pub scratch_retention: Duration,
    pub scratch_sweep_every: Duration,
    pub max_body_bytes: usize,
    pub recursion_limit: u32,
    pub danger_patterns_path: Option<PathBuf>,
    pub json_logs: bool,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let port = cfg.get_u64("PORT")?;
        let port = u16::try_from(port).with_context(|| format!("PORT out of range: {port}"))?;
        let recursion_limit = u32::try_from(cfg.get_u64("RECURSION_LIMIT")?)
            .context("RECURSION_LIMIT out of range")?;
        let max_body_bytes = usize::try_from(cfg.get_u64("MAX_BODY_BYTES")?)
            .context("MAX_BODY_BYTES out of range")?;
        let sweep_secs = cfg.get_u64("SCRATCH_SWEEP_SECS")?;
        anyhow::ensure!(sweep_secs > 0, "SCRATCH_SWEEP_SECS must be positive");

        Ok(Self {
            host: cfg.get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            python_bin: cfg.get("PYTHON_BIN").unwrap_or_else(|| "python3".into()),
            exec_timeout: Duration::from_secs(cfg.get_u64("EXEC_TIMEOUT_SECS")?),
            kill_grace: Duration::from_secs(cfg.get_u64("KILL_GRACE_SECS")?),
            scratch_dir: cfg.get_path("SCRATCH_DIR").unwrap_or_else(|| "temp".into()),
            data_dir: cfg.get_path("DATA_DIR").unwrap_or_else(|| "data".into()),
            public_dir: cfg.get_path("PUBLIC_DIR").unwrap_or_else(|| "public".into()),
            scratch_retention: Duration::from_secs(cfg.get_u64("SCRATCH_RETENTION_SECS")?),
            scratch_sweep_every: Duration::from_secs(sweep_secs),
            max_body_bytes,
            recursion_limit,
            danger_patterns_path: cfg.get_path("DANGER_PATTERNS_PATH"),
            json_logs: cfg
                .get("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "HOST",
        "PORT",
        "PYTHON_BIN",
        "EXEC_TIMEOUT_SECS",
        "KILL_GRACE_SECS",
        "SCRATCH_DIR",
        "DATA_DIR",
        "PUBLIC_DIR",
        "SCRATCH_RETENTION_SECS",
        "SCRATCH_SWEEP_SECS",
        "MAX_BODY_BYTES",
        "RECURSION_LIMIT",
        "DANGER_PATTERNS_PATH",
        "LOG_FORMAT",
    ];

    KEYS.contains(&k) || k.starts_with("PYRUNNER_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("pyrunner").join(".pyrunnerrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Network
    m.insert("HOST".into(), "0.0.0.0".into());
    m.insert("PORT".into(), "5000".into());

    // Interpreter
    m.insert("PYTHON_BIN".into(), "python3".into());
    m.insert("EXEC_TIMEOUT_SECS".into(), "60".into());
    m.insert("KILL_GRACE_SECS".into(), "5".into());
    m.insert("RECURSION_LIMIT".into(), "1000".into());

    // Paths
    m.insert("SCRATCH_DIR".into(), "temp".into());
    m.insert("DATA_DIR".into(), "data".into());
    m.insert("PUBLIC_DIR".into(), "public".into());

    // Scratch housekeeping
    m.insert("SCRATCH_RETENTION_SECS".into(), "3600".into());
    m.insert("SCRATCH_SWEEP_SECS".into(), "3600".into());

    m.insert("MAX_BODY_BYTES".into(), (10 * 1024 * 1024).to_string());
    m.insert("LOG_FORMAT".into(), "text".into());

    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn defaults_resolve_to_settings() {
        let cfg = Config::from_parts(PathBuf::from("rc"), None, no_env());
        let settings = Settings::from_config(&cfg).unwrap();
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.exec_timeout, Duration::from_secs(60));
        assert_eq!(settings.scratch_retention, Duration::from_secs(3600));
        assert_eq!(settings.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.python_bin, "python3");
        assert!(settings.danger_patterns_path.is_none());
        assert!(!settings.json_logs);
    }

    #[test]
    fn rc_file_overrides_defaults_and_skips_comments() {
        let rc = "# comment\n\nPORT = 8080\nPYTHON_BIN=/usr/bin/python3.12\n";
        let cfg = Config::from_parts(PathBuf::from("rc"), Some(rc), no_env());
        assert_eq!(cfg.get("PORT").as_deref(), Some("8080"));
        assert_eq!(cfg.get("PYTHON_BIN").as_deref(), Some("/usr/bin/python3.12"));
    }

    #[test]
    fn environment_wins_over_rc_file() {
        let rc = "PORT=8080\n";
        let env = vec![
            ("PORT".to_string(), "9090".to_string()),
            ("PYRUNNER_LOG_FORMAT".to_string(), "json".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let cfg = Config::from_parts(PathBuf::from("rc"), Some(rc), env);
        let settings = Settings::from_config(&cfg).unwrap();
        assert_eq!(settings.port, 9090);
        assert!(settings.json_logs);
        assert!(cfg.get("HOME").is_none());
    }

    #[test]
    fn bad_number_names_the_key() {
        let cfg = Config::from_parts(PathBuf::from("rc"), Some("EXEC_TIMEOUT_SECS=soon"), no_env());
        let err = Settings::from_config(&cfg).unwrap_err();
        assert!(format!("{err:#}").contains("EXEC_TIMEOUT_SECS"));
    }
}
