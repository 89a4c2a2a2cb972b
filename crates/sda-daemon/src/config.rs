use sda_github::GitHubConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level daemon configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncConfig {
    /// Parent directory for temporary clones. Defaults to the OS temp dir.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Where project records live. Projects are kept in memory when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_socket_path() -> String {
    "/tmp/sda.sock".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_level: default_log_level(),
        }
    }
}

impl SyncConfig {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    /// Load config from the default path (~/.config/sda/config.toml).
    ///
    /// GitHub environment variables override file values.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            Self::parse(&path)?
        } else {
            Config::default()
        };
        config.github.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::parse(path)?;
        config.github.apply_env();
        Ok(config)
    }

    fn parse(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn config_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(format!("{home}/.config/sda/config.toml"))
    }

    /// PID file next to the socket.
    pub fn pid_path(&self) -> PathBuf {
        Path::new(&self.daemon.socket_path).with_extension("pid")
    }
}
