//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The config file is
//! optional; a bare `.env` with `OPENROUTER_API_KEY_1..5` is enough to run.
//! API keys are read from the environment or from `api_keys_file`, never
//! from the TOML itself, so the config file can be committed safely.

use common::Secret;
use provider::constants::{DEFAULT_APP_URL, DEFAULT_BASE_URL, DEFAULT_MODEL};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Prefix of the API key environment variables.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Number of enumerated key slots (`OPENROUTER_API_KEY_1` ..= `_5`).
pub const API_KEY_SLOTS: usize = 5;

const DEFAULT_CONFIG_FILE: &str = "fitness-relay.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

/// Deployment mode. Controls error verbosity and static asset serving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[serde(alias = "dev")]
    Development,
    #[default]
    #[serde(alias = "prod")]
    Production,
}

impl Mode {
    /// Parse a `NODE_ENV` value. Anything other than development is production.
    pub fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Mode::Development,
            _ => Mode::Production,
        }
    }

    pub fn is_development(self) -> bool {
        self == Mode::Development
    }
}

/// Inbound HTTP settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub mode: Mode,
    /// Public URL of the frontend; used as the CORS origin and the upstream
    /// `HTTP-Referer`.
    pub app_url: String,
    /// Built frontend to serve in production mode
    pub static_dir: Option<PathBuf>,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            mode: Mode::default(),
            app_url: DEFAULT_APP_URL.to_string(),
            static_dir: None,
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Completion API settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Attempts per chat request; defaults to the number of keys
    pub max_attempts: Option<usize>,
    /// File with one API key per line (alternative to the env vars)
    pub api_keys_file: Option<PathBuf>,
    /// Candidate key slots in configuration order, resolved at load time
    #[serde(skip)]
    pub api_keys: Vec<Option<Secret<String>>>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
            max_attempts: None,
            api_keys_file: None,
            api_keys: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay the
    /// process environment.
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        Self::load_with(path, |var| std::env::var(var).ok())
    }

    /// Same as [`Config::load`] with an explicit environment lookup.
    pub fn load_with<F>(path: Option<&Path>, env: F) -> common::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            None => Config::default(),
        };

        config.apply_env(&env)?;
        config.resolve_api_keys(&env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: &F) -> common::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |var: &str| env(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = non_empty("PORT") {
            self.server.port = port.parse().map_err(|e: std::num::ParseIntError| {
                common::Error::InvalidEnv {
                    var: "PORT".into(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(mode) = non_empty("NODE_ENV") {
            self.server.mode = Mode::from_env_value(&mode);
        }
        if let Some(app_url) = non_empty("APP_URL") {
            self.server.app_url = app_url;
        }
        if let Some(base_url) = non_empty("OPENROUTER_BASE_URL") {
            self.upstream.base_url = base_url;
        }
        if let Some(model) = non_empty("OPENROUTER_MODEL") {
            self.upstream.model = model;
        }
        Ok(())
    }

    /// Resolve key slots: env vars win over `api_keys_file` when any of them
    /// holds a value. Slot N of the pool is `OPENROUTER_API_KEY_N`; the
    /// unsuffixed variable comes last.
    fn resolve_api_keys<F>(&mut self, env: &F) -> common::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env: Vec<Option<Secret<String>>> = api_key_vars()
            .iter()
            .map(|var| env(var).map(Secret::new))
            .collect();
        let env_has_keys = from_env.iter().flatten().any(|key| !key.is_empty());

        self.upstream.api_keys = match &self.upstream.api_keys_file {
            Some(file) if !env_has_keys => read_keys_file(file)?,
            _ => from_env,
        };
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        if !is_http_url(&self.upstream.base_url) {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.upstream.base_url
            )));
        }

        if !is_http_url(&self.server.app_url) {
            return Err(common::Error::Config(format!(
                "app_url must start with http:// or https://, got: {}",
                self.server.app_url
            )));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.upstream.max_attempts == Some(0) {
            return Err(common::Error::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Number of key slots that hold a value.
    pub fn configured_keys(&self) -> usize {
        self.upstream
            .api_keys
            .iter()
            .flatten()
            .filter(|key| !key.is_empty())
            .count()
    }

    /// Resolve config file path from CLI arg, CONFIG_PATH env var, or the
    /// default file name if it exists in the working directory.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }
}

/// `OPENROUTER_API_KEY_1` ..= `_5`, then `OPENROUTER_API_KEY`.
fn api_key_vars() -> Vec<String> {
    (1..=API_KEY_SLOTS)
        .map(|i| format!("{API_KEY_ENV}_{i}"))
        .chain(std::iter::once(API_KEY_ENV.to_string()))
        .collect()
}

fn read_keys_file(path: &Path) -> common::Result<Vec<Option<Secret<String>>>> {
    let contents = Secret::new(std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!(
            "failed to read api_keys_file {}: {e}",
            path.display()
        ))
    })?);

    Ok(contents
        .expose()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| Some(Secret::new(line.to_string())))
        .collect())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
