//! Configuration system for kpilake.
//!
//! TOML file with per-concern sections, overridden by the environment variables the
//! service has always honoured (`ATHENA_DB`, `ATHENA_OUTPUT`, ...).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KpiError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub athena: AthenaConfig,
    pub polling: PollingConfig,
    pub server: ServerConfig,
    pub pagination: PaginationConfig,
}

/// Remote engine destination.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AthenaConfig {
    pub region: String,
    /// Database the KPI tables live in. Required.
    pub database: String,
    /// Object-storage prefix receiving result files, e.g. `s3://bucket/results/`. Required.
    pub output_location: String,
    pub workgroup: Option<String>,
    /// Attempts the SDK client makes for transport-level failures (default: 5).
    pub max_attempts: u32,
    /// Rows requested per result page (1..=1000, default: 1000).
    pub results_page_size: u32,
}

/// Status polling schedule. All values in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    pub initial_interval_ms: u64,
    pub medium_interval_ms: u64,
    pub medium_after_ms: u64,
    pub slow_interval_ms: u64,
    pub slow_after_ms: u64,
    /// Hard wall-clock budget for one execution, throttling waits included.
    pub budget_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Path prefix all routes are nested under (empty = served at `/`).
    pub root_path: String,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
    pub top_default: u32,
    pub top_max: u32,
}

impl Default for AthenaConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            database: String::new(),
            output_location: String::new(),
            workgroup: None,
            max_attempts: 5,
            results_page_size: 1000,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            medium_interval_ms: 2_000,
            medium_after_ms: 10_000,
            slow_interval_ms: 5_000,
            slow_after_ms: 30_000,
            budget_ms: 90_000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            root_path: String::new(),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
            top_default: 20,
            top_max: 100,
        }
    }
}

impl PollingConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    /// Interval to wait before the next status check, given the time already spent.
    pub fn interval_after(&self, elapsed: Duration) -> Duration {
        let elapsed_ms = elapsed.as_millis() as u64;
        let ms = if elapsed_ms >= self.slow_after_ms {
            self.slow_interval_ms
        } else if elapsed_ms >= self.medium_after_ms {
            self.medium_interval_ms
        } else {
            self.initial_interval_ms
        };
        Duration::from_millis(ms)
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KpiError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&contents).map_err(|e| {
            KpiError::Config(format!("failed to parse config file {}: {e}", path.display()))
        })
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| KpiError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from default locations, then apply environment overrides.
    ///
    /// Search order:
    /// 1. `KPILAKE_CONFIG` environment variable
    /// 2. `./kpilake.toml` (current directory)
    /// 3. `~/.config/kpilake/config.toml` (user config dir)
    /// 4. Built-in defaults
    ///
    /// A file that is named or present but cannot be read or parsed is an error.
    pub fn load_default() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`ServiceConfig::load_default`] with environment lookups going through `lookup`.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::find_file(&lookup)?;
        cfg.apply_env(lookup)?;
        Ok(cfg)
    }

    fn find_file<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("KPILAKE_CONFIG") {
            let cfg = Self::from_file(&path)?;
            tracing::info!(path = %path, "loaded config from KPILAKE_CONFIG");
            return Ok(cfg);
        }

        let local = Path::new("kpilake.toml");
        if local.exists() {
            let cfg = Self::from_file(local)?;
            tracing::info!("loaded config from ./kpilake.toml");
            return Ok(cfg);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("kpilake").join("config.toml");
            if user_config.exists() {
                let cfg = Self::from_file(&user_config)?;
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return Ok(cfg);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// Override file values with environment variables, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("ATHENA_DB") {
            self.athena.database = db;
        }
        if let Some(output) = lookup("ATHENA_OUTPUT") {
            self.athena.output_location = output;
        }
        if let Some(workgroup) = lookup("ATHENA_WORKGROUP") {
            self.athena.workgroup = Some(workgroup).filter(|w| !w.is_empty());
        }
        if let Some(region) = lookup("AWS_REGION") {
            self.athena.region = region;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            let parsed: Vec<String> = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
            self.server.allowed_origins = if parsed.is_empty() {
                vec!["*".to_string()]
            } else {
                parsed
            };
        }
        if let Some(root) = lookup("ROOT_PATH") {
            self.server.root_path = root;
        }
        if let Some(addr) = lookup("KPILAKE_LISTEN_ADDR") {
            self.server.listen_addr = addr
                .parse()
                .map_err(|e| KpiError::Config(format!("invalid KPILAKE_LISTEN_ADDR {addr:?}: {e}")))?;
        }
        if let Some(secs) = lookup("ATHENA_POLL_BUDGET_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                KpiError::Config(format!("invalid ATHENA_POLL_BUDGET_SECS {secs:?}: {e}"))
            })?;
            self.polling.budget_ms = secs.saturating_mul(1_000);
        }
        Ok(())
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        validate_destination(&self.athena.database, &self.athena.output_location)?;
        if self.athena.region.trim().is_empty() {
            return Err(KpiError::Config("athena region must be set".to_string()));
        }
        if !(1..=1000).contains(&self.athena.results_page_size) {
            return Err(KpiError::Config(format!(
                "results_page_size must be within 1..=1000, got {}",
                self.athena.results_page_size
            )));
        }
        let poll = &self.polling;
        if poll.budget_ms == 0
            || poll.initial_interval_ms == 0
            || poll.medium_interval_ms == 0
            || poll.slow_interval_ms == 0
        {
            return Err(KpiError::Config(
                "polling budget and every polling interval must be positive".to_string(),
            ));
        }
        let p = &self.pagination;
        if p.max_limit == 0 || p.default_limit == 0 || p.default_limit > p.max_limit {
            return Err(KpiError::Config(format!(
                "pagination limits must satisfy 1 <= default_limit ({}) <= max_limit ({})",
                p.default_limit, p.max_limit
            )));
        }
        if p.top_max == 0 || p.top_default == 0 || p.top_default > p.top_max {
            return Err(KpiError::Config(format!(
                "top limits must satisfy 1 <= top_default ({}) <= top_max ({})",
                p.top_default, p.top_max
            )));
        }
        let root = &self.server.root_path;
        if !root.is_empty() && (!root.starts_with('/') || root.ends_with('/')) {
            return Err(KpiError::Config(format!(
                "root_path must start with '/' and have no trailing '/', got {root:?}"
            )));
        }
        Ok(())
    }
}

/// Database and output location checks shared by startup validation and every submission.
pub(crate) fn validate_destination(database: &str, output_location: &str) -> Result<()> {
    if database.trim().is_empty() {
        return Err(KpiError::Config("athena database must be set".to_string()));
    }
    let Some(rest) = output_location.strip_prefix("s3://") else {
        return Err(KpiError::Config(format!(
            "output location must be an s3:// URI, got {output_location:?}"
        )));
    };
    let bucket = rest.split('/').next().unwrap_or_default();
    if bucket.is_empty() || !rest.ends_with('/') || rest.chars().any(char::is_whitespace) {
        return Err(KpiError::Config(format!(
            "output location must name a bucket and end with '/', got {output_location:?}"
        )));
    }
    Ok(())
}
