//! # Node Settings
//!
//! Everything the node needs to start, layered in this order (later wins):
//!
//! 1. Built-in defaults ([`NodeSettings::default`]).
//! 2. An optional TOML file passed with `--config`.
//! 3. Environment variables prefixed `HARBOR__`, with `__` between levels:
//!    `HARBOR__HTTP__PORT=8080`, `HARBOR__CORE__LEDGER__MIN_COLLATERAL_RATIO_BPS=16000`.
//! 4. Explicit CLI flags (applied by `main`).
//!
//! The embedded [`CoreConfig`] is the protocol crate's own config, so the
//! node and the library agree on every economic constant.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use harbor_protocol::config::CoreConfig;

use crate::logging::LogFormat;

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "HARBOR";

/// Separator between nested keys in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub bind: String,
    pub port: u16,
    /// Capacity of the broadcast channel feeding `/ws` subscribers.
    pub event_buffer: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 9841,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Serve `/metrics` on its own port as well as on the API port.
    pub standalone: bool,
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            standalone: true,
            port: 9842,
        }
    }
}

/// Where the ledger keeps wallets and positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Lost on exit.
    #[default]
    Memory,
    /// sled database under `storage.path`.
    Sled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("harbor-data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "harbor_node=info,harbor_protocol=info,tower_http=info".into(),
            format: LogFormat::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub http: HttpSettings,
    pub metrics: MetricsSettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
    pub core: CoreConfig,
}

impl NodeSettings {
    /// Loads defaults, then `path` (if any), then `HARBOR__*` variables,
    /// and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&NodeSettings::default())
                .context("failed to seed default settings")?,
        );

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let settings: NodeSettings = builder
            .build()
            .context("failed to read settings")?
            .try_deserialize()
            .context("failed to parse settings")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects settings the node cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.core.validate().context("invalid core config")?;

        if self.http.event_buffer == 0 {
            bail!("http.event_buffer must be positive");
        }
        if self.metrics.standalone && self.metrics.port == self.http.port {
            bail!(
                "metrics.port and http.port are both {}; disable metrics.standalone or pick another port",
                self.http.port
            );
        }
        if self.storage.backend == StorageBackend::Sled
            && self.storage.path.as_os_str().is_empty()
        {
            bail!("storage.path must be set for the sled backend");
        }
        self.http_addr()?;
        Ok(())
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.http.bind, self.http.port)
            .parse()
            .with_context(|| format!("invalid http bind address {:?}", self.http.bind))
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.http.bind, self.metrics.port)
            .parse()
            .with_context(|| format!("invalid metrics bind address {:?}", self.http.bind))
    }

    /// The effective settings as pretty JSON.
    pub fn render(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to render settings")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
