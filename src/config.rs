//! Connection-time configuration.
//!
//! Configuration is supplied once at connection setup; nothing persists
//! between process runs. It can be built in code with
//! [`ControllerConfig::new`] or loaded from a TOML file with
//! environment-variable overrides (prefixed `PROLOGIX_`):
//!
//! ```toml
//! host = "192.168.1.128"
//! port = 1234
//! connect_timeout = "5s"
//! default_read_timeout = "1s"
//! lock_wait_timeout = "5s"
//!
//! [framing]
//! eoi = true
//! eos = "cr_lf"
//! ```
//!
//! Example override: `PROLOGIX_FRAMING_EOI=false`.

use crate::session::EosMode;
use crate::transport::DEFAULT_PORT;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for one controller connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Hostname or IP address of the controller.
    pub host: String,

    /// TCP port (the controller listens on 1234).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Window for establishing the TCP connection.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Read window for queries that do not carry their own.
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub default_read_timeout: Duration,

    /// How long a caller may wait for the transaction lock before the
    /// operation fails busy.
    #[serde(with = "humantime_serde", default = "default_lock_wait")]
    pub lock_wait_timeout: Duration,

    /// GPIB framing asserted once at setup.
    #[serde(default)]
    pub framing: FramingConfig,
}

/// EOI/EOS framing asserted once at connection setup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Assert EOI with the last byte of each transfer.
    #[serde(default = "default_eoi")]
    pub eoi: bool,

    /// Terminator the controller appends to instrument payloads.
    #[serde(default)]
    pub eos: EosMode,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            eoi: default_eoi(),
            eos: EosMode::default(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_lock_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_eoi() -> bool {
    true
}

impl ControllerConfig {
    /// Configuration for `host` with every other field at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            connect_timeout: default_connect_timeout(),
            default_read_timeout: default_read_timeout(),
            lock_wait_timeout: default_lock_wait(),
            framing: FramingConfig::default(),
        }
    }

    /// Load configuration from a TOML file, with `PROLOGIX_`-prefixed
    /// environment variables taking precedence.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PROLOGIX_").split("_"))
            .extract()
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than zero".to_string());
        }
        if self.default_read_timeout.is_zero() {
            return Err("default_read_timeout must be greater than zero".to_string());
        }
        if self.lock_wait_timeout.is_zero() {
            return Err("lock_wait_timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}
