//! Server configuration.
//!
//! Read from a TOML file, the environment, or both:
//!
//! ```toml
//! addr = "127.0.0.1:8787"
//! graceful_shutdown = true
//! max_body_bytes = 2097152
//! ```
//!
//! Every key is optional. `PERCH_ADDR` overrides `addr` when set.

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

pub const ADDR_ENV: &str = "PERCH_ADDR";

pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address, `host:port`.
    pub addr: String,

    /// Wait for in-flight requests on SIGTERM / Ctrl-C before returning.
    pub graceful_shutdown: bool,

    /// Request bodies larger than this are answered with `413` before routing.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8787".to_owned(),
            graceful_shutdown: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    /// Loads a TOML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?.with_env())
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    fn with_env(self) -> Self {
        self.with_addr_override(std::env::var(ADDR_ENV).ok())
    }

    fn with_addr_override(mut self, addr: Option<String>) -> Self {
        if let Some(addr) = addr.filter(|a| !a.trim().is_empty()) {
            self.addr = addr;
        }
        self
    }
}
