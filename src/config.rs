//! Configuration management
//!
//! Settings are layered from built-in defaults, an optional TOML file and the
//! process environment. Environment variables use `_` as the nesting
//! separator, so `ROUTER_PASS` lands in `router.pass` and `PORT` in `port`.

use anyhow::{bail, Context, Result};
use config::{ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Router connection settings
    pub router: RouterConfig,

    /// VPN policy settings
    pub vpn: VpnConfig,

    /// HTTP listen port
    pub port: u16,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    /// Router address, bare host or full URL
    pub ip: String,

    /// Router login
    pub user: String,

    /// Router password
    pub pass: String,
}

impl RouterConfig {
    /// Base URL for RCI requests
    pub fn base_url(&self) -> String {
        let ip = self.ip.trim().trim_end_matches('/');
        if ip.starts_with("http://") || ip.starts_with("https://") {
            ip.to_string()
        } else {
            format!("http://{}", ip)
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VpnConfig {
    /// Name of the router policy that routes through the VPN
    pub policy: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = defaults()?;

        match path {
            Some(path) => {
                tracing::debug!("Loading config from: {}", path.display());
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None => {
                if let Some(path) = config_paths().into_iter().find(|p| p.exists()) {
                    tracing::debug!("Loading config from: {}", path.display());
                    builder = builder.add_source(File::from(path).format(FileFormat::Toml));
                } else {
                    tracing::debug!("No config file found, using defaults and environment");
                }
            }
        }

        Self::build(builder.add_source(Environment::default().separator("_")))
    }

    fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: Config = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.router.pass.is_empty() {
            bail!("ROUTER_PASS environment variable is required");
        }
        if self.port == 0 {
            bail!("Invalid PORT value \"0\"");
        }
        if self.vpn.policy.trim().is_empty() {
            bail!("VPN_POLICY must not be empty");
        }
        Ok(())
    }
}

fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>> {
    Ok(config::Config::builder()
        .set_default("router.ip", "192.168.1.1")?
        .set_default("router.user", "admin")?
        .set_default("router.pass", "")?
        .set_default("vpn.policy", "Policy0")?
        .set_default("port", 3000)?
        .set_default("logging.level", "info")?)
}

fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("config.toml"),
        PathBuf::from("/etc/keenetic-vpn/config.toml"),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/keenetic-vpn/config.toml"));
    }
    paths
}
