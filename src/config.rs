use std::collections::HashSet;
use std::net::IpAddr;
use std::{io::Read, path::Path};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::client::ConnectionParams;
use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "192.168.178.1";
pub const DEFAULT_PORT: u16 = 49000;

/// All routers a host integration manages.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub routers: Vec<RouterConfig>,
}

impl Config {
    pub fn from_yaml_file(p: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let f = std::fs::File::open(p)?;
        Self::from_yaml(f)
    }

    pub fn from_yaml(yaml_reader: impl Read) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_reader(yaml_reader)?;
        config.ensure_unique_hosts()?;
        Ok(config)
    }

    pub fn from_string(s: impl ToString) -> Result<Self, ConfigError> {
        Config::from_yaml(s.to_string().as_bytes())
    }

    fn ensure_unique_hosts(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for router in &self.routers {
            if !seen.insert(router.host.to_lowercase()) {
                return Err(ConfigError::DuplicateHost(router.host.clone()));
            }
        }
        Ok(())
    }
}

/// Settings for a single router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    pub password: String,

    /// Profile groups to open a profile session for.
    #[serde(default)]
    pub profiles: Vec<String>,
    /// Name of the profile assigned when a device profile switch is on.
    #[serde(default)]
    pub profile_on: Option<String>,
    /// Name of the profile assigned when a device profile switch is off.
    #[serde(default)]
    pub profile_off: Option<String>,
    /// Hostnames that get a profile switch. All devices when unset.
    #[serde(default)]
    pub devices: Option<Vec<String>>,

    #[serde(default = "enabled")]
    pub use_wifi: bool,
    #[serde(default = "enabled")]
    pub use_port: bool,
    #[serde(default = "enabled")]
    pub use_deflections: bool,
    #[serde(default = "enabled")]
    pub use_profiles: bool,

    /// Address of the machine running the hub. Only port forwards to this
    /// address get a switch.
    #[serde(default)]
    pub local_ip: Option<IpAddr>,

    #[serde(default = "default_timeout", with = "crate::duration")]
    pub timeout: Duration,
}

impl RouterConfig {
    pub fn new(host: impl ToString, username: impl ToString, password: impl ToString) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            username: username.to_string(),
            password: password.to_string(),
            profiles: Vec::new(),
            profile_on: None,
            profile_off: None,
            devices: None,
            use_wifi: true,
            use_port: true,
            use_deflections: true,
            use_profiles: true,
            local_ip: None,
            timeout: default_timeout(),
        }
    }

    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }

    /// Whether device profiles are managed at all.
    pub fn profiles_enabled(&self) -> bool {
        self.use_profiles && !self.profiles.is_empty()
    }

    pub fn allows_device(&self, hostname: &str) -> bool {
        match &self.devices {
            None => true,
            Some(devices) => devices.iter().any(|d| d == hostname),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn enabled() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::seconds(60)
}
