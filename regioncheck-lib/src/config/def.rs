use crate::Error;
use std::{
    collections::HashMap, fmt::Display, fs::File, io::BufReader, net::IpAddr,
    path::PathBuf, str::FromStr,
};

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Default, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
    Silent,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Silent => write!(f, "off"),
        }
    }
}

/// Example
/// ```yaml
/// log-level: debug
/// service: netflix
/// timeout: 5
/// outbounds:
///   - name: wan1
///     local-address: 192.168.1.10
///   - name: wan2
///     local-address: 192.168.2.10
/// custom-services:
///   - name: claude
///     urls:
///       - https://claude.ai/login
///     blocked-markers:
///       - App unavailable
/// ```
#[derive(Serialize, Deserialize, Default, Debug)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub log_level: LogLevel,
    /// Name of the service to probe
    pub service: String,
    /// The outbound currently in use, passed through as context
    pub selected: Option<String>,
    /// Per-request timeout in seconds
    pub timeout: Option<u64>,
    /// Timeout for a whole evaluation in seconds
    pub batch_timeout: Option<u64>,
    pub outbounds: Vec<OutboundDef>,
    pub custom_services: Vec<CustomServiceDef>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundDef {
    pub name: String,
    /// Bind outgoing probe connections to this local address
    pub local_address: Option<IpAddr>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct CustomServiceDef {
    pub name: String,
    pub urls: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    pub timeout: Option<u64>,
    /// Defaults to GET
    pub method: Option<String>,
    pub body: Option<String>,
    /// Report a 3xx response instead of following it
    #[serde(default)]
    pub disable_redirect: bool,
    #[serde(default = "default_blocked_status")]
    pub blocked_status: Vec<u16>,
    #[serde(default)]
    pub blocked_markers: Vec<String>,
    #[serde(default = "default_require_body")]
    pub require_body: bool,
}

fn default_blocked_status() -> Vec<u16> {
    vec![403]
}

fn default_require_body() -> bool {
    true
}

impl TryFrom<PathBuf> for Config {
    type Error = Error;

    fn try_from(value: PathBuf) -> Result<Self, Self::Error> {
        let fd = File::open(&value).map_err(|e| {
            Error::InvalidConfig(format!(
                "failed to open config file {}: {e}",
                value.display()
            ))
        })?;
        serde_yaml::from_reader(BufReader::new(fd))
            .map_err(|x| Error::InvalidConfig(x.to_string()))
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s).map_err(|x| Error::InvalidConfig(x.to_string()))
    }
}
