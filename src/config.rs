//! Server configuration file.
//!
//! ```toml
//! address = "0.0.0.0"
//! port = 8080
//! idle_timeout = 15
//!
//! [[handlers]]
//! name = "files"
//! module = "static"
//! doc_root = "/var/www"
//! allow_index = true
//!
//! [[handlers]]
//! name = "hello"
//! module = "hello"
//!
//! [[hosts]]
//! domain = "default"
//!
//! [[hosts.url_rules]]
//! type = "prefix"
//! prefix = "/static"
//! chain = ["files"]
//!
//! [[hosts.url_rules]]
//! type = "any"
//! chain = ["hello"]
//! ```

use std::{fs, path::Path, str::FromStr};

use serde::Deserialize;

use crate::{registry::HandlerOptions, url_rule::UrlMatcher, ConfigError};

pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 15;

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds a keep-alive connection may stay silent; 0 disables the limit.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Gzip response bodies for clients that accept it.
    #[serde(default)]
    pub compression: bool,

    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,

    #[serde(default, alias = "host")]
    pub hosts: Vec<HostConfig>,

    #[serde(flatten)]
    pub unsupported: toml::Table,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            idle_timeout: default_idle_timeout(),
            compression: false,
            handlers: vec![],
            hosts: vec![],
            unsupported: toml::Table::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }
}

impl FromStr for ServerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: ServerConfig = toml::from_str(s)?;
        for key in config.unsupported.keys() {
            log::info!("ignore unsupported key {key}");
        }
        Ok(config)
    }
}

/// A named handler instance; every key besides `name` and `module` is
/// handed to the module as an option.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    pub name: String,
    pub module: String,
    #[serde(flatten)]
    pub options: toml::Table,
}

impl HandlerConfig {
    pub fn handler_options(&self) -> HandlerOptions {
        self.options
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub domain: String,
    #[serde(default, alias = "url-rules")]
    pub url_rules: Vec<UrlRuleConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlRuleType {
    Prefix,
    Regex,
    Any,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlRuleConfig {
    #[serde(rename = "type")]
    pub rule_type: UrlRuleType,
    pub prefix: Option<String>,
    pub regex: Option<String>,
    #[serde(default)]
    pub chain: Vec<String>,
}

impl UrlRuleConfig {
    pub fn matcher(&self) -> Result<UrlMatcher, ConfigError> {
        match self.rule_type {
            UrlRuleType::Any => Ok(UrlMatcher::Any),
            UrlRuleType::Prefix => self
                .prefix
                .clone()
                .map(UrlMatcher::Prefix)
                .ok_or(ConfigError::MissingRuleKey {
                    rule_type: "prefix".to_string(),
                    key: "prefix",
                }),
            UrlRuleType::Regex => {
                let pattern = self.regex.as_deref().ok_or(ConfigError::MissingRuleKey {
                    rule_type: "regex".to_string(),
                    key: "regex",
                })?;
                UrlMatcher::regex(pattern).map_err(|source| ConfigError::InvalidRegex {
                    pattern: pattern.to_string(),
                    source,
                })
            }
        }
    }
}
