//! Engine configuration and well-known annotations

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("ingress_class must not be empty")]
    InvalidIngressClass,
}

/// Engine behavior switches, normally loaded from the controller's TOML config
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Class handled by this controller; objects naming another class are ignored
    #[serde(default = "default_ingress_class")]
    pub ingress_class: String,

    /// Accept TransportServers bound to the built-in `tls-passthrough` listener
    #[serde(default = "default_true")]
    pub tls_passthrough: bool,

    /// Resolve VirtualServer `spec.listener` against the GlobalConfiguration
    #[serde(default = "default_true")]
    pub custom_listeners: bool,

    /// Ports GlobalConfiguration listeners may not use
    #[serde(default = "default_forbidden_listener_ports")]
    pub forbidden_listener_ports: Vec<i32>,
}

fn default_ingress_class() -> String {
    "nginx".to_string()
}

fn default_true() -> bool {
    true
}

fn default_forbidden_listener_ports() -> Vec<i32> {
    vec![80, 443]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ingress_class: default_ingress_class(),
            tls_passthrough: default_true(),
            custom_listeners: default_true(),
            forbidden_listener_ports: default_forbidden_listener_ports(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;

        if config.ingress_class.trim().is_empty() {
            return Err(ConfigError::InvalidIngressClass);
        }

        Ok(config)
    }
}

/// Annotations read by the engine
pub mod annotations {
    /// Legacy ingress class annotation, takes precedence over `spec.ingressClassName`
    pub const INGRESS_CLASS: &str = "kubernetes.io/ingress.class";
    /// Marks an Ingress as `master` or `minion` of a mergeable group
    pub const MERGEABLE_INGRESS_TYPE: &str = "routeplane.io/mergeable-ingress-type";
    /// Comma-separated Policy references (`name` or `namespace/name`)
    pub const POLICIES: &str = "routeplane.io/policies";
}
