// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource directory configuration.

use crate::server::payload::MAX_DISCOVERY_BIAS;
use crate::server::tcp::TcpTransportConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Well-known uri of the resource directory.
pub const DEFAULT_RD_URI: &str = "/oic/rd";

/// Largest frame body expressible by the 4-byte length prefix.
pub const MAX_FRAME_SIZE: usize = u32::MAX as usize;

/// Resource directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 5683)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Uri the directory resource is registered at
    #[serde(default = "default_rd_uri")]
    pub rd_uri: String,

    /// Selection bias advertised in discovery responses (0-100)
    #[serde(default = "default_discovery_bias")]
    pub discovery_bias: u8,

    /// Lifetime of published links without an explicit ttl (seconds)
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// Interval between expiry sweeps (seconds)
    #[serde(default = "default_expiry_check_interval")]
    pub expiry_check_interval_secs: u64,

    /// Maximum message size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum number of RD payloads alive at once
    #[serde(default = "default_max_outstanding_payloads")]
    pub max_outstanding_payloads: usize,

    /// Responses buffered per client connection
    #[serde(default = "default_outbound_queue_depth")]
    pub outbound_queue_depth: usize,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    5683
}

fn default_rd_uri() -> String {
    DEFAULT_RD_URI.to_string()
}

fn default_discovery_bias() -> u8 {
    100
}

fn default_ttl() -> u64 {
    86_400
}

fn default_expiry_check_interval() -> u64 {
    30
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_max_outstanding_payloads() -> usize {
    1024
}

fn default_outbound_queue_depth() -> usize {
    100
}

impl Default for RdConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            rd_uri: default_rd_uri(),
            discovery_bias: default_discovery_bias(),
            default_ttl_secs: default_ttl(),
            expiry_check_interval_secs: default_expiry_check_interval(),
            max_message_size: default_max_message_size(),
            max_outstanding_payloads: default_max_outstanding_payloads(),
            outbound_queue_depth: default_outbound_queue_depth(),
        }
    }
}

impl RdConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Listen address.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Default link lifetime as Duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Expiry sweep interval as Duration.
    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_interval_secs)
    }

    /// Settings for the TCP transport.
    pub fn transport_config(&self) -> TcpTransportConfig {
        TcpTransportConfig {
            bind_addr: self.socket_addr(),
            max_message_size: self.max_message_size,
            outbound_queue_depth: self.outbound_queue_depth,
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if !self.rd_uri.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "rd_uri must start with '/': {}",
                self.rd_uri
            )));
        }
        if self.discovery_bias > MAX_DISCOVERY_BIAS {
            return Err(ConfigError::InvalidValue(format!(
                "discovery_bias must be at most {}",
                MAX_DISCOVERY_BIAS
            )));
        }
        if self.default_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "default_ttl_secs cannot be 0".into(),
            ));
        }
        if self.expiry_check_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "expiry_check_interval_secs cannot be 0".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_message_size cannot be 0".into(),
            ));
        }
        if self.max_message_size > MAX_FRAME_SIZE {
            return Err(ConfigError::InvalidValue(format!(
                "max_message_size must be <= {}",
                MAX_FRAME_SIZE
            )));
        }
        if self.max_outstanding_payloads == 0 {
            return Err(ConfigError::InvalidValue(
                "max_outstanding_payloads cannot be 0".into(),
            ));
        }
        if self.outbound_queue_depth == 0 {
            return Err(ConfigError::InvalidValue(
                "outbound_queue_depth cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
