// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Component and port configuration.
//!
//! A component is built from a [`ComponentConfig`]. Ports are grouped by
//! domain at construction (audio, video, image, other) so each domain owns a
//! contiguous index range; ports of the same domain keep their configured
//! order.

use serde::{Deserialize, Serialize};

use super::error::{ComponentError, Result};
use super::params::{BufferSupplier, PortFormat};
use super::port::PortDirection;

pub const DEFAULT_BUFFER_COUNT: u32 = 2;
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_TUNNEL_USE_BUFFER_RETRIES: u32 = 20;
pub const DEFAULT_TUNNEL_RETRY_INTERVAL_MS: u64 = 50;

fn default_buffer_count() -> u32 {
    DEFAULT_BUFFER_COUNT
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_enabled() -> bool {
    true
}

fn default_tunnel_use_buffer_retries() -> u32 {
    DEFAULT_TUNNEL_USE_BUFFER_RETRIES
}

fn default_tunnel_retry_interval_ms() -> u64 {
    DEFAULT_TUNNEL_RETRY_INTERVAL_MS
}

/// Static description of one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub direction: PortDirection,
    pub format: PortFormat,
    #[serde(default = "default_buffer_count")]
    pub buffer_count_actual: u32,
    #[serde(default = "default_buffer_count")]
    pub buffer_count_min: u32,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Supplier preference reported while the port is untunneled.
    #[serde(default)]
    pub supplier_preference: BufferSupplier,
}

impl PortConfig {
    pub fn new(direction: PortDirection, format: PortFormat) -> Self {
        Self {
            direction,
            format,
            buffer_count_actual: DEFAULT_BUFFER_COUNT,
            buffer_count_min: DEFAULT_BUFFER_COUNT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            enabled: true,
            supplier_preference: BufferSupplier::Unspecified,
        }
    }

    pub fn input(format: PortFormat) -> Self {
        Self::new(PortDirection::Input, format)
    }

    pub fn output(format: PortFormat) -> Self {
        Self::new(PortDirection::Output, format)
    }

    /// Set both the actual and minimum buffer count, and the buffer size.
    pub fn with_buffers(mut self, count: u32, size: usize) -> Self {
        self.buffer_count_actual = count;
        self.buffer_count_min = count;
        self.buffer_size = size;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_supplier_preference(mut self, supplier: BufferSupplier) -> Self {
        self.supplier_preference = supplier;
        self
    }

    fn validate(&self, position: usize) -> Result<()> {
        if self.buffer_count_min == 0 {
            return Err(ComponentError::BadParameter(format!(
                "port #{}: buffer_count_min must be at least 1",
                position
            )));
        }
        if self.buffer_count_actual < self.buffer_count_min {
            return Err(ComponentError::BadParameter(format!(
                "port #{}: buffer_count_actual {} below minimum {}",
                position, self.buffer_count_actual, self.buffer_count_min
            )));
        }
        if self.buffer_size == 0 {
            return Err(ComponentError::BadParameter(format!(
                "port #{}: buffer_size must be non-zero",
                position
            )));
        }
        Ok(())
    }
}

/// Configuration a component is constructed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    /// How often a tunnel supplier retries the peer's `use_buffer` while the
    /// peer has not yet entered its Loaded->Idle edge.
    #[serde(default = "default_tunnel_use_buffer_retries")]
    pub tunnel_use_buffer_retries: u32,
    #[serde(default = "default_tunnel_retry_interval_ms")]
    pub tunnel_retry_interval_ms: u64,
}

impl ComponentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
            tunnel_use_buffer_retries: DEFAULT_TUNNEL_USE_BUFFER_RETRIES,
            tunnel_retry_interval_ms: DEFAULT_TUNNEL_RETRY_INTERVAL_MS,
        }
    }

    /// One input and one output port carrying `format`; input is port 0.
    pub fn filter(name: impl Into<String>, format: PortFormat) -> Self {
        Self::new(name)
            .with_port(PortConfig::input(format.clone()))
            .with_port(PortConfig::output(format))
    }

    pub fn with_port(mut self, port: PortConfig) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_tunnel_retry(mut self, retries: u32, interval_ms: u64) -> Self {
        self.tunnel_use_buffer_retries = retries;
        self.tunnel_retry_interval_ms = interval_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ComponentError::BadParameter(
                "component name must not be empty".into(),
            ));
        }
        if self.ports.is_empty() {
            return Err(ComponentError::BadParameter(format!(
                "component '{}' has no ports",
                self.name
            )));
        }
        for (position, port) in self.ports.iter().enumerate() {
            port.validate(position)?;
        }
        Ok(())
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| ComponentError::BadParameter(format!("invalid component config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_config() {
        let config = ComponentConfig::filter("filter.pcm", PortFormat::audio("pcm"));
        assert_eq!(config.ports.len(), 2);
        assert_eq!(config.ports[0].direction, PortDirection::Input);
        assert_eq!(config.ports[1].direction, PortDirection::Output);
        assert_eq!(config.ports[0].buffer_count_actual, DEFAULT_BUFFER_COUNT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_counts() {
        let mut config = ComponentConfig::filter("f", PortFormat::audio("pcm"));
        config.ports[1].buffer_count_actual = 1;
        config.ports[1].buffer_count_min = 2;
        assert!(matches!(
            config.validate(),
            Err(ComponentError::BadParameter(_))
        ));

        let config = ComponentConfig::new("empty");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = ComponentConfig::from_toml_str(
            r#"
            name = "audio.renderer"
            tunnel_retry_interval_ms = 5

            [[ports]]
            direction = "input"
            buffer_count_actual = 4
            buffer_count_min = 2
            buffer_size = 8192

            [ports.format]
            domain = "audio"
            encoding = "pcm"
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "audio.renderer");
        assert_eq!(config.tunnel_retry_interval_ms, 5);
        assert_eq!(
            config.tunnel_use_buffer_retries,
            DEFAULT_TUNNEL_USE_BUFFER_RETRIES
        );
        let port = &config.ports[0];
        assert_eq!(port.buffer_count_actual, 4);
        assert_eq!(port.buffer_size, 8192);
        assert!(port.enabled);
        assert_eq!(port.format, PortFormat::audio("pcm"));
        assert_eq!(port.supplier_preference, BufferSupplier::Unspecified);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(ComponentConfig::from_toml_str("name = 3").is_err());
    }

    #[test]
    fn test_config_serde_json() {
        let config = ComponentConfig::filter("f", PortFormat::video("h264", "yuv420"))
            .with_tunnel_retry(3, 10);
        let json = serde_json::to_string(&config).unwrap();
        let back: ComponentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
