use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Prometheus exporter serving `/metrics`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub prometheus_enabled: bool,

    /// Port of the exporter, bound on all interfaces
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    /// Checks the exporter can bind next to the HTTP API at `http_address`.
    /// Nothing is checked while the exporter is disabled.
    pub fn validate(
        &self,
        http_address: &SocketAddr,
    ) -> Result<()> {
        if !self.prometheus_enabled {
            return Ok(());
        }
        match self.prometheus_port {
            0 => Err(invalid("prometheus_port cannot be 0 when enabled")),
            port if port < 1024 => Err(invalid(format!(
                "prometheus_port {port} is a privileged port"
            ))),
            port if port == http_address.port() => Err(invalid(format!(
                "prometheus_port {port} collides with http_address {http_address}"
            ))),
            _ => Ok(()),
        }
    }
}

fn default_prometheus_port() -> u16 {
    9100
}
