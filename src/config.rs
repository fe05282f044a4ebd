/// Bridge configuration
///
/// Connection parameters, poll timing, setpoint band and the zone registry,
/// loaded from YAML or JSON:
///
/// ```yaml
/// host: 192.168.1.50
/// port: 8000
/// poll_interval_secs: 30
/// zones:
///   - id: 0
///     type: real
///     name: Living room
///     linked_zone_id: 32
///   - id: 32
///     type: virtual
/// ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::RdzTcpClient;
use crate::codec::TemperatureBand;
use crate::coordinator::CoordinatorSettings;
use crate::error::{RdzError, RdzResult};
use crate::protocol::UnitId;
use crate::registry::{ZoneConfig, ZoneRegistry};
use crate::transport::TcpTransport;
use crate::{DEFAULT_POLL_INTERVAL_SECS, DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS};

fn default_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_unit_id() -> UnitId {
    1
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_setpoint_min() -> f64 {
    TemperatureBand::SETPOINT.min
}

fn default_setpoint_max() -> f64 {
    TemperatureBand::SETPOINT.max
}

fn default_event_capacity() -> usize {
    16
}

/// Everything needed to run a coordinator against one controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: UnitId,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Per-request socket timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Hex dump every frame through `tracing`
    #[serde(default)]
    pub packet_logging: bool,
    #[serde(default = "default_setpoint_min")]
    pub setpoint_min: f64,
    #[serde(default = "default_setpoint_max")]
    pub setpoint_max: f64,
    /// Snapshots buffered per subscriber before the slowest one starts lagging
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

impl BridgeConfig {
    /// Configuration with defaults for everything but the host
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            unit_id: default_unit_id(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_ms: default_timeout_ms(),
            packet_logging: false,
            setpoint_min: default_setpoint_min(),
            setpoint_max: default_setpoint_max(),
            event_capacity: default_event_capacity(),
            zones: Vec::new(),
        }
    }

    pub fn with_zones(mut self, zones: Vec<ZoneConfig>) -> Self {
        self.zones = zones;
        self
    }

    /// Parse and validate YAML
    pub fn from_yaml_str(text: &str) -> RdzResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON
    pub fn from_json_str(text: &str) -> RdzResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.json` file as JSON and anything else as YAML
    pub fn from_file<P: AsRef<Path>>(path: P) -> RdzResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Check connection parameters, timing, setpoint band and zone registry
    pub fn validate(&self) -> RdzResult<()> {
        if self.host.trim().is_empty() {
            return Err(RdzError::configuration("host must not be empty"));
        }
        if self.port == 0 {
            return Err(RdzError::configuration("port must not be 0"));
        }
        if self.unit_id == 0 || self.unit_id > 247 {
            return Err(RdzError::configuration(format!(
                "unit_id {} out of range 1-247",
                self.unit_id
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(RdzError::configuration("poll_interval_secs must be at least 1"));
        }
        if self.timeout_ms == 0 || self.timeout() >= self.poll_interval() {
            return Err(RdzError::configuration(format!(
                "timeout_ms {} must be between 1 and the poll interval ({} ms)",
                self.timeout_ms,
                self.poll_interval().as_millis()
            )));
        }
        if self.event_capacity == 0 {
            return Err(RdzError::configuration("event_capacity must be at least 1"));
        }

        let full = TemperatureBand::FULL;
        if !(self.setpoint_min < self.setpoint_max
            && full.contains(self.setpoint_min)
            && full.contains(self.setpoint_max))
        {
            return Err(RdzError::configuration(format!(
                "setpoint band {}..{} must be ascending and within {}..{} °C",
                self.setpoint_min, self.setpoint_max, full.min, full.max
            )));
        }

        self.registry().map(|_| ())
    }

    /// Validated zone registry
    pub fn registry(&self) -> RdzResult<ZoneRegistry> {
        ZoneRegistry::new(self.zones.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn setpoint_band(&self) -> TemperatureBand {
        TemperatureBand {
            min: self.setpoint_min,
            max: self.setpoint_max,
        }
    }

    /// Coordinator tuning derived from this configuration
    pub fn settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            poll_interval: self.poll_interval(),
            setpoint_band: self.setpoint_band(),
            event_capacity: self.event_capacity,
        }
    }

    /// TCP client for the configured controller; connects on first use
    pub fn tcp_client(&self) -> RdzTcpClient {
        let mut transport = TcpTransport::new(self.host.clone(), self.port, self.timeout());
        transport.set_packet_logging(self.packet_logging);
        RdzTcpClient::new(transport, self.unit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ZoneType;

    const YAML: &str = "
host: 192.168.1.50
poll_interval_secs: 10
zones:
  - id: 0
    type: real
    name: Living room
    linked_zone_id: 32
  - id: 32
    type: virtual
";

    #[test]
    fn test_yaml_defaults() {
        let config = BridgeConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.unit_id, 1);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.setpoint_band(), TemperatureBand::SETPOINT);
        assert!(!config.packet_logging);

        let registry = config.registry().unwrap();
        assert_eq!(registry.zone_type(32), ZoneType::Virtual);
        assert_eq!(registry.linked_virtual_of(0), Some(32));
    }

    #[test]
    fn test_json() {
        let json = r#"{"host": "rdz.local", "port": 502, "zones": [{"id": 3, "type": "real"}]}"#;
        let config = BridgeConfig::from_json_str(json).unwrap();
        assert_eq!(config.port, 502);
        assert_eq!(config.zones.len(), 1);
    }

    #[test]
    fn test_validation() {
        let base = BridgeConfig::new("rdz.local");
        assert!(base.validate().is_ok());

        let mut config = base.clone();
        config.host = " ".into();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.unit_id = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.poll_interval_secs = 5;
        config.timeout_ms = 5000;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.poll_interval_secs = u64::MAX / 1000 + 1;
        config.timeout_ms = 1000;
        assert!(config.validate().is_ok());
        assert!(
            BridgeConfig::from_yaml_str("host: x\npoll_interval_secs: 18446744073709552\ntimeout_ms: 1000")
                .is_ok()
        );
        assert!(matches!(
            BridgeConfig::from_yaml_str("host: x\npoll_interval_secs: 18446744073709552\ntimeout_ms: 0"),
            Err(RdzError::Configuration { .. })
        ));

        let mut config = base.clone();
        config.setpoint_min = 30.0;
        config.setpoint_max = 20.0;
        assert!(config.validate().is_err());

        let config = base.with_zones(vec![ZoneConfig::real(1).linked_to(2), ZoneConfig::real(2)]);
        assert!(matches!(config.validate(), Err(RdzError::Configuration { .. })));
    }

    #[test]
    fn test_parse_errors_are_configuration_errors() {
        assert!(matches!(
            BridgeConfig::from_yaml_str("port: [oops"),
            Err(RdzError::Configuration { .. })
        ));
        assert!(matches!(
            BridgeConfig::from_file("/nonexistent/rdz.yaml"),
            Err(RdzError::Configuration { .. })
        ));
    }
}
