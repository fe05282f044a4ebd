//! # RDZ HMI Control - Modbus TCP Coordinator for RDZ Radiant HVAC Controllers
//!
//! Polls an RDZ zone controller over Modbus TCP, publishes an immutable snapshot
//! of its state every cycle, and funnels setpoint, season, mode, system and
//! clock writes through a single serialized connection.
//!
//! ## Features
//!
//! - **Best-effort polling**: a failed register group is carried forward and
//!   flagged stale instead of failing the cycle
//! - **Serialized writes**: one transport call at a time, writes queue FIFO
//!   behind an in-flight poll
//! - **Season routing**: target temperatures land in the winter or summer
//!   setpoint register according to the controller's season
//! - **Linked zones**: real zones mirror their summer setpoint into a linked
//!   virtual zone after every poll
//! - **Offline simulation**: an in-memory controller for tests and dry runs
//!
//! ## Register Map
//!
//! | Address | Kind | Content |
//! |---------|------|---------|
//! | 2 | Coil | Season (0 winter, 1 summer) |
//! | 100-107 | Coil | System activation |
//! | 300-363 | Holding | Winter setpoints (°C ×10) |
//! | 364-427 | Holding | Summer setpoints (°C ×10) |
//! | 428-491 | Holding | Dehumidification setpoints (%) |
//! | 2600 | Holding | Outside temperature |
//! | 2700-2763 | Holding | Zone temperatures |
//! | 2892-2895 | Holding | Zone activity bitmask |
//! | 5009-5013 | Holding | Day, month, year, hour, minute |
//! | 5301-5364 | Holding | Zone modes |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rdz_hmi_control::{BridgeConfig, Coordinator, RdzResult, Season, ZoneConfig};
//!
//! #[tokio::main]
//! async fn main() -> RdzResult<()> {
//!     let config = BridgeConfig::new("192.168.1.50").with_zones(vec![
//!         ZoneConfig::real(0).with_name("Living room").linked_to(32),
//!         ZoneConfig::virtual_zone(32),
//!     ]);
//!     let coordinator = Coordinator::from_config(&config)?;
//!
//!     let snapshot = coordinator.poll_once().await?;
//!     if let Some(zone) = snapshot.zone(0) {
//!         println!("{:?} °C, {:?}", zone.current_temperature, zone.hvac_action);
//!     }
//!
//!     coordinator.set_season(Season::Winter).await?;
//!     coordinator.set_target_temperature(0, 21.5).await?;
//!     coordinator.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐
//! │  Collaborators  │◄───│    Snapshot     │
//! │ (UI, automation)│    │   + Resolver    │
//! └─────────────────┘    └─────────────────┘
//!          │                       ▲
//! ┌─────────────────┐    ┌─────────────────┐
//! │   Coordinator   │───►│  Register Codec │
//! │ (poll + writes) │    │ + Zone Registry │
//! └─────────────────┘    └─────────────────┘
//!          │
//! ┌─────────────────┐    ┌─────────────────┐
//! │  Modbus Client  │    │   Simulator     │
//! │  (TCP Transport)│    │ (Register Bank) │
//! └─────────────────┘    └─────────────────┘
//! ```

/// Core error types and result handling
pub mod error;

/// Modbus protocol definitions and message handling
pub mod protocol;

/// Modbus TCP transport layer
pub mod transport;

/// Register-level Modbus client
pub mod client;

/// RDZ register layout, scaling and validation
pub mod codec;

/// Zone types and real-to-virtual links
pub mod registry;

/// Season-dependent routing, HVAC derivation and setpoint synchronization
pub mod resolver;

/// Immutable poll results and decoded views
pub mod snapshot;

/// Poll loop and write serialization
pub mod coordinator;

/// YAML/JSON configuration
pub mod config;

/// In-memory controller for tests and offline runs
pub mod simulator;

/// Utility functions and poll metrics
pub mod utils;

/// Callback logging of Modbus traffic
pub mod logging;

// Re-export main types for convenience
pub use error::{RdzError, RdzResult, TransportError, TransportResult};
pub use protocol::{ModbusFunction, ModbusRequest, ModbusResponse};
pub use transport::{ModbusTransport, TcpTransport, TransportStats};
pub use client::{GenericModbusClient, ModbusClient, RdzTcpClient};
pub use codec::{DataKind, ReadGroup, Season, SystemId, TemperatureBand, TimeField, ZoneId, ZoneMode};
pub use registry::{ZoneConfig, ZoneRegistry, ZoneType};
pub use resolver::{HvacAction, HvacMode};
pub use snapshot::{Snapshot, SnapshotReport, SystemState, TimeSettings, ZoneRequests, ZoneState};
pub use coordinator::{Coordinator, CoordinatorSettings, CoordinatorState, PollerHandle, TimeUpdate};
pub use config::BridgeConfig;
pub use simulator::{RegisterBank, SimCall, SimulatedController};
pub use utils::{OperationTimer, PollMetrics};
pub use logging::{CallbackLogger, LogCallback, LogLevel, LoggingMode};

/// Default timeout for operations (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default poll interval (30 seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Maximum number of coils that can be read in a single request
pub const MAX_COILS_PER_REQUEST: u16 = 2000;

/// Maximum number of registers that can be read in a single request
pub const MAX_REGISTERS_PER_REQUEST: u16 = 125;

/// Maximum Modbus TCP frame size (MBAP header + PDU)
pub const MAX_TCP_FRAME_SIZE: usize = 260;

/// Modbus TCP port of the RDZ controller
pub const DEFAULT_TCP_PORT: u16 = 8000;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("RDZ HMI Control v{} - Modbus TCP coordinator for RDZ HVAC controllers", VERSION)
}
