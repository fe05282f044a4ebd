/// In-memory RDZ controller
///
/// `RegisterBank` is thread-safe coil and holding-register storage. The
/// `SimulatedController` wraps a bank in the `ModbusClient` interface, records
/// every call, and can inject timeouts and latency, so the coordinator can run
/// without hardware.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::ModbusClient;
use crate::codec::{self, DataKind, Season, TimeField, ZoneId, ZoneMode};
use crate::error::{TransportError, TransportResult};
use crate::transport::TransportStats;

/// Coil and holding-register storage; unset addresses read as 0
#[derive(Debug, Clone, Default)]
pub struct RegisterBank {
    coils: Arc<RwLock<HashMap<u16, bool>>>,
    holding_registers: Arc<RwLock<HashMap<u16, u16>>>,
}

impl RegisterBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read coils starting at address (function code 0x01)
    pub fn read_coils(&self, address: u16, quantity: u16) -> Vec<bool> {
        let coils = self.coils.read().unwrap_or_else(|e| e.into_inner());
        (0..quantity)
            .map(|i| coils.get(&address.wrapping_add(i)).copied().unwrap_or(false))
            .collect()
    }

    /// Write single coil (function code 0x05)
    pub fn write_coil(&self, address: u16, value: bool) {
        let mut coils = self.coils.write().unwrap_or_else(|e| e.into_inner());
        coils.insert(address, value);
    }

    /// Read holding registers starting at address (function code 0x03)
    pub fn read_holding_registers(&self, address: u16, quantity: u16) -> Vec<u16> {
        let registers = self.holding_registers.read().unwrap_or_else(|e| e.into_inner());
        (0..quantity)
            .map(|i| registers.get(&address.wrapping_add(i)).copied().unwrap_or(0))
            .collect()
    }

    /// Write single register (function code 0x06)
    pub fn write_register(&self, address: u16, value: u16) {
        let mut registers = self.holding_registers.write().unwrap_or_else(|e| e.into_inner());
        registers.insert(address, value);
    }

    pub fn coil(&self, address: u16) -> bool {
        self.read_coils(address, 1).first().copied().unwrap_or(false)
    }

    pub fn register(&self, address: u16) -> u16 {
        self.read_holding_registers(address, 1).first().copied().unwrap_or(0)
    }

    pub fn set_season(&self, season: Season) {
        self.write_coil(codec::SEASON_COIL, season.coil_value());
    }

    /// Store a ×10 temperature; values are assumed to fit a register
    fn write_temperature(&self, address: u16, celsius: f64) {
        self.write_register(address, (((celsius * codec::TEMPERATURE_SCALE).round()) as i16) as u16);
    }

    pub fn set_zone_temperature(&self, zone_id: ZoneId, celsius: f64) {
        self.write_temperature(codec::zone_temperature_address(zone_id), celsius);
    }

    pub fn set_setpoint(&self, season: Season, zone_id: ZoneId, celsius: f64) {
        self.write_temperature(codec::zone_setpoint_address(season, zone_id), celsius);
    }

    pub fn set_zone_mode(&self, zone_id: ZoneId, mode: ZoneMode) {
        self.write_register(codec::zone_mode_address(zone_id), mode.to_raw());
    }

    pub fn set_outside_temperature(&self, celsius: f64) {
        self.write_temperature(codec::OUTSIDE_TEMPERATURE_REGISTER, celsius);
    }

    /// Set or clear a zone's bit in the activity bitmask
    pub fn set_zone_active(&self, zone_id: ZoneId, active: bool) {
        let address = codec::zone_activity_register(zone_id);
        let word = codec::encode_bit(self.register(address), codec::zone_activity_bit(zone_id), active);
        self.write_register(address, word);
    }

    /// Populate a small plausible installation: zones 0-3 real, zone 0 linked to virtual zone 32
    pub fn seed_demo(&self) {
        self.set_season(Season::Winter);
        self.set_outside_temperature(7.5);
        for (zone_id, temperature) in [(0u8, 20.4), (1, 21.1), (2, 19.8), (3, 22.0)] {
            self.set_zone_temperature(zone_id, temperature);
            self.set_setpoint(Season::Winter, zone_id, 21.0);
            self.set_setpoint(Season::Summer, zone_id, 25.0);
            self.write_register(codec::zone_humidity_address(zone_id), 480);
            self.write_register(codec::zone_dehumidification_address(zone_id), 60);
            self.set_zone_mode(zone_id, ZoneMode::Programmed);
        }
        self.set_setpoint(Season::Summer, 32, 26.5);
        self.set_zone_active(0, true);
        self.write_coil(codec::system_activation_coil(1), true);
        self.write_temperature(codec::delivery_water_temperature_address(1), 34.5);
        self.write_temperature(codec::calculated_water_temperature_address(1), 35.0);
        self.write_register(codec::PUMP_BITMASK_REGISTER, 0b1);
        for (field, value) in TimeField::ALL.iter().zip([17u16, 10, 2026, 8, 30]) {
            self.write_register(field.address(), value);
        }
    }
}

/// One call received by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCall {
    Read { kind: DataKind, address: u16, count: u16 },
    Write { kind: DataKind, address: u16, value: u16 },
}

#[derive(Debug, Default)]
struct SimState {
    failing_reads: HashSet<u16>,
    failing_writes: HashSet<u16>,
    calls: Vec<SimCall>,
    delay: Duration,
    closed: bool,
    stats: TransportStats,
}

/// `ModbusClient` backed by a `RegisterBank`
///
/// Clones share the bank, call log and fault configuration.
#[derive(Debug, Clone, Default)]
pub struct SimulatedController {
    bank: RegisterBank,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bank(bank: RegisterBank) -> Self {
        Self {
            bank,
            state: Arc::default(),
        }
    }

    pub fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Latency added to every call
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = delay;
    }

    /// Reads starting at `address` time out until cleared
    pub fn fail_reads_at(&self, address: u16) {
        self.state().failing_reads.insert(address);
    }

    /// Writes to `address` time out until cleared
    pub fn fail_writes_at(&self, address: u16) {
        self.state().failing_writes.insert(address);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_reads.clear();
        state.failing_writes.clear();
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<SimCall> {
        self.state().calls.clone()
    }

    /// Write calls received so far, in order
    pub fn writes(&self) -> Vec<SimCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, SimCall::Write { .. }))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Record a call and decide its fate; returns the latency to apply
    fn begin(&self, call: SimCall) -> TransportResult<Duration> {
        let mut state = self.state();
        state.closed = false;
        state.calls.push(call);
        state.stats.requests_sent += 1;
        let failing = match call {
            SimCall::Read { address, .. } => state.failing_reads.contains(&address),
            SimCall::Write { address, .. } => state.failing_writes.contains(&address),
        };
        if failing {
            state.stats.errors += 1;
            state.stats.timeouts += 1;
            return Err(TransportError::timeout("simulated request", 0));
        }
        state.stats.responses_received += 1;
        Ok(state.delay)
    }

    async fn pause(delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ModbusClient for SimulatedController {
    async fn read_01(&mut self, address: u16, quantity: u16) -> TransportResult<Vec<bool>> {
        let delay = self.begin(SimCall::Read {
            kind: DataKind::Coil,
            address,
            count: quantity,
        })?;
        Self::pause(delay).await;
        Ok(self.bank.read_coils(address, quantity))
    }

    async fn read_03(&mut self, address: u16, quantity: u16) -> TransportResult<Vec<u16>> {
        let delay = self.begin(SimCall::Read {
            kind: DataKind::HoldingRegister,
            address,
            count: quantity,
        })?;
        Self::pause(delay).await;
        Ok(self.bank.read_holding_registers(address, quantity))
    }

    async fn write_05(&mut self, address: u16, value: bool) -> TransportResult<()> {
        let delay = self.begin(SimCall::Write {
            kind: DataKind::Coil,
            address,
            value: value as u16,
        })?;
        Self::pause(delay).await;
        self.bank.write_coil(address, value);
        Ok(())
    }

    async fn write_06(&mut self, address: u16, value: u16) -> TransportResult<()> {
        let delay = self.begin(SimCall::Write {
            kind: DataKind::HoldingRegister,
            address,
            value,
        })?;
        Self::pause(delay).await;
        self.bank.write_register(address, value);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.state().closed
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.state().closed = true;
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.state().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_bank() {
        let bank = RegisterBank::new();
        bank.write_register(305, 215);
        bank.write_coil(2, true);
        assert_eq!(bank.read_holding_registers(304, 3), vec![0, 215, 0]);
        assert_eq!(bank.read_coils(1, 2), vec![false, true]);

        bank.set_zone_active(20, true);
        assert_eq!(bank.register(2893), 1 << 4);
        bank.set_zone_active(20, false);
        assert_eq!(bank.register(2893), 0);

        bank.set_zone_temperature(3, -2.5);
        assert_eq!(codec::decode_temperature(bank.register(2703)), -2.5);
    }

    #[tokio::test]
    async fn test_simulated_controller() {
        let mut controller = SimulatedController::new();
        let observer = controller.clone();

        controller.write(DataKind::HoldingRegister, 369, 250).await.unwrap();
        assert_eq!(controller.read(DataKind::HoldingRegister, 369, 1).await.unwrap(), vec![250]);

        observer.fail_reads_at(2700);
        assert!(controller.read_03(2700, 64).await.unwrap_err().is_timeout());
        observer.clear_failures();
        assert!(controller.read_03(2700, 64).await.is_ok());

        assert_eq!(observer.calls().len(), 4);
        assert_eq!(
            observer.writes(),
            vec![SimCall::Write {
                kind: DataKind::HoldingRegister,
                address: 369,
                value: 250
            }]
        );
        assert_eq!(observer.get_stats().timeouts, 1);
    }

    #[test]
    fn test_seed_demo() {
        let bank = RegisterBank::new();
        bank.seed_demo();
        assert!(!bank.coil(codec::SEASON_COIL));
        assert_eq!(bank.register(codec::zone_setpoint_address(Season::Winter, 1)), 210);
        assert_eq!(bank.register(TimeField::Year.address()), 2026);
    }
}
