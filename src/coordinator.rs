//! # Coordinator
//!
//! Owns the controller connection, runs the poll cycle and serializes writes.
//!
//! ## Serialization
//!
//! Every transport call happens while holding one async mutex. The mutex is
//! fair, so concurrent writes queue in FIFO order; a poll never starts while a
//! write holds it, and a write issued during a poll waits for the whole cycle
//! (reads, publication and setpoint synchronization) to finish.
//!
//! ## Poll cycle
//!
//! 1. Read every [`ReadGroup`] once; a failed group does not abort the others.
//! 2. Assemble a [`Snapshot`], carrying failed groups forward as stale.
//! 3. Publish it as current and notify subscribers once.
//! 4. Mirror real summer setpoints into linked virtual zones and patch the
//!    current snapshot with each successful write.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rdz_hmi_control::{BridgeConfig, Coordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfig::from_file("rdz.yaml")?;
//!     let coordinator = Coordinator::from_config(&config)?;
//!     let poller = coordinator.spawn();
//!
//!     let mut updates = coordinator.subscribe();
//!     let snapshot = updates.recv().await?;
//!     println!("season: {:?}", snapshot.season());
//!
//!     coordinator.set_target_temperature(0, 21.5).await?;
//!     poller.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{broadcast, watch, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::client::ModbusClient;
use crate::codec::{
    self, DataKind, ReadGroup, Season, SystemId, TemperatureBand, TimeField, ZoneId, ZoneMode,
    SEASON_COIL, ZONE_COUNT, ZONE_TEMPERATURE_BASE,
};
use crate::config::BridgeConfig;
use crate::error::{RdzError, RdzResult, TransportError};
use crate::registry::ZoneRegistry;
use crate::resolver::{self, HvacMode};
use crate::snapshot::Snapshot;
use crate::transport::TransportStats;
use crate::utils::{format, OperationTimer, PollMetrics};

/// Lifecycle state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    /// No poll has completed yet, or the coordinator is shut down
    Idle,
    Polling,
    /// Last poll finished; waiting for the next tick
    Ready,
    WriteInFlight,
}

/// Coordinator tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorSettings {
    pub poll_interval: Duration,
    /// Accepted target temperatures
    pub setpoint_band: TemperatureBand,
    /// Snapshots buffered per subscriber
    pub event_capacity: usize,
}

/// Shortest accepted poll period
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(crate::DEFAULT_POLL_INTERVAL_SECS),
            setpoint_band: TemperatureBand::SETPOINT,
            event_capacity: 16,
        }
    }
}

/// Partial clock update; `None` fields are left untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeUpdate {
    pub day: Option<u16>,
    pub month: Option<u16>,
    pub year: Option<u16>,
    pub hour: Option<u16>,
    pub minute: Option<u16>,
}

impl TimeUpdate {
    /// Every field taken from `moment`
    pub fn from_datetime<Tz: TimeZone>(moment: &DateTime<Tz>) -> Self {
        Self {
            day: Some(moment.day() as u16),
            month: Some(moment.month() as u16),
            year: u16::try_from(moment.year()).ok(),
            hour: Some(moment.hour() as u16),
            minute: Some(moment.minute() as u16),
        }
    }

    /// Present fields in register order
    pub fn fields(&self) -> Vec<(TimeField, u16)> {
        TimeField::ALL
            .iter()
            .zip([self.day, self.month, self.year, self.hour, self.minute])
            .filter_map(|(&field, value)| value.map(|v| (field, v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

struct Io {
    client: Box<dyn ModbusClient>,
    closed: bool,
}

struct Shared {
    io: tokio::sync::Mutex<Io>,
    registry: RwLock<Arc<ZoneRegistry>>,
    current: RwLock<Arc<Snapshot>>,
    events: broadcast::Sender<Arc<Snapshot>>,
    state: watch::Sender<CoordinatorState>,
    metrics: Mutex<PollMetrics>,
    settings: CoordinatorSettings,
}

/// Exclusive use of the connection
///
/// Restores the coordinator state on drop, including when the owning future
/// is cancelled.
struct IoSlot<'a> {
    io: MutexGuard<'a, Io>,
    state: &'a watch::Sender<CoordinatorState>,
    restore: Option<CoordinatorState>,
}

impl Drop for IoSlot<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.restore {
            self.state.send_replace(state);
        }
    }
}

/// Polls an RDZ controller and funnels writes to it
///
/// Cheap to clone; clones share one connection and one snapshot.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Create a coordinator over any client; performs no I/O
    pub fn new<C>(client: C, registry: ZoneRegistry, settings: CoordinatorSettings) -> Self
    where
        C: ModbusClient + 'static,
    {
        let mut settings = settings;
        if settings.poll_interval < MIN_POLL_INTERVAL {
            warn!(
                "Poll interval {:?} too short, using {:?}",
                settings.poll_interval, MIN_POLL_INTERVAL
            );
            settings.poll_interval = MIN_POLL_INTERVAL;
        }
        let registry = Arc::new(registry);
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let (state, _) = watch::channel(CoordinatorState::Idle);
        Self {
            shared: Arc::new(Shared {
                io: tokio::sync::Mutex::new(Io {
                    client: Box::new(client),
                    closed: false,
                }),
                current: RwLock::new(Arc::new(Snapshot::empty(registry.clone()))),
                registry: RwLock::new(registry),
                events,
                state,
                metrics: Mutex::new(PollMetrics::new()),
                settings,
            }),
        }
    }

    /// Coordinator talking Modbus TCP to the configured controller
    pub fn from_config(config: &BridgeConfig) -> RdzResult<Self> {
        Self::with_client(config, config.tcp_client())
    }

    /// Coordinator using the configured registry and timing over `client`
    pub fn with_client<C>(config: &BridgeConfig, client: C) -> RdzResult<Self>
    where
        C: ModbusClient + 'static,
    {
        config.validate()?;
        Ok(Self::new(client, config.registry()?, config.settings()))
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.shared.settings
    }

    /// Current snapshot, including optimistic write updates
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Receive every published snapshot, once per poll cycle
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> CoordinatorState {
        *self.shared.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<CoordinatorState> {
        self.shared.state.subscribe()
    }

    pub fn metrics(&self) -> PollMetrics {
        self.shared
            .metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Transport counters; waits for any in-flight operation
    pub async fn transport_stats(&self) -> TransportStats {
        self.shared.io.lock().await.client.get_stats()
    }

    /// Registry used by the next poll or write
    pub fn registry(&self) -> Arc<ZoneRegistry> {
        self.shared
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the zone registry as a whole
    ///
    /// A poll already in progress finishes with the registry it started with.
    pub fn reconfigure(&self, registry: ZoneRegistry) {
        info!("Zone registry replaced ({} zones)", registry.len());
        *self
            .shared
            .registry
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Arc::new(registry);
    }

    async fn acquire(&self, entering: Option<CoordinatorState>) -> RdzResult<IoSlot<'_>> {
        let io = self.shared.io.lock().await;
        if io.closed {
            return Err(RdzError::ShutDown);
        }
        let restore = entering.map(|state| self.shared.state.send_replace(state));
        Ok(IoSlot {
            io,
            state: &self.shared.state,
            restore,
        })
    }

    fn publish(&self, snapshot: Arc<Snapshot>) {
        *self
            .shared
            .current
            .write()
            .unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    /// Fold a written value into the current snapshot without notifying
    fn patch(&self, kind: DataKind, address: u16, value: u16) {
        let Some(group) = ReadGroup::ALL
            .iter()
            .copied()
            .find(|group| group.contains(kind, address))
        else {
            return;
        };
        let mut current = self
            .shared
            .current
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let index = (address - group.start()) as usize;
        if !Arc::make_mut(&mut *current).set_word(group, index, value) {
            debug!("No {} data yet, {} not folded into snapshot", group, address);
        }
    }

    fn record_sync(&self, success: bool) {
        self.shared
            .metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_sync(success);
    }

    /// Run one poll cycle and return the resulting snapshot
    ///
    /// Read failures are absorbed into stale flags, so this only fails once
    /// the coordinator is shut down.
    pub async fn poll_once(&self) -> RdzResult<Arc<Snapshot>> {
        let mut slot = self.acquire(Some(CoordinatorState::Polling)).await?;
        let registry = self.registry();
        let timer = OperationTimer::start("poll cycle");

        let mut fresh = BTreeMap::new();
        let mut failed = 0u64;
        let mut timeouts = 0u64;
        let mut unreachable = false;

        for group in ReadGroup::ALL {
            if unreachable {
                failed += 1;
                continue;
            }
            match slot.io.client.read(group.kind(), group.start(), group.count()).await {
                Ok(words) => {
                    debug!("{} @ {}: {}", group, group.start(), format::registers_to_hex(&words));
                    fresh.insert(group, words);
                }
                Err(err) => {
                    warn!("Poll of {} failed: {}", group, err);
                    failed += 1;
                    if err.is_timeout() {
                        timeouts += 1;
                    }
                    // The next cycle retries the connection
                    unreachable = matches!(err, TransportError::ConnectFailed { .. });
                }
            }
        }

        let previous = self.snapshot();
        let snapshot = Arc::new(Snapshot::assemble(
            previous.version() + 1,
            registry,
            fresh,
            &previous,
        ));
        self.publish(snapshot.clone());
        if self.shared.events.send(snapshot.clone()).is_err() {
            debug!("Snapshot {} published with no subscribers", snapshot.version());
        }

        for write in resolver::plan_setpoint_sync(&snapshot) {
            match slot.io.client.write_06(write.address, write.raw).await {
                Ok(()) => {
                    info!(
                        "Mirrored summer setpoint {:.1} °C from zone {} to virtual zone {}",
                        codec::decode_temperature(write.raw),
                        write.real_zone_id,
                        write.virtual_zone_id
                    );
                    self.patch(DataKind::HoldingRegister, write.address, write.raw);
                    self.record_sync(true);
                }
                Err(err) => {
                    warn!(
                        "Mirroring zone {} to virtual zone {} failed, retrying next cycle: {}",
                        write.real_zone_id, write.virtual_zone_id, err
                    );
                    self.record_sync(false);
                }
            }
        }

        let duration = timer.stop_and_log(failed == 0);
        self.shared
            .metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_cycle(duration, failed, timeouts);
        slot.restore = Some(CoordinatorState::Ready);

        Ok(self.snapshot())
    }

    /// Write one value while holding the connection, then patch the snapshot
    async fn write_value(&self, kind: DataKind, address: u16, value: u16) -> RdzResult<()> {
        let mut slot = self.acquire(Some(CoordinatorState::WriteInFlight)).await?;
        slot.io.client.write(kind, address, value).await?;
        self.patch(kind, address, value);
        Ok(())
    }

    /// Set the target temperature of a real zone for the current season
    ///
    /// Virtual and unconfigured zones are rejected before anything is sent.
    /// Fails with [`RdzError::SeasonUnknown`] until the season has been read or written.
    pub async fn set_target_temperature(&self, zone_id: ZoneId, celsius: f64) -> RdzResult<()> {
        codec::check_zone_id(zone_id)?;
        resolver::ensure_temperature_writable(&self.registry(), zone_id)?;
        let raw = codec::encode_temperature(celsius, &self.shared.settings.setpoint_band)?;

        let mut slot = self.acquire(Some(CoordinatorState::WriteInFlight)).await?;
        let season = self.snapshot().season().ok_or(RdzError::SeasonUnknown)?;
        let address = resolver::target_register(season, zone_id);
        slot.io.client.write_06(address, raw).await?;
        self.patch(DataKind::HoldingRegister, address, raw);
        debug!("Zone {} {} setpoint set to {:.1} °C", zone_id, season, celsius);
        Ok(())
    }

    /// Switch the global season
    pub async fn set_season(&self, season: Season) -> RdzResult<()> {
        let mut slot = self.acquire(Some(CoordinatorState::WriteInFlight)).await?;
        slot.io.client.write_05(SEASON_COIL, season.coil_value()).await?;
        self.patch(DataKind::Coil, SEASON_COIL, season.to_word());
        info!("Season switched to {}", season);
        Ok(())
    }

    /// Write a zone's own mode register; virtual zones are allowed
    pub async fn set_zone_mode(&self, zone_id: ZoneId, mode: ZoneMode) -> RdzResult<()> {
        codec::check_zone_id(zone_id)?;
        self.registry().zone_config(zone_id)?;
        self.write_value(DataKind::HoldingRegister, codec::zone_mode_address(zone_id), mode.to_raw())
            .await
    }

    /// Write the mode register that currently governs a zone's thermostat
    ///
    /// In summer a linked real zone is governed by its virtual zone. Returns
    /// the zone whose register was written.
    pub async fn set_effective_zone_mode(&self, zone_id: ZoneId, mode: ZoneMode) -> RdzResult<ZoneId> {
        codec::check_zone_id(zone_id)?;
        let registry = self.registry();
        registry.zone_config(zone_id)?;

        let mut slot = self.acquire(Some(CoordinatorState::WriteInFlight)).await?;
        let target = resolver::effective_mode_zone(&registry, self.snapshot().season(), zone_id);
        let address = codec::zone_mode_address(target);
        slot.io.client.write_06(address, mode.to_raw()).await?;
        self.patch(DataKind::HoldingRegister, address, mode.to_raw());
        Ok(target)
    }

    /// Set a zone's dehumidification setpoint (30-90 %)
    pub async fn set_dehumidification_setpoint(&self, zone_id: ZoneId, percent: u16) -> RdzResult<()> {
        codec::check_zone_id(zone_id)?;
        self.registry().zone_config(zone_id)?;
        let raw = codec::encode_dehumidification(percent)?;
        self.write_value(
            DataKind::HoldingRegister,
            codec::zone_dehumidification_address(zone_id),
            raw,
        )
        .await
    }

    /// Always fails: the HVAC mode is derived from season and zone type
    pub async fn set_hvac_mode(&self, zone_id: ZoneId, mode: HvacMode) -> RdzResult<()> {
        Err(RdzError::invalid_zone(
            zone_id,
            format!("HVAC mode is read-only and cannot be set to {:?}", mode),
        ))
    }

    /// Switch an HVAC system (1-8) on or off
    pub async fn set_system_activation(&self, system_id: SystemId, active: bool) -> RdzResult<()> {
        codec::check_system_id(system_id)?;
        self.write_value(
            DataKind::Coil,
            codec::system_activation_coil(system_id),
            active as u16,
        )
        .await
    }

    /// Set some or all clock fields
    ///
    /// Every field is validated before the first write; fields are written in
    /// register order and a failure leaves earlier fields written.
    pub async fn set_time(&self, update: TimeUpdate) -> RdzResult<()> {
        let fields = update
            .fields()
            .into_iter()
            .map(|(field, value)| field.validate(value).map(|v| (field, v)))
            .collect::<RdzResult<Vec<_>>>()?;
        if fields.is_empty() {
            return Err(RdzError::validation("Time update carries no fields"));
        }

        let mut slot = self.acquire(Some(CoordinatorState::WriteInFlight)).await?;
        for (field, value) in fields {
            slot.io.client.write_06(field.address(), value).await?;
            self.patch(DataKind::HoldingRegister, field.address(), value);
        }
        Ok(())
    }

    /// Zone ids whose temperature sensor reports a non-zero value
    pub async fn discover_zones(&self) -> RdzResult<Vec<ZoneId>> {
        let mut slot = self.acquire(None).await?;
        let raw = slot
            .io
            .client
            .read_03(ZONE_TEMPERATURE_BASE, ZONE_COUNT as u16)
            .await?;
        Ok((0..ZONE_COUNT)
            .zip(raw)
            .filter(|&(_, value)| value != 0)
            .map(|(zone_id, _)| zone_id)
            .collect())
    }

    /// Check that the controller answers
    pub async fn probe(&self) -> RdzResult<()> {
        let mut slot = self.acquire(None).await?;
        slot.io.client.read_03(ZONE_TEMPERATURE_BASE, 1).await?;
        Ok(())
    }

    /// Close the connection once any in-flight operation completes
    ///
    /// Later operations fail with [`RdzError::ShutDown`].
    pub async fn shutdown(&self) -> RdzResult<()> {
        let mut io = self.shared.io.lock().await;
        if io.closed {
            return Ok(());
        }
        io.closed = true;
        self.shared.state.send_replace(CoordinatorState::Idle);
        io.client.close().await?;
        info!("Coordinator shut down");
        Ok(())
    }

    /// Start polling every `poll_interval`, beginning immediately
    pub fn spawn(&self) -> PollerHandle {
        let (stop, mut stopped) = watch::channel(false);
        let coordinator = self.clone();
        let period = self.shared.settings.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = coordinator.poll_once().await {
                            debug!("Poll task stopping: {}", err);
                            break;
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
        });

        PollerHandle {
            coordinator: self.clone(),
            stop,
            task,
        }
    }
}

/// Handle to the background poll task
pub struct PollerHandle {
    coordinator: Coordinator,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling, let an in-flight cycle finish, then close the connection
    pub async fn shutdown(self) -> RdzResult<()> {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!("Poll task ended abnormally: {}", err);
        }
        self.coordinator.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{SUMMER_SETPOINT_BASE, WINTER_SETPOINT_BASE};
    use crate::registry::ZoneConfig;
    use crate::simulator::{RegisterBank, SimCall, SimulatedController};
    use crate::utils::logging::init_test_logger;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio_test::{assert_err, assert_ok};

    fn registry() -> ZoneRegistry {
        ZoneRegistry::new(vec![
            ZoneConfig::real(0).with_name("Living room").linked_to(32),
            ZoneConfig::virtual_zone(32),
            ZoneConfig::real(1),
            ZoneConfig::unconfigured(2),
        ])
        .unwrap()
    }

    fn setup_with(settings: CoordinatorSettings) -> (Coordinator, SimulatedController) {
        init_test_logger();
        let bank = RegisterBank::new();
        bank.seed_demo();
        let controller = SimulatedController::with_bank(bank);
        let coordinator = Coordinator::new(controller.clone(), registry(), settings);
        (coordinator, controller)
    }

    fn setup() -> (Coordinator, SimulatedController) {
        setup_with(CoordinatorSettings::default())
    }

    fn write(kind: DataKind, address: u16, value: u16) -> SimCall {
        SimCall::Write { kind, address, value }
    }

    #[tokio::test]
    async fn test_poll_publishes_and_mirrors() {
        let (coordinator, controller) = setup();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.snapshot().version(), 0);

        let snapshot = coordinator.poll_once().await.unwrap();
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.season(), Some(Season::Winter));
        assert!(snapshot.stale_groups().is_empty());
        assert_eq!(coordinator.state(), CoordinatorState::Ready);

        let zone = snapshot.zone(0).unwrap();
        assert_eq!(zone.current_temperature, Some(20.4));
        assert_eq!(zone.target_temperature, Some(21.0));
        assert_eq!(zone.hvac_action, resolver::HvacAction::Heating);
        assert_eq!(zone.name.as_deref(), Some("Living room"));

        // Zone 0 summer 25.0 mirrored over virtual zone 32's 26.5
        assert_eq!(
            controller.writes(),
            vec![write(DataKind::HoldingRegister, SUMMER_SETPOINT_BASE + 32, 250)]
        );
        assert_eq!(controller.calls().len(), ReadGroup::ALL.len() + 1);
        assert_eq!(snapshot.zone(32).unwrap().summer_setpoint, Some(25.0));
        assert_eq!(controller.bank().register(SUMMER_SETPOINT_BASE + 32), 250);

        let metrics = coordinator.metrics();
        assert_eq!(metrics.cycles, 1);
        assert_eq!(metrics.complete_cycles, 1);
        assert_eq!(metrics.sync_writes, 1);

        // Already in sync
        controller.clear_calls();
        coordinator.poll_once().await.unwrap();
        assert!(controller.writes().is_empty());
    }

    #[tokio::test]
    async fn test_failed_group_is_carried_forward() {
        let (coordinator, controller) = setup();
        coordinator.poll_once().await.unwrap();

        controller.fail_reads_at(WINTER_SETPOINT_BASE);
        controller.bank().set_setpoint(Season::Winter, 1, 23.0);
        controller.bank().set_zone_temperature(1, 22.2);
        let snapshot = coordinator.poll_once().await.unwrap();

        assert_eq!(snapshot.stale_groups(), vec![ReadGroup::WinterSetpoints]);
        let zone = snapshot.zone(1).unwrap();
        assert_eq!(zone.winter_setpoint, Some(21.0));
        assert_eq!(zone.current_temperature, Some(22.2));
        assert_eq!(zone.stale, vec![ReadGroup::WinterSetpoints]);

        let metrics = coordinator.metrics();
        assert_eq!(metrics.cycles, 2);
        assert_eq!(metrics.complete_cycles, 1);
        assert_eq!(metrics.failed_reads, 1);
        assert_eq!(metrics.timeouts, 1);

        controller.clear_failures();
        let snapshot = coordinator.poll_once().await.unwrap();
        assert!(!snapshot.is_stale(ReadGroup::WinterSetpoints));
        assert_eq!(snapshot.zone(1).unwrap().winter_setpoint, Some(23.0));
    }

    #[tokio::test]
    async fn test_group_never_read_is_unavailable() {
        let (coordinator, controller) = setup();
        controller.fail_reads_at(ReadGroup::OutsideTemperature.start());
        let snapshot = coordinator.poll_once().await.unwrap();
        assert!(snapshot.is_stale(ReadGroup::OutsideTemperature));
        assert_eq!(snapshot.outside_temperature(), None);
        assert_eq!(snapshot.season(), Some(Season::Winter));
    }

    #[tokio::test]
    async fn test_rejected_writes_never_reach_transport() {
        let (coordinator, controller) = setup();
        coordinator.poll_once().await.unwrap();
        controller.clear_calls();

        assert!(matches!(
            coordinator.set_target_temperature(32, 22.0).await,
            Err(RdzError::InvalidZone { zone_id: 32, .. })
        ));
        assert!(matches!(
            coordinator.set_target_temperature(2, 22.0).await,
            Err(RdzError::InvalidZone { .. })
        ));
        assert!(matches!(
            coordinator.set_target_temperature(9, 22.0).await,
            Err(RdzError::InvalidZone { .. })
        ));
        assert!(matches!(
            coordinator.set_target_temperature(1, 40.0).await,
            Err(RdzError::Validation { .. })
        ));
        assert!(matches!(
            coordinator.set_target_temperature(64, 21.0).await,
            Err(RdzError::Validation { .. })
        ));
        assert!(matches!(
            coordinator.set_hvac_mode(0, HvacMode::Cool).await,
            Err(RdzError::InvalidZone { zone_id: 0, .. })
        ));
        assert_err!(coordinator.set_zone_mode(2, ZoneMode::Manual).await);
        assert_err!(coordinator.set_dehumidification_setpoint(1, 95).await);
        assert_err!(coordinator.set_system_activation(9, true).await);

        assert!(controller.calls().is_empty());
        assert_eq!(coordinator.state(), CoordinatorState::Ready);
    }

    #[tokio::test]
    async fn test_season_unknown_before_first_poll() {
        let (coordinator, controller) = setup();
        assert_eq!(
            coordinator.set_target_temperature(1, 21.0).await,
            Err(RdzError::SeasonUnknown)
        );
        assert!(controller.calls().is_empty());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[tokio::test]
    async fn test_season_write_visible_before_first_poll() {
        let (coordinator, controller) = setup();
        assert_ok!(coordinator.set_season(Season::Summer).await);
        assert_eq!(coordinator.snapshot().season(), Some(Season::Summer));

        assert_ok!(coordinator.set_target_temperature(1, 24.5).await);
        assert_eq!(
            controller.writes(),
            vec![
                write(DataKind::Coil, SEASON_COIL, 1),
                write(DataKind::HoldingRegister, SUMMER_SETPOINT_BASE + 1, 245),
            ]
        );
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[tokio::test]
    async fn test_temperature_follows_season() {
        let (coordinator, controller) = setup();
        coordinator.poll_once().await.unwrap();
        controller.clear_calls();

        assert_ok!(coordinator.set_target_temperature(1, 21.5).await);
        assert_eq!(coordinator.snapshot().zone(1).unwrap().winter_setpoint, Some(21.5));
        assert_eq!(coordinator.snapshot().zone(1).unwrap().target_temperature, Some(21.5));

        assert_ok!(coordinator.set_season(Season::Summer).await);
        assert_eq!(coordinator.snapshot().season(), Some(Season::Summer));

        assert_ok!(coordinator.set_target_temperature(1, 24.0).await);
        assert_ok!(coordinator.set_target_temperature(1, 24.0).await);
        let zone = coordinator.snapshot().zone(1).unwrap();
        assert_eq!(zone.summer_setpoint, Some(24.0));
        assert_eq!(zone.winter_setpoint, Some(21.5));

        assert_eq!(
            controller.writes(),
            vec![
                write(DataKind::HoldingRegister, WINTER_SETPOINT_BASE + 1, 215),
                write(DataKind::Coil, SEASON_COIL, 1),
                write(DataKind::HoldingRegister, SUMMER_SETPOINT_BASE + 1, 240),
                write(DataKind::HoldingRegister, SUMMER_SETPOINT_BASE + 1, 240),
            ]
        );
        assert_eq!(controller.bank().register(SUMMER_SETPOINT_BASE + 1), 240);

        let snapshot = coordinator.poll_once().await.unwrap();
        assert!(!snapshot.is_stale(ReadGroup::SummerSetpoints));
        assert_eq!(snapshot.zone(1).unwrap().summer_setpoint, Some(24.0));
        assert_eq!(snapshot.zone(1).unwrap().target_temperature, Some(24.0));
    }

    #[tokio::test]
    async fn test_summer_write_reaches_virtual_zone_next_poll() {
        let (coordinator, controller) = setup();
        controller.bank().set_season(Season::Summer);
        coordinator.poll_once().await.unwrap();
        controller.clear_calls();

        coordinator.set_target_temperature(0, 23.5).await.unwrap();
        assert_eq!(coordinator.snapshot().zone(32).unwrap().summer_setpoint, Some(25.0));

        coordinator.poll_once().await.unwrap();
        assert_eq!(
            controller.writes(),
            vec![
                write(DataKind::HoldingRegister, SUMMER_SETPOINT_BASE, 235),
                write(DataKind::HoldingRegister, SUMMER_SETPOINT_BASE + 32, 235),
            ]
        );
        assert_eq!(coordinator.snapshot().zone(32).unwrap().summer_setpoint, Some(23.5));
    }

    #[tokio::test]
    async fn test_sync_skipped_while_summer_group_stale() {
        let (coordinator, controller) = setup();
        controller.fail_reads_at(SUMMER_SETPOINT_BASE);
        coordinator.poll_once().await.unwrap();
        assert!(controller.writes().is_empty());
        assert_eq!(controller.bank().register(SUMMER_SETPOINT_BASE + 32), 265);
    }

    #[tokio::test]
    async fn test_failed_sync_is_absorbed() {
        let (coordinator, controller) = setup();
        controller.fail_writes_at(SUMMER_SETPOINT_BASE + 32);
        let snapshot = coordinator.poll_once().await.unwrap();
        assert_eq!(snapshot.zone(32).unwrap().summer_setpoint, Some(26.5));
        assert_eq!(coordinator.metrics().sync_failures, 1);
        assert_eq!(coordinator.state(), CoordinatorState::Ready);

        controller.clear_failures();
        coordinator.poll_once().await.unwrap();
        assert_eq!(controller.bank().register(SUMMER_SETPOINT_BASE + 32), 250);
    }

    #[tokio::test]
    async fn test_one_notification_per_cycle() {
        let (coordinator, _controller) = setup();
        let mut updates = coordinator.subscribe();

        coordinator.poll_once().await.unwrap();
        coordinator.set_season(Season::Summer).await.unwrap();
        coordinator.poll_once().await.unwrap();

        assert_eq!(updates.try_recv().unwrap().version(), 1);
        let second = updates.try_recv().unwrap();
        assert_eq!(second.version(), 2);
        assert_eq!(second.season(), Some(Season::Summer));
        assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_published_snapshot_is_not_mutated_by_writes() {
        let (coordinator, _controller) = setup();
        let mut updates = coordinator.subscribe();
        coordinator.poll_once().await.unwrap();
        let published = updates.recv().await.unwrap();

        coordinator.set_season(Season::Summer).await.unwrap();
        assert_eq!(published.season(), Some(Season::Winter));
        assert_eq!(coordinator.snapshot().season(), Some(Season::Summer));
    }

    #[tokio::test]
    async fn test_write_waits_for_poll_in_flight() {
        let (coordinator, controller) = setup();
        controller.set_delay(Duration::from_millis(5));

        let poller = coordinator.clone();
        let poll = tokio::spawn(async move { poller.poll_once().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coordinator.state(), CoordinatorState::Polling);

        coordinator.set_season(Season::Summer).await.unwrap();
        poll.await.unwrap().unwrap();

        let calls = controller.calls();
        let season_write = calls
            .iter()
            .position(|call| *call == write(DataKind::Coil, SEASON_COIL, 1))
            .unwrap();
        let last_read = calls
            .iter()
            .rposition(|call| matches!(call, SimCall::Read { .. }))
            .unwrap();
        assert!(season_write > last_read);
        assert_eq!(season_write, calls.len() - 1);
    }

    #[tokio::test]
    async fn test_concurrent_writes_are_fifo() {
        let (coordinator, controller) = setup();
        coordinator.poll_once().await.unwrap();
        controller.clear_calls();
        controller.set_delay(Duration::from_millis(5));

        let mut tasks = Vec::new();
        for system_id in 1..=4u8 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator.set_system_activation(system_id, true).await
            }));
            tokio::task::yield_now().await;
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let addresses: Vec<u16> = controller
            .writes()
            .iter()
            .filter_map(|call| match call {
                SimCall::Write { address, .. } => Some(*address),
                SimCall::Read { .. } => None,
            })
            .collect();
        assert_eq!(addresses, vec![100, 101, 102, 103]);
        assert!(coordinator.snapshot().systems().iter().take(4).all(|s| s.active == Some(true)));
    }

    #[tokio::test]
    async fn test_zone_modes() {
        let (coordinator, controller) = setup();
        coordinator.poll_once().await.unwrap();
        controller.clear_calls();

        assert_ok!(coordinator.set_zone_mode(32, ZoneMode::Off).await);
        assert_eq!(coordinator.set_effective_zone_mode(0, ZoneMode::Manual).await, Ok(0));

        coordinator.set_season(Season::Summer).await.unwrap();
        assert_eq!(coordinator.set_effective_zone_mode(0, ZoneMode::Programmed).await, Ok(32));
        assert_eq!(coordinator.set_effective_zone_mode(1, ZoneMode::Off).await, Ok(1));

        let zone = coordinator.snapshot().zone(0).unwrap();
        assert_eq!(zone.mode, Some(ZoneMode::Manual));
        assert_eq!(zone.effective_mode, Some(ZoneMode::Programmed));

        let mode_writes: Vec<SimCall> = controller
            .writes()
            .into_iter()
            .filter(|call| !matches!(call, SimCall::Write { kind: DataKind::Coil, .. }))
            .collect();
        assert_eq!(
            mode_writes,
            vec![
                write(DataKind::HoldingRegister, 5301 + 32, 0),
                write(DataKind::HoldingRegister, 5301, 1),
                write(DataKind::HoldingRegister, 5301 + 32, 2),
                write(DataKind::HoldingRegister, 5301 + 1, 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_dehumidification_and_systems() {
        let (coordinator, controller) = setup();
        coordinator.poll_once().await.unwrap();

        assert_ok!(coordinator.set_dehumidification_setpoint(0, 55).await);
        assert_ok!(coordinator.set_system_activation(1, false).await);

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.zone(0).unwrap().dehumidification_setpoint, Some(55));
        assert_eq!(snapshot.system(1).unwrap().active, Some(false));
        assert_eq!(controller.bank().register(428), 55);
        assert!(!controller.bank().coil(100));
    }

    #[tokio::test]
    async fn test_set_time() {
        let (coordinator, controller) = setup();
        coordinator.poll_once().await.unwrap();
        controller.clear_calls();

        let invalid = TimeUpdate {
            day: Some(17),
            month: Some(13),
            ..TimeUpdate::default()
        };
        assert!(matches!(
            coordinator.set_time(invalid).await,
            Err(RdzError::Validation { .. })
        ));
        assert_err!(coordinator.set_time(TimeUpdate::default()).await);
        assert!(controller.calls().is_empty());

        let update = TimeUpdate {
            hour: Some(23),
            minute: Some(5),
            ..TimeUpdate::default()
        };
        assert_ok!(coordinator.set_time(update).await);
        assert_eq!(
            controller.writes(),
            vec![
                write(DataKind::HoldingRegister, 5012, 23),
                write(DataKind::HoldingRegister, 5013, 5),
            ]
        );
        let time = coordinator.snapshot().time().unwrap();
        assert_eq!(time.day, 17);
        for (field, value) in update.fields() {
            assert_eq!(time.get(field), value);
        }
    }

    #[test]
    fn test_time_update_from_datetime() {
        let moment = chrono::Utc.with_ymd_and_hms(2026, 3, 9, 7, 45, 0).unwrap();
        let update = TimeUpdate::from_datetime(&moment);
        assert_eq!(
            update.fields(),
            vec![
                (TimeField::Day, 9),
                (TimeField::Month, 3),
                (TimeField::Year, 2026),
                (TimeField::Hour, 7),
                (TimeField::Minute, 45),
            ]
        );
        assert!(TimeUpdate::default().is_empty());
    }

    #[tokio::test]
    async fn test_discover_and_probe() {
        let (coordinator, controller) = setup();
        assert_eq!(coordinator.discover_zones().await.unwrap(), vec![0, 1, 2, 3]);
        assert_ok!(coordinator.probe().await);

        controller.fail_reads_at(ZONE_TEMPERATURE_BASE);
        assert!(matches!(
            coordinator.probe().await,
            Err(RdzError::Transport(TransportError::Timeout { .. }))
        ));
        assert_eq!(coordinator.transport_stats().await.timeouts, 1);
    }

    #[tokio::test]
    async fn test_reconfigure() {
        let (coordinator, _controller) = setup();
        coordinator.poll_once().await.unwrap();

        coordinator.reconfigure(ZoneRegistry::new(vec![ZoneConfig::real(32)]).unwrap());
        assert_ok!(coordinator.set_target_temperature(32, 19.0).await);
        assert_err!(coordinator.set_target_temperature(0, 19.0).await);

        // Old snapshot keeps the registry it was polled with
        assert_eq!(coordinator.snapshot().registry().linked_virtual_of(0), Some(32));
        let snapshot = coordinator.poll_once().await.unwrap();
        assert_eq!(snapshot.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (coordinator, controller) = setup();
        coordinator.poll_once().await.unwrap();
        assert_ok!(coordinator.shutdown().await);
        assert_ok!(coordinator.shutdown().await);

        assert!(!controller.is_connected());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.poll_once().await.unwrap_err(), RdzError::ShutDown);
        assert_eq!(coordinator.set_season(Season::Summer).await, Err(RdzError::ShutDown));
        assert_eq!(coordinator.snapshot().version(), 1);
    }

    #[tokio::test]
    async fn test_poll_task() {
        let (coordinator, _controller) = setup_with(CoordinatorSettings {
            poll_interval: Duration::from_millis(20),
            ..CoordinatorSettings::default()
        });
        let mut updates = coordinator.subscribe();
        let poller = coordinator.spawn();

        for expected in 1..=2 {
            let snapshot = tokio::time::timeout(Duration::from_secs(2), updates.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(snapshot.version(), expected);
        }

        assert_ok!(poller.shutdown().await);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.poll_once().await.unwrap_err(), RdzError::ShutDown);
    }

    #[tokio::test]
    async fn test_zero_poll_interval_is_clamped() {
        let (coordinator, _controller) = setup_with(CoordinatorSettings {
            poll_interval: Duration::ZERO,
            ..CoordinatorSettings::default()
        });
        assert_eq!(coordinator.settings().poll_interval, MIN_POLL_INTERVAL);

        let poller = coordinator.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(coordinator.snapshot().version() >= 1);
        assert!(!poller.is_finished());
        assert_ok!(poller.shutdown().await);
    }
}
