//! # Snapshot
//!
//! Immutable, versioned result of one poll cycle.
//!
//! A snapshot stores the raw words of every read group together with the zone
//! registry that was in force when the poll started. Decoded views are computed
//! on access, so a snapshot can never disagree with itself.
//!
//! Groups whose read failed are carried forward from the previous snapshot and
//! reported by [`Snapshot::is_stale`]. A group that has never been read
//! successfully is absent and all of its values read as `None`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::codec::{
    self, ReadGroup, Season, SystemId, TimeField, ZoneId, ZoneMode, PUMP_COUNT, SYSTEM_COUNT,
    ZONE_COUNT,
};
use crate::registry::{ZoneRegistry, ZoneType};
use crate::resolver::{self, HvacAction, HvacMode};

/// Immutable aggregate of one poll cycle
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    taken_at: DateTime<Utc>,
    registry: Arc<ZoneRegistry>,
    groups: BTreeMap<ReadGroup, Vec<u16>>,
    stale: BTreeSet<ReadGroup>,
}

/// Zone request flags from the request bitmasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ZoneRequests {
    pub humidity: bool,
    pub ventilation: bool,
    pub renewal: bool,
    pub integration: bool,
    pub dehumidification_pump: bool,
}

/// Decoded view of one zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneState {
    pub zone_id: ZoneId,
    pub zone_type: ZoneType,
    pub name: Option<String>,
    pub linked_zone_id: Option<ZoneId>,
    /// `None` when the sensor reports 0 (no probe fitted)
    pub current_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub dew_point: Option<f64>,
    pub winter_setpoint: Option<f64>,
    pub summer_setpoint: Option<f64>,
    /// Setpoint for the current season
    pub target_temperature: Option<f64>,
    pub dehumidification_setpoint: Option<u16>,
    pub mode: Option<ZoneMode>,
    /// Mode of the zone that currently governs this thermostat
    pub effective_mode: Option<ZoneMode>,
    pub hvac_mode: HvacMode,
    pub hvac_action: HvacAction,
    pub requests: ZoneRequests,
    /// Zone groups whose values were carried forward from an earlier poll
    pub stale: Vec<ReadGroup>,
}

/// Decoded view of one HVAC plant unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemState {
    pub system_id: SystemId,
    pub active: Option<bool>,
    pub delivery_water_temperature: Option<f64>,
    pub calculated_water_temperature: Option<f64>,
}

/// Controller clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSettings {
    pub day: u16,
    pub month: u16,
    pub year: u16,
    pub hour: u16,
    pub minute: u16,
}

impl TimeSettings {
    pub fn get(&self, field: TimeField) -> u16 {
        match field {
            TimeField::Day => self.day,
            TimeField::Month => self.month,
            TimeField::Year => self.year,
            TimeField::Hour => self.hour,
            TimeField::Minute => self.minute,
        }
    }
}

/// Serializable view of a whole snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotReport {
    pub version: u64,
    pub taken_at: DateTime<Utc>,
    pub season: Option<Season>,
    pub outside_temperature: Option<f64>,
    pub time: Option<TimeSettings>,
    pub pump_bitmask: Option<u16>,
    pub systems: Vec<SystemState>,
    pub zones: Vec<ZoneState>,
    pub stale: Vec<ReadGroup>,
}

impl Snapshot {
    /// Snapshot before the first poll: no data, version 0
    pub fn empty(registry: Arc<ZoneRegistry>) -> Self {
        Self {
            version: 0,
            taken_at: Utc::now(),
            registry,
            groups: BTreeMap::new(),
            stale: BTreeSet::new(),
        }
    }

    /// Build the snapshot of a poll cycle
    ///
    /// Groups missing from `fresh` are carried forward from `previous` and
    /// marked stale.
    pub fn assemble(
        version: u64,
        registry: Arc<ZoneRegistry>,
        mut fresh: BTreeMap<ReadGroup, Vec<u16>>,
        previous: &Snapshot,
    ) -> Self {
        let mut groups = BTreeMap::new();
        let mut stale = BTreeSet::new();

        for group in ReadGroup::ALL {
            match fresh.remove(&group) {
                Some(words) => {
                    groups.insert(group, words);
                }
                None => {
                    stale.insert(group);
                    if let Some(words) = previous.groups.get(&group) {
                        groups.insert(group, words.clone());
                    }
                }
            }
        }

        Self {
            version,
            taken_at: Utc::now(),
            registry,
            groups,
            stale,
        }
    }

    /// Poll cycle number; 0 before the first poll
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Registry in force when this snapshot was polled
    pub fn registry(&self) -> &ZoneRegistry {
        &self.registry
    }

    /// True when the group's last read failed (or it has never been read)
    pub fn is_stale(&self, group: ReadGroup) -> bool {
        self.stale.contains(&group) || !self.groups.contains_key(&group)
    }

    /// True when values exist for the group, fresh or carried forward
    pub fn is_available(&self, group: ReadGroup) -> bool {
        self.groups.contains_key(&group)
    }

    /// Groups that failed in the cycle that produced this snapshot
    pub fn stale_groups(&self) -> Vec<ReadGroup> {
        self.stale.iter().copied().collect()
    }

    /// Raw words of a group
    pub fn words(&self, group: ReadGroup) -> Option<&[u16]> {
        self.groups.get(&group).map(Vec::as_slice)
    }

    /// Raw word `index` of a group
    pub fn word(&self, group: ReadGroup, index: usize) -> Option<u16> {
        self.groups.get(&group).and_then(|words| words.get(index).copied())
    }

    /// Overwrite one raw word in place; returns false when the group holds no data
    ///
    /// A single-word group that was never read is created from the written word.
    pub(crate) fn set_word(&mut self, group: ReadGroup, index: usize, value: u16) -> bool {
        if group.count() == 1 && index == 0 && !self.groups.contains_key(&group) {
            self.groups.insert(group, vec![value]);
            return true;
        }
        match self.groups.get_mut(&group).and_then(|words| words.get_mut(index)) {
            Some(word) => {
                *word = value;
                true
            }
            None => false,
        }
    }

    pub fn season(&self) -> Option<Season> {
        self.word(ReadGroup::Season, 0).map(Season::from_coil)
    }

    pub fn outside_temperature(&self) -> Option<f64> {
        self.word(ReadGroup::OutsideTemperature, 0)
            .map(codec::decode_temperature)
    }

    pub fn pump_bitmask(&self) -> Option<u16> {
        self.word(ReadGroup::PumpActive, 0)
    }

    /// Pump `pump_id` (1-8) running
    pub fn pump_active(&self, pump_id: u8) -> Option<bool> {
        if pump_id == 0 || pump_id > PUMP_COUNT {
            return None;
        }
        self.pump_bitmask()
            .map(|mask| codec::decode_bit(mask, pump_id - 1))
    }

    pub fn time(&self) -> Option<TimeSettings> {
        let words = self.words(ReadGroup::Time)?;
        let field = |f: TimeField| words.get(f.offset() as usize).copied();
        Some(TimeSettings {
            day: field(TimeField::Day)?,
            month: field(TimeField::Month)?,
            year: field(TimeField::Year)?,
            hour: field(TimeField::Hour)?,
            minute: field(TimeField::Minute)?,
        })
    }

    /// State of system `system_id` (1-8)
    pub fn system(&self, system_id: SystemId) -> Option<SystemState> {
        if codec::check_system_id(system_id).is_err() {
            return None;
        }
        let index = system_id as usize - 1;
        Some(SystemState {
            system_id,
            active: self.word(ReadGroup::SystemActivation, index).map(|w| w != 0),
            delivery_water_temperature: self
                .word(ReadGroup::DeliveryWaterTemperatures, index)
                .map(codec::decode_temperature),
            calculated_water_temperature: self
                .word(ReadGroup::CalculatedWaterTemperatures, index)
                .map(codec::decode_temperature),
        })
    }

    pub fn systems(&self) -> Vec<SystemState> {
        (1..=SYSTEM_COUNT).filter_map(|id| self.system(id)).collect()
    }

    fn zone_bit(&self, group: ReadGroup, zone_id: ZoneId) -> Option<bool> {
        self.words(group)
            .and_then(|words| codec::bitmask_bit(words, zone_id as usize))
    }

    /// Activity bit of a zone, regardless of its type
    pub fn zone_active(&self, zone_id: ZoneId) -> Option<bool> {
        self.zone_bit(ReadGroup::Activity, zone_id)
    }

    /// Request flag of a real zone, OR-ed with its linked virtual zone
    fn zone_flag(&self, group: ReadGroup, zone_id: ZoneId) -> bool {
        let linked = self
            .registry
            .linked_virtual_of(zone_id)
            .and_then(|v| self.zone_bit(group, v));
        resolver::zone_flag(
            self.registry.zone_type(zone_id),
            self.zone_bit(group, zone_id).unwrap_or(false),
            linked,
        )
    }

    /// Decoded view of zone `zone_id` (0-63)
    pub fn zone(&self, zone_id: ZoneId) -> Option<ZoneState> {
        if zone_id >= ZONE_COUNT {
            return None;
        }
        let index = zone_id as usize;
        let config = self.registry.iter().find(|zone| zone.zone_id == zone_id);
        let zone_type = self.registry.zone_type(zone_id);
        let linked = self.registry.linked_virtual_of(zone_id);
        let season = self.season();

        let temperature = |group| self.word(group, index).map(codec::decode_temperature);
        let winter_setpoint = temperature(ReadGroup::WinterSetpoints);
        let summer_setpoint = temperature(ReadGroup::SummerSetpoints);
        let target_temperature =
            season.and_then(|season| temperature(resolver::setpoint_group(season)));

        let mode_of = |id: ZoneId| {
            self.word(ReadGroup::ZoneModes, id as usize)
                .and_then(ZoneMode::from_raw)
        };
        let effective_zone = resolver::effective_mode_zone(&self.registry, season, zone_id);

        let hvac_action = resolver::hvac_action(
            zone_type,
            self.zone_active(zone_id).unwrap_or(false),
            linked.and_then(|v| self.zone_active(v)),
        );

        let stale = self
            .stale
            .iter()
            .copied()
            .filter(|group| group.is_zone_group())
            .collect();

        Some(ZoneState {
            zone_id,
            zone_type,
            name: config.and_then(|zone| zone.name.clone()),
            linked_zone_id: linked,
            current_temperature: self
                .word(ReadGroup::Temperatures, index)
                .filter(|&raw| raw != 0)
                .map(codec::decode_temperature),
            humidity: self
                .word(ReadGroup::Humidity, index)
                .map(codec::decode_humidity),
            dew_point: temperature(ReadGroup::DewPoints),
            winter_setpoint,
            summer_setpoint,
            target_temperature,
            dehumidification_setpoint: self.word(ReadGroup::DehumidificationSetpoints, index),
            mode: mode_of(zone_id),
            effective_mode: mode_of(effective_zone),
            hvac_mode: resolver::hvac_mode(zone_type, season),
            hvac_action,
            requests: ZoneRequests {
                humidity: self.zone_flag(ReadGroup::HumidityRequest, zone_id),
                ventilation: self.zone_flag(ReadGroup::VentilationRequest, zone_id),
                renewal: self.zone_flag(ReadGroup::RenewalRequest, zone_id),
                integration: self.zone_flag(ReadGroup::IntegrationRequest, zone_id),
                dehumidification_pump: self.zone_flag(ReadGroup::DehumidificationPump, zone_id),
            },
            stale,
        })
    }

    /// Decoded views of every zone listed in the registry
    pub fn zones(&self) -> Vec<ZoneState> {
        self.registry
            .iter()
            .filter_map(|zone| self.zone(zone.zone_id))
            .collect()
    }

    /// Serializable view for collaborators and the command line
    pub fn report(&self) -> SnapshotReport {
        SnapshotReport {
            version: self.version,
            taken_at: self.taken_at,
            season: self.season(),
            outside_temperature: self.outside_temperature(),
            time: self.time(),
            pump_bitmask: self.pump_bitmask(),
            systems: self.systems(),
            zones: self.zones(),
            stale: self.stale_groups(),
        }
    }
}
