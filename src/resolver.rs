//! # Season & Setpoint Resolver
//!
//! Domain rules that depend on the global season and on real→virtual zone links:
//!
//! - which setpoint register a temperature write targets
//! - HVAC action and HVAC mode derived from activity bits
//! - which zone's mode governs a linked thermostat
//! - which virtual summer setpoints must be rewritten after a poll
//!
//! Everything here is a pure function of its inputs.

use serde::Serialize;

use crate::codec::{self, ReadGroup, Season, ZoneId};
use crate::error::{RdzError, RdzResult};
use crate::registry::{ZoneConfig, ZoneRegistry, ZoneType};
use crate::snapshot::Snapshot;

/// What a zone's HVAC equipment is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacAction {
    Off,
    Idle,
    Heating,
    Cooling,
}

/// Derived, read-only HVAC mode of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
}

/// Setpoint register a temperature write for `zone_id` goes to
pub fn target_register(season: Season, zone_id: ZoneId) -> u16 {
    codec::zone_setpoint_address(season, zone_id)
}

/// Snapshot group holding the setpoint for `season`
pub fn setpoint_group(season: Season) -> ReadGroup {
    match season {
        Season::Winter => ReadGroup::WinterSetpoints,
        Season::Summer => ReadGroup::SummerSetpoints,
    }
}

/// Check that a zone accepts temperature writes
///
/// Only configured real zones do; virtual zones receive their setpoint
/// through synchronization.
pub fn ensure_temperature_writable(registry: &ZoneRegistry, zone_id: ZoneId) -> RdzResult<&ZoneConfig> {
    let zone = registry.zone_config(zone_id)?;
    if zone.zone_type == ZoneType::Virtual {
        return Err(RdzError::invalid_zone(
            zone_id,
            "virtual zones do not accept temperature writes",
        ));
    }
    Ok(zone)
}

/// HVAC action of a zone
///
/// A real zone is heating when its own activity bit is set, cooling when the
/// bit of its linked virtual zone is set, idle otherwise.
pub fn hvac_action(zone_type: ZoneType, own_active: bool, linked_active: Option<bool>) -> HvacAction {
    if zone_type != ZoneType::Real {
        return HvacAction::Off;
    }
    if own_active {
        HvacAction::Heating
    } else if linked_active == Some(true) {
        HvacAction::Cooling
    } else {
        HvacAction::Idle
    }
}

/// HVAC mode of a zone; an unknown season reads as winter
pub fn hvac_mode(zone_type: ZoneType, season: Option<Season>) -> HvacMode {
    match (zone_type, season) {
        (ZoneType::Real, Some(Season::Summer)) => HvacMode::Cool,
        (ZoneType::Real, _) => HvacMode::Heat,
        _ => HvacMode::Off,
    }
}

/// Zone whose mode register governs `zone_id`'s thermostat
///
/// In summer a linked real zone is driven by its virtual zone.
pub fn effective_mode_zone(registry: &ZoneRegistry, season: Option<Season>, zone_id: ZoneId) -> ZoneId {
    match (season, registry.linked_virtual_of(zone_id)) {
        (Some(Season::Summer), Some(virtual_zone_id)) => virtual_zone_id,
        _ => zone_id,
    }
}

/// Request flag of a zone: own bit or linked virtual bit, real zones only
pub fn zone_flag(zone_type: ZoneType, own: bool, linked: Option<bool>) -> bool {
    zone_type == ZoneType::Real && (own || linked == Some(true))
}

/// One summer setpoint write mirroring a real zone into its virtual zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWrite {
    pub real_zone_id: ZoneId,
    pub virtual_zone_id: ZoneId,
    /// Summer setpoint register of the virtual zone
    pub address: u16,
    /// Raw ×10 value read from the real zone
    pub raw: u16,
}

/// Summer setpoint writes needed to bring every linked virtual zone in line
///
/// Winter setpoints are never mirrored. Nothing is planned while the summer
/// setpoint group is stale, so a carried-forward value is never pushed back.
pub fn plan_setpoint_sync(snapshot: &Snapshot) -> Vec<SyncWrite> {
    let group = ReadGroup::SummerSetpoints;
    if snapshot.is_stale(group) {
        return Vec::new();
    }

    snapshot
        .registry()
        .links()
        .filter_map(|(real_zone_id, virtual_zone_id)| {
            let real = snapshot.word(group, real_zone_id as usize)?;
            let mirrored = snapshot.word(group, virtual_zone_id as usize)?;
            (real != mirrored).then(|| SyncWrite {
                real_zone_id,
                virtual_zone_id,
                address: codec::zone_setpoint_address(Season::Summer, virtual_zone_id),
                raw: real,
            })
        })
        .collect()
}
