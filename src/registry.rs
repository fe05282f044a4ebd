/// Zone registry
///
/// User-supplied, validated, immutable description of the 64 zone slots:
/// which are real thermostats, which are virtual cooling carriers, and which
/// real zone mirrors its summer setpoint into which virtual zone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::codec::{ZoneId, ZONE_COUNT};
use crate::error::{RdzError, RdzResult};

/// Zone slot type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    /// Backed by a physical sensor and dial
    Real,
    /// Carries a mirrored cooling setpoint for a real zone
    Virtual,
    Unconfigured,
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneType::Real => write!(f, "real"),
            ZoneType::Virtual => write!(f, "virtual"),
            ZoneType::Unconfigured => write!(f, "unconfigured"),
        }
    }
}

/// One configured zone slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    #[serde(rename = "id")]
    pub zone_id: ZoneId,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    /// Display name chosen by the user; opaque to the coordinator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Virtual zone carrying this real zone's cooling setpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_zone_id: Option<ZoneId>,
}

impl ZoneConfig {
    pub fn real(zone_id: ZoneId) -> Self {
        Self {
            zone_id,
            zone_type: ZoneType::Real,
            name: None,
            linked_zone_id: None,
        }
    }

    pub fn virtual_zone(zone_id: ZoneId) -> Self {
        Self {
            zone_type: ZoneType::Virtual,
            ..Self::real(zone_id)
        }
    }

    pub fn unconfigured(zone_id: ZoneId) -> Self {
        Self {
            zone_type: ZoneType::Unconfigured,
            ..Self::real(zone_id)
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn linked_to(mut self, virtual_zone_id: ZoneId) -> Self {
        self.linked_zone_id = Some(virtual_zone_id);
        self
    }
}

/// Validated zone registry
///
/// Replaced as a whole on reconfiguration; never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneRegistry {
    zones: BTreeMap<ZoneId, ZoneConfig>,
}

impl ZoneRegistry {
    /// Registry with no configured zones
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build and validate a registry
    ///
    /// Fails when:
    /// - a zone id is outside 0-63 or appears twice
    /// - a virtual or unconfigured zone carries a link
    /// - a link points at itself, at a missing zone, or at a non-virtual zone
    /// - two real zones link to the same virtual zone
    pub fn new(zones: Vec<ZoneConfig>) -> RdzResult<Self> {
        let mut by_id = BTreeMap::new();
        for zone in zones {
            if zone.zone_id >= ZONE_COUNT {
                return Err(RdzError::configuration(format!(
                    "Zone id {} out of range 0-{}",
                    zone.zone_id,
                    ZONE_COUNT - 1
                )));
            }
            let zone_id = zone.zone_id;
            if by_id.insert(zone_id, zone).is_some() {
                return Err(RdzError::configuration(format!(
                    "Zone {} configured more than once",
                    zone_id
                )));
            }
        }

        let mut link_targets: BTreeMap<ZoneId, ZoneId> = BTreeMap::new();
        for zone in by_id.values() {
            let Some(target) = zone.linked_zone_id else {
                continue;
            };
            if zone.zone_type != ZoneType::Real {
                return Err(RdzError::configuration(format!(
                    "Zone {} is {} and cannot be linked",
                    zone.zone_id, zone.zone_type
                )));
            }
            if target == zone.zone_id {
                return Err(RdzError::configuration(format!(
                    "Zone {} is linked to itself",
                    zone.zone_id
                )));
            }
            match by_id.get(&target).map(|t| t.zone_type) {
                Some(ZoneType::Virtual) => {}
                Some(other) => {
                    return Err(RdzError::configuration(format!(
                        "Zone {} links to zone {} which is {}, not virtual",
                        zone.zone_id, target, other
                    )));
                }
                None => {
                    return Err(RdzError::configuration(format!(
                        "Zone {} links to unknown zone {}",
                        zone.zone_id, target
                    )));
                }
            }
            if let Some(first) = link_targets.insert(target, zone.zone_id) {
                return Err(RdzError::configuration(format!(
                    "Virtual zone {} is linked from both zone {} and zone {}",
                    target, first, zone.zone_id
                )));
            }
        }

        Ok(Self { zones: by_id })
    }

    /// Configuration of a zone whose type is not `unconfigured`
    pub fn zone_config(&self, zone_id: ZoneId) -> RdzResult<&ZoneConfig> {
        match self.zones.get(&zone_id) {
            Some(zone) if zone.zone_type != ZoneType::Unconfigured => Ok(zone),
            _ => Err(RdzError::invalid_zone(zone_id, "zone is not configured")),
        }
    }

    /// Type of a zone slot; missing slots are `unconfigured`
    pub fn zone_type(&self, zone_id: ZoneId) -> ZoneType {
        self.zones
            .get(&zone_id)
            .map(|zone| zone.zone_type)
            .unwrap_or(ZoneType::Unconfigured)
    }

    /// Virtual zone linked from a real zone
    pub fn linked_virtual_of(&self, real_zone_id: ZoneId) -> Option<ZoneId> {
        self.zones
            .get(&real_zone_id)
            .filter(|zone| zone.zone_type == ZoneType::Real)
            .and_then(|zone| zone.linked_zone_id)
    }

    /// All `(real, virtual)` link pairs, ordered by real zone id
    pub fn links(&self) -> impl Iterator<Item = (ZoneId, ZoneId)> + '_ {
        self.zones
            .keys()
            .filter_map(move |&zone_id| self.linked_virtual_of(zone_id).map(|v| (zone_id, v)))
    }

    /// All listed zones, including explicitly unconfigured ones
    pub fn iter(&self) -> impl Iterator<Item = &ZoneConfig> {
        self.zones.values()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
