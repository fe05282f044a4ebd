//! # RDZ Register Codec
//!
//! Pure, stateless mapping between RDZ domain concepts and Modbus addresses,
//! plus the raw integer encodings the controller uses.
//!
//! ## Address layout
//!
//! | Group | Kind | Address |
//! |-------|------|---------|
//! | Season (0 winter, 1 summer) | coil | 2 |
//! | System activation, systems 1-8 | coil | 100 + system - 1 |
//! | Winter setpoint | register | 300 + zone |
//! | Summer setpoint | register | 364 + zone |
//! | Dehumidification setpoint (%) | register | 428 + zone |
//! | Outside temperature | register | 2600 |
//! | Delivery water temperature | register | 2650 + system - 1 |
//! | Calculated water temperature | register | 2658 + system - 1 |
//! | Zone temperature | register | 2700 + zone |
//! | Dew point | register | 2828 + zone |
//! | Activity bitmask | register | 2892 + zone / 16, bit zone % 16 |
//! | Request bitmasks (humidity, ventilation, renewal, integration, dehumidification pump) | register | 2896, 2900, 2904, 2908, 2912 |
//! | Day, month, year, hour, minute | register | 5009..=5013 |
//! | Zone mode | register | 5301 + zone |
//! | Pump bitmask, bit j = pump j+1 | register | 7615 |
//! | Humidity | register | 7701 + zone |
//!
//! ## Encodings
//!
//! Temperatures and humidity are signed 16-bit integers scaled by ten.
//! Dehumidification percentages and mode codes are unscaled.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RdzError, RdzResult};

/// Zone identifier (0-63)
pub type ZoneId = u8;

/// HVAC plant identifier (1-8)
pub type SystemId = u8;

/// Number of zone slots in the controller
pub const ZONE_COUNT: u8 = 64;
/// Number of HVAC plant units
pub const SYSTEM_COUNT: u8 = 8;
/// Number of pumps in the pump bitmask
pub const PUMP_COUNT: u8 = 8;

pub const SEASON_COIL: u16 = 2;
pub const SYSTEM_ACTIVATION_COIL_BASE: u16 = 100;
pub const WINTER_SETPOINT_BASE: u16 = 300;
pub const SUMMER_SETPOINT_BASE: u16 = 364;
pub const DEHUMIDIFICATION_SETPOINT_BASE: u16 = 428;
pub const OUTSIDE_TEMPERATURE_REGISTER: u16 = 2600;
pub const DELIVERY_WATER_TEMPERATURE_BASE: u16 = 2650;
pub const CALCULATED_WATER_TEMPERATURE_BASE: u16 = 2658;
pub const ZONE_TEMPERATURE_BASE: u16 = 2700;
pub const DEW_POINT_BASE: u16 = 2828;
pub const ACTIVITY_BITMASK_BASE: u16 = 2892;
pub const HUMIDITY_REQUEST_BASE: u16 = 2896;
pub const VENTILATION_REQUEST_BASE: u16 = 2900;
pub const RENEWAL_REQUEST_BASE: u16 = 2904;
pub const INTEGRATION_REQUEST_BASE: u16 = 2908;
pub const DEHUMIDIFICATION_PUMP_BASE: u16 = 2912;
pub const TIME_REGISTER_BASE: u16 = 5009;
pub const ZONE_MODE_BASE: u16 = 5301;
pub const PUMP_BITMASK_REGISTER: u16 = 7615;
pub const HUMIDITY_BASE: u16 = 7701;

/// Registers per 64-zone bitmask
pub const BITMASK_REGISTERS: u16 = 4;

/// Scale applied to temperatures and humidity on the wire
pub const TEMPERATURE_SCALE: f64 = 10.0;

/// Dehumidification setpoint bounds (%)
pub const MIN_DEHUMIDIFICATION: u16 = 30;
pub const MAX_DEHUMIDIFICATION: u16 = 90;

/// Modbus data kind addressed by the RDZ layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Coil,
    HoldingRegister,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Coil => write!(f, "coil"),
            DataKind::HoldingRegister => write!(f, "holding register"),
        }
    }
}

/// Global season switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Summer,
}

impl Season {
    /// Decode the season coil (0 winter, anything else summer)
    pub fn from_coil(word: u16) -> Self {
        if word == 0 {
            Season::Winter
        } else {
            Season::Summer
        }
    }

    /// Value written to the season coil
    pub fn coil_value(self) -> bool {
        matches!(self, Season::Summer)
    }

    /// Snapshot word for this season (coils are stored as 0/1)
    pub fn to_word(self) -> u16 {
        self.coil_value() as u16
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Season::Winter => write!(f, "winter"),
            Season::Summer => write!(f, "summer"),
        }
    }
}

/// Per-zone operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneMode {
    Off = 0,
    Manual = 1,
    Programmed = 2,
    ProgrammedManual = 3,
}

impl ZoneMode {
    /// Decode a raw mode register
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(ZoneMode::Off),
            1 => Some(ZoneMode::Manual),
            2 => Some(ZoneMode::Programmed),
            3 => Some(ZoneMode::ProgrammedManual),
            _ => None,
        }
    }

    /// Raw register value
    pub fn to_raw(self) -> u16 {
        self as u16
    }
}

/// Fields of the controller clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeField {
    Day,
    Month,
    Year,
    Hour,
    Minute,
}

impl TimeField {
    /// All fields in register order
    pub const ALL: [TimeField; 5] = [
        TimeField::Day,
        TimeField::Month,
        TimeField::Year,
        TimeField::Hour,
        TimeField::Minute,
    ];

    /// Position within the time register block
    pub fn offset(self) -> u16 {
        match self {
            TimeField::Day => 0,
            TimeField::Month => 1,
            TimeField::Year => 2,
            TimeField::Hour => 3,
            TimeField::Minute => 4,
        }
    }

    /// Holding register for this field
    pub fn address(self) -> u16 {
        TIME_REGISTER_BASE + self.offset()
    }

    /// Inclusive valid range
    pub fn range(self) -> (u16, u16) {
        match self {
            TimeField::Day => (1, 31),
            TimeField::Month => (1, 12),
            TimeField::Year => (2000, 2099),
            TimeField::Hour => (0, 23),
            TimeField::Minute => (0, 59),
        }
    }

    /// Validate a value for this field
    pub fn validate(self, value: u16) -> RdzResult<u16> {
        let (min, max) = self.range();
        if value < min || value > max {
            return Err(RdzError::validation(format!(
                "{} {} out of range {}-{}",
                self, value, min, max
            )));
        }
        Ok(value)
    }
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeField::Day => "day",
            TimeField::Month => "month",
            TimeField::Year => "year",
            TimeField::Hour => "hour",
            TimeField::Minute => "minute",
        };
        f.write_str(name)
    }
}

/// Inclusive temperature band accepted by `encode_temperature`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureBand {
    pub min: f64,
    pub max: f64,
}

impl TemperatureBand {
    /// Setpoint band accepted by the controller's thermostats
    pub const SETPOINT: TemperatureBand = TemperatureBand { min: 5.0, max: 35.0 };

    /// Everything a signed ×10 register is used for in practice
    pub const FULL: TemperatureBand = TemperatureBand { min: -50.0, max: 50.0 };

    pub fn contains(&self, celsius: f64) -> bool {
        (self.min..=self.max).contains(&celsius)
    }
}

impl Default for TemperatureBand {
    fn default() -> Self {
        Self::SETPOINT
    }
}

/// A contiguous block of addresses read as one batch during a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadGroup {
    Season,
    Temperatures,
    WinterSetpoints,
    SummerSetpoints,
    DehumidificationSetpoints,
    Humidity,
    DewPoints,
    ZoneModes,
    Activity,
    HumidityRequest,
    VentilationRequest,
    RenewalRequest,
    IntegrationRequest,
    DehumidificationPump,
    OutsideTemperature,
    Time,
    SystemActivation,
    DeliveryWaterTemperatures,
    CalculatedWaterTemperatures,
    PumpActive,
}

impl ReadGroup {
    /// Every group, in poll order
    pub const ALL: [ReadGroup; 20] = [
        ReadGroup::Season,
        ReadGroup::Temperatures,
        ReadGroup::WinterSetpoints,
        ReadGroup::SummerSetpoints,
        ReadGroup::DehumidificationSetpoints,
        ReadGroup::Humidity,
        ReadGroup::DewPoints,
        ReadGroup::ZoneModes,
        ReadGroup::Activity,
        ReadGroup::HumidityRequest,
        ReadGroup::VentilationRequest,
        ReadGroup::RenewalRequest,
        ReadGroup::IntegrationRequest,
        ReadGroup::DehumidificationPump,
        ReadGroup::OutsideTemperature,
        ReadGroup::Time,
        ReadGroup::SystemActivation,
        ReadGroup::DeliveryWaterTemperatures,
        ReadGroup::CalculatedWaterTemperatures,
        ReadGroup::PumpActive,
    ];

    pub fn kind(self) -> DataKind {
        match self {
            ReadGroup::Season | ReadGroup::SystemActivation => DataKind::Coil,
            _ => DataKind::HoldingRegister,
        }
    }

    pub fn start(self) -> u16 {
        match self {
            ReadGroup::Season => SEASON_COIL,
            ReadGroup::Temperatures => ZONE_TEMPERATURE_BASE,
            ReadGroup::WinterSetpoints => WINTER_SETPOINT_BASE,
            ReadGroup::SummerSetpoints => SUMMER_SETPOINT_BASE,
            ReadGroup::DehumidificationSetpoints => DEHUMIDIFICATION_SETPOINT_BASE,
            ReadGroup::Humidity => HUMIDITY_BASE,
            ReadGroup::DewPoints => DEW_POINT_BASE,
            ReadGroup::ZoneModes => ZONE_MODE_BASE,
            ReadGroup::Activity => ACTIVITY_BITMASK_BASE,
            ReadGroup::HumidityRequest => HUMIDITY_REQUEST_BASE,
            ReadGroup::VentilationRequest => VENTILATION_REQUEST_BASE,
            ReadGroup::RenewalRequest => RENEWAL_REQUEST_BASE,
            ReadGroup::IntegrationRequest => INTEGRATION_REQUEST_BASE,
            ReadGroup::DehumidificationPump => DEHUMIDIFICATION_PUMP_BASE,
            ReadGroup::OutsideTemperature => OUTSIDE_TEMPERATURE_REGISTER,
            ReadGroup::Time => TIME_REGISTER_BASE,
            ReadGroup::SystemActivation => SYSTEM_ACTIVATION_COIL_BASE,
            ReadGroup::DeliveryWaterTemperatures => DELIVERY_WATER_TEMPERATURE_BASE,
            ReadGroup::CalculatedWaterTemperatures => CALCULATED_WATER_TEMPERATURE_BASE,
            ReadGroup::PumpActive => PUMP_BITMASK_REGISTER,
        }
    }

    pub fn count(self) -> u16 {
        match self {
            ReadGroup::Season | ReadGroup::OutsideTemperature | ReadGroup::PumpActive => 1,
            ReadGroup::Time => TimeField::ALL.len() as u16,
            ReadGroup::SystemActivation
            | ReadGroup::DeliveryWaterTemperatures
            | ReadGroup::CalculatedWaterTemperatures => SYSTEM_COUNT as u16,
            g if g.is_bitmask() => BITMASK_REGISTERS,
            _ => ZONE_COUNT as u16,
        }
    }

    /// Check if `address` of `kind` falls inside this group
    pub fn contains(self, kind: DataKind, address: u16) -> bool {
        self.kind() == kind && address >= self.start() && address < self.start() + self.count()
    }

    /// One register per zone
    pub fn is_per_zone(self) -> bool {
        matches!(
            self,
            ReadGroup::Temperatures
                | ReadGroup::WinterSetpoints
                | ReadGroup::SummerSetpoints
                | ReadGroup::DehumidificationSetpoints
                | ReadGroup::Humidity
                | ReadGroup::DewPoints
                | ReadGroup::ZoneModes
        )
    }

    /// 64 zone bits packed across four registers
    pub fn is_bitmask(self) -> bool {
        matches!(
            self,
            ReadGroup::Activity
                | ReadGroup::HumidityRequest
                | ReadGroup::VentilationRequest
                | ReadGroup::RenewalRequest
                | ReadGroup::IntegrationRequest
                | ReadGroup::DehumidificationPump
        )
    }

    /// Group carries per-zone data
    pub fn is_zone_group(self) -> bool {
        self.is_per_zone() || self.is_bitmask()
    }

    pub fn label(self) -> &'static str {
        match self {
            ReadGroup::Season => "season",
            ReadGroup::Temperatures => "temperature",
            ReadGroup::WinterSetpoints => "winter setpoint",
            ReadGroup::SummerSetpoints => "summer setpoint",
            ReadGroup::DehumidificationSetpoints => "dehumidification setpoint",
            ReadGroup::Humidity => "humidity",
            ReadGroup::DewPoints => "dew point",
            ReadGroup::ZoneModes => "zone mode",
            ReadGroup::Activity => "activity bitmask",
            ReadGroup::HumidityRequest => "humidity request bitmask",
            ReadGroup::VentilationRequest => "ventilation request bitmask",
            ReadGroup::RenewalRequest => "renewal request bitmask",
            ReadGroup::IntegrationRequest => "integration request bitmask",
            ReadGroup::DehumidificationPump => "dehumidification pump bitmask",
            ReadGroup::OutsideTemperature => "outside temperature",
            ReadGroup::Time => "time",
            ReadGroup::SystemActivation => "system activation",
            ReadGroup::DeliveryWaterTemperatures => "delivery water temperature",
            ReadGroup::CalculatedWaterTemperatures => "calculated water temperature",
            ReadGroup::PumpActive => "pump bitmask",
        }
    }
}

impl fmt::Display for ReadGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Setpoint register for `zone_id` in the given season
pub fn zone_setpoint_address(season: Season, zone_id: ZoneId) -> u16 {
    match season {
        Season::Winter => WINTER_SETPOINT_BASE + zone_id as u16,
        Season::Summer => SUMMER_SETPOINT_BASE + zone_id as u16,
    }
}

pub fn zone_dehumidification_address(zone_id: ZoneId) -> u16 {
    DEHUMIDIFICATION_SETPOINT_BASE + zone_id as u16
}

pub fn zone_temperature_address(zone_id: ZoneId) -> u16 {
    ZONE_TEMPERATURE_BASE + zone_id as u16
}

pub fn zone_dew_point_address(zone_id: ZoneId) -> u16 {
    DEW_POINT_BASE + zone_id as u16
}

pub fn zone_mode_address(zone_id: ZoneId) -> u16 {
    ZONE_MODE_BASE + zone_id as u16
}

pub fn zone_humidity_address(zone_id: ZoneId) -> u16 {
    HUMIDITY_BASE + zone_id as u16
}

/// Activity bitmask register holding `zone_id`'s bit
pub fn zone_activity_register(zone_id: ZoneId) -> u16 {
    ACTIVITY_BITMASK_BASE + zone_id as u16 / 16
}

/// Bit index of `zone_id` within its activity register
pub fn zone_activity_bit(zone_id: ZoneId) -> u8 {
    zone_id % 16
}

/// Offset of a 1-based system id; callers check the id with [`check_system_id`]
fn system_offset(system_id: SystemId) -> u16 {
    (system_id as u16).saturating_sub(1)
}

pub fn system_activation_coil(system_id: SystemId) -> u16 {
    SYSTEM_ACTIVATION_COIL_BASE + system_offset(system_id)
}

pub fn delivery_water_temperature_address(system_id: SystemId) -> u16 {
    DELIVERY_WATER_TEMPERATURE_BASE + system_offset(system_id)
}

pub fn calculated_water_temperature_address(system_id: SystemId) -> u16 {
    CALCULATED_WATER_TEMPERATURE_BASE + system_offset(system_id)
}

/// Decode a signed ×10 temperature (or humidity) register
pub fn decode_temperature(raw: u16) -> f64 {
    (raw as i16) as f64 / TEMPERATURE_SCALE
}

/// Encode °C into a signed ×10 register, rounding to the nearest tenth
///
/// Rejects NaN and anything outside `band`.
pub fn encode_temperature(celsius: f64, band: &TemperatureBand) -> RdzResult<u16> {
    if !band.contains(celsius) {
        return Err(RdzError::validation(format!(
            "Temperature {} °C outside valid band {:.1}..{:.1} °C",
            celsius, band.min, band.max
        )));
    }
    let scaled = (celsius * TEMPERATURE_SCALE).round();
    if scaled < i16::MIN as f64 || scaled > i16::MAX as f64 {
        return Err(RdzError::validation(format!(
            "Temperature {} °C does not fit a register",
            celsius
        )));
    }
    Ok((scaled as i16) as u16)
}

/// Decode a ×10 relative humidity register
pub fn decode_humidity(raw: u16) -> f64 {
    raw as f64 / TEMPERATURE_SCALE
}

/// Validate a dehumidification setpoint (%), which is written unscaled
pub fn encode_dehumidification(percent: u16) -> RdzResult<u16> {
    if !(MIN_DEHUMIDIFICATION..=MAX_DEHUMIDIFICATION).contains(&percent) {
        return Err(RdzError::validation(format!(
            "Dehumidification setpoint {}% outside {}-{}%",
            percent, MIN_DEHUMIDIFICATION, MAX_DEHUMIDIFICATION
        )));
    }
    Ok(percent)
}

/// `(word >> index) & 1`
pub fn decode_bit(word: u16, index: u8) -> bool {
    index < 16 && (word >> index) & 1 == 1
}

/// Set or clear bit `index` of `word`, leaving all other bits unchanged
pub fn encode_bit(word: u16, index: u8, on: bool) -> u16 {
    if index >= 16 {
        return word;
    }
    if on {
        word | (1 << index)
    } else {
        word & !(1 << index)
    }
}

/// Bit `position` of a bitmask spread across consecutive 16-bit registers
pub fn bitmask_bit(words: &[u16], position: usize) -> Option<bool> {
    words
        .get(position / 16)
        .map(|word| decode_bit(*word, (position % 16) as u8))
}

/// Reject zone ids outside 0-63
pub fn check_zone_id(zone_id: ZoneId) -> RdzResult<()> {
    if zone_id >= ZONE_COUNT {
        return Err(RdzError::validation(format!(
            "Zone id {} out of range 0-{}",
            zone_id,
            ZONE_COUNT - 1
        )));
    }
    Ok(())
}

/// Reject system ids outside 1-8
pub fn check_system_id(system_id: SystemId) -> RdzResult<()> {
    if system_id == 0 || system_id > SYSTEM_COUNT {
        return Err(RdzError::validation(format!(
            "System id {} out of range 1-{}",
            system_id, SYSTEM_COUNT
        )));
    }
    Ok(())
}

/// Describe an address in RDZ terms, e.g. `winter setpoint zone 5`
pub fn describe_address(kind: DataKind, address: u16) -> Option<String> {
    let group = ReadGroup::ALL
        .iter()
        .copied()
        .find(|group| group.contains(kind, address))?;
    let index = address - group.start();

    let description = match group {
        g if g.is_per_zone() => format!("{} zone {}", g, index),
        g if g.is_bitmask() => format!("{} zones {}-{}", g, index * 16, index * 16 + 15),
        ReadGroup::SystemActivation
        | ReadGroup::DeliveryWaterTemperatures
        | ReadGroup::CalculatedWaterTemperatures => format!("{} system {}", group, index + 1),
        ReadGroup::Time => format!("time {}", TimeField::ALL[index as usize]),
        g => g.label().to_string(),
    };
    Some(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setpoint_addresses() {
        for zone_id in 0..ZONE_COUNT {
            assert_eq!(zone_setpoint_address(Season::Winter, zone_id), 300 + zone_id as u16);
            assert_eq!(zone_setpoint_address(Season::Summer, zone_id), 364 + zone_id as u16);
        }
    }

    #[test]
    fn test_zone_addresses() {
        assert_eq!(zone_dehumidification_address(5), 433);
        assert_eq!(zone_temperature_address(5), 2705);
        assert_eq!(zone_dew_point_address(63), 2891);
        assert_eq!(zone_mode_address(0), 5301);
        assert_eq!(zone_humidity_address(10), 7711);
        assert_eq!(zone_activity_register(5), 2892);
        assert_eq!(zone_activity_bit(5), 5);
        assert_eq!(zone_activity_register(20), 2893);
        assert_eq!(zone_activity_bit(20), 4);
        assert_eq!(zone_activity_register(63), 2895);
        assert_eq!(zone_activity_bit(63), 15);
    }

    #[test]
    fn test_system_addresses() {
        assert_eq!(system_activation_coil(1), 100);
        assert_eq!(system_activation_coil(8), 107);
        assert_eq!(delivery_water_temperature_address(1), 2650);
        assert_eq!(calculated_water_temperature_address(8), 2665);
        assert_eq!(system_activation_coil(0), 100);
        assert_eq!(delivery_water_temperature_address(0), 2650);
        assert!(check_system_id(0).is_err());
        assert_eq!(TimeField::Day.address(), 5009);
        assert_eq!(TimeField::Minute.address(), 5013);
    }

    #[test]
    fn test_groups_never_collide() {
        for (i, a) in ReadGroup::ALL.iter().enumerate() {
            for b in ReadGroup::ALL.iter().skip(i + 1) {
                if a.kind() != b.kind() {
                    continue;
                }
                let a_end = a.start() + a.count();
                let b_end = b.start() + b.count();
                assert!(
                    a_end <= b.start() || b_end <= a.start(),
                    "{:?} overlaps {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_per_zone_addresses_land_in_their_group() {
        for zone_id in 0..ZONE_COUNT {
            let reg = DataKind::HoldingRegister;
            assert!(ReadGroup::WinterSetpoints.contains(reg, zone_setpoint_address(Season::Winter, zone_id)));
            assert!(ReadGroup::SummerSetpoints.contains(reg, zone_setpoint_address(Season::Summer, zone_id)));
            assert!(ReadGroup::Temperatures.contains(reg, zone_temperature_address(zone_id)));
            assert!(ReadGroup::Activity.contains(reg, zone_activity_register(zone_id)));
            assert!(ReadGroup::ZoneModes.contains(reg, zone_mode_address(zone_id)));
        }
    }

    #[test]
    fn test_temperature_round_trip() {
        for raw in -500i16..=500 {
            let word = raw as u16;
            let celsius = decode_temperature(word);
            assert_eq!(encode_temperature(celsius, &TemperatureBand::FULL).unwrap(), word);
        }
    }

    #[test]
    fn test_temperature_encoding() {
        assert_eq!(decode_temperature(215), 21.5);
        assert_eq!(decode_temperature(0xFF9C), -10.0);
        assert_eq!(encode_temperature(21.54, &TemperatureBand::SETPOINT).unwrap(), 215);
        assert_eq!(encode_temperature(21.56, &TemperatureBand::SETPOINT).unwrap(), 216);
        assert!(encode_temperature(4.9, &TemperatureBand::SETPOINT).is_err());
        assert!(encode_temperature(35.1, &TemperatureBand::SETPOINT).is_err());
        assert!(encode_temperature(f64::NAN, &TemperatureBand::FULL).is_err());
        assert!(matches!(
            encode_temperature(60.0, &TemperatureBand::FULL),
            Err(RdzError::Validation { .. })
        ));
    }

    #[test]
    fn test_bit_encoding() {
        let samples = [0u16, 1, 0x8000, 0xAAAA, 0x5555, 0xFFFF, 0x1234];
        for &word in &samples {
            for index in 0..16u8 {
                let set = encode_bit(word, index, true);
                assert!(decode_bit(set, index));
                assert_eq!(set & !(1 << index), word & !(1 << index));

                let cleared = encode_bit(word, index, false);
                assert!(!decode_bit(cleared, index));
                assert_eq!(cleared | (1 << index), word | (1 << index));
            }
        }
    }

    #[test]
    fn test_bitmask_bit() {
        let words = [0b0010_0000, 0b0001_0000, 0, 0x8000];
        assert_eq!(bitmask_bit(&words, 5), Some(true));
        assert_eq!(bitmask_bit(&words, 20), Some(true));
        assert_eq!(bitmask_bit(&words, 21), Some(false));
        assert_eq!(bitmask_bit(&words, 63), Some(true));
        assert_eq!(bitmask_bit(&words, 64), None);
    }

    #[test]
    fn test_validation() {
        assert!(check_zone_id(63).is_ok());
        assert!(check_zone_id(64).is_err());
        assert!(check_system_id(1).is_ok());
        assert!(check_system_id(0).is_err());
        assert!(check_system_id(9).is_err());
        assert_eq!(encode_dehumidification(55).unwrap(), 55);
        assert!(encode_dehumidification(29).is_err());
        assert!(encode_dehumidification(91).is_err());
        assert!(TimeField::Month.validate(12).is_ok());
        assert!(TimeField::Month.validate(13).is_err());
        assert!(TimeField::Year.validate(1999).is_err());
        assert!(TimeField::Minute.validate(0).is_ok());
    }

    #[test]
    fn test_season_and_mode_codes() {
        assert_eq!(Season::from_coil(0), Season::Winter);
        assert_eq!(Season::from_coil(1), Season::Summer);
        assert!(Season::Summer.coil_value());
        assert_eq!(ZoneMode::from_raw(3), Some(ZoneMode::ProgrammedManual));
        assert_eq!(ZoneMode::from_raw(4), None);
        assert_eq!(ZoneMode::Manual.to_raw(), 1);
    }

    #[test]
    fn test_describe_address() {
        let reg = DataKind::HoldingRegister;
        assert_eq!(describe_address(reg, 305).as_deref(), Some("winter setpoint zone 5"));
        assert_eq!(describe_address(reg, 2893).as_deref(), Some("activity bitmask zones 16-31"));
        assert_eq!(describe_address(reg, 5011).as_deref(), Some("time year"));
        assert_eq!(describe_address(reg, 2651).as_deref(), Some("delivery water temperature system 2"));
        assert_eq!(describe_address(DataKind::Coil, 2).as_deref(), Some("season"));
        assert_eq!(describe_address(DataKind::Coil, 300), None);
    }
}
