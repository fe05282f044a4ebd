/// Modbus protocol definitions and data structures
///
/// This module contains the subset of the Modbus application protocol the RDZ
/// controller speaks: coil and holding-register reads, single coil and single
/// register writes, and the exception responses it can return.

use serde::{Deserialize, Serialize};
use std::fmt;
use crate::error::{TransportError, TransportResult};
use crate::{MAX_COILS_PER_REQUEST, MAX_REGISTERS_PER_REQUEST};

/// Modbus address type (0-65535)
pub type ModbusAddress = u16;

/// Modbus unit identifier (1-247)
pub type UnitId = u8;

/// Modbus function codes used by the RDZ register layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModbusFunction {
    /// Read Coils (0x01)
    ReadCoils = 0x01,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Write Single Coil (0x05)
    WriteSingleCoil = 0x05,
    /// Write Single Register (0x06)
    WriteSingleRegister = 0x06,
}

impl ModbusFunction {
    /// Convert from u8 to ModbusFunction
    pub fn from_u8(value: u8) -> TransportResult<Self> {
        match value {
            0x01 => Ok(ModbusFunction::ReadCoils),
            0x03 => Ok(ModbusFunction::ReadHoldingRegisters),
            0x05 => Ok(ModbusFunction::WriteSingleCoil),
            0x06 => Ok(ModbusFunction::WriteSingleRegister),
            _ => Err(TransportError::protocol(format!(
                "Unsupported function code: 0x{:02X}",
                value
            ))),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is a read function
    pub fn is_read_function(self) -> bool {
        matches!(self, Self::ReadCoils | Self::ReadHoldingRegisters)
    }

    /// Human readable name, used by the traffic logger
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadCoils => "Read Coils",
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::WriteSingleCoil => "Write Single Coil",
            Self::WriteSingleRegister => "Write Single Register",
        }
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.to_u8())
    }
}

/// Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModbusException {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
    Acknowledge = 0x05,
    SlaveDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl ModbusException {
    /// Convert from u8 to ModbusException
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::SlaveDeviceFailure),
            0x05 => Some(Self::Acknowledge),
            0x06 => Some(Self::SlaveDeviceBusy),
            0x08 => Some(Self::MemoryParityError),
            0x0A => Some(Self::GatewayPathUnavailable),
            0x0B => Some(Self::GatewayTargetDeviceFailedToRespond),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get exception description
    pub fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::SlaveDeviceFailure => "Slave Device Failure",
            Self::Acknowledge => "Acknowledge",
            Self::SlaveDeviceBusy => "Slave Device Busy",
            Self::MemoryParityError => "Memory Parity Error",
            Self::GatewayPathUnavailable => "Gateway Path Unavailable",
            Self::GatewayTargetDeviceFailedToRespond => "Gateway Target Device Failed to Respond",
        }
    }
}

/// Modbus request (PDU plus unit id)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    pub unit_id: UnitId,
    pub function: ModbusFunction,
    pub address: ModbusAddress,
    /// Number of coils/registers for reads, always 1 for single writes
    pub quantity: u16,
    /// Value field for single writes, empty for reads
    pub value: Option<u16>,
}

impl ModbusRequest {
    /// Read `quantity` coils starting at `address` (0x01)
    pub fn read_coils(unit_id: UnitId, address: ModbusAddress, quantity: u16) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::ReadCoils,
            address,
            quantity,
            value: None,
        }
    }

    /// Read `quantity` holding registers starting at `address` (0x03)
    pub fn read_holding_registers(unit_id: UnitId, address: ModbusAddress, quantity: u16) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::ReadHoldingRegisters,
            address,
            quantity,
            value: None,
        }
    }

    /// Write a single coil (0x05); encoded on the wire as 0xFF00 / 0x0000
    pub fn write_single_coil(unit_id: UnitId, address: ModbusAddress, on: bool) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::WriteSingleCoil,
            address,
            quantity: 1,
            value: Some(if on { 0xFF00 } else { 0x0000 }),
        }
    }

    /// Write a single holding register (0x06)
    pub fn write_single_register(unit_id: UnitId, address: ModbusAddress, value: u16) -> Self {
        Self {
            unit_id,
            function: ModbusFunction::WriteSingleRegister,
            address,
            quantity: 1,
            value: Some(value),
        }
    }

    /// Validate the request against protocol limits
    pub fn validate(&self) -> TransportResult<()> {
        if self.unit_id == 0 || self.unit_id > 247 {
            return Err(TransportError::protocol(format!(
                "Invalid unit id: {} (must be 1-247)",
                self.unit_id
            )));
        }

        let max = match self.function {
            ModbusFunction::ReadCoils => MAX_COILS_PER_REQUEST,
            ModbusFunction::ReadHoldingRegisters => MAX_REGISTERS_PER_REQUEST,
            ModbusFunction::WriteSingleCoil | ModbusFunction::WriteSingleRegister => 1,
        };
        if self.quantity == 0 || self.quantity > max {
            return Err(TransportError::protocol(format!(
                "Invalid quantity {} for {} (must be 1-{})",
                self.quantity, self.function, max
            )));
        }
        if self.address as u32 + self.quantity as u32 > 0x1_0000 {
            return Err(TransportError::protocol(format!(
                "Address range overflow: start={}, count={}",
                self.address, self.quantity
            )));
        }
        if !self.function.is_read_function() && self.value.is_none() {
            return Err(TransportError::protocol("Write request without a value"));
        }
        Ok(())
    }

    /// Encode the PDU (function code + fields), without unit id or MBAP header
    pub fn encode_pdu(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(5);
        pdu.push(self.function.to_u8());
        pdu.extend_from_slice(&self.address.to_be_bytes());
        match self.value {
            Some(value) if !self.function.is_read_function() => {
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            _ => pdu.extend_from_slice(&self.quantity.to_be_bytes()),
        }
        pdu
    }
}

/// Modbus response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusResponse {
    pub unit_id: UnitId,
    pub function: ModbusFunction,
    /// PDU bytes following the function code
    pub data: Vec<u8>,
    pub exception: Option<u8>,
}

impl ModbusResponse {
    /// Create a successful response
    pub fn new_success(unit_id: UnitId, function: ModbusFunction, data: Vec<u8>) -> Self {
        Self {
            unit_id,
            function,
            data,
            exception: None,
        }
    }

    /// Create an exception response
    pub fn new_exception(unit_id: UnitId, function: ModbusFunction, exception_code: u8) -> Self {
        Self {
            unit_id,
            function,
            data: vec![],
            exception: Some(exception_code),
        }
    }

    /// Check if this is an exception response
    pub fn is_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// Get exception as error
    pub fn get_exception(&self) -> Option<TransportError> {
        self.exception
            .map(|code| TransportError::exception(self.function.to_u8(), code))
    }

    /// Parse register values from a read holding registers response
    pub fn parse_registers(&self) -> TransportResult<Vec<u16>> {
        let byte_count = *self
            .data
            .first()
            .ok_or_else(|| TransportError::protocol("Empty register response"))?
            as usize;
        if byte_count % 2 != 0 || self.data.len() < 1 + byte_count {
            return Err(TransportError::protocol(format!(
                "Invalid register response: byte count {} with {} data bytes",
                byte_count,
                self.data.len().saturating_sub(1)
            )));
        }

        Ok(self.data[1..1 + byte_count]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Parse coil values from a read coils response (LSB first)
    pub fn parse_bits(&self, quantity: u16) -> TransportResult<Vec<bool>> {
        let byte_count = *self
            .data
            .first()
            .ok_or_else(|| TransportError::protocol("Empty coil response"))?
            as usize;
        let needed = (quantity as usize + 7) / 8;
        if byte_count < needed || self.data.len() < 1 + byte_count {
            return Err(TransportError::protocol(format!(
                "Invalid coil response: {} bytes for {} coils",
                byte_count, quantity
            )));
        }

        Ok((0..quantity as usize)
            .map(|i| self.data[1 + i / 8] & (1 << (i % 8)) != 0)
            .collect())
    }

    /// Parse the echoed address and value of a single write response
    pub fn parse_write_echo(&self) -> TransportResult<(ModbusAddress, u16)> {
        if self.data.len() < 4 {
            return Err(TransportError::protocol(format!(
                "Write response too short: {} bytes",
                self.data.len()
            )));
        }
        Ok((
            u16::from_be_bytes([self.data[0], self.data[1]]),
            u16::from_be_bytes([self.data[2], self.data[3]]),
        ))
    }
}
