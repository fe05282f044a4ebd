/// Register-level Modbus client
///
/// This module turns the frame-level transport into the four operations the
/// RDZ layout needs: read coils, read holding registers, write a coil and
/// write a register. `ModbusClient` is also the seam the coordinator is
/// generic over, so tests and offline runs can substitute the simulator.

use std::time::Duration;
use async_trait::async_trait;

use crate::codec::DataKind;
use crate::error::{TransportError, TransportResult};
use crate::logging::CallbackLogger;
use crate::protocol::{ModbusRequest, ModbusResponse, UnitId};
use crate::transport::{ModbusTransport, TcpTransport, TransportStats};

/// Trait defining the register operations used against the controller
///
/// Methods carry their Modbus function code in the name. `read` and `write`
/// dispatch on [`DataKind`] and represent coils as 0/1 words.
#[async_trait]
pub trait ModbusClient: Send + Sync {
    /// Read coils (function code 0x01)
    async fn read_01(&mut self, address: u16, quantity: u16) -> TransportResult<Vec<bool>>;

    /// Read holding registers (function code 0x03)
    async fn read_03(&mut self, address: u16, quantity: u16) -> TransportResult<Vec<u16>>;

    /// Write single coil (function code 0x05)
    async fn write_05(&mut self, address: u16, value: bool) -> TransportResult<()>;

    /// Write single register (function code 0x06)
    async fn write_06(&mut self, address: u16, value: u16) -> TransportResult<()>;

    /// Check if client is connected
    fn is_connected(&self) -> bool;

    /// Close the client connection
    async fn close(&mut self) -> TransportResult<()>;

    /// Get transport statistics
    fn get_stats(&self) -> TransportStats;

    /// Read `count` values of `kind` starting at `address`
    async fn read(&mut self, kind: DataKind, address: u16, count: u16) -> TransportResult<Vec<u16>> {
        match kind {
            DataKind::Coil => Ok(self
                .read_01(address, count)
                .await?
                .into_iter()
                .map(u16::from)
                .collect()),
            DataKind::HoldingRegister => self.read_03(address, count).await,
        }
    }

    /// Write one value of `kind`; any non-zero value switches a coil on
    async fn write(&mut self, kind: DataKind, address: u16, value: u16) -> TransportResult<()> {
        match kind {
            DataKind::Coil => self.write_05(address, value != 0).await,
            DataKind::HoldingRegister => self.write_06(address, value).await,
        }
    }
}

/// Modbus client over any transport
///
/// Implements PDU construction and response checking once; the transport
/// only moves frames.
pub struct GenericModbusClient<T: ModbusTransport> {
    transport: T,
    unit_id: UnitId,
    logger: Option<CallbackLogger>,
}

impl<T: ModbusTransport> GenericModbusClient<T> {
    /// Create a new client talking to `unit_id`
    pub fn new(transport: T, unit_id: UnitId) -> Self {
        Self {
            transport,
            unit_id,
            logger: None,
        }
    }

    /// Create a new client with traffic logging
    pub fn with_logger(transport: T, unit_id: UnitId, logger: CallbackLogger) -> Self {
        Self {
            transport,
            unit_id,
            logger: Some(logger),
        }
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    /// Execute a raw request
    pub async fn execute_request(&mut self, request: ModbusRequest) -> TransportResult<ModbusResponse> {
        request.validate()?;

        if let Some(ref logger) = self.logger {
            logger.log_request(&request);
        }

        let result = self.transport.request(&request).await;

        if let Some(ref logger) = self.logger {
            match &result {
                Ok(response) => logger.log_response(&request, response),
                Err(error) => logger.log_failure(&request, error),
            }
        }

        result
    }

    /// Check that a single-write response echoes what was sent
    fn check_echo(request: &ModbusRequest, response: &ModbusResponse) -> TransportResult<()> {
        let (address, value) = response.parse_write_echo()?;
        let expected = request.value.unwrap_or_default();
        if address != request.address || value != expected {
            return Err(TransportError::protocol(format!(
                "Write echo mismatch: sent {}={}, controller echoed {}={}",
                request.address, expected, address, value
            )));
        }
        Ok(())
    }
}

impl GenericModbusClient<TcpTransport> {
    /// Client for an RDZ controller at `host:port`; connects on first use
    pub fn tcp<S: Into<String>>(host: S, port: u16, unit_id: UnitId, timeout: Duration) -> Self {
        Self::new(TcpTransport::new(host, port, timeout), unit_id)
    }
}

/// Client for an RDZ controller over Modbus TCP
pub type RdzTcpClient = GenericModbusClient<TcpTransport>;

#[async_trait]
impl<T: ModbusTransport + Send + Sync> ModbusClient for GenericModbusClient<T> {
    async fn read_01(&mut self, address: u16, quantity: u16) -> TransportResult<Vec<bool>> {
        let request = ModbusRequest::read_coils(self.unit_id, address, quantity);
        let response = self.execute_request(request).await?;
        response.parse_bits(quantity)
    }

    async fn read_03(&mut self, address: u16, quantity: u16) -> TransportResult<Vec<u16>> {
        let request = ModbusRequest::read_holding_registers(self.unit_id, address, quantity);
        let response = self.execute_request(request).await?;
        let registers = response.parse_registers()?;
        if registers.len() != quantity as usize {
            return Err(TransportError::protocol(format!(
                "Expected {} registers from {}, received {}",
                quantity,
                address,
                registers.len()
            )));
        }
        Ok(registers)
    }

    async fn write_05(&mut self, address: u16, value: bool) -> TransportResult<()> {
        let request = ModbusRequest::write_single_coil(self.unit_id, address, value);
        let response = self.execute_request(request.clone()).await?;
        Self::check_echo(&request, &response)
    }

    async fn write_06(&mut self, address: u16, value: u16) -> TransportResult<()> {
        let request = ModbusRequest::write_single_register(self.unit_id, address, value);
        let response = self.execute_request(request.clone()).await?;
        Self::check_echo(&request, &response)
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.transport.close().await
    }

    fn get_stats(&self) -> TransportStats {
        self.transport.get_stats()
    }
}
