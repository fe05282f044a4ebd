//! # Modbus TCP Transport
//!
//! Owns the single TCP connection to the RDZ controller.
//!
//! - The connection is opened lazily by the first request, never by the constructor.
//! - Requests are strictly sequential: one frame on the wire at a time, no pipelining.
//! - Every socket operation is bounded by the configured timeout.
//! - Any failure other than a Modbus exception response drops the socket; the next
//!   request makes exactly one connect attempt before failing with `ConnectFailed`.
//! - Timed-out requests are never retried here. Retry policy belongs to the caller.
//!
//! ```rust,no_run
//! use rdz_hmi_control::transport::{ModbusTransport, TcpTransport};
//! use rdz_hmi_control::protocol::ModbusRequest;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut transport = TcpTransport::new("192.168.1.50", 8000, Duration::from_secs(5));
//!     assert!(!transport.is_connected());
//!
//!     // Outside temperature register
//!     let request = ModbusRequest::read_holding_registers(1, 2600, 1);
//!     let response = transport.request(&request).await?;
//!     println!("raw outside temperature: {:?}", response.parse_registers()?);
//!
//!     let stats = transport.get_stats();
//!     println!("requests={} timeouts={}", stats.requests_sent, stats.timeouts);
//!
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{TransportError, TransportResult};
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse};
use crate::MAX_TCP_FRAME_SIZE;

/// MBAP header without the unit id: transaction id, protocol id, length
const MBAP_HEADER_SIZE: usize = 6;

/// Format packet data as hex string for logging
fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log packet information
fn log_packet(direction: &str, data: &[u8], unit_id: u8) {
    info!(
        "[TCP] unit {} {} {} bytes: {}",
        unit_id,
        direction,
        data.len(),
        format_hex_packet(data)
    );
}

/// Transport trait for Modbus request/response exchange
///
/// Implementations must never issue a second request while one is outstanding;
/// `&mut self` on `request` enforces this for a single owner.
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    /// Send a request and wait for the matching response
    ///
    /// Exception responses are returned as `TransportError::Protocol`.
    async fn request(&mut self, request: &ModbusRequest) -> TransportResult<ModbusResponse>;

    /// Check if the underlying connection is currently open
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(&mut self) -> TransportResult<()>;

    /// Get transport statistics
    fn get_stats(&self) -> TransportStats;
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Successful connection establishments, including the first one
    pub connections: u64,
}

/// Modbus TCP transport implementation
pub struct TcpTransport {
    stream: Option<TcpStream>,
    host: String,
    port: u16,
    timeout: Duration,
    transaction_id: u16,
    stats: TransportStats,
    /// Enable packet logging for debugging
    packet_logging: bool,
}

impl TcpTransport {
    /// Create a new TCP transport; no connection is opened until the first request
    pub fn new<S: Into<String>>(host: S, port: u16, timeout: Duration) -> Self {
        Self {
            stream: None,
            host: host.into(),
            port,
            timeout,
            transaction_id: 0,
            stats: TransportStats::default(),
            packet_logging: false,
        }
    }

    /// Enable or disable packet logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    /// `host:port` of the controller
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Open the connection if it is not open yet
    ///
    /// Makes exactly one attempt, bounded by the transport timeout.
    pub async fn connect(&mut self) -> TransportResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let address = self.address();
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let stream = match timeout(self.timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.stats.errors += 1;
                return Err(TransportError::connect_failed(address, e.to_string()));
            }
            Err(_) => {
                self.stats.errors += 1;
                self.stats.timeouts += 1;
                return Err(TransportError::connect_failed(
                    address,
                    format!("no answer within {}ms", self.timeout_ms()),
                ));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY on {}: {}", address, e);
        }
        if self.stats.connections > 0 {
            warn!("Reconnected to RDZ controller at {}", address);
        } else {
            info!("Connected to RDZ controller at {}", address);
        }
        self.stats.connections += 1;
        self.stream = Some(stream);
        Ok(())
    }

    /// Get next transaction ID
    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        if self.transaction_id == 0 {
            self.transaction_id = 1;
        }
        self.transaction_id
    }

    /// Encode request to TCP frame, returning the transaction id used
    fn encode_request(&mut self, request: &ModbusRequest) -> (u16, Vec<u8>) {
        let transaction_id = self.next_transaction_id();
        let pdu = request.encode_pdu();

        let mut frame = Vec::with_capacity(MBAP_HEADER_SIZE + 1 + pdu.len());
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&0u16.to_be_bytes()); // protocol id, always 0
        frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes()); // unit id + PDU
        frame.push(request.unit_id);
        frame.extend_from_slice(&pdu);

        (transaction_id, frame)
    }

    /// Decode and correlate a response frame with the request that produced it
    fn decode_response(
        &self,
        frame: &[u8],
        transaction_id: u16,
        request: &ModbusRequest,
    ) -> TransportResult<ModbusResponse> {
        if frame.len() < MBAP_HEADER_SIZE + 2 {
            return Err(TransportError::protocol("Frame too short"));
        }

        let response_tid = u16::from_be_bytes([frame[0], frame[1]]);
        let protocol_id = u16::from_be_bytes([frame[2], frame[3]]);
        let length = u16::from_be_bytes([frame[4], frame[5]]) as usize;
        let unit_id = frame[6];

        if response_tid != transaction_id {
            return Err(TransportError::protocol(format!(
                "Transaction id mismatch: sent {}, received {}",
                transaction_id, response_tid
            )));
        }
        if protocol_id != 0 {
            return Err(TransportError::protocol(format!(
                "Unexpected protocol id {}",
                protocol_id
            )));
        }
        if frame.len() != MBAP_HEADER_SIZE + length {
            return Err(TransportError::protocol("Incomplete frame"));
        }
        if unit_id != request.unit_id {
            return Err(TransportError::protocol(format!(
                "Unit id mismatch: sent {}, received {}",
                request.unit_id, unit_id
            )));
        }

        let function_code = frame[7];
        if function_code & 0x80 != 0 {
            if frame.len() < MBAP_HEADER_SIZE + 3 {
                return Err(TransportError::protocol("Invalid exception response"));
            }
            let original = ModbusFunction::from_u8(function_code & 0x7F)?;
            if original != request.function {
                return Err(TransportError::protocol(format!(
                    "Exception for {} in reply to {}",
                    original, request.function
                )));
            }
            return Ok(ModbusResponse::new_exception(unit_id, original, frame[8]));
        }

        let function = ModbusFunction::from_u8(function_code)?;
        if function != request.function {
            return Err(TransportError::protocol(format!(
                "Function mismatch: sent {}, received {}",
                request.function, function
            )));
        }

        Ok(ModbusResponse::new_success(
            unit_id,
            function,
            frame[MBAP_HEADER_SIZE + 2..].to_vec(),
        ))
    }

    /// Record a failed exchange and drop the socket so the next request reconnects
    fn fail(&mut self, error: TransportError) -> TransportError {
        self.stats.errors += 1;
        if error.is_timeout() {
            self.stats.timeouts += 1;
        }
        if self.stream.take().is_some() {
            debug!("Dropping connection to {} after error: {}", self.address(), error);
        }
        error
    }
}

/// Read exactly `buf.len()` bytes within `limit`
async fn read_exact_timed(
    stream: &mut TcpStream,
    buf: &mut [u8],
    limit: Duration,
    operation: &str,
) -> TransportResult<()> {
    match timeout(limit, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(
            TransportError::connection_lost(format!("connection closed by peer during {}", operation)),
        ),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(TransportError::timeout(operation, limit.as_millis() as u64)),
    }
}

/// Write one request frame and read back one complete response frame
async fn exchange(stream: &mut TcpStream, frame: &[u8], limit: Duration) -> TransportResult<Vec<u8>> {
    match timeout(limit, stream.write_all(frame)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(TransportError::timeout("send request", limit.as_millis() as u64)),
    }

    let mut header = [0u8; MBAP_HEADER_SIZE + 1];
    read_exact_timed(stream, &mut header, limit, "read response header").await?;

    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
    if length < 2 || MBAP_HEADER_SIZE + length > MAX_TCP_FRAME_SIZE {
        return Err(TransportError::protocol(format!(
            "Invalid MBAP length field: {}",
            length
        )));
    }

    let mut response = vec![0u8; MBAP_HEADER_SIZE + length];
    response[..MBAP_HEADER_SIZE + 1].copy_from_slice(&header);
    read_exact_timed(
        stream,
        &mut response[MBAP_HEADER_SIZE + 1..],
        limit,
        "read response data",
    )
    .await?;

    Ok(response)
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn request(&mut self, request: &ModbusRequest) -> TransportResult<ModbusResponse> {
        request.validate()?;
        self.connect().await?;

        let (transaction_id, frame) = self.encode_request(request);
        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;

        if self.packet_logging {
            log_packet("send", &frame, request.unit_id);
        }

        let limit = self.timeout;
        let result = match self.stream.as_mut() {
            Some(stream) => exchange(stream, &frame, limit).await,
            None => Err(TransportError::connection_lost("connection not open")),
        };
        let response_frame = match result {
            Ok(response_frame) => response_frame,
            Err(e) => return Err(self.fail(e)),
        };

        self.stats.responses_received += 1;
        self.stats.bytes_received += response_frame.len() as u64;

        if self.packet_logging {
            log_packet("receive", &response_frame, request.unit_id);
        }

        let response = match self.decode_response(&response_frame, transaction_id, request) {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e)),
        };

        // The stream is still in sync after an exception response
        if let Some(error) = response.get_exception() {
            self.stats.errors += 1;
            return Err(error);
        }

        Ok(response)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> TransportResult<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Closing connection to {}", self.address());
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
