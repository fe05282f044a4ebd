/// Callback logging of Modbus traffic
///
/// Lets an embedding application receive one line per request and response,
/// annotated with the RDZ meaning of the address, e.g.
/// `Write Single Register @ 305 [winter setpoint zone 5] = 215`.

use std::sync::Arc;

use crate::codec::{self, DataKind};
use crate::error::TransportError;
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse};

/// Log levels for the callback logging system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Convert log level to string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Logging mode for packet display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// PDU bytes only
    Raw,
    /// Function, address and RDZ meaning
    Interpreted,
    /// Interpreted line followed by the PDU bytes
    Both,
}

/// Type alias for log callback functions
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Logger that forwards traffic lines to a callback
#[derive(Clone)]
pub struct CallbackLogger {
    callback: Option<Arc<LogCallback>>,
    min_level: LogLevel,
    mode: LoggingMode,
}

impl CallbackLogger {
    /// Create a new callback logger
    pub fn new(callback: Option<LogCallback>, min_level: LogLevel) -> Self {
        Self::with_mode(callback, min_level, LoggingMode::Interpreted)
    }

    /// Create a new callback logger with specific mode
    pub fn with_mode(callback: Option<LogCallback>, min_level: LogLevel, mode: LoggingMode) -> Self {
        Self {
            callback: callback.map(Arc::new),
            min_level,
            mode,
        }
    }

    /// Logger writing timestamped lines to stdout/stderr
    pub fn console(min_level: LogLevel) -> Self {
        let callback: LogCallback = Box::new(|level, message| {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
            match level {
                LogLevel::Error | LogLevel::Warn => {
                    eprintln!("[{}] {}: {}", timestamp, level.as_str(), message)
                }
                LogLevel::Info | LogLevel::Debug => {
                    println!("[{}] {}: {}", timestamp, level.as_str(), message)
                }
            }
        });
        Self::new(Some(callback), min_level)
    }

    /// Logger that outputs nothing
    pub fn disabled() -> Self {
        Self::new(None, LogLevel::Error)
    }

    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    /// Log a message at the specified level
    pub fn log(&self, level: LogLevel, message: &str) {
        if self.should_log(level) {
            if let Some(ref callback) = self.callback {
                callback(level, message);
            }
        }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        self.callback.is_some() && level as u8 <= self.min_level as u8
    }

    fn format(&self, interpreted: String, pdu: &[u8]) -> String {
        match self.mode {
            LoggingMode::Interpreted => interpreted,
            LoggingMode::Raw => format!("PDU {}", hex::encode_upper(pdu)),
            LoggingMode::Both => format!("{} | PDU {}", interpreted, hex::encode_upper(pdu)),
        }
    }

    /// Log an outgoing request
    pub fn log_request(&self, request: &ModbusRequest) {
        if !self.should_log(LogLevel::Debug) {
            return;
        }
        let mut line = format!(
            "-> unit {} {} @ {}",
            request.unit_id,
            request.function.name(),
            request.address
        );
        if let Some(meaning) = describe(request.function, request.address) {
            line.push_str(&format!(" [{}]", meaning));
        }
        match request.value {
            Some(value) if request.function == ModbusFunction::WriteSingleCoil => {
                line.push_str(if value != 0 { " = ON" } else { " = OFF" })
            }
            Some(value) => line.push_str(&format!(" = {}", value)),
            None => line.push_str(&format!(" x{}", request.quantity)),
        }
        self.log(LogLevel::Debug, &self.format(line, &request.encode_pdu()));
    }

    /// Log a response to `request`
    pub fn log_response(&self, request: &ModbusRequest, response: &ModbusResponse) {
        if !self.should_log(LogLevel::Debug) {
            return;
        }
        let detail = match response.function {
            ModbusFunction::ReadHoldingRegisters => response
                .parse_registers()
                .map(|values| format!("{:?}", values))
                .unwrap_or_else(|e| e.to_string()),
            ModbusFunction::ReadCoils => response
                .parse_bits(request.quantity)
                .map(|bits| {
                    bits.iter()
                        .map(|&b| if b { '1' } else { '0' })
                        .collect::<String>()
                })
                .unwrap_or_else(|e| e.to_string()),
            ModbusFunction::WriteSingleCoil | ModbusFunction::WriteSingleRegister => "ok".to_string(),
        };
        let line = format!(
            "<- unit {} {} @ {}: {}",
            response.unit_id,
            response.function.name(),
            request.address,
            detail
        );
        let mut pdu = vec![response.function.to_u8()];
        pdu.extend_from_slice(&response.data);
        self.log(LogLevel::Debug, &self.format(line, &pdu));
    }

    /// Log a failed request
    pub fn log_failure(&self, request: &ModbusRequest, error: &TransportError) {
        self.log(
            LogLevel::Warn,
            &format!(
                "!! unit {} {} @ {} failed: {}",
                request.unit_id,
                request.function.name(),
                request.address,
                error
            ),
        );
    }
}

fn describe(function: ModbusFunction, address: u16) -> Option<String> {
    let kind = match function {
        ModbusFunction::ReadCoils | ModbusFunction::WriteSingleCoil => DataKind::Coil,
        ModbusFunction::ReadHoldingRegisters | ModbusFunction::WriteSingleRegister => {
            DataKind::HoldingRegister
        }
    };
    codec::describe_address(kind, address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capture(mode: LoggingMode, min_level: LogLevel) -> (CallbackLogger, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let callback: LogCallback = Box::new(move |_, message| {
            sink.lock().unwrap().push(message.to_string());
        });
        (CallbackLogger::with_mode(Some(callback), min_level, mode), lines)
    }

    #[test]
    fn test_interpreted_lines() {
        let (logger, lines) = capture(LoggingMode::Interpreted, LogLevel::Debug);
        let request = ModbusRequest::write_single_register(1, 305, 215);
        logger.log_request(&request);
        let response =
            ModbusResponse::new_success(1, ModbusFunction::WriteSingleRegister, vec![0x01, 0x31, 0x00, 0xD7]);
        logger.log_response(&request, &response);

        let coil = ModbusRequest::write_single_coil(1, 2, true);
        logger.log_request(&coil);

        let lines = lines.lock().unwrap();
        assert_eq!(
            lines[0],
            "-> unit 1 Write Single Register @ 305 [winter setpoint zone 5] = 215"
        );
        assert_eq!(lines[1], "<- unit 1 Write Single Register @ 305: ok");
        assert_eq!(lines[2], "-> unit 1 Write Single Coil @ 2 [season] = ON");
    }

    #[test]
    fn test_raw_mode() {
        let (logger, lines) = capture(LoggingMode::Raw, LogLevel::Debug);
        logger.log_request(&ModbusRequest::read_holding_registers(1, 2600, 1));
        assert_eq!(lines.lock().unwrap()[0], "PDU 030A280001");
    }

    #[test]
    fn test_level_filter() {
        let (logger, lines) = capture(LoggingMode::Interpreted, LogLevel::Warn);
        let request = ModbusRequest::read_coils(1, 100, 8);
        logger.log_request(&request);
        logger.log_failure(&request, &TransportError::timeout("read", 100));
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("!! unit 1 Read Coils @ 100 failed"));
    }

    #[test]
    fn test_disabled_logger() {
        let logger = CallbackLogger::disabled();
        logger.log(LogLevel::Error, "nothing happens");
        assert_eq!(logger.mode(), LoggingMode::Interpreted);
    }
}
