//! Device configuration
//!
//! Typed configuration records for the protocol engine and both device
//! shapes. Every record can be loaded from JSON, and is also reachable through
//! the string-valued property surface a host framework drives (see
//! [`property`]). Byte strings are stored raw and (de)serialized as escaped
//! text.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::protocol::escape::{from_escaped, serde_escaped, serde_escaped_list, to_escaped};
use crate::protocol::{ConfigError, ResponseDetector, DEFAULT_ANSWER_TIMEOUT_MS};

/// Property names understood by [`Device::set_property`](crate::device::Device::set_property)
pub mod property {
    /// Port identifier handed to the port provider
    pub const PORT: &str = "Port";
    /// `ascii` or `binary`
    pub const COMMAND_MODE: &str = "CommandMode";
    /// Detection method token, e.g. `term:\r\n`
    pub const RESPONSE_DETECTION: &str = "ResponseDetection";
    /// Minimum interval in milliseconds
    pub const MIN_INTERVAL_MS: &str = "MinimumIntervalMs";
    /// Answer timeout in milliseconds
    pub const ANSWER_TIMEOUT_MS: &str = "AnswerTimeoutMs";
    /// Initialize command
    pub const INITIALIZE_COMMAND: &str = "InitializeCommand";
    /// Initialize response
    pub const INITIALIZE_RESPONSE: &str = "InitializeResponse";
    /// Shutdown command
    pub const SHUTDOWN_COMMAND: &str = "ShutdownCommand";
    /// Shutdown response
    pub const SHUTDOWN_RESPONSE: &str = "ShutdownResponse";

    /// Open command
    pub const OPEN_COMMAND: &str = "OpenCommand";
    /// Open response
    pub const OPEN_RESPONSE: &str = "OpenResponse";
    /// Close command
    pub const CLOSE_COMMAND: &str = "CloseCommand";
    /// Close response
    pub const CLOSE_RESPONSE: &str = "CloseResponse";
    /// Optional state query (both device shapes)
    pub const QUERY_COMMAND: &str = "QueryCommand";
    /// Shutter query reply meaning open
    pub const QUERY_OPEN_RESPONSE: &str = "QueryOpenResponse";
    /// Shutter query reply meaning closed
    pub const QUERY_CLOSE_RESPONSE: &str = "QueryCloseResponse";

    /// Selector position count; resizes the command tables
    pub const NUMBER_OF_POSITIONS: &str = "NumberOfPositions";

    /// `Position<i>Command`
    pub fn position_command(i: usize) -> String {
        format!("Position{}Command", i)
    }

    /// `Position<i>Response`
    pub fn position_response(i: usize) -> String {
        format!("Position{}Response", i)
    }

    /// `QueryResponse<i>`
    pub fn query_response(i: usize) -> String {
        format!("QueryResponse{}", i)
    }
}

/// How configured byte strings may be authored.
///
/// Bytes are written to the port unchanged in both modes; `Ascii` only
/// restricts configured strings to 7-bit, NUL-free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMode {
    /// 7-bit, NUL-free byte strings only
    #[default]
    Ascii,
    /// Any byte
    Binary,
}

impl CommandMode {
    /// Check that `bytes` may be configured under this mode
    pub fn check(self, name: &str, bytes: &[u8]) -> Result<(), ConfigError> {
        if self == CommandMode::Binary {
            return Ok(());
        }
        match bytes.iter().position(|&b| b == 0 || b > 0x7F) {
            None => Ok(()),
            Some(offset) => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!(
                    "byte 0x{:02X} at offset {} is not allowed in ascii mode",
                    bytes[offset], offset
                ),
            }),
        }
    }

    /// Decode an escaped property value and check it against this mode
    pub fn parse_bytes(self, name: &str, escaped: &str) -> Result<Vec<u8>, ConfigError> {
        let bytes = from_escaped(escaped)?;
        self.check(name, &bytes)?;
        Ok(bytes)
    }
}

impl FromStr for CommandMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascii" => Ok(CommandMode::Ascii),
            "binary" => Ok(CommandMode::Binary),
            other => Err(ConfigError::InvalidValue {
                name: property::COMMAND_MODE.to_string(),
                message: format!("expected 'ascii' or 'binary', got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for CommandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandMode::Ascii => f.write_str("ascii"),
            CommandMode::Binary => f.write_str("binary"),
        }
    }
}

/// A command and the single response expected for it.
///
/// An empty `response` means fire-and-forget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Bytes written to the device
    #[serde(with = "serde_escaped", default)]
    pub command: Vec<u8>,
    /// Exact reply expected; empty skips the read
    #[serde(with = "serde_escaped", default)]
    pub response: Vec<u8>,
}

impl CommandResponse {
    /// Pair `command` with its expected `response`
    pub fn new(command: impl Into<Vec<u8>>, response: impl Into<Vec<u8>>) -> Self {
        Self {
            command: command.into(),
            response: response.into(),
        }
    }

    fn check(
        &self,
        label: &str,
        mode: CommandMode,
        detector: &ResponseDetector,
        command_required: bool,
    ) -> Result<(), ConfigError> {
        if self.command.is_empty() {
            if command_required {
                return Err(ConfigError::Incomplete(format!("{} command is not set", label)));
            }
            if !self.response.is_empty() {
                return Err(ConfigError::Contradictory(format!(
                    "{} response is set without a command",
                    label
                )));
            }
        }
        if !self.response.is_empty() && !detector.reads_response() {
            return Err(ConfigError::Contradictory(format!(
                "{} response can never be detected with method '{}'",
                label, detector
            )));
        }
        mode.check(&format!("{}Command", label), &self.command)?;
        mode.check(&format!("{}Response", label), &self.response)
    }
}

/// A query command and the ordered responses it may produce
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAlternatives {
    /// Query bytes; empty means no query is configured
    #[serde(with = "serde_escaped", default)]
    pub command: Vec<u8>,
    /// Replies the query may produce, matched in order
    #[serde(with = "serde_escaped_list", default)]
    pub responses: Vec<Vec<u8>>,
}

impl CommandAlternatives {
    /// Whether a query has been configured at all
    pub fn is_configured(&self) -> bool {
        !self.command.is_empty()
    }

    fn check(
        &self,
        label: &str,
        mode: CommandMode,
        detector: &ResponseDetector,
    ) -> Result<(), ConfigError> {
        if !self.is_configured() {
            if self.responses.iter().any(|r| !r.is_empty()) {
                return Err(ConfigError::Contradictory(format!(
                    "{} responses are set without a query command",
                    label
                )));
            }
            return Ok(());
        }
        if self.responses.is_empty() {
            return Err(ConfigError::Incomplete(format!("{} has no responses", label)));
        }
        if !detector.reads_response() {
            return Err(ConfigError::Contradictory(format!(
                "{} can never be answered with method '{}'",
                label, detector
            )));
        }
        mode.check(&format!("{}Command", label), &self.command)?;
        for (i, response) in self.responses.iter().enumerate() {
            if response.is_empty() {
                return Err(ConfigError::Contradictory(format!(
                    "{} response {} is empty",
                    label, i
                )));
            }
            if self.responses[..i].contains(response) {
                return Err(ConfigError::Contradictory(format!(
                    "{} response {} duplicates an earlier response (\"{}\")",
                    label,
                    i,
                    to_escaped(response)
                )));
            }
            mode.check(&format!("{}Response{}", label, i), response)?;
        }
        Ok(())
    }
}

/// Settings shared by every device: port, timing, detection and the
/// initialize/shutdown exchanges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Port identifier handed to the port provider
    pub port: String,
    /// Which bytes configured strings may contain
    pub mode: CommandMode,
    /// Detection method token, parsed into a [`ResponseDetector`] at initialization
    pub response_detection: String,
    /// Minimum spacing between consecutive commands
    pub min_interval_ms: u64,
    /// Maximum wait for a response
    pub answer_timeout_ms: u64,
    /// Exchange run at the end of initialization
    pub initialize: CommandResponse,
    /// Exchange run before the port is released
    pub shutdown: CommandResponse,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            mode: CommandMode::Ascii,
            response_detection: ResponseDetector::Ignore.method_name(),
            min_interval_ms: 0,
            answer_timeout_ms: DEFAULT_ANSWER_TIMEOUT_MS,
            initialize: CommandResponse::default(),
            shutdown: CommandResponse::default(),
        }
    }
}

impl EngineConfig {
    /// Minimum spacing between consecutive commands
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Maximum wait for a response
    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }

    /// Build the configured response detector
    pub fn detector(&self) -> Result<ResponseDetector, ConfigError> {
        ResponseDetector::new_by_name(&self.response_detection)
    }

    /// Check the settings are complete and consistent with `detector`
    pub fn validate(&self, detector: &ResponseDetector) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::Incomplete("no port configured".to_string()));
        }
        self.initialize.check("Initialize", self.mode, detector, false)?;
        self.shutdown.check("Shutdown", self.mode, detector, false)
    }

    /// Set a setting from its string form
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            property::PORT => self.port = value.trim().to_string(),
            property::COMMAND_MODE => self.mode = value.parse()?,
            property::RESPONSE_DETECTION => {
                let detector = ResponseDetector::new_by_name(value)?;
                self.response_detection = detector.method_name();
            }
            property::MIN_INTERVAL_MS => self.min_interval_ms = parse_ms(name, value)?,
            property::ANSWER_TIMEOUT_MS => self.answer_timeout_ms = parse_ms(name, value)?,
            property::INITIALIZE_COMMAND => {
                self.initialize.command = self.mode.parse_bytes(name, value)?
            }
            property::INITIALIZE_RESPONSE => {
                self.initialize.response = self.mode.parse_bytes(name, value)?
            }
            property::SHUTDOWN_COMMAND => {
                self.shutdown.command = self.mode.parse_bytes(name, value)?
            }
            property::SHUTDOWN_RESPONSE => {
                self.shutdown.response = self.mode.parse_bytes(name, value)?
            }
            _ => return Err(ConfigError::UnknownProperty(name.to_string())),
        }
        Ok(())
    }

    /// Current value of a setting in string form
    pub fn property(&self, name: &str) -> Option<String> {
        let value = match name {
            property::PORT => self.port.clone(),
            property::COMMAND_MODE => self.mode.to_string(),
            property::RESPONSE_DETECTION => self.response_detection.clone(),
            property::MIN_INTERVAL_MS => self.min_interval_ms.to_string(),
            property::ANSWER_TIMEOUT_MS => self.answer_timeout_ms.to_string(),
            property::INITIALIZE_COMMAND => to_escaped(&self.initialize.command),
            property::INITIALIZE_RESPONSE => to_escaped(&self.initialize.response),
            property::SHUTDOWN_COMMAND => to_escaped(&self.shutdown.command),
            property::SHUTDOWN_RESPONSE => to_escaped(&self.shutdown.response),
            _ => return None,
        };
        Some(value)
    }

    /// Names accepted by [`set_property`](Self::set_property)
    pub fn property_names() -> Vec<String> {
        [
            property::PORT,
            property::COMMAND_MODE,
            property::RESPONSE_DETECTION,
            property::MIN_INTERVAL_MS,
            property::ANSWER_TIMEOUT_MS,
            property::INITIALIZE_COMMAND,
            property::INITIALIZE_RESPONSE,
            property::SHUTDOWN_COMMAND,
            property::SHUTDOWN_RESPONSE,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

fn parse_ms(name: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{}' is not a duration in milliseconds: {}", value.trim(), e),
        })
}

/// Command slots of a shutter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutterCommands {
    /// Sent by `set_open(true)`
    pub open: CommandResponse,
    /// Sent by `set_open(false)`
    pub close: CommandResponse,
    /// Optional state query
    #[serde(with = "serde_escaped")]
    pub query_command: Vec<u8>,
    /// Query reply meaning open
    #[serde(with = "serde_escaped")]
    pub query_open_response: Vec<u8>,
    /// Query reply meaning closed
    #[serde(with = "serde_escaped")]
    pub query_close_response: Vec<u8>,
}

impl ShutterCommands {
    /// Query command with its alternatives ordered `[open, closed]`
    pub fn query(&self) -> CommandAlternatives {
        CommandAlternatives {
            command: self.query_command.clone(),
            responses: vec![
                self.query_open_response.clone(),
                self.query_close_response.clone(),
            ],
        }
    }

    /// Check the open/close pairs and the optional query
    pub fn validate(&self, mode: CommandMode, detector: &ResponseDetector) -> Result<(), ConfigError> {
        self.open.check("Open", mode, detector, true)?;
        self.close.check("Close", mode, detector, true)?;
        self.query().check("Query", mode, detector)
    }

    /// Set a command slot from escaped text, checked against `mode`
    pub fn set_property(
        &mut self,
        mode: CommandMode,
        name: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let slot = match name {
            property::OPEN_COMMAND => &mut self.open.command,
            property::OPEN_RESPONSE => &mut self.open.response,
            property::CLOSE_COMMAND => &mut self.close.command,
            property::CLOSE_RESPONSE => &mut self.close.response,
            property::QUERY_COMMAND => &mut self.query_command,
            property::QUERY_OPEN_RESPONSE => &mut self.query_open_response,
            property::QUERY_CLOSE_RESPONSE => &mut self.query_close_response,
            _ => return Err(ConfigError::UnknownProperty(name.to_string())),
        };
        *slot = mode.parse_bytes(name, value)?;
        Ok(())
    }

    /// A command slot as escaped text
    pub fn property(&self, name: &str) -> Option<String> {
        let slot = match name {
            property::OPEN_COMMAND => &self.open.command,
            property::OPEN_RESPONSE => &self.open.response,
            property::CLOSE_COMMAND => &self.close.command,
            property::CLOSE_RESPONSE => &self.close.response,
            property::QUERY_COMMAND => &self.query_command,
            property::QUERY_OPEN_RESPONSE => &self.query_open_response,
            property::QUERY_CLOSE_RESPONSE => &self.query_close_response,
            _ => return None,
        };
        Some(to_escaped(slot))
    }

    /// Names accepted by [`set_property`](Self::set_property)
    pub fn property_names() -> Vec<String> {
        [
            property::OPEN_COMMAND,
            property::OPEN_RESPONSE,
            property::CLOSE_COMMAND,
            property::CLOSE_RESPONSE,
            property::QUERY_COMMAND,
            property::QUERY_OPEN_RESPONSE,
            property::QUERY_CLOSE_RESPONSE,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

/// Default position count of a new state selector
pub const DEFAULT_NUM_POSITIONS: usize = 2;

/// Largest position count a state selector accepts
pub const MAX_NUM_POSITIONS: usize = 256;

/// Command slots of an N-position state selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorCommands {
    /// One command/response pair per position
    pub positions: Vec<CommandResponse>,
    /// Optional query; `responses[i]` identifies position `i`
    #[serde(default)]
    pub query: CommandAlternatives,
}

impl Default for SelectorCommands {
    fn default() -> Self {
        let mut commands = Self {
            positions: Vec::new(),
            query: CommandAlternatives::default(),
        };
        commands.resize(DEFAULT_NUM_POSITIONS);
        commands
    }
}

impl SelectorCommands {
    /// Number of positions
    pub fn num_positions(&self) -> usize {
        self.positions.len()
    }

    /// Resize both tables; existing slots below `n` are kept
    pub fn set_num_positions(&mut self, n: usize) -> Result<(), ConfigError> {
        check_num_positions(n)?;
        self.resize(n);
        Ok(())
    }

    fn resize(&mut self, n: usize) {
        self.positions.resize_with(n, CommandResponse::default);
        self.query.responses.resize_with(n, Vec::new);
    }

    /// Check every position pair and the optional query
    pub fn validate(&self, mode: CommandMode, detector: &ResponseDetector) -> Result<(), ConfigError> {
        if self.positions.is_empty() {
            return Err(ConfigError::Incomplete("no positions configured".to_string()));
        }
        check_num_positions(self.positions.len())?;
        for (i, position) in self.positions.iter().enumerate() {
            position.check(&format!("Position{}", i), mode, detector, true)?;
        }
        if self.query.is_configured() && self.query.responses.len() != self.positions.len() {
            return Err(ConfigError::InvalidValue {
                name: "query.responses".to_string(),
                message: format!(
                    "{} query responses for {} positions",
                    self.query.responses.len(),
                    self.positions.len()
                ),
            });
        }
        self.query.check("Query", mode, detector)
    }

    /// Set `NumberOfPositions` or one indexed slot from escaped text
    pub fn set_property(
        &mut self,
        mode: CommandMode,
        name: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        if name == property::NUMBER_OF_POSITIONS {
            let n = value
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: format!("'{}': {}", value.trim(), e),
                })?;
            return self.set_num_positions(n);
        }
        let bytes = mode.parse_bytes(name, value);
        let slot = self
            .slot_mut(name)
            .ok_or_else(|| ConfigError::UnknownProperty(name.to_string()))?;
        *slot = bytes?;
        Ok(())
    }

    /// A setting in string form; indexed names past the table yield `None`
    pub fn property(&self, name: &str) -> Option<String> {
        if name == property::NUMBER_OF_POSITIONS {
            return Some(self.num_positions().to_string());
        }
        if name == property::QUERY_COMMAND {
            return Some(to_escaped(&self.query.command));
        }
        if let Some(i) = indexed(name, "Position", "Command") {
            return self.positions.get(i).map(|p| to_escaped(&p.command));
        }
        if let Some(i) = indexed(name, "Position", "Response") {
            return self.positions.get(i).map(|p| to_escaped(&p.response));
        }
        indexed(name, "QueryResponse", "")
            .and_then(|i| self.query.responses.get(i))
            .map(|r| to_escaped(r))
    }

    /// Names for the current position count
    pub fn property_names(&self) -> Vec<String> {
        let n = self.num_positions();
        let mut names = vec![property::NUMBER_OF_POSITIONS.to_string()];
        for i in 0..n {
            names.push(property::position_command(i));
            names.push(property::position_response(i));
        }
        names.push(property::QUERY_COMMAND.to_string());
        names.extend((0..n).map(property::query_response));
        names
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Vec<u8>> {
        if name == property::QUERY_COMMAND {
            return Some(&mut self.query.command);
        }
        if let Some(i) = indexed(name, "Position", "Command") {
            return self.positions.get_mut(i).map(|p| &mut p.command);
        }
        if let Some(i) = indexed(name, "Position", "Response") {
            return self.positions.get_mut(i).map(|p| &mut p.response);
        }
        indexed(name, "QueryResponse", "").and_then(|i| self.query.responses.get_mut(i))
    }

    /// Give an unconfigured query table one (empty) slot per position
    pub fn normalize(&mut self) {
        if self.query.responses.is_empty() {
            self.query.responses.resize_with(self.positions.len(), Vec::new);
        }
    }
}

fn check_num_positions(n: usize) -> Result<(), ConfigError> {
    let message = match n {
        0 => "a state device needs at least one position".to_string(),
        n if n > MAX_NUM_POSITIONS => {
            format!("{} positions requested, at most {} supported", n, MAX_NUM_POSITIONS)
        }
        _ => return Ok(()),
    };
    Err(ConfigError::InvalidValue {
        name: property::NUMBER_OF_POSITIONS.to_string(),
        message,
    })
}

/// Parse `<prefix><index><suffix>` property names
fn indexed(name: &str, prefix: &str, suffix: &str) -> Option<usize> {
    let digits = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Complete shutter configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutterConfig {
    /// Port, timing and lifecycle settings
    #[serde(flatten)]
    pub engine: EngineConfig,
    /// Open/close/query slots
    #[serde(flatten)]
    pub commands: ShutterCommands,
}

/// Complete state-selector configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Port, timing and lifecycle settings
    #[serde(flatten)]
    pub engine: EngineConfig,
    /// Position and query tables
    #[serde(flatten)]
    pub commands: SelectorCommands,
}

macro_rules! json_config {
    ($($ty:ty),*) => {$(
        impl $ty {
            /// Parse from JSON text
            pub fn from_json(json: &str) -> serde_json::Result<Self> {
                serde_json::from_str(json)
            }

            /// Serialize to pretty-printed JSON
            pub fn to_json(&self) -> serde_json::Result<String> {
                serde_json::to_string_pretty(self)
            }

            /// Load from a JSON file
            pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
                load_json(path.as_ref())
            }
        }
    )*};
}

json_config!(EngineConfig, ShutterConfig, SelectorConfig);

fn load_json<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
