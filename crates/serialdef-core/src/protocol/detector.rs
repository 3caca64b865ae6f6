//! Response detection
//!
//! Strategies for deciding where a device reply ends:
//! - `ignore`: don't read anything
//! - `term:<escaped>`: read until the terminator has been seen
//! - `length:<N>`: read exactly N bytes
//!
//! `cr`, `lf` and `crlf` are accepted as shorthands for the common
//! line-ending terminators.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use thiserror::Error;

use super::escape::{from_escaped, to_escaped, TYPICAL_LEN};
use super::transport::{Transport, TransportError};
use super::ConfigError;

/// Errors raised while reading a response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    /// Deadline passed before the response was complete
    #[error("Timed out after receiving {} byte(s)", .partial.len())]
    Timeout {
        /// Bytes received before the deadline
        partial: Vec<u8>,
    },

    /// The transport failed
    #[error("Port error: {0}")]
    Port(String),
}

impl DetectorError {
    fn from_transport(e: TransportError, partial: Vec<u8>) -> Self {
        match e {
            TransportError::Timeout => DetectorError::Timeout { partial },
            TransportError::Port(msg) => DetectorError::Port(msg),
        }
    }
}

/// Response framing strategy, chosen once at configuration time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponseDetector {
    /// Never read; every exchange is fire-and-forget
    #[default]
    Ignore,
    /// Read until the accumulated bytes end with this sequence
    Terminator(Vec<u8>),
    /// Read exactly this many bytes
    FixedLength(usize),
}

impl ResponseDetector {
    /// Parse a detection method token
    pub fn new_by_name(token: &str) -> Result<Self, ConfigError> {
        let token = token.trim();
        let (keyword, arg) = match token.split_once(':') {
            Some((k, a)) => (k.trim().to_ascii_lowercase(), Some(a)),
            None => (token.to_ascii_lowercase(), None),
        };

        match (keyword.as_str(), arg) {
            ("ignore", None) => Ok(ResponseDetector::Ignore),
            ("cr", None) => Ok(ResponseDetector::Terminator(b"\r".to_vec())),
            ("lf", None) => Ok(ResponseDetector::Terminator(b"\n".to_vec())),
            ("crlf", None) => Ok(ResponseDetector::Terminator(b"\r\n".to_vec())),
            ("term", Some(escaped)) => {
                let terminator = from_escaped(escaped)?;
                if terminator.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        name: "ResponseDetection".to_string(),
                        message: "terminator must not be empty".to_string(),
                    });
                }
                Ok(ResponseDetector::Terminator(terminator))
            }
            ("length", Some(count)) => count
                .trim()
                .parse::<usize>()
                .map(ResponseDetector::FixedLength)
                .map_err(|e| ConfigError::InvalidValue {
                    name: "ResponseDetection".to_string(),
                    message: format!("invalid byte count '{}': {}", count.trim(), e),
                }),
            _ => Err(ConfigError::UnknownMethod(token.to_string())),
        }
    }

    /// Canonical token; parsing it yields an equal detector
    pub fn method_name(&self) -> String {
        match self {
            ResponseDetector::Ignore => "ignore".to_string(),
            ResponseDetector::Terminator(t) => format!("term:{}", to_escaped(t)),
            ResponseDetector::FixedLength(n) => format!("length:{}", n),
        }
    }

    /// Whether this detector ever reads from the transport
    pub fn reads_response(&self) -> bool {
        !matches!(self, ResponseDetector::Ignore)
    }

    /// Read one response from `transport`, giving up at `deadline`.
    ///
    /// `Ignore` returns immediately without touching the transport; pending
    /// bytes are left in place.
    pub fn recv(
        &self,
        transport: &mut dyn Transport,
        deadline: Instant,
    ) -> Result<Vec<u8>, DetectorError> {
        match self {
            ResponseDetector::Ignore => Ok(Vec::new()),
            ResponseDetector::Terminator(terminator) => {
                let mut response = Vec::with_capacity(TYPICAL_LEN);
                while !response.ends_with(terminator) {
                    match transport.read_byte(deadline) {
                        Ok(b) => {
                            response.push(b);
                            tracing::trace!("recv: {} byte(s) so far", response.len());
                        }
                        Err(e) => return Err(DetectorError::from_transport(e, response)),
                    }
                }
                Ok(response)
            }
            ResponseDetector::FixedLength(count) => {
                // The count is user-configured; grow as bytes actually arrive
                let mut response = Vec::with_capacity((*count).min(TYPICAL_LEN));
                while response.len() < *count {
                    match transport.read_byte(deadline) {
                        Ok(b) => response.push(b),
                        Err(e) => return Err(DetectorError::from_transport(e, response)),
                    }
                }
                Ok(response)
            }
        }
    }
}

impl FromStr for ResponseDetector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new_by_name(s)
    }
}

impl fmt::Display for ResponseDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.method_name())
    }
}
