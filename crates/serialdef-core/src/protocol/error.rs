//! Protocol errors

use thiserror::Error;

use super::detector::DetectorError;
use super::escape::{to_escaped, EscapeError};
use super::transport::TransportError;

/// Problems with device configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Malformed escaped text
    #[error(transparent)]
    InvalidEscape(#[from] EscapeError),

    /// Detection token not recognized
    #[error("Unknown response detection method: '{0}'")]
    UnknownMethod(String),

    /// A setting has an unusable value
    #[error("Invalid value for '{name}': {message}")]
    InvalidValue {
        /// Setting name
        name: String,
        /// What is wrong with it
        message: String,
    },

    /// A required setting is missing
    #[error("Incomplete configuration: {0}")]
    Incomplete(String),

    /// Settings that can never work together
    #[error("Contradictory configuration: {0}")]
    Contradictory(String),

    /// Pre-init setting changed after initialization
    #[error("'{0}' cannot be changed after initialization")]
    Frozen(String),

    /// No such property
    #[error("Unknown property: '{0}'")]
    UnknownProperty(String),
}

/// Errors returned by engine and device operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Rejected configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Transport-level I/O failure
    #[error("Serial port error: {0}")]
    PortError(String),

    /// No complete response before the answer timeout
    #[error("Response timeout")]
    Timeout,

    /// The response differs from the expected one
    #[error("Response mismatch: expected \"{expected}\", got \"{actual}\"")]
    ResponseMismatch {
        /// Expected bytes, escaped
        expected: String,
        /// Received bytes, escaped
        actual: String,
    },

    /// The response matches none of the alternatives
    #[error("Response \"{actual}\" matches none of the expected alternatives")]
    NoMatchingAlternative {
        /// Received bytes, escaped
        actual: String,
    },

    /// Selector position out of range
    #[error("Invalid position {position} (device has {count} positions)")]
    InvalidPosition {
        /// Requested position
        position: usize,
        /// Configured position count
        count: usize,
    },

    /// Not possible in the current state, or at all
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A communication failure during a lifecycle step or query
    #[error("Communication error during {context}: {source}")]
    CommunicationError {
        /// Step that failed: `initialize`, `shutdown` or `query`
        context: &'static str,
        /// Underlying failure
        #[source]
        source: Box<ProtocolError>,
    },
}

impl ProtocolError {
    pub(crate) fn mismatch(expected: &[u8], actual: &[u8]) -> Self {
        ProtocolError::ResponseMismatch {
            expected: to_escaped(expected),
            actual: to_escaped(actual),
        }
    }

    pub(crate) fn no_match(actual: &[u8]) -> Self {
        ProtocolError::NoMatchingAlternative {
            actual: to_escaped(actual),
        }
    }

    /// True for port, timeout and response-matching failures
    pub fn is_communication_failure(&self) -> bool {
        matches!(
            self,
            ProtocolError::PortError(_)
                | ProtocolError::Timeout
                | ProtocolError::ResponseMismatch { .. }
                | ProtocolError::NoMatchingAlternative { .. }
                | ProtocolError::CommunicationError { .. }
        )
    }

    /// Wrap communication failures as [`ProtocolError::CommunicationError`];
    /// anything else passes through unchanged
    pub(crate) fn during(self, context: &'static str) -> Self {
        match self {
            ProtocolError::CommunicationError { .. } => self,
            e if e.is_communication_failure() => ProtocolError::CommunicationError {
                context,
                source: Box::new(e),
            },
            e => e,
        }
    }
}

impl From<DetectorError> for ProtocolError {
    fn from(e: DetectorError) -> Self {
        match e {
            DetectorError::Timeout { .. } => ProtocolError::Timeout,
            DetectorError::Port(msg) => ProtocolError::PortError(msg),
        }
    }
}

impl From<TransportError> for ProtocolError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => ProtocolError::Timeout,
            TransportError::Port(msg) => ProtocolError::PortError(msg),
        }
    }
}

impl From<EscapeError> for ProtocolError {
    fn from(e: EscapeError) -> Self {
        ProtocolError::Configuration(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_renders_escaped() {
        let err = ProtocolError::mismatch(b"OK\r\n", b"ERR\r\n");
        assert_eq!(
            err.to_string(),
            "Response mismatch: expected \"OK\\r\\n\", got \"ERR\\r\\n\""
        );
    }

    #[test]
    fn test_during_wraps_only_communication_failures() {
        let wrapped = ProtocolError::Timeout.during("initialize");
        match wrapped {
            ProtocolError::CommunicationError { context, source } => {
                assert_eq!(context, "initialize");
                assert!(matches!(*source, ProtocolError::Timeout));
            }
            other => panic!("expected CommunicationError, got {other:?}"),
        }

        let config = ProtocolError::from(ConfigError::Incomplete("port".into()));
        assert!(matches!(
            config.during("initialize"),
            ProtocolError::Configuration(_)
        ));
    }

    #[test]
    fn test_detector_error_conversion() {
        let err: ProtocolError = DetectorError::Timeout { partial: b"AB".to_vec() }.into();
        assert!(matches!(err, ProtocolError::Timeout));

        let err: ProtocolError = DetectorError::Port("unplugged".into()).into();
        assert!(matches!(err, ProtocolError::PortError(ref m) if m == "unplugged"));
    }
}
