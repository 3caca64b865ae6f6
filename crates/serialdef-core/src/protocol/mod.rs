//! Serial Protocol Engine
//!
//! Generic command/response protocol for devices described entirely by
//! configured byte strings.
//!
//! Layers, leaves first:
//! - [`escape`] converts between raw bytes and escaped configuration text
//! - [`ResponseDetector`] decides where a reply ends
//! - [`ProtocolEngine`] sends commands, applies timing, and matches replies

pub mod clock;
pub mod detector;
mod engine;
mod error;
pub mod escape;
pub mod serial;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::{DetectorError, ResponseDetector};
pub use engine::{EngineState, ProtocolEngine};
pub use error::{ConfigError, ProtocolError};
pub use escape::{from_escaped, to_escaped, EscapeError};
pub use serial::{list_ports, open_port, PortInfo, SerialPortProvider, SerialTransport};
pub use transport::{PortProvider, Transport, TransportError};

/// Default baud rate for [`SerialPortProvider`]
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default time to wait for a response in milliseconds
pub const DEFAULT_ANSWER_TIMEOUT_MS: u64 = 2000;
