//! # SerialDef Core Library
//!
//! Drive serial-attached instruments from user-declared command/response
//! byte strings instead of instrument-specific drivers.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A lossless C-style escaping codec for configuring raw byte strings
//! - Pluggable response detection (ignore, terminator, fixed length)
//! - A synchronous send/receive engine with minimum-interval and answer-timeout
//!   handling
//! - Shutter and N-position state selector devices built on that engine
//!
//! ## Example
//!
//! ```rust,ignore
//! use serialdef_core::prelude::*;
//!
//! let mut shutter = Shutter::new(Box::new(SerialPortProvider::new(9600)));
//! shutter.set_property("Port", "/dev/ttyUSB0")?;
//! shutter.set_property("ResponseDetection", "term:\\r\\n")?;
//! shutter.set_property("OpenCommand", "OPEN\\r")?;
//! shutter.set_property("OpenResponse", "OK\\r\\n")?;
//! shutter.set_property("CloseCommand", "CLOSE\\r")?;
//! shutter.set_property("CloseResponse", "OK\\r\\n")?;
//! shutter.initialize()?;
//!
//! shutter.set_open(true)?;
//! ```

pub mod config;
pub mod device;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        CommandAlternatives, CommandMode, CommandResponse, EngineConfig, SelectorCommands,
        SelectorConfig, ShutterCommands, ShutterConfig,
    };
    pub use crate::device::{Device, Shutter, StateSelector};
    pub use crate::protocol::{
        ConfigError, EngineState, ManualClock, PortProvider, ProtocolEngine, ProtocolError,
        ResponseDetector, SerialPortProvider, SystemClock, Transport, TransportError,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
