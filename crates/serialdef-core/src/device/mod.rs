//! Device variants
//!
//! Two device shapes built on one [`ProtocolEngine`](crate::protocol::ProtocolEngine):
//! - [`Shutter`]: open/closed, with an optional state query
//! - [`StateSelector`]: N positions, each with its own command/response pair
//!
//! Both hold an engine and forward the shared lifecycle to it.

mod selector;
mod shutter;

pub use selector::StateSelector;
pub use shutter::Shutter;

use crate::protocol::ProtocolError;

/// Name reported by [`Shutter`]
pub const SHUTTER_DEVICE_NAME: &str = "UserDefinedShutter";

/// Name reported by [`StateSelector`]
pub const SELECTOR_DEVICE_NAME: &str = "UserDefinedStateDevice";

/// Lifecycle and configuration surface seen by a host framework
pub trait Device {
    /// Device name reported to the host
    fn name(&self) -> &str;

    /// Validate configuration, open the port and run the initialize exchange
    fn initialize(&mut self) -> Result<(), ProtocolError>;

    /// Run the shutdown exchange and release the port
    fn shutdown(&mut self) -> Result<(), ProtocolError>;

    /// True while the device may still be acting on the last command
    fn busy(&self) -> bool;

    /// Whether `initialize` has succeeded and `shutdown` has not run
    fn is_initialized(&self) -> bool;

    /// Set a pre-init property from its string form
    fn set_property(&mut self, name: &str, value: &str) -> Result<(), ProtocolError>;

    /// Current value of a property in string form
    fn property(&self, name: &str) -> Option<String>;

    /// Every property name this device accepts
    fn property_names(&self) -> Vec<String>;
}
