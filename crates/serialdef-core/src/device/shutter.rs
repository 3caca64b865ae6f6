//! On/off shutter

use std::time::Duration;

use super::{Device, SHUTTER_DEVICE_NAME};
use crate::config::{EngineConfig, ShutterCommands, ShutterConfig};
use crate::protocol::{
    Clock, ConfigError, EngineState, PortProvider, ProtocolEngine, ProtocolError, SystemClock,
};

/// Shutter driven by configured open/close/query byte strings
pub struct Shutter {
    engine: ProtocolEngine,
    commands: ShutterCommands,
    /// Last known state; closed until told otherwise
    open: bool,
}

impl Shutter {
    /// Create an unconfigured shutter
    pub fn new(provider: Box<dyn PortProvider>) -> Self {
        Self::from_config(ShutterConfig::default(), provider)
    }

    /// Create from a loaded configuration, using the system clock
    pub fn from_config(config: ShutterConfig, provider: Box<dyn PortProvider>) -> Self {
        Self::with_clock(config, provider, Box::new(SystemClock))
    }

    /// Create with an explicit clock (tests drive a [`ManualClock`](crate::protocol::ManualClock))
    pub fn with_clock(
        config: ShutterConfig,
        provider: Box<dyn PortProvider>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            engine: ProtocolEngine::with_clock(config.engine, provider, clock),
            commands: config.commands,
            open: false,
        }
    }

    /// Snapshot of the full configuration
    pub fn config(&self) -> ShutterConfig {
        ShutterConfig {
            engine: self.engine.config().clone(),
            commands: self.commands.clone(),
        }
    }

    /// Underlying protocol engine
    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    /// Engine settings; fails once initialized
    pub fn engine_config_mut(&mut self) -> Result<&mut EngineConfig, ProtocolError> {
        Ok(self.engine.config_mut()?)
    }

    /// Command tables; fails once initialized
    pub fn commands_mut(&mut self) -> Result<&mut ShutterCommands, ProtocolError> {
        if self.engine.state() != EngineState::Uninitialized {
            return Err(ConfigError::Frozen("shutter commands".to_string()).into());
        }
        Ok(&mut self.commands)
    }

    /// Send the open or close command and, on success, remember the new state
    pub fn set_open(&mut self, open: bool) -> Result<(), ProtocolError> {
        let pair = if open {
            &self.commands.open
        } else {
            &self.commands.close
        };
        self.engine.send_recv(&pair.command, &pair.response)?;
        self.open = open;
        Ok(())
    }

    /// Ask the device whether it is open.
    ///
    /// Without a configured query command this is the state of the last
    /// successful [`set_open`](Self::set_open).
    pub fn get_open(&mut self) -> Result<bool, ProtocolError> {
        if self.commands.query_command.is_empty() {
            return Ok(self.open);
        }
        let alternatives = [
            self.commands.query_open_response.as_slice(),
            self.commands.query_close_response.as_slice(),
        ];
        let index = self
            .engine
            .send_query_recv_alternative(&self.commands.query_command, &alternatives)
            .map_err(|e| e.during("query"))?;
        self.open = index == 0;
        Ok(self.open)
    }

    /// Timed exposure is not something a user-defined shutter can do
    pub fn fire(&mut self, _duration: Duration) -> Result<(), ProtocolError> {
        Err(ProtocolError::UnsupportedOperation(
            "fire is not supported by this shutter".to_string(),
        ))
    }

    fn ensure_configurable(&self, name: &str) -> Result<(), ProtocolError> {
        if self.engine.state() != EngineState::Uninitialized {
            return Err(ConfigError::Frozen(name.to_string()).into());
        }
        Ok(())
    }
}

impl Device for Shutter {
    fn name(&self) -> &str {
        SHUTTER_DEVICE_NAME
    }

    fn initialize(&mut self) -> Result<(), ProtocolError> {
        if self.engine.state() != EngineState::Uninitialized {
            return self.engine.initialize();
        }
        let config = self.engine.config();
        self.commands.validate(config.mode, &config.detector()?)?;
        self.engine.initialize()?;
        self.open = false;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.engine.shutdown()
    }

    fn busy(&self) -> bool {
        self.engine.busy()
    }

    fn is_initialized(&self) -> bool {
        self.engine.is_ready()
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), ProtocolError> {
        self.ensure_configurable(name)?;
        let mode = self.engine.config().mode;
        match self.commands.set_property(mode, name, value) {
            Err(ConfigError::UnknownProperty(_)) => {
                self.engine.config_mut()?.set_property(name, value)?
            }
            other => other?,
        }
        Ok(())
    }

    fn property(&self, name: &str) -> Option<String> {
        self.commands
            .property(name)
            .or_else(|| self.engine.config().property(name))
    }

    fn property_names(&self) -> Vec<String> {
        let mut names = EngineConfig::property_names();
        names.extend(ShutterCommands::property_names());
        names
    }
}
