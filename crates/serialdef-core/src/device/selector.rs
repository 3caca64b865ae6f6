//! N-position state selector (filter wheels, switches, turrets)

use super::{Device, SELECTOR_DEVICE_NAME};
use crate::config::{EngineConfig, SelectorCommands, SelectorConfig};
use crate::protocol::{
    Clock, ConfigError, EngineState, PortProvider, ProtocolEngine, ProtocolError, SystemClock,
};

/// State device with one configured command/response pair per position
pub struct StateSelector {
    engine: ProtocolEngine,
    commands: SelectorCommands,
    /// Always within `0..num_positions`
    position: usize,
}

impl StateSelector {
    /// Create an unconfigured selector
    pub fn new(provider: Box<dyn PortProvider>) -> Self {
        Self::from_config(SelectorConfig::default(), provider)
    }

    /// Create from a loaded configuration, using the system clock
    pub fn from_config(config: SelectorConfig, provider: Box<dyn PortProvider>) -> Self {
        Self::with_clock(config, provider, Box::new(SystemClock))
    }

    /// Create with an explicit clock (tests drive a [`ManualClock`](crate::protocol::ManualClock))
    pub fn with_clock(
        config: SelectorConfig,
        provider: Box<dyn PortProvider>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let mut commands = config.commands;
        commands.normalize();
        Self {
            engine: ProtocolEngine::with_clock(config.engine, provider, clock),
            commands,
            position: 0,
        }
    }

    /// Snapshot of the full configuration
    pub fn config(&self) -> SelectorConfig {
        SelectorConfig {
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
    pub fn commands_mut(&mut self) -> Result<&mut SelectorCommands, ProtocolError> {
        self.ensure_configurable("selector commands")?;
        Ok(&mut self.commands)
    }

    /// Number of configured positions
    pub fn number_of_positions(&self) -> usize {
        self.commands.num_positions()
    }

    /// Move to `position`. The cached position only changes on success.
    pub fn set_state(&mut self, position: usize) -> Result<(), ProtocolError> {
        let count = self.number_of_positions();
        let Some(pair) = self.commands.positions.get(position) else {
            return Err(ProtocolError::InvalidPosition { position, count });
        };
        self.engine.send_recv(&pair.command, &pair.response)?;
        self.position = position;
        Ok(())
    }

    /// Current position: queried from the device when a query command is
    /// configured, otherwise the last position set
    pub fn get_state(&mut self) -> Result<usize, ProtocolError> {
        if self.commands.query.is_configured() {
            self.query_state()
        } else {
            Ok(self.position)
        }
    }

    /// Re-derive the position from the device and update the cache
    pub fn query_state(&mut self) -> Result<usize, ProtocolError> {
        if !self.commands.query.is_configured() {
            return Err(ProtocolError::UnsupportedOperation(
                "no query command configured".to_string(),
            ));
        }
        let index = self
            .engine
            .send_query_recv_alternative(&self.commands.query.command, &self.commands.query.responses)
            .map_err(|e| e.during("query"))?;
        self.position = index;
        Ok(index)
    }

    /// Last position set or queried, without touching the device
    pub fn cached_state(&self) -> usize {
        self.position
    }

    fn ensure_configurable(&self, name: &str) -> Result<(), ProtocolError> {
        if self.engine.state() != EngineState::Uninitialized {
            return Err(ConfigError::Frozen(name.to_string()).into());
        }
        Ok(())
    }
}

impl Device for StateSelector {
    fn name(&self) -> &str {
        SELECTOR_DEVICE_NAME
    }

    fn initialize(&mut self) -> Result<(), ProtocolError> {
        if self.engine.state() != EngineState::Uninitialized {
            return self.engine.initialize();
        }
        let config = self.engine.config();
        self.commands.validate(config.mode, &config.detector()?)?;
        self.engine.initialize()?;
        self.position = 0;
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
        names.extend(self.commands.property_names());
        names
    }
}
