//! Protocol engine
//!
//! Owns the port, configuration, response detector and timing state of one
//! device, and runs the send/receive cycle on behalf of the device variants.
//!
//! Everything here is synchronous: each call blocks until its exchange has
//! completed, failed, or timed out.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{
    Clock, ConfigError, PortProvider, ProtocolError, ResponseDetector, SystemClock, Transport,
};
use crate::config::EngineConfig;
use crate::protocol::escape::to_escaped;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Configurable; no port open
    Uninitialized,
    /// Initialized and accepting commands; configuration is frozen
    Ready,
    /// Shut down. Terminal.
    ShutDown,
}

/// Command/response engine shared by all device variants
pub struct ProtocolEngine {
    config: EngineConfig,
    state: EngineState,
    provider: Box<dyn PortProvider>,
    clock: Box<dyn Clock>,
    /// Open port (Ready only)
    transport: Option<Box<dyn Transport>>,
    /// Built from `config.response_detection` at initialization
    detector: Option<ResponseDetector>,
    /// Completion time of the most recent exchange
    last_action: Option<Instant>,
}

impl ProtocolEngine {
    /// Create an engine using the system clock
    pub fn new(config: EngineConfig, provider: Box<dyn PortProvider>) -> Self {
        Self::with_clock(config, provider, Box::new(SystemClock))
    }

    /// Create an engine driven by `clock`
    pub fn with_clock(
        config: EngineConfig,
        provider: Box<dyn PortProvider>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            config,
            state: EngineState::Uninitialized,
            provider,
            clock,
            transport: None,
            detector: None,
            last_action: None,
        }
    }

    /// Current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mutable configuration, available only before initialization
    pub fn config_mut(&mut self) -> Result<&mut EngineConfig, ConfigError> {
        if self.state != EngineState::Uninitialized {
            return Err(ConfigError::Frozen("engine configuration".to_string()));
        }
        Ok(&mut self.config)
    }

    /// Lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Whether commands are accepted
    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// The active detector (Ready only)
    pub fn detector(&self) -> Option<&ResponseDetector> {
        self.detector.as_ref()
    }

    /// Validate configuration, open the port and run the initialize exchange.
    ///
    /// On failure the port is released and the engine stays uninitialized.
    pub fn initialize(&mut self) -> Result<(), ProtocolError> {
        match self.state {
            EngineState::Ready => return Ok(()),
            EngineState::ShutDown => {
                return Err(ProtocolError::UnsupportedOperation(
                    "initialize after shutdown".to_string(),
                ))
            }
            EngineState::Uninitialized => {}
        }

        let detector = self.config.detector()?;
        self.config.validate(&detector)?;
        tracing::debug!(
            "initialize: port = {:?}, detection = {}, min_interval = {:?}, answer_timeout = {:?}",
            self.config.port,
            detector,
            self.config.min_interval(),
            self.config.answer_timeout()
        );

        let transport = self
            .provider
            .open(&self.config.port)
            .map_err(|e| ProtocolError::from(e).during("initialize"))?;
        self.transport = Some(transport);
        self.detector = Some(detector);

        if !self.config.initialize.command.is_empty() {
            let command = self.config.initialize.command.clone();
            let expected = self.config.initialize.response.clone();
            if let Err(e) = self.exchange(&command, &expected) {
                tracing::debug!("initialize: exchange failed: {}", e);
                self.release();
                return Err(e.during("initialize"));
            }
        }

        self.last_action = Some(self.clock.now());
        self.state = EngineState::Ready;
        tracing::debug!("initialize: ready on {}", self.config.port);
        Ok(())
    }

    /// Run the shutdown exchange (if configured) and release the port.
    ///
    /// The engine is shut down afterwards even if the exchange failed; the
    /// failure is still returned.
    pub fn shutdown(&mut self) -> Result<(), ProtocolError> {
        if self.state != EngineState::Ready {
            return Ok(());
        }

        let mut result = Ok(());
        if !self.config.shutdown.command.is_empty() {
            let command = self.config.shutdown.command.clone();
            let expected = self.config.shutdown.response.clone();
            result = self
                .exchange(&command, &expected)
                .map_err(|e| e.during("shutdown"));
        }
        if let Err(e) = &result {
            tracing::warn!("shutdown: {} (closing port anyway)", e);
        }

        self.release();
        self.state = EngineState::ShutDown;
        tracing::debug!("shutdown: closed {}", self.config.port);
        result
    }

    /// True until `answer_timeout` has elapsed since the last exchange
    pub fn busy(&self) -> bool {
        self.last_action
            .is_some_and(|t| self.clock.now() < t + self.config.answer_timeout())
    }

    /// Send `command` and, unless `expected` is empty, read a response and
    /// require it to equal `expected`.
    pub fn send_recv(&mut self, command: &[u8], expected: &[u8]) -> Result<(), ProtocolError> {
        self.ensure_ready("send_recv")?;
        self.exchange(command, expected)
    }

    /// Send `command`, read one response and return the index of the first
    /// alternative it equals
    pub fn send_query_recv_alternative<R: AsRef<[u8]>>(
        &mut self,
        command: &[u8],
        alternatives: &[R],
    ) -> Result<usize, ProtocolError> {
        self.ensure_ready("send_query_recv_alternative")?;
        if alternatives.is_empty() {
            return Err(ConfigError::Incomplete("no response alternatives".to_string()).into());
        }

        let result = self.send(command).and_then(|()| self.recv());
        self.last_action = Some(self.clock.now());
        let response = result?;

        alternatives
            .iter()
            .position(|alt| alt.as_ref() == response.as_slice())
            .ok_or_else(|| ProtocolError::no_match(&response))
    }

    fn ensure_ready(&self, operation: &str) -> Result<(), ProtocolError> {
        if self.state == EngineState::Ready {
            Ok(())
        } else {
            Err(ProtocolError::UnsupportedOperation(format!(
                "{} while {:?}",
                operation, self.state
            )))
        }
    }

    /// One send/expect cycle; stamps `last_action` whatever the outcome
    fn exchange(&mut self, command: &[u8], expected: &[u8]) -> Result<(), ProtocolError> {
        let result = self.send(command).and_then(|()| {
            if expected.is_empty() {
                return Ok(());
            }
            let response = self.recv()?;
            if response == expected {
                Ok(())
            } else {
                Err(ProtocolError::mismatch(expected, &response))
            }
        });
        self.last_action = Some(self.clock.now());
        result
    }

    /// Wait out the minimum interval, then write
    fn send(&mut self, command: &[u8]) -> Result<(), ProtocolError> {
        if let Some(last) = self.last_action {
            let earliest = last + self.config.min_interval();
            let now = self.clock.now();
            if now < earliest {
                tracing::trace!("send: waiting {:?} for minimum interval", earliest - now);
                self.clock.sleep(earliest - now);
            }
        }

        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| ProtocolError::PortError("port is not open".to_string()))?;
        tracing::debug!("send: \"{}\"", to_escaped(command));
        transport.write(command)?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let deadline = self.clock.now() + self.config.answer_timeout();
        let (Some(transport), Some(detector)) = (self.transport.as_mut(), self.detector.as_ref())
        else {
            return Err(ProtocolError::PortError("port is not open".to_string()));
        };
        let response = detector.recv(transport.as_mut(), deadline)?;
        tracing::debug!("recv: \"{}\"", to_escaped(&response));
        Ok(response)
    }

    fn release(&mut self) {
        self.transport = None;
        self.detector = None;
        self.last_action = None;
    }
}

impl Drop for ProtocolEngine {
    fn drop(&mut self) {
        if self.state == EngineState::Ready {
            let _ = self.shutdown();
        }
    }
}
