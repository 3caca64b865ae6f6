//! Scripted mock port for integration tests.
//!
//! Records every write (with the simulated instant it happened) and answers
//! each write with the next queued reply, so tests can assert on the whole
//! exchange without a serial device.

#![allow(dead_code)]

use serialdef_core::protocol::{Clock, ManualClock, PortProvider, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct MockState {
    /// (simulated time since clock start, bytes) per write
    pub writes: Vec<(Duration, Vec<u8>)>,
    /// Bytes waiting to be read
    pub rx: VecDeque<u8>,
    /// Reply queued into `rx` after each write, in order
    pub replies: VecDeque<Vec<u8>>,
    pub opened_ports: Vec<String>,
    pub is_open: bool,
    pub fail_open: bool,
    pub fail_writes: bool,
    pub fail_reads: bool,
}

/// Shared handle to a mock device and its simulated clock
#[derive(Clone)]
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
    pub clock: ManualClock,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            clock: ManualClock::new(),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Queue the device's reply to the next unanswered command
    pub fn reply(&self, bytes: &[u8]) -> &Self {
        self.state().replies.push_back(bytes.to_vec());
        self
    }

    /// Put bytes on the wire right now
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state().rx.extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().writes.iter().map(|(_, b)| b.clone()).collect()
    }

    pub fn write_times(&self) -> Vec<Duration> {
        self.state().writes.iter().map(|(t, _)| *t).collect()
    }

    pub fn provider(&self) -> Box<dyn PortProvider> {
        Box::new(self.clone())
    }

    pub fn boxed_clock(&self) -> Box<dyn Clock> {
        Box::new(self.clock.clone())
    }
}

impl PortProvider for MockPort {
    fn open(&mut self, port: &str) -> Result<Box<dyn Transport>, TransportError> {
        let mut state = self.state();
        if state.fail_open {
            return Err(TransportError::Port(format!("cannot open {}", port)));
        }
        state.opened_ports.push(port.to_string());
        state.is_open = true;
        drop(state);
        Ok(Box::new(MockTransport { port: self.clone() }))
    }
}

struct MockTransport {
    port: MockPort,
}

impl Transport for MockTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let at = self.port.clock.elapsed();
        let mut state = self.port.state();
        if state.fail_writes {
            return Err(TransportError::Port("write failed".into()));
        }
        state.writes.push((at, bytes.to_vec()));
        if let Some(reply) = state.replies.pop_front() {
            state.rx.extend(reply);
        }
        Ok(())
    }

    fn read_byte(&mut self, deadline: Instant) -> Result<u8, TransportError> {
        let mut state = self.port.state();
        if state.fail_reads {
            return Err(TransportError::Port("read failed".into()));
        }
        if let Some(b) = state.rx.pop_front() {
            return Ok(b);
        }
        drop(state);
        // Nothing will arrive: the wait runs to the deadline
        let now = self.port.clock.now();
        if now < deadline {
            self.port.clock.advance(deadline - now);
        }
        Err(TransportError::Timeout)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.port.state().is_open = false;
    }
}
