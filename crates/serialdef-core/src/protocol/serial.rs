//! Serial port handling
//!
//! Provides the serialport-backed [`Transport`] used outside of tests.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use super::transport::{PortProvider, Transport, TransportError};
use super::DEFAULT_BAUD_RATE;

/// A serial port that can be configured as a device's `Port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Identifier accepted by [`open_port`]
    pub name: String,

    /// What is attached, when the system says (USB manufacturer/product or bus type)
    pub description: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let description = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let label = [usb.manufacturer, usb.product]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                if label.is_empty() {
                    Some(format!("USB {:04x}:{:04x}", usb.vid, usb.pid))
                } else {
                    Some(label)
                }
            }
            SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
            SerialPortType::PciPort => Some("PCI".to_string()),
            _ => None,
        };
        Self {
            name: info.port_name,
            description,
        }
    }
}

/// Split a trailing number off a port name so `COM2` sorts before `COM10`
fn natural_key(name: &str) -> (&str, u64) {
    let digits = name.bytes().rev().take_while(u8::is_ascii_digit).count();
    let (stem, number) = name.split_at(name.len() - digits);
    (stem, number.parse().unwrap_or(0))
}

/// Available serial ports in natural name order
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = match serialport::available_ports() {
        Ok(found) => found.into_iter().map(PortInfo::from).collect(),
        Err(e) => {
            tracing::warn!("list_ports: enumeration failed: {}", e);
            Vec::new()
        }
    };
    sort_ports(&mut ports);
    ports
}

fn sort_ports(ports: &mut Vec<PortInfo>) {
    ports.sort_by(|a, b| natural_key(&a.name).cmp(&natural_key(&b.name)));
    ports.dedup_by(|a, b| a.name == b.name);
}

/// [`Transport`] over a serialport handle
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Wrap an already configured port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, deadline: Instant) -> Result<u8, TransportError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::Timeout);
        }
        self.port
            .set_timeout(remaining)
            .map_err(|e| TransportError::Port(e.to_string()))?;

        let mut buf = [0u8; 1];
        match self.port.read(&mut buf)? {
            0 => Err(TransportError::Port("port closed".to_string())),
            _ => Ok(buf[0]),
        }
    }
}

/// Opens real serial ports with 8N1 framing
#[derive(Debug, Clone)]
pub struct SerialPortProvider {
    baud_rate: u32,
}

impl SerialPortProvider {
    /// Provider opening ports at `baud_rate`
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl Default for SerialPortProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

impl PortProvider for SerialPortProvider {
    fn open(&mut self, port: &str) -> Result<Box<dyn Transport>, TransportError> {
        let handle = open_port(port, self.baud_rate)?;
        Ok(Box::new(SerialTransport::new(handle)))
    }
}

/// Open and configure a serial port
pub fn open_port(name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, TransportError> {
    let port_err = |e: serialport::Error| TransportError::Port(e.to_string());

    let mut port = serialport::new(name, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(port_err)?;

    // Stale bytes from before we opened would confuse the first response
    port.clear(serialport::ClearBuffer::All).map_err(port_err)?;

    tracing::debug!("open_port: opened {} at {} baud", name, baud_rate);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_list_ports_does_not_fail_without_hardware() {
        for port in list_ports() {
            assert!(!port.name.is_empty());
        }
    }

    #[test]
    fn test_ports_sort_numerically_within_a_family() {
        let mut ports: Vec<PortInfo> = [
            "COM10",
            "/dev/ttyUSB1",
            "COM2",
            "/dev/ttyUSB10",
            "COM2",
            "/dev/ttyUSB0",
        ]
        .into_iter()
        .map(port)
        .collect();
        sort_ports(&mut ports);
        let names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB10", "COM2", "COM10"]
        );
    }

    #[test]
    fn test_natural_key_without_number() {
        assert_eq!(natural_key("/dev/cu.usbserial"), ("/dev/cu.usbserial", 0));
        assert_eq!(natural_key("COM7"), ("COM", 7));
    }

    #[test]
    fn test_open_missing_port_is_port_error() {
        let mut provider = SerialPortProvider::default();
        let result = provider.open("/dev/serialdef-does-not-exist");
        assert!(matches!(result, Err(TransportError::Port(_))));
    }
}
