//! Serial device discovery
//!
//! Enumerates the host's serial ports and flags the ones whose USB
//! vendor/product id matches the sensor board.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::transport::TransportError;
use super::SensorError;

/// USB identity of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
}

/// The sensor board's USB-serial bridge (0x1a86:0x7523)
pub const SENSOR_IDENTITY: DeviceIdentity = DeviceIdentity {
    vendor_id: 6790,
    product_id: 29987,
};

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// One port as reported by the host, before matching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port_name: String,
    /// USB vendor id, if the port is USB-backed
    pub vendor_id: Option<u16>,
    /// USB product id, if the port is USB-backed
    pub product_id: Option<u16>,
    /// Manufacturer/product string, best effort
    pub description: Option<String>,
}

impl PortDescriptor {
    /// A port with no USB metadata
    pub fn plain(port_name: &str) -> Self {
        Self {
            port_name: port_name.to_string(),
            ..Self::default()
        }
    }

    /// A USB-backed port
    pub fn usb(port_name: &str, vendor_id: u16, product_id: u16) -> Self {
        Self {
            port_name: port_name.to_string(),
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            description: None,
        }
    }

    /// True if both ids are present and equal to `identity`
    pub fn matches(&self, identity: &DeviceIdentity) -> bool {
        matches!(
            (self.vendor_id, self.product_id),
            (Some(vid), Some(pid)) if vid == identity.vendor_id && pid == identity.product_id
        )
    }
}

/// A scanned port with its match verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDevice {
    /// Port name
    pub port_name: String,
    /// Whether the port exposes the sensor's identity
    pub identity_match: bool,
    /// `vid:pid`, if known
    pub usb_id: Option<String>,
    /// Manufacturer/product string, if known
    pub description: Option<String>,
}

/// Source of port listings
pub trait PortEnumerator: Send {
    /// List every serial port currently visible to the host
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, TransportError>;
}

/// Lists ports via `serialport::available_ports`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, TransportError> {
        let ports = serialport::available_ports()
            .map_err(|e| TransportError::Enumeration(e.to_string()))?;

        Ok(ports
            .into_iter()
            .map(|p| match p.port_type {
                serialport::SerialPortType::UsbPort(info) => {
                    let description = format!(
                        "{} {}",
                        info.manufacturer.unwrap_or_default(),
                        info.product.unwrap_or_default()
                    )
                    .trim()
                    .to_string();

                    PortDescriptor {
                        port_name: p.port_name,
                        vendor_id: Some(info.vid),
                        product_id: Some(info.pid),
                        description: (!description.is_empty()).then_some(description),
                    }
                }
                _ => PortDescriptor {
                    port_name: p.port_name,
                    ..PortDescriptor::default()
                },
            })
            .collect())
    }
}

/// Finds the sensor among the host's serial ports
pub struct DeviceLocator {
    enumerator: Box<dyn PortEnumerator>,
    identity: DeviceIdentity,
}

impl DeviceLocator {
    /// Locator for the sensor identity over the given enumerator
    pub fn new(enumerator: Box<dyn PortEnumerator>) -> Self {
        Self {
            enumerator,
            identity: SENSOR_IDENTITY,
        }
    }

    /// Locator over the host's real ports
    pub fn system() -> Self {
        Self::new(Box::new(SystemPorts))
    }

    /// Identity being matched
    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    /// Enumerate every port, flagging matches. Opens nothing.
    pub fn scan(&self) -> Result<Vec<CandidateDevice>, SensorError> {
        let ports = self.enumerator.available_ports()?;

        Ok(ports
            .into_iter()
            .map(|p| CandidateDevice {
                identity_match: p.matches(&self.identity),
                usb_id: match (p.vendor_id, p.product_id) {
                    (Some(vid), Some(pid)) => Some(format!("{vid:04x}:{pid:04x}")),
                    _ => None,
                },
                port_name: p.port_name,
                description: p.description,
            })
            .collect())
    }

    /// First matching port in enumeration order, if any
    pub fn locate(&self) -> Result<Option<CandidateDevice>, SensorError> {
        let found = self.scan()?.into_iter().find(|c| c.identity_match);
        match &found {
            Some(c) => tracing::debug!("Sensor {} found on {}", self.identity, c.port_name),
            None => tracing::debug!("No port exposes {}", self.identity),
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPorts(Vec<PortDescriptor>);

    impl PortEnumerator for FixedPorts {
        fn available_ports(&self) -> Result<Vec<PortDescriptor>, TransportError> {
            Ok(self.0.clone())
        }
    }

    fn locator(ports: Vec<PortDescriptor>) -> DeviceLocator {
        DeviceLocator::new(Box::new(FixedPorts(ports)))
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(SENSOR_IDENTITY.to_string(), "1a86:7523");
    }

    #[test]
    fn test_match_requires_both_ids() {
        let mut port = PortDescriptor::plain("/dev/ttyS0");
        assert!(!port.matches(&SENSOR_IDENTITY));

        port.vendor_id = Some(6790);
        assert!(!port.matches(&SENSOR_IDENTITY));

        port.product_id = Some(29987);
        assert!(port.matches(&SENSOR_IDENTITY));

        assert!(!PortDescriptor::usb("x", 6790, 1).matches(&SENSOR_IDENTITY));
    }

    #[test]
    fn test_scan_flags_matches() {
        let found = locator(vec![
            PortDescriptor::plain("/dev/ttyS0"),
            PortDescriptor::usb("/dev/ttyUSB0", 6790, 29987),
            PortDescriptor::usb("/dev/ttyACM0", 0x2341, 0x0043),
        ])
        .scan()
        .unwrap();

        assert_eq!(found.len(), 3);
        assert_eq!(
            found.iter().map(|c| c.identity_match).collect::<Vec<_>>(),
            vec![false, true, false]
        );
        assert_eq!(found[1].usb_id.as_deref(), Some("1a86:7523"));
        assert_eq!(found[0].usb_id, None);
    }

    #[test]
    fn test_locate_picks_first_match() {
        let found = locator(vec![
            PortDescriptor::usb("/dev/ttyUSB0", 6790, 29987),
            PortDescriptor::usb("/dev/ttyUSB1", 6790, 29987),
        ])
        .locate()
        .unwrap();

        assert_eq!(found.unwrap().port_name, "/dev/ttyUSB0");
    }

    #[test]
    fn test_locate_none() {
        let found = locator(vec![PortDescriptor::plain("/dev/ttyS0")]).locate().unwrap();
        assert!(found.is_none());
        assert!(locator(Vec::new()).locate().unwrap().is_none());
    }
}
