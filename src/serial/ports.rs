//! Serial port enumeration
//!
//! Only used to show the operator what is plugged in; configured port names
//! are never checked against this list.

use anyhow::{Context, Result};
use colored::Colorize;

/// Information about a detected serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    pub port_type: PortType,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

impl PortInfo {
    /// Human-readable device name
    pub fn display_name(&self) -> String {
        let description = match (&self.manufacturer, &self.product) {
            (Some(mfg), Some(prod)) => format!("{} {}", mfg, prod),
            (None, Some(prod)) => prod.clone(),
            (Some(mfg), None) => mfg.clone(),
            (None, None) => self.port_type.to_string(),
        };
        format!("{} ({})", description, self.path)
    }
}

/// List all available serial ports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().with_context(|| "Failed to enumerate serial ports")?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (port_type, manufacturer, product) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => {
                    (PortType::UsbSerial, info.manufacturer, info.product)
                }
                serialport::SerialPortType::PciPort => (PortType::PciSerial, None, None),
                serialport::SerialPortType::BluetoothPort => (PortType::Bluetooth, None, None),
                serialport::SerialPortType::Unknown => (PortType::Unknown, None, None),
            };

            PortInfo {
                path: p.port_name,
                port_type,
                manufacturer,
                product,
            }
        })
        .collect())
}

/// Print the available serial ports
pub fn print_ports() {
    let ports = match list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            println!("{} {:#}", "[ERROR]".red().bold(), e);
            return;
        }
    };

    println!("{}", "Available serial ports:".green().bold());
    if ports.is_empty() {
        println!("  {}", "No serial ports available.".yellow());
        return;
    }
    for port in ports {
        println!("  Device Name: {}", port.display_name().white());
    }
}
