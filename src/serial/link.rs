//! Platform serial handles
//!
//! [`SerialDriver`] acquires handles and [`LinkHandle`] exposes each
//! configuration step separately, so a channel can report exactly which step
//! failed and drop the handle before anything else sees it.

use log::debug;
use serialport::{ClearBuffer, FlowControl, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;

/// Receive and transmit queue size requested from the driver
pub const QUEUE_SIZE: u32 = 4096;

/// Bounded read wait; keeps reader threads responsive to shutdown
pub const READ_TIMEOUT: Duration = Duration::from_millis(30);

/// XON (DC1)
pub const XON_CHAR: u8 = 0x11;
/// XOFF (DC3)
pub const XOFF_CHAR: u8 = 0x13;

/// Line control block: framing parameters applied to the port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineControl {
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub stop_bits: serialport::StopBits,
    pub parity: serialport::Parity,
}

/// Events the driver should report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask(u32);

impl EventMask {
    /// Line status errors only
    pub const ERRORS: EventMask = EventMask(0x0080);

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Special control characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialChars {
    pub eof: u8,
    pub error: u8,
    pub brk: u8,
    pub event: u8,
    pub xon: u8,
    pub xoff: u8,
}

impl Default for SpecialChars {
    fn default() -> Self {
        Self {
            eof: 0,
            error: 0,
            brk: 0,
            event: 0,
            xon: XON_CHAR,
            xoff: XOFF_CHAR,
        }
    }
}

/// Handshake policy and modem control line levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowPolicy {
    pub flow_control: FlowControl,
    pub assert_dtr: bool,
    pub assert_rts: bool,
}

impl Default for FlowPolicy {
    fn default() -> Self {
        Self {
            flow_control: FlowControl::None,
            assert_dtr: true,
            assert_rts: true,
        }
    }
}

/// An open platform serial handle
pub trait LinkHandle: Send {
    /// Request driver queue sizes
    fn set_queue_sizes(&mut self, rx: u32, tx: u32) -> serialport::Result<()>;

    fn set_read_timeout(&mut self, timeout: Duration) -> serialport::Result<()>;

    fn set_event_mask(&mut self, mask: EventMask) -> serialport::Result<()>;

    /// Fetch the current line control block
    fn line_control(&self) -> serialport::Result<LineControl>;

    fn set_line_control(&mut self, control: &LineControl) -> serialport::Result<()>;

    fn set_special_chars(&mut self, chars: &SpecialChars) -> serialport::Result<()>;

    fn set_flow_policy(&mut self, policy: &FlowPolicy) -> serialport::Result<()>;

    /// Drop queued data in both directions
    fn purge(&mut self) -> serialport::Result<()>;

    /// Read available bytes; `TimedOut` when nothing arrived in time
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;
}

/// Source of platform serial handles
pub trait SerialDriver: Send + Sync {
    fn acquire(&self, port: &str, baud_rate: u32) -> serialport::Result<Box<dyn LinkHandle>>;
}

/// Driver backed by the `serialport` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDriver;

impl SerialDriver for SystemDriver {
    fn acquire(&self, port: &str, baud_rate: u32) -> serialport::Result<Box<dyn LinkHandle>> {
        let port = serialport::new(port, baud_rate).timeout(READ_TIMEOUT).open()?;
        Ok(Box::new(SystemHandle { port }))
    }
}

/// Handle opened through the `serialport` crate
pub struct SystemHandle {
    port: Box<dyn SerialPort>,
}

impl LinkHandle for SystemHandle {
    fn set_queue_sizes(&mut self, rx: u32, tx: u32) -> serialport::Result<()> {
        // The OS driver keeps its own queue sizes
        debug!("Queue sizes {}/{} left to the OS driver", rx, tx);
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> serialport::Result<()> {
        self.port.set_timeout(timeout)
    }

    fn set_event_mask(&mut self, mask: EventMask) -> serialport::Result<()> {
        // Line errors surface as read errors through serialport
        debug!("Event mask {:#06x} reported through read errors", mask.bits());
        Ok(())
    }

    fn line_control(&self) -> serialport::Result<LineControl> {
        Ok(LineControl {
            baud_rate: self.port.baud_rate()?,
            data_bits: self.port.data_bits()?,
            stop_bits: self.port.stop_bits()?,
            parity: self.port.parity()?,
        })
    }

    fn set_line_control(&mut self, control: &LineControl) -> serialport::Result<()> {
        self.port.set_baud_rate(control.baud_rate)?;
        self.port.set_data_bits(control.data_bits)?;
        self.port.set_stop_bits(control.stop_bits)?;
        self.port.set_parity(control.parity)
    }

    fn set_special_chars(&mut self, chars: &SpecialChars) -> serialport::Result<()> {
        // serialport drivers always use DC1/DC3 for software flow control
        if chars.xon != XON_CHAR || chars.xoff != XOFF_CHAR {
            return Err(serialport::Error::new(
                serialport::ErrorKind::InvalidInput,
                format!(
                    "unsupported flow control characters {:#04x}/{:#04x}",
                    chars.xon, chars.xoff
                ),
            ));
        }
        Ok(())
    }

    fn set_flow_policy(&mut self, policy: &FlowPolicy) -> serialport::Result<()> {
        self.port.set_flow_control(policy.flow_control)?;
        self.port.write_data_terminal_ready(policy.assert_dtr)?;
        self.port.write_request_to_send(policy.assert_rts)
    }

    fn purge(&mut self) -> serialport::Result<()> {
        self.port.clear(ClearBuffer::All)
    }

    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buffer)
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }
}

/// Convert a configured data bit count into the driver setting
pub fn data_bits_setting(bits: u32) -> serialport::Result<serialport::DataBits> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(serialport::Error::new(
            serialport::ErrorKind::InvalidInput,
            format!("unsupported data bits: {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_special_chars() {
        let chars = SpecialChars::default();
        assert_eq!(chars.xon, 0x11);
        assert_eq!(chars.xoff, 0x13);
        assert_eq!(chars.eof, 0);
    }

    #[test]
    fn test_default_flow_policy() {
        let policy = FlowPolicy::default();
        assert_eq!(policy.flow_control, FlowControl::None);
        assert!(policy.assert_dtr && policy.assert_rts);
    }

    #[test]
    fn test_data_bits_setting() {
        assert_eq!(data_bits_setting(8).unwrap(), serialport::DataBits::Eight);
        assert_eq!(data_bits_setting(5).unwrap(), serialport::DataBits::Five);
        assert!(data_bits_setting(9).is_err());
        assert!(data_bits_setting(0).is_err());
    }

    #[test]
    fn test_missing_port_fails_to_open() {
        let result = SystemDriver.acquire("/nonexistent/modem-link-port", 115200);
        assert!(result.is_err());
    }
}
