//! Serial link management
//!
//! This module provides:
//! - Platform handle abstraction over the `serialport` crate
//! - The channel lifecycle (open, configure, reconfigure, close)
//! - Background readers draining inbound data
//! - Port enumeration for operator display

pub mod channel;
pub mod link;
pub mod ports;
pub mod reader;

#[cfg(test)]
pub(crate) mod mock;

pub use channel::{Channel, ConfigureStep, LinkBuilder, OpenLink, ReadOutcome};
pub use link::{LinkHandle, SerialDriver, SystemDriver};
pub use reader::{ConsoleSink, MessageSink, ReaderExit, ReaderLoop};
