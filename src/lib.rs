//! Modem Link
//!
//! Manages two serial modem links (acoustic and light) from one process:
//! persisted per-link settings, safe live reconfiguration, background
//! readers and operator-driven sends.
//!
//! # Overview
//!
//! - [`config`]: channel settings, validation and the `SETTINGS.INI` store
//! - [`serial`]: port handles, channel lifecycle, readers and enumeration
//! - [`codec`]: hex and text payload encoding
//! - [`session`]: the two-channel session the control surface drives
//! - [`console`]: the interactive menu
//!
//! # Example
//!
//! ```no_run
//! use modem_link::config::{ConfigManager, IniFileStore};
//! use modem_link::serial::{ConsoleSink, SystemDriver};
//! use modem_link::{ModemSession, ShutdownSignal};
//! use std::sync::Arc;
//!
//! let store = IniFileStore::new("SETTINGS.INI");
//! let mut session = ModemSession::new(
//!     ConfigManager::new(store),
//!     Arc::new(SystemDriver),
//!     Arc::new(ConsoleSink::new()),
//!     ShutdownSignal::new(),
//! );
//! session.load_all();
//! for (name, result) in session.open_all() {
//!     if let Err(e) = result {
//!         eprintln!("{}: {}", name, e);
//!     }
//! }
//! session.shutdown();
//! ```

pub mod codec;
pub mod config;
pub mod console;
pub mod error;
pub mod serial;
pub mod session;
pub mod shutdown;

pub use codec::Payload;
pub use config::{ChannelConfig, ChannelName};
pub use error::{ModemError, Result};
pub use session::{ChannelStatus, ModemSession};
pub use shutdown::ShutdownSignal;
