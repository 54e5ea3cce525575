//! Channel lifecycle
//!
//! A [`Channel`] is either `Closed` or `Open` with exactly one handle. All
//! handle access (open, close, reconfigure, read, write) goes through the
//! channel's mutex, so the reader thread and the control thread never touch
//! the handle at the same time.
//!
//! Opening is all-or-nothing: [`LinkBuilder`] runs every configuration step
//! on a fresh handle and only hands back an [`OpenLink`] when all of them
//! succeeded. Reconfiguration builds that link before touching the live
//! channel, so a failed probe leaves the working connection as it was.

use super::link::{
    data_bits_setting, EventMask, FlowPolicy, LinkHandle, SerialDriver, SpecialChars,
    QUEUE_SIZE, READ_TIMEOUT,
};
use crate::config::{self, ChannelConfig, ChannelName};
use crate::error::{ModemError, Result};
use log::{debug, info, warn};
use std::fmt;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Configuration steps run after acquiring a handle, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureStep {
    QueueSizes,
    ReadTimeout,
    EventMask,
    GetLineControl,
    SetLineControl,
    SpecialChars,
    FlowControl,
    Purge,
}

impl fmt::Display for ConfigureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            ConfigureStep::QueueSizes => "setting queue sizes",
            ConfigureStep::ReadTimeout => "setting read timeout",
            ConfigureStep::EventMask => "setting event mask",
            ConfigureStep::GetLineControl => "reading line control",
            ConfigureStep::SetLineControl => "applying line control",
            ConfigureStep::SpecialChars => "setting special characters",
            ConfigureStep::FlowControl => "setting flow control",
            ConfigureStep::Purge => "purging queues",
        };
        f.write_str(step)
    }
}

/// A fully configured handle together with the configuration it applies
pub struct OpenLink {
    config: ChannelConfig,
    handle: Box<dyn LinkHandle>,
}

impl OpenLink {
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

/// Opens and configures a handle for one configuration
pub struct LinkBuilder<'a> {
    driver: &'a dyn SerialDriver,
    config: ChannelConfig,
    read_timeout: Duration,
    special_chars: SpecialChars,
    flow_policy: FlowPolicy,
}

impl<'a> LinkBuilder<'a> {
    pub fn new(driver: &'a dyn SerialDriver, config: ChannelConfig) -> Self {
        Self {
            driver,
            config,
            read_timeout: READ_TIMEOUT,
            special_chars: SpecialChars::default(),
            flow_policy: FlowPolicy::default(),
        }
    }

    /// Set the bounded read wait
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Acquire the port and run every configuration step.
    ///
    /// On any failure the handle is dropped before returning.
    pub fn open(self) -> Result<OpenLink> {
        let port = self.config.port.clone();
        debug!("Opening {} for {}", port, self.config.name());

        let mut handle = self
            .driver
            .acquire(&port, self.config.baud_rate)
            .map_err(|source| ModemError::PortOpenFailed {
                port: port.clone(),
                source,
            })?;

        let fail = |step: ConfigureStep| {
            let port = port.clone();
            move |source: serialport::Error| ModemError::PortConfigureFailed { port, step, source }
        };

        handle
            .set_queue_sizes(QUEUE_SIZE, QUEUE_SIZE)
            .map_err(fail(ConfigureStep::QueueSizes))?;
        handle
            .set_read_timeout(self.read_timeout)
            .map_err(fail(ConfigureStep::ReadTimeout))?;
        handle
            .set_event_mask(EventMask::ERRORS)
            .map_err(fail(ConfigureStep::EventMask))?;

        let mut control = handle
            .line_control()
            .map_err(fail(ConfigureStep::GetLineControl))?;
        control.baud_rate = self.config.baud_rate;
        control.data_bits =
            data_bits_setting(self.config.data_bits).map_err(fail(ConfigureStep::SetLineControl))?;
        control.stop_bits = match self.config.stop_bits {
            config::StopBits::One => serialport::StopBits::One,
            config::StopBits::Two => serialport::StopBits::Two,
        };
        control.parity = match self.config.parity {
            config::Parity::None => serialport::Parity::None,
            config::Parity::Odd => serialport::Parity::Odd,
            config::Parity::Even => serialport::Parity::Even,
        };
        handle
            .set_line_control(&control)
            .map_err(fail(ConfigureStep::SetLineControl))?;

        handle
            .set_special_chars(&self.special_chars)
            .map_err(fail(ConfigureStep::SpecialChars))?;
        handle
            .set_flow_policy(&self.flow_policy)
            .map_err(fail(ConfigureStep::FlowControl))?;
        handle.purge().map_err(fail(ConfigureStep::Purge))?;

        info!(
            "Opened {} on {} at {} baud",
            self.config.name(),
            port,
            self.config.baud_rate
        );
        Ok(OpenLink {
            config: self.config,
            handle,
        })
    }
}

enum HandleState {
    Closed,
    Open(Box<dyn LinkHandle>),
}

struct ChannelInner {
    config: ChannelConfig,
    state: HandleState,
}

/// Result of one bounded read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes copied into the buffer; zero when the wait timed out
    Data(usize),
    /// The channel has no handle
    Closed,
}

/// One managed modem link
pub struct Channel {
    name: ChannelName,
    driver: Arc<dyn SerialDriver>,
    read_timeout: Duration,
    inner: Mutex<ChannelInner>,
}

impl Channel {
    /// Create a closed channel
    pub fn new(name: ChannelName, config: ChannelConfig, driver: Arc<dyn SerialDriver>) -> Self {
        Self {
            name,
            driver,
            read_timeout: READ_TIMEOUT,
            inner: Mutex::new(ChannelInner {
                config: config::validate(config, name),
                state: HandleState::Closed,
            }),
        }
    }

    /// Use a different bounded read wait for future opens
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn name(&self) -> ChannelName {
        self.name
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Copy of the configuration currently applied
    pub fn config(&self) -> ChannelConfig {
        self.lock().config.clone()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.lock().state, HandleState::Open(_))
    }

    /// Open with the current configuration; no-op when already open
    pub fn open(&self) -> Result<()> {
        let mut inner = self.lock();
        if matches!(inner.state, HandleState::Open(_)) {
            debug!("{} already open", self.name);
            return Ok(());
        }
        let link = self.builder(inner.config.clone()).open()?;
        inner.state = HandleState::Open(link.handle);
        Ok(())
    }

    /// Replace the configuration of a closed channel.
    ///
    /// Returns false and changes nothing when the channel is open; use
    /// [`Channel::reconfigure`] for a live switch.
    pub fn stage(&self, config: ChannelConfig) -> bool {
        let mut inner = self.lock();
        if matches!(inner.state, HandleState::Open(_)) {
            return false;
        }
        inner.config = config::validate(config, self.name);
        true
    }

    /// Release the handle; no-op when already closed
    pub fn close(&self) {
        let mut inner = self.lock();
        if let HandleState::Open(_) = std::mem::replace(&mut inner.state, HandleState::Closed) {
            info!("Closed {} ({})", self.name, inner.config.port);
        }
    }

    /// Switch to a new configuration without losing the working link.
    ///
    /// The new port is fully opened and configured first. Only then is the
    /// old handle released and the new one adopted. On failure the channel
    /// keeps its previous configuration and state.
    pub fn reconfigure(&self, config: ChannelConfig) -> Result<ChannelConfig> {
        let config = config::validate(config, self.name);
        let link = self.builder(config).open()?;
        self.adopt(link);
        Ok(self.config())
    }

    /// Swap in an already opened link
    pub fn adopt(&self, link: OpenLink) {
        let mut inner = self.lock();
        let previous = std::mem::replace(&mut inner.state, HandleState::Open(link.handle));
        if let HandleState::Open(_) = previous {
            debug!("Released previous {} handle on {}", self.name, inner.config.port);
        }
        inner.config = config::validate(link.config, self.name);
    }

    /// Builder for a shadow link of this channel
    pub fn builder(&self, config: ChannelConfig) -> LinkBuilder<'_> {
        LinkBuilder::new(self.driver.as_ref(), config::validate(config, self.name))
            .with_read_timeout(self.read_timeout)
    }

    /// Bounded read through the channel lock
    pub fn read(&self, buffer: &mut [u8]) -> Result<ReadOutcome> {
        let mut inner = self.lock();
        let HandleState::Open(handle) = &mut inner.state else {
            return Ok(ReadOutcome::Closed);
        };
        match handle.read(buffer) {
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Ok(ReadOutcome::Data(0))
            }
            Err(source) => Err(ModemError::ReadFailed {
                channel: self.name,
                source,
            }),
        }
    }

    /// Write the whole payload; the channel stays open on failure
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let mut inner = self.lock();
        let HandleState::Open(handle) = &mut inner.state else {
            return Err(ModemError::NotOpen(self.name));
        };
        handle
            .write_all(data)
            .map_err(|source| ModemError::WriteFailed {
                channel: self.name,
                source,
            })?;
        debug!("Wrote {} bytes to {}", data.len(), self.name);
        Ok(data.len())
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        // A panic while holding the lock cannot leave the state half-updated:
        // every mutation is a single assignment.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("{} channel lock was poisoned", self.name);
                poisoned.into_inner()
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}
