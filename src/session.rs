//! The two-modem session
//!
//! [`ModemSession`] owns the configuration manager, both channels and their
//! reader threads. The control surface drives everything through it; reader
//! threads only ever see their own channel and the shutdown signal.

use crate::codec::Payload;
use crate::config::{ChannelConfig, ChannelName, ConfigManager, LoadReport};
use crate::error::{ModemError, Result};
use crate::serial::link::READ_TIMEOUT;
use crate::serial::{Channel, MessageSink, ReaderExit, ReaderLoop, SerialDriver};
use crate::shutdown::ShutdownSignal;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Snapshot of one channel for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub name: ChannelName,
    pub config: ChannelConfig,
    pub open: bool,
}

pub struct ModemSession {
    config: ConfigManager,
    driver: Arc<dyn SerialDriver>,
    channels: HashMap<ChannelName, Arc<Channel>>,
    readers: HashMap<ChannelName, JoinHandle<ReaderExit>>,
    shutdown: ShutdownSignal,
    sink: Arc<dyn MessageSink>,
    read_timeout: Duration,
}

impl ModemSession {
    /// Create a session with both channels closed
    pub fn new(
        config: ConfigManager,
        driver: Arc<dyn SerialDriver>,
        sink: Arc<dyn MessageSink>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let mut session = Self {
            config,
            driver,
            channels: HashMap::new(),
            readers: HashMap::new(),
            shutdown,
            sink,
            read_timeout: READ_TIMEOUT,
        };
        session.rebuild_channels();
        session
    }

    /// Use a different bounded read wait. Call before opening channels.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self.rebuild_channels();
        self
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn channel(&self, name: ChannelName) -> &Arc<Channel> {
        &self.channels[&name]
    }

    /// Load both configurations and stage them on closed channels
    pub fn load_all(&mut self) -> LoadReport {
        if let Err(e) = self.config.ensure_exists() {
            warn!("Could not create default settings: {}", e);
        }
        let report = self.config.load_all();

        for name in ChannelName::ALL {
            if !self.channel(name).stage(self.config.get(name).clone()) {
                debug!("{} is open; keeping its applied configuration", name);
            }
        }
        report
    }

    /// Open every closed channel and start its reader
    pub fn open_all(&mut self) -> Vec<(ChannelName, Result<()>)> {
        ChannelName::ALL
            .into_iter()
            .map(|name| (name, self.reopen(name)))
            .collect()
    }

    /// Open a closed channel with its current configuration
    pub fn reopen(&mut self, name: ChannelName) -> Result<()> {
        self.channel(name).open()?;
        self.ensure_reader(name);
        Ok(())
    }

    /// Switch a channel to a new configuration.
    ///
    /// The new port is opened before the old one is released; on failure the
    /// channel and the stored settings are left as they were.
    pub fn reconfigure(&mut self, name: ChannelName, cfg: ChannelConfig) -> Result<ChannelConfig> {
        let applied = self.channel(name).reconfigure(cfg)?;
        info!("{} now on {} at {} baud", name, applied.port, applied.baud_rate);

        if let Err(e) = self.config.update(name, applied.clone()) {
            warn!("{} settings applied but not saved: {}", name, e);
        }
        self.ensure_reader(name);
        Ok(applied)
    }

    /// Encode and transmit a payload
    pub fn send(&self, name: ChannelName, payload: &Payload) -> Result<usize> {
        let channel = self.channel(name);
        if !channel.is_open() {
            return Err(ModemError::NotOpen(name));
        }
        let bytes = payload.to_bytes()?;
        channel.write(&bytes)
    }

    /// Close a channel and wait for its reader to notice
    pub fn close(&mut self, name: ChannelName) {
        self.channel(name).close();
        self.join_reader(name);
    }

    pub fn status(&self) -> Vec<ChannelStatus> {
        ChannelName::ALL
            .into_iter()
            .map(|name| {
                let channel = self.channel(name);
                ChannelStatus {
                    name,
                    config: channel.config(),
                    open: channel.is_open(),
                }
            })
            .collect()
    }

    /// Stop readers, then release both handles. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.shutdown.trigger();
        for name in ChannelName::ALL {
            self.join_reader(name);
        }
        for channel in self.channels.values() {
            channel.close();
        }
    }

    fn rebuild_channels(&mut self) {
        for name in ChannelName::ALL {
            let channel = Channel::new(name, self.config.get(name).clone(), Arc::clone(&self.driver))
                .with_read_timeout(self.read_timeout);
            self.channels.insert(name, Arc::new(channel));
        }
    }

    /// Start a reader unless one is already running
    fn ensure_reader(&mut self, name: ChannelName) {
        if let Some(handle) = self.readers.get(&name) {
            if !handle.is_finished() {
                return;
            }
            self.join_reader(name);
        }

        let reader = ReaderLoop::new(
            Arc::clone(self.channel(name)),
            self.shutdown.clone(),
            Arc::clone(&self.sink),
        );
        match reader.spawn() {
            Ok(handle) => {
                self.readers.insert(name, handle);
            }
            Err(e) => error!("Failed to start {} reader: {}", name, e),
        }
    }

    fn join_reader(&mut self, name: ChannelName) {
        if let Some(handle) = self.readers.remove(&name) {
            match handle.join() {
                Ok(exit) => debug!("{} reader joined ({:?})", name, exit),
                Err(_) => error!("{} reader panicked", name),
            }
        }
    }
}

impl Drop for ModemSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;
    use crate::config::store::memory::MemoryStore;
    use crate::serial::mock::{test_port, MockDriver};

    struct NullSink;

    impl MessageSink for NullSink {
        fn on_received(&self, _channel: ChannelName, _data: &[u8]) {}
    }

    fn new_session(driver: &MockDriver, store: &MemoryStore) -> ModemSession {
        ModemSession::new(
            ConfigManager::new(store.clone()),
            Arc::new(driver.clone()),
            Arc::new(NullSink),
            ShutdownSignal::new(),
        )
        .with_read_timeout(Duration::from_millis(10))
    }

    fn driver_with_default_ports() -> MockDriver {
        let driver = MockDriver::new();
        for name in ChannelName::ALL {
            driver.add_port(name.default_port());
        }
        driver
    }

    #[test]
    fn test_load_and_open_all() {
        let driver = driver_with_default_ports();
        let store = MemoryStore::default();
        let mut session = new_session(&driver, &store);

        let report = session.load_all();
        assert!(!report.store_absent);
        assert_eq!(store.writes(), 1);
        let results = session.open_all();
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(session.status().iter().all(|s| s.open));
        assert_eq!(driver.live_handles(), 2);

        session.shutdown();
        assert_eq!(driver.live_handles(), 0);
        assert!(session.status().iter().all(|s| !s.open));
    }

    #[test]
    fn test_open_all_reports_each_channel() {
        let driver = MockDriver::new();
        driver.add_port(ChannelName::Light.default_port());
        let store = MemoryStore::default();
        let mut session = new_session(&driver, &store);

        session.load_all();
        let results: HashMap<_, _> = session.open_all().into_iter().collect();
        assert!(matches!(
            results[&ChannelName::Acoustic],
            Err(ModemError::PortOpenFailed { .. })
        ));
        assert!(results[&ChannelName::Light].is_ok());
    }

    #[test]
    fn test_send_hex_and_text() {
        let driver = driver_with_default_ports();
        let store = MemoryStore::default();
        let mut session = new_session(&driver, &store);
        session.load_all();
        session.open_all();

        let sent = session
            .send(ChannelName::Acoustic, &Payload::Hex("41 42 43".to_string()))
            .unwrap();
        assert_eq!(sent, 3);
        session
            .send(ChannelName::Acoustic, &Payload::Text("!".to_string()))
            .unwrap();
        assert_eq!(
            driver.written(ChannelName::Acoustic.default_port()),
            b"ABC!".to_vec()
        );
    }

    #[test]
    fn test_invalid_hex_is_not_sent() {
        let driver = driver_with_default_ports();
        let store = MemoryStore::default();
        let mut session = new_session(&driver, &store);
        session.load_all();
        session.open_all();

        let err = session
            .send(ChannelName::Light, &Payload::Hex("zz".to_string()))
            .unwrap_err();
        assert!(matches!(err, ModemError::Encoding(CodecError::InvalidPair { .. })));
        assert!(driver.written(ChannelName::Light.default_port()).is_empty());
    }

    #[test]
    fn test_send_to_closed_channel() {
        let driver = driver_with_default_ports();
        let store = MemoryStore::default();
        let mut session = new_session(&driver, &store);
        session.load_all();

        let err = session
            .send(ChannelName::Light, &Payload::Hex("00".to_string()))
            .unwrap_err();
        assert!(matches!(err, ModemError::NotOpen(ChannelName::Light)));
    }

    #[test]
    fn test_failed_reconfigure_keeps_live_and_stored_settings() {
        let driver = driver_with_default_ports();
        let store = MemoryStore::default();
        let mut session = new_session(&driver, &store);
        session.load_all();
        session.open_all();
        let stored = store.doc();
        let before = session.channel(ChannelName::Acoustic).config();

        let cfg = ChannelConfig::new(ChannelName::Acoustic, &test_port(7)).with_baud_rate(9600);
        let err = session.reconfigure(ChannelName::Acoustic, cfg).unwrap_err();
        assert!(matches!(err, ModemError::PortOpenFailed { .. }));

        assert_eq!(session.channel(ChannelName::Acoustic).config(), before);
        assert!(session.channel(ChannelName::Acoustic).is_open());
        assert_eq!(store.doc(), stored);
    }

    #[test]
    fn test_reconfigure_persists_new_settings() {
        let driver = driver_with_default_ports();
        driver.add_port(&test_port(3));
        let store = MemoryStore::default();
        let mut session = new_session(&driver, &store);
        session.load_all();
        session.open_all();

        let cfg = ChannelConfig::new(ChannelName::Light, &test_port(3)).with_baud_rate(38400);
        session.reconfigure(ChannelName::Light, cfg).unwrap();

        let doc = store.doc().unwrap();
        assert_eq!(doc.get("LightModem", "Port"), Some(test_port(3).as_str()));
        assert_eq!(doc.get("LightModem", "BaudRate"), Some("38400"));
        assert_eq!(
            doc.get("AcousticModem", "Port"),
            Some(ChannelName::Acoustic.default_port())
        );
        assert_eq!(session.config().get(ChannelName::Light).baud_rate, 38400);
        assert_eq!(driver.live_handles(), 2);
    }

    #[test]
    fn test_reconfigure_opens_closed_channel() {
        let driver = MockDriver::new();
        driver.add_port(&test_port(4));
        let store = MemoryStore::default();
        let mut session = new_session(&driver, &store);
        session.load_all();
        session.open_all();
        assert!(!session.channel(ChannelName::Acoustic).is_open());

        let cfg = ChannelConfig::new(ChannelName::Acoustic, &test_port(4));
        session.reconfigure(ChannelName::Acoustic, cfg).unwrap();
        assert!(session.channel(ChannelName::Acoustic).is_open());
    }

    #[test]
    fn test_close_and_reopen() {
        let driver = driver_with_default_ports();
        let store = MemoryStore::default();
        let mut session = new_session(&driver, &store);
        session.load_all();
        session.open_all();

        session.close(ChannelName::Acoustic);
        assert!(!session.channel(ChannelName::Acoustic).is_open());
        assert!(session.channel(ChannelName::Light).is_open());
        assert_eq!(driver.live_handles(), 1);

        session.reopen(ChannelName::Acoustic).unwrap();
        assert!(session.channel(ChannelName::Acoustic).is_open());
        assert_eq!(driver.live_handles(), 2);
    }

    #[test]
    fn test_drop_releases_everything() {
        let driver = driver_with_default_ports();
        let store = MemoryStore::default();
        {
            let mut session = new_session(&driver, &store);
            session.load_all();
            session.open_all();
        }
        assert_eq!(driver.live_handles(), 0);
    }
}
