//! Loading and persisting the two channel configurations
//!
//! The settings file always holds both channel sections. Fields missing from
//! the file are filled with defaults, invalid ones are repaired, and in either
//! case the whole file is rewritten so disk matches memory. Store failures
//! never abort: the manager keeps working from in-memory defaults.

use super::store::{ConfigStore, StoreDocument, StoreError};
use super::{validate, ChannelConfig, ChannelName, Parity, StopBits};
use super::{is_allowed_baud_rate, is_platform_port_name};
use log::{debug, info, warn};
use serde::Serialize;

const KEY_PORT: &str = "Port";
const KEY_BAUD_RATE: &str = "BaudRate";
const KEY_BYTE_SIZE: &str = "ByteSize";
const KEY_STOP_BITS: &str = "StopBits";
const KEY_PARITY: &str = "Parity";

/// Configurations of both channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModemSettings {
    pub acoustic: ChannelConfig,
    pub light: ChannelConfig,
}

impl Default for ModemSettings {
    fn default() -> Self {
        Self {
            acoustic: ChannelConfig::defaults(ChannelName::Acoustic),
            light: ChannelConfig::defaults(ChannelName::Light),
        }
    }
}

impl ModemSettings {
    pub fn get(&self, name: ChannelName) -> &ChannelConfig {
        match name {
            ChannelName::Acoustic => &self.acoustic,
            ChannelName::Light => &self.light,
        }
    }

    /// Replace the slot named by the configuration
    pub fn set(&mut self, cfg: ChannelConfig) {
        match cfg.name() {
            ChannelName::Acoustic => self.acoustic = cfg,
            ChannelName::Light => self.light = cfg,
        }
    }

    /// Repair both slots
    pub fn validated(self) -> Self {
        Self {
            acoustic: validate(self.acoustic, ChannelName::Acoustic),
            light: validate(self.light, ChannelName::Light),
        }
    }

    /// Render both sections for the store
    pub fn to_document(&self) -> StoreDocument {
        let mut doc = StoreDocument::new();
        for name in ChannelName::ALL {
            let cfg = self.get(name);
            let section = name.section();
            doc.set(section, KEY_PORT, cfg.port.clone());
            doc.set(section, KEY_BAUD_RATE, cfg.baud_rate.to_string());
            doc.set(section, KEY_BYTE_SIZE, cfg.data_bits.to_string());
            doc.set(section, KEY_STOP_BITS, cfg.stop_bits.code().to_string());
            doc.set(section, KEY_PARITY, cfg.parity.code().to_string());
        }
        doc
    }
}

/// What happened while reading the settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Fields absent from the store, filled with defaults
    pub defaulted: Vec<(ChannelName, &'static str)>,
    /// Fields present but unusable, replaced with defaults
    pub repaired: Vec<(ChannelName, &'static str)>,
    /// Nothing was stored yet
    pub store_absent: bool,
    /// The store could not be read; defaults are in use
    pub store_error: Option<String>,
    /// The settings were written back to the store
    pub persisted: bool,
}

impl LoadReport {
    /// Whether the stored document differs from what was loaded
    pub fn needs_persist(&self) -> bool {
        self.store_error.is_none()
            && (self.store_absent || !self.defaulted.is_empty() || !self.repaired.is_empty())
    }
}

/// Owner of the two channel configuration slots
pub struct ConfigManager {
    store: Box<dyn ConfigStore>,
    settings: ModemSettings,
}

impl ConfigManager {
    /// Create a manager holding default settings until [`load_all`] runs
    ///
    /// [`load_all`]: ConfigManager::load_all
    pub fn new(store: impl ConfigStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            settings: ModemSettings::default(),
        }
    }

    /// Current in-memory settings
    pub fn settings(&self) -> &ModemSettings {
        &self.settings
    }

    pub fn get(&self, name: ChannelName) -> &ChannelConfig {
        self.settings.get(name)
    }

    /// Write a default settings file if none exists yet.
    ///
    /// Returns whether a file was created.
    pub fn ensure_exists(&self) -> Result<bool, StoreError> {
        if self.store.load()?.is_some() {
            return Ok(false);
        }
        info!("No settings found, writing defaults");
        self.store.persist(&ModemSettings::default().to_document())?;
        Ok(true)
    }

    /// Load both channels, re-persisting when anything was defaulted
    pub fn load_all(&mut self) -> LoadReport {
        let (settings, mut report) = self.read_full();
        self.settings = settings;

        if report.needs_persist() {
            match self.store.persist(&self.settings.to_document()) {
                Ok(()) => {
                    info!(
                        "Settings rewritten ({} defaulted, {} repaired)",
                        report.defaulted.len(),
                        report.repaired.len()
                    );
                    report.persisted = true;
                }
                Err(e) => warn!("Could not rewrite settings: {}", e),
            }
        }

        report
    }

    /// Load one channel's configuration
    pub fn load(&mut self, name: ChannelName) -> ChannelConfig {
        self.load_all();
        self.settings.get(name).clone()
    }

    /// Persist one channel's configuration, keeping the sibling section.
    ///
    /// Both slots are validated before the whole document is written.
    pub fn save(&mut self, cfg: ChannelConfig, name: ChannelName) -> Result<(), StoreError> {
        let (stored, report) = self.read_full();
        let mut full = match report.store_error {
            Some(_) => self.settings.clone(),
            None => stored,
        };
        full.set(validate(cfg, name));
        let full = full.validated();

        self.store.persist(&full.to_document())?;
        debug!("Saved {} settings", name);
        self.settings = full;
        Ok(())
    }

    /// Replace a channel's configuration in memory and persist it.
    ///
    /// The in-memory slot is updated even if persisting fails.
    pub fn update(&mut self, name: ChannelName, cfg: ChannelConfig) -> Result<ChannelConfig, StoreError> {
        let cfg = validate(cfg, name);
        self.settings.set(cfg.clone());
        self.save(cfg.clone(), name)?;
        Ok(cfg)
    }

    /// Read both sections without writing anything back
    fn read_full(&self) -> (ModemSettings, LoadReport) {
        let mut report = LoadReport::default();

        let doc = match self.store.load() {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                report.store_absent = true;
                StoreDocument::new()
            }
            Err(e) => {
                warn!("{}; using default settings", e);
                report.store_error = Some(e.to_string());
                return (ModemSettings::default(), report);
            }
        };

        let settings = ModemSettings {
            acoustic: decode_section(&doc, ChannelName::Acoustic, &mut report),
            light: decode_section(&doc, ChannelName::Light, &mut report),
        };
        (settings, report)
    }
}

/// Decode one section, tracking which fields were missing or invalid
fn decode_section(doc: &StoreDocument, name: ChannelName, report: &mut LoadReport) -> ChannelConfig {
    let mut cfg = ChannelConfig::defaults(name);

    if let Some(port) = lookup(doc, name, KEY_PORT, report) {
        if is_platform_port_name(&port) {
            cfg.port = port;
        } else {
            report.repaired.push((name, KEY_PORT));
        }
    }

    if let Some(value) = lookup(doc, name, KEY_BAUD_RATE, report) {
        match value.parse::<u32>() {
            Ok(baud) if is_allowed_baud_rate(baud) => cfg.baud_rate = baud,
            _ => report.repaired.push((name, KEY_BAUD_RATE)),
        }
    }

    if let Some(value) = lookup(doc, name, KEY_BYTE_SIZE, report) {
        match value.parse::<i64>().ok().and_then(|v| u32::try_from(v).ok()) {
            Some(bits) if bits > 0 => cfg.data_bits = bits,
            _ => report.repaired.push((name, KEY_BYTE_SIZE)),
        }
    }

    if let Some(value) = lookup(doc, name, KEY_STOP_BITS, report) {
        match value.parse::<i64>().ok().and_then(StopBits::from_code) {
            Some(stop_bits) => cfg.stop_bits = stop_bits,
            None => report.repaired.push((name, KEY_STOP_BITS)),
        }
    }

    if let Some(value) = lookup(doc, name, KEY_PARITY, report) {
        match value.parse::<i64>().ok().and_then(Parity::from_code) {
            Some(parity) => cfg.parity = parity,
            None => report.repaired.push((name, KEY_PARITY)),
        }
    }

    validate(cfg, name)
}

/// Fetch a raw value, recording it as defaulted when absent
fn lookup(
    doc: &StoreDocument,
    name: ChannelName,
    key: &'static str,
    report: &mut LoadReport,
) -> Option<String> {
    let value = doc.get(name.section(), key).map(str::to_string);
    if value.is_none() {
        report.defaulted.push((name, key));
    }
    value
}
