//! Settings storage
//!
//! A [`ConfigStore`] holds a whole [`StoreDocument`]: an ordered list of
//! sections, each an ordered list of `key=value` entries. Documents are
//! always read and written whole; the manager never writes a single section.

use log::debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Settings file name, placed beside the executable
pub const SETTINGS_FILE_NAME: &str = "SETTINGS.INI";

/// Settings storage failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered `(section, key) -> value` mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreDocument {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl StoreDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value; the first occurrence of a key wins
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .and_then(|(_, entries)| entries.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.as_str())
    }

    /// Check whether a section header exists
    pub fn has_section(&self, section: &str) -> bool {
        self.sections.iter().any(|(name, _)| name == section)
    }

    /// Set a value, creating the section if needed
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        let index = match self.sections.iter().position(|(name, _)| name == section) {
            Some(index) => index,
            None => {
                self.sections.push((section.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        };
        let entries = &mut self.sections[index].1;
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key.to_string(), value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Parse INI-style text.
    ///
    /// Lines outside a section, comments (`;`, `#`) and lines without `=`
    /// are ignored.
    pub fn parse(content: &str) -> Self {
        let mut doc = Self::new();
        let mut current: Option<usize> = None;

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
                continue;
            }

            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let name = trimmed[1..trimmed.len() - 1].trim().to_string();
                current = Some(match doc.sections.iter().position(|(n, _)| *n == name) {
                    Some(index) => index,
                    None => {
                        doc.sections.push((name, Vec::new()));
                        doc.sections.len() - 1
                    }
                });
                continue;
            }

            let (Some(index), Some((key, value))) = (current, trimmed.split_once('=')) else {
                continue;
            };
            let key = key.trim();
            let entries = &mut doc.sections[index].1;
            if !entries.iter().any(|(k, _)| k == key) {
                entries.push((key.to_string(), value.trim().to_string()));
            }
        }

        doc
    }

    /// Render as INI-style text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, (name, entries)) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", name));
            for (key, value) in entries {
                out.push_str(&format!("{}={}\n", key, value));
            }
        }
        out
    }
}

/// Persistent settings storage
pub trait ConfigStore: Send {
    /// Read the whole document; `Ok(None)` when nothing has been stored yet
    fn load(&self) -> Result<Option<StoreDocument>, StoreError>;

    /// Replace the whole document
    fn persist(&self, doc: &StoreDocument) -> Result<(), StoreError>;
}

/// INI file backed store
#[derive(Debug, Clone)]
pub struct IniFileStore {
    path: PathBuf,
}

impl IniFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `SETTINGS.INI` in the directory holding the executable
    pub fn beside_executable() -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self::new(dir.join(SETTINGS_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, content: &str) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ConfigStore for IniFileStore {
    fn load(&self) -> Result<Option<StoreDocument>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(StoreDocument::parse(&content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }

    fn persist(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        debug!("Writing settings to {}", self.path.display());
        self.write_atomically(&doc.render())
            .map_err(|source| StoreError::Write {
                path: self.path.display().to_string(),
                source,
            })
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store with failure injection for manager tests

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct MemoryState {
        pub doc: Option<StoreDocument>,
        pub fail_reads: bool,
        pub fail_writes: bool,
        pub writes: usize,
    }

    #[derive(Debug, Clone, Default)]
    pub struct MemoryStore {
        pub state: Arc<Mutex<MemoryState>>,
    }

    impl MemoryStore {
        pub fn with_text(content: &str) -> Self {
            let store = Self::default();
            store.state.lock().unwrap().doc = Some(StoreDocument::parse(content));
            store
        }

        pub fn writes(&self) -> usize {
            self.state.lock().unwrap().writes
        }

        pub fn doc(&self) -> Option<StoreDocument> {
            self.state.lock().unwrap().doc.clone()
        }
    }

    fn injected() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "injected failure")
    }

    impl ConfigStore for MemoryStore {
        fn load(&self) -> Result<Option<StoreDocument>, StoreError> {
            let state = self.state.lock().unwrap();
            if state.fail_reads {
                return Err(StoreError::Read {
                    path: "memory".to_string(),
                    source: injected(),
                });
            }
            Ok(state.doc.clone())
        }

        fn persist(&self, doc: &StoreDocument) -> Result<(), StoreError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_writes {
                return Err(StoreError::Write {
                    path: "memory".to_string(),
                    source: injected(),
                });
            }
            state.doc = Some(doc.clone());
            state.writes += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_sections() {
        let content = r#"
; modem settings
[AcousticModem]
Port=COM4
BaudRate = 9600

[LightModem]
Port=COM6
garbage line
"#;
        let doc = StoreDocument::parse(content);
        assert_eq!(doc.get("AcousticModem", "Port"), Some("COM4"));
        assert_eq!(doc.get("AcousticModem", "BaudRate"), Some("9600"));
        assert_eq!(doc.get("LightModem", "Port"), Some("COM6"));
        assert_eq!(doc.get("LightModem", "BaudRate"), None);
        assert!(!doc.has_section("Other"));
    }

    #[test]
    fn test_first_occurrence_wins() {
        let doc = StoreDocument::parse("[A]\nPort=COM1\nPort=COM2\n");
        assert_eq!(doc.get("A", "Port"), Some("COM1"));
    }

    #[test]
    fn test_keys_outside_sections_are_ignored() {
        let doc = StoreDocument::parse("Port=COM1\n[A]\nBaudRate=9600\n");
        assert_eq!(doc.get("A", "Port"), None);
        assert_eq!(doc.get("A", "BaudRate"), Some("9600"));
    }

    #[test]
    fn test_render_preserves_order() {
        let mut doc = StoreDocument::new();
        doc.set("AcousticModem", "Port", "COM4");
        doc.set("AcousticModem", "BaudRate", "115200");
        doc.set("LightModem", "Port", "COM6");
        doc.set("AcousticModem", "Port", "COM5");
        assert_eq!(
            doc.render(),
            "[AcousticModem]\nPort=COM5\nBaudRate=115200\n\n[LightModem]\nPort=COM6\n"
        );
    }

    #[test]
    fn test_file_store_missing_file() {
        let dir = tempdir().unwrap();
        let store = IniFileStore::new(dir.path().join(SETTINGS_FILE_NAME));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_persist_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let store = IniFileStore::new(&path);

        let mut doc = StoreDocument::new();
        doc.set("LightModem", "Port", "COM6");
        doc.set("LightModem", "Parity", "2");
        store.persist(&doc).unwrap();

        assert_eq!(store.load().unwrap(), Some(doc));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[LightModem]\nPort=COM6\nParity=2\n"
        );

        // No temporary files are left behind
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_file_store_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "[Old]\nKey=1\n").unwrap();

        let store = IniFileStore::new(&path);
        let mut doc = StoreDocument::new();
        doc.set("New", "Key", "2");
        store.persist(&doc).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!(!loaded.has_section("Old"));
        assert_eq!(loaded.get("New", "Key"), Some("2"));
    }

    #[test]
    fn test_file_store_write_failure() {
        let dir = tempdir().unwrap();
        let store = IniFileStore::new(dir.path().join("missing").join(SETTINGS_FILE_NAME));
        let err = store.persist(&StoreDocument::new()).unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }
}
