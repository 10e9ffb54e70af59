/// Pattern persistence - keeps the shareable token in an external store
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{info, warn};

use super::codec;
use crate::error::{Result, SequencerError};

/// Somewhere a single pattern token lives outside the process.
pub trait FragmentStore {
    fn read(&mut self) -> Option<String>;
    fn write(&mut self, token: &str) -> io::Result<()>;
    /// Return the new token if the store was changed by someone else since the
    /// last read or write.
    fn poll_change(&mut self) -> Option<String>;
}

/// In-process store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    token: Option<String>,
    external: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            external: None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Simulate an out-of-band edit, e.g. a pasted link.
    pub fn set_external(&mut self, token: impl Into<String>) {
        self.external = Some(token.into());
    }
}

impl FragmentStore for MemoryStore {
    fn read(&mut self) -> Option<String> {
        self.token.clone()
    }

    fn write(&mut self, token: &str) -> io::Result<()> {
        self.token = Some(token.to_string());
        Ok(())
    }

    fn poll_change(&mut self) -> Option<String> {
        let token = self.external.take()?;
        self.token = Some(token.clone());
        Some(token)
    }
}

/// Token kept in a text file. Any content that differs from what this process
/// last read or wrote counts as an external change. A missing file is an empty
/// store; an unreadable one is reported once and otherwise left alone.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    last_seen: Option<String>,
    read_failing: bool,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_seen: None,
            read_failing: false,
        }
    }

    /// `Ok(None)` when the file does not exist. Any other read error is logged
    /// once per failing stretch and returned.
    fn read_file(&mut self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => {
                self.read_failing = false;
                Ok(Some(s.trim().to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.read_failing = false;
                Ok(None)
            }
            Err(e) => {
                if !self.read_failing {
                    warn!("cannot read pattern file {}: {}", self.path.display(), e);
                }
                self.read_failing = true;
                Err(e)
            }
        }
    }
}

impl FragmentStore for FileStore {
    fn read(&mut self) -> Option<String> {
        let token = self.read_file().ok()??;
        self.last_seen = Some(token.clone());
        Some(token)
    }

    fn write(&mut self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, format!("{}\n", token))?;
        self.last_seen = Some(token.to_string());
        Ok(())
    }

    fn poll_change(&mut self) -> Option<String> {
        let current = self.read_file().ok()?;
        if current == self.last_seen {
            return None;
        }
        self.last_seen = current.clone();
        Some(current.unwrap_or_default())
    }
}

/// Strip the `#` a pasted link fragment carries, and surrounding whitespace.
pub fn normalize_token(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix('#').unwrap_or(trimmed).trim()
}

/// Normalize a token supplied from outside and check it decodes for
/// `cell_count` cells. An empty token is valid and means the default pattern.
pub fn validated_token(raw: &str, cell_count: usize) -> Result<&str> {
    let token = normalize_token(raw);
    if !token.is_empty() {
        codec::decode(token, cell_count)?;
    }
    Ok(token)
}

pub struct PersistenceBridge {
    store: Box<dyn FragmentStore>,
    cell_count: usize,
    default_pattern: Vec<bool>,
}

impl PersistenceBridge {
    pub fn new(store: Box<dyn FragmentStore>, default_pattern: Vec<bool>) -> Self {
        Self {
            store,
            cell_count: default_pattern.len(),
            default_pattern,
        }
    }

    /// Decode a token, treating an empty one as "use the default".
    pub fn decode_or_default(&self, raw: &str) -> Result<Vec<bool>> {
        let token = normalize_token(raw);
        if token.is_empty() {
            return Ok(self.default_pattern.clone());
        }
        codec::decode(token, self.cell_count)
    }

    /// Startup state: the stored token if it decodes, else the default pattern.
    pub fn load(&mut self) -> Vec<bool> {
        match self.store.read() {
            Some(raw) => self.decode_with_fallback(&raw),
            None => self.default_pattern.clone(),
        }
    }

    pub fn publish(&mut self, cells: &[bool]) -> Result<String> {
        if cells.len() != self.cell_count {
            return Err(SequencerError::CellCount {
                expected: self.cell_count,
                found: cells.len(),
            });
        }
        let token = codec::encode(cells);
        self.store.write(&token).map_err(SequencerError::Store)?;
        Ok(token)
    }

    /// Cells for a token that arrived out of band. Always yields a full pattern.
    pub fn on_external_change(&mut self, raw: &str) -> Vec<bool> {
        info!("pattern changed externally");
        self.decode_with_fallback(raw)
    }

    pub fn poll_change(&mut self) -> Option<String> {
        self.store.poll_change()
    }

    fn decode_with_fallback(&self, raw: &str) -> Vec<bool> {
        match self.decode_or_default(raw) {
            Ok(cells) => cells,
            Err(e) => {
                warn!("{}; using default pattern", e);
                self.default_pattern.clone()
            }
        }
    }
}
