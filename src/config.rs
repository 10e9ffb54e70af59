/// Sequencer configuration - TOML file plus environment overrides
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SequencerError};
use crate::sequencer::codec;

pub const DEFAULT_CONFIG_FILE: &str = "beatgrid.toml";

const DEFAULT_PATTERN: &str = "0100001001000110001101010010001010011010110101011000100010001000";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub rows: usize,
    pub columns: usize,
    pub beat_interval_ms: u64,
    /// Row-major `0`/`1` string, `rows * columns` long.
    pub default_pattern: String,
    /// One sound per row, top to bottom.
    pub voice_sound_ids: Vec<String>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            rows: 4,
            columns: 16,
            beat_interval_ms: 125,
            default_pattern: DEFAULT_PATTERN.into(),
            voice_sound_ids: vec![
                "sounds/snare_drum.wav".into(),
                "sounds/mid_tom.wav".into(),
                "sounds/low_tom.wav".into(),
                "sounds/bass_drum.wav".into(),
            ],
        }
    }
}

impl SequencerConfig {
    pub fn beat_interval(&self) -> Duration {
        Duration::from_millis(self.beat_interval_ms)
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.columns
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.columns == 0 {
            return Err(SequencerError::InvalidConfig(format!(
                "grid must have at least one row and column, got {}x{}",
                self.rows, self.columns
            )));
        }
        if self.beat_interval_ms == 0 {
            return Err(SequencerError::InvalidConfig(
                "beat_interval_ms must be positive".into(),
            ));
        }
        if self.voice_sound_ids.len() != self.rows {
            return Err(SequencerError::InvalidConfig(format!(
                "{} rows need {} voice sounds, got {}",
                self.rows,
                self.rows,
                self.voice_sound_ids.len()
            )));
        }
        self.default_cells().map(|_| ())
    }

    pub fn default_cells(&self) -> Result<Vec<bool>> {
        let cells = codec::parse_bits(&self.default_pattern).ok_or_else(|| {
            SequencerError::InvalidConfig("default_pattern may only contain 0 and 1".into())
        })?;
        if cells.len() != self.cell_count() {
            return Err(SequencerError::InvalidConfig(format!(
                "default_pattern has {} cells, grid needs {}",
                cells.len(),
                self.cell_count()
            )));
        }
        Ok(cells)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("BEATGRID_BEAT_INTERVAL_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.beat_interval_ms = parsed;
            }
        }
        if let Some(v) = var("BEATGRID_DEFAULT_PATTERN") {
            self.default_pattern = v;
        }
        if let Some(dir) = var("BEATGRID_SOUNDS_DIR") {
            let dir = PathBuf::from(dir);
            for id in &mut self.voice_sound_ids {
                if Path::new(id.as_str()).is_relative() {
                    *id = dir.join(id.as_str()).to_string_lossy().into_owned();
                }
            }
        }
    }
}

pub fn parse_config(raw: &str) -> Result<SequencerConfig> {
    Ok(toml::from_str(raw)?)
}

/// Load the config file if it exists, apply environment overrides, validate.
///
/// An explicitly named file must exist; the default file is optional.
pub fn load_config(path: Option<&Path>) -> Result<SequencerConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(SequencerError::ConfigIo)?;
            parse_config(&raw)?
        }
        None => match fs::read_to_string(DEFAULT_CONFIG_FILE) {
            Ok(raw) => parse_config(&raw)?,
            Err(_) => SequencerConfig::default(),
        },
    };

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
