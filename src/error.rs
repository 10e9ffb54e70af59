/// Error types shared by the sequencer core
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("cell ({row}, {column}) is outside the {rows}x{columns} grid")]
    OutOfRange {
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    },

    #[error("expected {expected} cells, found {found}")]
    CellCount { expected: usize, found: usize },

    #[error("malformed pattern token {token:?}: {reason}")]
    MalformedToken { token: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file: {0}")]
    ConfigIo(#[source] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("pattern store failed: {0}")]
    Store(#[source] std::io::Error),
}

impl SequencerError {
    pub fn malformed(token: &str, reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SequencerError>;
