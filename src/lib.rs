/// beatgrid - a shareable drum step sequencer
///
/// This library provides the sequencer engine:
/// - A fixed grid of steps, one row per voice and one column per time slot
/// - A frame-driven beat clock that scans the columns
/// - Voice playback with a decoded-buffer path and a raw-resource fallback
/// - A compact hex token for persisting and sharing patterns

pub mod audio;
pub mod config;
pub mod error;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioBackend, CpalBackend, DispatchPath, SampleBuffer, SoundDispatcher};
pub use config::{load_config, SequencerConfig};
pub use error::SequencerError;
pub use sequencer::persistence::{FileStore, FragmentStore, MemoryStore, PersistenceBridge};
pub use sequencer::playback::{BeatClock, ScanCursor, Tick};
pub use sequencer::{CellState, CellView, Grid, Sequencer, SequencerEvent};
