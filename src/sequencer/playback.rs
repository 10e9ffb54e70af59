/// Beat clock - gates scan cursor advancement on elapsed wall-clock time
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::Grid;

/// Column currently being read for playback. Always below `columns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    column: usize,
    columns: usize,
}

impl ScanCursor {
    pub fn new(columns: usize) -> Self {
        Self {
            column: 0,
            columns: columns.max(1),
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn advance(&mut self) -> usize {
        self.column = (self.column + 1) % self.columns;
        self.column
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockState {
    Idle,
    Running { last_tick: Instant },
}

/// One cursor advancement and the voices active in the new column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub column: usize,
    pub active_rows: Vec<usize>,
}

/// Frame-driven clock.
///
/// The host calls `poll` from its per-frame callback, which may fire much more
/// often than the beat interval. At most one advancement happens per poll and the
/// tick time becomes the poll time, so a late frame shifts the grid rather than
/// replaying the missed beats.
#[derive(Debug, Clone)]
pub struct BeatClock {
    interval: Duration,
    cursor: ScanCursor,
    state: ClockState,
}

impl BeatClock {
    pub fn new(interval: Duration, columns: usize) -> Self {
        Self {
            interval,
            cursor: ScanCursor::new(columns),
            state: ClockState::Idle,
        }
    }

    pub fn cursor(&self) -> ScanCursor {
        self.cursor
    }

    /// Idle -> Running. Later calls are ignored; the clock never stops.
    pub fn start(&mut self, now: Instant) {
        if let ClockState::Idle = self.state {
            self.state = ClockState::Running { last_tick: now };
        }
    }

    pub fn poll(&mut self, now: Instant, grid: &Grid) -> Option<Tick> {
        let ClockState::Running { last_tick } = self.state else {
            return None;
        };

        if now.saturating_duration_since(last_tick) < self.interval {
            return None;
        }

        let column = self.cursor.advance();
        self.state = ClockState::Running { last_tick: now };

        let active_rows = match grid.column_slice(column) {
            Ok(slice) => slice
                .iter()
                .enumerate()
                .filter_map(|(row, &on)| on.then_some(row))
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!("cursor and grid disagree on width: {}", e);
                Vec::new()
            }
        };

        debug!(column, active = active_rows.len(), "beat");
        Some(Tick {
            column,
            active_rows,
        })
    }
}
