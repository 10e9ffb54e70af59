/// Pick handling - turns resolved (row, column) picks into grid edits
use tracing::{debug, warn};

use super::persistence::PersistenceBridge;
use super::Grid;
use crate::audio::SoundDispatcher;
use crate::error::{Result, SequencerError};

#[derive(Debug, Clone, Copy)]
pub struct InputController {
    rows: usize,
    columns: usize,
    picks: u64,
}

impl InputController {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            picks: 0,
        }
    }

    pub fn picks(&self) -> u64 {
        self.picks
    }

    /// Toggle the picked cell and publish the new token.
    ///
    /// Every pick counts as a user gesture, so audio is activated even when the
    /// coordinate is rejected. A failed publish is logged; the edit stands.
    pub fn on_pick(
        &mut self,
        row: usize,
        column: usize,
        grid: &mut Grid,
        persistence: &mut PersistenceBridge,
        dispatcher: &mut SoundDispatcher,
    ) -> Result<()> {
        dispatcher.ensure_activated();

        if row >= self.rows || column >= self.columns {
            warn!(row, column, "pick outside grid");
            return Err(SequencerError::OutOfRange {
                row,
                column,
                rows: self.rows,
                columns: self.columns,
            });
        }

        grid.toggle(row, column)?;
        self.picks += 1;

        match persistence.publish(grid.cells()) {
            Ok(token) => debug!(row, column, %token, "pattern published"),
            Err(e) => warn!("could not publish pattern: {}", e),
        }
        Ok(())
    }
}
