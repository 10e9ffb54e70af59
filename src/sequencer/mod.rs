/// Core sequencer logic - step grid, session wiring and the rendering view
use std::time::Instant;

use tracing::{info, warn};

use crate::audio::{AudioBackend, DispatchPath, SoundDispatcher};
use crate::config::SequencerConfig;
use crate::error::{Result, SequencerError};

pub mod codec;
pub mod input;
pub mod persistence;
pub mod playback;

use input::InputController;
use persistence::{FragmentStore, PersistenceBridge};
use playback::{BeatClock, ScanCursor, Tick};

/// Row-major matrix of steps. `cells.len() == rows * columns` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<bool>,
    rows: usize,
    columns: usize,
}

impl Grid {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            cells: vec![false; rows * columns],
            rows,
            columns,
        }
    }

    pub fn from_cells(rows: usize, columns: usize, cells: Vec<bool>) -> Result<Self> {
        let mut grid = Self::new(rows, columns);
        grid.restore(cells)?;
        Ok(grid)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    fn index(&self, row: usize, column: usize) -> Result<usize> {
        if row >= self.rows || column >= self.columns {
            return Err(SequencerError::OutOfRange {
                row,
                column,
                rows: self.rows,
                columns: self.columns,
            });
        }
        Ok(row * self.columns + column)
    }

    pub fn get(&self, row: usize, column: usize) -> Result<bool> {
        Ok(self.cells[self.index(row, column)?])
    }

    pub fn toggle(&mut self, row: usize, column: usize) -> Result<()> {
        let i = self.index(row, column)?;
        self.cells[i] = !self.cells[i];
        Ok(())
    }

    /// Cells of one column, ordered by row.
    pub fn column_slice(&self, column: usize) -> Result<Vec<bool>> {
        if column >= self.columns {
            return Err(SequencerError::OutOfRange {
                row: 0,
                column,
                rows: self.rows,
                columns: self.columns,
            });
        }
        Ok(self
            .cells
            .iter()
            .skip(column)
            .step_by(self.columns)
            .copied()
            .collect())
    }

    pub fn snapshot(&self) -> Vec<bool> {
        self.cells.clone()
    }

    /// Replace every cell at once.
    pub fn restore(&mut self, cells: Vec<bool>) -> Result<()> {
        if cells.len() != self.rows * self.columns {
            return Err(SequencerError::CellCount {
                expected: self.rows * self.columns,
                found: cells.len(),
            });
        }
        self.cells = cells;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Active,
    Inactive,
    /// In the scanned column, whatever the step value.
    Scanned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellView {
    pub row: usize,
    pub column: usize,
    pub state: CellState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerEvent {
    ColumnScanned {
        column: usize,
        active_rows: Vec<usize>,
    },
    /// The rendering layer should repaint from `Sequencer::view`.
    Refresh,
    VoiceTriggered {
        row: usize,
        path: DispatchPath,
    },
    PatternReplaced,
}

type Listener = Box<dyn FnMut(&SequencerEvent)>;

/// One sequencer session: owns the grid and every component acting on it.
pub struct Sequencer {
    grid: Grid,
    clock: BeatClock,
    dispatcher: SoundDispatcher,
    input: InputController,
    persistence: PersistenceBridge,
    listeners: Vec<Listener>,
}

impl Sequencer {
    pub fn new(
        config: &SequencerConfig,
        store: Box<dyn FragmentStore>,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let mut persistence = PersistenceBridge::new(store, config.default_cells()?);
        let grid = Grid::from_cells(config.rows, config.columns, persistence.load())?;

        info!(
            rows = config.rows,
            columns = config.columns,
            interval_ms = config.beat_interval_ms,
            "sequencer ready"
        );

        Ok(Self {
            grid,
            clock: BeatClock::new(config.beat_interval(), config.columns),
            dispatcher: SoundDispatcher::new(backend, config.voice_sound_ids.clone()),
            input: InputController::new(config.rows, config.columns),
            persistence,
            listeners: Vec::new(),
        })
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SequencerEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: SequencerEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn cursor(&self) -> ScanCursor {
        self.clock.cursor()
    }

    pub fn dispatcher(&self) -> &SoundDispatcher {
        &self.dispatcher
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn start(&mut self, now: Instant) {
        self.clock.start(now);
        self.emit(SequencerEvent::Refresh);
    }

    /// Per-frame callback. On a beat: scanned column, repaint, then one trigger
    /// per active row in row order.
    pub fn frame(&mut self, now: Instant) -> Option<Tick> {
        self.dispatcher.pump();

        let tick = self.clock.poll(now, &self.grid)?;

        self.emit(SequencerEvent::ColumnScanned {
            column: tick.column,
            active_rows: tick.active_rows.clone(),
        });
        self.emit(SequencerEvent::Refresh);

        for &row in &tick.active_rows {
            let path = self.dispatcher.trigger(row);
            self.emit(SequencerEvent::VoiceTriggered { row, path });
        }
        Some(tick)
    }

    pub fn pick(&mut self, row: usize, column: usize) -> Result<()> {
        self.input.on_pick(
            row,
            column,
            &mut self.grid,
            &mut self.persistence,
            &mut self.dispatcher,
        )?;
        self.emit(SequencerEvent::Refresh);
        Ok(())
    }

    /// Replace the whole pattern from an out-of-band token.
    pub fn external_change(&mut self, token: &str) {
        let cells = self.persistence.on_external_change(token);
        match self.grid.restore(cells) {
            Ok(()) => {
                self.emit(SequencerEvent::PatternReplaced);
                self.emit(SequencerEvent::Refresh);
            }
            Err(e) => warn!("ignoring external pattern: {}", e),
        }
    }

    /// Check the store for out-of-band edits. Returns true if the grid was replaced.
    pub fn poll_external(&mut self) -> bool {
        match self.persistence.poll_change() {
            Some(token) => {
                self.external_change(&token);
                true
            }
            None => false,
        }
    }

    pub fn token(&self) -> String {
        codec::encode(self.grid.cells())
    }

    pub fn share_fragment(&self) -> String {
        format!("#{}", self.token())
    }

    pub fn view(&self) -> Vec<CellView> {
        let scanned = self.clock.cursor().column();
        let columns = self.grid.columns();
        self.grid
            .cells()
            .iter()
            .enumerate()
            .map(|(i, &on)| {
                let (row, column) = (i / columns, i % columns);
                let state = if column == scanned {
                    CellState::Scanned
                } else if on {
                    CellState::Active
                } else {
                    CellState::Inactive
                };
                CellView { row, column, state }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioError, DecodedSound, SampleBuffer};
    use super::persistence::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc::Sender;
    use std::time::Duration;

    struct Silent;

    impl AudioBackend for Silent {
        fn activate(&mut self) -> std::result::Result<(), AudioError> {
            Ok(())
        }
        fn fetch(&mut self, _row: usize, _sound_id: &str, _done: Sender<DecodedSound>) {}
        fn play_buffer(&mut self, _buffer: &SampleBuffer) -> std::result::Result<(), AudioError> {
            Ok(())
        }
        fn play_resource(&mut self, _sound_id: &str) {}
    }

    fn small_config() -> SequencerConfig {
        SequencerConfig {
            rows: 4,
            columns: 4,
            beat_interval_ms: 100,
            default_pattern: "1100001000001010".into(),
            voice_sound_ids: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        }
    }

    fn session() -> Sequencer {
        Sequencer::new(&small_config(), Box::new(MemoryStore::new()), Box::new(Silent)).unwrap()
    }

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new(4, 8);
        assert_eq!(grid.rows(), 4);
        assert_eq!(grid.columns(), 8);
        assert_eq!(grid.cells().len(), 32);
    }

    #[test]
    fn test_grid_toggle() {
        let mut grid = Grid::new(4, 4);
        assert!(!grid.get(0, 0).unwrap());
        grid.toggle(0, 0).unwrap();
        assert!(grid.get(0, 0).unwrap());
    }

    #[test]
    fn test_toggle_twice_restores() {
        let mut grid = Grid::from_cells(2, 3, vec![true, false, true, false, false, true]).unwrap();
        let before = grid.snapshot();
        grid.toggle(1, 2).unwrap();
        grid.toggle(1, 2).unwrap();
        assert_eq!(grid.snapshot(), before);
    }

    #[test]
    fn test_out_of_range_access_fails() {
        let mut grid = Grid::new(4, 4);
        assert!(matches!(
            grid.get(4, 0),
            Err(SequencerError::OutOfRange { row: 4, .. })
        ));
        assert!(grid.toggle(0, 4).is_err());
        assert!(grid.toggle(9, 9).is_err());
        assert_eq!(grid.cells(), &[false; 16]);
        assert!(grid.column_slice(4).is_err());
    }

    #[test]
    fn test_column_slice_is_row_ordered() {
        let grid = Grid::from_cells(3, 2, vec![true, false, false, true, true, true]).unwrap();
        assert_eq!(grid.column_slice(0).unwrap(), vec![true, false, true]);
        assert_eq!(grid.column_slice(1).unwrap(), vec![false, true, true]);
    }

    #[test]
    fn test_restore_checks_length() {
        let mut grid = Grid::new(2, 2);
        assert!(matches!(
            grid.restore(vec![true; 3]),
            Err(SequencerError::CellCount { expected: 4, found: 3 })
        ));
        assert_eq!(grid.cells(), &[false; 4]);
        grid.restore(vec![true; 4]).unwrap();
        assert_eq!(grid.cells(), &[true; 4]);
    }

    #[test]
    fn test_view_marks_scanned_column_first() {
        let mut seq = session();
        let t0 = Instant::now();
        seq.start(t0);
        seq.frame(t0 + Duration::from_millis(100));

        let view = seq.view();
        assert_eq!(view.len(), 16);
        for cell in view.iter().filter(|c| c.column == 1) {
            assert_eq!(cell.state, CellState::Scanned);
        }
        assert_eq!(view[0].state, CellState::Active);
        assert_eq!(view[2].state, CellState::Inactive);
    }

    #[test]
    fn test_tick_event_order() {
        let mut seq = session();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        seq.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        let t0 = Instant::now();
        seq.start(t0);
        events.borrow_mut().clear();

        // Column 1 of 1100/0010/0000/1010 has rows 0 only.
        let tick = seq.frame(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(tick.column, 1);
        assert_eq!(
            *events.borrow(),
            vec![
                SequencerEvent::ColumnScanned {
                    column: 1,
                    active_rows: vec![0],
                },
                SequencerEvent::Refresh,
                SequencerEvent::VoiceTriggered {
                    row: 0,
                    path: DispatchPath::Fallback,
                },
            ]
        );
    }

    #[test]
    fn test_pick_out_of_range_is_rejected() {
        let mut seq = session();
        let before = seq.grid().snapshot();
        assert!(seq.pick(0, 4).is_err());
        assert_eq!(seq.grid().snapshot(), before);
        assert!(seq.dispatcher().is_activated());
        assert_eq!(seq.input().picks(), 0);
    }

    #[test]
    fn test_share_fragment() {
        let seq = session();
        assert_eq!(seq.share_fragment(), "#c20a0000");
    }
}
