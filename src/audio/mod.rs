/// Voice playback - routes row triggers to decoded buffers or the raw-resource fallback
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

pub mod device;
pub mod wav;

pub use device::CpalBackend;

#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("failed to decode sound: {0}")]
    Decode(String),
    #[error("audio output has not been activated")]
    NotActivated,
}

/// Decoded mono sound ready for immediate playback.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }
}

/// Completion of a background fetch for one row.
#[derive(Debug)]
pub struct DecodedSound {
    pub row: usize,
    pub result: Result<SampleBuffer, AudioError>,
}

/// The audio resource collaborator.
pub trait AudioBackend {
    /// Acquire the output. Called once, on the first user gesture.
    fn activate(&mut self) -> Result<(), AudioError>;

    /// Start fetching and decoding `sound_id` in the background. The outcome is
    /// sent on `done` whenever it is ready.
    fn fetch(&mut self, row: usize, sound_id: &str, done: Sender<DecodedSound>);

    /// Low-latency path: start a decoded buffer right away.
    fn play_buffer(&mut self, buffer: &SampleBuffer) -> Result<(), AudioError>;

    /// Higher-latency path: load and play the raw resource. Failures are handled
    /// and logged by the backend itself.
    fn play_resource(&mut self, sound_id: &str);
}

/// Which playback path served a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    Preferred,
    Fallback,
    /// Row has no voice mapped to it.
    Unmapped,
    /// The voice's sound failed to decode; the trigger is dropped.
    Unavailable,
}

pub struct SoundDispatcher {
    backend: Box<dyn AudioBackend>,
    sound_ids: Vec<String>,
    buffers: Vec<Option<SampleBuffer>>,
    failed: Vec<bool>,
    completions: Receiver<DecodedSound>,
    completion_sender: Sender<DecodedSound>,
    activated: bool,
}

impl SoundDispatcher {
    pub fn new(backend: Box<dyn AudioBackend>, sound_ids: Vec<String>) -> Self {
        let (completion_sender, completions) = channel();
        let buffers = vec![None; sound_ids.len()];
        let failed = vec![false; sound_ids.len()];

        Self {
            backend,
            sound_ids,
            buffers,
            failed,
            completions,
            completion_sender,
            activated: false,
        }
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn is_ready(&self, row: usize) -> bool {
        matches!(self.buffers.get(row), Some(Some(_)))
    }

    /// Activate the backend and kick off decoding of every voice. Only the first
    /// call does anything.
    pub fn ensure_activated(&mut self) {
        if self.activated {
            return;
        }
        self.activated = true;

        if let Err(e) = self.backend.activate() {
            warn!("audio activation failed, voices will use fallback playback: {}", e);
            return;
        }

        info!(voices = self.sound_ids.len(), "audio activated, fetching sounds");
        for (row, sound_id) in self.sound_ids.iter().enumerate() {
            self.backend
                .fetch(row, sound_id, self.completion_sender.clone());
        }
    }

    /// Store any decodes that finished since the last call.
    pub fn pump(&mut self) {
        while let Ok(decoded) = self.completions.try_recv() {
            match decoded.result {
                Ok(buffer) => {
                    if let Some(slot) = self.buffers.get_mut(decoded.row) {
                        debug!(row = decoded.row, "sound buffer ready");
                        *slot = Some(buffer);
                        self.failed[decoded.row] = false;
                    }
                }
                Err(e) => {
                    if let Some(failed) = self.failed.get_mut(decoded.row) {
                        warn!(row = decoded.row, "sound decode failed, voice muted: {}", e);
                        *failed = true;
                    }
                }
            }
        }
    }

    pub fn trigger(&mut self, row: usize) -> DispatchPath {
        self.pump();

        let Some(sound_id) = self.sound_ids.get(row) else {
            warn!(row, "no voice mapped to row");
            return DispatchPath::Unmapped;
        };

        if let Some(Some(buffer)) = self.buffers.get(row) {
            match self.backend.play_buffer(buffer) {
                Ok(()) => return DispatchPath::Preferred,
                Err(e) => debug!(row, "buffer playback unavailable ({}), falling back", e),
            }
        }

        if self.failed[row] {
            return DispatchPath::Unavailable;
        }

        self.backend.play_resource(sound_id);
        DispatchPath::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Activate,
        Fetch(usize, String),
        PlayBuffer(usize),
        PlayResource(String),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Rc<RefCell<Vec<Call>>>,
        fail_activation: bool,
        fail_buffers: bool,
        decode_immediately: bool,
        fail_decode: bool,
    }

    impl AudioBackend for Recorder {
        fn activate(&mut self) -> Result<(), AudioError> {
            self.calls.borrow_mut().push(Call::Activate);
            if self.fail_activation {
                Err(AudioError::NoDevice)
            } else {
                Ok(())
            }
        }

        fn fetch(&mut self, row: usize, sound_id: &str, done: Sender<DecodedSound>) {
            self.calls
                .borrow_mut()
                .push(Call::Fetch(row, sound_id.to_string()));
            if self.fail_decode {
                let _ = done.send(DecodedSound {
                    row,
                    result: Err(AudioError::Decode(format!("{}: not a wav", sound_id))),
                });
            } else if self.decode_immediately {
                let _ = done.send(DecodedSound {
                    row,
                    result: Ok(SampleBuffer::new(vec![0.0; row + 1], 44_100)),
                });
            }
        }

        fn play_buffer(&mut self, buffer: &SampleBuffer) -> Result<(), AudioError> {
            if self.fail_buffers {
                return Err(AudioError::Stream("busy".into()));
            }
            self.calls
                .borrow_mut()
                .push(Call::PlayBuffer(buffer.samples.len() - 1));
            Ok(())
        }

        fn play_resource(&mut self, sound_id: &str) {
            self.calls
                .borrow_mut()
                .push(Call::PlayResource(sound_id.to_string()));
        }
    }

    fn ids() -> Vec<String> {
        vec!["kick.wav".into(), "snare.wav".into()]
    }

    #[test]
    fn test_trigger_before_decode_uses_fallback() {
        let backend = Recorder::default();
        let calls = backend.calls.clone();
        let mut dispatcher = SoundDispatcher::new(Box::new(backend), ids());

        assert_eq!(dispatcher.trigger(1), DispatchPath::Fallback);
        assert_eq!(*calls.borrow(), vec![Call::PlayResource("snare.wav".into())]);
    }

    #[test]
    fn test_activation_fetches_every_voice_once() {
        let backend = Recorder::default();
        let calls = backend.calls.clone();
        let mut dispatcher = SoundDispatcher::new(Box::new(backend), ids());

        dispatcher.ensure_activated();
        dispatcher.ensure_activated();

        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Activate,
                Call::Fetch(0, "kick.wav".into()),
                Call::Fetch(1, "snare.wav".into()),
            ]
        );
    }

    #[test]
    fn test_decoded_buffer_uses_preferred_path() {
        let backend = Recorder {
            decode_immediately: true,
            ..Default::default()
        };
        let calls = backend.calls.clone();
        let mut dispatcher = SoundDispatcher::new(Box::new(backend), ids());

        dispatcher.ensure_activated();
        assert_eq!(dispatcher.trigger(0), DispatchPath::Preferred);
        assert!(dispatcher.is_ready(1));
        assert_eq!(calls.borrow().last(), Some(&Call::PlayBuffer(0)));
    }

    #[test]
    fn test_buffer_failure_recovers_through_fallback() {
        let backend = Recorder {
            decode_immediately: true,
            fail_buffers: true,
            ..Default::default()
        };
        let calls = backend.calls.clone();
        let mut dispatcher = SoundDispatcher::new(Box::new(backend), ids());

        dispatcher.ensure_activated();
        assert_eq!(dispatcher.trigger(0), DispatchPath::Fallback);
        assert_eq!(
            calls.borrow().last(),
            Some(&Call::PlayResource("kick.wav".into()))
        );
    }

    #[test]
    fn test_failed_activation_skips_fetch() {
        let backend = Recorder {
            fail_activation: true,
            ..Default::default()
        };
        let calls = backend.calls.clone();
        let mut dispatcher = SoundDispatcher::new(Box::new(backend), ids());

        dispatcher.ensure_activated();
        assert!(dispatcher.is_activated());
        assert_eq!(*calls.borrow(), vec![Call::Activate]);
        assert_eq!(dispatcher.trigger(0), DispatchPath::Fallback);
    }

    #[test]
    fn test_failed_decode_mutes_voice_without_retrying() {
        let backend = Recorder {
            fail_decode: true,
            ..Default::default()
        };
        let calls = backend.calls.clone();
        let mut dispatcher = SoundDispatcher::new(Box::new(backend), ids());

        dispatcher.ensure_activated();
        for _ in 0..3 {
            assert_eq!(dispatcher.trigger(0), DispatchPath::Unavailable);
        }
        assert!(!dispatcher.is_ready(0));
        assert!(!calls
            .borrow()
            .iter()
            .any(|c| matches!(c, Call::PlayResource(_))));
    }

    #[test]
    fn test_unmapped_row() {
        let mut dispatcher = SoundDispatcher::new(Box::new(Recorder::default()), ids());
        assert_eq!(dispatcher.trigger(5), DispatchPath::Unmapped);
    }

    #[test]
    fn test_late_decode_is_last_write_wins() {
        let backend = Recorder::default();
        let mut dispatcher = SoundDispatcher::new(Box::new(backend), ids());
        let sender = dispatcher.completion_sender.clone();

        sender
            .send(DecodedSound {
                row: 0,
                result: Ok(SampleBuffer::new(vec![0.0; 4], 8_000)),
            })
            .unwrap();
        sender
            .send(DecodedSound {
                row: 0,
                result: Ok(SampleBuffer::new(vec![0.0; 8], 8_000)),
            })
            .unwrap();
        dispatcher.pump();

        let stored = dispatcher.buffers[0].as_ref().unwrap();
        assert_eq!(stored.samples.len(), 8);
    }
}
