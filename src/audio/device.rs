/// Audio output using cpal
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, warn};

use super::{wav, AudioBackend, AudioError, DecodedSound, SampleBuffer};

const VOICE_GAIN: f32 = 0.8;

struct ActiveVoice {
    samples: Arc<[f32]>,
    position: f64,
    step: f64,
}

impl ActiveVoice {
    fn finished(&self) -> bool {
        self.position as usize >= self.samples.len()
    }
}

/// One-shot voices summed into the output stream.
#[derive(Default)]
struct Mixer {
    voices: Vec<ActiveVoice>,
}

impl Mixer {
    fn next_sample(&mut self) -> f32 {
        let mut out = 0.0;
        for voice in &mut self.voices {
            if let Some(&s) = voice.samples.get(voice.position as usize) {
                out += s * VOICE_GAIN;
            }
            voice.position += voice.step;
        }
        out.clamp(-1.0, 1.0)
    }

    fn fill(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = self.next_sample();
            frame.fill(sample);
        }
        self.voices.retain(|v| !v.finished());
    }
}

/// Default output device. The stream is only opened by `activate`, so nothing
/// plays before the first user gesture.
pub struct CpalBackend {
    stream: Option<cpal::Stream>,
    mixer: Arc<Mutex<Mixer>>,
    output_rate: u32,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            stream: None,
            mixer: Arc::new(Mutex::new(Mixer::default())),
            output_rate: 44_100,
        }
    }

    fn setup_audio_stream(mixer: Arc<Mutex<Mixer>>) -> Result<(cpal::Stream, u32), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| match mixer.lock() {
                    Ok(mut mixer) => mixer.fill(data, channels),
                    Err(_) => data.fill(0.0),
                },
                |err| error!("audio stream error: {}", err),
                None,
            ),
            other => {
                return Err(AudioError::Stream(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| AudioError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        Ok((stream, sample_rate))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn activate(&mut self) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let (stream, rate) = Self::setup_audio_stream(Arc::clone(&self.mixer))?;
        self.stream = Some(stream);
        self.output_rate = rate;
        Ok(())
    }

    fn fetch(&mut self, row: usize, sound_id: &str, done: Sender<DecodedSound>) {
        let path = sound_id.to_string();
        thread::spawn(move || {
            let result = wav::load(Path::new(&path));
            let _ = done.send(DecodedSound { row, result });
        });
    }

    fn play_buffer(&mut self, buffer: &SampleBuffer) -> Result<(), AudioError> {
        if self.stream.is_none() {
            return Err(AudioError::NotActivated);
        }
        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| AudioError::Stream("mixer lock poisoned".into()))?;
        mixer.voices.push(ActiveVoice {
            samples: Arc::clone(&buffer.samples),
            position: 0.0,
            step: buffer.sample_rate as f64 / self.output_rate.max(1) as f64,
        });
        Ok(())
    }

    fn play_resource(&mut self, sound_id: &str) {
        if self.stream.is_none() {
            debug!("no output stream yet, dropping {}", sound_id);
            return;
        }
        match wav::load(Path::new(sound_id)) {
            Ok(buffer) => {
                if let Err(e) = self.play_buffer(&buffer) {
                    warn!("fallback playback of {} failed: {}", sound_id, e);
                }
            }
            Err(e) => warn!("fallback playback of {} failed: {}", sound_id, e),
        }
    }
}
