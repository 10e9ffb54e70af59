/// WAV decoding into mono sample buffers
use std::path::Path;

use super::{AudioError, SampleBuffer};

pub fn load(path: &Path) -> Result<SampleBuffer, AudioError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| AudioError::Decode(format!("{}: {}", path.display(), e)))?;
    decode(reader).map_err(|e| AudioError::Decode(format!("{}: {}", path.display(), e)))
}

fn decode<R: std::io::Read>(mut reader: hound::WavReader<R>) -> Result<SampleBuffer, hound::Error> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, hound::Error>>()?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample as u32 - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| Ok(sample? as f32 / max))
                .collect::<Result<_, hound::Error>>()?
        }
    };

    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(SampleBuffer::new(mono, spec.sample_rate))
}
