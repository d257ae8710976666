// SynthNet Wave Normaliser
// Copyright (c) 2026 Xing_The_Creator | SynthNet

use std::path::Path;
use serde::Serialize;

use crate::error::{VoiceApiError, VoiceResult};

/// Archived audio is always 22050 Hz, 16-bit signed PCM, mono.
pub const ARCHIVE_SAMPLE_RATE: u32 = 22050;
pub const ARCHIVE_BITS: u16 = 16;
pub const ARCHIVE_CHANNELS: u16 = 1;

pub fn archive_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: ARCHIVE_CHANNELS,
        sample_rate: ARCHIVE_SAMPLE_RATE,
        bits_per_sample: ARCHIVE_BITS,
        sample_format: hound::SampleFormat::Int,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WavSummary {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub samples: u64,
    pub duration_ms: u64,
}

/// Read any PCM wave file into mono f32 samples in [-1, 1].
pub fn read_mono_f32(path: &Path) -> VoiceResult<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Naive linear-interpolation resampler. Good enough for speech.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = ((samples.len() as f64) * ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..new_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = pos.floor() as usize;
            if idx >= last {
                return samples[last];
            }
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        })
        .collect()
}

/// Write mono f32 samples as a 22050 Hz / 16-bit / mono wave.
pub fn write_archive_wav(path: &Path, samples: &[f32]) -> VoiceResult<WavSummary> {
    let mut writer = hound::WavWriter::create(path, archive_spec())?;
    for sample in samples {
        let amplitude = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(amplitude)?;
    }
    writer.finalize()?;

    Ok(summary_for(samples.len() as u64))
}

/// Re-encode `input` into the archive format at `output`.
pub fn normalize_to_archive(input: &Path, output: &Path) -> VoiceResult<WavSummary> {
    let (mono, rate) = read_mono_f32(input)?;
    if rate == 0 {
        return Err(VoiceApiError::Upstream(format!(
            "synthesizer produced a wave with no sample rate: {:?}",
            input
        )));
    }
    let resampled = resample_linear(&mono, rate, ARCHIVE_SAMPLE_RATE);
    write_archive_wav(output, &resampled)
}

/// Describe a wave file from its header, without decoding samples.
pub fn summarize(path: &Path) -> VoiceResult<WavSummary> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let frames = reader.duration() as u64;
    Ok(WavSummary {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        samples: frames,
        duration_ms: if spec.sample_rate == 0 {
            0
        } else {
            frames * 1000 / spec.sample_rate as u64
        },
    })
}

fn summary_for(samples: u64) -> WavSummary {
    WavSummary {
        sample_rate: ARCHIVE_SAMPLE_RATE,
        channels: ARCHIVE_CHANNELS,
        bits_per_sample: ARCHIVE_BITS,
        samples,
        duration_ms: samples * 1000 / ARCHIVE_SAMPLE_RATE as u64,
    }
}
