//! Audio decoding
//!
//! Decodes sample clips to mono float PCM. Symphonia handles the compressed
//! formats the asset bucket serves; a hound fallback covers plain WAV files
//! symphonia rejects.

use std::io::Cursor;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assets::AssetError;

/// Decoded audio: mono PCM samples and their sample rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Clip duration in seconds
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode audio bytes into a mono buffer
pub fn decode_audio_bytes(bytes: &[u8]) -> Result<AudioBuffer, AssetError> {
    if bytes.is_empty() {
        return Err(AssetError::EmptyAudio);
    }

    let buffer = match decode_symphonia(bytes) {
        Ok(buffer) => buffer,
        Err(symphonia_err) => decode_wav_hound(bytes).map_err(|wav_err| {
            AssetError::Decode(format!(
                "symphonia: {symphonia_err}; wav fallback: {wav_err}"
            ))
        })?,
    };

    finalize(buffer)
}

fn decode_symphonia(bytes: &[u8]) -> Result<AudioBuffer, String> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;
    use symphonia::default::{get_codecs, get_probe};

    let media_source =
        MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = get_probe()
        .format(
            &Hint::new(),
            media_source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("probe failed: {e}"))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| "no default audio track".to_string())?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("no decoder: {e}"))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(err) => return Err(format!("packet read failed: {err}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(format!("packet decode failed: {err}")),
        };

        if sample_rate == 0 {
            sample_rate = decoded.spec().rate;
        }
        let channels = decoded.spec().channels.count().max(1);

        let mut sample_buffer =
            SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buffer.copy_interleaved_ref(decoded);
        mix_down(sample_buffer.samples(), channels, &mut samples);
    }

    if sample_rate == 0 {
        return Err("missing sample rate metadata".to_string());
    }

    Ok(AudioBuffer {
        samples,
        sample_rate,
    })
}

fn decode_wav_hound(bytes: &[u8]) -> Result<AudioBuffer, String> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| format!("not a wav file: {e}"))?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample.max(1) as u32;
            let max_val = if bits > 1 {
                ((1i64 << (bits - 1)) - 1) as f32
            } else {
                1.0
            };
            reader
                .samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_val)
                .collect()
        }
        hound::SampleFormat::Float => reader.samples::<f32>().filter_map(|s| s.ok()).collect(),
    };

    let mut samples = Vec::with_capacity(interleaved.len() / channels + 1);
    mix_down(&interleaved, channels, &mut samples);

    Ok(AudioBuffer {
        samples,
        sample_rate: spec.sample_rate,
    })
}

fn mix_down(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    for frame in interleaved.chunks(channels) {
        let sum: f32 = frame.iter().copied().sum();
        out.push(sum / frame.len() as f32);
    }
}

fn finalize(mut buffer: AudioBuffer) -> Result<AudioBuffer, AssetError> {
    if buffer.sample_rate == 0 {
        return Err(AssetError::Decode("sample rate of 0".to_string()));
    }
    if buffer.samples.is_empty() {
        return Err(AssetError::EmptyAudio);
    }
    for sample in &mut buffer.samples {
        if !sample.is_finite() {
            *sample = 0.0;
        } else {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
    Ok(buffer)
}

/// Write a buffer as 16-bit PCM WAV, the format the engine's media loader
/// accepts
pub fn write_wav(buffer: &AudioBuffer, path: &Path) -> Result<(), AssetError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| AssetError::Decode(e.to_string()))?;
    for &sample in &buffer.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| AssetError::Decode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AssetError::Decode(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(spec: hound::WavSpec, frames: &[Vec<i16>]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for frame in frames {
                for &sample in frame {
                    writer.write_sample(sample).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        bytes
    }

    #[test]
    fn test_decode_mono_wav() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[vec![0], vec![i16::MAX], vec![i16::MIN]]);

        let buffer = decode_audio_bytes(&bytes).unwrap();
        assert_eq!(buffer.sample_rate, 16_000);
        assert_eq!(buffer.samples.len(), 3);
        assert!(buffer.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_decode_stereo_mixes_to_mono() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[vec![1000, 3000], vec![-2000, -4000]]);

        let buffer = decode_audio_bytes(&bytes).unwrap();
        assert_eq!(buffer.sample_rate, 44_100);
        assert_eq!(buffer.samples.len(), 2);
        // each output frame is the channel average
        assert!(buffer.samples[0] > 0.0);
        assert!(buffer.samples[1] < 0.0);
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        assert!(matches!(
            decode_audio_bytes(&[]),
            Err(AssetError::EmptyAudio)
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_audio_bytes(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_wav_round_trip_through_writer() {
        let original = AudioBuffer {
            samples: vec![0.0, 0.25, -0.25, 0.5],
            sample_rate: 16_000,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&original, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let decoded = decode_audio_bytes(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, original.sample_rate);
        assert_eq!(decoded.samples.len(), original.samples.len());
        for (a, b) in original.samples.iter().zip(&decoded.samples) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer {
            samples: vec![0.0; 32_000],
            sample_rate: 16_000,
        };
        assert!((buffer.duration_secs() - 2.0).abs() < f32::EPSILON);
    }
}
