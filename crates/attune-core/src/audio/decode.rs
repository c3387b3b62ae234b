//! Ambient source decoding (Symphonia)
//!
//! Turns a loop source file (mp3, wav, flac, ogg) into stereo f32 frames at
//! the file's native rate. The render backend resamples on the fly by
//! stepping its playback position at the source/output rate ratio, so
//! nothing here needs to know the output rate.

use std::path::Path;

use super::error::PlaybackError;
use crate::types::{StereoBuffer, StereoSample};

/// A fully decoded loop source
#[derive(Debug)]
pub struct DecodedLoop {
    pub buffer: StereoBuffer,
    pub sample_rate: u32,
}

impl DecodedLoop {
    pub fn duration_secs(&self) -> f64 {
        self.buffer.len() as f64 / self.sample_rate as f64
    }
}

fn decode_error(path: &Path, reason: impl ToString) -> PlaybackError {
    PlaybackError::Decode {
        source: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Decode an audio file to stereo f32 frames
///
/// Mono sources are duplicated into both channels; sources with more than
/// two channels keep their first two.
pub fn decode_loop_source(path: &Path) -> Result<DecodedLoop, PlaybackError> {
    use std::fs::File;
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = File::open(path).map_err(|e| decode_error(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Hint with the file extension so probing can shortcut
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_error(path, e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error(path, "no audio track found"))?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_error(path, "unknown sample rate"))?;

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(path, e))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet from {}: {}", path.display(), e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet from {}: {}", path.display(), e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    if interleaved.is_empty() {
        return Err(decode_error(path, "no decodable audio data"));
    }

    Ok(DecodedLoop {
        buffer: fold_to_stereo(&interleaved, channels),
        sample_rate,
    })
}

/// Collapse interleaved frames of any channel count into stereo
fn fold_to_stereo(interleaved: &[f32], channels: usize) -> StereoBuffer {
    let channels = channels.max(1);
    let frames = interleaved.len() / channels;
    let mut buffer = StereoBuffer::with_capacity(frames);

    for frame in interleaved.chunks_exact(channels) {
        let sample = if channels == 1 {
            StereoSample::mono(frame[0])
        } else {
            StereoSample::new(frame[0], frame[1])
        };
        buffer.push(sample);
    }

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::f32::consts::TAU;

    fn write_test_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let v = (TAU * 220.0 * i as f32 / sample_rate as f32).sin() * 0.5;
            for _ in 0..channels {
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 2, 44100, 4410);

        let decoded = decode_loop_source(&path).unwrap();
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.buffer.len(), 4410);
        assert!(decoded.buffer.peak() > 0.4);
    }

    #[test]
    fn test_decode_mono_duplicates_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_test_wav(&path, 1, 22050, 1000);

        let decoded = decode_loop_source(&path).unwrap();
        assert_eq!(decoded.buffer.len(), 1000);
        let frame = decoded.buffer[500];
        assert_eq!(frame.left, frame.right);
    }

    #[test]
    fn test_decode_missing_file_reports_source() {
        let err = decode_loop_source(Path::new("/nonexistent/rain.mp3")).unwrap_err();
        match err {
            PlaybackError::Decode { source, .. } => {
                assert!(source.contains("rain.mp3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fold_to_stereo_keeps_first_two_of_many() {
        let interleaved = [0.1, 0.2, 0.9, 0.3, 0.4, 0.9];
        let buffer = fold_to_stereo(&interleaved, 3);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer[0].left, 0.1);
        assert_eq!(buffer[0].right, 0.2);
        assert_eq!(buffer[1].left, 0.3);
        assert_eq!(buffer[1].right, 0.4);
    }
}
