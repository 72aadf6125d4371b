// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::default::{get_codecs, get_probe};
use thiserror::Error;
use tracing::debug;

use super::codec;
use super::format::{AudioFormat, SampleFormat};

/// Errors raised while decoding a file into PCM.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio file error: {0}")]
    Symphonia(#[from] SymphoniaError),

    #[error("no audio track found in {0}")]
    NoTrack(String),

    #[error("sample rate not specified in {0}")]
    MissingSampleRate(String),

    #[error("channel count not specified in {0}")]
    MissingChannels(String),

    #[error("decoded sample format changed from {from} to {to}")]
    FormatChanged { from: SampleFormat, to: SampleFormat },

    #[error("no audio data in {0}")]
    Empty(String),
}

/// Interleaved PCM and the format it is stored in.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub format: AudioFormat,
    pub data: Vec<u8>,
}

impl DecodedAudio {
    /// The number of whole frames held in the data.
    pub fn frames(&self) -> usize {
        self.data.len() / self.format.frame_size()
    }
}

/// Decodes a file into interleaved PCM plus metadata.
pub trait FileDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedAudio, DecodeError>;
}

/// Decodes WAV, FLAC, MP3, OGG and the other containers symphonia supports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl FileDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedAudio, DecodeError> {
        let file = File::open(path).map_err(|e| {
            DecodeError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let path_name = path.display().to_string();
        let probed = get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::NoTrack(path_name.clone()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| DecodeError::MissingSampleRate(path_name.clone()))?;
        let mut decoder = get_codecs().make(&params, &DecoderOptions::default())?;

        let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
        let mut sample_format: Option<SampleFormat> = None;
        let mut data = Vec::new();

        while let Some(decoded) = next_buffer(reader.as_mut(), decoder.as_mut(), track_id)? {
            let buffer_format = target_format(&decoded);
            match sample_format {
                None => sample_format = Some(buffer_format),
                Some(format) if format != buffer_format => {
                    return Err(DecodeError::FormatChanged {
                        from: format,
                        to: buffer_format,
                    })
                }
                Some(_) => {}
            }
            if channels == 0 {
                channels = decoded.spec().channels.count() as u16;
            }
            append_interleaved(decoded, &mut data);
        }

        let sample_format = sample_format.ok_or_else(|| DecodeError::Empty(path_name.clone()))?;
        if channels == 0 {
            return Err(DecodeError::MissingChannels(path_name));
        }
        if data.is_empty() {
            return Err(DecodeError::Empty(path_name));
        }

        let format = AudioFormat {
            channels,
            sample_rate,
            sample_format,
        };
        debug!(
            path = %path_name,
            format = %format,
            bytes = data.len(),
            "Decoded audio file"
        );
        Ok(DecodedAudio { format, data })
    }
}

fn next_packet(reader: &mut dyn FormatReader) -> Result<Option<Packet>, SymphoniaError> {
    match reader.next_packet() {
        Ok(packet) => Ok(Some(packet)),
        Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Reads and decodes packets until one for `track_id` produces samples. Returns
/// None at the end of the stream.
fn next_buffer<'a>(
    reader: &mut dyn FormatReader,
    decoder: &'a mut dyn Decoder,
    track_id: u32,
) -> Result<Option<AudioBufferRef<'a>>, DecodeError> {
    loop {
        let packet = match next_packet(reader) {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(None),
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let frames = match decoder.decode(&packet) {
            Ok(decoded) => decoded.frames(),
            // Malformed packets are skipped.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        if frames > 0 {
            return Ok(Some(decoder.last_decoded()));
        }
    }
}

/// The format a decoded buffer is stored in. Types without a direct
/// counterpart are widened to F32.
fn target_format(buffer: &AudioBufferRef) -> SampleFormat {
    match buffer {
        AudioBufferRef::U8(_) => SampleFormat::U8,
        AudioBufferRef::S16(_) => SampleFormat::S16,
        AudioBufferRef::S24(_) => SampleFormat::S24,
        AudioBufferRef::S32(_) => SampleFormat::S32,
        _ => SampleFormat::F32,
    }
}

fn append_interleaved(buffer: AudioBufferRef, out: &mut Vec<u8>) {
    match buffer {
        AudioBufferRef::U8(buf) => interleave_into(&buf, out, |s, out| out.push(s)),
        AudioBufferRef::S16(buf) => {
            interleave_into(&buf, out, |s, out| out.extend_from_slice(&s.to_le_bytes()))
        }
        AudioBufferRef::S24(buf) => interleave_into(&buf, out, |s, out| {
            let mut packed = [0u8; 3];
            codec::write_s24(s.inner(), &mut packed);
            out.extend_from_slice(&packed);
        }),
        AudioBufferRef::S32(buf) => {
            interleave_into(&buf, out, |s, out| out.extend_from_slice(&s.to_le_bytes()))
        }
        AudioBufferRef::F32(buf) => {
            interleave_into(&buf, out, |s, out| out.extend_from_slice(&s.to_le_bytes()))
        }
        AudioBufferRef::F64(buf) => interleave_into(&buf, out, push_f32),
        AudioBufferRef::S8(buf) => interleave_into(&buf, out, push_f32),
        AudioBufferRef::U16(buf) => interleave_into(&buf, out, push_f32),
        AudioBufferRef::U24(buf) => interleave_into(&buf, out, push_f32),
        AudioBufferRef::U32(buf) => interleave_into(&buf, out, push_f32),
    }
}

fn push_f32<T: IntoSample<f32>>(sample: T, out: &mut Vec<u8>) {
    let value: f32 = sample.into_sample();
    out.extend_from_slice(&value.to_le_bytes());
}

fn interleave_into<T, F>(buf: &AudioBuffer<T>, out: &mut Vec<u8>, encode: F)
where
    T: Sample,
    F: Fn(T, &mut Vec<u8>),
{
    let channels = buf.spec().channels.count();
    for frame in 0..buf.frames() {
        for channel in 0..channels {
            encode(buf.chan(channel)[frame], out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_decode_s16_wav() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("s16.wav");
        write_wav(&path, vec![vec![-32767i32, 100, 0, 16383]], 44100, 16)?;

        let decoded = SymphoniaDecoder.decode(&path)?;
        assert_eq!(decoded.format.channels, 1);
        assert_eq!(decoded.format.sample_rate, 44100);
        assert_eq!(decoded.format.sample_format, SampleFormat::S16);
        assert_eq!(decoded.frames(), 4);

        let samples: Vec<i16> = decoded
            .data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![-32767, 100, 0, 16383]);
        Ok(())
    }

    #[test]
    fn test_decode_stereo_is_interleaved() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stereo.wav");
        write_wav(
            &path,
            vec![vec![1i32, 2, 3], vec![-1i32, -2, -3]],
            48000,
            16,
        )?;

        let decoded = SymphoniaDecoder.decode(&path)?;
        assert_eq!(decoded.format.channels, 2);
        assert_eq!(decoded.frames(), 3);

        let samples: Vec<i16> = decoded
            .data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![1, -1, 2, -2, 3, -3]);
        Ok(())
    }

    #[test]
    fn test_decode_s24_wav() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("s24.wav");
        write_wav(&path, vec![vec![-8_388_607i32, -1, 0, 4_194_303]], 48000, 24)?;

        let decoded = SymphoniaDecoder.decode(&path)?;
        assert_eq!(decoded.format.sample_format, SampleFormat::S24);
        let samples: Vec<i32> = decoded.data.chunks_exact(3).map(codec::read_s24).collect();
        assert_eq!(samples, vec![-8_388_607, -1, 0, 4_194_303]);
        Ok(())
    }

    #[test]
    fn test_decode_missing_file() {
        let result = SymphoniaDecoder.decode(Path::new("/nonexistent/file.wav"));
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }

    #[test]
    fn test_decode_garbage_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"this is not audio")?;

        assert!(SymphoniaDecoder.decode(&path).is_err());
        Ok(())
    }
}
