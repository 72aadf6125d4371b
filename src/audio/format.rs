// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Error returned when a sample format or audio format description is invalid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unsupported sample format: {0}")]
    UnknownSampleFormat(String),

    #[error("channel count must be greater than 0")]
    NoChannels,

    #[error("sample rate must be greater than 0")]
    NoSampleRate,
}

/// Sample format enumeration for interleaved PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit integer samples, silence at 128.
    U8,
    /// Signed 16-bit integer samples.
    S16,
    /// Signed 24-bit integer samples packed into 3 little-endian bytes.
    S24,
    /// Signed 32-bit integer samples.
    S32,
    /// 32-bit floating point samples in the range of -1.0 to 1.0.
    F32,
}

impl SampleFormat {
    /// All supported formats, in dispatch table order.
    pub const ALL: [SampleFormat; 5] = [
        SampleFormat::U8,
        SampleFormat::S16,
        SampleFormat::S24,
        SampleFormat::S32,
        SampleFormat::F32,
    ];

    /// The number of bytes a single sample occupies.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S24 => 3,
            SampleFormat::S32 => 4,
            SampleFormat::F32 => 4,
        }
    }

    /// The number of bits a single sample carries.
    pub const fn bits_per_sample(self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }

    /// The byte value that encodes silence.
    pub const fn silence_byte(self) -> u8 {
        match self {
            SampleFormat::U8 => 0x80,
            _ => 0,
        }
    }

    /// Index of this format in the codec dispatch tables.
    pub(crate) const fn index(self) -> usize {
        match self {
            SampleFormat::U8 => 0,
            SampleFormat::S16 => 1,
            SampleFormat::S24 => 2,
            SampleFormat::S32 => 3,
            SampleFormat::F32 => 4,
        }
    }

    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S24 => "s24",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "f32",
        }
    }
}

impl FromStr for SampleFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" => Ok(SampleFormat::U8),
            "s16" | "i16" => Ok(SampleFormat::S16),
            "s24" | "i24" => Ok(SampleFormat::S24),
            "s32" | "i32" => Ok(SampleFormat::S32),
            "f32" | "float" => Ok(SampleFormat::F32),
            _ => Err(FormatError::UnknownSampleFormat(s.to_string())),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Describes interleaved PCM data: channel count, sample rate and sample format.
/// The engine's native (device) format is one of these, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Sample format.
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Creates a new AudioFormat, rejecting zero channels or a zero sample rate.
    pub fn new(
        channels: u16,
        sample_rate: u32,
        sample_format: SampleFormat,
    ) -> Result<Self, FormatError> {
        if channels == 0 {
            return Err(FormatError::NoChannels);
        }
        if sample_rate == 0 {
            return Err(FormatError::NoSampleRate);
        }

        Ok(AudioFormat {
            channels,
            sample_rate,
            sample_format,
        })
    }

    /// The number of bytes one frame occupies.
    pub fn frame_size(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    /// The number of bytes `frames` frames occupy.
    pub fn buffer_size(&self, frames: usize) -> usize {
        self.frame_size() * frames
    }
}

impl Default for AudioFormat {
    /// Stereo, 48kHz, signed 16-bit.
    fn default() -> Self {
        AudioFormat {
            channels: 2,
            sample_rate: 48000,
            sample_format: SampleFormat::S16,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch {}Hz {}",
            self.channels, self.sample_rate, self.sample_format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_from_str() {
        assert_eq!(SampleFormat::from_str("u8").unwrap(), SampleFormat::U8);
        assert_eq!(SampleFormat::from_str("S16").unwrap(), SampleFormat::S16);
        assert_eq!(SampleFormat::from_str("i24").unwrap(), SampleFormat::S24);
        assert_eq!(SampleFormat::from_str("s32").unwrap(), SampleFormat::S32);
        assert_eq!(SampleFormat::from_str("float").unwrap(), SampleFormat::F32);
    }

    #[test]
    fn test_sample_format_from_str_invalid() {
        assert!(SampleFormat::from_str("invalid").is_err());
        assert!(SampleFormat::from_str("").is_err());
        assert!(SampleFormat::from_str("f64").is_err());
    }

    #[test]
    fn test_sample_format_display() {
        for format in SampleFormat::ALL {
            assert_eq!(SampleFormat::from_str(&format.to_string()).unwrap(), format);
        }
    }

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(SampleFormat::U8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::S16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::S24.bytes_per_sample(), 3);
        assert_eq!(SampleFormat::S32.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::F32.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::S24.bits_per_sample(), 24);
    }

    #[test]
    fn test_index_matches_table_order() {
        for (i, format) in SampleFormat::ALL.iter().enumerate() {
            assert_eq!(format.index(), i);
        }
    }

    #[test]
    fn test_audio_format_new() {
        let format = AudioFormat::new(2, 44100, SampleFormat::S24).unwrap();
        assert_eq!(format.frame_size(), 6);
        assert_eq!(format.buffer_size(10), 60);
    }

    #[test]
    fn test_audio_format_new_invalid() {
        assert_eq!(
            AudioFormat::new(0, 44100, SampleFormat::S16),
            Err(FormatError::NoChannels)
        );
        assert_eq!(
            AudioFormat::new(2, 0, SampleFormat::S16),
            Err(FormatError::NoSampleRate)
        );
    }

    #[test]
    fn test_audio_format_default() {
        let format = AudioFormat::default();
        assert_eq!(format.channels, 2);
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.sample_format, SampleFormat::S16);
    }
}
