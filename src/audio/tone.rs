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
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::codec;
use super::format::SampleFormat;

/// The shape of a generated tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
}

impl FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            other => Err(format!("unknown waveform: {}", other)),
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Waveform::Sine => write!(f, "sine"),
            Waveform::Square => write!(f, "square"),
        }
    }
}

/// A synthetic tone. The running frame index keeps the phase continuous
/// across successive fills.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneGenerator {
    pub waveform: Waveform,
    pub frequency: f64,
    pub amplitude: f64,
    frame_index: u64,
}

impl ToneGenerator {
    pub fn new(waveform: Waveform, frequency: f64, amplitude: f64) -> ToneGenerator {
        ToneGenerator {
            waveform,
            frequency,
            amplitude,
            frame_index: 0,
        }
    }

    /// A sine at a quarter of full scale.
    pub fn sine(frequency: f64) -> ToneGenerator {
        ToneGenerator::new(Waveform::Sine, frequency, 0.25)
    }

    /// The number of frames generated so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn sample_at(&self, frame: u64, sample_rate: u32) -> f32 {
        let phase = (2.0 * PI * self.frequency) / sample_rate as f64 * frame as f64;
        let value = match self.waveform {
            Waveform::Sine => phase.sin(),
            Waveform::Square => {
                if phase.sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
        };
        (value * self.amplitude) as f32
    }

    /// Writes `frames` frames of the tone into `out`, the same value on every
    /// channel. Returns the number of frames written, which is smaller than
    /// `frames` when `out` cannot hold them all.
    pub fn fill(
        &mut self,
        out: &mut [u8],
        format: SampleFormat,
        sample_rate: u32,
        channels: u16,
        frames: usize,
    ) -> usize {
        let sample_size = format.bytes_per_sample();
        let frame_size = sample_size * channels as usize;
        if frame_size == 0 || sample_rate == 0 {
            return 0;
        }

        let mut written = 0;
        for frame in out.chunks_exact_mut(frame_size).take(frames) {
            let value = self.sample_at(self.frame_index + written as u64, sample_rate);
            for sample in frame.chunks_exact_mut(sample_size) {
                codec::from_f32(format, value, sample);
            }
            written += 1;
        }
        self.frame_index += written as u64;
        written
    }
}

impl Default for ToneGenerator {
    fn default() -> Self {
        ToneGenerator::sine(440.0)
    }
}
