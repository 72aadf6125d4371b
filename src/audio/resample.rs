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

//! Integer-ratio sample rate conversion.
//!
//! Only rates that divide evenly into one another are supported. Upsampling
//! repeats each input frame and downsampling drops the frames in between, so
//! neither filters. The output is interleaved float in the source's channel
//! layout, already scaled by the caller's gain.

use super::codec;
use super::format::SampleFormat;

/// How source frames map onto output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateConversion {
    /// Rates match; one input frame per output frame.
    Passthrough,
    /// Each input frame is written `k` times.
    Upsample(u32),
    /// Every `k`-th input frame is written.
    Downsample(u32),
}

impl RateConversion {
    /// Picks the conversion from `input_rate` to `output_rate`, or None when
    /// the rates are not integer multiples of each other.
    pub fn select(input_rate: u32, output_rate: u32) -> Option<RateConversion> {
        if input_rate == 0 || output_rate == 0 {
            return None;
        }
        if input_rate == output_rate {
            Some(RateConversion::Passthrough)
        } else if output_rate % input_rate == 0 {
            Some(RateConversion::Upsample(output_rate / input_rate))
        } else if input_rate % output_rate == 0 {
            Some(RateConversion::Downsample(input_rate / output_rate))
        } else {
            None
        }
    }

    /// Input frames consumed and output frames produced for a request of
    /// `requested` output frames, bounded by `capacity` output frames and
    /// `available` input frames.
    pub fn plan(&self, requested: usize, capacity: usize, available: usize) -> ResampleResult {
        match *self {
            RateConversion::Passthrough => {
                let frames = requested.min(capacity).min(available);
                ResampleResult {
                    input_frames: frames,
                    output_frames: frames,
                }
            }
            RateConversion::Upsample(k) => {
                let k = k as usize;
                // Rounded up so that a request smaller than k still consumes a frame.
                let input_frames = requested.div_ceil(k).min(capacity / k).min(available);
                ResampleResult {
                    input_frames,
                    output_frames: input_frames * k,
                }
            }
            RateConversion::Downsample(k) => {
                let k = k as usize;
                let output_frames = requested.min(capacity).min(available.div_ceil(k));
                ResampleResult {
                    input_frames: (output_frames * k).min(available),
                    output_frames,
                }
            }
        }
    }
}

/// The outcome of one resampling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResampleResult {
    pub input_frames: usize,
    pub output_frames: usize,
}

/// Converts source frames starting at the beginning of `input` into
/// interleaved float frames in `output`.
///
/// `available` is the number of source frames left in `input`. `output` must
/// hold at least `capacity * channels` samples.
#[allow(clippy::too_many_arguments)]
pub fn resample(
    conversion: RateConversion,
    format: SampleFormat,
    channels: usize,
    input: &[u8],
    available: usize,
    requested: usize,
    capacity: usize,
    gain: f32,
    output: &mut [f32],
) -> ResampleResult {
    let plan = conversion.plan(requested, capacity, available);
    let sample_size = format.bytes_per_sample();
    let frame_size = sample_size * channels;

    let (step, repeat) = match conversion {
        RateConversion::Passthrough => (1, 1),
        RateConversion::Upsample(k) => (1, k as usize),
        RateConversion::Downsample(k) => (k as usize, 1),
    };

    for out_frame in 0..plan.output_frames {
        let in_frame = out_frame / repeat * step;
        let src = &input[in_frame * frame_size..(in_frame + 1) * frame_size];
        let dst = &mut output[out_frame * channels..(out_frame + 1) * channels];
        for (sample, raw) in dst.iter_mut().zip(src.chunks_exact(sample_size)) {
            *sample = codec::to_f32(format, raw) * gain;
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_select() {
        assert_eq!(
            RateConversion::select(48000, 48000),
            Some(RateConversion::Passthrough)
        );
        assert_eq!(
            RateConversion::select(24000, 48000),
            Some(RateConversion::Upsample(2))
        );
        assert_eq!(
            RateConversion::select(96000, 48000),
            Some(RateConversion::Downsample(2))
        );
        assert_eq!(
            RateConversion::select(11025, 44100),
            Some(RateConversion::Upsample(4))
        );
        assert_eq!(RateConversion::select(44100, 48000), None);
        assert_eq!(RateConversion::select(0, 48000), None);
        assert_eq!(RateConversion::select(48000, 0), None);
    }

    #[test]
    fn test_passthrough_applies_gain() {
        let input = s16_bytes(&[16383, -16383, 0]);
        let mut output = [0.0f32; 8];
        let result = resample(
            RateConversion::Passthrough,
            SampleFormat::S16,
            1,
            &input,
            3,
            8,
            8,
            0.5,
            &mut output,
        );
        assert_eq!(
            result,
            ResampleResult {
                input_frames: 3,
                output_frames: 3
            }
        );
        assert!((output[0] - 0.25).abs() < 1e-4);
        assert!((output[1] + 0.25).abs() < 1e-4);
        assert_eq!(output[2], 0.0);
    }

    #[test]
    fn test_upsample_repeats_frames() {
        let input = s16_bytes(&[100, -100, 200, -200]);
        let mut output = [0.0f32; 32];
        let result = resample(
            RateConversion::Upsample(3),
            SampleFormat::S16,
            2,
            &input,
            2,
            6,
            16,
            1.0,
            &mut output,
        );
        assert_eq!(result.input_frames, 2);
        assert_eq!(result.output_frames, 6);

        let first = &output[0..2];
        for run in output[0..6].chunks_exact(2) {
            assert_eq!(run, first);
        }
        let second = &output[6..8];
        for run in output[6..12].chunks_exact(2) {
            assert_eq!(run, second);
        }
        assert_ne!(first, second);
    }

    #[test]
    fn test_upsample_small_request_makes_progress() {
        let plan = RateConversion::Upsample(4).plan(1, 4096, 10);
        assert_eq!(plan.input_frames, 1);
        assert_eq!(plan.output_frames, 4);

        let plan = RateConversion::Upsample(4).plan(9, 4096, 10);
        assert_eq!(plan.input_frames, 3);
        assert_eq!(plan.output_frames, 12);
    }

    #[test]
    fn test_upsample_bounded_by_capacity() {
        let plan = RateConversion::Upsample(3).plan(4096, 4096, 10_000);
        assert_eq!(plan.input_frames, 1365);
        assert_eq!(plan.output_frames, 4095);
    }

    #[test]
    fn test_downsample_skips_frames() {
        let input = s16_bytes(&[0, 1000, 2000, 3000, 4000, 5000, 6000, 7000]);
        let mut output = [0.0f32; 8];
        let result = resample(
            RateConversion::Downsample(2),
            SampleFormat::S16,
            1,
            &input,
            8,
            4,
            8,
            1.0,
            &mut output,
        );
        assert_eq!(result.input_frames, 8);
        assert_eq!(result.output_frames, 4);
        for (i, expected) in [0i16, 2000, 4000, 6000].iter().enumerate() {
            let raw = expected.to_le_bytes();
            assert_eq!(output[i], codec::to_f32(SampleFormat::S16, &raw));
        }
    }

    #[test]
    fn test_downsample_clamps_to_remaining() {
        let plan = RateConversion::Downsample(3).plan(100, 4096, 7);
        assert_eq!(plan.output_frames, 3);
        assert_eq!(plan.input_frames, 7);

        let plan = RateConversion::Downsample(2).plan(2, 4096, 10);
        assert_eq!(plan.output_frames, 2);
        assert_eq!(plan.input_frames, 4);
    }

    #[test]
    fn test_no_input_produces_nothing() {
        for conversion in [
            RateConversion::Passthrough,
            RateConversion::Upsample(2),
            RateConversion::Downsample(2),
        ] {
            assert_eq!(conversion.plan(64, 4096, 0), ResampleResult::default());
        }
    }
}
