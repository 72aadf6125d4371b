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

//! Conversion between interleaved PCM sample formats and between interleaved
//! and planar layouts.
//!
//! Every integer format converts to and from 32-bit float. Conversions are
//! looked up in a dispatch table keyed by [`SampleFormat`]; a pairing without
//! an entry is reported as unsupported and nothing is written.
//!
//! ```text
//! Interleaved: [L R] [L R] [L R] [L R]
//! Planar:      [L L L L] [R R R R]
//! ```

use thiserror::Error;

use super::format::SampleFormat;

/// Largest positive value of a packed 24-bit sample.
pub const S24_MAX: i32 = 8_388_607;

/// Smallest value of a packed 24-bit sample.
pub const S24_MIN: i32 = -8_388_608;

/// Errors reported by the codec functions. A failed call performs no writes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("conversion from {from} to {to} is not supported")]
    Unsupported { from: SampleFormat, to: SampleFormat },

    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("expected {expected} planar buffers, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("channel count must be greater than 0")]
    NoChannels,
}

/// Converts `count` samples from `input` into `output`.
pub type ConvertFn = fn(count: usize, input: &[u8], output: &mut [u8]);

/// Interleaves `frames` frames of `planar` channel buffers into `output`.
pub type InterleaveFn = fn(frames: usize, planar: &[&[u8]], output: &mut [u8]);

/// Splits `frames` interleaved frames from `input` into `planar` channel buffers.
pub type DeinterleaveFn = fn(frames: usize, input: &[u8], planar: &mut [&mut [u8]]);

/// Clips a float sample to the range of -1.0 to 1.0.
#[inline]
pub fn clip(x: f32) -> f32 {
    x.clamp(-1.0, 1.0)
}

/// Reads a sign-extended 24-bit sample from three little-endian bytes.
#[inline]
pub fn read_s24(raw: &[u8]) -> i32 {
    let packed = ((raw[0] as u32) << 8) | ((raw[1] as u32) << 16) | ((raw[2] as u32) << 24);
    (packed as i32) >> 8
}

/// Writes the low 24 bits of `value` as three little-endian bytes.
#[inline]
pub fn write_s24(value: i32, out: &mut [u8]) {
    out[..3].copy_from_slice(&value.to_le_bytes()[..3]);
}

/// Negative values are divided by `max - 1`, so the two most negative values
/// land just past -1.0 and are clipped back onto it.
#[inline]
fn scale_signed(value: f32, max: f32) -> f32 {
    if value < 0.0 {
        clip(value / (max - 1.0))
    } else {
        value / max
    }
}

/// Decodes the sample at the start of `raw` into a float in the range of -1.0 to 1.0.
#[inline]
pub fn to_f32(format: SampleFormat, raw: &[u8]) -> f32 {
    match format {
        SampleFormat::U8 => (raw[0] as f32 / u8::MAX as f32) * 2.0 - 1.0,
        SampleFormat::S16 => {
            let value = i16::from_le_bytes([raw[0], raw[1]]);
            scale_signed(value as f32, i16::MAX as f32)
        }
        SampleFormat::S24 => scale_signed(read_s24(raw) as f32, S24_MAX as f32),
        SampleFormat::S32 => {
            let value = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            scale_signed(value as f32, i32::MAX as f32)
        }
        SampleFormat::F32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
    }
}

/// Encodes a float sample into the start of `out`. The value is clipped first,
/// then scaled by the target maximum and truncated. No dithering.
#[inline]
pub fn from_f32(format: SampleFormat, value: f32, out: &mut [u8]) {
    let x = clip(value);
    match format {
        SampleFormat::U8 => out[0] = ((x + 1.0) * (u8::MAX as f32 / 2.0)) as u8,
        SampleFormat::S16 => {
            out[..2].copy_from_slice(&((x * i16::MAX as f32) as i16).to_le_bytes());
        }
        SampleFormat::S24 => write_s24((x * S24_MAX as f32) as i32, out),
        SampleFormat::S32 => {
            out[..4].copy_from_slice(&((x * i32::MAX as f32) as i32).to_le_bytes());
        }
        SampleFormat::F32 => out[..4].copy_from_slice(&x.to_le_bytes()),
    }
}

fn decode_samples(format: SampleFormat, count: usize, input: &[u8], output: &mut [u8]) {
    for (src, dst) in input
        .chunks_exact(format.bytes_per_sample())
        .zip(output.chunks_exact_mut(4))
        .take(count)
    {
        dst.copy_from_slice(&to_f32(format, src).to_le_bytes());
    }
}

fn encode_samples(format: SampleFormat, count: usize, input: &[u8], output: &mut [u8]) {
    for (src, dst) in input
        .chunks_exact(4)
        .zip(output.chunks_exact_mut(format.bytes_per_sample()))
        .take(count)
    {
        from_f32(format, f32::from_le_bytes([src[0], src[1], src[2], src[3]]), dst);
    }
}

fn convert_u8_to_f32(count: usize, input: &[u8], output: &mut [u8]) {
    decode_samples(SampleFormat::U8, count, input, output)
}

fn convert_s16_to_f32(count: usize, input: &[u8], output: &mut [u8]) {
    decode_samples(SampleFormat::S16, count, input, output)
}

fn convert_s24_to_f32(count: usize, input: &[u8], output: &mut [u8]) {
    decode_samples(SampleFormat::S24, count, input, output)
}

fn convert_s32_to_f32(count: usize, input: &[u8], output: &mut [u8]) {
    decode_samples(SampleFormat::S32, count, input, output)
}

fn convert_f32_to_u8(count: usize, input: &[u8], output: &mut [u8]) {
    encode_samples(SampleFormat::U8, count, input, output)
}

fn convert_f32_to_s16(count: usize, input: &[u8], output: &mut [u8]) {
    encode_samples(SampleFormat::S16, count, input, output)
}

fn convert_f32_to_s24(count: usize, input: &[u8], output: &mut [u8]) {
    encode_samples(SampleFormat::S24, count, input, output)
}

fn convert_f32_to_s32(count: usize, input: &[u8], output: &mut [u8]) {
    encode_samples(SampleFormat::S32, count, input, output)
}

/// Interleaves samples of a fixed byte width, one frame at a time.
fn interleave_fixed<const N: usize>(frames: usize, planar: &[&[u8]], output: &mut [u8]) {
    let channels = planar.len();
    for (frame_index, frame) in output
        .chunks_exact_mut(N * channels)
        .take(frames)
        .enumerate()
    {
        let offset = frame_index * N;
        for (dst, channel) in frame.chunks_exact_mut(N).zip(planar.iter()) {
            dst.copy_from_slice(&channel[offset..offset + N]);
        }
    }
}

/// Deinterleaves samples of a fixed byte width, one frame at a time.
fn deinterleave_fixed<const N: usize>(frames: usize, input: &[u8], planar: &mut [&mut [u8]]) {
    let channels = planar.len();
    for (frame_index, frame) in input.chunks_exact(N * channels).take(frames).enumerate() {
        let offset = frame_index * N;
        for (src, channel) in frame.chunks_exact(N).zip(planar.iter_mut()) {
            channel[offset..offset + N].copy_from_slice(src);
        }
    }
}

/// Slow path: copies every sample individually by the format's byte width.
fn interleave_bytes(sample_size: usize, frames: usize, planar: &[&[u8]], output: &mut [u8]) {
    let channels = planar.len();
    for (channel_index, channel) in planar.iter().enumerate() {
        for frame_index in 0..frames {
            let src = frame_index * sample_size;
            let dst = (frame_index * channels + channel_index) * sample_size;
            output[dst..dst + sample_size].copy_from_slice(&channel[src..src + sample_size]);
        }
    }
}

/// Slow path: copies every sample individually by the format's byte width.
fn deinterleave_bytes(sample_size: usize, frames: usize, input: &[u8], planar: &mut [&mut [u8]]) {
    let channels = planar.len();
    for (channel_index, channel) in planar.iter_mut().enumerate() {
        for frame_index in 0..frames {
            let src = (frame_index * channels + channel_index) * sample_size;
            let dst = frame_index * sample_size;
            channel[dst..dst + sample_size].copy_from_slice(&input[src..src + sample_size]);
        }
    }
}

/// Dispatch tables for sample conversion and (de)interleaving, keyed by format.
#[derive(Clone)]
pub struct Codecs {
    conversions: [[Option<ConvertFn>; 5]; 5],
    interleavers: [Option<InterleaveFn>; 5],
    deinterleavers: [Option<DeinterleaveFn>; 5],
}

impl Codecs {
    /// Builds the default dispatch tables.
    pub fn new() -> Self {
        let mut conversions: [[Option<ConvertFn>; 5]; 5] = [[None; 5]; 5];
        let f32_index = SampleFormat::F32.index();

        conversions[SampleFormat::U8.index()][f32_index] = Some(convert_u8_to_f32);
        conversions[SampleFormat::S16.index()][f32_index] = Some(convert_s16_to_f32);
        conversions[SampleFormat::S24.index()][f32_index] = Some(convert_s24_to_f32);
        conversions[SampleFormat::S32.index()][f32_index] = Some(convert_s32_to_f32);

        conversions[f32_index][SampleFormat::U8.index()] = Some(convert_f32_to_u8);
        conversions[f32_index][SampleFormat::S16.index()] = Some(convert_f32_to_s16);
        conversions[f32_index][SampleFormat::S24.index()] = Some(convert_f32_to_s24);
        conversions[f32_index][SampleFormat::S32.index()] = Some(convert_f32_to_s32);

        // S24 has no typed entry and goes through the byte-copy path.
        let mut interleavers: [Option<InterleaveFn>; 5] = [None; 5];
        interleavers[SampleFormat::U8.index()] = Some(interleave_fixed::<1>);
        interleavers[SampleFormat::S16.index()] = Some(interleave_fixed::<2>);
        interleavers[SampleFormat::S32.index()] = Some(interleave_fixed::<4>);
        interleavers[SampleFormat::F32.index()] = Some(interleave_fixed::<4>);

        let mut deinterleavers: [Option<DeinterleaveFn>; 5] = [None; 5];
        deinterleavers[SampleFormat::U8.index()] = Some(deinterleave_fixed::<1>);
        deinterleavers[SampleFormat::S16.index()] = Some(deinterleave_fixed::<2>);
        deinterleavers[SampleFormat::S32.index()] = Some(deinterleave_fixed::<4>);
        deinterleavers[SampleFormat::F32.index()] = Some(deinterleave_fixed::<4>);

        Codecs {
            conversions,
            interleavers,
            deinterleavers,
        }
    }

    /// Returns true if `from` samples can be converted into `to` samples.
    pub fn supports(&self, from: SampleFormat, to: SampleFormat) -> bool {
        from == to || self.conversions[from.index()][to.index()].is_some()
    }

    /// Returns true if interleaving `format` uses a typed function instead of
    /// the byte-copy fallback.
    pub fn has_typed_interleave(&self, format: SampleFormat) -> bool {
        self.interleavers[format.index()].is_some()
    }

    /// Converts `count` interleaved samples from one format to another.
    pub fn convert(
        &self,
        count: usize,
        from: SampleFormat,
        to: SampleFormat,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), CodecError> {
        check_len(count * from.bytes_per_sample(), input.len())?;
        check_len(count * to.bytes_per_sample(), output.len())?;

        if from == to {
            let size = count * from.bytes_per_sample();
            output[..size].copy_from_slice(&input[..size]);
            return Ok(());
        }

        let convert = self.conversions[from.index()][to.index()]
            .ok_or(CodecError::Unsupported { from, to })?;
        convert(count, input, output);
        Ok(())
    }

    /// Splits interleaved frames into one buffer per channel.
    pub fn deinterleave(
        &self,
        frames: usize,
        format: SampleFormat,
        input: &[u8],
        planar: &mut [&mut [u8]],
    ) -> Result<(), CodecError> {
        let channels = planar.len();
        if channels == 0 {
            return Err(CodecError::NoChannels);
        }
        let sample_size = format.bytes_per_sample();
        check_len(frames * channels * sample_size, input.len())?;
        for channel in planar.iter() {
            check_len(frames * sample_size, channel.len())?;
        }

        match self.deinterleavers[format.index()] {
            Some(deinterleave) => deinterleave(frames, input, planar),
            None => deinterleave_bytes(sample_size, frames, input, planar),
        }
        Ok(())
    }

    /// Joins one buffer per channel into interleaved frames.
    pub fn interleave(
        &self,
        frames: usize,
        format: SampleFormat,
        planar: &[&[u8]],
        output: &mut [u8],
    ) -> Result<(), CodecError> {
        let channels = planar.len();
        if channels == 0 {
            return Err(CodecError::NoChannels);
        }
        let sample_size = format.bytes_per_sample();
        check_len(frames * channels * sample_size, output.len())?;
        for channel in planar.iter() {
            check_len(frames * sample_size, channel.len())?;
        }

        match self.interleavers[format.index()] {
            Some(interleave) => interleave(frames, planar, output),
            None => interleave_bytes(sample_size, frames, planar, output),
        }
        Ok(())
    }
}

impl Default for Codecs {
    fn default() -> Self {
        Self::new()
    }
}

fn check_len(needed: usize, actual: usize) -> Result<(), CodecError> {
    if actual < needed {
        return Err(CodecError::BufferTooSmall { needed, actual });
    }
    Ok(())
}

/// Averages interleaved float channels down to a single channel.
pub fn monolize(
    channels: usize,
    frames: usize,
    input: &[f32],
    output: &mut [f32],
) -> Result<(), CodecError> {
    if channels == 0 {
        return Err(CodecError::NoChannels);
    }
    check_len(frames * channels, input.len())?;
    check_len(frames, output.len())?;

    if channels == 1 {
        output[..frames].copy_from_slice(&input[..frames]);
        return Ok(());
    }

    let scale = 1.0 / channels as f32;
    for (frame, out) in input.chunks_exact(channels).zip(output.iter_mut()).take(frames) {
        *out = frame.iter().sum::<f32>() * scale;
    }
    Ok(())
}
