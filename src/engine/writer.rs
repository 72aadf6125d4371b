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

//! The render side of the engine.
//!
//! A [`Writer`] is handed to the host audio callback. Each call drains the
//! staging buffer into the host's output and, when it runs dry, renders the
//! play queue into it again. All buffers are sized once at construction, so a
//! render pass never allocates.

use std::collections::VecDeque;
use std::sync::Arc;

use super::queue::{remove_finished, PlayItem, Playhead, QUEUE_RESERVE};
use super::{EngineError, MixMode, Shared};
use crate::audio::codec::Codecs;
use crate::audio::resample::{resample, RateConversion};
use crate::audio::{AudioFormat, SampleFormat, MAX_SOURCE_CHANNELS};

/// Frames of the native format held by the staging buffer.
pub const MAX_CONVERSION_FRAMES: usize = 4096;

/// Holds one render pass worth of frames in the native format.
pub struct ConversionBuffer {
    data: Vec<u8>,
    frame_size: usize,
    capacity: usize,
    frames_remaining: usize,
    read_cursor: usize,
}

impl ConversionBuffer {
    pub fn new(format: AudioFormat, capacity: usize) -> Result<ConversionBuffer, EngineError> {
        let frame_size = format.frame_size();
        let size = format.buffer_size(capacity);
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| EngineError::OutOfMemory { bytes: size })?;
        data.resize(size, format.sample_format.silence_byte());

        Ok(ConversionBuffer {
            data,
            frame_size,
            capacity,
            frames_remaining: 0,
            read_cursor: 0,
        })
    }

    /// The most frames the buffer can stage.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Staged frames not yet drained.
    pub fn frames_remaining(&self) -> usize {
        self.frames_remaining
    }

    /// Copies up to `frames` staged frames into the start of `out`. Returns
    /// the number of frames copied.
    pub fn drain(&mut self, out: &mut [u8], frames: usize) -> usize {
        let frames = self.peek(out, frames);
        self.read_cursor += frames;
        self.frames_remaining -= frames;
        frames
    }

    /// Like [`ConversionBuffer::drain`], but leaves the frames staged.
    pub fn peek(&self, out: &mut [u8], frames: usize) -> usize {
        let frames = frames
            .min(self.frames_remaining)
            .min(out.len() / self.frame_size);
        let start = self.read_cursor * self.frame_size;
        let size = frames * self.frame_size;
        out[..size].copy_from_slice(&self.data[start..start + size]);
        frames
    }

    /// Discards anything staged.
    pub fn clear(&mut self) {
        self.frames_remaining = 0;
        self.read_cursor = 0;
    }

    fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn stage(&mut self, frames: usize) {
        self.frames_remaining = frames.min(self.capacity);
        self.read_cursor = 0;
    }
}

/// Renders the play queue into the native format for the host callback.
pub struct Writer {
    shared: Arc<Shared>,
    format: AudioFormat,
    codecs: Codecs,
    staging: ConversionBuffer,
    mixer: Mixer,
    saved: Vec<Playhead>,
}

impl Writer {
    pub(crate) fn new(shared: Arc<Shared>) -> Result<Writer, EngineError> {
        let format = shared.format;
        let staging = ConversionBuffer::new(format, MAX_CONVERSION_FRAMES)?;
        let mixer = Mixer::new(format.channels as usize, MAX_CONVERSION_FRAMES)?;

        Ok(Writer {
            shared,
            format,
            codecs: Codecs::new(),
            staging,
            mixer,
            saved: Vec::with_capacity(QUEUE_RESERVE),
        })
    }

    /// The format written by [`Writer::write_frames`].
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Frames already rendered and waiting to be written.
    pub fn staged_frames(&self) -> usize {
        self.staging.frames_remaining()
    }

    /// Fills the first `frame_count` frames of `out` and returns `frame_count`.
    ///
    /// Frames come from the staging buffer first, then from fresh render
    /// passes. Once the queue has nothing left to give, the rest is silence.
    /// If a control thread holds the queue when a pass is due, the rest of
    /// this call is silence too; the render thread never waits on it.
    pub fn write_frames(
        &mut self,
        frame_count: usize,
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let needed = self.check_output(frame_count, out)?;
        let frame_size = self.format.frame_size();

        let mut written = 0;
        while written < frame_count {
            written += self
                .staging
                .drain(&mut out[written * frame_size..needed], frame_count - written);
            if written == frame_count {
                break;
            }

            let request = (frame_count - written).min(self.staging.capacity());
            if self.render(request) == 0 {
                out[written * frame_size..needed].fill(self.format.sample_format.silence_byte());
                break;
            }
        }

        Ok(frame_count)
    }

    /// Fills `out` with the frames the next [`Writer::write_frames`] call of
    /// the same length would produce, without moving playback.
    ///
    /// Staged frames stay staged and every play item keeps its cursor and
    /// finished state, so this is safe to call for previews and
    /// visualizations. It waits for the queue lock and may grow its save
    /// buffer, so keep it off the audio callback.
    pub fn peek_frames(
        &mut self,
        frame_count: usize,
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let needed = self.check_output(frame_count, out)?;
        let frame_size = self.format.frame_size();
        let capacity = self.staging.capacity();
        let master = self.shared.master_volume();

        let mut written = self.staging.peek(&mut out[..needed], frame_count);
        if written < frame_count {
            let mut items = self.shared.queue.lock();
            self.saved.clear();
            self.saved.extend(items.iter().map(PlayItem::playhead));

            while written < frame_count {
                let request = (frame_count - written).min(capacity);
                let mixed = self.mixer.mix_queue(
                    &mut items,
                    self.shared.mix_mode,
                    request,
                    capacity,
                    master,
                );
                let frames = mixed.min(frame_count - written);
                if frames == 0 {
                    break;
                }
                let samples = frames * self.mixer.channels;
                let converted = self.codecs.convert(
                    samples,
                    SampleFormat::F32,
                    self.format.sample_format,
                    bytemuck::cast_slice(&self.mixer.mix[..samples]),
                    &mut out[written * frame_size..(written + frames) * frame_size],
                );
                if converted.is_err() {
                    break;
                }
                written += frames;
            }

            for (item, playhead) in items.iter_mut().zip(&self.saved) {
                item.restore(*playhead);
            }
        }

        out[written * frame_size..needed].fill(self.format.sample_format.silence_byte());
        Ok(frame_count)
    }

    /// Returns the byte length of `frame_count` frames, or an error when
    /// `out` cannot hold them.
    fn check_output(&self, frame_count: usize, out: &[u8]) -> Result<usize, EngineError> {
        let needed = frame_count * self.format.frame_size();
        if out.len() < needed {
            return Err(EngineError::BufferTooSmall {
                needed,
                actual: out.len(),
            });
        }
        Ok(needed)
    }

    /// Renders the queue into the staging buffer. Returns the frames staged.
    fn render(&mut self, request: usize) -> usize {
        let capacity = self.staging.capacity();
        let master = self.shared.master_volume();

        let Some(mut items) = self.shared.queue.try_lock() else {
            return 0;
        };
        let mixed = self
            .mixer
            .mix_queue(&mut items, self.shared.mix_mode, request, capacity, master);
        remove_finished(&mut items);
        drop(items);

        let samples = mixed * self.mixer.channels;
        let converted = self.codecs.convert(
            samples,
            SampleFormat::F32,
            self.format.sample_format,
            bytemuck::cast_slice(&self.mixer.mix[..samples]),
            self.staging.storage_mut(),
        );
        let staged = if converted.is_ok() { mixed } else { 0 };
        self.staging.stage(staged);
        staged
    }
}

fn float_buffer(len: usize) -> Result<Vec<f32>, EngineError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| EngineError::OutOfMemory {
            bytes: len * std::mem::size_of::<f32>(),
        })?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}

/// Float working space for render passes.
struct Mixer {
    channels: usize,
    mix: Vec<f32>,
    scratch: Vec<f32>,
}

impl Mixer {
    fn new(channels: usize, frames: usize) -> Result<Mixer, EngineError> {
        Ok(Mixer {
            channels,
            mix: float_buffer(frames * channels)?,
            scratch: float_buffer(frames * MAX_SOURCE_CHANNELS as usize)?,
        })
    }

    /// Mixes one pass of the queue into the mix buffer. Returns the frames
    /// holding data.
    fn mix_queue(
        &mut self,
        items: &mut VecDeque<PlayItem>,
        mode: MixMode,
        request: usize,
        capacity: usize,
        master: f32,
    ) -> usize {
        let mut mixed = 0;
        match mode {
            MixMode::Head => {
                if let Some(item) = items.iter_mut().find(|item| !item.is_finished()) {
                    self.render_item(item, request, capacity, master, &mut mixed);
                }
            }
            MixMode::Mix => {
                let target = mix_target(items, request, capacity);
                for item in items.iter_mut() {
                    self.render_item(item, target, capacity, master, &mut mixed);
                }
            }
        }
        mixed
    }

    /// Renders up to `request` frames of one item into the mix, looping
    /// repeating items within the pass. `mixed` tracks how many mix frames
    /// hold data this pass; frames past it are zeroed before use.
    fn render_item(
        &mut self,
        item: &mut PlayItem,
        request: usize,
        capacity: usize,
        master: f32,
        mixed: &mut usize,
    ) {
        let Some(conversion) = item.conversion() else {
            item.finish();
            return;
        };

        let format = item.source().format();
        let in_channels = format.channels as usize;
        let out_channels = self.channels;
        let frame_size = format.frame_size();
        let gain = item.gain() * master;

        let mut written = 0;
        while written < request && !item.is_finished() {
            let result = {
                let input = &item.source().data()[item.cursor() * frame_size..];
                resample(
                    conversion,
                    format.sample_format,
                    in_channels,
                    input,
                    item.remaining(),
                    request - written,
                    capacity - written,
                    gain,
                    &mut self.scratch,
                )
            };

            if result.output_frames > 0 {
                let end = written + result.output_frames;
                if end > *mixed {
                    self.mix[*mixed * out_channels..end * out_channels].fill(0.0);
                    *mixed = end;
                }
                accumulate(
                    &self.scratch[..result.output_frames * in_channels],
                    in_channels,
                    &mut self.mix[written * out_channels..end * out_channels],
                    out_channels,
                );
                written = end;
            }

            item.advance(result.input_frames);
            if result.output_frames == 0 {
                break;
            }
        }
    }
}

/// The frames every item renders in a mixed pass.
///
/// An upsampled item advances in runs of k output frames, so the request is
/// rounded up to a common multiple of the active factors. Every item that
/// keeps playing then stops on the same frame and none leaves a hole in the
/// mix for the others. Factors whose common multiple exceeds the capacity
/// fall back to the plain request.
fn mix_target(items: &VecDeque<PlayItem>, request: usize, capacity: usize) -> usize {
    let mut step = 1;
    for item in items.iter().filter(|item| !item.is_finished()) {
        if let Some(RateConversion::Upsample(k)) = item.conversion() {
            step = lcm(step, k as usize);
            if step > capacity {
                return request.min(capacity);
            }
        }
    }
    let target = request.div_ceil(step) * step;
    if target <= capacity {
        target
    } else {
        capacity / step * step
    }
}

fn lcm(a: usize, b: usize) -> usize {
    let (mut x, mut y) = (a, b);
    while y != 0 {
        (x, y) = (y, x % y);
    }
    a / x * b
}

/// Adds source frames onto output frames. When the channel counts differ the
/// first source channel goes to every output channel.
fn accumulate(src: &[f32], in_channels: usize, dst: &mut [f32], out_channels: usize) {
    if in_channels == out_channels {
        for (d, s) in dst.iter_mut().zip(src) {
            *d += *s;
        }
        return;
    }
    for (out_frame, in_frame) in dst
        .chunks_exact_mut(out_channels)
        .zip(src.chunks_exact(in_channels))
    {
        let value = in_frame[0];
        for d in out_frame {
            *d += value;
        }
    }
}
