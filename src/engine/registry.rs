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

//! Decoded sources and the registry that owns them.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::EngineError;
use crate::audio::decoder::DecodedAudio;
use crate::audio::tone::ToneGenerator;
use crate::audio::{AudioFormat, SampleFormat, MAX_SOURCE_CHANNELS};

/// Identifies a published source. Ids start at 1 and increase with each
/// publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SourceId(u32);

impl SourceId {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable buffer of interleaved PCM.
///
/// A source is built unpublished (id 0), filled, and then handed to the
/// registry, which assigns its id. After that it is only shared through
/// `Arc` and never written again.
pub struct AudioSource {
    id: SourceId,
    format: AudioFormat,
    frames: usize,
    data: Box<[u8]>,
}

impl AudioSource {
    /// Allocates a silent source able to hold `frames` frames of `format`.
    pub fn allocate(format: AudioFormat, frames: usize) -> Result<AudioSource, EngineError> {
        validate_source_format(&format)?;

        let size = frames
            .checked_mul(format.frame_size())
            .ok_or(EngineError::OutOfMemory { bytes: usize::MAX })?;
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| EngineError::OutOfMemory { bytes: size })?;
        data.resize(size, format.sample_format.silence_byte());

        Ok(AudioSource {
            id: SourceId::default(),
            format,
            frames,
            data: data.into_boxed_slice(),
        })
    }

    /// Copies decoded PCM into a newly allocated source.
    pub fn from_decoded(decoded: &DecodedAudio) -> Result<AudioSource, EngineError> {
        let mut source = AudioSource::allocate(decoded.format, decoded.frames())?;
        let size = source.format.buffer_size(source.frames);
        if decoded.data.len() < size || source.data.len() < size {
            return Err(EngineError::BufferTooSmall {
                needed: size,
                actual: source.data.len().min(decoded.data.len()),
            });
        }
        source.data[..size].copy_from_slice(&decoded.data[..size]);
        Ok(source)
    }

    /// Renders `frames` frames of a tone as S16.
    pub fn from_tone(
        tone: &mut ToneGenerator,
        channels: u16,
        sample_rate: u32,
        frames: usize,
    ) -> Result<AudioSource, EngineError> {
        let format = AudioFormat::new(channels, sample_rate, SampleFormat::S16)
            .map_err(|e| EngineError::InvalidFormat(e.to_string()))?;
        let mut source = AudioSource::allocate(format, frames)?;
        tone.fill(
            &mut source.data,
            SampleFormat::S16,
            sample_rate,
            channels,
            frames,
        );
        Ok(source)
    }

    /// The id assigned at publication, 0 before.
    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.format.sample_format
    }

    /// The number of frames held.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The sample bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Writable sample bytes, only reachable before publication.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The byte length of the sample buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.format.sample_rate as f64)
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("frames", &self.frames)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn validate_source_format(format: &AudioFormat) -> Result<(), EngineError> {
    if format.channels == 0 || format.channels > MAX_SOURCE_CHANNELS {
        return Err(EngineError::InvalidFormat(format!(
            "source channel count {} is outside 1..={}",
            format.channels, MAX_SOURCE_CHANNELS
        )));
    }
    if format.sample_rate == 0 {
        return Err(EngineError::InvalidFormat(
            "sample rate must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Owns every published source for the lifetime of the engine.
pub struct Registry {
    sources: Mutex<Vec<Arc<AudioSource>>>,
    next_id: AtomicU32,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            sources: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// Publishes a source. The id is taken under the lock so that the list
    /// stays ordered by id.
    pub fn add(&self, mut source: AudioSource) -> Arc<AudioSource> {
        let mut sources = self.sources.lock();
        source.id = SourceId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let source = Arc::new(source);
        sources.push(source.clone());
        source
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<AudioSource>> {
        self.sources.lock().iter().find(|s| s.id == id).cloned()
    }

    /// A snapshot of the published sources in id order.
    pub fn snapshot(&self) -> Vec<Arc<AudioSource>> {
        self.sources.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.lock().is_empty()
    }

    /// Releases every source. Returns how many were held.
    pub fn clear(&self) -> usize {
        let mut sources = self.sources.lock();
        let count = sources.len();
        sources.clear();
        count
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
