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

//! The audio engine: a registry of decoded sources, a queue of play items and
//! the render-side [`Writer`] that turns them into output frames.
//!
//! ```text
//! control threads                      render thread
//! ---------------                      -------------
//! AudioEngine::load_file_source  --+
//! AudioEngine::play              --+-> Registry / PlayQueue --> Writer::write_frames
//! AudioEngine::stop              --+
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::decoder::{DecodeError, FileDecoder, SymphoniaDecoder};
use crate::audio::resample::RateConversion;
use crate::audio::tone::ToneGenerator;
use crate::audio::{AudioFormat, SampleFormat};

pub mod queue;
pub mod registry;
pub mod writer;

pub use queue::{PlayItemId, PlayItemInfo};
pub use registry::{AudioSource, SourceId};
pub use writer::{ConversionBuffer, Writer, MAX_CONVERSION_FRAMES};

use queue::PlayQueue;
use registry::Registry;

/// Errors reported by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("invalid gain: {0}")]
    InvalidGain(f32),

    #[error("unable to allocate {bytes} bytes of sample data")]
    OutOfMemory { bytes: usize },

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("the audio engine has been shut down")]
    Shutdown,

    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },
}

/// How the writer combines queued items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixMode {
    /// Every item is summed into the output.
    #[default]
    Mix,
    /// Only the item at the head of the queue is heard.
    Head,
}

impl FromStr for MixMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mix" => Ok(MixMode::Mix),
            "head" => Ok(MixMode::Head),
            other => Err(format!("unknown mix mode: {}", other)),
        }
    }
}

impl fmt::Display for MixMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixMode::Mix => write!(f, "mix"),
            MixMode::Head => write!(f, "head"),
        }
    }
}

/// State shared between engine handles and the writer.
pub(crate) struct Shared {
    pub(crate) format: AudioFormat,
    pub(crate) mix_mode: MixMode,
    pub(crate) registry: Registry,
    pub(crate) queue: PlayQueue,
    master_volume: AtomicU32,
    shutdown: AtomicBool,
}

impl Shared {
    pub(crate) fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume.load(Ordering::Relaxed))
    }
}

/// A handle to the engine. Clones share the same registry and queue.
#[derive(Clone)]
pub struct AudioEngine {
    shared: Arc<Shared>,
    decoder: Arc<dyn FileDecoder>,
}

impl AudioEngine {
    /// Creates an engine that renders in `format`, summing every queued item.
    pub fn init(format: AudioFormat) -> Result<(AudioEngine, Writer), EngineError> {
        AudioEngine::init_with(format, MixMode::default(), 1.0)
    }

    /// Creates an engine with an explicit mix mode and master volume.
    pub fn init_with(
        format: AudioFormat,
        mix_mode: MixMode,
        master_volume: f32,
    ) -> Result<(AudioEngine, Writer), EngineError> {
        if format.channels == 0 {
            return Err(EngineError::InvalidFormat(
                "output channel count must be greater than 0".to_string(),
            ));
        }
        if format.sample_rate == 0 {
            return Err(EngineError::InvalidFormat(
                "output sample rate must be greater than 0".to_string(),
            ));
        }
        validate_gain(master_volume)?;

        let shared = Arc::new(Shared {
            format,
            mix_mode,
            registry: Registry::new(),
            queue: PlayQueue::new(),
            master_volume: AtomicU32::new(master_volume.to_bits()),
            shutdown: AtomicBool::new(false),
        });
        let writer = Writer::new(shared.clone())?;

        info!(
            format = %format,
            mix_mode = %mix_mode,
            master_volume,
            "Audio engine initialized"
        );

        Ok((
            AudioEngine {
                shared,
                decoder: Arc::new(SymphoniaDecoder),
            },
            writer,
        ))
    }

    /// Replaces the decoder used by [`AudioEngine::load_file_source`].
    pub fn with_decoder(mut self, decoder: Arc<dyn FileDecoder>) -> AudioEngine {
        self.decoder = decoder;
        self
    }

    /// The format the writer renders in.
    pub fn native_format(&self) -> AudioFormat {
        self.shared.format
    }

    pub fn mix_mode(&self) -> MixMode {
        self.shared.mix_mode
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    fn check_running(&self) -> Result<(), EngineError> {
        if self.is_shutdown() {
            return Err(EngineError::Shutdown);
        }
        Ok(())
    }

    /// Allocates an unpublished silent source to be filled by the caller and
    /// then passed to [`AudioEngine::add_source`].
    pub fn allocate_source(
        &self,
        channels: u16,
        sample_rate: u32,
        sample_format: SampleFormat,
        frames: usize,
    ) -> Result<AudioSource, EngineError> {
        self.check_running()?;
        AudioSource::allocate(
            AudioFormat {
                channels,
                sample_rate,
                sample_format,
            },
            frames,
        )
    }

    /// Publishes a source, assigning its id.
    pub fn add_source(&self, source: AudioSource) -> Result<Arc<AudioSource>, EngineError> {
        self.check_running()?;
        let source = self.shared.registry.add(source);
        debug!(
            source_id = %source.id(),
            format = %source.format(),
            frames = source.frames(),
            "Added audio source"
        );
        Ok(source)
    }

    /// Decodes a file and publishes it as a source.
    pub fn load_file_source<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Arc<AudioSource>, EngineError> {
        self.check_running()?;
        let path = path.as_ref();
        let decoded = self.decoder.decode(path)?;
        let source = self.add_source(AudioSource::from_decoded(&decoded)?)?;
        info!(
            path = ?path,
            source_id = %source.id(),
            format = %source.format(),
            frames = source.frames(),
            "Loaded audio file"
        );
        Ok(source)
    }

    /// Renders a tone into a new S16 source and publishes it.
    pub fn generate_source(
        &self,
        tone: &mut ToneGenerator,
        channels: u16,
        sample_rate: u32,
        frames: usize,
    ) -> Result<Arc<AudioSource>, EngineError> {
        self.check_running()?;
        let source = self.add_source(AudioSource::from_tone(tone, channels, sample_rate, frames)?)?;
        info!(
            source_id = %source.id(),
            waveform = %tone.waveform,
            frequency = tone.frequency,
            frames,
            "Generated tone source"
        );
        Ok(source)
    }

    pub fn source_by_id(&self, id: SourceId) -> Option<Arc<AudioSource>> {
        self.shared.registry.get(id)
    }

    /// A snapshot of every published source in id order.
    pub fn sources(&self) -> Vec<Arc<AudioSource>> {
        self.shared.registry.snapshot()
    }

    pub fn source_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Stops every play item and releases every source. Returns the number of
    /// sources released.
    pub fn clear_sources(&self) -> usize {
        let stopped = self.shared.queue.stop_all();
        let cleared = self.shared.registry.clear();
        info!(stopped, cleared, "Cleared audio sources");
        cleared
    }

    /// Queues a playback of `source`. Sources whose rate does not divide
    /// evenly into the output rate, or the other way around, play as silence.
    pub fn play(
        &self,
        source: &Arc<AudioSource>,
        repeat: bool,
        gain: f32,
    ) -> Result<PlayItemId, EngineError> {
        self.check_running()?;
        validate_gain(gain)?;

        let output_rate = self.shared.format.sample_rate;
        if RateConversion::select(source.sample_rate(), output_rate).is_none() {
            warn!(
                source_id = %source.id(),
                source_rate = source.sample_rate(),
                output_rate,
                "Unsupported sample rate conversion, source will not be heard"
            );
        }

        let id = self
            .shared
            .queue
            .push(source.clone(), repeat, gain, output_rate);
        info!(
            play_id = %id,
            source_id = %source.id(),
            repeat,
            gain,
            "Playing audio source"
        );
        Ok(id)
    }

    /// Queues a playback of `source` at full gain.
    pub fn play_source(
        &self,
        source: &Arc<AudioSource>,
        repeat: bool,
    ) -> Result<PlayItemId, EngineError> {
        self.play(source, repeat, 1.0)
    }

    /// Stops a play item. Returns false if it had already finished.
    ///
    /// Frames of the item that the writer has already staged still play: up
    /// to `MAX_CONVERSION_FRAMES - 1` frames, about 85 ms at 48 kHz.
    pub fn stop(&self, id: PlayItemId) -> bool {
        let stopped = self.shared.queue.stop(id);
        debug!(play_id = %id, stopped, "Stop requested");
        stopped
    }

    /// Stops every play item. Returns how many were stopped. As with
    /// [`AudioEngine::stop`], frames already staged by the writer still play.
    pub fn stop_all(&self) -> usize {
        let stopped = self.shared.queue.stop_all();
        debug!(stopped, "Stopped all play items");
        stopped
    }

    /// A snapshot of the queued play items, head first.
    pub fn play_items(&self) -> Vec<PlayItemInfo> {
        self.shared.queue.snapshot()
    }

    pub fn is_playing(&self) -> bool {
        !self.shared.queue.is_empty()
    }

    /// Sets the gain applied on top of every item's own gain.
    pub fn set_master_volume(&self, volume: f32) -> Result<(), EngineError> {
        validate_gain(volume)?;
        self.shared
            .master_volume
            .store(volume.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.master_volume()
    }

    /// Shuts the engine down. The writer is taken by value, so the host must
    /// have released its callback before this can be called.
    pub fn shutdown(self, writer: Writer) {
        drop(writer);
        self.shared.shutdown.store(true, Ordering::Release);
        let stopped = self.shared.queue.stop_all();
        let cleared = self.shared.registry.clear();
        info!(stopped, cleared, "Audio engine shut down");
    }
}

fn validate_gain(gain: f32) -> Result<(), EngineError> {
    if !gain.is_finite() || gain < 0.0 {
        return Err(EngineError::InvalidGain(gain));
    }
    Ok(())
}
