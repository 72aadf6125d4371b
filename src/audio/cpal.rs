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
use std::fmt;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info};

use super::thread_priority::CallbackPriority;
use super::{AudioFormat, SampleFormat};
use crate::engine::Writer;

/// Errors raised while talking to the host audio system.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no output device found with name {0}")]
    DeviceNotFound(String),

    #[error("no default output device")]
    NoDefaultDevice,

    #[error("output device does not support {0}")]
    UnsupportedFormat(String),

    #[error("the writer is still owned by the output callback")]
    WriterInUse,

    #[error(transparent)]
    HostUnavailable(#[from] cpal::HostUnavailable),

    #[error(transparent)]
    Devices(#[from] cpal::DevicesError),

    #[error(transparent)]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error(transparent)]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error(transparent)]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error(transparent)]
    PauseStream(#[from] cpal::PauseStreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A summary of an output device for listing.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// The name of the device.
    pub name: String,
    /// The name of the host the device belongs to.
    pub host: String,
    /// The maximum number of channels the device supports.
    pub max_channels: u16,
    /// The device's preferred format, if it reports one we can render.
    pub default_format: Option<AudioFormat>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Maps a sample format onto cpal's. S24 has no cpal counterpart.
fn to_cpal_format(format: SampleFormat) -> Option<cpal::SampleFormat> {
    match format {
        SampleFormat::U8 => Some(cpal::SampleFormat::U8),
        SampleFormat::S16 => Some(cpal::SampleFormat::I16),
        SampleFormat::S24 => None,
        SampleFormat::S32 => Some(cpal::SampleFormat::I32),
        SampleFormat::F32 => Some(cpal::SampleFormat::F32),
    }
}

fn from_cpal_format(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::U8 => Some(SampleFormat::U8),
        cpal::SampleFormat::I16 => Some(SampleFormat::S16),
        cpal::SampleFormat::I32 => Some(SampleFormat::S32),
        cpal::SampleFormat::F32 => Some(SampleFormat::F32),
        _ => None,
    }
}

/// Lists the output devices of every available host.
pub fn list_devices() -> Result<Vec<DeviceInfo>, OutputError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);
            if max_channels == 0 {
                continue;
            }

            let default_format = device
                .default_output_config()
                .ok()
                .and_then(|config| {
                    from_cpal_format(config.sample_format()).map(|sample_format| AudioFormat {
                        channels: config.channels(),
                        sample_rate: config.sample_rate().0,
                        sample_format,
                    })
                });

            devices.push(DeviceInfo {
                name: device.name()?,
                host: host_id.name().to_string(),
                max_channels,
                default_format,
            });
        }
    }

    devices.sort_by_key(|device| device.name.to_string());
    Ok(devices)
}

/// An output device the engine can render to.
pub struct OutputDevice {
    name: String,
    device: cpal::Device,
}

impl OutputDevice {
    /// Opens the named device, or the default output device of the default
    /// host when no name is given.
    pub fn open(name: Option<&str>) -> Result<OutputDevice, OutputError> {
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let Some(name) = name else {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or(OutputError::NoDefaultDevice)?;
            return Ok(OutputDevice {
                name: device.name()?,
                device,
            });
        };

        for host_id in cpal::available_hosts() {
            let Ok(devices) = cpal::host_from_id(host_id)?.devices() else {
                continue;
            };
            for device in devices {
                if device.name().map(|n| n.trim() == name).unwrap_or(false) {
                    return Ok(OutputDevice {
                        name: name.to_string(),
                        device,
                    });
                }
            }
        }
        Err(OutputError::DeviceNotFound(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the format to render in. A requested format must be one the
    /// device supports; otherwise the device's default is used, falling back
    /// to F32 when the default sample type has no counterpart.
    pub fn native_format(
        &self,
        requested: Option<AudioFormat>,
    ) -> Result<AudioFormat, OutputError> {
        match requested {
            Some(format) => {
                let cpal_format = to_cpal_format(format.sample_format)
                    .ok_or_else(|| OutputError::UnsupportedFormat(format.to_string()))?;
                let supported = self.device.supported_output_configs()?.any(|range| {
                    range.channels() == format.channels
                        && range.sample_format() == cpal_format
                        && range.min_sample_rate().0 <= format.sample_rate
                        && format.sample_rate <= range.max_sample_rate().0
                });
                if !supported {
                    return Err(OutputError::UnsupportedFormat(format.to_string()));
                }
                Ok(format)
            }
            None => {
                let config = self.device.default_output_config()?;
                Ok(AudioFormat {
                    channels: config.channels(),
                    sample_rate: config.sample_rate().0,
                    sample_format: from_cpal_format(config.sample_format())
                        .unwrap_or(SampleFormat::F32),
                })
            }
        }
    }

    /// Starts a stream that pulls every buffer from `writer`.
    pub fn start(&self, writer: Writer) -> Result<OutputStream, OutputError> {
        let format = writer.format();
        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let writer = Arc::new(Mutex::new(writer));
        let priority = CallbackPriority::from_env();

        let stream = match format.sample_format {
            SampleFormat::U8 => self.build::<u8>(&config, writer.clone(), priority.clone())?,
            SampleFormat::S16 => self.build::<i16>(&config, writer.clone(), priority.clone())?,
            SampleFormat::S32 => self.build::<i32>(&config, writer.clone(), priority.clone())?,
            SampleFormat::F32 => self.build::<f32>(&config, writer.clone(), priority.clone())?,
            SampleFormat::S24 => return Err(OutputError::UnsupportedFormat(format.to_string())),
        };
        stream.play()?;
        info!(device = %self.name, format = %format, "Output stream started");

        Ok(OutputStream {
            stream,
            writer,
            priority,
            format,
        })
    }

    fn build<T>(
        &self,
        config: &cpal::StreamConfig,
        writer: Arc<Mutex<Writer>>,
        priority: CallbackPriority,
    ) -> Result<cpal::Stream, OutputError>
    where
        T: cpal::SizedSample + bytemuck::Pod,
    {
        let channels = config.channels as usize;
        let silence = writer.lock().format().sample_format.silence_byte();
        let stream = self.device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                priority.apply();
                fill_output(&writer, channels, silence, data);
            },
            |err| error!("CPAL output stream error: {}", err),
            None,
        )?;
        Ok(stream)
    }
}

/// Fills a host buffer from the writer, or with silence if the writer is busy.
fn fill_output<T: bytemuck::Pod>(
    writer: &Mutex<Writer>,
    channels: usize,
    silence: u8,
    data: &mut [T],
) {
    let frames = data.len() / channels;
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(data);
    match writer.try_lock() {
        Some(mut writer) => {
            if writer.write_frames(frames, bytes).is_err() {
                bytes.fill(silence);
            }
        }
        None => bytes.fill(silence),
    }
}

/// A running output stream. Dropping it stops playback; [`OutputStream::stop`]
/// also hands the writer back.
pub struct OutputStream {
    stream: cpal::Stream,
    writer: Arc<Mutex<Writer>>,
    priority: CallbackPriority,
    format: AudioFormat,
}

impl OutputStream {
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Stops the stream and returns the writer it was driving.
    pub fn stop(self) -> Result<Writer, OutputError> {
        let OutputStream {
            stream,
            writer,
            priority,
            format,
        } = self;
        stream.pause()?;
        drop(stream);
        priority.report();
        info!(format = %format, "Output stream stopped");

        Arc::try_unwrap(writer)
            .map(Mutex::into_inner)
            .map_err(|_| OutputError::WriterInUse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AudioEngine;

    #[test]
    fn test_format_mapping() {
        for format in SampleFormat::ALL {
            match to_cpal_format(format) {
                Some(cpal_format) => assert_eq!(from_cpal_format(cpal_format), Some(format)),
                None => assert_eq!(format, SampleFormat::S24),
            }
        }
        assert_eq!(from_cpal_format(cpal::SampleFormat::F64), None);
    }

    #[test]
    fn test_fill_output_typed_slices() {
        let format = AudioFormat::new(2, 48000, SampleFormat::S16).unwrap();
        let (engine, writer) = AudioEngine::init(format).unwrap();
        let mut source = engine
            .allocate_source(2, 48000, SampleFormat::S16, 2)
            .unwrap();
        for (dst, s) in source
            .data_mut()
            .chunks_exact_mut(2)
            .zip([i16::MAX, 0, 0, i16::MAX])
        {
            dst.copy_from_slice(&s.to_le_bytes());
        }
        let source = engine.add_source(source).unwrap();
        engine.play_source(&source, false).unwrap();

        let writer = Mutex::new(writer);
        let mut data = [7i16; 6];
        fill_output(&writer, 2, 0, &mut data);
        assert_eq!(data, [i16::MAX, 0, 0, i16::MAX, 0, 0]);
    }

    #[test]
    fn test_fill_output_busy_writer_is_silent() {
        let format = AudioFormat::new(1, 48000, SampleFormat::F32).unwrap();
        let (_engine, writer) = AudioEngine::init(format).unwrap();
        let writer = Mutex::new(writer);

        let _guard = writer.lock();
        let mut data = [0.5f32; 4];
        fill_output(&writer, 1, 0, &mut data);
        assert_eq!(data, [0.0; 4]);
    }
}
