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
use std::path::Path;
use std::str::FromStr;

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{AudioFormat, SampleFormat};
use crate::engine::MixMode;

const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_SAMPLE_FORMAT: SampleFormat = SampleFormat::S16;
const DEFAULT_MASTER_VOLUME: f32 = 1.0;

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    /// The output device. The default device when unset.
    device: Option<String>,

    /// Output channel count (default: 2)
    channels: Option<u16>,

    /// Output sample rate in Hz (default: 48000)
    sample_rate: Option<u32>,

    /// Output sample format: u8, s16, s24, s32 or f32 (default: s16)
    sample_format: Option<String>,

    /// How queued items are combined (default: mix)
    mix_mode: Option<MixMode>,

    /// Gain applied to everything played (default: 1.0)
    master_volume: Option<f32>,
}

impl Engine {
    /// Parse an engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Engine, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Engine>()?)
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn sample_format(&self) -> Result<SampleFormat, ConfigError> {
        match self.sample_format.as_deref() {
            Some(format) => SampleFormat::from_str(format)
                .map_err(|e| ConfigError::Invalid(e.to_string())),
            None => Ok(DEFAULT_SAMPLE_FORMAT),
        }
    }

    pub fn mix_mode(&self) -> MixMode {
        self.mix_mode.unwrap_or_default()
    }

    pub fn master_volume(&self) -> Result<f32, ConfigError> {
        let volume = self.master_volume.unwrap_or(DEFAULT_MASTER_VOLUME);
        if !volume.is_finite() || volume < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "master_volume must be a non-negative number, got {}",
                volume
            )));
        }
        Ok(volume)
    }

    /// The output format with defaults filled in.
    pub fn to_format(&self) -> Result<AudioFormat, ConfigError> {
        AudioFormat::new(self.channels(), self.sample_rate(), self.sample_format()?)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// The output format if any part of it was configured, None to let the
    /// device decide.
    pub fn explicit_format(&self) -> Result<Option<AudioFormat>, ConfigError> {
        if self.channels.is_none() && self.sample_rate.is_none() && self.sample_format.is_none() {
            return Ok(None);
        }
        self.to_format().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Result<Engine, Box<dyn Error>> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Engine>()?)
    }

    #[test]
    fn test_defaults() -> Result<(), Box<dyn Error>> {
        let engine = parse("device: speakers")?;
        assert_eq!(engine.device(), Some("speakers"));
        assert_eq!(engine.to_format()?, AudioFormat::default());
        assert_eq!(engine.mix_mode(), MixMode::Mix);
        assert_eq!(engine.master_volume()?, 1.0);
        assert_eq!(engine.explicit_format()?, None);
        Ok(())
    }

    #[test]
    fn test_full_config() -> Result<(), Box<dyn Error>> {
        let engine = parse(
            r#"
            channels: 1
            sample_rate: 44100
            sample_format: f32
            mix_mode: head
            master_volume: 0.5
            "#,
        )?;
        assert_eq!(engine.device(), None);
        assert_eq!(
            engine.explicit_format()?,
            Some(AudioFormat::new(1, 44100, SampleFormat::F32)?)
        );
        assert_eq!(engine.mix_mode(), MixMode::Head);
        assert_eq!(engine.master_volume()?, 0.5);
        Ok(())
    }

    #[test]
    fn test_invalid_values() -> Result<(), Box<dyn Error>> {
        let engine = parse("sample_format: s12")?;
        assert!(matches!(engine.to_format(), Err(ConfigError::Invalid(_))));

        let engine = parse("channels: 0")?;
        assert!(matches!(engine.to_format(), Err(ConfigError::Invalid(_))));

        let engine = parse("master_volume: -1.0")?;
        assert!(matches!(engine.master_volume(), Err(ConfigError::Invalid(_))));

        assert!(parse("mix_mode: solo").is_err());
        Ok(())
    }

    #[test]
    fn test_deserialize_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "sample_rate: 96000\nsample_format: s24\n")?;

        let engine = Engine::deserialize(&path)?;
        assert_eq!(
            engine.to_format()?,
            AudioFormat::new(2, 96000, SampleFormat::S24)?
        );
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Engine::deserialize(Path::new("/nonexistent/engine.yaml")),
            Err(ConfigError::Load(_))
        ));
    }
}
