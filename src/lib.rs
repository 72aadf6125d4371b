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

//! A real-time audio mixing and sample conversion engine.
//!
//! Sources are decoded once into a registry, played through a queue of play
//! items, and rendered by a [`engine::Writer`] that the host audio callback
//! drives. The render path never blocks on I/O and never allocates; when no
//! data is available it writes silence.

pub mod audio;
pub mod config;
pub mod engine;

#[cfg(test)]
pub mod testutil;

pub use audio::{AudioFormat, SampleFormat};
pub use engine::{AudioEngine, AudioSource, EngineError, PlayItemId, SourceId, Writer};
