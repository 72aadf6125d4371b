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

//! The play queue: active playback instances of registered sources.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::registry::{AudioSource, SourceId};
use crate::audio::resample::RateConversion;

/// Initial room in the queue, so that typical workloads never grow it.
pub(crate) const QUEUE_RESERVE: usize = 64;

/// Identifies a play item. Ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayItemId(u64);

impl PlayItemId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlayItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a play item stands: its cursor and whether it has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Playhead {
    cursor: usize,
    finished: bool,
}

/// One playback of a source with its own cursor.
pub struct PlayItem {
    id: PlayItemId,
    source: Arc<AudioSource>,
    cursor: usize,
    repeat: bool,
    finished: bool,
    gain: f32,
    conversion: Option<RateConversion>,
}

impl PlayItem {
    pub fn id(&self) -> PlayItemId {
        self.id
    }

    pub fn source(&self) -> &Arc<AudioSource> {
        &self.source
    }

    /// The next frame to render.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// The rate conversion into the output rate, None if unsupported.
    pub fn conversion(&self) -> Option<RateConversion> {
        self.conversion
    }

    /// Frames left before the end of the source.
    pub fn remaining(&self) -> usize {
        self.source.frames() - self.cursor
    }

    /// Moves the cursor forward. Reaching the end wraps a repeating item back
    /// to the start and finishes any other. An empty source always finishes.
    pub(crate) fn advance(&mut self, frames: usize) {
        let total = self.source.frames();
        self.cursor = (self.cursor + frames).min(total);
        if self.cursor == total {
            if self.repeat && total > 0 {
                self.cursor = 0;
            } else {
                self.finished = true;
            }
        }
    }

    /// Marks the item finished without moving the cursor.
    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }

    pub(crate) fn playhead(&self) -> Playhead {
        Playhead {
            cursor: self.cursor,
            finished: self.finished,
        }
    }

    /// Puts the item back where a saved playhead left it.
    pub(crate) fn restore(&mut self, playhead: Playhead) {
        self.cursor = playhead.cursor;
        self.finished = playhead.finished;
    }
}

/// A read-only view of a play item.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayItemInfo {
    pub id: PlayItemId,
    pub source_id: SourceId,
    pub cursor: usize,
    pub frames: usize,
    pub repeat: bool,
    pub gain: f32,
}

impl From<&PlayItem> for PlayItemInfo {
    fn from(item: &PlayItem) -> Self {
        PlayItemInfo {
            id: item.id,
            source_id: item.source.id(),
            cursor: item.cursor,
            frames: item.source.frames(),
            repeat: item.repeat,
            gain: item.gain,
        }
    }
}

/// Play items in the order they were started.
pub struct PlayQueue {
    items: Mutex<VecDeque<PlayItem>>,
    next_id: AtomicU64,
}

impl PlayQueue {
    pub fn new() -> PlayQueue {
        PlayQueue {
            items: Mutex::new(VecDeque::with_capacity(QUEUE_RESERVE)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a new item at the tail.
    pub fn push(
        &self,
        source: Arc<AudioSource>,
        repeat: bool,
        gain: f32,
        output_rate: u32,
    ) -> PlayItemId {
        let id = PlayItemId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let conversion = RateConversion::select(source.sample_rate(), output_rate);
        let item = PlayItem {
            id,
            source,
            cursor: 0,
            repeat,
            finished: false,
            gain,
            conversion,
        };
        self.items.lock().push_back(item);
        id
    }

    /// Removes the item with the given id. Returns false if it is not queued.
    pub fn stop(&self, id: PlayItemId) -> bool {
        let mut items = self.items.lock();
        match items.iter().position(|item| item.id == id) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes every item. Returns how many were queued.
    pub fn stop_all(&self) -> usize {
        let mut items = self.items.lock();
        let count = items.len();
        items.clear();
        count
    }

    /// A snapshot of the queued items, head first.
    ///
    /// The buffer is sized before the lock is taken so that the critical
    /// section only copies.
    pub fn snapshot(&self) -> Vec<PlayItemInfo> {
        let mut infos = Vec::with_capacity(self.len() + QUEUE_RESERVE);
        let items = self.items.lock();
        infos.extend(items.iter().map(PlayItemInfo::from));
        infos
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Locks the queue, waiting for the control side if needed.
    pub(crate) fn lock(&self) -> MutexGuard<'_, VecDeque<PlayItem>> {
        self.items.lock()
    }

    /// Locks the queue for a render pass. None while a control thread holds it.
    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, VecDeque<PlayItem>>> {
        self.items.try_lock()
    }
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops finished items, keeping the rest in order.
pub(crate) fn remove_finished(items: &mut VecDeque<PlayItem>) {
    items.retain(|item| !item.finished);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormat, SampleFormat};
    use crate::engine::registry::Registry;

    fn source(registry: &Registry, frames: usize, rate: u32) -> Arc<AudioSource> {
        let format = AudioFormat::new(1, rate, SampleFormat::S16).unwrap();
        registry.add(AudioSource::allocate(format, frames).unwrap())
    }

    #[test]
    fn test_push_and_stop() {
        let registry = Registry::new();
        let queue = PlayQueue::new();
        let s = source(&registry, 10, 48000);

        let a = queue.push(s.clone(), false, 1.0, 48000);
        let b = queue.push(s.clone(), true, 0.5, 48000);
        let c = queue.push(s, false, 1.0, 48000);
        assert!(a < b && b < c);
        assert_eq!(queue.len(), 3);

        assert!(queue.stop(b));
        assert!(!queue.stop(b));
        let ids: Vec<PlayItemId> = queue.snapshot().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a, c]);

        assert_eq!(queue.stop_all(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_snapshot_reports_items() {
        let registry = Registry::new();
        let queue = PlayQueue::new();
        let s = source(&registry, 10, 48000);
        queue.push(s.clone(), true, 0.25, 48000);

        let info = &queue.snapshot()[0];
        assert_eq!(info.source_id, s.id());
        assert_eq!(info.cursor, 0);
        assert_eq!(info.frames, 10);
        assert!(info.repeat);
        assert_eq!(info.gain, 0.25);
    }

    #[test]
    fn test_conversion_selected_at_push() {
        let registry = Registry::new();
        let queue = PlayQueue::new();
        queue.push(source(&registry, 4, 24000), false, 1.0, 48000);
        queue.push(source(&registry, 4, 44100), false, 1.0, 48000);

        let items = queue.lock();
        assert_eq!(items[0].conversion(), Some(RateConversion::Upsample(2)));
        assert_eq!(items[1].conversion(), None);
    }

    #[test]
    fn test_advance_finishes_at_end() {
        let registry = Registry::new();
        let queue = PlayQueue::new();
        queue.push(source(&registry, 4, 48000), false, 1.0, 48000);

        let mut items = queue.lock();
        items[0].advance(3);
        assert_eq!(items[0].cursor(), 3);
        assert!(!items[0].is_finished());
        items[0].advance(1);
        assert_eq!(items[0].cursor(), 4);
        assert!(items[0].is_finished());

        remove_finished(&mut items);
        assert!(items.is_empty());
    }

    #[test]
    fn test_advance_repeat_wraps() {
        let registry = Registry::new();
        let queue = PlayQueue::new();
        queue.push(source(&registry, 4, 48000), true, 1.0, 48000);

        let mut items = queue.lock();
        items[0].advance(4);
        assert_eq!(items[0].cursor(), 0);
        assert!(!items[0].is_finished());
    }

    #[test]
    fn test_empty_source_finishes_even_when_repeating() {
        let registry = Registry::new();
        let queue = PlayQueue::new();
        queue.push(source(&registry, 0, 48000), true, 1.0, 48000);

        let mut items = queue.lock();
        items[0].advance(0);
        assert!(items[0].is_finished());
    }

    #[test]
    fn test_remove_finished_keeps_order() {
        let registry = Registry::new();
        let queue = PlayQueue::new();
        let s = source(&registry, 4, 48000);
        let a = queue.push(s.clone(), false, 1.0, 48000);
        queue.push(s.clone(), false, 1.0, 48000);
        let c = queue.push(s, false, 1.0, 48000);

        let mut items = queue.lock();
        items[1].finish();
        remove_finished(&mut items);
        let ids: Vec<PlayItemId> = items.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn test_restore_playhead() {
        let registry = Registry::new();
        let queue = PlayQueue::new();
        queue.push(source(&registry, 4, 48000), false, 1.0, 48000);

        let mut items = queue.lock();
        items[0].advance(1);
        let saved = items[0].playhead();
        items[0].advance(3);
        assert!(items[0].is_finished());

        items[0].restore(saved);
        assert_eq!(items[0].cursor(), 1);
        assert!(!items[0].is_finished());
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let queue = PlayQueue::new();
        let held = queue.lock();
        assert!(queue.try_lock().is_none());
        drop(held);
        assert!(queue.try_lock().is_some());
    }
}
