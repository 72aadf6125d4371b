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

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the audio callback thread when AUDIOSYS_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

const STATUS_PENDING: u8 = 0;
const STATUS_APPLIED: u8 = 1;
const STATUS_RT_APPLIED: u8 = 2;
const STATUS_FAILED: u8 = 3;

/// Reads AUDIOSYS_THREAD_PRIORITY (0-99) once, so the callback never touches the environment.
pub fn callback_thread_priority() -> ThreadPriority {
    std::env::var("AUDIOSYS_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .or(Some(DEFAULT_CALLBACK_THREAD_PRIORITY))
        .and_then(|n| ThreadPriorityValue::try_from(n).ok())
        .map(ThreadPriority::Crossplatform)
        .unwrap_or(ThreadPriority::Max)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the audio callback thread.
/// Default: enabled. Opt out with AUDIOSYS_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !env_flag("AUDIOSYS_DISABLE_RT_AUDIO")
}

/// Raises the priority of whichever thread first calls [`CallbackPriority::apply`].
///
/// The callback thread must not log, so the outcome is recorded and reported
/// later from the control thread by [`CallbackPriority::report`].
#[derive(Clone)]
pub struct CallbackPriority {
    priority: ThreadPriority,
    rt_audio: bool,
    status: Arc<AtomicU8>,
}

impl CallbackPriority {
    /// Reads the priority settings from the environment.
    pub fn from_env() -> CallbackPriority {
        CallbackPriority {
            priority: callback_thread_priority(),
            rt_audio: rt_audio_enabled(),
            status: Arc::new(AtomicU8::new(STATUS_PENDING)),
        }
    }

    /// Applies the priority once. Later calls return immediately.
    pub fn apply(&self) {
        if self.status.load(Ordering::Relaxed) != STATUS_PENDING {
            return;
        }

        let mut status = match set_current_thread_priority(self.priority) {
            Ok(()) => STATUS_APPLIED,
            Err(_) => STATUS_FAILED,
        };

        #[cfg(unix)]
        if self.rt_audio {
            use thread_priority::unix::{
                set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
                ThreadSchedulePolicy,
            };
            status = match set_thread_priority_and_policy(
                thread_native_id(),
                self.priority,
                ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
            ) {
                Ok(()) => STATUS_RT_APPLIED,
                Err(_) => STATUS_FAILED,
            };
        }

        self.status.store(status, Ordering::Relaxed);
    }

    /// Logs the outcome of [`CallbackPriority::apply`], if it has run.
    pub fn report(&self) {
        match self.status.load(Ordering::Relaxed) {
            STATUS_PENDING => {}
            STATUS_APPLIED => info!(
                rt_audio = self.rt_audio,
                "Raised audio callback thread priority"
            ),
            STATUS_RT_APPLIED => info!("Enabled RT SCHED_FIFO for audio callback thread"),
            _ => warn!(
                rt_audio = self.rt_audio,
                "Failed to raise audio callback thread priority"
            ),
        }
    }

    /// Returns true once [`CallbackPriority::apply`] has run.
    pub fn is_applied(&self) -> bool {
        self.status.load(Ordering::Relaxed) != STATUS_PENDING
    }
}
