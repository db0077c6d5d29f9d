//! Playback position and the two request kinds issued against a windower.

use std::sync::Arc;

use celltrace_core::{FrameDelta, Snapshot, TraceError, TraceResult};

use crate::window::{CacheWindower, CursorId};

/// Outcome of one playback tick.
#[derive(Clone, Debug, PartialEq)]
pub enum Advance {
    /// Moved one frame forward.
    Delta(FrameDelta),
    /// Wrapped from the last frame back to frame 0.
    Restart(Snapshot),
    /// Already on the last frame and not looping.
    End,
}

/// A registered reader of a [`CacheWindower`].
///
/// The cursor starts at frame 0. A request that fails leaves the position
/// where it was.
#[derive(Debug)]
pub struct PlaybackCursor {
    windower: Arc<CacheWindower>,
    id: CursorId,
    position: usize,
}

impl PlaybackCursor {
    /// Register a new cursor at frame 0.
    #[must_use]
    pub fn new(windower: Arc<CacheWindower>) -> Self {
        let id = windower.register(0);
        Self {
            windower,
            id,
            position: 0,
        }
    }

    /// Current frame index.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// `Jump(index)`: full state as of `frames[index]`.
    pub fn jump(&mut self, index: usize) -> TraceResult<Snapshot> {
        let snap = self.windower.jump_for(self.id, index)?;
        self.position = index;
        Ok(snap)
    }

    /// `Move(delta)`: only the transitions of the frame entered.
    pub fn step(&mut self, delta: i64) -> TraceResult<FrameDelta> {
        let frame_count = self.windower.plan().frame_count();
        let target = i64::try_from(self.position)
            .ok()
            .and_then(|p| p.checked_add(delta))
            .unwrap_or(i64::MAX);
        let index = usize::try_from(target)
            .ok()
            .filter(|&i| i < frame_count)
            .ok_or(TraceError::IndexOutOfRange {
                index: target,
                frame_count,
            })?;
        let out = self.windower.delta_for(self.id, index)?;
        self.position = index;
        Ok(out)
    }

    /// One forward tick of timed playback, wrapping to frame 0 when
    /// `looping` is set.
    pub fn advance(&mut self, looping: bool) -> TraceResult<Advance> {
        let last = self.windower.plan().frame_count().saturating_sub(1);
        if self.position < last {
            return self.step(1).map(Advance::Delta);
        }
        if looping {
            return self.jump(0).map(Advance::Restart);
        }
        Ok(Advance::End)
    }
}

impl Drop for PlaybackCursor {
    fn drop(&mut self) {
        self.windower.deregister(self.id);
    }
}
