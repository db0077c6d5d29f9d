//! Partition a trace's frames into fixed-size windows and keep only the
//! windows near a cursor resident.
//!
//! A **window** is the half-open frame range `[start, end)`. Windows are a
//! pure function of `(frame_count, window_size)`: the last may be shorter,
//! none overlap, and together they cover every frame exactly once.
//!
//! A materialized window holds:
//!
//! - `base`: the snapshot *before* `frames[start]`, and
//! - `deltas`: the decoded update for each frame in the window.
//!
//! so `Jump(k)` is `base` plus `deltas[..=k - start]`, and `Move` to `k` is
//! `deltas[k - start]` alone. A base is seeded from the nearest resident lower
//! window, so only the frames in between are replayed.
//!
//! Slots move `Empty -> Loading -> Ready`. A request that finds a slot
//! `Loading` waits on the condvar; only one materialization per window is
//! ever in flight. Every request pins its target window for its whole
//! duration, waiting included, and a pinned window is never evicted.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use celltrace_core::{FrameDelta, PlaybackSettings, Snapshot, Trace, TraceError, TraceResult};
use tracing::debug;

/* --------------------------------- Planning -------------------------------- */

/// One contiguous slice of the frame index range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheWindow {
    /// Position of the window in the plan.
    pub index: usize,
    /// First frame (inclusive).
    pub start: usize,
    /// One past the last frame.
    pub end: usize,
}

impl CacheWindow {
    /// Frame range covered.
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Number of frames covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Always false for windows produced by a [`WindowPlan`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `frame` falls inside this window.
    #[must_use]
    pub const fn contains(&self, frame: usize) -> bool {
        self.start <= frame && frame < self.end
    }
}

/// Deterministic partition of `frame_count` frames into windows of
/// `window_size` (last may be shorter).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowPlan {
    frame_count: usize,
    window_size: usize,
}

impl WindowPlan {
    /// Plan for `frame_count` frames. `window_size` must be at least 1.
    pub fn new(frame_count: usize, window_size: usize) -> TraceResult<Self> {
        if window_size == 0 {
            return Err(TraceError::InvalidSettings("window_size must be >= 1".into()));
        }
        Ok(Self {
            frame_count,
            window_size,
        })
    }

    /// Frames covered by the plan.
    #[must_use]
    pub const fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Frames per (full) window.
    #[must_use]
    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    /// `ceil(frame_count / window_size)`.
    #[must_use]
    pub const fn window_count(&self) -> usize {
        self.frame_count.div_ceil(self.window_size)
    }

    /// Window at position `index`.
    #[must_use]
    pub fn window(&self, index: usize) -> Option<CacheWindow> {
        (index < self.window_count()).then(|| {
            let start = index * self.window_size;
            CacheWindow {
                index,
                start,
                end: (start + self.window_size).min(self.frame_count),
            }
        })
    }

    /// Window owning `frame`.
    #[must_use]
    pub fn window_of(&self, frame: usize) -> Option<CacheWindow> {
        (frame < self.frame_count)
            .then(|| self.window(frame / self.window_size))
            .flatten()
    }

    /// All windows in order.
    pub fn windows(&self) -> impl Iterator<Item = CacheWindow> + '_ {
        (0..self.window_count()).filter_map(|i| self.window(i))
    }
}

/* ----------------------------- Materialization ----------------------------- */

/// Payload of a resident window.
#[derive(Debug)]
pub struct WindowData {
    /// Which window this is.
    pub window: CacheWindow,
    /// State before the window's first frame.
    pub base: Snapshot,
    /// Decoded update per frame, in frame order.
    pub deltas: Vec<FrameDelta>,
}

impl WindowData {
    /// Full state as of `frame` (inclusive).
    #[must_use]
    pub fn snapshot_at(&self, frame: usize) -> Snapshot {
        let mut snap = self.base.clone();
        let upto = frame.saturating_sub(self.window.start) + 1;
        for d in self.deltas.iter().take(upto) {
            snap.apply_delta(d);
        }
        snap
    }

    /// Update for `frame` alone.
    #[must_use]
    pub fn delta_at(&self, frame: usize) -> Option<&FrameDelta> {
        self.deltas.get(frame.checked_sub(self.window.start)?)
    }
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Loading,
    Ready(Arc<WindowData>),
}

/// Identity a cursor registers under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CursorId(u64);

#[derive(Debug)]
struct State {
    slots: Vec<Slot>,
    /// Outstanding requests per window.
    pins: Vec<usize>,
    /// Registered cursors and the frame each last requested.
    cursors: BTreeMap<CursorId, usize>,
    loads: usize,
}

/// On-demand window cache over one shared trace.
#[derive(Debug)]
pub struct CacheWindower {
    trace: Arc<Trace>,
    plan: WindowPlan,
    neighborhood: usize,
    state: Mutex<State>,
    loaded: Condvar,
    next_cursor: AtomicU64,
}

/// Releases a request's pin if it unwinds before `serve` does.
struct PinGuard<'a> {
    windower: &'a CacheWindower,
    index: usize,
    armed: bool,
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut st = self.windower.lock();
            st.pins[self.index] = st.pins[self.index].saturating_sub(1);
        }
    }
}

/// Returns the slot to `Empty` if a load unwinds before publishing.
struct LoadGuard<'a> {
    windower: &'a CacheWindower,
    index: usize,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut st = self.windower.lock();
            st.slots[self.index] = Slot::Empty;
            drop(st);
            self.windower.loaded.notify_all();
        }
    }
}

impl CacheWindower {
    /// Windower over `trace` using the settings' window size and neighborhood.
    pub fn new(trace: Arc<Trace>, settings: &PlaybackSettings) -> TraceResult<Self> {
        let plan = WindowPlan::new(trace.frame_count(), settings.window_size)?;
        let mut slots = Vec::with_capacity(plan.window_count());
        slots.resize_with(plan.window_count(), Slot::default);
        debug!(
            trace = %trace.name,
            frames = plan.frame_count(),
            windows = plan.window_count(),
            window_size = plan.window_size(),
            "windower ready"
        );
        Ok(Self {
            trace,
            plan,
            neighborhood: settings.neighborhood,
            state: Mutex::new(State {
                slots,
                pins: vec![0; plan.window_count()],
                cursors: BTreeMap::new(),
                loads: 0,
            }),
            loaded: Condvar::new(),
            next_cursor: AtomicU64::new(0),
        })
    }

    /// The trace being served.
    #[must_use]
    pub fn trace(&self) -> &Arc<Trace> {
        &self.trace
    }

    /// The partition in use.
    #[must_use]
    pub const fn plan(&self) -> &WindowPlan {
        &self.plan
    }

    /// Windows kept on each side of a cursor.
    #[must_use]
    pub const fn neighborhood(&self) -> usize {
        self.neighborhood
    }

    /// Number of materialized windows.
    #[must_use]
    pub fn resident_windows(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    /// Whether window `index` is materialized.
    #[must_use]
    pub fn is_resident(&self, index: usize) -> bool {
        matches!(self.lock().slots.get(index), Some(Slot::Ready(_)))
    }

    /// Total materializations performed (reloads after eviction included).
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.lock().loads
    }

    /// Number of registered cursors.
    #[must_use]
    pub fn cursor_count(&self) -> usize {
        self.lock().cursors.len()
    }

    /// Full snapshot as of `index`, without a cursor.
    pub fn jump(&self, index: usize) -> TraceResult<Snapshot> {
        self.serve(None, index, |data| data.snapshot_at(index))
    }

    /// Incremental update for frame `index`, without a cursor.
    pub fn frame_delta(&self, index: usize) -> TraceResult<FrameDelta> {
        self.serve(None, index, |data| data.delta_at(index).cloned())?
            .ok_or_else(|| self.out_of_range(index))
    }

    /* ---- cursor registry ---- */

    pub(crate) fn register(&self, position: usize) -> CursorId {
        let id = CursorId(self.next_cursor.fetch_add(1, AtomicOrdering::Relaxed));
        self.lock().cursors.insert(id, position);
        id
    }

    pub(crate) fn deregister(&self, id: CursorId) {
        let mut st = self.lock();
        st.cursors.remove(&id);
        // Fall back to the remaining cursors as eviction anchors.
        let anchors = self.anchors(&st, None);
        if !anchors.is_empty() {
            self.evict(&mut st, &anchors);
        }
    }

    pub(crate) fn jump_for(&self, id: CursorId, index: usize) -> TraceResult<Snapshot> {
        self.serve(Some(id), index, |data| data.snapshot_at(index))
    }

    pub(crate) fn delta_for(&self, id: CursorId, index: usize) -> TraceResult<FrameDelta> {
        self.serve(Some(id), index, |data| data.delta_at(index).cloned())?
            .ok_or_else(|| self.out_of_range(index))
    }

    /* ---- internals ---- */

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn out_of_range(&self, index: usize) -> TraceError {
        TraceError::IndexOutOfRange {
            index: i64::try_from(index).unwrap_or(i64::MAX),
            frame_count: self.plan.frame_count(),
        }
    }

    fn serve<T>(
        &self,
        cursor: Option<CursorId>,
        index: usize,
        read: impl FnOnce(&WindowData) -> T,
    ) -> TraceResult<T> {
        let window = self
            .plan
            .window_of(index)
            .ok_or_else(|| self.out_of_range(index))?;
        self.lock().pins[window.index] += 1;
        let mut pin = PinGuard {
            windower: self,
            index: window.index,
            armed: true,
        };
        let data = self.acquire(window);
        let out = read(&data);
        drop(data);

        let mut st = self.lock();
        st.pins[window.index] -= 1;
        pin.armed = false;
        if let Some(id) = cursor {
            if let Some(pos) = st.cursors.get_mut(&id) {
                *pos = index;
            }
        }
        let anchors = self.anchors(&st, Some(window.index));
        self.evict(&mut st, &anchors);
        Ok(out)
    }

    /// Resident payload for `window`, materializing it if needed.
    fn acquire(&self, window: CacheWindow) -> Arc<WindowData> {
        let mut st = self.lock();
        loop {
            let loading = match &st.slots[window.index] {
                Slot::Ready(data) => return Arc::clone(data),
                Slot::Loading => true,
                Slot::Empty => false,
            };
            if !loading {
                break;
            }
            st = self.loaded.wait(st).unwrap_or_else(PoisonError::into_inner);
        }
        st.slots[window.index] = Slot::Loading;
        let seed = st.slots[..window.index]
            .iter()
            .rev()
            .find_map(|s| match s {
                Slot::Ready(d) => Some(Arc::clone(d)),
                _ => None,
            });
        drop(st);

        let mut guard = LoadGuard {
            windower: self,
            index: window.index,
            armed: true,
        };
        let data = Arc::new(self.materialize(window, seed.as_deref()));
        drop(seed);

        let mut st = self.lock();
        st.slots[window.index] = Slot::Ready(Arc::clone(&data));
        st.loads += 1;
        guard.armed = false;
        drop(st);
        self.loaded.notify_all();
        debug!(window = window.index, start = window.start, end = window.end, "window materialized");
        data
    }

    fn materialize(&self, window: CacheWindow, seed: Option<&WindowData>) -> WindowData {
        let frames = &self.trace.frames;
        let (mut base, from) = match seed {
            Some(d) => (d.base.clone(), d.window.start),
            None => (Snapshot::default(), 0),
        };
        for f in &frames[from..window.start] {
            base.apply(f);
        }
        let deltas = frames[window.range()]
            .iter()
            .zip(window.range())
            .map(|(f, i)| FrameDelta::from_frame(i, f))
            .collect();
        WindowData {
            window,
            base,
            deltas,
        }
    }

    /// Windows that must stay resident: every cursor's window plus `current`.
    fn anchors(&self, st: &State, current: Option<usize>) -> Vec<usize> {
        let mut out: Vec<usize> = st
            .cursors
            .values()
            .filter_map(|&f| self.plan.window_of(f))
            .map(|w| w.index)
            .chain(current)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Drop ready windows farther than `neighborhood` from every anchor,
    /// furthest first. Windows with an outstanding request or reader are
    /// skipped.
    fn evict(&self, st: &mut State, anchors: &[usize]) {
        let mut victims: Vec<(usize, usize)> = st
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Slot::Ready(d) if st.pins[i] == 0 && Arc::strong_count(d) == 1 => {
                    let dist = anchors.iter().map(|&a| a.abs_diff(i)).min()?;
                    (dist > self.neighborhood).then_some((dist, i))
                }
                _ => None,
            })
            .collect();
        victims.sort_unstable_by(|a, b| b.cmp(a));
        for (dist, i) in victims {
            st.slots[i] = Slot::Empty;
            debug!(window = i, distance = dist, "window evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use celltrace_core::{Coordinate, Frame, Paradigm, SimTime, SourceFormat, Transition, TransitionKind};

    fn counting_trace(frames: usize) -> Trace {
        let frames = (0..frames)
            .map(|i| {
                let mut f = Frame::new(SimTime::new(format!("{i}")));
                f.transitions.push(Transition {
                    kind: TransitionKind::Output,
                    time: f.time.clone(),
                    model: "c".into(),
                    coordinate: Coordinate::new(u32::try_from(i % 3).unwrap(), 0, 0),
                    port: "out".into(),
                    value: i as f64,
                    destination: "x".into(),
                });
                f
            })
            .collect();
        Trace {
            name: "counting".into(),
            source_format: SourceFormat::Lopez,
            paradigm: Paradigm::CellDevs,
            frames,
            extents: [3, 1, 1],
            palette: None,
        }
    }

    fn windower(frames: usize, window_size: usize, neighborhood: usize) -> CacheWindower {
        let settings = PlaybackSettings {
            window_size,
            neighborhood,
            ..PlaybackSettings::default()
        };
        CacheWindower::new(Arc::new(counting_trace(frames)), &settings).unwrap()
    }

    #[test]
    fn plan_shape() {
        let plan = WindowPlan::new(25, 10).unwrap();
        assert_eq!(plan.window_count(), 3);
        assert_eq!(plan.window(2), Some(CacheWindow { index: 2, start: 20, end: 25 }));
        assert_eq!(plan.window(3), None);
        assert_eq!(plan.window_of(19).map(|w| w.index), Some(1));
        assert_eq!(plan.window_of(25), None);
        assert!(WindowPlan::new(5, 0).is_err());
        assert_eq!(WindowPlan::new(0, 4).unwrap().window_count(), 0);
    }

    #[test]
    fn jump_loads_only_owning_window() {
        let w = windower(30, 10, 5);
        let snap = w.jump(14).unwrap();
        assert_eq!(snap.len(), 3);
        assert!(w.is_resident(1));
        assert_eq!(w.resident_windows(), 1);
        assert_eq!(w.load_count(), 1);
        w.jump(12).unwrap();
        assert_eq!(w.load_count(), 1);
    }

    #[test]
    fn out_of_range_is_typed() {
        let w = windower(4, 2, 1);
        match w.jump(4) {
            Err(TraceError::IndexOutOfRange { index, frame_count }) => {
                assert_eq!((index, frame_count), (4, 4));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(w.load_count(), 0);
    }

    #[test]
    fn base_is_seeded_from_lower_window() {
        let w = windower(40, 10, 10);
        let direct = w.jump(35).unwrap();
        let fresh = windower(40, 10, 10);
        fresh.jump(5).unwrap();
        assert_eq!(fresh.jump(35).unwrap(), direct);
    }

    #[test]
    fn far_windows_are_evicted_without_cursors() {
        let w = windower(50, 10, 1);
        w.jump(0).unwrap();
        w.jump(15).unwrap();
        assert_eq!(w.resident_windows(), 2);
        w.jump(45).unwrap();
        assert!(!w.is_resident(0));
        assert!(!w.is_resident(1));
        assert!(w.is_resident(4));
    }

    #[test]
    fn pinned_window_survives_eviction() {
        let w = windower(50, 10, 0);
        w.jump(5).unwrap();
        // A request still waiting on window 0.
        w.lock().pins[0] += 1;
        w.jump(45).unwrap();
        assert!(w.is_resident(0));
        assert_eq!(w.load_count(), 2);

        w.lock().pins[0] -= 1;
        w.jump(46).unwrap();
        assert!(!w.is_resident(0));
        assert!(w.lock().pins.iter().all(|&p| p == 0));
    }

    #[test]
    fn requests_release_their_pins() {
        let w = windower(30, 10, 1);
        w.jump(3).unwrap();
        w.frame_delta(17).unwrap();
        assert!(w.jump(99).is_err());
        assert!(w.lock().pins.iter().all(|&p| p == 0));
    }

    #[test]
    fn delta_matches_frame() {
        let w = windower(12, 5, 1);
        let d = w.frame_delta(7).unwrap();
        assert_eq!(d.index, 7);
        assert_eq!(d.changes.len(), 1);
        assert!((d.changes[0].value - 7.0).abs() < f64::EPSILON);
    }
}
