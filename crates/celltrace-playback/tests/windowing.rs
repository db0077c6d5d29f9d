//! Window planning and cursor-driven materialization over generated traces.

use std::sync::Arc;
use std::thread;

use celltrace_core::{PlaybackSettings, Snapshot, Trace};
use celltrace_ingest::{
    assembler::TraceAssembler,
    generator::{generate_log, LogSpec},
    source::StrChunks,
};
use celltrace_playback::{
    cursor::PlaybackCursor,
    window::{CacheWindower, WindowPlan},
};
use proptest::prelude::*;

fn trace(frames: u32) -> Arc<Trace> {
    let log = generate_log(&LogSpec {
        dims: vec![4, 4],
        frames,
        seed: 11,
        ..LogSpec::default()
    });
    Arc::new(
        TraceAssembler::new()
            .assemble(StrChunks::new(&log.text, 1024), "life")
            .unwrap(),
    )
}

fn settings(window_size: usize, neighborhood: usize) -> PlaybackSettings {
    PlaybackSettings {
        window_size,
        neighborhood,
        ..PlaybackSettings::default()
    }
}

/// Reference: fold every frame up to `k` directly.
fn folded(trace: &Trace, k: usize) -> Snapshot {
    let mut s = Snapshot::default();
    for f in &trace.frames[..=k] {
        s.apply(f);
    }
    s
}

proptest! {
    #[test]
    fn windows_partition_the_frame_range(frames in 0usize..500, size in 1usize..64) {
        let plan = WindowPlan::new(frames, size).unwrap();
        let windows: Vec<_> = plan.windows().collect();
        prop_assert_eq!(windows.len(), frames.div_ceil(size));
        let mut next = 0usize;
        for (i, w) in windows.iter().enumerate() {
            prop_assert_eq!(w.index, i);
            prop_assert_eq!(w.start, next);
            prop_assert!(!w.is_empty());
            prop_assert!(w.len() <= size);
            next = w.end;
        }
        prop_assert_eq!(next, frames);
        for f in 0..frames {
            let owner = plan.window_of(f).unwrap();
            prop_assert!(owner.contains(f));
        }
    }
}

#[test]
fn jump_is_idempotent_and_matches_full_fold() {
    let t = trace(40);
    let w = Arc::new(CacheWindower::new(Arc::clone(&t), &settings(7, 1)).unwrap());
    let mut c = PlaybackCursor::new(Arc::clone(&w));
    for k in [0, 6, 7, 39, 20, 3] {
        let a = c.jump(k).unwrap();
        let b = c.jump(k).unwrap();
        assert_eq!(a, b, "jump {k}");
        assert_eq!(a, folded(&t, k), "jump {k}");
    }
}

#[test]
fn stepping_replays_the_same_state_as_jumping() {
    let t = trace(30);
    let w = Arc::new(CacheWindower::new(Arc::clone(&t), &settings(4, 0)).unwrap());
    let mut c = PlaybackCursor::new(Arc::clone(&w));
    let mut state = c.jump(0).unwrap();
    for k in 1..t.frame_count() {
        let d = c.step(1).unwrap();
        assert_eq!(d.index, k);
        state.apply_delta(&d);
    }
    assert_eq!(state, folded(&t, t.frame_count() - 1));
}

#[test]
fn cursor_keeps_only_its_neighborhood() {
    let t = trace(100);
    let w = Arc::new(CacheWindower::new(t, &settings(10, 1)).unwrap());
    let mut c = PlaybackCursor::new(Arc::clone(&w));
    for k in 0..100 {
        c.jump(k).unwrap();
        assert!(w.resident_windows() <= 3, "at frame {k}");
    }
    assert!(w.is_resident(9));
    assert!(w.is_resident(8));
    assert!(!w.is_resident(0));
}

#[test]
fn two_cursors_pin_their_own_windows() {
    let t = trace(100);
    let w = Arc::new(CacheWindower::new(t, &settings(10, 0)).unwrap());
    let mut a = PlaybackCursor::new(Arc::clone(&w));
    let mut b = PlaybackCursor::new(Arc::clone(&w));
    a.jump(5).unwrap();
    b.jump(95).unwrap();
    assert!(w.is_resident(0));
    assert!(w.is_resident(9));
    b.jump(55).unwrap();
    assert!(w.is_resident(0));
    assert!(!w.is_resident(9));
    drop(a);
    b.jump(56).unwrap();
    assert!(!w.is_resident(0));
}

#[test]
fn concurrent_jumps_load_each_window_once() {
    let t = trace(60);
    let w = Arc::new(CacheWindower::new(Arc::clone(&t), &settings(20, 5)).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let w = Arc::clone(&w);
            thread::spawn(move || {
                let mut c = PlaybackCursor::new(w);
                c.jump(25 + i).unwrap()
            })
        })
        .collect();
    let expected: Vec<Snapshot> = (0..8).map(|i| folded(&t, 25 + i)).collect();
    for (h, want) in handles.into_iter().zip(expected) {
        assert_eq!(h.join().unwrap(), want);
    }
    // Window 1 is loaded exactly once; window 0 may never be loaded at all.
    assert_eq!(w.load_count(), 1);
}
