//! Drive a [`ChunkSource`] through the tokenizer into a resolved [`Trace`].
//!
//! Assembly is all-or-nothing: any tokenizer error, unreadable input, time
//! going backwards, or an empty result rejects the whole run and the partial
//! frames are dropped with the assembler.
//!
//! It is also two-phase. Frames are built while streaming; extents are only
//! computed by [`FrameAccumulator::finish`] once the stream is exhausted, so
//! nothing downstream can observe them mid-ingestion.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;

use celltrace_core::{
    Extents, Frame, Paradigm, SourceFormat, Trace, TraceError, TraceResult, Transition, MAX_AXES,
};
use tracing::{debug, info, warn};

use crate::source::{ChunkSource, FileChunks};
use crate::tokenizer::{RecordTokenizer, ScanState};

/// Extension that identifies a CD++ log among several supplied files.
pub const LOG_EXTENSION: &str = "log";

/* ------------------------------- Cancellation ------------------------------ */

/// Shared flag that stops chunk delivery at the next chunk boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Acquire)
    }
}

/* ---------------------------- Frame accumulation --------------------------- */

/// Open-frame accumulator: groups consecutive records sharing a timestamp.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    frames: Vec<Frame>,
    records: usize,
}

impl FrameAccumulator {
    /// Empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record, opening a new frame when the time changes.
    ///
    /// Records are never re-sorted; a timestamp that compares earlier than
    /// the open frame's is rejected.
    pub fn push(&mut self, t: Transition) -> TraceResult<()> {
        if let Some(open) = self.frames.last_mut() {
            if open.time == t.time {
                open.transitions.push(t);
                self.records += 1;
                return Ok(());
            }
            if open.time.partial_order(&t.time) == Some(Ordering::Greater) {
                return Err(TraceError::OutOfOrder {
                    record: self.records,
                    time: t.time.to_string(),
                    previous: open.time.to_string(),
                });
            }
        }
        let mut frame = Frame::new(t.time.clone());
        frame.transitions.push(t);
        self.frames.push(frame);
        self.records += 1;
        Ok(())
    }

    /// Records accepted so far.
    #[must_use]
    pub const fn records(&self) -> usize {
        self.records
    }

    /// Frames opened so far.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames.len()
    }

    /// Close the stream: derive extents and build the trace.
    pub fn finish(self, name: &str) -> TraceResult<Trace> {
        if self.records == 0 {
            return Err(TraceError::EmptyTrace { name: name.to_owned() });
        }
        let extents = compute_extents(&self.frames);
        Ok(Trace {
            name: name.to_owned(),
            source_format: SourceFormat::Lopez,
            paradigm: Paradigm::CellDevs,
            frames: self.frames,
            extents,
            palette: None,
        })
    }
}

/// Per-axis `max + 1` over every emitting coordinate.
///
/// Undercounts any axis whose highest cell never emitted; the log alone does
/// not carry the grid size.
#[must_use]
pub fn compute_extents(frames: &[Frame]) -> Extents {
    let mut max = [0u32; MAX_AXES];
    for t in frames.iter().flat_map(|f| f.transitions.iter()) {
        for (axis, m) in max.iter_mut().enumerate() {
            *m = (*m).max(t.coordinate.axis(axis));
        }
    }
    max.map(|m| m.saturating_add(1))
}

/* -------------------------------- Assembler -------------------------------- */

/// Single-use ingestion pipeline (tokenizer + frame accumulator).
///
/// Consumed by every `assemble*` call so a new run always starts from fresh
/// state.
#[derive(Debug, Default)]
pub struct TraceAssembler {
    tokenizer: RecordTokenizer,
    cancel: CancelToken,
}

impl TraceAssembler {
    /// Assembler without external cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assembler that stops when `cancel` fires.
    #[must_use]
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            tokenizer: RecordTokenizer::new(),
            cancel,
        }
    }

    /// Consume `source` to completion and resolve a trace named `name`.
    pub fn assemble<S: ChunkSource>(self, source: S, name: &str) -> TraceResult<Trace> {
        info!(name, "ingesting log");
        let mut acc = FrameAccumulator::new();
        let mut state = ScanState::new();
        let mut batch = Vec::new();

        for (i, chunk) in source.enumerate() {
            if self.cancel.is_cancelled() {
                warn!(name, chunk = i, "ingestion cancelled");
                return Err(TraceError::Cancelled);
            }
            let chunk = chunk?;
            state = self.tokenizer.feed(state, &chunk, &mut batch)?;
            for t in batch.drain(..) {
                acc.push(t)?;
            }
            debug!(
                chunk = i,
                bytes = chunk.len(),
                records = acc.records(),
                carry = state.carry().len(),
                "chunk scanned"
            );
        }
        if self.cancel.is_cancelled() {
            warn!(name, "ingestion cancelled at end of stream");
            return Err(TraceError::Cancelled);
        }

        self.tokenizer.finish(state, &mut batch)?;
        for t in batch.drain(..) {
            acc.push(t)?;
        }

        let trace = acc.finish(name)?;
        info!(
            name,
            frames = trace.frame_count(),
            transitions = trace.transition_count(),
            extents = ?trace.extents,
            "trace resolved"
        );
        Ok(trace)
    }

    /// Read `path` in `chunk_size` chunks. The trace is named after the file stem.
    pub fn assemble_path<P: AsRef<Path>>(self, path: P, chunk_size: usize) -> TraceResult<Trace> {
        let path = path.as_ref();
        let source = FileChunks::open(path, chunk_size)?;
        self.assemble(source, &trace_name(path))
    }

    /// Pick the log among several supplied files, then assemble it.
    pub fn assemble_files<P: AsRef<Path>>(self, paths: &[P], chunk_size: usize) -> TraceResult<Trace> {
        let log = select_log(paths)?;
        self.assemble_path(log, chunk_size)
    }
}

/// Base name with the extension stripped.
#[must_use]
pub fn trace_name(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned())
}

/// First path whose extension is `.log` (case-insensitive).
pub fn select_log<P: AsRef<Path>>(paths: &[P]) -> TraceResult<&Path> {
    paths
        .iter()
        .map(AsRef::as_ref)
        .find(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(LOG_EXTENSION))
        })
        .ok_or_else(|| TraceError::MissingInput {
            path: None,
            reason: "a log (.log) file must be provided for the Lopez Cell-DEVS parser".into(),
        })
}

/* ---------------------------- Deferred ingestion --------------------------- */

/// Ingestion running on a background thread; resolves or rejects once.
#[derive(Debug)]
pub struct PendingTrace {
    handle: JoinHandle<TraceResult<Trace>>,
    cancel: CancelToken,
}

impl PendingTrace {
    /// Ask the pipeline to stop at the next chunk boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the result is ready.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the trace resolves or the run rejects.
    pub fn wait(self) -> TraceResult<Trace> {
        match self.handle.join() {
            Ok(res) => res,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Start assembling `path` on its own thread.
pub fn spawn_path(path: impl Into<PathBuf>, chunk_size: usize) -> PendingTrace {
    let path = path.into();
    let cancel = CancelToken::new();
    let assembler = TraceAssembler::with_cancel(cancel.clone());
    let handle = std::thread::spawn(move || assembler.assemble_path(&path, chunk_size));
    PendingTrace { handle, cancel }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StrChunks;

    const LOG: &str = "\
0 / L / Y / 0.5 / A(1,0,0) / out / 3.2 / (B)
0 / L / Y / 0.5 / A(1,0,0) / out / 3.2 / (B)
0 / L / Y / 1.0 / B(0,0,0) / out / 1.0 / (A)
";

    #[test]
    fn groups_frames_and_extents() {
        let trace = TraceAssembler::new()
            .assemble(StrChunks::new(LOG, 7), "scenario")
            .unwrap();
        assert_eq!(trace.frame_count(), 2);
        assert_eq!(trace.frames[0].len(), 2);
        assert_eq!(trace.frames[1].len(), 1);
        assert_eq!(trace.extents, [2, 1, 1]);
        assert_eq!(trace.source_format, SourceFormat::Lopez);
        assert_eq!(trace.paradigm, Paradigm::CellDevs);
        assert!(trace.palette.is_none());
    }

    #[test]
    fn backwards_time_is_rejected() {
        let log = "\
0 / L / Y / 00:00:01:000 / a(0,0) / out / 1 / (x)
0 / L / Y / 00:00:00:500 / a(0,0) / out / 1 / (x)
";
        let err = TraceAssembler::new().assemble(StrChunks::new(log, 64), "t").unwrap_err();
        assert!(matches!(err, TraceError::OutOfOrder { record: 1, .. }));
    }

    #[test]
    fn empty_log_is_empty_trace() {
        let err = TraceAssembler::new()
            .assemble(StrChunks::new("00:00:00:000\nnothing here\n", 4), "blank")
            .unwrap_err();
        assert!(matches!(err, TraceError::EmptyTrace { .. }));
    }

    #[test]
    fn cancelled_before_first_chunk() {
        let token = CancelToken::new();
        token.cancel();
        let err = TraceAssembler::with_cancel(token)
            .assemble(StrChunks::new(LOG, 8), "c")
            .unwrap_err();
        assert!(matches!(err, TraceError::Cancelled));
    }

    #[test]
    fn selects_log_case_insensitively() {
        let files = ["map.geojson", "life.LOG", "other.log"];
        assert_eq!(select_log(&files[..]).unwrap(), Path::new("life.LOG"));
        let none: [&str; 1] = ["style.json"];
        assert!(matches!(select_log(&none[..]), Err(TraceError::MissingInput { .. })));
    }

    #[test]
    fn name_is_file_stem() {
        assert_eq!(trace_name(Path::new("/tmp/life 2.log")), "life 2");
    }
}
