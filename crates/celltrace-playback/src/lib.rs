//! Memory-bounded playback over a resolved `Trace`.
//!
//! - `window`: the pure `WindowPlan` partition and the `CacheWindower` that
//!   materializes windows on demand and evicts them away from every cursor.
//! - `cursor`: `PlaybackCursor`, the position tracker issuing absolute
//!   (`jump`) and relative (`step`) requests.
//!
//! ```rust
//! use std::sync::Arc;
//! use celltrace_core::PlaybackSettings;
//! use celltrace_ingest::{assembler::TraceAssembler, source::StrChunks};
//! use celltrace_playback::{cursor::PlaybackCursor, window::CacheWindower};
//!
//! let log = "0 / L / Y / 0.5 / A(1,0,0) / out / 3.2 / (B)\n\
//!            0 / L / Y / 1.0 / B(0,0,0) / out / 1.0 / (A)\n";
//! let trace = TraceAssembler::new().assemble(StrChunks::new(log, 16), "demo").unwrap();
//! let windower = Arc::new(CacheWindower::new(Arc::new(trace), &PlaybackSettings::default()).unwrap());
//! let mut cursor = PlaybackCursor::new(Arc::clone(&windower));
//! assert_eq!(cursor.jump(1).unwrap().len(), 2);
//! assert!(cursor.step(1).is_err());
//! assert_eq!(cursor.position(), 1);
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

/// Position tracking and Jump/Move requests.
pub mod cursor;
/// Window partitioning, materialization and eviction.
pub mod window;
