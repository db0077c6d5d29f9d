//! Streaming ingestion of CD++ (Lopez) Cell-DEVS logs into resolved traces.
//!
//! The pipeline is three stages, each usable on its own:
//!
//! - `source`: bounded, ordered text chunks from a file or string.
//! - `tokenizer`: a resumable fold that turns chunks into `Transition`s,
//!   carrying unterminated records across chunk boundaries.
//! - `assembler`: groups records into frames, computes extents once the
//!   stream ends, and resolves (or rejects) the whole trace.
//!
//! `generator` produces deterministic synthetic logs for tests and benches.
//!
//! ```rust
//! use celltrace_ingest::{assembler::TraceAssembler, source::StrChunks};
//!
//! let log = "0 / L / Y / 0.5 / A(1,0,0) / out / 3.2 / (B)\n";
//! let trace = TraceAssembler::new().assemble(StrChunks::new(log, 4), "demo").unwrap();
//! assert_eq!(trace.extents, [2, 1, 1]);
//! ```
//!
//! Callers import through module paths such as
//! `celltrace_ingest::tokenizer::RecordTokenizer`.

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

/// Frame grouping, extents and whole-trace resolution.
pub mod assembler;
/// Deterministic synthetic log generator (for tests/benches).
pub mod generator;
/// Chunk sources over files and in-memory text.
pub mod source;
/// Resumable record tokenizer.
pub mod tokenizer;
