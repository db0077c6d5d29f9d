//! celltrace-core: data model, error taxonomy, trace I/O and playback settings.
//!
//! This crate defines the **stable boundary** shared by the ingestion and
//! playback crates:
//! - canonical data types (`Transition`, `Frame`, `Trace`, `Snapshot`, …),
//! - the typed [`TraceError`] taxonomy every engine operation returns,
//! - JSON/CBOR I/O for resolved traces (with `.jsonl/.ndjson` transition streams), and
//! - [`PlaybackSettings`] loaded from TOML or JSON.
//!
//! ```rust
//! use celltrace_core::{Coordinate, SimTime};
//!
//! let c = Coordinate::parse_list("1,0,0", ',').unwrap();
//! assert_eq!(c.id(), "1-0-0");
//! assert!(SimTime::new("0.5").partial_order(&SimTime::new("1.0")).is_some());
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Small, explicit allowlist to keep docs readable and APIs ergonomic.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]

/// Typed failures for ingestion and playback.
pub mod error;
/// JSON/CBOR helpers and auto-detecting read/write APIs for traces.
pub mod io;
/// Streaming JSONL/NDJSON helpers for transition dumps.
pub mod io_jsonl;
/// Playback settings (window size, neighborhood, speed, loop).
pub mod settings;
/// Canonical data types shared across the workspace.
pub mod types;

// ---- Re-exports for workspace compatibility ----
pub use error::*;
pub use settings::*;
pub use types::*;

/// Commonly-used items for quick imports.
///
/// ```rust
/// use celltrace_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        error::{TraceError, TraceResult},
        settings::PlaybackSettings,
        types::*,
    };
}
