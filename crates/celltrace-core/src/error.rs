//! Typed failures surfaced by ingestion and playback.
//!
//! Every failure is classified so a collaborator can tell "no input" from
//! "input malformed" from "out of range" without string matching. Ingestion
//! errors abort the whole assembly; playback errors are local to the request
//! that raised them.

use std::path::PathBuf;

/// Convenience alias used throughout the engine crates.
pub type TraceResult<T> = Result<T, TraceError>;

/// Error taxonomy for the trace engine.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// No log file was supplied, or the supplied path does not exist.
    #[error("missing input: {reason}")]
    MissingInput {
        /// Offending path, when one was given.
        path: Option<PathBuf>,
        /// Human-readable explanation.
        reason: String,
    },

    /// A record's fields failed to parse (numeric or structural failure).
    #[error("malformed record at byte {offset}: {reason}: {line:?}")]
    MalformedRecord {
        /// Absolute byte offset of the record marker in the log.
        offset: u64,
        /// Raw record text, marker through end of line.
        line: String,
        /// What failed to parse.
        reason: String,
    },

    /// A record's field count matches neither known layout.
    #[error("unsupported record layout at byte {offset}: {fields} fields (expected 7 or 8): {line:?}")]
    UnsupportedVariant {
        /// Absolute byte offset of the record marker in the log.
        offset: u64,
        /// Raw record text.
        line: String,
        /// Number of `/`-delimited fields found.
        fields: usize,
    },

    /// A record's timestamp goes backwards relative to the open frame.
    #[error("out-of-order record #{record}: time {time} follows {previous}")]
    OutOfOrder {
        /// Zero-based index of the offending record in log order.
        record: usize,
        /// Timestamp of the offending record.
        time: String,
        /// Timestamp of the frame it follows.
        previous: String,
    },

    /// The log is not valid UTF-8.
    #[error("invalid UTF-8 in log at byte {offset}")]
    Encoding {
        /// Absolute byte offset of the first invalid sequence.
        offset: u64,
    },

    /// Ingestion completed but produced zero records.
    #[error("trace is empty: no transition records found in {name:?}")]
    EmptyTrace {
        /// Name of the trace that was being assembled.
        name: String,
    },

    /// A Jump/Move target lies outside `[0, frame_count)`.
    #[error("frame index {index} out of range (frame count {frame_count})")]
    IndexOutOfRange {
        /// Requested frame index (may be negative for relative moves).
        index: i64,
        /// Number of frames in the trace.
        frame_count: usize,
    },

    /// Ingestion was abandoned by caller request.
    #[error("ingestion cancelled")]
    Cancelled,

    /// Playback settings failed validation.
    #[error("invalid playback settings: {0}")]
    InvalidSettings(String),

    /// Underlying read failure on an existing input.
    #[error("reading {}: {source}", .path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// OS-level error.
        #[source]
        source: std::io::Error,
    },
}

impl TraceError {
    /// Build a [`TraceError::MalformedRecord`] from a raw line.
    #[must_use]
    pub fn malformed(offset: u64, line: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            offset,
            line: line.to_owned(),
            reason: reason.into(),
        }
    }

    /// Short stable tag for logs and collaborator dispatch.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput { .. } => "missing-input",
            Self::MalformedRecord { .. } => "malformed-record",
            Self::UnsupportedVariant { .. } => "unsupported-variant",
            Self::OutOfOrder { .. } => "out-of-order",
            Self::Encoding { .. } => "encoding",
            Self::EmptyTrace { .. } => "empty-trace",
            Self::IndexOutOfRange { .. } => "index-out-of-range",
            Self::Cancelled => "cancelled",
            Self::InvalidSettings(_) => "invalid-settings",
            Self::Io { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_carries_line_and_offset() {
        let e = TraceError::malformed(42, "0 / L / Y / x", "bad value");
        match &e {
            TraceError::MalformedRecord { offset, line, reason } => {
                assert_eq!(*offset, 42);
                assert_eq!(line, "0 / L / Y / x");
                assert_eq!(reason, "bad value");
            }
            other => panic!("unexpected variant {other:?}"),
        }
        assert_eq!(e.kind(), "malformed-record");
        assert!(e.to_string().contains("byte 42"));
    }
}
