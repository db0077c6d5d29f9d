//! Serialization helpers for resolved [`Trace`]s.
//!
//! JSON and CBOR read/write utilities with extension-based auto-detection.
//! Unknown/missing extensions are rejected for reads and default to JSON
//! for writes. These exist for offline inspection and tooling; the engine
//! itself never reloads a trace across restarts.

use crate::Trace;
use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Ensure the parent directory for a file exists (no-op if none).
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", display(path)))?;
        }
    }
    Ok(())
}

/* ---------------- JSON ---------------- */

/// Read a [`Trace`] from **JSON**.
pub fn read_trace_json<P: AsRef<Path>>(path: P) -> Result<Trace> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let rdr = BufReader::new(f);
    let v: Trace = serde_json::from_reader(rdr).with_context(|| "deserialize JSON trace")?;
    Ok(v)
}

/// Write a [`Trace`] to **JSON** (pretty).
pub fn write_trace_json<P: AsRef<Path>>(path: P, v: &Trace) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, v).with_context(|| "serialize JSON trace")?;
    w.flush().with_context(|| "flush JSON writer")?;
    Ok(())
}

/* ---------------- CBOR ---------------- */

/// Read a [`Trace`] from **CBOR**.
pub fn read_trace_cbor<P: AsRef<Path>>(path: P) -> Result<Trace> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let mut rdr = BufReader::new(f);
    let v: Trace =
        ciborium::de::from_reader(&mut rdr).with_context(|| "deserialize CBOR trace")?;
    Ok(v)
}

/// Write a [`Trace`] to **CBOR**.
pub fn write_trace_cbor<P: AsRef<Path>>(path: P, v: &Trace) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let f = File::create(path_ref).with_context(|| format!("create {}", display(path_ref)))?;
    let mut w = BufWriter::new(f);
    ciborium::ser::into_writer(v, &mut w).with_context(|| "serialize CBOR trace")?;
    w.flush().with_context(|| "flush CBOR writer")?;
    Ok(())
}

/* --------------- Auto-detect by extension --------------- */

/// Auto-detect **read** by extension (`.json` / `.cbor`, case-insensitive).
pub fn read_trace_auto<P: AsRef<Path>>(path: P) -> Result<Trace> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("json") => read_trace_json(path),
        Some("cbor") => read_trace_cbor(path),
        Some(other) => Err(anyhow!(
            "unsupported trace extension: {} (supported: .json, .cbor)",
            other
        )),
        None => Err(anyhow!("path has no extension (expected .json or .cbor)")),
    }
}

/// Auto-detect **write** (defaults to JSON if unknown/missing).
pub fn write_trace_auto<P: AsRef<Path>>(path: P, v: &Trace) -> Result<()> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("cbor") => write_trace_cbor(path, v),
        _ => write_trace_json(path, v),
    }
}

/* ---------------- Small helpers ---------------- */

/// Return the lowercase extension (without dot) if present.
#[must_use]
pub fn ext_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

#[inline]
fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, Frame, Paradigm, SimTime, SourceFormat, Transition, TransitionKind};

    fn tmp_path(name: &str, ext: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("celltrace_core_io_{name}_{nanos}.{ext}"));
        p
    }

    fn tiny_trace() -> Trace {
        Trace {
            name: "life".into(),
            source_format: SourceFormat::Lopez,
            paradigm: Paradigm::CellDevs,
            frames: vec![Frame {
                time: SimTime::new("00:00:00:000"),
                transitions: vec![Transition {
                    kind: TransitionKind::Output,
                    time: SimTime::new("00:00:00:000"),
                    model: "life".into(),
                    coordinate: Coordinate::new(2, 1, 0),
                    port: "out".into(),
                    value: 1.0,
                    destination: "02".into(),
                }],
            }],
            extents: [3, 2, 1],
            palette: None,
        }
    }

    #[test]
    fn trace_json_and_cbor_agree() {
        let trace = tiny_trace();
        let json = tmp_path("trace", "json");
        let cbor = tmp_path("trace", "CBOR");
        write_trace_auto(&json, &trace).unwrap();
        write_trace_auto(&cbor, &trace).unwrap();
        assert_eq!(read_trace_auto(&json).unwrap(), trace);
        assert_eq!(read_trace_auto(&cbor).unwrap(), trace);
        let _ = std::fs::remove_file(json);
        let _ = std::fs::remove_file(cbor);
    }

    #[test]
    fn coordinates_serialize_as_ids() {
        let v = serde_json::to_value(tiny_trace()).unwrap();
        assert_eq!(v["frames"][0]["transitions"][0]["coordinate"], "2-1-0");
        assert_eq!(v["paradigm"], "Cell-DEVS");
    }

    #[test]
    fn unknown_extension_rejected_on_read() {
        let err = read_trace_auto("trace.txt").unwrap_err();
        assert!(err.to_string().contains("unsupported trace extension"));
        assert!(read_trace_auto("trace").is_err());
    }
}
