//! JSON Lines (NDJSON) helpers for streaming [`Transition`] I/O.
//!
//! - **Reader**: an iterator that *owns* its underlying reader, yielding
//!   `Result<Transition>` so callers can surface per-line errors.
//! - **Writer**: uses `serde_json::to_writer` to avoid intermediate allocations
//!   and accepts any iterator, so a trace can be dumped without cloning.
//!
//! Both `.jsonl` and `.ndjson` are treated as the same line-delimited format.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::Transition;

/// Owning JSONL iterator over [`Transition`]s.
pub struct JsonlTransitionIter {
    rdr: BufReader<File>,
    buf: String,
    line_no: usize,
}

impl JsonlTransitionIter {
    fn new(file: File) -> Self {
        Self {
            rdr: BufReader::new(file),
            buf: String::with_capacity(1 << 10),
            line_no: 0,
        }
    }
}

impl Iterator for JsonlTransitionIter {
    type Item = Result<Transition>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.rdr.read_line(&mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                let line = self.buf.trim_end_matches(['\n', '\r']);
                if line.is_empty() {
                    return Some(Err(anyhow::anyhow!(
                        "parse jsonl line {}: empty line",
                        self.line_no
                    )));
                }
                Some(
                    serde_json::from_str(line)
                        .with_context(|| format!("parse jsonl line {}", self.line_no)),
                )
            }
            Err(e) => Some(Err(e).with_context(|| format!("read line {}", self.line_no + 1))),
        }
    }
}

/// Stream read: one JSON object per line, yielding [`Transition`]s.
pub fn stream_transitions_jsonl<P: AsRef<Path>>(path: P) -> Result<JsonlTransitionIter> {
    let f = File::open(path.as_ref())
        .with_context(|| format!("open {}", path.as_ref().display()))?;
    Ok(JsonlTransitionIter::new(f))
}

/// Write transitions as JSON Lines. Returns the number of lines written.
pub fn write_transitions_jsonl<'a, P, I>(path: P, items: I) -> Result<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a Transition>,
{
    crate::io::ensure_parent_dir(path.as_ref())?;
    let f = File::create(path.as_ref())
        .with_context(|| format!("create {}", path.as_ref().display()))?;
    let mut w = BufWriter::new(f);
    let mut n = 0usize;
    for t in items {
        serde_json::to_writer(&mut w, t).context("serialize transition to json")?;
        w.write_all(b"\n").context("write newline")?;
        n += 1;
    }
    w.flush().context("flush writer")?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, SimTime, TransitionKind};
    use std::io::Write as _;

    fn tmp(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("celltrace_core_jsonl_{name}_{nanos}.jsonl"))
    }

    #[test]
    fn jsonl_streams_back_in_order() {
        let items: Vec<Transition> = (0..3u32)
            .map(|i| Transition {
                kind: TransitionKind::Output,
                time: SimTime::new(format!("00:00:00:00{i}")),
                model: "life".into(),
                coordinate: Coordinate::new(i, 0, 0),
                port: "out".into(),
                value: f64::from(i),
                destination: "02".into(),
            })
            .collect();
        let p = tmp("order");
        assert_eq!(write_transitions_jsonl(&p, &items).unwrap(), 3);

        let back: Vec<Transition> = stream_transitions_jsonl(&p)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(back, items);
        let _ = std::fs::remove_file(p);
    }

    #[test]
    fn blank_line_is_reported_with_line_number() {
        let p = tmp("blank");
        {
            let mut f = File::create(&p).unwrap();
            writeln!(f).unwrap();
        }
        let err = stream_transitions_jsonl(&p).unwrap().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("line 1"));
        let _ = std::fs::remove_file(p);
    }
}
