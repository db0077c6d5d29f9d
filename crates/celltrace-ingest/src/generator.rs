// crates/celltrace-ingest/src/generator.rs

//! Synthetic CD++ log generator used by tests, the CLI `generate` subcommand,
//! and the benchmark harness.
//!
//! Frame 0 emits every cell (the initial state), so the derived extents of a
//! generated log always equal the requested dimensions. Later frames emit a
//! random subset of cells. Non-record lines (time markers, `X`/`*` messages)
//! are interleaved so the tokenizer has something to skip.

use rand::{rngs::StdRng, Rng as _, SeedableRng};

use celltrace_core::Extents;

use crate::tokenizer::RECORD_MARKER;

/// Shape of a generated log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSpec {
    /// Model name written before each coordinate group.
    pub model: String,
    /// Cell-space dimensions; the length (1..=3) is the coordinate arity.
    pub dims: Vec<u32>,
    /// Number of distinct timestamps.
    pub frames: u32,
    /// Simulated milliseconds between frames.
    pub step_ms: u64,
    /// Emit both 7- and 8-field layouts instead of only 8-field lines.
    pub mixed_layouts: bool,
    /// RNG seed.
    pub seed: u64,
}

impl Default for LogSpec {
    fn default() -> Self {
        Self {
            model: "life".into(),
            dims: vec![10, 10],
            frames: 20,
            step_ms: 100,
            mixed_layouts: true,
            seed: 42,
        }
    }
}

/// Generated text plus what a correct parse must produce.
#[derive(Clone, Debug)]
pub struct GeneratedLog {
    /// Log contents.
    pub text: String,
    /// Number of transition records written.
    pub records: usize,
    /// Number of distinct timestamps written.
    pub frames: usize,
    /// Expected extents.
    pub extents: Extents,
}

/// Format simulated milliseconds as a CD++ clock (`hh:mm:ss:mmm`).
#[must_use]
pub fn clock(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}:{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

/// Generate a deterministic log for `spec`.
#[must_use]
pub fn generate_log(spec: &LogSpec) -> GeneratedLog {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let mut dims: Vec<u32> = spec.dims.iter().take(3).map(|&d| d.max(1)).collect();
    if dims.is_empty() {
        dims.push(1);
    }
    let cells = all_cells(&dims);

    let mut text = String::new();
    let mut records = 0usize;

    for f in 0..spec.frames {
        let time = clock(u64::from(f) * spec.step_ms);
        text.push_str(&format!("{time}\n"));
        let mut emitted = 0usize;
        for (i, cell) in cells.iter().enumerate() {
            if f > 0 && !rng.random_bool(0.3) {
                continue;
            }
            let coord = cell.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
            let value: f64 = if rng.random_bool(0.5) { 1.0 } else { 0.0 };
            if rng.random_bool(0.1) {
                text.push_str(&format!(
                    "0 / L / X / {time} / {}({coord})({i}) / in / {value:.5}\n",
                    spec.model
                ));
            }
            if spec.mixed_layouts && rng.random_bool(0.5) {
                text.push_str(&format!(
                    "{RECORD_MARKER} / {time} / {m}({coord})({i}) / out / {value:.5} {m}(02)\n",
                    m = spec.model
                ));
            } else {
                text.push_str(&format!(
                    "{RECORD_MARKER} / {time} / {m}({coord})({i}) / out / {value:>12.5} / {m}(02)\n",
                    m = spec.model
                ));
            }
            emitted += 1;
        }
        if emitted == 0 {
            // Keep every timestamp observable as a frame.
            let coord = cells[0].iter().map(u32::to_string).collect::<Vec<_>>().join(",");
            text.push_str(&format!(
                "{RECORD_MARKER} / {time} / {m}({coord})(0) / out / {v:>12.5} / {m}(02)\n",
                m = spec.model,
                v = 0.0
            ));
            emitted = 1;
        }
        text.push_str(&format!("0 / L / * / {time} / {}(00) / top(01)\n", spec.model));
        records += emitted;
    }

    let mut extents = [1u32; 3];
    for (e, d) in extents.iter_mut().zip(&dims) {
        *e = *d;
    }
    GeneratedLog {
        text,
        records,
        frames: spec.frames as usize,
        extents: if spec.frames == 0 { [0; 3] } else { extents },
    }
}

fn all_cells(dims: &[u32]) -> Vec<Vec<u32>> {
    let mut out = vec![Vec::new()];
    for &d in dims {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                (0..d).map(move |c| {
                    let mut v = prefix.clone();
                    v.push(c);
                    v
                })
            })
            .collect();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::RecordTokenizer;

    #[test]
    fn generator_is_deterministic() {
        let spec = LogSpec::default();
        assert_eq!(generate_log(&spec).text, generate_log(&spec).text);
    }

    #[test]
    fn generated_log_parses_to_expected_counts() {
        let spec = LogSpec {
            dims: vec![4, 3, 2],
            frames: 6,
            ..LogSpec::default()
        };
        let log = generate_log(&spec);
        let records = RecordTokenizer::new().tokenize_str(&log.text).unwrap();
        assert_eq!(records.len(), log.records);
        assert_eq!(log.extents, [4, 3, 2]);
    }

    #[test]
    fn clock_format() {
        assert_eq!(clock(0), "00:00:00:000");
        assert_eq!(clock(61_250), "00:01:01:250");
    }
}
