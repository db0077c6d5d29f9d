//! celltrace-bench-harness
//!
//! Run small end-to-end benchmarks (generate -> ingest -> jump -> step sweep)
//! and append CSV rows into `benchmarks/reports/bench-<unix>.csv`.
//!
//! Usage examples:
//!   cargo run -p celltrace-bench-harness -- --profile benchmarks/harness/profiles/small.toml
//!   cargo run -p celltrace-bench-harness -- --profile benchmarks/harness/profiles/medium.toml --seed 7

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use celltrace_core::PlaybackSettings;
use celltrace_ingest::{
    assembler::TraceAssembler,
    generator::{generate_log, LogSpec},
};
use celltrace_playback::{cursor::PlaybackCursor, window::CacheWindower};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Profile {
    /// Cell-space dimensions (1..=3 axes)
    dims: Vec<u32>,
    /// Distinct timestamps in the synthetic log
    frames: u32,
    /// Read size for ingestion
    chunk_size: usize,
    /// Frames per cache window
    window_size: usize,
    /// Windows kept around the cursor
    #[serde(default = "default_neighborhood")]
    neighborhood: usize,
    /// Repetitions of the whole pipeline
    repeats: u32,
}

const fn default_neighborhood() -> usize {
    1
}

fn parse_flag(name: &str, default: &str) -> String {
    let mut it = std::env::args().skip(1);
    while let Some(k) = it.next() {
        if k == format!("--{name}") {
            return it.next().unwrap_or_else(|| default.to_string());
        }
    }
    default.to_string()
}

fn dur_ms(d: Duration) -> u128 {
    d.as_millis()
}

fn main() -> Result<()> {
    let profile_path = PathBuf::from(parse_flag("profile", "benchmarks/harness/profiles/small.toml"));
    let seed: u64 = parse_flag("seed", "42").parse().context("--seed must be an integer")?;

    let profile_src = fs::read_to_string(&profile_path)
        .with_context(|| format!("read profile {}", profile_path.display()))?;
    let profile: Profile = toml::from_str(&profile_src).context("parse profile toml")?;
    ensure!(
        (1..=3).contains(&profile.dims.len()),
        "profile dims must have 1 to 3 axes"
    );
    let settings = PlaybackSettings {
        window_size: profile.window_size,
        neighborhood: profile.neighborhood,
        ..PlaybackSettings::default()
    };
    settings.validate()?;
    let dims = profile
        .dims
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join("x");
    println!(
        "Profile: dims={dims}, frames={}, chunk={}, window={}, repeats={}",
        profile.frames, profile.chunk_size, profile.window_size, profile.repeats
    );

    fs::create_dir_all("benchmarks/reports").ok();

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let csv_path = PathBuf::from(format!("benchmarks/reports/bench-{ts}.csv"));
    let mut csv = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&csv_path)?;
    writeln!(csv, "timestamp,dims,frames,chunk,window,repeat,stage,ms,extra")?;

    for rep in 0..profile.repeats {
        let log_path = PathBuf::from(format!("benchmarks/tmp-{ts}-{rep}.log"));
        fs::create_dir_all("benchmarks").ok();
        let row = |stage: &str, d: Duration, extra: String| {
            format!(
                "{ts},{dims},{},{},{},{rep},{stage},{},{extra}",
                profile.frames,
                profile.chunk_size,
                profile.window_size,
                dur_ms(d)
            )
        };

        // 1) generate log
        let t0 = Instant::now();
        let log = generate_log(&LogSpec {
            dims: profile.dims.clone(),
            frames: profile.frames,
            seed: seed.wrapping_add(u64::from(rep)),
            ..LogSpec::default()
        });
        fs::write(&log_path, &log.text)
            .with_context(|| format!("write {}", log_path.display()))?;
        writeln!(csv, "{}", row("gen", t0.elapsed(), format!("bytes={}", log.text.len())))?;

        // 2) ingest
        let t0 = Instant::now();
        let trace = TraceAssembler::new().assemble_path(&log_path, profile.chunk_size)?;
        let t_ingest = t0.elapsed();
        ensure!(
            trace.transition_count() == log.records,
            "ingested {} transitions, generated {}",
            trace.transition_count(),
            log.records
        );
        writeln!(
            csv,
            "{}",
            row("ingest", t_ingest, format!("transitions={}", trace.transition_count()))
        )?;

        // 3) cold jump to the last frame
        let trace = Arc::new(trace);
        let windower = Arc::new(CacheWindower::new(Arc::clone(&trace), &settings)?);
        let mut cursor = PlaybackCursor::new(Arc::clone(&windower));
        let last = trace.frame_count() - 1;
        let t0 = Instant::now();
        let snap = cursor.jump(last)?;
        writeln!(csv, "{}", row("jump", t0.elapsed(), format!("emitters={}", snap.len())))?;

        // 4) step sweep from frame 0 to the end
        cursor.jump(0)?;
        let t0 = Instant::now();
        let mut changes = 0usize;
        while cursor.position() < last {
            changes += cursor.step(1)?.changes.len();
        }
        writeln!(
            csv,
            "{}",
            row(
                "sweep",
                t0.elapsed(),
                format!(
                    "changes={changes};loads={};resident={}",
                    windower.load_count(),
                    windower.resident_windows()
                )
            )
        )?;

        let _ = fs::remove_file(&log_path);
    }

    println!("Wrote report → {}", csv_path.display());
    Ok(())
}
