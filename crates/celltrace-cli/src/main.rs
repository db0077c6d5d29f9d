// crates/celltrace-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use celltrace_core::{
    io::{ensure_parent_dir, ext_lower, read_trace_auto, write_trace_auto},
    io_jsonl::{stream_transitions_jsonl, write_transitions_jsonl},
    PlaybackSettings, Snapshot, Trace, TraceStats,
};
use celltrace_ingest::{
    assembler::{select_log, spawn_path, trace_name, FrameAccumulator, TraceAssembler},
    generator::{generate_log, LogSpec},
    source::DEFAULT_CHUNK_SIZE,
};
use celltrace_playback::{
    cursor::{Advance, PlaybackCursor},
    window::CacheWindower,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "celltrace",
    about = "CD++ Cell-DEVS trace ingestion and playback",
    long_about = "CD++ Cell-DEVS trace ingestion and playback.\n\nUse this tool to generate synthetic logs, resolve them into traces, and step through them with a windowed cursor.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write a deterministic synthetic CD++ log.
    Generate {
        /// Cell-space dimensions, e.g. `10,10` or `4,4,2`
        #[arg(long, default_value = "10,10", value_delimiter = ',')]
        dims: Vec<u32>,

        /// Number of distinct timestamps (>0)
        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
        frames: u32,

        /// Model name
        #[arg(long, default_value = "life")]
        model: String,

        /// RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Only emit 8-field records
        #[arg(long, default_value_t = false)]
        split_only: bool,

        /// Output log path
        #[arg(long, default_value = "life.log")]
        out: PathBuf,
    },

    /// Resolve a log into a trace; optionally save it as JSON/CBOR.
    /// Several files may be given; the first `.log` among them is used.
    Parse {
        /// Input files (the `.log` is picked out)
        #[arg(long = "log", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Read size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Output path for the resolved trace (CBOR/JSON)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Dump every transition as JSON Lines.
    ExportJsonl {
        /// Input log (`.log`) or saved trace (`.json`/`.cbor`)
        #[arg(long = "log", alias = "input")]
        input: PathBuf,

        /// Output JSONL path
        #[arg(long)]
        out: PathBuf,
    },

    /// Print statistics for a saved trace or transition dump.
    Inspect {
        /// Saved trace (`.json`/`.cbor`) or transitions (`.jsonl`)
        #[arg(long)]
        trace: PathBuf,

        /// Emit the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Step through a log with a windowed playback cursor.
    Play {
        /// Input log path
        #[arg(long)]
        log: PathBuf,

        /// Playback settings (TOML/JSON)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Frames per cache window (overrides settings)
        #[arg(long)]
        window_size: Option<usize>,

        /// Frame to jump to before stepping
        #[arg(long)]
        jump: Option<usize>,

        /// Number of forward ticks
        #[arg(long, default_value_t = 10)]
        steps: usize,

        /// Wrap to frame 0 after the last frame (overrides settings)
        #[arg(long = "loop")]
        loop_playback: Option<bool>,

        /// Sleep between ticks according to `speed`
        #[arg(long, default_value_t = false)]
        realtime: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Generate {
            dims,
            frames,
            model,
            seed,
            split_only,
            out,
        } => generate(
            LogSpec {
                model,
                dims,
                frames,
                mixed_layouts: !split_only,
                seed,
                ..LogSpec::default()
            },
            &out,
        ),

        Cmd::Parse {
            inputs,
            chunk_size,
            out,
        } => parse(&inputs, chunk_size, out.as_deref()),

        Cmd::ExportJsonl { input, out } => export_jsonl(&input, &out),

        Cmd::Inspect { trace, json } => inspect(&trace, json),

        Cmd::Play {
            log,
            settings,
            window_size,
            jump,
            steps,
            loop_playback,
            realtime,
        } => {
            let mut s = match settings {
                Some(p) => PlaybackSettings::load(&p)
                    .with_context(|| format!("loading settings from {}", p.display()))?,
                None => PlaybackSettings::default(),
            };
            if let Some(w) = window_size {
                s.window_size = w;
            }
            if let Some(l) = loop_playback {
                s.loop_playback = l;
            }
            s.validate()?;
            play(&log, &s, jump, steps, realtime)
        }
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn generate(spec: LogSpec, out: &Path) -> Result<()> {
    if spec.dims.is_empty() || spec.dims.len() > 3 {
        bail!("--dims takes 1 to 3 comma-separated sizes, got {}", spec.dims.len());
    }
    info!(dims = ?spec.dims, frames = spec.frames, seed = spec.seed, "generating synthetic log");
    let log = generate_log(&spec);

    ensure_parent_dir(out)?;
    std::fs::write(out, &log.text).with_context(|| format!("write {}", out.display()))?;

    println!(
        "Generated {} records over {} frames, extents {:?} → {}",
        log.records,
        log.frames,
        log.extents,
        out.display()
    );
    Ok(())
}

/// Resolve a log file (picked among `inputs`) on a background thread.
fn load_log(inputs: &[PathBuf], chunk_size: usize) -> Result<Trace> {
    let log = select_log(inputs)?;
    info!(log = %log.display(), chunk_size, "parsing");
    let pending = spawn_path(log, chunk_size);
    pending
        .wait()
        .with_context(|| format!("parsing {}", log.display()))
}

fn parse(inputs: &[PathBuf], chunk_size: usize, out: Option<&Path>) -> Result<()> {
    let trace = load_log(inputs, chunk_size)?;

    println!(
        "Parsed {}: {} frames, {} transitions, extents {:?}",
        trace.name,
        trace.frame_count(),
        trace.transition_count(),
        trace.extents
    );

    if let Some(out) = out {
        write_trace_auto(out, &trace)
            .with_context(|| format!("writing trace to {}", out.display()))?;
        println!("Saved → {}", out.display());
    }
    Ok(())
}

/// Load either a raw log or a saved trace, by extension.
fn load_any(input: &Path) -> Result<Trace> {
    match ext_lower(input).as_deref() {
        Some("log") => TraceAssembler::new()
            .assemble_path(input, DEFAULT_CHUNK_SIZE)
            .with_context(|| format!("parsing {}", input.display())),
        _ => read_trace_auto(input),
    }
}

fn export_jsonl(input: &Path, out: &Path) -> Result<()> {
    info!(infile = %input.display(), outfile = %out.display(), "export to jsonl");
    let trace = load_any(input)?;
    let n = write_transitions_jsonl(out, trace.transitions())?;
    println!("Exported {n} transitions → {}", out.display());
    Ok(())
}

#[derive(Serialize)]
struct InspectReport {
    name: String,
    extents: [u32; 3],
    ports: Vec<String>,
    #[serde(flatten)]
    stats: TraceStats,
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let trace = if matches!(ext_lower(path).as_deref(), Some("jsonl" | "ndjson")) {
        // A transition dump carries no trace envelope; regroup it by time.
        let mut acc = FrameAccumulator::new();
        for item in stream_transitions_jsonl(path)? {
            acc.push(item?)?;
        }
        acc.finish(&trace_name(path))?
    } else {
        read_trace_auto(path)?
    };
    let report = InspectReport {
        name: trace.name.clone(),
        extents: trace.extents,
        ports: trace.ports(),
        stats: trace.stats(),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
        return Ok(());
    }
    let e = report.extents;
    println!("trace:        {}", report.name);
    println!("extents:      {}x{}x{}", e[0], e[1], e[2]);
    println!("frames:       {}", report.stats.frames);
    println!("transitions:  {}", report.stats.transitions);
    if let Some(v) = report.stats.values {
        println!("values:       [{}, {}]", v.min, v.max);
    }
    for (port, r) in &report.stats.ports {
        println!("  port {port:<10} [{}, {}]", r.min, r.max);
    }
    Ok(())
}

fn summarize(snap: &Snapshot) -> String {
    let live = snap.values.values().filter(|v| **v != 0.0).count();
    format!("{} emitters, {live} non-zero", snap.len())
}

fn play(
    log: &Path,
    settings: &PlaybackSettings,
    jump: Option<usize>,
    steps: usize,
    realtime: bool,
) -> Result<()> {
    let trace = Arc::new(load_log(&[log.to_path_buf()], DEFAULT_CHUNK_SIZE)?);
    if trace.frame_count() == 0 {
        bail!("{} has no frames", log.display());
    }
    let windower = Arc::new(CacheWindower::new(Arc::clone(&trace), settings)?);
    let mut cursor = PlaybackCursor::new(Arc::clone(&windower));
    info!(
        frames = trace.frame_count(),
        windows = windower.plan().window_count(),
        window_size = settings.window_size,
        "playback ready"
    );

    let start = jump.unwrap_or(0);
    let snap = cursor.jump(start)?;
    println!(
        "[{start:>5}] {} jump: {}",
        trace.frames[start].time,
        summarize(&snap)
    );

    let tick = Duration::from_millis(1000 / u64::from(settings.speed.max(1)));
    for _ in 0..steps {
        if realtime {
            std::thread::sleep(tick);
        }
        match cursor.advance(settings.loop_playback)? {
            Advance::Delta(d) => {
                println!("[{:>5}] {} move: {} changes", d.index, d.time, d.changes.len());
            }
            Advance::Restart(s) => {
                println!("[{:>5}] {} loop: {}", 0, trace.frames[0].time, summarize(&s));
            }
            Advance::End => {
                warn!(position = cursor.position(), "end of trace");
                break;
            }
        }
    }

    println!(
        "Resident windows: {} / {} (loads: {})",
        windower.resident_windows(),
        windower.plan().window_count(),
        windower.load_count()
    );
    Ok(())
}
