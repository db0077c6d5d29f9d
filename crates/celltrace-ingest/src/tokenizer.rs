//! Resumable tokenizer for CD++ (Lopez) transition records.
//!
//! Every output record opens with the marker `0 / L / Y` and runs to the end
//! of its line. The record text is split on `/`; fields 0..=2 are the marker
//! tokens themselves. Two producers exist:
//!
//! - `Combined` (7 fields): `.. / <time> / <model>(<coord>) / <port> / <value> <dest>(<id>)`
//! - `Split` (8 fields):    `.. / <time> / <model>(<coord>) / <port> / <value> / <dest>(<id>)`
//!
//! The layout is chosen once per record from the field count, never by
//! regular expression.
//!
//! Scanning is a fold: [`RecordTokenizer::feed`] takes a [`ScanState`] plus one
//! chunk and hands back the next state. The state holds the unscanned tail of
//! the stream (an unterminated record, or a possible marker prefix), so the
//! records produced do not depend on where chunk boundaries fall.

use std::collections::VecDeque;

use celltrace_core::{
    Coordinate, SimTime, TraceError, TraceResult, Transition, TransitionKind,
};

use crate::source::ChunkSource;

/// Substring that opens every output transition record.
pub const RECORD_MARKER: &str = "0 / L / Y";
/// Field delimiter inside a record.
pub const FIELD_DELIMITER: char = '/';
/// Separator between coordinate components in the log.
pub const COORD_SEPARATOR: char = ',';

/// Carry-over between chunks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanState {
    /// Text not yet consumed by a complete record.
    carry: String,
    /// Absolute stream offset of `carry[0]`.
    base: u64,
}

impl ScanState {
    /// Fresh state at stream offset 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending (unconsumed) text.
    #[must_use]
    pub fn carry(&self) -> &str {
        &self.carry
    }

    /// Absolute offset of the first pending byte.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.base
    }
}

/// Field map for one record, selected by field count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordLayout<'a> {
    /// Value and destination share the last field.
    Combined {
        kind: &'a str,
        time: &'a str,
        model: &'a str,
        port: &'a str,
        value_and_destination: &'a str,
    },
    /// Value and destination in their own fields.
    Split {
        kind: &'a str,
        time: &'a str,
        model: &'a str,
        port: &'a str,
        value: &'a str,
        destination: &'a str,
    },
}

impl<'a> RecordLayout<'a> {
    fn select(fields: &[&'a str]) -> Option<Self> {
        match *fields {
            [_, _, kind, time, model, port, value_and_destination] => Some(Self::Combined {
                kind,
                time,
                model,
                port,
                value_and_destination,
            }),
            [_, _, kind, time, model, port, value, destination] => Some(Self::Split {
                kind,
                time,
                model,
                port,
                value,
                destination,
            }),
            _ => None,
        }
    }
}

/// Stateless record scanner; all mutable state lives in [`ScanState`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordTokenizer;

impl RecordTokenizer {
    /// Construct a tokenizer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Scan one chunk, appending complete records to `out`.
    ///
    /// On error, records preceding the offending one have already been pushed.
    pub fn feed(
        &self,
        mut state: ScanState,
        chunk: &str,
        out: &mut Vec<Transition>,
    ) -> TraceResult<ScanState> {
        state.carry.push_str(chunk);
        let consumed = scan(&state.carry, state.base, out, false)?;
        state.carry.drain(..consumed);
        state.base += consumed as u64;
        Ok(state)
    }

    /// Flush the final state at end of stream. A record still open is
    /// terminated by end of input.
    pub fn finish(&self, state: ScanState, out: &mut Vec<Transition>) -> TraceResult<()> {
        scan(&state.carry, state.base, out, true).map(|_| ())
    }

    /// Tokenize a whole string in one pass.
    pub fn tokenize_str(&self, text: &str) -> TraceResult<Vec<Transition>> {
        let mut out = Vec::new();
        let state = self.feed(ScanState::new(), text, &mut out)?;
        self.finish(state, &mut out)?;
        Ok(out)
    }

    /// Drive a chunk source through the fold as an iterator of records.
    pub fn tokens<S: ChunkSource>(self, source: S) -> Tokens<S> {
        Tokens {
            source,
            tokenizer: self,
            state: Some(ScanState::new()),
            ready: VecDeque::new(),
            scratch: Vec::new(),
            error: None,
        }
    }
}

/// Scan `buf` for complete records. Returns how many bytes of `buf` are fully
/// consumed; everything after that must be carried into the next call.
fn scan(buf: &str, base: u64, out: &mut Vec<Transition>, at_eof: bool) -> TraceResult<usize> {
    let mut pos = 0usize;
    loop {
        let Some(rel) = buf[pos..].find(RECORD_MARKER) else {
            if at_eof {
                return Ok(buf.len());
            }
            // Keep just enough bytes to complete a marker split across chunks.
            let mut keep = buf
                .len()
                .saturating_sub(RECORD_MARKER.len() - 1)
                .max(pos);
            while !buf.is_char_boundary(keep) {
                keep += 1;
            }
            return Ok(keep);
        };
        let start = pos + rel;
        let body = start + RECORD_MARKER.len();
        let end = match buf[body..].find('\n') {
            Some(i) => body + i,
            None if at_eof => buf.len(),
            None => return Ok(start),
        };
        let line = buf[start..end].trim_end_matches('\r');
        out.push(parse_record(line, base + start as u64)?);
        pos = (end + 1).min(buf.len());
    }
}

/// Decode one record line (marker through end of line, terminator excluded).
pub fn parse_record(line: &str, offset: u64) -> TraceResult<Transition> {
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
    let layout = RecordLayout::select(&fields).ok_or_else(|| TraceError::UnsupportedVariant {
        offset,
        line: line.to_owned(),
        fields: fields.len(),
    })?;
    let bad = |reason: String| TraceError::malformed(offset, line, reason);

    let (kind, time, model_field, port, value, destination) = match layout {
        RecordLayout::Combined {
            kind,
            time,
            model,
            port,
            value_and_destination,
        } => {
            let text = value_and_destination.trim();
            let token = text.split_whitespace().next().unwrap_or("");
            (kind, time, model, port, parse_value(token).map_err(bad)?, text)
        }
        RecordLayout::Split {
            kind,
            time,
            model,
            port,
            value,
            destination,
        } => (
            kind,
            time,
            model,
            port,
            parse_value(value.trim()).map_err(bad)?,
            destination.trim(),
        ),
    };

    let kind = TransitionKind::from_tag(kind)
        .ok_or_else(|| bad(format!("unknown transition tag {:?}", kind.trim())))?;
    let time = time.trim();
    if time.is_empty() {
        return Err(bad("empty time field".into()));
    }
    let (model, coordinate) = split_model(model_field).map_err(bad)?;
    let destination = first_group(destination)
        .map_err(|r| bad(format!("destination: {r}")))?
        .to_owned();

    Ok(Transition {
        kind,
        time: SimTime::new(time),
        model: model.to_owned(),
        coordinate,
        port: port.trim().to_owned(),
        value,
        destination,
    })
}

fn parse_value(token: &str) -> Result<f64, String> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("value {token:?} is not a finite number"))
}

/// `life(0,0,0)(645)` → (`life`, 0-0-0).
fn split_model(field: &str) -> Result<(&str, Coordinate), String> {
    let field = field.trim();
    let name = field
        .split_once('(')
        .map(|(name, _)| name.trim())
        .ok_or_else(|| format!("model field {field:?} has no coordinate group"))?;
    let inner = first_group(field).map_err(|r| format!("model: {r}"))?;
    let coordinate = Coordinate::parse_list(inner, COORD_SEPARATOR)?;
    Ok((name, coordinate))
}

/// Content of the first `(...)` group: text after the first `(` up to the
/// next `(` (or end), which must close with `)`.
fn first_group(field: &str) -> Result<&str, String> {
    let (_, rest) = field
        .split_once('(')
        .ok_or_else(|| format!("{:?} has no '(' group", field.trim()))?;
    let group = rest.split('(').next().unwrap_or(rest).trim_end();
    group
        .strip_suffix(')')
        .ok_or_else(|| format!("{:?} is missing its closing ')'", field.trim()))
}

/* ------------------------------ Iterator adapter --------------------------- */

/// Owning record iterator over a [`ChunkSource`].
///
/// Records decoded before a failure are yielded first; the failure is the
/// last item.
pub struct Tokens<S> {
    source: S,
    tokenizer: RecordTokenizer,
    state: Option<ScanState>,
    ready: VecDeque<Transition>,
    scratch: Vec<Transition>,
    error: Option<TraceError>,
}

impl<S: ChunkSource> Iterator for Tokens<S> {
    type Item = TraceResult<Transition>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(t) = self.ready.pop_front() {
                return Some(Ok(t));
            }
            if let Some(e) = self.error.take() {
                self.state = None;
                return Some(Err(e));
            }
            let state = self.state.take()?;
            match self.source.next() {
                Some(Ok(chunk)) => {
                    match self.tokenizer.feed(state, &chunk, &mut self.scratch) {
                        Ok(next) => self.state = Some(next),
                        Err(e) => self.error = Some(e),
                    }
                }
                Some(Err(e)) => self.error = Some(e),
                None => {
                    if let Err(e) = self.tokenizer.finish(state, &mut self.scratch) {
                        self.error = Some(e);
                    }
                }
            }
            self.ready.extend(self.scratch.drain(..));
        }
    }
}
