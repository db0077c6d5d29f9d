//! Canonical data types shared across the celltrace workspace.
//!
//! These live in `celltrace-core` and are re-exported at the crate root so the
//! other crates can import via `celltrace_core::Transition`, `celltrace_core::Trace`, etc.
//!
//! Serialized forms stay conservative and portable (serde). Coordinates and
//! emitter ids serialize as their canonical display strings; internally they
//! are structured values.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Maximum number of spatial axes a cell coordinate may carry.
pub const MAX_AXES: usize = 3;

/// Per-axis cell-space bounds (`max observed component + 1`).
pub type Extents = [u32; MAX_AXES];

/* ------------------------------- Coordinate ------------------------------- */

/// Cell coordinate: fixed-arity integer tuple with 1..=3 significant axes.
///
/// Axes beyond `dims` read as `0`. The canonical id joins the significant
/// components with `-` (`1-0-0`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Coordinate {
    axes: [u32; MAX_AXES],
    dims: u8,
}

impl Coordinate {
    /// Build a 3-axis coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { axes: [x, y, z], dims: 3 }
    }

    /// Parse `sep`-separated non-negative integers (1..=3 components).
    ///
    /// Returns a short reason string on failure so callers can wrap it in
    /// their own error type.
    pub fn parse_list(text: &str, sep: char) -> Result<Self, String> {
        let mut axes = [0u32; MAX_AXES];
        let mut dims = 0usize;
        for part in text.split(sep) {
            if dims == MAX_AXES {
                return Err(format!("coordinate {text:?} has more than {MAX_AXES} components"));
            }
            let part = part.trim();
            axes[dims] = part
                .parse::<u32>()
                .map_err(|_| format!("coordinate component {part:?} is not a non-negative integer"))?;
            dims += 1;
        }
        // `split` always yields at least one item, so dims >= 1 here.
        Ok(Self { axes, dims: dims as u8 })
    }

    /// Component on `axis` (0 for axes beyond `dims`).
    #[inline]
    #[must_use]
    pub fn axis(&self, axis: usize) -> u32 {
        self.axes.get(axis).copied().unwrap_or(0)
    }

    /// All axes, padded with zeros.
    #[inline]
    #[must_use]
    pub const fn axes(&self) -> [u32; MAX_AXES] {
        self.axes
    }

    /// Number of significant axes.
    #[inline]
    #[must_use]
    pub const fn dims(&self) -> usize {
        self.dims as usize
    }

    /// Canonical dash-separated id (`1-0-0`).
    #[must_use]
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.axes[..self.dims()].iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for Coordinate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_list(s, '-')
    }
}

impl From<Coordinate> for String {
    fn from(c: Coordinate) -> Self {
        c.to_string()
    }
}

impl TryFrom<String> for Coordinate {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/* --------------------------------- Time ----------------------------------- */

/// Simulation timestamp, kept as its original text to preserve precision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(String);

/// Ordering key derived from a [`SimTime`].
#[derive(Clone, Debug, PartialEq)]
pub enum TimeKey {
    /// Colon-separated clock (`hh:mm:ss:ms[:n]`), compared lexicographically.
    Clock(Vec<u64>),
    /// Plain decimal.
    Scalar(f64),
}

impl SimTime {
    /// Wrap a timestamp string (already trimmed by the caller).
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Original text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ordering key, if the text is a clock or a decimal.
    #[must_use]
    pub fn key(&self) -> Option<TimeKey> {
        if self.0.contains(':') {
            self.0
                .split(':')
                .map(|p| p.trim().parse::<u64>().ok())
                .collect::<Option<Vec<_>>>()
                .map(TimeKey::Clock)
        } else {
            self.0.trim().parse::<f64>().ok().filter(|v| v.is_finite()).map(TimeKey::Scalar)
        }
    }

    /// Compare two timestamps when both keys exist and are of the same kind.
    #[must_use]
    pub fn partial_order(&self, other: &Self) -> Option<Ordering> {
        match (self.key()?, other.key()?) {
            (TimeKey::Clock(a), TimeKey::Clock(b)) => Some(a.cmp(&b)),
            (TimeKey::Scalar(a), TimeKey::Scalar(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/* ------------------------------ Transitions ------------------------------- */

/// Transition tag carried in the third marker field of a log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    /// `Y`: output message emitted by a model.
    Output,
    /// `X`: external input message.
    External,
    /// `*`: internal transition.
    Internal,
    /// `@`: collect message.
    Collect,
    /// `D`: done message.
    Done,
}

impl TransitionKind {
    /// Map a log tag to a kind.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "Y" => Some(Self::Output),
            "X" => Some(Self::External),
            "*" => Some(Self::Internal),
            "@" => Some(Self::Collect),
            "D" => Some(Self::Done),
            _ => None,
        }
    }
}

/// One immutable decoded state-change event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Message kind.
    pub kind: TransitionKind,
    /// Simulation timestamp.
    pub time: SimTime,
    /// Emitting model name (text before the coordinate group).
    pub model: String,
    /// Emitting cell.
    pub coordinate: Coordinate,
    /// Output port.
    pub port: String,
    /// Emitted value.
    pub value: f64,
    /// Receiving model/port identity (parenthesized content of the trailing field).
    pub destination: String,
}

impl Transition {
    /// Snapshot key for the emitting model.
    #[must_use]
    pub fn emitter(&self) -> EmitterId {
        EmitterId {
            model: self.model.clone(),
            coordinate: self.coordinate,
        }
    }
}

/// All transitions sharing one simulation timestamp, in log order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Shared timestamp.
    pub time: SimTime,
    /// Transitions in log order.
    pub transitions: Vec<Transition>,
}

impl Frame {
    /// Open an empty frame.
    #[must_use]
    pub const fn new(time: SimTime) -> Self {
        Self {
            time,
            transitions: Vec::new(),
        }
    }

    /// Number of transitions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Whether the frame holds no transitions.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/* --------------------------------- Trace ---------------------------------- */

/// Grammar that produced a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    /// CD++ log as produced by the Lopez simulator.
    Lopez,
}

/// Modelling paradigm of a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Paradigm {
    /// Cell-structured (spatial) trace.
    #[serde(rename = "Cell-DEVS")]
    CellDevs,
}

/// Value bucket assigned by a styling collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaletteBucket {
    /// Inclusive lower bound.
    pub start: f64,
    /// Exclusive upper bound.
    pub end: f64,
    /// RGB color.
    pub color: [u8; 3],
}

/// Optional color scale attached after construction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    /// Ordered buckets.
    pub buckets: Vec<PaletteBucket>,
}

impl Palette {
    /// Color for `value`, if any bucket contains it.
    #[must_use]
    pub fn color_for(&self, value: f64) -> Option<[u8; 3]> {
        self.buckets
            .iter()
            .find(|b| value >= b.start && value < b.end)
            .map(|b| b.color)
    }
}

/// Finished, immutable ingestion result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Derived from the log file's base name.
    pub name: String,
    /// Grammar that produced the trace.
    pub source_format: SourceFormat,
    /// Spatial vs non-spatial.
    pub paradigm: Paradigm,
    /// Frames, time non-decreasing.
    pub frames: Vec<Frame>,
    /// Per-axis `max + 1`, valid only once assembly completes.
    pub extents: Extents,
    /// Assigned later by a styling collaborator.
    pub palette: Option<Palette>,
}

/// Value range observed for one port (or the whole trace).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Smallest value seen.
    pub min: f64,
    /// Largest value seen.
    pub max: f64,
}

impl ValueRange {
    fn widen(range: &mut Option<Self>, v: f64) {
        match range {
            Some(r) => {
                r.min = r.min.min(v);
                r.max = r.max.max(v);
            }
            None => *range = Some(Self { min: v, max: v }),
        }
    }
}

/// Summary statistics over a resolved trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceStats {
    /// Number of frames.
    pub frames: usize,
    /// Number of transitions.
    pub transitions: usize,
    /// Overall value range (`None` for an empty trace).
    pub values: Option<ValueRange>,
    /// Value range per port.
    pub ports: BTreeMap<String, ValueRange>,
}

impl Trace {
    /// Number of frames.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total number of transitions across all frames.
    #[must_use]
    pub fn transition_count(&self) -> usize {
        self.frames.iter().map(Frame::len).sum()
    }

    /// Attach a palette. Consumes the trace so this happens before it is shared.
    #[must_use]
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = Some(palette);
        self
    }

    /// Sorted set of distinct output ports.
    #[must_use]
    pub fn ports(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .transitions()
            .map(|t| t.port.as_str())
            .collect();
        set.into_iter().map(str::to_owned).collect()
    }

    /// Value statistics (overall and per port).
    #[must_use]
    pub fn stats(&self) -> TraceStats {
        let mut values = None;
        let mut ports: BTreeMap<String, Option<ValueRange>> = BTreeMap::new();
        let mut transitions = 0usize;
        for t in self.transitions() {
            transitions += 1;
            if !t.value.is_finite() {
                continue;
            }
            ValueRange::widen(&mut values, t.value);
            ValueRange::widen(ports.entry(t.port.clone()).or_default(), t.value);
        }
        TraceStats {
            frames: self.frame_count(),
            transitions,
            values,
            ports: ports
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
        }
    }

    /// All transitions in log order.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> + '_ {
        self.frames.iter().flat_map(|f| f.transitions.iter())
    }
}

/* ------------------------------- Playback --------------------------------- */

/// Identity of an emitting model, used as the snapshot key.
///
/// Displays as `model(c0-c1-c2)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EmitterId {
    /// Model name.
    pub model: String,
    /// Cell coordinate.
    pub coordinate: Coordinate,
}

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.model, self.coordinate)
    }
}

impl From<EmitterId> for String {
    fn from(e: EmitterId) -> Self {
        e.to_string()
    }
}

impl TryFrom<String> for EmitterId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let open = s.rfind('(').ok_or_else(|| format!("emitter id {s:?} has no '('"))?;
        let inner = s[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| format!("emitter id {s:?} has no closing ')'"))?;
        Ok(Self {
            model: s[..open].to_owned(),
            coordinate: inner.parse()?,
        })
    }
}

/// Full per-emitter value state as of some frame (last write wins).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Latest value per emitter.
    pub values: BTreeMap<EmitterId, f64>,
}

impl Snapshot {
    /// Apply every transition of `frame` in log order.
    pub fn apply(&mut self, frame: &Frame) {
        for t in &frame.transitions {
            self.values.insert(t.emitter(), t.value);
        }
    }

    /// Apply an already-decoded frame update.
    pub fn apply_delta(&mut self, delta: &FrameDelta) {
        for c in &delta.changes {
            self.values.insert(c.emitter.clone(), c.value);
        }
    }

    /// Value for one emitter.
    #[must_use]
    pub fn get(&self, emitter: &EmitterId) -> Option<f64> {
        self.values.get(emitter).copied()
    }

    /// Number of emitters with a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no emitter has a value yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One `{ emitterId, value }` pair of an incremental update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmitterValue {
    /// Emitting model.
    pub emitter: EmitterId,
    /// Value it emitted.
    pub value: f64,
}

/// Incremental update for the frame just entered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameDelta {
    /// Frame index.
    pub index: usize,
    /// Frame timestamp.
    pub time: SimTime,
    /// Changes in log order.
    pub changes: Vec<EmitterValue>,
}

impl FrameDelta {
    /// Build the delta for `frame` at `index`.
    #[must_use]
    pub fn from_frame(index: usize, frame: &Frame) -> Self {
        Self {
            index,
            time: frame.time.clone(),
            changes: frame
                .transitions
                .iter()
                .map(|t| EmitterValue {
                    emitter: t.emitter(),
                    value: t.value,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tr(time: &str, model: &str, c: Coordinate, port: &str, value: f64) -> Transition {
        Transition {
            kind: TransitionKind::Output,
            time: SimTime::new(time),
            model: model.into(),
            coordinate: c,
            port: port.into(),
            value,
            destination: "top".into(),
        }
    }

    #[test]
    fn paradigm_tag_is_cell_devs() {
        assert_eq!(
            serde_json::to_string(&Paradigm::CellDevs).unwrap(),
            "\"Cell-DEVS\""
        );
        assert!(serde_json::from_str::<Paradigm>("\"DEVS\"").is_err());
    }

    #[test]
    fn coordinate_parses_and_displays() {
        let c = Coordinate::parse_list("1, 0,2", ',').unwrap();
        assert_eq!(c.axes(), [1, 0, 2]);
        assert_eq!(c.id(), "1-0-2");

        let planar = Coordinate::parse_list("4,5", ',').unwrap();
        assert_eq!(planar.dims(), 2);
        assert_eq!(planar.axis(2), 0);
        assert_eq!(planar.id(), "4-5");
        assert_eq!("4-5".parse::<Coordinate>().unwrap(), planar);
    }

    #[test]
    fn coordinate_rejects_bad_components() {
        assert!(Coordinate::parse_list("1,x,0", ',').is_err());
        assert!(Coordinate::parse_list("-1,0", ',').is_err());
        assert!(Coordinate::parse_list("1,2,3,4", ',').is_err());
        assert!(Coordinate::parse_list("", ',').is_err());
    }

    #[test]
    fn time_keys_order_within_kind() {
        let a = SimTime::new("00:00:01:000");
        let b = SimTime::new("00:00:00:500");
        assert_eq!(a.partial_order(&b), Some(Ordering::Greater));

        let x = SimTime::new("0.5");
        let y = SimTime::new("1.0");
        assert_eq!(x.partial_order(&y), Some(Ordering::Less));

        // Mixed kinds and unparseable text are not comparable.
        assert_eq!(a.partial_order(&x), None);
        assert_eq!(SimTime::new("t0").key(), None);
    }

    #[test]
    fn emitter_id_string_roundtrip() {
        let e = EmitterId {
            model: "life".into(),
            coordinate: Coordinate::new(1, 2, 0),
        };
        let s: String = e.clone().into();
        assert_eq!(s, "life(1-2-0)");
        assert_eq!(EmitterId::try_from(s).unwrap(), e);
    }

    #[test]
    fn stats_and_ports() {
        let c = Coordinate::new(0, 0, 0);
        let trace = Trace {
            name: "t".into(),
            source_format: SourceFormat::Lopez,
            paradigm: Paradigm::CellDevs,
            frames: vec![
                Frame {
                    time: SimTime::new("0"),
                    transitions: vec![tr("0", "a", c, "out", 2.0), tr("0", "a", c, "aux", -1.0)],
                },
                Frame {
                    time: SimTime::new("1"),
                    transitions: vec![tr("1", "a", c, "out", 5.0)],
                },
            ],
            extents: [1, 1, 1],
            palette: None,
        };
        assert_eq!(trace.ports(), vec!["aux".to_owned(), "out".to_owned()]);
        let s = trace.stats();
        assert_eq!(s.transitions, 3);
        assert_eq!(s.values, Some(ValueRange { min: -1.0, max: 5.0 }));
        assert_eq!(s.ports["out"], ValueRange { min: 2.0, max: 5.0 });
    }

    #[test]
    fn snapshot_last_write_wins() {
        let c = Coordinate::new(1, 0, 0);
        let frame = Frame {
            time: SimTime::new("0"),
            transitions: vec![tr("0", "a", c, "out", 1.0), tr("0", "a", c, "out", 3.0)],
        };
        let mut s = Snapshot::default();
        s.apply(&frame);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(&frame.transitions[0].emitter()), Some(3.0));

        let d = FrameDelta::from_frame(0, &frame);
        assert_eq!(d.changes.len(), 2);
    }

    #[test]
    fn palette_lookup() {
        let p = Palette {
            buckets: vec![
                PaletteBucket { start: 0.0, end: 1.0, color: [255, 255, 255] },
                PaletteBucket { start: 1.0, end: 2.0, color: [255, 0, 0] },
            ],
        };
        assert_eq!(p.color_for(1.5), Some([255, 0, 0]));
        assert_eq!(p.color_for(2.0), None);

        let trace = Trace {
            name: "t".into(),
            source_format: SourceFormat::Lopez,
            paradigm: Paradigm::CellDevs,
            frames: Vec::new(),
            extents: [0; 3],
            palette: None,
        }
        .with_palette(p.clone());
        assert_eq!(trace.palette, Some(p));
    }
}
