//! # Shared Call-Graph Data Model
//!
//! Defines the data structures shared between the profiling session and the
//! instrumentation backends that feed it. Test assertions are written directly
//! against these types, so the edge identifier format below is a stable
//! contract.
//!
//! ## Edge Identifiers
//!
//! ```text
//! my_crate::tests::scenario::{closure}==>my_crate::tests::sleepy_time
//! └──────────── caller ─────────────┘   └──────────── callee ───────┘
//! ```
//!
//! - Names are qualified with the Rust path separator `::`
//! - A closure caller is its enclosing path plus `::{closure}`
//! - A recursive call carries its depth: `my_crate::walk==>my_crate::walk@1`
//! - The root of a session (the profiled closure itself) has no `==>`
//!
//! ## Key Types
//!
//! - [`CallGraph`] - Edge identifier → [`Metrics`] mapping produced per session
//! - [`Metrics`] - Per-edge call count plus optional timing/memory figures
//! - [`Flags`] - Which metric categories the instrumentation collects

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Edge Identifier Format
// ============================================================================

/// Separator between caller and callee in an edge identifier
pub const EDGE_SEPARATOR: &str = "==>";

/// Namespace separator used in qualified function names
pub const PATH_SEPARATOR: &str = "::";

/// Synthetic name segment for anonymous callers
pub const CLOSURE_MARKER: &str = "{closure}";

/// Separates a function name from its recursion depth (`walk@2`)
pub const RECURSION_MARKER: char = '@';

/// Marker `std::any::type_name` emits for closures
const TYPE_NAME_CLOSURE: &str = "{{closure}}";

/// Build the identifier of the `caller ==> callee` edge.
#[must_use]
pub fn edge_id(caller: &str, callee: &str) -> String {
    format!("{caller}{EDGE_SEPARATOR}{callee}")
}

/// Split an edge identifier into `(caller, callee)`.
///
/// Root entries have no caller and return `(None, name)`.
#[must_use]
pub fn split_edge_id(id: &str) -> (Option<&str>, &str) {
    match id.split_once(EDGE_SEPARATOR) {
        Some((caller, callee)) => (Some(caller), callee),
        None => (None, id),
    }
}

/// Qualified name of a closure defined inside `enclosing`.
#[must_use]
pub fn closure_name(enclosing: &str) -> String {
    format!("{enclosing}{PATH_SEPARATOR}{CLOSURE_MARKER}")
}

/// Name a callable type the way edge identifiers render it.
///
/// A closure written inside `my_crate::tests::scenario` becomes
/// `my_crate::tests::scenario::{closure}`.
#[must_use]
pub fn qualified_name_of<F: ?Sized>() -> String {
    std::any::type_name::<F>().replace(TYPE_NAME_CLOSURE, CLOSURE_MARKER)
}

/// [`qualified_name_of`] for the type of `value`, for closures that cannot
/// be named.
#[must_use]
pub fn qualified_name_of_val<F: ?Sized>(_value: &F) -> String {
    qualified_name_of::<F>()
}

/// Name of the `depth`-th recursive activation of `name`.
#[must_use]
pub fn recursive_name(name: &str, depth: u32) -> String {
    if depth == 0 {
        name.to_string()
    } else {
        format!("{name}{RECURSION_MARKER}{depth}")
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Metric names, in the order [`Metrics::iter`] yields them.
pub const METRIC_NAMES: [&str; 5] = ["ct", "wt", "cpu", "mu", "pmu"];

/// Figures collected for one edge.
///
/// `ct` and `wt` are always collected; the rest depend on [`Flags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Number of calls along this edge
    pub ct: u64,

    /// Inclusive wall-clock time in microseconds
    pub wt: u64,

    /// Inclusive thread CPU time in microseconds ([`Flags::CPU`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u64>,

    /// Change in live heap bytes across the calls ([`Flags::MEMORY`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mu: Option<i64>,

    /// Growth of the peak heap size across the calls ([`Flags::MEMORY`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmu: Option<i64>,
}

impl Metrics {
    /// Look a metric up by name; `None` when the metric was not collected.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        match name {
            "ct" => i64::try_from(self.ct).ok(),
            "wt" => i64::try_from(self.wt).ok(),
            "cpu" => self.cpu.and_then(|v| i64::try_from(v).ok()),
            "mu" => self.mu,
            "pmu" => self.pmu,
            _ => None,
        }
    }

    /// Collected metrics as `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        METRIC_NAMES
            .into_iter()
            .filter_map(move |name| self.get(name).map(|value| (name, value)))
    }
}

// ============================================================================
// Flags
// ============================================================================

/// Categories of data the instrumentation collects.
///
/// Bit values are stable, so flags can travel as a plain integer
/// (`CALLSCOPE_FLAGS=3`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u32);

impl Flags {
    /// Leave standard-library spans out of the graph
    pub const NO_BUILTINS: Flags = Flags(1);
    /// Collect thread CPU time (`cpu`)
    pub const CPU: Flags = Flags(2);
    /// Collect heap usage (`mu`, `pmu`)
    pub const MEMORY: Flags = Flags(4);

    const ALL: [(Flags, &'static str); 3] = [
        (Flags::NO_BUILTINS, "no_builtins"),
        (Flags::CPU, "cpu"),
        (Flags::MEMORY, "memory"),
    ];

    #[must_use]
    pub const fn empty() -> Self {
        Flags(0)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Keep only the bits that name a known flag.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Flags(bits & 0b111)
    }

    #[must_use]
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Built-ins are excluded unless asked for.
impl Default for Flags {
    fn default() -> Self {
        Flags::NO_BUILTINS
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = Self::ALL
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join("|"))
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({self})")
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseFlagsError {
    #[error("Unknown instrumentation flag {0:?} (expected no_builtins, cpu, memory or none)")]
    UnknownFlag(String),
}

/// Parses `no_builtins|cpu`, `cpu,memory`, `none` or a raw bit value.
impl FromStr for Flags {
    type Err = ParseFlagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(bits) = s.trim().parse::<u32>() {
            let flags = Flags::from_bits_truncate(bits);
            if flags.bits() != bits {
                return Err(ParseFlagsError::UnknownFlag(s.trim().to_string()));
            }
            return Ok(flags);
        }

        let mut flags = Flags::empty();
        for part in s.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            let part = part.to_ascii_lowercase();
            if part == "none" {
                continue;
            }
            let flag = Self::ALL
                .iter()
                .find(|(_, name)| *name == part)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| ParseFlagsError::UnknownFlag(part.clone()))?;
            flags |= flag;
        }
        Ok(flags)
    }
}

// ============================================================================
// Call Graph
// ============================================================================

/// Edge identifier → metrics for one profiling session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallGraph {
    edges: HashMap<String, Metrics>,
}

impl CallGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `id`.
    pub fn insert(&mut self, id: impl Into<String>, metrics: Metrics) -> Option<Metrics> {
        self.edges.insert(id.into(), metrics)
    }

    /// Mutable record for `id`, created empty if missing.
    pub fn entry(&mut self, id: impl Into<String>) -> &mut Metrics {
        self.edges.entry(id.into()).or_default()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Metrics> {
        self.edges.get(id)
    }

    #[must_use]
    pub fn contains_key(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// Number of calls along `id`, 0 when the edge was never observed.
    #[must_use]
    pub fn call_count(&self, id: &str) -> u64 {
        self.edges.get(id).map_or(0, |m| m.ct)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Metrics)> {
        self.edges.iter().map(|(id, m)| (id.as_str(), m))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Edges whose caller is exactly `caller`.
    pub fn edges_from<'a>(&'a self, caller: &'a str) -> impl Iterator<Item = (&'a str, &'a Metrics)> {
        self.iter()
            .filter(move |(id, _)| split_edge_id(id).0 == Some(caller))
    }

    /// Edges whose callee is exactly `callee`.
    pub fn edges_to<'a>(&'a self, callee: &'a str) -> impl Iterator<Item = (&'a str, &'a Metrics)> {
        self.iter().filter(move |(id, _)| {
            let (caller, name) = split_edge_id(id);
            caller.is_some() && name == callee
        })
    }

    /// Keep only the edges for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Metrics) -> bool) {
        self.edges.retain(|id, m| keep(id, m));
    }

    /// Pretty JSON rendering, sorted by edge, for assertion messages.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        let sorted: std::collections::BTreeMap<&str, &Metrics> = self.iter().collect();
        serde_json::to_string_pretty(&sorted).unwrap_or_else(|e| format!("<unprintable: {e}>"))
    }

    #[must_use]
    pub fn into_inner(self) -> HashMap<String, Metrics> {
        self.edges
    }
}

impl FromIterator<(String, Metrics)> for CallGraph {
    fn from_iter<I: IntoIterator<Item = (String, Metrics)>>(iter: I) -> Self {
        Self {
            edges: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CallGraph {
    type Item = (String, Metrics);
    type IntoIter = std::collections::hash_map::IntoIter<String, Metrics>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.into_iter()
    }
}
