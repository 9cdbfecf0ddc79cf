//! # Call Recording
//!
//! Turns a stream of span enter/exit notifications into a [`CallGraph`].
//!
//! ## Stack Model
//!
//! ```text
//! enter(1, "app", "outer")   stack: [root, outer]
//! enter(2, "app", "inner")   stack: [root, outer, inner]
//! exit(2)                    app::outer==>app::inner        ct += 1
//! exit(1)                    root::{closure}==>app::outer   ct += 1
//! finish()                   root::{closure}                ct = 1
//! ```
//!
//! - The root frame is the profiled closure; it is recorded under its own
//!   name, without a caller.
//! - Transparent frames (ignored functions, built-ins under `NO_BUILTINS`) sit
//!   on the stack so exits stay balanced, but their callees are attributed to
//!   the nearest recorded frame below them.
//! - A callsite already on the stack is recorded as `name@depth`. Depth is
//!   tracked per callsite (declaring file and line), so two functions sharing
//!   a span name never look recursive. When the profiled work is itself a
//!   function, the root counts as its outermost activation.
//!
//! Metrics are inclusive: a frame's time covers its callees.

use crate::domain::ProfileOptions;
use callscope_common::{edge_id, recursive_name, CallGraph, Flags, Metrics, PATH_SEPARATOR};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::{cpu_utils, memory};

/// Span targets that count as built-ins.
const STD_TARGETS: [&str; 3] = ["std", "core", "alloc"];

/// Counter readings at one instant; optional fields follow the flags.
#[derive(Debug, Clone, Copy)]
struct Sample {
    wall: Instant,
    cpu: Option<u64>,
    live: Option<i64>,
    peak: Option<i64>,
}

impl Sample {
    fn take(flags: Flags) -> Self {
        let track_memory = flags.contains(Flags::MEMORY);
        Self {
            wall: Instant::now(),
            cpu: flags
                .contains(Flags::CPU)
                .then(cpu_utils::thread_cpu_time_us),
            live: track_memory.then(memory::live_bytes),
            peak: track_memory.then(memory::peak_bytes),
        }
    }
}

/// Span metadata the recorder needs, borrowed from the callsite.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpanSite<'a> {
    pub(crate) target: &'a str,
    pub(crate) name: &'a str,
    pub(crate) file: Option<&'a str>,
    pub(crate) line: Option<u32>,
}

impl<'a> SpanSite<'a> {
    pub(crate) fn from_metadata(metadata: &tracing::Metadata<'a>) -> Self {
        Self {
            target: metadata.target(),
            name: metadata.name(),
            file: metadata.file(),
            line: metadata.line(),
        }
    }

    fn qualified_name(&self) -> String {
        if self.target.is_empty() {
            self.name.to_string()
        } else {
            format!("{}{PATH_SEPARATOR}{}", self.target, self.name)
        }
    }
}

/// Identity of a callsite for recursion bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SiteKey {
    qualified: String,
    file: Option<String>,
    line: Option<u32>,
}

#[derive(Debug)]
enum FrameKind {
    Recorded {
        /// Display name, including any `@depth` suffix
        name: String,
        site: SiteKey,
        edge: String,
        start: Sample,
    },
    Transparent,
}

#[derive(Debug)]
struct Frame {
    span: u64,
    kind: FrameKind,
}

/// Per-session recording state.
#[derive(Debug)]
pub(crate) struct Recorder {
    flags: Flags,
    ignored: HashSet<String>,
    builtin_targets: Vec<String>,
    root: String,
    root_start: Sample,
    stack: Vec<Frame>,
    depth: HashMap<SiteKey, u32>,
    graph: CallGraph,
}

impl Recorder {
    pub(crate) fn new(root: &str, flags: Flags, options: &ProfileOptions) -> Self {
        let mut builtin_targets: Vec<String> = STD_TARGETS.iter().map(ToString::to_string).collect();
        builtin_targets.extend(options.builtin_targets.iter().cloned());

        Self {
            flags,
            ignored: options.ignored_functions.iter().cloned().collect(),
            builtin_targets,
            root: root.to_string(),
            root_start: Sample::take(flags),
            stack: Vec::new(),
            depth: HashMap::new(),
            graph: CallGraph::new(),
        }
    }

    /// A span was entered on the session thread.
    pub(crate) fn enter(&mut self, span: u64, site: SpanSite<'_>) {
        let qualified = site.qualified_name();

        if self.is_transparent(site.target, site.name, &qualified) {
            self.stack.push(Frame {
                span,
                kind: FrameKind::Transparent,
            });
            return;
        }

        let outer = u32::from(qualified == self.root);
        let key = SiteKey {
            qualified,
            file: site.file.map(str::to_string),
            line: site.line,
        };
        let level = self.depth.entry(key.clone()).or_insert(0);
        let display = recursive_name(&key.qualified, *level + outer);
        *level += 1;

        let edge = edge_id(self.caller(), &display);
        self.stack.push(Frame {
            span,
            kind: FrameKind::Recorded {
                name: display,
                site: key,
                edge,
                start: Sample::take(self.flags),
            },
        });
    }

    /// A span was exited on the session thread.
    ///
    /// Frames entered after `span` that are still open are closed with it.
    pub(crate) fn exit(&mut self, span: u64) {
        let Some(pos) = self.stack.iter().rposition(|f| f.span == span) else {
            return;
        };
        let end = Sample::take(self.flags);
        while self.stack.len() > pos {
            if let Some(frame) = self.stack.pop() {
                self.close(frame, &end);
            }
        }
    }

    /// Close every open frame and add the root entry.
    pub(crate) fn finish(mut self) -> CallGraph {
        let end = Sample::take(self.flags);
        while let Some(frame) = self.stack.pop() {
            self.close(frame, &end);
        }
        let mut root = Metrics::default();
        accumulate(&mut root, self.flags, &self.root_start, &end);
        self.graph.insert(self.root, root);
        self.graph
    }

    /// Name of the nearest recorded frame, or the root.
    fn caller(&self) -> &str {
        self.stack
            .iter()
            .rev()
            .find_map(|f| match &f.kind {
                FrameKind::Recorded { name, .. } => Some(name.as_str()),
                FrameKind::Transparent => None,
            })
            .unwrap_or(self.root.as_str())
    }

    fn is_transparent(&self, target: &str, name: &str, qualified: &str) -> bool {
        if self.ignored.contains(qualified) || self.ignored.contains(name) {
            return true;
        }
        self.flags.contains(Flags::NO_BUILTINS)
            && self
                .builtin_targets
                .iter()
                .any(|prefix| is_within(target, prefix))
    }

    fn close(&mut self, frame: Frame, end: &Sample) {
        let FrameKind::Recorded {
            site, edge, start, ..
        } = frame.kind
        else {
            return;
        };
        if let Some(level) = self.depth.get_mut(&site) {
            *level = level.saturating_sub(1);
        }
        accumulate(self.graph.entry(edge), self.flags, &start, end);
    }
}

/// Add one call spanning `start..end` to `metrics`.
fn accumulate(metrics: &mut Metrics, flags: Flags, start: &Sample, end: &Sample) {
    let elapsed = end.wall.saturating_duration_since(start.wall);
    metrics.ct += 1;
    metrics.wt = metrics
        .wt
        .saturating_add(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));

    if flags.contains(Flags::CPU) {
        let spent = end.cpu.unwrap_or(0).saturating_sub(start.cpu.unwrap_or(0));
        *metrics.cpu.get_or_insert(0) += spent;
    }
    if flags.contains(Flags::MEMORY) {
        let live = end.live.unwrap_or(0) - start.live.unwrap_or(0);
        let peak = (end.peak.unwrap_or(0) - start.peak.unwrap_or(0)).max(0);
        *metrics.mu.get_or_insert(0) += live;
        *metrics.pmu.get_or_insert(0) += peak;
    }
}

/// `target` is `prefix` or a module below it.
fn is_within(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(PATH_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "app::tests::case::{closure}";

    fn recorder(flags: Flags) -> Recorder {
        Recorder::new(ROOT, flags, &ProfileOptions::default())
    }

    fn site<'a>(target: &'a str, name: &'a str) -> SpanSite<'a> {
        SpanSite {
            target,
            name,
            file: Some("src/app.rs"),
            line: Some(1),
        }
    }

    fn enter(r: &mut Recorder, span: u64, target: &str, name: &str) {
        r.enter(span, site(target, name));
    }

    fn call(r: &mut Recorder, span: u64, target: &str, name: &str) {
        enter(r, span, target, name);
        r.exit(span);
    }

    #[test]
    fn test_counts_calls_per_edge() {
        let mut r = recorder(Flags::default());
        call(&mut r, 1, "app", "sleepy_time");
        call(&mut r, 1, "app", "sleepy_time");
        call(&mut r, 2, "app", "wakey_time");
        let graph = r.finish();

        assert_eq!(graph.call_count(&format!("{ROOT}==>app::sleepy_time")), 2);
        assert_eq!(graph.call_count(&format!("{ROOT}==>app::wakey_time")), 1);
        assert_eq!(graph.call_count(ROOT), 1);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_nested_calls_use_callee_as_caller() {
        let mut r = recorder(Flags::default());
        enter(&mut r, 1, "app", "outer");
        call(&mut r, 2, "app", "inner");
        call(&mut r, 2, "app", "inner");
        r.exit(1);
        let graph = r.finish();

        assert_eq!(graph.call_count(&format!("{ROOT}==>app::outer")), 1);
        assert_eq!(graph.call_count("app::outer==>app::inner"), 2);
    }

    #[test]
    fn test_recursion_depth_suffix() {
        let mut r = recorder(Flags::default());
        enter(&mut r, 1, "app", "walk");
        enter(&mut r, 2, "app", "walk");
        enter(&mut r, 3, "app", "walk");
        r.exit(3);
        r.exit(2);
        r.exit(1);
        call(&mut r, 4, "app", "walk");
        let graph = r.finish();

        assert_eq!(graph.call_count(&format!("{ROOT}==>app::walk")), 2);
        assert_eq!(graph.call_count("app::walk==>app::walk@1"), 1);
        assert_eq!(graph.call_count("app::walk@1==>app::walk@2"), 1);
    }

    #[test]
    fn test_same_name_at_distinct_callsites_is_not_recursion() {
        let mut r = recorder(Flags::default());
        let square = SpanSite {
            line: Some(10),
            ..site("app::shapes", "area")
        };
        let circle = SpanSite {
            line: Some(20),
            ..site("app::shapes", "area")
        };
        r.enter(1, square);
        r.enter(2, circle);
        r.exit(2);
        r.exit(1);
        let graph = r.finish();

        assert_eq!(graph.call_count("app::shapes::area==>app::shapes::area"), 1);
        assert!(graph.keys().all(|k| !k.contains('@')), "{}", graph.to_json_pretty());
    }

    #[test]
    fn test_function_root_is_outermost_activation() {
        let mut r = Recorder::new("app::walk", Flags::default(), &ProfileOptions::default());
        enter(&mut r, 1, "app", "walk");
        call(&mut r, 2, "app", "walk");
        r.exit(1);
        let graph = r.finish();

        assert_eq!(graph.call_count("app::walk==>app::walk@1"), 1);
        assert_eq!(graph.call_count("app::walk@1==>app::walk@2"), 1);
        assert_eq!(graph.call_count("app::walk"), 1);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_ignored_function_is_transparent() {
        let options = ProfileOptions::default().ignoring(["wrapper"]);
        let mut r = Recorder::new(ROOT, Flags::default(), &options);
        enter(&mut r, 1, "app", "wrapper");
        call(&mut r, 2, "app", "inner");
        r.exit(1);
        let graph = r.finish();

        assert_eq!(graph.call_count(&format!("{ROOT}==>app::inner")), 1);
        assert!(graph.keys().all(|k| !k.contains("wrapper")));
    }

    #[test]
    fn test_builtins_excluded_only_with_flag() {
        let mut r = recorder(Flags::NO_BUILTINS);
        call(&mut r, 1, "std::io", "read");
        call(&mut r, 2, "stdx", "parse");
        let graph = r.finish();
        assert!(!graph.contains_key(&format!("{ROOT}==>std::io::read")));
        assert!(graph.contains_key(&format!("{ROOT}==>stdx::parse")));

        let mut r = recorder(Flags::empty());
        call(&mut r, 1, "std::io", "read");
        assert!(r.finish().contains_key(&format!("{ROOT}==>std::io::read")));
    }

    #[test]
    fn test_extra_builtin_targets() {
        let options = ProfileOptions::default().with_builtin_targets(["tokio"]);
        let mut r = Recorder::new(ROOT, Flags::NO_BUILTINS, &options);
        call(&mut r, 1, "tokio::runtime", "block_on");
        call(&mut r, 2, "app", "work");
        let graph = r.finish();
        assert_eq!(graph.len(), 2);
        assert!(graph.contains_key(&format!("{ROOT}==>app::work")));
    }

    #[test]
    fn test_unbalanced_frames_closed_on_finish() {
        let mut r = recorder(Flags::default());
        enter(&mut r, 1, "app", "outer");
        enter(&mut r, 2, "app", "inner");
        let graph = r.finish();
        assert_eq!(graph.call_count(&format!("{ROOT}==>app::outer")), 1);
        assert_eq!(graph.call_count("app::outer==>app::inner"), 1);
    }

    #[test]
    fn test_exit_of_unknown_span_is_ignored() {
        let mut r = recorder(Flags::default());
        r.exit(99);
        call(&mut r, 1, "app", "f");
        assert_eq!(r.finish().len(), 2);
    }

    #[test]
    fn test_optional_metrics_follow_flags() {
        let mut r = recorder(Flags::default());
        call(&mut r, 1, "app", "f");
        let graph = r.finish();
        let m = graph.get(&format!("{ROOT}==>app::f")).unwrap();
        assert_eq!(m.cpu, None);
        assert_eq!(m.mu, None);

        let mut r = recorder(Flags::CPU | Flags::MEMORY);
        call(&mut r, 1, "app", "f");
        let graph = r.finish();
        let m = graph.get(&format!("{ROOT}==>app::f")).unwrap();
        assert!(m.cpu.is_some());
        assert!(m.mu.is_some());
        assert!(m.pmu.is_some_and(|p| p >= 0));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("std", "std"));
        assert!(is_within("std::io", "std"));
        assert!(!is_within("stdx", "std"));
        assert!(!is_within("app", "std"));
    }
}
