//! Edge filtering by match expression.
//!
//! A [`MatchSet`] is an inclusion filter: an edge survives when at least one
//! expression matches its identifier. An empty set keeps every edge.
//!
//! ```text
//! expressions: [".+sleepy_time$"]
//!
//!   app::t::{closure}==>app::t::sleepy_time   ✓ kept
//!   app::t::{closure}==>app::t::wakey_time    ✗ dropped
//!   app::t::{closure}                         ✗ dropped
//! ```
//!
//! Filtering only removes whole entries; surviving metrics are never edited.

use crate::domain::ProfileError;
use callscope_common::CallGraph;
use regex::Regex;

/// Compiled, ordered set of match expressions.
#[derive(Debug, Clone, Default)]
pub struct MatchSet {
    expressions: Vec<Regex>,
}

impl MatchSet {
    /// Compile every expression, failing on the first invalid one.
    ///
    /// # Errors
    /// `InvalidMatchExpression` naming the offending expression.
    pub fn new<I, S>(expressions: I) -> Result<Self, ProfileError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let expressions = expressions
            .into_iter()
            .map(|expression| {
                let expression = expression.as_ref();
                Regex::new(expression).map_err(|source| ProfileError::InvalidMatchExpression {
                    expression: expression.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { expressions })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    /// True if any expression matches, tried in order.
    #[must_use]
    pub fn matches(&self, edge: &str) -> bool {
        self.expressions.iter().any(|re| re.is_match(edge))
    }

    /// Drop every edge no expression matches. An empty set is a no-op.
    #[must_use]
    pub fn filter(&self, mut graph: CallGraph) -> CallGraph {
        if self.is_empty() {
            return graph;
        }
        graph.retain(|edge, _| self.matches(edge));
        graph
    }
}

/// Compile `expressions` and filter `graph` with them in one step.
///
/// # Errors
/// See [`MatchSet::new`].
pub fn filter_call_graph<I, S>(graph: CallGraph, expressions: I) -> Result<CallGraph, ProfileError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Ok(MatchSet::new(expressions)?.filter(graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use callscope_common::Metrics;

    const SLEEPY: &str = "app::t::{closure}==>app::t::sleepy_time";
    const WAKEY: &str = "app::t::{closure}==>app::t::wakey_time";
    const ROOT: &str = "app::t::{closure}";

    fn sample_graph() -> CallGraph {
        let mut graph = CallGraph::new();
        graph.insert(ROOT, Metrics { ct: 1, wt: 30, ..Metrics::default() });
        graph.insert(
            SLEEPY,
            Metrics { ct: 2, wt: 20, cpu: Some(4), mu: Some(128), pmu: Some(0) },
        );
        graph.insert(WAKEY, Metrics { ct: 1, wt: 9, ..Metrics::default() });
        graph
    }

    #[test]
    fn test_empty_set_keeps_everything() {
        let graph = sample_graph();
        let filtered = filter_call_graph(graph.clone(), Vec::<String>::new()).unwrap();
        assert_eq!(filtered, graph);
    }

    #[test]
    fn test_keeps_only_matching_edges() {
        let filtered = filter_call_graph(sample_graph(), [".+sleepy_time$"]).unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key(SLEEPY));
        assert!(!filtered.contains_key(WAKEY));
    }

    #[test]
    fn test_expressions_are_ored() {
        let filtered =
            filter_call_graph(sample_graph(), ["wakey_time$", ".+sleepy_time$"]).unwrap();
        assert_eq!(filtered.len(), 2);
        assert!(!filtered.contains_key(ROOT));
    }

    #[test]
    fn test_surviving_metrics_untouched() {
        let original = sample_graph();
        let filtered = filter_call_graph(original.clone(), ["sleepy"]).unwrap();
        assert_eq!(filtered.get(SLEEPY), original.get(SLEEPY));
    }

    #[test]
    fn test_no_match_yields_empty_graph() {
        let filtered = filter_call_graph(sample_graph(), ["^nothing$"]).unwrap();
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_invalid_expression_fails_fast() {
        let err = MatchSet::new(["sleepy", "(unclosed", "[also bad"]).unwrap_err();
        match err {
            ProfileError::InvalidMatchExpression { expression, .. } => {
                assert_eq!(expression, "(unclosed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_closure_marker_matches_literally_when_escaped() {
        let set = MatchSet::new([r"\{closure\}==>"]).unwrap();
        assert!(set.matches(SLEEPY));
        assert!(!set.matches(ROOT));
    }
}
