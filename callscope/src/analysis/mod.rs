//! Analysis logic for recorded call graphs
//!
//! This module contains the pure filtering logic applied to a session's raw
//! graph, separated from the instrumentation that produced it.

pub mod filter;

pub use filter::{filter_call_graph, MatchSet};
