//! Deterministic size-constrained grouping for bundler output.
//!
//! Given a keyed, multi-dimensionally-sized collection of items and
//! per-dimension minimum/maximum budgets, [`group_items`] produces an ordered
//! partition into named groups that depends only on the `(key, size)` pairs
//! of the input set, never on iteration order, hash-map order, or timing.
//! Stable group boundaries and names are what keep long-term caches and
//! output filenames intact when unrelated parts of a large project change.
//!
//! The engine is a pure in-memory computation: no I/O, no shared state, no
//! suspension points. Independent calls may run concurrently as long as the
//! caller-supplied key/size extractors are thread-safe and side-effect-free.

pub mod grouping;

pub use grouping::{
  group_items, Decision, DecisionKind, DecisionLog, GroupedItems, GroupingDebug, GroupingOptions,
  GroupingOptionsBuilder, GroupingOptionsError, GroupingOutcome, GroupingStats, SizeMap,
};
