//! Deterministic grouping of sized, keyed items.
//!
//! Partitions a collection of items into named groups that respect a
//! per-dimension minimum and maximum size budget, such that the partition
//! (including group names) is a function of the input set alone: not of
//! iteration order, hash-map order, or timing. The engine runs three phases
//! in sequence: preparation (key/size extraction, lexicographic sort,
//! oversized singletons), iterative splitting (a worklist of over-budget
//! groups cut where adjacent keys are least alike, with undersized remainders
//! repaired into compatible result groups), and finalization (ordering plus
//! collision-free naming from member keys).

mod splitter;
pub mod types;

use std::collections::HashSet;

use anyhow::Context;
use tracing::instrument;

use self::splitter::{Group, Node, Splitter};
pub use self::types::{
  Decision, DecisionKind, DecisionLog, GroupedItems, GroupingDebug, GroupingOptions,
  GroupingOptionsBuilder, GroupingOptionsError, GroupingOutcome, GroupingStats, SizeMap,
};

/// Partition `items` into named groups honoring the size budgets in
/// `options`.
///
/// `get_key` and `get_size` must be pure and stable across calls; the caller
/// guarantees a globally-unique suffix (typically a content hash) on every
/// key so naming never collides. After budget validation the computation is
/// total: every well-formed input produces a complete partition, with
/// documented degraded outcomes (a group above `max_size`, a fallback group
/// below `min_size`) surfaced as ordinary output and counted in the stats.
#[instrument(level = "debug", skip_all)]
pub fn group_items<T>(
  items: impl IntoIterator<Item = T>,
  options: &GroupingOptions,
  get_key: impl Fn(&T) -> String,
  get_size: impl Fn(&T) -> SizeMap,
) -> anyhow::Result<GroupingOutcome<T>> {
  options
    .validate()
    .context("grouping size budgets are invalid")?;

  let nodes: Vec<Node<T>> = items
    .into_iter()
    .map(|item| {
      let key = get_key(&item);
      let size = get_size(&item);
      Node { item, key, size }
    })
    .collect();

  let (groups, stats, decisions) = Splitter::new(options).run(nodes);
  let groups = finalize(groups);

  Ok(GroupingOutcome {
    groups,
    stats,
    debug: decisions.map(|decisions| GroupingDebug { decisions }),
  })
}

/// Sort result groups by their first member key, then assign each a
/// deterministic, collision-free name.
fn finalize<T>(mut groups: Vec<Group<T>>) -> Vec<GroupedItems<T>> {
  groups.sort_by(|a, b| a.nodes[0].key.cmp(&b.nodes[0].key));

  let mut used_names: HashSet<String> = HashSet::new();
  groups
    .into_iter()
    .map(|group| {
      let key = if group.nodes.len() == 1 {
        group.nodes[0].key.clone()
      } else {
        let first = &group.nodes[0];
        let last = &group.nodes[group.nodes.len() - 1];
        derive_group_name(&first.key, &last.key, &mut used_names)
      };
      GroupedItems {
        key,
        items: group.nodes.into_iter().map(|node| node.item).collect(),
        size: group.size,
      }
    })
    .collect()
}

/// Name a multi-node group from its first and last member keys: the common
/// leading character run plus one differing character, extended one character
/// at a time until the prefix is free in `used_names` (compared
/// case-insensitively). Falls back to the full first key without registering
/// it; keys carry a unique suffix, so the full key cannot collide.
fn derive_group_name(a: &str, b: &str, used_names: &mut HashSet<String>) -> String {
  let a_chars: Vec<char> = a.chars().collect();
  let b_chars: Vec<char> = b.chars().collect();
  let max_prefix = a_chars.len().min(b_chars.len());

  let mut end = 0;
  while end < max_prefix {
    if a_chars[end] != b_chars[end] {
      end += 1;
      break;
    }
    end += 1;
  }

  while end < max_prefix {
    let name: String = a_chars[..end].iter().collect();
    let lower_name = name.to_lowercase();
    if !used_names.contains(&lower_name) {
      used_names.insert(lower_name);
      return name;
    }
    end += 1;
  }

  a.to_string()
}
