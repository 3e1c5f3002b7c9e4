use itertools::Itertools;
use tracing::{debug, instrument};

use super::types::{DecisionKind, DecisionLog, GroupingOptions, GroupingStats, SizeMap};

/// Character-position-wise closeness of two keys.
///
/// Characters at the same position that are numerically close contribute
/// more; there is no credit beyond the shorter key. Used only to pick a cut
/// boundary, but the exact scoring is load-bearing: split points, and
/// therefore the final partition, depend on it.
pub(super) fn similarity(a: &str, b: &str) -> u32 {
  a.chars()
    .zip(b.chars())
    .map(|(ca, cb)| {
      let distance = (ca as i64 - cb as i64).abs();
      (10 - distance).max(0) as u32
    })
    .sum()
}

/// Similarity between each pair of lexically adjacent nodes
/// (`len = nodes.len() - 1`).
pub(super) fn adjacent_similarities<T>(nodes: &[Node<T>]) -> Vec<u32> {
  nodes
    .iter()
    .tuple_windows()
    .map(|(a, b)| similarity(&a.key, &b.key))
    .collect()
}

fn sum_size<T>(nodes: &[Node<T>]) -> SizeMap {
  let mut total = SizeMap::new();
  for node in nodes {
    total += &node.size;
  }
  total
}

/// `(item, key, size)` triple; immutable once built.
#[derive(Debug)]
pub(super) struct Node<T> {
  pub item: T,
  pub key: String,
  pub size: SizeMap,
}

/// A working or finished group of nodes in lexicographic key order.
#[derive(Debug)]
pub(super) struct Group<T> {
  pub nodes: Vec<Node<T>>,

  /// Similarity between lexically adjacent nodes (`len = nodes.len() - 1`).
  /// `None` when not computed: forced singletons, repair fallback groups, and
  /// result groups a repair merged into.
  pub similarities: Option<Vec<u32>>,

  /// Component-wise sum over all member nodes.
  pub size: SizeMap,
}

impl<T> Group<T> {
  fn new(nodes: Vec<Node<T>>, similarities: Option<Vec<u32>>) -> Self {
    let size = sum_size(&nodes);
    Self {
      nodes,
      similarities,
      size,
    }
  }

  /// Similarity between `nodes[position - 1]` and `nodes[position]`.
  fn similarity_before(&self, position: usize) -> u32 {
    match &self.similarities {
      Some(similarities) => similarities[position - 1],
      None => similarity(&self.nodes[position - 1].key, &self.nodes[position].key),
    }
  }

  /// Remove all nodes matching `filter`, preserving order and patching the
  /// similarity array for the survivors. Refuses (`None`) when nothing or
  /// everything would be removed; a working group is never emptied.
  fn pop_nodes(&mut self, filter: impl Fn(&Node<T>) -> bool) -> Option<Vec<Node<T>>> {
    let matched: Vec<bool> = self.nodes.iter().map(|node| filter(node)).collect();
    let removed = matched.iter().filter(|matched| **matched).count();
    if removed == 0 || removed == self.nodes.len() {
      return None;
    }

    let old_similarities = self.similarities.take();
    let mut kept: Vec<Node<T>> = Vec::with_capacity(self.nodes.len() - removed);
    let mut kept_similarities: Vec<u32> = Vec::new();
    let mut popped: Vec<Node<T>> = Vec::with_capacity(removed);
    let mut last_kept_index: Option<usize> = None;

    for (index, node) in self.nodes.drain(..).enumerate() {
      if matched[index] {
        popped.push(node);
        continue;
      }
      if let Some(previous) = kept.last() {
        let score = match (&old_similarities, last_kept_index) {
          // Survivors that were adjacent before keep their score.
          (Some(similarities), Some(last)) if last + 1 == index => similarities[index - 1],
          _ => similarity(&previous.key, &node.key),
        };
        kept_similarities.push(score);
      }
      last_kept_index = Some(index);
      kept.push(node);
    }

    self.size = sum_size(&kept);
    self.nodes = kept;
    self.similarities = Some(kept_similarities);
    Some(popped)
  }
}

/// Iterative splitting engine: a LIFO worklist of over-budget groups, each
/// either moved to the results, repaired, split in two, or accepted oversized.
pub(super) struct Splitter<'a, T> {
  options: &'a GroupingOptions,
  result: Vec<Group<T>>,
  queue: Vec<Group<T>>,
  stats: GroupingStats,
  decisions: Option<DecisionLog>,
}

impl<'a, T> Splitter<'a, T> {
  pub fn new(options: &'a GroupingOptions) -> Self {
    Self {
      options,
      result: Vec::new(),
      queue: Vec::new(),
      stats: GroupingStats::default(),
      decisions: options.collect_debug.then(DecisionLog::default),
    }
  }

  fn decision(&mut self, kind: impl FnOnce() -> DecisionKind) {
    if let Some(log) = self.decisions.as_mut() {
      log.push(kind());
    }
  }

  /// Full pipeline: sort nodes, pull out oversized singletons, split the
  /// rest. Returns unsorted, unnamed groups.
  #[instrument(level = "debug", skip_all)]
  pub fn run(
    mut self,
    mut nodes: Vec<Node<T>>,
  ) -> (Vec<Group<T>>, GroupingStats, Option<DecisionLog>) {
    self.stats.items = nodes.len();

    // Lexicographic ordering of keys.
    nodes.sort_by(|a, b| a.key.cmp(&b.key));

    // Nodes bigger than max_size on their own become result groups directly,
    // but only while min_size is not violated by pulling them out.
    let mut initial_nodes: Vec<Node<T>> = Vec::new();
    for node in nodes {
      if node.size.exceeds(&self.options.max_size) && !node.size.below_min(&self.options.min_size)
      {
        self.stats.forced_singletons += 1;
        self.decision(|| DecisionKind::ForcedSingleton {
          key: node.key.clone(),
        });
        self.result.push(Group::new(vec![node], None));
      } else {
        initial_nodes.push(node);
      }
    }

    debug!(
      nodes = self.stats.items,
      forced_singletons = self.stats.forced_singletons,
      "grouping: prepared nodes"
    );

    if !initial_nodes.is_empty() {
      let similarities = adjacent_similarities(&initial_nodes);
      self.queue.push(Group::new(initial_nodes, Some(similarities)));
      self.drain_queue();
    }

    debug!(
      groups = self.result.len(),
      splits = self.stats.splits,
      repairs = self.stats.repairs,
      oversized = self.stats.oversized_accepted,
      "grouping: queue drained"
    );

    (self.result, self.stats, self.decisions)
  }

  #[instrument(level = "debug", skip_all)]
  fn drain_queue(&mut self) {
    while let Some(mut group) = self.queue.pop() {
      // Only groups above max_size need to be split.
      if !group.size.exceeds(&self.options.max_size) {
        self.result.push(group);
        continue;
      }

      // The group may already be under min_size somewhere; try to go on with
      // only the unproblematic nodes.
      let full_size = group.size.clone();
      if self.remove_problematic_nodes(&mut group, &full_size) {
        self.queue.push(group);
        continue;
      }

      // Walk the unsplittable margins: a cut inside them would leave an
      // undersized part. At least one node per edge so a cut can never
      // produce an empty group.
      let mut left = 1;
      let mut left_size = group.nodes[0].size.clone();
      while left < group.nodes.len() && left_size.below_min(&self.options.min_size) {
        left_size += &group.nodes[left].size;
        left += 1;
      }
      let mut right = group.nodes.len() as isize - 2;
      let mut right_size = group.nodes[group.nodes.len() - 1].size.clone();
      while right >= 0 && right_size.below_min(&self.options.min_size) {
        right_size += &group.nodes[right as usize].size;
        right -= 1;
      }

      if left as isize - 1 > right {
        // The margins overlap; no cut keeps min_size on both sides. Retry
        // the repair against the smaller margin without its outermost node.
        let considered_size = if right < (group.nodes.len() - left) as isize {
          right_size -= &group.nodes[(right + 1) as usize].size;
          right_size
        } else {
          left_size -= &group.nodes[left - 1].size;
          left_size
        };
        if self.remove_problematic_nodes(&mut group, &considered_size) {
          self.queue.push(group);
          continue;
        }
        // min_size takes priority over max_size. Rare as long as budgets
        // keep max >= 3 * min per dimension.
        self.accept_oversized(group);
        continue;
      }

      // Scan the cut candidates [left, right + 1]: cut where adjacent keys
      // are least alike, and only where both parts hold min_size (a part
      // can pick up a new below-minimum dimension while growing).
      let mut best: Option<(usize, u32)> = None;
      let mut pos = left;
      let mut right_part_size = sum_size(&group.nodes[pos..]);
      while pos as isize <= right + 1 {
        let score = group.similarity_before(pos);
        let qualifies = !left_size.below_min(&self.options.min_size)
          && !right_part_size.below_min(&self.options.min_size);
        if qualifies && best.map_or(true, |(_, best_score)| score < best_score) {
          best = Some((pos, score));
        }
        left_size += &group.nodes[pos].size;
        right_part_size -= &group.nodes[pos].size;
        pos += 1;
      }

      let Some((position, score)) = best else {
        // No candidate held min_size on both sides; keep the oversized group.
        self.accept_oversized(group);
        continue;
      };

      self.stats.splits += 1;
      self.decision(|| DecisionKind::Split {
        position,
        similarity: score,
      });

      let right_nodes = group.nodes.split_off(position);
      let left_nodes = group.nodes;
      let (left_similarities, right_similarities) = match group.similarities {
        Some(mut similarities) => {
          let right = similarities.split_off(position);
          similarities.truncate(position - 1);
          (Some(similarities), Some(right))
        }
        None => (None, None),
      };

      // Queue the right part first so the left part is processed next.
      self.queue.push(Group::new(right_nodes, right_similarities));
      self.queue.push(Group::new(left_nodes, left_similarities));
    }
  }

  /// Pop the nodes keeping `considered_size` under `min_size` out of the
  /// group, then merge them into the result group sharing the most problem
  /// dimensions (ties broken by the smallest selective size, earlier group on
  /// exact ties), or emit them as a new result group, possibly below
  /// min_size, when no result group participates in a problem dimension.
  /// Reports whether the group was modified.
  fn remove_problematic_nodes(&mut self, group: &mut Group<T>, considered_size: &SizeMap) -> bool {
    let problem_types = considered_size.types_below_min(&self.options.min_size);
    if problem_types.is_empty() {
      return false;
    }

    let Some(problem_nodes) =
      group.pop_nodes(|node| node.size.matching_type_count(&problem_types) > 0)
    else {
      return false;
    };

    let mut best: Option<usize> = None;
    for index in 0..self.result.len() {
      let matches = self.result[index].size.matching_type_count(&problem_types);
      if matches == 0 {
        continue;
      }
      best = Some(match best {
        None => index,
        Some(current) => {
          let current_matches = self.result[current].size.matching_type_count(&problem_types);
          if current_matches != matches {
            if current_matches < matches {
              index
            } else {
              current
            }
          } else if self.result[current].size.selective_sum(&problem_types)
            > self.result[index].size.selective_sum(&problem_types)
          {
            index
          } else {
            current
          }
        }
      });
    }

    let node_count = problem_nodes.len();
    match best {
      Some(index) => {
        let target = &mut self.result[index];
        for node in problem_nodes {
          target.size += &node.size;
          target.nodes.push(node);
        }
        target.nodes.sort_by(|a, b| a.key.cmp(&b.key));
        // The merged group's similarities are stale; finalization never
        // reads them.
        target.similarities = None;
        self.decision(|| DecisionKind::Repaired {
          node_count,
          merged_into_existing: true,
        });
      }
      None => {
        self.result.push(Group::new(problem_nodes, None));
        self.decision(|| DecisionKind::Repaired {
          node_count,
          merged_into_existing: false,
        });
      }
    }

    self.stats.repairs += 1;
    true
  }

  fn accept_oversized(&mut self, group: Group<T>) {
    self.stats.oversized_accepted += 1;
    self.decision(|| DecisionKind::OversizedAccepted {
      node_count: group.nodes.len(),
    });
    self.result.push(group);
  }
}
