use std::collections::{BTreeMap, BTreeSet};
use std::ops::{AddAssign, SubAssign};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-dimension measurement of an item or a group.
///
/// Dimensions are independent named measurements (e.g. bytes of one output
/// content category). Items may contribute to any subset of dimensions, so
/// sizes of different items are "entangled" through the dimensions they share.
///
/// A stored value of exactly `0` means "does not participate in this
/// dimension" and is skipped by every budget check. A dimension missing from a
/// *budget* map is unconstrained in that dimension.
///
/// Backed by an ordered map so that iteration is deterministic, although no
/// grouping result may depend on dimension order: all checks are
/// per-dimension and independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SizeMap(BTreeMap<String, f64>);

impl SizeMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, dimension: impl Into<String>, value: f64) {
    self.0.insert(dimension.into(), value);
  }

  pub fn get(&self, dimension: &str) -> Option<f64> {
    self.0.get(dimension).copied()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self.0.iter().map(|(dimension, value)| (dimension.as_str(), *value))
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// True when some participating dimension is strictly above the budget
  /// value present for it.
  pub fn exceeds(&self, max_size: &SizeMap) -> bool {
    self.iter().any(|(dimension, value)| {
      value != 0.0 && max_size.get(dimension).is_some_and(|max| value > max)
    })
  }

  /// True when some participating dimension is strictly below the budget
  /// value present for it.
  pub fn below_min(&self, min_size: &SizeMap) -> bool {
    self.iter().any(|(dimension, value)| {
      value != 0.0 && min_size.get(dimension).is_some_and(|min| value < min)
    })
  }

  /// The set of participating dimensions strictly below their budget value.
  pub fn types_below_min(&self, min_size: &SizeMap) -> BTreeSet<String> {
    self
      .iter()
      .filter(|(dimension, value)| {
        *value != 0.0 && min_size.get(dimension).is_some_and(|min| *value < min)
      })
      .map(|(dimension, _)| dimension.to_string())
      .collect()
  }

  /// How many of the given dimensions this size participates in.
  pub fn matching_type_count(&self, types: &BTreeSet<String>) -> usize {
    self
      .iter()
      .filter(|(dimension, value)| *value != 0.0 && types.contains(*dimension))
      .count()
  }

  /// Sum over the participating dimensions contained in the given set.
  pub fn selective_sum(&self, types: &BTreeSet<String>) -> f64 {
    self
      .iter()
      .filter(|(dimension, value)| *value != 0.0 && types.contains(*dimension))
      .map(|(_, value)| value)
      .sum()
  }
}

impl AddAssign<&SizeMap> for SizeMap {
  fn add_assign(&mut self, other: &SizeMap) {
    for (dimension, value) in other.iter() {
      *self.0.entry(dimension.to_string()).or_insert(0.0) += value;
    }
  }
}

impl SubAssign<&SizeMap> for SizeMap {
  fn sub_assign(&mut self, other: &SizeMap) {
    for (dimension, value) in other.iter() {
      *self.0.entry(dimension.to_string()).or_insert(0.0) -= value;
    }
  }
}

impl<K: Into<String>> FromIterator<(K, f64)> for SizeMap {
  fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
    Self(
      iter
        .into_iter()
        .map(|(dimension, value)| (dimension.into(), value))
        .collect(),
    )
  }
}

/// Size budgets and switches for one grouping run.
///
/// `min_size` takes priority over `max_size`: a group is only split when both
/// halves hold the minimum everywhere. Budgets where `max < 3 * min` make the
/// unsplittable-oversized fallback likely and are reported at `warn` level.
#[derive(Debug, Clone, Default, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned", default)]
pub struct GroupingOptions {
  /// Per-dimension lower bound every group should reach.
  pub min_size: SizeMap,

  /// Per-dimension upper bound groups are split towards. Advisory: violated
  /// when honoring it would break `min_size`, or when a single item alone
  /// exceeds it.
  pub max_size: SizeMap,

  /// When true, the run also returns a decision log for debugging and
  /// visualization. Never used for correctness.
  pub collect_debug: bool,
}

impl GroupingOptions {
  /// Fail fast on budgets the algorithm has no defined behavior for.
  pub fn validate(&self) -> Result<(), GroupingOptionsError> {
    for (budget, size) in [("minimum", &self.min_size), ("maximum", &self.max_size)] {
      for (dimension, value) in size.iter() {
        if !value.is_finite() {
          return Err(GroupingOptionsError::NonFiniteBudget {
            budget,
            dimension: dimension.to_string(),
            value,
          });
        }
        if value < 0.0 {
          return Err(GroupingOptionsError::NegativeBudget {
            budget,
            dimension: dimension.to_string(),
            value,
          });
        }
      }
    }

    for (dimension, max) in self.max_size.iter() {
      if let Some(min) = self.min_size.get(dimension) {
        if min > 0.0 && max < 3.0 * min {
          tracing::warn!(
            dimension,
            min,
            max,
            "maximum budget is below three times the minimum; unsplittable oversized groups become likely"
          );
        }
      }
    }

    Ok(())
  }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GroupingOptionsError {
  #[error("{budget} size budget for \"{dimension}\" is not finite: {value}")]
  NonFiniteBudget {
    budget: &'static str,
    dimension: String,
    value: f64,
  },

  #[error("{budget} size budget for \"{dimension}\" is negative: {value}")]
  NegativeBudget {
    budget: &'static str,
    dimension: String,
    value: f64,
  },
}

/// One named group of the output partition.
///
/// `items` keep the lexicographic order of their keys; `size` is the
/// component-wise sum over all members.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedItems<T> {
  pub key: String,
  pub items: Vec<T>,
  pub size: SizeMap,
}

/// Counters describing one grouping run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingStats {
  /// Input items seen.
  pub items: usize,
  /// Items emitted directly because they alone exceeded `max_size`.
  pub forced_singletons: usize,
  /// Two-way splits performed.
  pub splits: usize,
  /// Undersized-remainder repairs that modified a working group.
  pub repairs: usize,
  /// Groups accepted into the result above `max_size`.
  pub oversized_accepted: usize,
}

/// Typed decision event.
///
/// This is intended for debugging/visualization and must not be used for
/// correctness. To extend: add new variants.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionKind {
  /// A single item exceeded `max_size` on its own and became a result group.
  ForcedSingleton { key: String },

  /// A working group was cut in two at `position` (index of the first node of
  /// the right part), where adjacent keys were least alike.
  Split { position: usize, similarity: u32 },

  /// Undersized nodes were popped out of a working group and either merged
  /// into an existing result group or emitted as a new (possibly undersized)
  /// one.
  Repaired {
    node_count: usize,
    merged_into_existing: bool,
  },

  /// No cut could hold `min_size` everywhere; the group was accepted above
  /// `max_size`.
  OversizedAccepted { node_count: usize },
}

/// Single decision event with a monotonically increasing sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
  pub seq: u64,
  pub kind: DecisionKind,
}

/// A collection of decisions captured during one run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecisionLog {
  next_seq: u64,
  pub decisions: Vec<Decision>,
}

impl DecisionLog {
  pub fn push(&mut self, kind: DecisionKind) {
    let seq = self.next_seq;
    self.next_seq += 1;

    self.decisions.push(Decision { seq, kind });
  }

  pub fn is_empty(&self) -> bool {
    self.decisions.is_empty()
  }
}

/// Debug information captured during a run, present when
/// [`GroupingOptions::collect_debug`] was set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupingDebug {
  pub decisions: DecisionLog,
}

/// Everything one grouping run produces.
#[derive(Debug, Clone)]
pub struct GroupingOutcome<T> {
  /// The partition, ordered by each group's first member key.
  pub groups: Vec<GroupedItems<T>>,
  pub stats: GroupingStats,
  pub debug: Option<GroupingDebug>,
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn sizes(pairs: &[(&str, f64)]) -> SizeMap {
    pairs.iter().map(|(dimension, value)| (*dimension, *value)).collect()
  }

  #[test]
  fn zero_valued_dimensions_are_ignored_by_budget_checks() {
    let size = sizes(&[("css", 0.0), ("javascript", 4.0)]);
    let budget = sizes(&[("css", 3.0), ("javascript", 3.0)]);

    assert!(!size.below_min(&budget));
    assert!(size.exceeds(&budget));
    assert!(size.types_below_min(&budget).is_empty());
  }

  #[test]
  fn missing_budget_dimensions_are_unconstrained() {
    let size = sizes(&[("css", 1.0)]);
    let budget = sizes(&[("javascript", 3.0)]);

    assert!(!size.below_min(&budget));
    assert!(!size.exceeds(&budget));
  }

  #[test]
  fn types_below_min_collects_only_participating_dimensions() {
    let size = sizes(&[("css", 1.0), ("javascript", 5.0), ("wasm", 0.0)]);
    let budget = sizes(&[("css", 3.0), ("javascript", 3.0), ("wasm", 3.0)]);

    let below = size.types_below_min(&budget);
    assert_eq!(below.into_iter().collect::<Vec<_>>(), vec!["css".to_string()]);
  }

  #[test]
  fn selective_sum_and_matching_count_skip_non_participating_dimensions() {
    let size = sizes(&[("css", 2.0), ("javascript", 0.0), ("wasm", 5.0)]);
    let types = ["css", "javascript", "wasm"]
      .into_iter()
      .map(str::to_string)
      .collect();

    assert_eq!(size.matching_type_count(&types), 2);
    assert_eq!(size.selective_sum(&types), 7.0);
  }

  #[test]
  fn add_and_subtract_are_component_wise() {
    let mut total = sizes(&[("css", 2.0)]);
    total += &sizes(&[("css", 1.0), ("javascript", 4.0)]);
    assert_eq!(total, sizes(&[("css", 3.0), ("javascript", 4.0)]));

    total -= &sizes(&[("javascript", 4.0)]);
    assert_eq!(total.get("javascript"), Some(0.0));
    // The residue no longer participates in any check.
    assert!(!total.below_min(&sizes(&[("javascript", 3.0)])));
  }

  #[test]
  fn validate_rejects_negative_and_non_finite_budgets() {
    let options = GroupingOptions {
      min_size: sizes(&[("javascript", -1.0)]),
      ..GroupingOptions::default()
    };
    assert_eq!(
      options.validate(),
      Err(GroupingOptionsError::NegativeBudget {
        budget: "minimum",
        dimension: "javascript".to_string(),
        value: -1.0,
      })
    );

    let options = GroupingOptions {
      max_size: sizes(&[("css", f64::NAN)]),
      ..GroupingOptions::default()
    };
    assert!(matches!(
      options.validate(),
      Err(GroupingOptionsError::NonFiniteBudget { budget: "maximum", .. })
    ));
  }

  #[test]
  fn options_builder_defaults_to_unconstrained_budgets() {
    let options = GroupingOptionsBuilder::default()
      .min_size(sizes(&[("javascript", 3.0)]))
      .build()
      .unwrap();

    assert_eq!(options.min_size, sizes(&[("javascript", 3.0)]));
    assert!(options.max_size.is_empty());
    assert!(!options.collect_debug);
  }

  #[test]
  fn size_maps_serialize_as_plain_objects() {
    let size = sizes(&[("css", 1.5), ("javascript", 3.0)]);
    let json = serde_json::to_string(&size).unwrap();
    assert_eq!(json, r#"{"css":1.5,"javascript":3.0}"#);

    let back: SizeMap = serde_json::from_str(&json).unwrap();
    assert_eq!(back, size);
  }

  #[test]
  fn decision_log_assigns_sequential_numbers() {
    let mut log = DecisionLog::default();
    log.push(DecisionKind::OversizedAccepted { node_count: 2 });
    log.push(DecisionKind::Split {
      position: 1,
      similarity: 8,
    });

    assert_eq!(log.decisions.len(), 2);
    for (i, decision) in log.decisions.iter().enumerate() {
      assert_eq!(decision.seq, i as u64);
    }
  }
}
