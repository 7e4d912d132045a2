use std::collections::HashMap;

use itertools::Itertools;

use crate::error::{CacheError, Result};
use crate::selector::LabelSelector;
use crate::strng::Strng;
use crate::workload::Workload;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DisruptionBudget {
	pub id: Strng,
	pub selector: LabelSelector,
	pub allowed_disruptions: i32,
}

/// Set of disruption-budget records keyed by identity, queried by matching
/// a workload's labels against each budget's selector (spec.md §4.3). The
/// selector space is open, so `list`/`query` scan rather than index.
#[derive(Debug, Clone, Default)]
pub struct BudgetIndex {
	by_id: HashMap<Strng, DisruptionBudget>,
}

impl BudgetIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, budget: DisruptionBudget) -> Result<()> {
		if self.by_id.contains_key(&budget.id) {
			return Err(CacheError::Invariant(format!(
				"disruption budget {} already present",
				budget.id
			)));
		}
		self.by_id.insert(budget.id.clone(), budget);
		Ok(())
	}

	pub fn update(&mut self, old_id: &Strng, new: DisruptionBudget) -> Result<()> {
		self
			.by_id
			.remove(old_id)
			.ok_or_else(|| CacheError::BudgetNotFound(old_id.clone()))?;
		self.by_id.insert(new.id.clone(), new);
		Ok(())
	}

	pub fn remove(&mut self, id: &Strng) -> Result<()> {
		self
			.by_id
			.remove(id)
			.map(|_| ())
			.ok_or_else(|| CacheError::BudgetNotFound(id.clone()))
	}

	/// Every budget whose selector matches `labels` (spec.md §4.3 `list`),
	/// sorted by id so callers see a stable order across calls even though
	/// `by_id` itself iterates in hash order.
	pub fn list(&self, labels: &std::collections::BTreeMap<Strng, Strng>) -> Vec<&DisruptionBudget> {
		self
			.by_id
			.values()
			.filter(|b| b.selector.matches(labels))
			.sorted_by(|a, b| a.id.cmp(&b.id))
			.collect()
	}

	/// True iff every budget whose selector matches `workload`'s labels still
	/// allows at least one disruption. Vacuously true when no budget matches
	/// (spec.md §4.3, scenario 6).
	pub fn query(&self, workload: &Workload) -> bool {
		self
			.by_id
			.values()
			.filter(|b| b.selector.matches(&workload.labels))
			.all(|b| b.allowed_disruptions > 0)
	}
}
