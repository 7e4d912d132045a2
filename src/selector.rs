use std::collections::BTreeMap;

use crate::strng::Strng;

/// Standard label-set selector semantics (spec.md §4.3): equality-based
/// `match_labels` plus set-based `match_expressions`. An empty selector
/// (both fields empty) matches every workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LabelSelector {
	#[serde(default)]
	pub match_labels: BTreeMap<Strng, Strng>,
	#[serde(default)]
	pub match_expressions: Vec<Requirement>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Requirement {
	pub key: Strng,
	pub op: Operator,
	#[serde(default)]
	pub values: Vec<Strng>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Operator {
	In,
	NotIn,
	Exists,
	DoesNotExist,
}

impl LabelSelector {
	pub fn matches(&self, labels: &BTreeMap<Strng, Strng>) -> bool {
		for (k, v) in &self.match_labels {
			if labels.get(k) != Some(v) {
				return false;
			}
		}
		self
			.match_expressions
			.iter()
			.all(|req| req.matches(labels))
	}
}

impl Requirement {
	fn matches(&self, labels: &BTreeMap<Strng, Strng>) -> bool {
		match self.op {
			Operator::Exists => labels.contains_key(&self.key),
			Operator::DoesNotExist => !labels.contains_key(&self.key),
			Operator::In => labels
				.get(&self.key)
				.is_some_and(|v| self.values.iter().any(|want| want == v)),
			Operator::NotIn => labels
				.get(&self.key)
				.is_none_or(|v| !self.values.iter().any(|want| want == v)),
		}
	}
}
