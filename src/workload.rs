use std::collections::BTreeMap;

use crate::identity::WorkloadId;
use crate::port::HostPort;
use crate::resource::Resource;
use crate::strng::Strng;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Container {
	pub name: Strng,
	#[serde(default)]
	pub requests: Resource,
	#[serde(default)]
	pub limits: Resource,
	#[serde(default)]
	pub ports: Vec<HostPort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConditionStatus {
	True,
	False,
	Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WorkloadCondition {
	pub kind: Strng,
	pub status: ConditionStatus,
	#[serde(default)]
	pub message: Strng,
}

/// A unit of placement: containers, resource requests, host assignment, and
/// the metadata the resize protocol and disruption-budget index read from
/// (labels, annotations). Identity is `id`; everything else is mutable state
/// the cache tracks across Assume/Add/Update/Remove (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Workload {
	pub id: WorkloadId,
	pub host: Option<Strng>,
	#[serde(default)]
	pub containers: Vec<Container>,
	#[serde(default)]
	pub labels: BTreeMap<Strng, Strng>,
	#[serde(default)]
	pub annotations: BTreeMap<Strng, Strng>,
	#[serde(default)]
	pub conditions: Vec<WorkloadCondition>,
	pub resource_version: Strng,
}

impl Workload {
	/// Sum of every container's requests — the quantity `HostInfo.requested`
	/// aggregates (spec.md Invariant I1).
	pub fn total_requests(&self) -> Resource {
		self
			.containers
			.iter()
			.fold(Resource::default(), |acc, c| acc.add(&c.requests))
	}

	/// Sum of every container's requests with CPU/memory defaults
	/// substituted where missing (Invariant I2).
	pub fn total_nonzero_requests(&self, defaults: &crate::resource::NonzeroDefaults) -> Resource {
		self
			.containers
			.iter()
			.fold(Resource::default(), |acc, c| acc.add(&c.requests.nonzero(defaults)))
	}

	pub fn host_ports(&self) -> impl Iterator<Item = &HostPort> {
		self.containers.iter().flat_map(|c| c.ports.iter())
	}

	pub fn annotation(&self, key: &str) -> Option<&Strng> {
		self.annotations.get(key)
	}

	pub fn condition(&self, kind: &str) -> Option<&WorkloadCondition> {
		self.conditions.iter().find(|c| c.kind == kind)
	}
}

/// Per-identity bookkeeping the cache maintains on top of the workload
/// itself: whether the authoritative bind has completed, the assumed-TTL
/// deadline (only set once bound finishes), and whether this entry is still
/// an optimistic assumption (spec.md §3 `WorkloadState`).
#[derive(Debug, Clone)]
pub struct WorkloadState {
	pub workload: Workload,
	pub binding_finished: bool,
	pub deadline: Option<std::time::Instant>,
	pub assumed: bool,
}

impl WorkloadState {
	pub fn bound(workload: Workload) -> Self {
		Self {
			workload,
			binding_finished: false,
			deadline: None,
			assumed: false,
		}
	}

	pub fn assumed(workload: Workload) -> Self {
		Self {
			workload,
			binding_finished: false,
			deadline: None,
			assumed: true,
		}
	}
}
