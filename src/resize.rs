//! In-place vertical resize: a workload can ask the cache to grow or shrink
//! its container requests without a full unbind/rebind, provided the host has
//! headroom and the workload's QoS class does not change (spec.md §4.7).
//!
//! The protocol is annotation-driven so it layers on top of the ordinary
//! `Update` path rather than needing its own cache operation. A caller sets
//! [`ANNOTATION_RESIZE_REQUEST`] on the `Workload` it passes to
//! [`crate::cache::PlacementCache::update`] to kick off a resize, and later
//! acknowledges the outcome by attaching a [`CONDITION_RESIZE_STATUS`]
//! condition (`message` equal to the recorded [`ANNOTATION_RESIZE_ACTION_VERSION`])
//! to a subsequent `update` call. `apply_resize` drives both halves of that
//! exchange, rewriting the `new` workload in place before the cache's ordinary
//! aggregate bookkeeping runs.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::host::HostInfo;
use crate::resource::{NonzeroDefaults, Resource};
use crate::strng::Strng;
use crate::workload::{ConditionStatus, Workload};

pub const ANNOTATION_RESIZE_REQUEST: &str = "workload.io/resize-request";
pub const ANNOTATION_RESIZE_POLICY: &str = "workload.io/resize-policy";
pub const ANNOTATION_RESIZE_ACTION: &str = "workload.io/resize-action";
pub const ANNOTATION_RESIZE_ACTION_VERSION: &str = "workload.io/resize-action-version";
pub const ANNOTATION_RESIZE_PREVIOUS: &str = "workload.io/resize-previous";

/// Status condition kind an external resize controller attaches to ack the
/// outcome of a previously dispatched in-place resize.
pub const CONDITION_RESIZE_STATUS: &str = "ResourcesResizeStatus";

/// The caller's desired per-container requests/limits, JSON-encoded into
/// [`ANNOTATION_RESIZE_REQUEST`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResizeRequest {
	containers: BTreeMap<Strng, ContainerResize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContainerResize {
	#[serde(default)]
	requests: Resource,
	#[serde(default)]
	limits: Resource,
}

impl ResizeRequest {
	/// Merge the request onto `base`, taking `max(desired, current)` per
	/// dimension per container, so the projected admission check never
	/// undercounts a shrink that hasn't actually freed resources yet
	/// (spec.md §4.7 step 1).
	fn apply_to(&self, base: &Workload) -> Workload {
		let mut w = base.clone();
		for c in &mut w.containers {
			if let Some(r) = self.containers.get(&c.name) {
				c.requests = c.requests.componentwise_max(&r.requests);
				c.limits = c.limits.componentwise_max(&r.limits);
			}
		}
		w
	}
}

/// Per-container requests/limits as they stood before a resize was applied,
/// stashed in [`ANNOTATION_RESIZE_PREVIOUS`] so a failed ack can roll back. A
/// container absent from this map (added after the resize was initiated)
/// simply keeps whatever value it already has — the rollback is a structured
/// patch, not a full replace (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreviousState {
	containers: BTreeMap<Strng, ContainerResize>,
}

impl PreviousState {
	fn capture(current: &Workload) -> Self {
		Self {
			containers: current
				.containers
				.iter()
				.map(|c| {
					(
						c.name.clone(),
						ContainerResize {
							requests: c.requests.clone(),
							limits: c.limits.clone(),
						},
					)
				})
				.collect(),
		}
	}

	fn restore(&self, new: &mut Workload) {
		for c in &mut new.containers {
			if let Some(r) = self.containers.get(&c.name) {
				c.requests = r.requests.clone();
				c.limits = r.limits.clone();
			}
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicy {
	/// Resize in place when admissible and QoS-preserving; fall back to a
	/// delete-and-reschedule otherwise. The default when no policy
	/// annotation is present.
	InPlacePreferred,
	/// Resize in place or leave the workload untouched — never delete it.
	InPlaceOnly,
	/// Always delete and let the scheduler reschedule, regardless of
	/// admission or QoS impact.
	Restart,
}

impl Default for ResizePolicy {
	fn default() -> Self {
		ResizePolicy::InPlacePreferred
	}
}

impl ResizePolicy {
	fn parse(s: &str) -> Option<Self> {
		match s {
			"InPlacePreferred" => Some(ResizePolicy::InPlacePreferred),
			"InPlaceOnly" => Some(ResizePolicy::InPlaceOnly),
			"Restart" => Some(ResizePolicy::Restart),
			_ => None,
		}
	}
}

/// Values the cache writes into [`ANNOTATION_RESIZE_ACTION`] (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAction {
	UpdatePodForResizing,
	UpdatePodForResizingDone,
	DeletePodForResizing,
	PodNotResizedDueToPolicy,
}

impl ResizeAction {
	fn as_str(self) -> &'static str {
		match self {
			ResizeAction::UpdatePodForResizing => "UpdatePodForResizing",
			ResizeAction::UpdatePodForResizingDone => "UpdatePodForResizingDone",
			ResizeAction::DeletePodForResizing => "DeletePodForResizing",
			ResizeAction::PodNotResizedDueToPolicy => "PodNotResizedDueToPolicy",
		}
	}

	fn parse(s: &str) -> Option<Self> {
		match s {
			"UpdatePodForResizing" => Some(ResizeAction::UpdatePodForResizing),
			"UpdatePodForResizingDone" => Some(ResizeAction::UpdatePodForResizingDone),
			"DeletePodForResizing" => Some(ResizeAction::DeletePodForResizing),
			"PodNotResizedDueToPolicy" => Some(ResizeAction::PodNotResizedDueToPolicy),
			_ => None,
		}
	}
}

fn set_action(new: &mut Workload, action: ResizeAction, version: Option<Strng>) {
	new
		.annotations
		.insert(crate::strng::new(ANNOTATION_RESIZE_ACTION), crate::strng::new(action.as_str()));
	match version {
		Some(v) => {
			new
				.annotations
				.insert(crate::strng::new(ANNOTATION_RESIZE_ACTION_VERSION), v);
		}
		None => {
			new.annotations.remove(ANNOTATION_RESIZE_ACTION_VERSION);
		}
	}
}

/// The three QoS buckets carried over from the original admission policy
/// this cache schedules against. A resize that would move a workload between
/// buckets needs a restart, never an in-place patch (spec.md §4.7 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosClass {
	Guaranteed,
	Burstable,
	BestEffort,
}

impl QosClass {
	pub fn of(w: &Workload) -> Self {
		if w.containers.is_empty() {
			return QosClass::BestEffort;
		}
		if w
			.containers
			.iter()
			.all(|c| !c.requests.is_zero() && !c.limits.is_zero() && c.requests == c.limits)
		{
			return QosClass::Guaranteed;
		}
		if w.containers.iter().any(|c| !c.requests.is_zero() || !c.limits.is_zero()) {
			return QosClass::Burstable;
		}
		QosClass::BestEffort
	}
}

/// Resolve a previously dispatched in-place resize against an ack condition
/// `new` may carry (spec.md §4.7 step 5). Returns `Ok(true)` if an ack was
/// found and handled — the caller should treat the update as resize-only and
/// skip the request-dispatch path below.
fn apply_ack(current: &Workload, new: &mut Workload) -> Result<bool> {
	let Some(action) = current.annotation(ANNOTATION_RESIZE_ACTION).and_then(|a| ResizeAction::parse(a)) else {
		return Ok(false);
	};
	if action != ResizeAction::UpdatePodForResizing {
		return Ok(false);
	}
	let Some(version) = current.annotation(ANNOTATION_RESIZE_ACTION_VERSION) else {
		return Ok(false);
	};
	let Some(condition) = new.condition(CONDITION_RESIZE_STATUS) else {
		return Ok(false);
	};
	if condition.message.as_str() != version.as_str() {
		return Ok(false);
	}

	match condition.status {
		ConditionStatus::True => {
			new.annotations.remove(ANNOTATION_RESIZE_PREVIOUS);
			set_action(new, ResizeAction::UpdatePodForResizingDone, None);
		}
		ConditionStatus::False => {
			if let Some(previous_raw) = current.annotation(ANNOTATION_RESIZE_PREVIOUS).cloned() {
				let previous: PreviousState =
					serde_json::from_str(&previous_raw).map_err(|e| CacheError::Parse(e.to_string()))?;
				previous.restore(new);
			}
			new.annotations.remove(ANNOTATION_RESIZE_PREVIOUS);
			set_action(new, ResizeAction::UpdatePodForResizingDone, None);
		}
		ConditionStatus::Unknown => return Ok(false),
	}
	Ok(true)
}

/// Rewrite `new` in place per any resize activity it carries, relative to
/// the `current` (pre-update) workload and the capacity of its host:
/// resolves a pending ack first, otherwise dispatches a fresh
/// [`ANNOTATION_RESIZE_REQUEST`]. A no-op if `new` carries neither. Never
/// fails on a rejected or deferred resize — that outcome is recorded in
/// [`ANNOTATION_RESIZE_ACTION`], per spec.md §7's "never aborts the
/// enclosing update" rule. The only errors are malformed annotation JSON and
/// missing host bookkeeping, both of which the caller downgrades to a
/// logged warning rather than failing the update.
pub fn apply_resize(
	current: &Workload,
	new: &mut Workload,
	hosts: &HashMap<Strng, HostInfo>,
	_defaults: &NonzeroDefaults,
) -> Result<()> {
	if apply_ack(current, new)? {
		return Ok(());
	}

	let Some(request_raw) = new.annotation(ANNOTATION_RESIZE_REQUEST).cloned() else {
		return Ok(());
	};
	let request: ResizeRequest =
		serde_json::from_str(&request_raw).map_err(|e| CacheError::Parse(e.to_string()))?;
	let policy = new
		.annotation(ANNOTATION_RESIZE_POLICY)
		.and_then(|s| ResizePolicy::parse(s))
		.unwrap_or_default();
	let desired = request.apply_to(current);

	if policy == ResizePolicy::Restart {
		set_action(new, ResizeAction::DeletePodForResizing, None);
		return Ok(());
	}

	let host_name = current
		.host
		.as_ref()
		.ok_or_else(|| CacheError::Invariant("resize requires current.host to be set".into()))?;
	let host_info = hosts
		.get(host_name)
		.ok_or_else(|| CacheError::HostNotFound(host_name.clone()))?;

	let current_total = current.total_requests();
	let available = host_info
		.allocatable
		.sub(&host_info.requested.sub(&current_total)?)?;
	let projected = desired.total_requests().componentwise_max(&current_total);
	let admitted = projected.fits_within(&available) && QosClass::of(current) == QosClass::of(&desired);

	if admitted {
		let previous = PreviousState::capture(current);
		let previous_json = serde_json::to_string(&previous).map_err(|e| CacheError::Parse(e.to_string()))?;
		new.containers = desired.containers;
		new
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_PREVIOUS), crate::strng::new(previous_json));
		set_action(new, ResizeAction::UpdatePodForResizing, Some(new.resource_version.clone()));
	} else {
		let action = match policy {
			ResizePolicy::InPlacePreferred => ResizeAction::DeletePodForResizing,
			ResizePolicy::InPlaceOnly => ResizeAction::PodNotResizedDueToPolicy,
			ResizePolicy::Restart => unreachable!("handled above"),
		};
		set_action(new, action, None);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identity::WorkloadId;
	use crate::workload::{Container, WorkloadCondition};

	fn workload(cpu: i64, mem: i64, limit_cpu: i64, limit_mem: i64) -> Workload {
		Workload {
			id: WorkloadId::new("default", "p1", "u1"),
			host: Some(crate::strng::new("node")),
			containers: vec![Container {
				name: crate::strng::new("main"),
				requests: Resource {
					milli_cpu: cpu,
					memory_bytes: mem,
					..Default::default()
				},
				limits: Resource {
					milli_cpu: limit_cpu,
					memory_bytes: limit_mem,
					..Default::default()
				},
				ports: vec![],
			}],
			labels: Default::default(),
			annotations: Default::default(),
			conditions: Default::default(),
			resource_version: crate::strng::new("1"),
		}
	}

	fn host_with(allocatable_cpu: i64, allocatable_mem: i64, requested: Resource) -> HashMap<Strng, HostInfo> {
		let mut gen = {
			let mut n = 0u64;
			move || {
				n += 1;
				n
			}
		};
		let mut info = HostInfo::empty(crate::strng::new("node"), &mut gen);
		info.allocatable = Resource {
			milli_cpu: allocatable_cpu,
			memory_bytes: allocatable_mem,
			..Default::default()
		};
		info.requested = requested;
		let mut hosts = HashMap::new();
		hosts.insert(crate::strng::new("node"), info);
		hosts
	}

	fn request_annotation(cpu: i64, mem: i64) -> Strng {
		let req = ResizeRequest {
			containers: BTreeMap::from([(
				crate::strng::new("main"),
				ContainerResize {
					requests: Resource {
						milli_cpu: cpu,
						memory_bytes: mem,
						..Default::default()
					},
					limits: Resource::default(),
				},
			)]),
		};
		crate::strng::new(serde_json::to_string(&req).unwrap())
	}

	#[test]
	fn no_annotation_is_a_no_op() {
		let current = workload(100, 100, 100, 100);
		let mut new = current.clone();
		let hosts = host_with(1000, 1000, current.total_requests());
		let defaults = NonzeroDefaults::default();
		apply_resize(&current, &mut new, &hosts, &defaults).unwrap();
		assert_eq!(new, current);
	}

	#[test]
	fn admissible_growth_applies_in_place_and_records_previous() {
		let current = workload(100, 100, 0, 0);
		let hosts = host_with(1000, 1000, current.total_requests());
		let mut new = current.clone();
		new
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_REQUEST), request_annotation(200, 150));
		let defaults = NonzeroDefaults::default();
		apply_resize(&current, &mut new, &hosts, &defaults).unwrap();
		assert_eq!(new.containers[0].requests.milli_cpu, 200);
		assert_eq!(
			new.annotation(ANNOTATION_RESIZE_ACTION).unwrap().as_str(),
			"UpdatePodForResizing"
		);
		assert_eq!(
			new.annotation(ANNOTATION_RESIZE_ACTION_VERSION).unwrap().as_str(),
			"1"
		);
		assert!(new.annotation(ANNOTATION_RESIZE_PREVIOUS).is_some());
	}

	#[test]
	fn oversized_growth_with_inplace_only_is_rejected_without_mutation() {
		let current = workload(100, 100, 0, 0);
		// host has no spare headroom at all
		let hosts = host_with(100, 100, current.total_requests());
		let mut new = current.clone();
		new
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_REQUEST), request_annotation(5000, 150));
		new
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_POLICY), crate::strng::new("InPlaceOnly"));
		let defaults = NonzeroDefaults::default();
		apply_resize(&current, &mut new, &hosts, &defaults).unwrap();
		assert_eq!(new.containers[0].requests.milli_cpu, 100);
		assert_eq!(
			new.annotation(ANNOTATION_RESIZE_ACTION).unwrap().as_str(),
			"PodNotResizedDueToPolicy"
		);
	}

	#[test]
	fn oversized_growth_with_preferred_policy_deletes_for_resizing() {
		let current = workload(100, 100, 0, 0);
		let hosts = host_with(100, 100, current.total_requests());
		let mut new = current.clone();
		new
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_REQUEST), request_annotation(5000, 150));
		let defaults = NonzeroDefaults::default();
		apply_resize(&current, &mut new, &hosts, &defaults).unwrap();
		assert_eq!(new.containers[0].requests.milli_cpu, 100);
		assert_eq!(
			new.annotation(ANNOTATION_RESIZE_ACTION).unwrap().as_str(),
			"DeletePodForResizing"
		);
	}

	#[test]
	fn restart_policy_skips_admission_entirely() {
		let current = workload(100, 100, 0, 0);
		// Deliberately no host in the map: Restart must never consult capacity.
		let hosts = HashMap::new();
		let mut new = current.clone();
		new
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_REQUEST), request_annotation(200, 100));
		new
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_POLICY), crate::strng::new("Restart"));
		let defaults = NonzeroDefaults::default();
		apply_resize(&current, &mut new, &hosts, &defaults).unwrap();
		assert_eq!(new.containers[0].requests.milli_cpu, 100);
		assert_eq!(
			new.annotation(ANNOTATION_RESIZE_ACTION).unwrap().as_str(),
			"DeletePodForResizing"
		);
	}

	#[test]
	fn qos_class_change_forces_rejection_even_when_admissible() {
		// Guaranteed: requests == limits. Bumping requests without limits
		// drops it to Burstable, which InPlaceOnly must refuse.
		let current = workload(100, 100, 100, 100);
		let hosts = host_with(10_000, 10_000, current.total_requests());
		let mut new = current.clone();
		new
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_REQUEST), request_annotation(200, 100));
		new
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_POLICY), crate::strng::new("InPlaceOnly"));
		let defaults = NonzeroDefaults::default();
		apply_resize(&current, &mut new, &hosts, &defaults).unwrap();
		assert_eq!(new.containers[0].requests.milli_cpu, 100);
		assert_eq!(
			new.annotation(ANNOTATION_RESIZE_ACTION).unwrap().as_str(),
			"PodNotResizedDueToPolicy"
		);
	}

	#[test]
	fn ack_true_finalizes_and_clears_previous() {
		let current = workload(100, 100, 0, 0);
		let hosts = host_with(1000, 1000, current.total_requests());
		let defaults = NonzeroDefaults::default();

		let mut resized = current.clone();
		resized
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_REQUEST), request_annotation(200, 150));
		apply_resize(&current, &mut resized, &hosts, &defaults).unwrap();
		let version = resized.annotation(ANNOTATION_RESIZE_ACTION_VERSION).unwrap().clone();

		let mut acked = resized.clone();
		acked.conditions.push(WorkloadCondition {
			kind: crate::strng::new(CONDITION_RESIZE_STATUS),
			status: ConditionStatus::True,
			message: version,
		});
		apply_resize(&resized, &mut acked, &hosts, &defaults).unwrap();
		assert_eq!(acked.containers[0].requests.milli_cpu, 200);
		assert!(acked.annotation(ANNOTATION_RESIZE_PREVIOUS).is_none());
		assert_eq!(
			acked.annotation(ANNOTATION_RESIZE_ACTION).unwrap().as_str(),
			"UpdatePodForResizingDone"
		);
	}

	#[test]
	fn ack_false_rolls_back_to_previous() {
		let current = workload(100, 100, 0, 0);
		let hosts = host_with(1000, 1000, current.total_requests());
		let defaults = NonzeroDefaults::default();

		let mut resized = current.clone();
		resized
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_REQUEST), request_annotation(200, 150));
		apply_resize(&current, &mut resized, &hosts, &defaults).unwrap();
		let version = resized.annotation(ANNOTATION_RESIZE_ACTION_VERSION).unwrap().clone();

		let mut acked = resized.clone();
		acked.conditions.push(WorkloadCondition {
			kind: crate::strng::new(CONDITION_RESIZE_STATUS),
			status: ConditionStatus::False,
			message: version,
		});
		apply_resize(&resized, &mut acked, &hosts, &defaults).unwrap();
		assert_eq!(acked.containers[0].requests.milli_cpu, 100);
		assert!(acked.annotation(ANNOTATION_RESIZE_PREVIOUS).is_none());
		assert_eq!(
			acked.annotation(ANNOTATION_RESIZE_ACTION).unwrap().as_str(),
			"UpdatePodForResizingDone"
		);
	}

	#[test]
	fn ack_with_mismatched_version_is_ignored() {
		let current = workload(100, 100, 0, 0);
		let hosts = host_with(1000, 1000, current.total_requests());
		let defaults = NonzeroDefaults::default();

		let mut resized = current.clone();
		resized
			.annotations
			.insert(crate::strng::new(ANNOTATION_RESIZE_REQUEST), request_annotation(200, 150));
		apply_resize(&current, &mut resized, &hosts, &defaults).unwrap();

		let mut acked = resized.clone();
		acked.conditions.push(WorkloadCondition {
			kind: crate::strng::new(CONDITION_RESIZE_STATUS),
			status: ConditionStatus::True,
			message: crate::strng::new("some-other-version"),
		});
		apply_resize(&resized, &mut acked, &hosts, &defaults).unwrap();
		// Stale/mismatched ack: left exactly as the caller provided it.
		assert_eq!(acked.containers[0].requests.milli_cpu, 200);
		assert_eq!(
			acked.annotation(ANNOTATION_RESIZE_ACTION).unwrap().as_str(),
			"UpdatePodForResizing"
		);
	}
}
