use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Instant;

use tracing::{Level, debug, instrument, trace, warn};

use crate::budget::{BudgetIndex, DisruptionBudget};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::host::HostInfo;
use crate::identity::WorkloadId;
use crate::resource::Resource;
use crate::resize;
use crate::strng::Strng;
use crate::workload::{Workload, WorkloadState};

/// All mutable cache state, guarded by the single reader/writer lock
/// (spec.md §5): the workload table, host table, assumed-set and the
/// disruption-budget index.
#[derive(Debug, Default)]
struct CacheState {
	workloads: HashMap<WorkloadId, WorkloadState>,
	hosts: HashMap<Strng, HostInfo>,
	assumed: HashSet<WorkloadId>,
	budgets: BudgetIndex,
}

/// A consistent, deep-copied view of cache state for read-only predicate
/// evaluation (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct Snapshot {
	pub hosts: HashMap<Strng, HostInfo>,
	pub assumed: HashSet<WorkloadId>,
}

/// The scheduler-side workload placement cache. Cheap to clone — every
/// clone shares the same underlying `RwLock<CacheState>` and generation
/// counter (the teacher's `StoreUpdater` handle pattern). `Snapshot`/`Get*`
/// take the read lock; every mutator takes the write lock (spec.md §5).
#[derive(Clone)]
pub struct PlacementCache {
	state: Arc<RwLock<CacheState>>,
	generation: Arc<AtomicU64>,
	config: CacheConfig,
}

impl PlacementCache {
	pub fn new(config: CacheConfig) -> Self {
		Self {
			state: Arc::new(RwLock::new(CacheState::default())),
			generation: Arc::new(AtomicU64::new(0)),
			config,
		}
	}

	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	fn bump(&self) -> u64 {
		self.generation.fetch_add(1, Ordering::SeqCst) + 1
	}

	fn read(&self) -> RwLockReadGuard<'_, CacheState> {
		self.state.read().expect("cache lock poisoned")
	}

	/// Record the host's resource record, creating the `HostInfo` if this is
	/// the first time we've seen it (spec.md §4.2 `setHost`).
	#[instrument(level = Level::TRACE, name = "add_host", skip_all, fields(host = %name))]
	pub fn add_host(
		&self,
		name: impl Into<Strng> + std::fmt::Display,
		allocatable: Resource,
		taints: Vec<Strng>,
		image_sizes: std::collections::BTreeMap<Strng, i64>,
	) {
		let name = name.into();
		let mut state = self.state.write().expect("cache lock poisoned");
		let entry = state
			.hosts
			.entry(name.clone())
			.or_insert_with(|| HostInfo::empty(name.clone(), || self.bump()));
		entry.set_host(allocatable, taints, image_sizes, || self.bump());
	}

	pub fn update_host(
		&self,
		name: impl Into<Strng> + std::fmt::Display,
		allocatable: Resource,
		taints: Vec<Strng>,
		image_sizes: std::collections::BTreeMap<Strng, i64>,
	) {
		self.add_host(name, allocatable, taints, image_sizes);
	}

	/// No-op if any workload remains placed on the host (spec.md §6).
	#[instrument(level = Level::TRACE, name = "remove_host", skip_all, fields(host = %name.as_ref()))]
	pub fn remove_host(&self, name: impl AsRef<str>) {
		let mut state = self.state.write().expect("cache lock poisoned");
		let name = name.as_ref();
		if let Some(host) = state.hosts.get(name) {
			if !host.placed.is_empty() {
				debug!(host = %host.name, "remove_host no-op: workloads still placed");
				return;
			}
		}
		state.hosts.remove(name);
	}

	/// Remove the `HostInfo` entry for `host` if it has no placed workloads
	/// and has never had `set_host` called — the empty-HostInfo deletion
	/// rule (spec.md §4.2).
	fn drop_host_if_empty(state: &mut CacheState, host: &Strng) {
		if state.hosts.get(host).is_some_and(HostInfo::is_empty) {
			state.hosts.remove(host);
		}
	}

	/// Optimistically place `w`, recording it as assumed with no deadline
	/// yet (spec.md §4.4 `Assume`).
	#[instrument(level = Level::TRACE, name = "assume", skip_all, fields(id = %w.id))]
	pub fn assume(&self, w: Workload) -> Result<()> {
		let host = w
			.host
			.clone()
			.ok_or_else(|| CacheError::Invariant("assume requires w.host to be set".into()))?;
		let mut state = self.state.write().expect("cache lock poisoned");
		if state.workloads.contains_key(&w.id) {
			return Err(CacheError::AlreadyPresent(w.id.clone()));
		}
		let id = w.id.clone();
		let defaults = self.config.nonzero_defaults;
		let entry = state
			.hosts
			.entry(host.clone())
			.or_insert_with(|| HostInfo::empty(host.clone(), || self.bump()));
		entry.add_workload(w.clone(), &defaults, || self.bump())?;
		state.workloads.insert(id.clone(), WorkloadState::assumed(w));
		state.assumed.insert(id);
		Ok(())
	}

	/// Start the assumed-TTL clock, transitioning `Assumed -> AssumedBound`
	/// (spec.md §4.4 `FinishBinding`). No-op if already bound or unknown.
	#[instrument(level = Level::TRACE, name = "finish_binding", skip_all, fields(id = %id))]
	pub fn finish_binding(&self, id: &WorkloadId, now: Instant) -> Result<()> {
		let mut state = self.state.write().expect("cache lock poisoned");
		let Some(ws) = state.workloads.get_mut(id) else {
			return Ok(());
		};
		if ws.assumed && !ws.binding_finished {
			ws.binding_finished = true;
			ws.deadline = Some(now + self.config.assume_ttl);
		}
		Ok(())
	}

	/// Discard an assumption that will never be confirmed (spec.md §4.4
	/// `Forget`): requires the identity to be assumed and `host` to match
	/// the assumed host, then reverses the `HostInfo` addition.
	#[instrument(level = Level::TRACE, name = "forget", skip_all, fields(id = %id))]
	pub fn forget(&self, id: &WorkloadId, host: &Strng) -> Result<()> {
		let mut state = self.state.write().expect("cache lock poisoned");
		let ws = state
			.workloads
			.get(id)
			.ok_or_else(|| CacheError::NotFound(id.clone()))?;
		if !ws.assumed {
			return Err(CacheError::NotFound(id.clone()));
		}
		let actual = ws.workload.host.clone();
		if actual.as_ref() != Some(host) {
			return Err(CacheError::HostMismatch {
				id: id.clone(),
				expected: host.clone(),
				actual: actual.unwrap_or_default(),
			});
		}
		let defaults = self.config.nonzero_defaults;
		if let Some(host_info) = state.hosts.get_mut(host) {
			host_info.remove_workload(id, &defaults, || self.bump())?;
		}
		Self::drop_host_if_empty(&mut state, host);
		state.workloads.remove(id);
		state.assumed.remove(id);
		Ok(())
	}

	/// Confirm an assumption, or record a brand new authoritative placement
	/// (spec.md §4.4 `Add`). If an assumed identity's real host differs from
	/// its assumed host, the old host is updated before the new host to
	/// preserve the no-overcount invariant (spec.md §4.4 ordering tie-break).
	#[instrument(level = Level::TRACE, name = "add", skip_all, fields(id = %w.id))]
	pub fn add(&self, w: Workload) -> Result<()> {
		let host = w
			.host
			.clone()
			.ok_or_else(|| CacheError::Invariant("add requires w.host to be set".into()))?;
		let mut state = self.state.write().expect("cache lock poisoned");
		let id = w.id.clone();
		let defaults = self.config.nonzero_defaults;

		let was_assumed = match state.workloads.get(&id) {
			None => false,
			Some(ws) if ws.assumed => true,
			Some(_) => return Err(CacheError::AlreadyBound(id)),
		};

		if was_assumed {
			let prev_host = state.workloads[&id]
				.workload
				.host
				.clone()
				.ok_or_else(|| CacheError::Invariant("assumed workload missing host".into()))?;
			if prev_host == host {
				let host_info = state
					.hosts
					.get_mut(&host)
					.ok_or_else(|| CacheError::HostNotFound(host.clone()))?;
				host_info.update_workload(&id, w.clone(), &defaults, || self.bump())?;
			} else {
				trace!(%prev_host, new_host = %host, "confirming assumption on a different host");
				if let Some(host_info) = state.hosts.get_mut(&prev_host) {
					host_info.remove_workload(&id, &defaults, || self.bump())?;
				}
				Self::drop_host_if_empty(&mut state, &prev_host);
				let entry = state
					.hosts
					.entry(host.clone())
					.or_insert_with(|| HostInfo::empty(host.clone(), || self.bump()));
				entry.add_workload(w.clone(), &defaults, || self.bump())?;
			}
			state.assumed.remove(&id);
			let ws = state.workloads.get_mut(&id).expect("checked above");
			ws.assumed = false;
			ws.deadline = None;
			ws.workload = w;
		} else {
			let entry = state
				.hosts
				.entry(host.clone())
				.or_insert_with(|| HostInfo::empty(host.clone(), || self.bump()));
			entry.add_workload(w.clone(), &defaults, || self.bump())?;
			state.workloads.insert(id, WorkloadState::bound(w));
		}
		Ok(())
	}

	/// Update an already-bound workload, potentially changing host
	/// (spec.md §4.4 `Update`). Layers the resize protocol on top when the
	/// new workload carries a resize request annotation.
	#[instrument(level = Level::TRACE, name = "update", skip_all, fields(id = %old))]
	pub fn update(&self, old: &WorkloadId, mut new: Workload) -> Result<()> {
		let mut state = self.state.write().expect("cache lock poisoned");
		let ws = state
			.workloads
			.get(old)
			.ok_or_else(|| CacheError::NotFound(old.clone()))?;
		if ws.assumed {
			return Err(CacheError::NotAssumedBoundary(old.clone()));
		}
		let current = ws.workload.clone();
		let defaults = self.config.nonzero_defaults;

		if let Err(err) = resize::apply_resize(&current, &mut new, &state.hosts, &defaults) {
			warn!(id = %old, error = %err, "resize annotation ignored, applying plain update");
		}

		let old_host = current
			.host
			.clone()
			.ok_or_else(|| CacheError::Invariant("bound workload missing host".into()))?;
		let new_host = new
			.host
			.clone()
			.ok_or_else(|| CacheError::Invariant("update requires new.host to be set".into()))?;

		if old_host == new_host {
			let host_info = state
				.hosts
				.get_mut(&old_host)
				.ok_or_else(|| CacheError::HostNotFound(old_host.clone()))?;
			host_info.update_workload(old, new.clone(), &defaults, || self.bump())?;
		} else {
			if let Some(host_info) = state.hosts.get_mut(&old_host) {
				host_info.remove_workload(old, &defaults, || self.bump())?;
			}
			Self::drop_host_if_empty(&mut state, &old_host);
			let entry = state
				.hosts
				.entry(new_host.clone())
				.or_insert_with(|| HostInfo::empty(new_host.clone(), || self.bump()));
			entry.add_workload(new.clone(), &defaults, || self.bump())?;
		}

		let id = new.id.clone();
		state.workloads.remove(old);
		state.workloads.insert(id, WorkloadState::bound(new));
		Ok(())
	}

	/// Remove a bound (or assumed) workload entirely (spec.md §4.4 `Remove`).
	#[instrument(level = Level::TRACE, name = "remove", skip_all, fields(id = %id))]
	pub fn remove(&self, id: &WorkloadId) -> Result<()> {
		let mut state = self.state.write().expect("cache lock poisoned");
		let ws = state
			.workloads
			.remove(id)
			.ok_or_else(|| CacheError::NotFound(id.clone()))?;
		let host = ws
			.workload
			.host
			.clone()
			.ok_or_else(|| CacheError::Invariant("workload missing host on remove".into()))?;
		let defaults = self.config.nonzero_defaults;
		if let Some(host_info) = state.hosts.get_mut(&host) {
			host_info.remove_workload(id, &defaults, || self.bump())?;
		}
		Self::drop_host_if_empty(&mut state, &host);
		state.assumed.remove(id);
		Ok(())
	}

	pub fn get_workload(&self, id: &WorkloadId) -> Result<Workload> {
		self
			.read()
			.workloads
			.get(id)
			.map(|ws| ws.workload.clone())
			.ok_or_else(|| CacheError::NotFound(id.clone()))
	}

	pub fn is_assumed(&self, id: &WorkloadId) -> bool {
		self.read().assumed.contains(id)
	}

	pub fn add_budget(&self, budget: DisruptionBudget) -> Result<()> {
		self.state.write().expect("cache lock poisoned").budgets.add(budget)
	}

	pub fn update_budget(&self, old_id: &Strng, new: DisruptionBudget) -> Result<()> {
		self
			.state
			.write()
			.expect("cache lock poisoned")
			.budgets
			.update(old_id, new)
	}

	pub fn remove_budget(&self, id: &Strng) -> Result<()> {
		self.state.write().expect("cache lock poisoned").budgets.remove(id)
	}

	pub fn list_budgets(&self, labels: &std::collections::BTreeMap<Strng, Strng>) -> Vec<DisruptionBudget> {
		self
			.read()
			.budgets
			.list(labels)
			.into_iter()
			.cloned()
			.collect()
	}

	pub fn query_budget(&self, workload: &Workload) -> bool {
		self.read().budgets.query(workload)
	}

	/// A consistent, deep-copied view of every `HostInfo` and the assumed
	/// set, captured under the read lock (spec.md §4.6).
	pub fn snapshot(&self) -> Snapshot {
		let state = self.read();
		Snapshot {
			hosts: state
				.hosts
				.iter()
				.map(|(k, v)| (k.clone(), v.deep_clone()))
				.collect(),
			assumed: state.assumed.clone(),
		}
	}

	/// True iff a live `HostInfo` of the same name exists and its generation
	/// equals `snapshot_host`'s — a stale/deleted host returns false
	/// (spec.md §4.6).
	pub fn is_up_to_date(&self, snapshot_host: &HostInfo) -> bool {
		self
			.read()
			.hosts
			.get(&snapshot_host.name)
			.is_some_and(|live| live.generation == snapshot_host.generation)
	}

	/// Evict every assumed workload whose binding has finished and whose
	/// deadline has passed (spec.md §4.5 `cleanupAssumedPods`). Best-effort:
	/// a per-workload failure is logged, not propagated, so one bad entry
	/// doesn't abort the sweep.
	pub fn cleanup_assumed(&self, now: Instant) {
		let expired: Vec<WorkloadId> = {
			let state = self.read();
			state
				.assumed
				.iter()
				.filter(|id| {
					state
						.workloads
						.get(*id)
						.is_some_and(|ws| ws.binding_finished && ws.deadline.is_some_and(|d| d <= now))
				})
				.cloned()
				.collect()
		};
		for id in expired {
			if let Err(err) = self.remove(&id) {
				warn!(%id, error = %err, "failed to expire assumed workload, will retry next sweep");
			}
		}
	}
}
