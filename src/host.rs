use std::collections::BTreeMap;

use crate::error::{CacheError, Result};
use crate::port::PortSet;
use crate::resource::{NonzeroDefaults, Resource};
use crate::strng::Strng;
use crate::workload::Workload;

/// Per-host snapshot the scheduler consults when evaluating predicates: the
/// workloads placed there, the summed requests (plain and nonzero-defaulted),
/// allocatable capacity, taints, claimed ports, and image sizes. `generation`
/// bumps on every mutation so snapshot holders can cheaply test staleness
/// (spec.md §3 `HostInfo`, Invariant I4).
#[derive(Debug, Clone)]
pub struct HostInfo {
	pub name: Strng,
	pub allocatable: Resource,
	pub requested: Resource,
	pub nonzero_requested: Resource,
	pub placed: Vec<Workload>,
	pub ports: PortSet,
	pub taints: Vec<Strng>,
	pub image_sizes: BTreeMap<Strng, i64>,
	pub generation: u64,
	/// Whether `set_host` has ever been called for this host. Used by the
	/// cache to decide whether an empty `HostInfo` should be deleted
	/// (spec.md §4.2 empty-HostInfo policy).
	pub(crate) has_host: bool,
}

impl HostInfo {
	pub fn empty(name: Strng, next_generation: impl FnOnce() -> u64) -> Self {
		Self {
			name,
			allocatable: Resource::default(),
			requested: Resource::default(),
			nonzero_requested: Resource::default(),
			placed: Vec::new(),
			ports: PortSet::new(),
			taints: Vec::new(),
			image_sizes: BTreeMap::new(),
			generation: next_generation(),
			has_host: false,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.placed.is_empty() && !self.has_host
	}

	/// Record the host's own resource record (allocatable, taints, image
	/// sizes), creating the entry's "real host" status if this is the first
	/// call. Does not touch `placed`/`requested`.
	pub fn set_host(
		&mut self,
		allocatable: Resource,
		taints: Vec<Strng>,
		image_sizes: BTreeMap<Strng, i64>,
		next_generation: impl FnOnce() -> u64,
	) {
		self.allocatable = allocatable;
		self.taints = taints;
		self.image_sizes = image_sizes;
		self.has_host = true;
		self.generation = next_generation();
	}

	/// Append `w` to `placed`, fold its requests into the running totals, and
	/// reserve its host ports. The caller guarantees `w`'s identity is not
	/// already placed here — this is not idempotent (spec.md §4.2).
	///
	/// Every port `w` claims is validated against a scratch copy of the port
	/// set before `placed`/`requested`/`ports` are touched: a conflict on,
	/// say, the workload's second container must not leave its first port
	/// permanently reserved with no placed workload left to free it via
	/// `remove_workload` (spec.md §5 — port-set updates are atomic per call).
	pub fn add_workload(
		&mut self,
		w: Workload,
		defaults: &NonzeroDefaults,
		next_generation: impl FnOnce() -> u64,
	) -> Result<()> {
		let mut ports = self.ports.clone();
		for port in w.host_ports() {
			ports.add(port)?;
		}
		let requests = w.total_requests();
		let nonzero = w.total_nonzero_requests(defaults);
		self.ports = ports;
		self.requested = self.requested.add(&requests);
		self.nonzero_requested = self.nonzero_requested.add(&nonzero);
		self.placed.push(w);
		self.generation = next_generation();
		Ok(())
	}

	/// Remove the workload with `id` from `placed`, subtracting its requests
	/// and withdrawing its ports. Fails `NotFound` if no such identity is
	/// placed here (spec.md §4.2).
	pub fn remove_workload(
		&mut self,
		id: &crate::identity::WorkloadId,
		defaults: &NonzeroDefaults,
		next_generation: impl FnOnce() -> u64,
	) -> Result<Workload> {
		let pos = self
			.placed
			.iter()
			.position(|w| &w.id == id)
			.ok_or_else(|| CacheError::NotFound(id.clone()))?;
		let w = self.placed.remove(pos);
		let requests = w.total_requests();
		let nonzero = w.total_nonzero_requests(defaults);
		self.requested = self.requested.sub(&requests)?;
		self.nonzero_requested = self.nonzero_requested.sub(&nonzero)?;
		for port in w.host_ports() {
			self.ports.remove(port);
		}
		self.generation = next_generation();
		Ok(w)
	}

	/// Equivalent to `remove_workload(old)` followed by `add_workload(new)`,
	/// but a single generation bump (spec.md §4.2).
	///
	/// The port swap is validated on a scratch copy of the port set (old's
	/// ports withdrawn, new's ports reserved) before any of `placed`,
	/// `requested`, `nonzero_requested`, or `ports` is mutated. Without this,
	/// a conflict on `new`'s ports would already have evicted `old` from
	/// `placed` with no way to push it back — the caller (`cache.rs::update`)
	/// would be left with the workload-identity table still pointing at a
	/// `HostInfo` that no longer lists it (spec.md §5 atomicity).
	pub fn update_workload(
		&mut self,
		old_id: &crate::identity::WorkloadId,
		new: Workload,
		defaults: &NonzeroDefaults,
		next_generation: impl FnOnce() -> u64,
	) -> Result<Workload> {
		let pos = self
			.placed
			.iter()
			.position(|w| &w.id == old_id)
			.ok_or_else(|| CacheError::NotFound(old_id.clone()))?;

		let mut ports = self.ports.clone();
		for port in self.placed[pos].host_ports() {
			ports.remove(port);
		}
		for port in new.host_ports() {
			ports.add(port)?;
		}

		let old = self.placed.remove(pos);
		self.requested = self.requested.sub(&old.total_requests())?;
		self.nonzero_requested = self.nonzero_requested.sub(&old.total_nonzero_requests(defaults))?;
		self.requested = self.requested.add(&new.total_requests());
		self.nonzero_requested = self.nonzero_requested.add(&new.total_nonzero_requests(defaults));
		self.ports = ports;
		self.placed.push(new);
		self.generation = next_generation();
		Ok(old)
	}

	/// Deep clone preserving the source generation, used for `Snapshot()`
	/// (spec.md §4.6) — the clone is a frozen read-only copy, not a live
	/// handle the cache continues to mutate.
	pub fn deep_clone(&self) -> HostInfo {
		self.clone()
	}
}
