use crate::identity::WorkloadId;
use crate::strng::Strng;

/// Every error the cache can surface. Preconditions in the public contract
/// (spec.md §6/§7) always come back as one of these — the cache never
/// silently swallows a precondition miss.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
	#[error("workload {0} not found")]
	NotFound(WorkloadId),

	#[error("workload {0} is already present")]
	AlreadyPresent(WorkloadId),

	#[error("workload {0} is already bound")]
	AlreadyBound(WorkloadId),

	#[error("host mismatch for {id}: expected {expected}, got {actual}")]
	HostMismatch {
		id: WorkloadId,
		expected: Strng,
		actual: Strng,
	},

	#[error("host {0} not found")]
	HostNotFound(Strng),

	#[error("disruption budget {0} not found")]
	BudgetNotFound(Strng),

	/// `UpdateWorkload` was called on an identity that is still assumed
	/// (spec.md §4.4/§6: `Update` requires "old known & not assumed"). An
	/// ordinary, foreseeable caller-ordering mistake — distinct from
	/// `Invariant`, which is reserved for the cache's own bookkeeping being
	/// corrupt.
	#[error("workload {0} cannot be updated while still assumed")]
	NotAssumedBoundary(WorkloadId),

	/// An arithmetic or invariant violation that should never happen in a
	/// correctly-driven cache. Callers that can recover get this error;
	/// call sites that know it is unreachable use `debug_assert!` instead.
	#[error("invariant violated: {0}")]
	Invariant(String),

	/// Malformed resize annotation JSON. Per spec.md §7 this never aborts
	/// the enclosing `update` — the caller downgrades it to a logged warning.
	#[error("failed to parse resize annotation: {0}")]
	Parse(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
