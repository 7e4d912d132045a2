use std::time::Duration;

use crate::resource::NonzeroDefaults;

/// Everything the cache needs at construction time (spec.md §6
/// "Configuration"). No environment or file parsing here — that belongs to
/// the caller's own config layer, out of scope per spec.md §1.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
	/// How long an assumed-and-bound-finished workload may go unconfirmed
	/// before `cleanup_assumed` evicts it.
	pub assume_ttl: Duration,
	/// How often the background expiration loop sweeps.
	pub expiration_period: Duration,
	pub nonzero_defaults: NonzeroDefaults,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			assume_ttl: Duration::from_secs(30),
			expiration_period: Duration::from_secs(1),
			nonzero_defaults: NonzeroDefaults::default(),
		}
	}
}
