//! Background sweep that evicts assumed workloads whose TTL has elapsed
//! (spec.md §4.5). The cache itself only exposes the synchronous
//! [`crate::cache::PlacementCache::cleanup_assumed`] call; this module wraps
//! it in a cancellable `tokio::time::interval` loop for callers that want the
//! cache to expire itself rather than driving the sweep externally.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::PlacementCache;

/// Runs `cache.cleanup_assumed` on every tick of `cache.config().expiration_period`
/// until `stop` is cancelled. Intended to be spawned with `tokio::spawn` and
/// torn down by cancelling the token, mirroring the stop-channel shutdown
/// pattern the rest of this codebase uses for long-running background tasks.
pub async fn run(cache: PlacementCache, stop: CancellationToken) {
	let period = cache.config().expiration_period;
	let mut ticker = tokio::time::interval(period);
	// The first tick fires immediately; that's fine, cleanup_assumed is cheap
	// when nothing has expired yet.
	loop {
		tokio::select! {
			_ = stop.cancelled() => {
				info!("expiration loop stopping");
				return;
			}
			_ = ticker.tick() => {
				debug!("running assumed-workload expiration sweep");
				cache.cleanup_assumed(Instant::now());
			}
		}
	}
}
