use std::collections::BTreeMap;

use crate::error::{CacheError, Result};
use crate::strng::Strng;

/// A pod-level (or container-level) resource quantity: CPU/memory/ephemeral
/// storage plus an open set of scalar extended resources. Addition is
/// coordinate-wise; subtraction requires the minuend to dominate the
/// subtrahend component-wise (spec.md §4.1) so that `add` and `sub` are
/// exact inverses and `Assume(w); Forget(w)` round-trips byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Resource {
	pub milli_cpu: i64,
	pub memory_bytes: i64,
	pub ephemeral_bytes: i64,
	#[serde(default)]
	pub scalars: BTreeMap<Strng, i64>,
}

/// Defaults substituted for CPU/memory when a container's `requests` omit
/// them, used by `nonzero`. Injected via `CacheConfig` (spec.md §6) rather
/// than hardcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonzeroDefaults {
	pub milli_cpu: i64,
	pub memory_bytes: i64,
}

impl Default for NonzeroDefaults {
	fn default() -> Self {
		// 100m CPU, 200Mi memory — the conventional kube-scheduler defaults.
		Self {
			milli_cpu: 100,
			memory_bytes: 200 * 1024 * 1024,
		}
	}
}

impl Resource {
	pub fn is_zero(&self) -> bool {
		self.milli_cpu == 0
			&& self.memory_bytes == 0
			&& self.ephemeral_bytes == 0
			&& self.scalars.values().all(|v| *v == 0)
	}

	pub fn add(&self, other: &Resource) -> Resource {
		let mut scalars = self.scalars.clone();
		for (k, v) in &other.scalars {
			*scalars.entry(k.clone()).or_insert(0) += v;
		}
		Resource {
			milli_cpu: self.milli_cpu + other.milli_cpu,
			memory_bytes: self.memory_bytes + other.memory_bytes,
			ephemeral_bytes: self.ephemeral_bytes + other.ephemeral_bytes,
			scalars,
		}
	}

	/// Subtract `other` from `self`. Fails `Invariant` if any dimension would
	/// go negative — underflow here means a caller accepted a remove/update
	/// for a workload whose requests were never actually added (spec.md §7).
	pub fn sub(&self, other: &Resource) -> Result<Resource> {
		let milli_cpu = checked_sub(self.milli_cpu, other.milli_cpu, "milliCPU")?;
		let memory_bytes = checked_sub(self.memory_bytes, other.memory_bytes, "memoryBytes")?;
		let ephemeral_bytes = checked_sub(self.ephemeral_bytes, other.ephemeral_bytes, "ephemeralBytes")?;

		let mut scalars = self.scalars.clone();
		for (k, v) in &other.scalars {
			let cur = scalars.get(k).copied().unwrap_or(0);
			let next = checked_sub(cur, *v, k.as_str())?;
			if next == 0 {
				scalars.remove(k);
			} else {
				scalars.insert(k.clone(), next);
			}
		}
		Ok(Resource {
			milli_cpu,
			memory_bytes,
			ephemeral_bytes,
			scalars,
		})
	}

	/// Requests with `defaults` substituted for any zero/unset CPU or memory
	/// component (spec.md §3 Invariant I2, §4.1's "nonzero variant").
	pub fn nonzero(&self, defaults: &NonzeroDefaults) -> Resource {
		Resource {
			milli_cpu: if self.milli_cpu == 0 {
				defaults.milli_cpu
			} else {
				self.milli_cpu
			},
			memory_bytes: if self.memory_bytes == 0 {
				defaults.memory_bytes
			} else {
				self.memory_bytes
			},
			ephemeral_bytes: self.ephemeral_bytes,
			scalars: self.scalars.clone(),
		}
	}

	/// True if every dimension of `self` is covered by `capacity` (used by
	/// resize admission: `allocatable - (requested - current) >= projected`).
	pub fn fits_within(&self, capacity: &Resource) -> bool {
		if self.milli_cpu > capacity.milli_cpu
			|| self.memory_bytes > capacity.memory_bytes
			|| self.ephemeral_bytes > capacity.ephemeral_bytes
		{
			return false;
		}
		self
			.scalars
			.iter()
			.all(|(k, v)| *v <= capacity.scalars.get(k).copied().unwrap_or(0))
	}

	/// Component-wise maximum, used by the resize pipeline to project the
	/// larger of desired/current per dimension (spec.md §4.7 step 1).
	pub fn componentwise_max(&self, other: &Resource) -> Resource {
		let mut scalars = self.scalars.clone();
		for (k, v) in &other.scalars {
			let cur = scalars.entry(k.clone()).or_insert(0);
			if *v > *cur {
				*cur = *v;
			}
		}
		Resource {
			milli_cpu: self.milli_cpu.max(other.milli_cpu),
			memory_bytes: self.memory_bytes.max(other.memory_bytes),
			ephemeral_bytes: self.ephemeral_bytes.max(other.ephemeral_bytes),
			scalars,
		}
	}
}

fn checked_sub(a: i64, b: i64, dim: &str) -> Result<i64> {
	let v = a - b;
	if v < 0 {
		return Err(CacheError::Invariant(format!(
			"{dim} would underflow: {a} - {b} = {v}"
		)));
	}
	Ok(v)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn r(cpu: i64, mem: i64) -> Resource {
		Resource {
			milli_cpu: cpu,
			memory_bytes: mem,
			..Default::default()
		}
	}

	#[test]
	fn add_then_sub_is_identity() {
		let base = r(100, 500);
		let delta = r(50, 200);
		let added = base.add(&delta);
		assert_eq!(added, r(150, 700));
		let back = added.sub(&delta).unwrap();
		assert_eq!(back, base);
	}

	#[test]
	fn sub_underflow_is_invariant_error() {
		let base = r(10, 10);
		let delta = r(20, 0);
		assert!(matches!(base.sub(&delta), Err(CacheError::Invariant(_))));
	}

	#[test]
	fn nonzero_substitutes_missing_dimensions_only() {
		let defaults = NonzeroDefaults {
			milli_cpu: 100,
			memory_bytes: 200,
		};
		let partial = r(0, 500);
		assert_eq!(partial.nonzero(&defaults), r(100, 500));
		let full = r(50, 50);
		assert_eq!(full.nonzero(&defaults), r(50, 50));
	}

	#[test]
	fn unknown_scalars_pass_through_untouched() {
		let mut a = r(0, 0);
		a.scalars.insert(crate::strng::new("nvidia.com/gpu"), 2);
		let b = r(0, 0);
		let sum = a.add(&b);
		assert_eq!(sum.scalars.get("nvidia.com/gpu"), Some(&2));
	}
}
