use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Protocol {
	Tcp,
	Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HostPort {
	pub protocol: Protocol,
	pub ip: IpAddr,
	pub port: u16,
}

fn is_wildcard(ip: &IpAddr) -> bool {
	ip.is_unspecified()
}

/// The set of host ports claimed by placed workloads on one `HostInfo`.
/// A multiset, not a set: two workloads can each claim the same
/// `(protocol, ip, port)` only when that's legal (it never is for the same
/// ip, but distinct non-wildcard ips can coexist) and a port is only truly
/// free again once every owner withdraws (spec.md §3 `PortSet`, §4.2 I3).
#[derive(Debug, Clone, Default)]
pub struct PortSet {
	// keyed by (protocol, port); value is the refcount per ip reserving it
	reservations: HashMap<(Protocol, u16), HashMap<IpAddr, u32>>,
}

impl PortSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true if `port` conflicts with an existing reservation on the
	/// same `(protocol, port)`: wildcard vs anything, or the same concrete ip
	/// against itself. Distinct non-wildcard ips never conflict (spec.md P7).
	pub fn conflicts(&self, port: &HostPort) -> bool {
		let Some(ips) = self.reservations.get(&(port.protocol, port.port)) else {
			return false;
		};
		if ips.is_empty() {
			return false;
		}
		if is_wildcard(&port.ip) {
			return true;
		}
		ips
			.keys()
			.any(|owner| is_wildcard(owner) || *owner == port.ip)
	}

	/// Reserve `port`, failing if it conflicts with an existing owner.
	pub fn add(&mut self, port: &HostPort) -> Result<()> {
		if self.conflicts(port) {
			return Err(CacheError::Invariant(format!(
				"port conflict on {:?}/{}: {} already claimed",
				port.protocol, port.port, port.ip
			)));
		}
		*self
			.reservations
			.entry((port.protocol, port.port))
			.or_default()
			.entry(port.ip)
			.or_insert(0) += 1;
		Ok(())
	}

	/// Withdraw one reservation of `port`. No-op if the reservation doesn't
	/// exist — withdrawal during `remove`/`sub` is best-effort cleanup, not
	/// a precondition the caller must prove.
	pub fn remove(&mut self, port: &HostPort) {
		if let Some(ips) = self.reservations.get_mut(&(port.protocol, port.port)) {
			if let Some(count) = ips.get_mut(&port.ip) {
				*count -= 1;
				if *count == 0 {
					ips.remove(&port.ip);
				}
			}
			if ips.is_empty() {
				self.reservations.remove(&(port.protocol, port.port));
			}
		}
	}

	pub fn is_empty(&self) -> bool {
		self.reservations.is_empty()
	}

	pub fn contains(&self, port: &HostPort) -> bool {
		self
			.reservations
			.get(&(port.protocol, port.port))
			.map(|ips| ips.contains_key(&port.ip))
			.unwrap_or(false)
	}
}

impl PartialEq for PortSet {
	fn eq(&self, other: &Self) -> bool {
		self.reservations == other.reservations
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tcp(ip: &str, port: u16) -> HostPort {
		HostPort {
			protocol: Protocol::Tcp,
			ip: ip.parse().unwrap(),
			port,
		}
	}

	#[test]
	fn wildcard_conflicts_with_specific() {
		let mut ports = PortSet::new();
		ports.add(&tcp("127.0.0.1", 80)).unwrap();
		assert!(ports.conflicts(&tcp("0.0.0.0", 80)));
	}

	#[test]
	fn distinct_specific_ips_do_not_conflict() {
		let mut ports = PortSet::new();
		ports.add(&tcp("127.0.0.1", 80)).unwrap();
		assert!(!ports.conflicts(&tcp("127.0.0.2", 80)));
		ports.add(&tcp("127.0.0.2", 80)).unwrap();
		assert!(ports.contains(&tcp("127.0.0.2", 80)));
	}

	#[test]
	fn second_wildcard_on_same_port_conflicts() {
		let mut ports = PortSet::new();
		ports.add(&tcp("0.0.0.0", 90)).unwrap();
		assert!(ports.conflicts(&tcp("0.0.0.0", 90)));
		assert!(ports.add(&tcp("0.0.0.0", 90)).is_err());
	}

	#[test]
	fn remove_frees_the_reservation() {
		let mut ports = PortSet::new();
		let p = tcp("127.0.0.1", 80);
		ports.add(&p).unwrap();
		ports.remove(&p);
		assert!(ports.is_empty());
		assert!(!ports.conflicts(&p));
	}
}
