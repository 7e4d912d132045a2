//! Scheduler-side workload placement cache.
//!
//! An in-memory, concurrency-safe store a cluster scheduler uses for
//! placement decisions: it reconciles optimistic "assumed" placements with
//! authoritative add/update/remove events, expires unconfirmed assumptions
//! on a TTL, aggregates per-host resource usage as workloads come and go,
//! drives an in-place vertical resize protocol, and answers disruption
//! budget queries. Informers, the control-plane binding, transport, and any
//! CLI around this cache are the caller's concern, not this crate's.

pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod expire;
pub mod host;
pub mod identity;
pub mod port;
pub mod resize;
pub mod resource;
pub mod selector;
pub mod strng;
pub mod workload;

pub use budget::{BudgetIndex, DisruptionBudget};
pub use cache::{PlacementCache, Snapshot};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use host::HostInfo;
pub use identity::WorkloadId;
pub use port::{HostPort, PortSet, Protocol};
pub use resize::{QosClass, ResizeAction, ResizePolicy};
pub use resource::{NonzeroDefaults, Resource};
pub use selector::{LabelSelector, Operator, Requirement};
pub use strng::Strng;
pub use workload::{Container, ConditionStatus, Workload, WorkloadCondition, WorkloadState};
