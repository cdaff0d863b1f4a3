//! fleetgrid-state — the worker registry for FleetGrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds workers, their per-GPU
//! model configs, orders, last-event timestamps, named leases, the
//! capacity-unit blocklist and pending-work scores.
//!
//! Control loops talk to the [`Registry`] trait; [`StateStore`] is the
//! embedded implementation. It is `Clone + Send + Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod lock;
pub mod registry;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use lock::{Lease, with_lock};
pub use registry::Registry;
pub use store::StateStore;
