//! redb table definitions for the FleetGrid registry.
//!
//! Record tables use `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Scalar tables store timestamps and scores directly.

use redb::TableDefinition;

/// Workers keyed by worker id.
pub const WORKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("workers");

/// Per-GPU model assignments keyed by worker id.
pub const WORKER_CONFIGS: TableDefinition<&str, &[u8]> = TableDefinition::new("worker_configs");

/// Orders keyed by order id.
pub const ORDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Last event time (epoch ms) keyed by event name.
pub const EVENTS: TableDefinition<&str, u64> = TableDefinition::new("last_event");

/// Named lease locks keyed by lock name.
pub const LOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("locks");

/// Blocked-until time (epoch ms) keyed by `{engine}:{capacity_unit_id}`.
pub const BLOCKLIST: TableDefinition<&str, u64> = TableDefinition::new("blocklist");

/// Pending-work score keyed by model name.
pub const PENDING: TableDefinition<&str, f64> = TableDefinition::new("pending_work");
