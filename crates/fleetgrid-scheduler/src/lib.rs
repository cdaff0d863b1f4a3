//! fleetgrid-scheduler — fixed-interval timers for the control loops.
//!
//! An [`IntervalScheduler`] owns one background task that fires a [`Tick`]
//! every `interval` until stopped. Each firing runs in its own task, so a
//! tick stalled on a slow provider call does not delay later firings;
//! overlapping executions are serialized by the registry lock inside the
//! tick itself.

pub mod interval;

pub use interval::{IntervalScheduler, Tick};
