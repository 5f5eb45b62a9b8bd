//! Plans the placement and data movement of tiled matrix-vector workloads on a grid of
//! processing tiles.
//!
//! A [Planner](planner::Planner) partitions the workload, places boundary, staging and compute
//! tiles, wires them with depth-bounded channels, and produces a [Schedule](components::schedule::Schedule)
//! of strided transfer descriptors and wait barriers.

#[macro_use]
extern crate derive_new;

/// Building blocks of a plan.
pub mod components;
/// Entry points tying the components together.
pub mod planner;

pub use components::{ConfigError, PlanError, SchedulingError};
pub use planner::{Plan, Planner};
