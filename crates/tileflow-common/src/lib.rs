#![warn(missing_docs)]

//! Shared configuration and logging for the tileflow planner.

/// Configuration module.
pub mod config;
