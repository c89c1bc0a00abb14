//! Quantro (workspace facade crate).
//!
//! Re-exports the simulation crates under stable `quantro::{core,types}` paths
//! and hosts the headless driver used by the `quantro-sim` binary.

pub use quantro_core as core;
pub use quantro_types as types;

pub mod driver;
