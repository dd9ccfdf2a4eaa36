//! Type-safe step command modules.
//!
//! This module contains structs that implement `StepArgs` for each external
//! tool the provisioner drives. Each struct maps Rust fields to the exact CLI
//! flags, environment variables, and working directory expected by the
//! corresponding tool invocation.

pub mod git;
pub mod pip;
