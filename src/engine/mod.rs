//! Execution engine for keysync
//!
//! The engine orchestrates:
//! 1. Planning - Build the resource list from config, split by privilege
//! 2. Diffing - Compute current vs desired state
//! 3. Executing - Apply changes one resource at a time, privileged batch last

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ExecuteOptions, execute};
pub use planner::ExecutionPlan;
