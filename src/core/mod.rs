//! Partitioning engine: planning, workers, merge and run orchestration

pub mod aggregator;
pub mod config;
pub mod index;
pub mod layout;
pub mod orchestrator;
pub mod planner;
pub mod worker;

pub use config::Config;
pub use orchestrator::{Orchestrator, PartitionRequest, RunReport, RunStatus};
