//! Batched retention and garbage collection for versioned relational data.
//!
//! Collectors find data that has outlived its retention window, processors
//! delete it, and resumable jobs on a durable queue spread the work over
//! bounded batches.

pub mod config;
pub mod db;
pub mod gc;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod queue;
