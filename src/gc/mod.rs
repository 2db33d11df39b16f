//! Retention and garbage collection.
//!
//! [`CandidateFinder`] locates records with too much history,
//! [`VersionSelector`] picks the versions that can go and
//! [`DeletionPlanner`] turns those into delete operations. Collectors wrap
//! discovery; processors execute what they find. [`GarbageCollectorService`]
//! holds both.

pub mod collectors;
mod finder;
mod planner;
mod policy;
pub mod processors;
mod schema;
mod selector;
mod service;

pub use collectors::{ChangeSetCollector, Collector, ObsoleteTableCollector, VersionedCollector};
pub use finder::CandidateFinder;
pub use planner::DeletionPlanner;
pub use policy::{RetentionOverrides, RetentionWindow, eligible_versions};
pub use processors::{Processor, ProcessorKind};
pub use schema::{EntityClass, SchemaRegistry, TableResolver};
pub use selector::{VersionSelection, VersionSelector};
pub use service::GarbageCollectorService;
