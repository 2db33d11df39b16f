mod change_sets;
mod deletions;
mod schema;
mod versions;

pub use change_sets::ChangeSetRepo;
pub use deletions::DeletionRepo;
pub use schema::SchemaRepo;
pub use versions::VersionRepo;
