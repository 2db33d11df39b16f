mod change_sets;
mod common;
mod deletions;
mod schema;
mod versions;

pub use change_sets::SqliteChangeSetRepo;
#[cfg(test)]
pub(crate) use common::{format_timestamp, quote_ident};
pub use deletions::SqliteDeletionRepo;
pub use schema::SqliteSchemaRepo;
pub use versions::SqliteVersionRepo;
