//! Shared database repository test infrastructure
//!
//! Every test runs against a fresh in-memory SQLite database with the real
//! migrations applied. Fixture tables for versioned classes are created per
//! test through [`harness`].
//!
//! # Running tests
//!
//! ```bash
//! cargo test db::tests
//! ```

mod deletions;
