//! # sigpool-store
//!
//! `SQLite` persistence adapter for the signature catalogue.
//!
//! - **[`store`]**: [`SqliteSignatureStore`], the facade that owns the
//!   connection pool, applies catalogue pragmas, and implements
//!   [`sigpool_core::SignatureRepository`].
//! - **[`migrations`]**: Compile-time-embedded schema revisions tracked in
//!   `PRAGMA user_version`, applied transactionally.
//! - **[`row_types`]**: Raw database row structs and timestamp encoding.
//! - **[`repositories`]**: Stateless repository structs — each method takes
//!   `&Connection` and executes SQL. No shared mutable state.

#![deny(unsafe_code)]

pub mod migrations;
pub mod repositories;
pub mod row_types;
pub mod store;

pub use migrations::{latest_revision, migrate, schema_version};
pub use store::{SqliteSignatureStore, StoreOptions};
