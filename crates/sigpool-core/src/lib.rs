//! # sigpool-core
//!
//! Shared domain model for the signature pool system.
//!
//! This crate carries everything the other members agree on:
//!
//! - **Domain types**: [`Signature`] and its lifecycle enums, pool
//!   projections, filters, pagination, import results, per-account policy
//! - **Repository trait**: [`SignatureRepository`] — the persistence
//!   interface the pool cache and domain service consume
//! - **Errors**: [`SignatureError`] with a crate-wide [`Result`] alias
//! - **Config**: compiled defaults with environment overrides
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod repo;
pub mod types;

pub use config::SigpoolConfig;
pub use errors::{Result, SignatureError};
pub use repo::SignatureRepository;
pub use types::{
    BatchImportResult, CachedSignature, NewSignature, PageParams, PoolFilter, Signature,
    SignatureConfig, SignatureFilter, SignatureSource, SignatureStats, SignatureStatus,
    SignatureStrategy,
};
