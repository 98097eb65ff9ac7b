//! # Diet Common Library
//!
//! Shared code for the recipe mirror services:
//! - Canonical record model and raw table normalization
//! - Store adapters (document collection, flat-file blob) behind one trait
//! - Query engine, pagination and display projection
//! - Configuration loading
//! - Error taxonomy

pub mod config;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod pagination;
pub mod projection;
pub mod query;
pub mod record;
pub mod store;

pub use error::{Error, Result};
pub use ingest::{ingest, IngestReport};
pub use normalize::normalize;
pub use query::{QueryEngine, RecipeQuery};
pub use record::CanonicalRecord;
pub use store::{open_store, RecordFilter, RecordStore};
