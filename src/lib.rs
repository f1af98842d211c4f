//! pxscraper: flattens hierarchical PxWeb statistical tables into normalized
//! per-period JSON datasets.
//!
//! One generic pipeline (`pipeline::run_table`) drives every per-table
//! fetcher in `tables`: metadata resolution, dimension configuration, query
//! construction, cube decoding, Cartesian record assembly, and envelope
//! validation, ending at the JSON writer in `write`.

pub mod cube;
pub mod envelope;
pub mod error;
pub mod fetch;
pub mod meta;
pub mod pipeline;
pub mod query;
pub mod resolve;
pub mod tables;
pub mod walk;
pub mod write;
