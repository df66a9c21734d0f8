#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetch, enrich, cache, and flatten pipeline for Madzi Alipo visit records.
//!
//! A run walks every (year, agency) partition through a bounded
//! [`scheduler::Scheduler`]. Each partition is either loaded from its cache
//! file ([`store::PartitionStore`]) or listed from the API and enriched
//! record by record ([`enrich::RecordEnricher`]) under a second, wider
//! scheduler. Water source coordinates are memoized for the whole run in a
//! single-flight [`coordinates::CoordinateCache`]. Finally every partition's
//! flat records are concatenated and written as one summary table.
//!
//! Failures stay inside the unit that produced them: a failed record is
//! missing from its partition, a failed partition is missing from the
//! summary, and both are listed in the returned [`pipeline::HarvestReport`].

pub mod audit;
pub mod config;
pub mod coordinates;
pub mod enrich;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod store;

use madzi_api::ApiError;
use madzi_table::TableError;

pub use config::HarvestConfig;
pub use pipeline::{HarvestReport, Harvester};

/// Errors raised inside the harvest pipeline.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// An API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A cache or summary file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache file could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The summary table could not be produced.
    #[error(transparent)]
    Table(#[from] TableError),

    /// A listing row had no usable `answerId`.
    #[error("Location record has no answerId")]
    MissingAnswerId,

    /// The configuration cannot describe a run.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of what is wrong.
        message: String,
    },
}
