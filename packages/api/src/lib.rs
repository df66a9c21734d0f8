#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Typed client for the Madzi Alipo reporting API.
//!
//! Exposes the [`MadziApi`] trait with one method per endpoint the
//! harvester uses, and [`HttpApiClient`], its `reqwest` implementation.
//! Every request carries the bearer token from [`Credentials`]. The client
//! never retries; callers decide what a failed call means.

pub mod client;
pub mod credentials;
pub mod query;

use async_trait::async_trait;
use madzi_api_models::{
    Agency, AgencyId, AnswerId, CoarseLocationRecord, DetailRecord, SecondarySourceRecord,
};

pub use client::{ClientConfig, DEFAULT_BASE_URL, HttpApiClient};
pub use credentials::{CredentialError, Credentials, DEFAULT_TOKEN_VAR};

/// Errors surfaced by a single API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The bearer token could not be obtained.
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// The request could not be sent or the body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status.
        status: reqwest::StatusCode,
        /// Requested URL.
        url: String,
    },

    /// The year cannot be turned into a date range.
    #[error("Year {year} is out of range")]
    InvalidYear {
        /// Requested year.
        year: i32,
    },

    /// The body was not the JSON shape the endpoint promises.
    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

/// The endpoints the harvester depends on.
#[async_trait]
pub trait MadziApi: Send + Sync {
    /// Lists every agency visible to the token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or decoding fails.
    async fn list_agencies(&self) -> Result<Vec<Agency>, ApiError>;

    /// Lists the visit rows of one agency within one calendar year.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or decoding fails.
    async fn list_partition_records(
        &self,
        year: i32,
        agency_id: AgencyId,
    ) -> Result<Vec<CoarseLocationRecord>, ApiError>;

    /// Fetches the detail payload of one visit answer.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or decoding fails.
    async fn record_detail(&self, answer_id: AnswerId) -> Result<DetailRecord, ApiError>;

    /// Fetches the water source identified by `new_source_code`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or decoding fails.
    async fn secondary_source(
        &self,
        new_source_code: &str,
    ) -> Result<SecondarySourceRecord, ApiError>;
}
