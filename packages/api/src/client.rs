//! `reqwest` implementation of [`MadziApi`].

use std::time::Duration;

use async_trait::async_trait;
use madzi_api_models::{
    Agency, AgencyId, AnswerId, CoarseLocationRecord, DetailRecord, SecondarySourceRecord,
};
use serde::de::DeserializeOwned;

use crate::{ApiError, Credentials, MadziApi, query};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://www.madzialipo.org/api/";

const AGENCIES_PATH: &str = "Api_Agency/GetAgencies";
const REPORT_PATH: &str = "Api_Report/GetReportData/";
const ANSWER_DETAIL_PATH: &str = "Api_NewSourceAnswers/GetAnswerDetail/";
const NEW_SOURCE_DETAIL_PATH: &str = "Api_NewSourceAnswers/GetNewSourceAnswerDetail/";

/// Connection settings for [`HttpApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root every endpoint path is appended to.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// HTTP client for the Madzi Alipo API.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpApiClient {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the underlying `reqwest` client cannot
    /// be constructed.
    pub fn new(config: &ClientConfig, credentials: Credentials) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("madzi_harvest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = format!("{}/", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends an authorized GET and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let token = self.credentials.token()?;
        let url = self.endpoint(path);

        log::debug!("GET {url} {params:?}");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                url: response.url().to_string(),
            });
        }

        let url = response.url().to_string();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|source| ApiError::Decode { url, source })
    }
}

#[async_trait]
impl MadziApi for HttpApiClient {
    async fn list_agencies(&self) -> Result<Vec<Agency>, ApiError> {
        let agencies: Vec<Agency> = self.get_json(AGENCIES_PATH, &[]).await?;
        log::info!("Length of agencies {}", agencies.len());
        Ok(agencies)
    }

    async fn list_partition_records(
        &self,
        year: i32,
        agency_id: AgencyId,
    ) -> Result<Vec<CoarseLocationRecord>, ApiError> {
        let params =
            query::partition_query(year, agency_id).ok_or(ApiError::InvalidYear { year })?;
        self.get_json(REPORT_PATH, &params).await
    }

    async fn record_detail(&self, answer_id: AnswerId) -> Result<DetailRecord, ApiError> {
        let detail = self
            .get_json(ANSWER_DETAIL_PATH, &[("answerId", answer_id.to_string())])
            .await?;
        log::debug!("Response: {answer_id}");
        Ok(detail)
    }

    async fn secondary_source(
        &self,
        new_source_code: &str,
    ) -> Result<SecondarySourceRecord, ApiError> {
        self.get_json(
            NEW_SOURCE_DETAIL_PATH,
            &[("newSourceAnswerCode", new_source_code.to_owned())],
        )
        .await
    }
}
