//! Presence table access over PostgREST.
//!
//! Stale writes are not filtered here. The table needs a `BEFORE UPDATE`
//! trigger (or an equivalent rule) that keeps the existing row when
//! `NEW.last_seen < OLD.last_seen`.

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::status::{PresenceFilter, PresenceRecord};
use crate::store::PresenceStore;

use super::types::{in_list, SupabaseConfig};

const COLUMNS: &str = "user_id,status,last_seen";

/// [`PresenceStore`] backed by a Supabase table.
pub struct SupabaseStore {
    config: SupabaseConfig,
    http: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.config.rest_url())
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.config.bearer())
            .header("Accept-Profile", &self.config.schema)
            .header("Content-Profile", &self.config.schema)
    }

    async fn fetch(&self, query: &[(&str, String)]) -> Result<Vec<PresenceRecord>, StoreError> {
        let response = self
            .request(reqwest::Method::GET)
            .query(query)
            .send()
            .await
            .map_err(send_error)?;
        let response = check_status(response).await?;
        response
            .json::<Vec<PresenceRecord>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PresenceStore for SupabaseStore {
    async fn read_status(&self, user_id: &str) -> Result<Option<PresenceRecord>, StoreError> {
        let rows = self
            .fetch(&[
                ("select", COLUMNS.to_string()),
                ("user_id", format!("eq.{user_id}")),
            ])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn write_status(&self, record: &PresenceRecord) -> Result<(), StoreError> {
        debug!(user_id = %record.user_id, status = %record.status, "upserting presence row");
        let response = self
            .request(reqwest::Method::POST)
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[record])
            .send()
            .await
            .map_err(send_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn poll_snapshot(
        &self,
        filter: &PresenceFilter,
    ) -> Result<Vec<PresenceRecord>, StoreError> {
        let mut query = vec![
            ("select", COLUMNS.to_string()),
            ("order", "user_id.asc".to_string()),
        ];
        match filter {
            PresenceFilter::All => {}
            PresenceFilter::Users(ids) if ids.is_empty() => return Ok(Vec::new()),
            PresenceFilter::Users(ids) => {
                query.push(("user_id", in_list(ids.iter().map(String::as_str))));
            }
        }
        self.fetch(&query).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn send_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let text = text.chars().take(200).collect::<String>();
    Err(StoreError::Rejected(format!("HTTP {status}: {text}")))
}
