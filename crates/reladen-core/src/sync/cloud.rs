//! Cloud table API boundary and its PostgREST implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::models::Table;
use crate::util::{normalize_endpoint, normalize_text_option, parse_api_error};

use super::columns::{from_cloud_row, millis_to_rfc3339, to_cloud_row};

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("Invalid cloud configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Cloud HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Cloud API error: {0}")]
    Api(String),
    #[error("Cloud rejected credentials: {0}")]
    Unauthorized(String),
    #[error("Invalid cloud payload: {0}")]
    InvalidPayload(String),
}

impl CloudError {
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

pub type CloudResult<T> = Result<T, CloudError>;

/// Remote tables keyed by `id`, exchanging rows in local document form.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Insert or replace `rows` by id.
    async fn upsert(&self, table: Table, rows: &[Value]) -> CloudResult<()>;

    /// Rows with `updatedAt > since`, oldest first. `None` selects everything.
    async fn select_since(&self, table: Table, since: Option<i64>) -> CloudResult<Vec<Value>>;
}

/// PostgREST tables under `{base_url}/rest/v1`.
#[derive(Clone)]
pub struct RestCloudTables {
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for RestCloudTables {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RestCloudTables")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl RestCloudTables {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        access_token: Option<String>,
    ) -> CloudResult<Self> {
        let base_url =
            normalize_endpoint(&base_url.into()).map_err(CloudError::InvalidConfiguration)?;
        let anon_key = normalize_text_option(Some(anon_key.into())).ok_or_else(|| {
            CloudError::InvalidConfiguration("anon key must not be empty".to_string())
        })?;
        Ok(Self {
            base_url,
            anon_key,
            access_token: normalize_text_option(access_token),
            client: reqwest::Client::builder().build()?,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }

    async fn check(response: reqwest::Response) -> CloudResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = parse_api_error(status.as_u16(), &body);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(CloudError::Unauthorized(message))
        } else {
            Err(CloudError::Api(message))
        }
    }
}

#[async_trait]
impl CloudApi for RestCloudTables {
    async fn upsert(&self, table: Table, rows: &[Value]) -> CloudResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let body = rows
            .iter()
            .cloned()
            .map(to_cloud_row)
            .collect::<CloudResult<Vec<_>>>()?;

        let response = self
            .request(self.client.post(self.table_url(table)))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn select_since(&self, table: Table, since: Option<i64>) -> CloudResult<Vec<Value>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "updated_at.asc".to_string()),
        ];
        if let Some(since) = since {
            query.push(("updated_at", format!("gt.{}", millis_to_rfc3339(since)?)));
        }

        let response = self
            .request(self.client.get(self.table_url(table)))
            .query(&query)
            .send()
            .await?;
        let rows: Vec<Value> = Self::check(response).await?.json().await?;
        Ok(translate_rows(table, rows))
    }
}

/// Cloud rows to local documents, dropping rows that cannot be translated.
fn translate_rows(table: Table, rows: Vec<Value>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| match from_cloud_row(row) {
            Ok(row) => Some(row),
            Err(error) => {
                tracing::warn!("Skipping untranslatable {} row from cloud: {}", table, error);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_new_validates_configuration() {
        assert!(RestCloudTables::new("example.supabase.co", "anon", None).is_err());
        assert!(RestCloudTables::new("https://x.supabase.co", "  ", None).is_err());

        let tables =
            RestCloudTables::new("https://x.supabase.co/", "anon", Some("jwt".into())).unwrap();
        assert_eq!(
            tables.table_url(Table::TopicThreads),
            "https://x.supabase.co/rest/v1/topic_threads"
        );
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let tables =
            RestCloudTables::new("https://x.supabase.co", "anon-key", Some("user-jwt".into()))
                .unwrap();
        let debug = format!("{tables:?}");
        assert!(!debug.contains("anon-key"));
        assert!(!debug.contains("user-jwt"));
    }

    #[test]
    fn test_translate_rows_skips_bad_rows() {
        let rows = vec![
            json!({ "id": "bad", "updated_at": null }),
            json!({ "id": "r1", "updated_at": "2023-11-14T22:13:20.123Z", "trust_to_player": 50 }),
            json!("not-an-object"),
        ];

        let translated = translate_rows(Table::Residents, rows);

        assert_eq!(
            translated,
            vec![json!({ "id": "r1", "updatedAt": 1_700_000_000_123_i64, "trustToPlayer": 50 })]
        );
    }

    #[test]
    fn test_unauthorized_classification() {
        assert!(CloudError::Unauthorized("JWT expired (401)".into()).is_unauthenticated());
        assert!(!CloudError::Api("bad request (400)".into()).is_unauthenticated());
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires a reachable PostgREST endpoint"]
    async fn test_select_since_against_live_endpoint() {
        let url = std::env::var("RELADEN_CLOUD_URL").unwrap();
        let key = std::env::var("RELADEN_CLOUD_ANON_KEY").unwrap();
        let tables = RestCloudTables::new(url, key, std::env::var("RELADEN_CLOUD_TOKEN").ok())
            .unwrap();
        let rows = tables.select_since(Table::Residents, Some(0)).await.unwrap();
        assert!(rows.iter().all(|row| row["updatedAt"].is_i64()));
    }
}
