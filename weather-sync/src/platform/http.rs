//! REST client for the platform API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::{CreateAssetRequest, DataRecord, DataSubtype, PlatformApi, PlatformAsset, UserNotification};
use crate::{Error, Result};

const API_KEY_HEADER: &str = "X-API-Key";

/// Wire form of a data upsert.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataPayload<'a> {
    asset_id: i64,
    subtype: DataSubtype,
    timestamp: DateTime<Utc>,
    data: &'a BTreeMap<String, Value>,
    client_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedAsset {
    id: i64,
}

pub struct HttpPlatformClient {
    client: Client,
    base_url: String,
    client_reference: String,
}

impl HttpPlatformClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: &str,
        client_reference: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        openweather::install_rustls_provider();

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_token)
            .map_err(|e| Error::config(format!("API_TOKEN is not a valid header value: {e}")))?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build reqwest client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_reference: client_reference.into(),
        })
    }

    pub fn client_reference(&self) -> &str {
        &self.client_reference
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(Error::not_found(what, body));
    }
    Err(Error::platform(format!("{what} request failed: {status} - {body}")))
}

#[async_trait]
impl PlatformApi for HttpPlatformClient {
    async fn upsert_data(&self, record: &DataRecord) -> Result<()> {
        let payload = DataPayload {
            asset_id: record.asset_id,
            subtype: record.subtype,
            timestamp: record.timestamp,
            data: &record.data,
            client_reference: &self.client_reference,
        };

        trace!(asset_id = record.asset_id, subtype = ?record.subtype, "Upserting data");
        let response = self.client.put(self.url("/data")).json(&payload).send().await?;
        check_status(response, "Data").await?;
        Ok(())
    }

    async fn get_asset(&self, asset_id: i64) -> Result<PlatformAsset> {
        let response = self
            .client
            .get(self.url(&format!("/assets/{asset_id}")))
            .send()
            .await?;
        let response = check_status(response, "Asset").await?;
        Ok(response.json().await?)
    }

    async fn create_asset(&self, request: &CreateAssetRequest) -> Result<i64> {
        let response = self
            .client
            .put(self.url("/assets"))
            .json(request)
            .send()
            .await?;
        let created: CreatedAsset = check_status(response, "Asset").await?.json().await?;
        debug!(
            asset_id = created.id,
            project_id = %request.project_id,
            asset_type = %request.asset_type,
            "Asset created on platform"
        );
        Ok(created.id)
    }

    async fn notify_user(&self, notification: &UserNotification) -> Result<()> {
        let response = self
            .client
            .post(self.url("/notifications"))
            .json(notification)
            .send()
            .await?;
        check_status(response, "Notification").await?;
        Ok(())
    }
}
