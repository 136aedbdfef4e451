//! HTTP client for the Notion serverless proxy.

use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::eyre;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::itinerary::types::{DateRange, Record, RecordFields};

use super::api_types::{
  ApiBulkResponse, ApiDeleteResponse, ApiErrorBody, ApiFieldsPayload, ApiModifiedTimeResponse,
  ApiQueryResponse, ApiRecord,
};
use super::{BulkError, BulkOutcome, BulkUpdateRequest, FetchedCollection, RemoteGateway};

/// Client for the serverless functions fronting the Notion API.
///
/// Every call carries an explicit timeout; bulk updates get the longer
/// configured bound. Timeouts and connection failures surface as
/// [`Error::GatewayUnreachable`], definitive HTTP errors as
/// [`Error::RemoteRejected`].
#[derive(Clone)]
pub struct NotionProxyClient {
  http: reqwest::Client,
  base_url: Url,
  token: String,
  timeout: Duration,
  bulk_timeout: Duration,
}

impl NotionProxyClient {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    let token = Config::get_api_token()?;

    let base_url = Url::parse(&config.gateway.base_url)
      .map_err(|e| eyre!("Invalid gateway base_url {}: {}", config.gateway.base_url, e))?;

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      token,
      timeout: Duration::from_secs(config.gateway.timeout_secs),
      bulk_timeout: Duration::from_secs(config.gateway.bulk_timeout_secs),
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    // Keep any path prefix on base_url ("https://host/api" + "/query").
    let mut url = self.base_url.clone();
    {
      let mut segments = url
        .path_segments_mut()
        .map_err(|_| Error::Internal("gateway base_url cannot be a base".into()))?;
      segments.pop_if_empty().push(path);
    }
    Ok(url)
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
    let response = self
      .http
      .get(self.endpoint(path)?)
      .bearer_auth(&self.token)
      .query(query)
      .timeout(self.timeout)
      .send()
      .await
      .map_err(transport_error)?;

    decode(check_status(response).await?).await
  }

  async fn post_json<T: DeserializeOwned>(
    &self,
    path: &str,
    body: &serde_json::Value,
    timeout: Duration,
  ) -> Result<T> {
    let response = self
      .http
      .post(self.endpoint(path)?)
      .bearer_auth(&self.token)
      .json(body)
      .timeout(timeout)
      .send()
      .await
      .map_err(transport_error)?;

    decode(check_status(response).await?).await
  }
}

fn transport_error(e: reqwest::Error) -> Error {
  if e.is_decode() {
    Error::RemoteRejected(format!("malformed gateway response: {}", e))
  } else {
    // Timeouts, DNS, refused connections, TLS trouble.
    Error::GatewayUnreachable(e.to_string())
  }
}

/// Turn non-2xx responses into `RemoteRejected`, using the proxy's error
/// body when it has one.
async fn check_status(response: Response) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let message = response
    .json::<ApiErrorBody>()
    .await
    .ok()
    .and_then(ApiErrorBody::into_message)
    .unwrap_or_else(|| status.to_string());

  if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
    Err(Error::GatewayUnreachable(message))
  } else {
    Err(Error::RemoteRejected(message))
  }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
  response.json::<T>().await.map_err(transport_error)
}

#[async_trait]
impl RemoteGateway for NotionProxyClient {
  async fn remote_modified_time(&self, collection_id: &str) -> Result<String> {
    let response: ApiModifiedTimeResponse = self
      .get_json("modified-time", &[("collectionId", collection_id)])
      .await?;
    Ok(response.last_edited_time)
  }

  async fn fetch_collection(
    &self,
    collection_id: &str,
    range: Option<&DateRange>,
  ) -> Result<FetchedCollection> {
    let mut body = json!({ "collectionId": collection_id });
    if let Some(range) = range {
      body["startDate"] = json!(range.start);
      body["endDate"] = json!(range.end);
    }

    let response: ApiQueryResponse = self.post_json("query", &body, self.timeout).await?;

    Ok(FetchedCollection {
      items: response.items.into_iter().map(ApiRecord::into_record).collect(),
      collection_name: response.collection_name,
      remote_modified_time: response.last_edited_time,
    })
  }

  async fn create_record(&self, collection_id: &str, fields: &RecordFields) -> Result<Record> {
    let body = json!({
      "collectionId": collection_id,
      "fields": ApiFieldsPayload::from(fields),
    });

    let response: ApiRecord = self.post_json("create", &body, self.timeout).await?;
    Ok(response.into_record())
  }

  async fn update_record(&self, id: &str, fields: &RecordFields) -> Result<Record> {
    let body = json!({
      "id": id,
      "fields": ApiFieldsPayload::from(fields),
    });

    let response: ApiRecord = self.post_json("update", &body, self.timeout).await?;
    Ok(response.into_record())
  }

  async fn delete_record(&self, id: &str) -> Result<()> {
    let body = json!({ "id": id });
    let _response: ApiDeleteResponse = self.post_json("delete", &body, self.timeout).await?;
    Ok(())
  }

  /// The proxy has a batch endpoint that applies updates server-side with
  /// the same per-item isolation; one round trip under the bulk bound beats
  /// N sequential calls.
  async fn bulk_update(&self, updates: &[BulkUpdateRequest]) -> Result<BulkOutcome> {
    let payload: Vec<serde_json::Value> = updates
      .iter()
      .map(|u| {
        json!({
          "id": u.id,
          "fields": ApiFieldsPayload::from(&u.fields),
        })
      })
      .collect();

    let body = json!({ "updates": payload });
    let response: ApiBulkResponse = self
      .post_json("bulk-update", &body, self.bulk_timeout)
      .await?;

    Ok(BulkOutcome {
      total: response.total,
      successful: response.successful,
      failed: response.failed,
      results: response
        .results
        .into_iter()
        .map(ApiRecord::into_record)
        .collect(),
      errors: response
        .errors
        .into_iter()
        .map(|e| BulkError {
          id: e.id,
          reason: e.error,
        })
        .collect(),
    })
  }
}
