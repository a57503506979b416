//! HTTP client for the pull list service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use tracing::{debug, error};

use super::types::UpdateResponse;
use super::{Pull, PullDbError, PullList, PullLookup, PullPage, PullSource, UpdateResult};
use crate::config::PullDbConfig;
use crate::metrics;

/// Pull list service reached over its JSON API.
pub struct HttpPullSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPullSource {
    pub fn new(config: &PullDbConfig) -> Result<Self, PullDbError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get(&self, endpoint: &str, path: &str) -> Result<Response, PullDbError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Sending request for {}", path);

        let response = match self.authorized(self.client.get(&url)).send().await {
            Ok(response) => response,
            Err(e) => {
                record(endpoint, "error");
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            record(endpoint, "error");
            let body = response.text().await.unwrap_or_default();
            error!(path = %path, status = status.as_u16(), "Pull list request failed: {}", body);
            return Err(PullDbError::Fetch {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        record(endpoint, "ok");
        Ok(response)
    }

    async fn post_ids(
        &self,
        endpoint: &str,
        list_key: &str,
        ids: &[u64],
    ) -> Result<UpdateResult, PullDbError> {
        let url = format!("{}/api/pulls/update", self.base_url);
        let identifiers: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        debug!("Sending update for {} pulls ({})", identifiers.len(), list_key);

        let request = self
            .client
            .post(&url)
            .json(&json!({ list_key: identifiers }));
        let response = match self.authorized(request).send().await {
            Ok(response) => response,
            Err(e) => {
                record(endpoint, "error");
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            record(endpoint, "error");
            let message = response.text().await.unwrap_or_default();
            return Err(PullDbError::Update {
                status: status.as_u16(),
                message,
            });
        }

        record(endpoint, "ok");
        let body: UpdateResponse = response.json().await?;
        Ok(body.results.into())
    }
}

fn record(endpoint: &str, result: &str) {
    metrics::PULL_API_REQUESTS
        .with_label_values(&[endpoint, result])
        .inc();
}

/// Path of a paged listing, with the cursor appended when present.
pub(crate) fn list_path(list: PullList, cursor: Option<&str>) -> String {
    let base = format!("/api/pulls/list/{}", list.as_str());
    match cursor {
        Some(cursor) => format!("{}?position={}", base, urlencoding::encode(cursor)),
        None => base,
    }
}

#[async_trait]
impl PullSource for HttpPullSource {
    fn name(&self) -> &str {
        "pulldb"
    }

    async fn list_page(
        &self,
        list: PullList,
        cursor: Option<&str>,
    ) -> Result<PullPage, PullDbError> {
        let path = list_path(list, cursor);
        let response = self.get(list.as_str(), &path).await?;
        Ok(response.json().await?)
    }

    async fn get_pull(&self, id: u64) -> Result<Option<Pull>, PullDbError> {
        let path = format!("/api/pulls/{}/get", id);
        let response = self.get("get", &path).await?;
        let lookup: PullLookup = response.json().await?;
        Ok(lookup.results.into_iter().next().map(|envelope| envelope.pull))
    }

    async fn update(&self, ids: &[u64]) -> Result<UpdateResult, PullDbError> {
        self.post_ids("update", "pull", ids).await
    }

    async fn mark_read(&self, ids: &[u64]) -> Result<UpdateResult, PullDbError> {
        self.post_ids("read", "read", ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_path() {
        assert_eq!(list_path(PullList::Unread, None), "/api/pulls/list/unread");
        assert_eq!(
            list_path(PullList::New, Some("abc=")),
            "/api/pulls/list/new?position=abc%3D"
        );
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let source = HttpPullSource::new(&PullDbConfig {
            base_url: "https://pulldb.example.com/".to_string(),
            token: None,
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(source.base_url, "https://pulldb.example.com");
        assert_eq!(source.name(), "pulldb");
    }
}
