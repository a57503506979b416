//! Google Cloud Storage JSON API client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{ObjectStore, RemoteFileDescriptor, StorageError};
use crate::config::StorageConfig;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<RemoteFileDescriptor>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
}

/// Object store backed by a GCS bucket.
pub struct GcsObjectStore {
    client: Client,
    api_base: String,
    upload_base: String,
    token: Option<String>,
}

impl GcsObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn objects_url(&self, bucket: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.api_base,
            urlencoding::encode(bucket)
        )
    }

    fn upload_url(&self, bucket: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.upload_base,
            urlencoding::encode(bucket)
        )
    }
}

/// Turn a non-success status into an error, keeping the body for context.
async fn check_status(response: Response) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StorageError::Http {
        status: status.as_u16(),
        message,
    })
}

/// Base64 MD5 digest in the form the store reports as `md5Hash`.
pub fn encode_md5(digest: md5::Digest) -> String {
    STANDARD.encode(digest.0)
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn name(&self) -> &str {
        "gcs"
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<RemoteFileDescriptor>, StorageError> {
        let url = self.objects_url(bucket);
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            debug!("Listing gs://{}/{} (page token: {:?})", bucket, prefix, page_token);
            let mut request = self.client.get(&url).query(&[("prefix", prefix)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = check_status(self.authorized(request).send().await?).await?;
            let page: ListResponse = response.json().await?;
            items.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn download(
        &self,
        descriptor: &RemoteFileDescriptor,
        destination: &Path,
    ) -> Result<u64, StorageError> {
        info!(
            "Downloading gs://{}/{} -> {}",
            descriptor.bucket,
            descriptor.object_name,
            destination.display()
        );

        let request = self.authorized(self.client.get(&descriptor.media_link));
        let mut response = check_status(request.send().await?).await?;

        let mut file = File::create(destination)
            .await
            .map_err(|e| StorageError::io(destination, e))?;
        let mut context = md5::Context::new();
        let mut written: u64 = 0;

        let result: Result<(), StorageError> = async {
            while let Some(chunk) = response.chunk().await? {
                context.consume(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| StorageError::io(destination, e))?;
                written += chunk.len() as u64;
            }
            file.flush()
                .await
                .map_err(|e| StorageError::io(destination, e))?;
            Ok(())
        }
        .await;

        let result = result.and_then(|()| match &descriptor.md5_hash {
            Some(expected) => {
                let actual = encode_md5(context.compute());
                if &actual == expected {
                    Ok(())
                } else {
                    Err(StorageError::ChecksumMismatch {
                        object: descriptor.object_name.clone(),
                        expected: expected.clone(),
                        actual,
                    })
                }
            }
            None => Ok(()),
        });

        if let Err(e) = result {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(destination).await {
                warn!(
                    "Failed to remove partial download {}: {}",
                    destination.display(),
                    remove_err
                );
            }
            return Err(e);
        }

        Ok(written)
    }

    async fn upload(
        &self,
        source: &Path,
        bucket: &str,
        object_name: &str,
        content_type: &str,
    ) -> Result<RemoteFileDescriptor, StorageError> {
        info!("Uploading {} -> gs://{}/{}", source.display(), bucket, object_name);

        let body = tokio::fs::read(source)
            .await
            .map_err(|e| StorageError::io(source, e))?;

        let request = self
            .client
            .post(self.upload_url(bucket))
            .query(&[("uploadType", "media"), ("name", object_name)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        let response = check_status(self.authorized(request).send().await?).await?;
        Ok(response.json().await?)
    }
}
