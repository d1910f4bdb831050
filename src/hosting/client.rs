//! HTTP client for the hosting service, used to publish finished bundles.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::server::HostResponse;
use super::store::UploadRecord;
use crate::error::TourError;
use crate::export::Bundle;

/// Response envelope written by the hosting server.
#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Outcome of [`HostClient::publish`].
#[derive(Debug, Clone, Serialize)]
pub struct Published {
    pub upload: UploadRecord,
    /// Absolute URL of the hosted tour, when a path was requested.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HostClient {
    client: reqwest::Client,
    base: reqwest::Url,
}

impl HostClient {
    pub fn new(base: &str) -> Result<Self, TourError> {
        let base = reqwest::Url::parse(base).map_err(|e| TourError::HostError {
            message: format!("Invalid hosting URL '{base}': {e}"),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, TourError> {
        self.base.join(path).map_err(|e| TourError::HostError {
            message: format!("Invalid hosting path '{path}': {e}"),
        })
    }

    async fn envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, TourError> {
        let status = response.status();
        let envelope: Envelope<T> = response.json().await.map_err(|e| TourError::HostError {
            message: format!("Unexpected response ({status}): {e}"),
        })?;
        if envelope.ok {
            Ok(envelope.data)
        } else {
            Err(TourError::HostError {
                message: envelope
                    .error
                    .unwrap_or_else(|| format!("Request failed with {status}")),
            })
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TourError> {
        Self::envelope(response).await?.ok_or_else(|| TourError::HostError {
            message: "Response carried no data".into(),
        })
    }

    pub async fn upload(&self, author: &str, zip: Vec<u8>) -> Result<UploadRecord, TourError> {
        let response = self
            .client
            .post(self.url("/api/uploads")?)
            .query(&[("author", author)])
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .body(zip)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn list(&self) -> Result<Vec<UploadRecord>, TourError> {
        let response = self.client.get(self.url("/api/uploads")?).send().await?;
        Self::decode(response).await
    }

    /// Host an upload under `path`. Returns the absolute URL of the tour.
    pub async fn host(&self, filename: &str, path: &str) -> Result<String, TourError> {
        let response = self
            .client
            .post(self.url(&format!("/api/uploads/{filename}/host"))?)
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await?;
        let hosted: HostResponse = Self::decode(response).await?;
        Ok(self.url(&hosted.url)?.to_string())
    }

    pub async fn unhost(&self, filename: &str) -> Result<(), TourError> {
        let response = self
            .client
            .post(self.url(&format!("/api/uploads/{filename}/unhost"))?)
            .send()
            .await?;
        Self::envelope::<serde_json::Value>(response).await.map(|_| ())
    }

    pub async fn delete(&self, filename: &str) -> Result<UploadRecord, TourError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/uploads/{filename}"))?)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Zip `bundle`, upload it for `author`, and host it when `path` is given.
    pub async fn publish(
        &self,
        bundle: &Bundle,
        author: &str,
        path: Option<&str>,
    ) -> Result<Published, TourError> {
        let zip = bundle.to_zip()?;
        log::info!("Uploading {} byte bundle for {author}", zip.len());
        let upload = self.upload(author, zip).await?;
        let url = match path {
            Some(path) => Some(self.host(&upload.filename, path).await?),
            None => None,
        };
        Ok(Published { upload, url })
    }
}
