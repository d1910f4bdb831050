//! Fetching panorama bytes and `config.json` for the viewer, from a bundle
//! directory or over HTTP.

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::assets::is_safe_relative;
use crate::error::TourError;
use crate::model::{classify_str, AssetRef};
use crate::paths;

pub trait ImageLoader: Send + Sync {
    /// Fetch the bytes behind a runtime path (as produced by
    /// [`crate::assets::resolve_for_runtime_load`]).
    fn load(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, TourError>> + Send;
}

/// Loads bundle-relative paths from an exported bundle directory.
#[derive(Debug, Clone)]
pub struct FsImageLoader {
    root: PathBuf,
}

impl FsImageLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, path: &str) -> Result<PathBuf, TourError> {
        if !is_safe_relative(path) {
            return Err(TourError::validation(format!(
                "'{path}' is not a bundle-relative path"
            )));
        }
        Ok(self.root.join(path.trim_start_matches("./")))
    }
}

impl ImageLoader for FsImageLoader {
    async fn load(&self, path: &str) -> Result<Vec<u8>, TourError> {
        let file = self.locate(path)?;
        Ok(tokio::fs::read(&file).await?)
    }
}

/// Loads absolute URLs, and relative paths against an optional base URL.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: reqwest::Client,
    base: Option<reqwest::Url>,
}

impl HttpImageLoader {
    pub fn new(base: Option<&str>) -> Result<Self, TourError> {
        let base = base
            .map(|b| {
                // Url::join drops the last segment unless the base ends in '/'
                let b = if b.ends_with('/') { b.to_string() } else { format!("{b}/") };
                reqwest::Url::parse(&b)
            })
            .transpose()
            .map_err(|e| TourError::validation(format!("Invalid base URL: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    fn url_for(&self, path: &str) -> Result<reqwest::Url, TourError> {
        if let Ok(url) = reqwest::Url::parse(path) {
            return Ok(url);
        }
        let base = self
            .base
            .as_ref()
            .ok_or_else(|| TourError::validation(format!("No base URL for relative path '{path}'")))?;
        base.join(path.trim_start_matches("./"))
            .map_err(|e| TourError::validation(format!("Invalid path '{path}': {e}")))
    }

    pub async fn get_text(&self, path: &str) -> Result<String, TourError> {
        let url = self.url_for(path)?;
        Ok(self.client.get(url).send().await?.error_for_status()?.text().await?)
    }
}

impl ImageLoader for HttpImageLoader {
    async fn load(&self, path: &str) -> Result<Vec<u8>, TourError> {
        let url = self.url_for(path)?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Where an exported bundle lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    Dir(PathBuf),
    Url(String),
}

impl BundleSource {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            BundleSource::Url(raw.to_string())
        } else {
            BundleSource::Dir(PathBuf::from(raw))
        }
    }
}

/// Dispatches on the path: inline `data:` URIs are decoded in place, remote
/// URLs go over HTTP, everything else is read relative to the bundle.
#[derive(Debug, Clone)]
pub struct BundleImageLoader {
    fs: Option<FsImageLoader>,
    http: HttpImageLoader,
}

impl BundleImageLoader {
    pub fn new(source: &BundleSource) -> Result<Self, TourError> {
        Ok(match source {
            BundleSource::Dir(dir) => Self {
                fs: Some(FsImageLoader::new(dir)),
                http: HttpImageLoader::new(None)?,
            },
            BundleSource::Url(url) => Self {
                fs: None,
                http: HttpImageLoader::new(Some(url))?,
            },
        })
    }

    /// `config.json` text, or `None` when it cannot be fetched.
    pub async fn fetch_config(&self) -> Option<String> {
        let result = match &self.fs {
            Some(fs) => tokio::fs::read_to_string(fs.root().join(paths::CONFIG_JSON))
                .await
                .map_err(TourError::from),
            None => self.http.get_text(paths::CONFIG_JSON).await,
        };
        match result {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("Could not fetch {}: {e}", paths::CONFIG_JSON);
                None
            }
        }
    }
}

impl ImageLoader for BundleImageLoader {
    async fn load(&self, path: &str) -> Result<Vec<u8>, TourError> {
        let lower = path.to_ascii_lowercase();
        if lower.starts_with("data:") {
            return match classify_str(path)? {
                AssetRef::EmbeddedBlob { bytes, .. } => Ok(bytes),
                _ => Err(TourError::validation("Malformed data URI")),
            };
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return self.http.load(path).await;
        }
        match &self.fs {
            Some(fs) => fs.load(path).await,
            None => self.http.load(path).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_loader_reads_relative_paths_only() {
        let dir = std::env::temp_dir().join("panotour_test_fs_loader");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("images")).unwrap();
        std::fs::write(dir.join("images/scene_1.jpg"), b"pano").unwrap();

        let loader = FsImageLoader::new(&dir);
        assert_eq!(loader.load("./images/scene_1.jpg").await.unwrap(), b"pano");
        assert!(loader.load("../escape.jpg").await.is_err());
        assert!(loader.load("./images/missing.jpg").await.is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bundle_loader_decodes_data_uris_and_config() {
        let dir = std::env::temp_dir().join("panotour_test_bundle_loader");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), "{}").unwrap();

        let loader = BundleImageLoader::new(&BundleSource::Dir(dir.clone())).unwrap();
        assert_eq!(loader.load("data:image/png;base64,AQID").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(loader.fetch_config().await.as_deref(), Some("{}"));

        let _ = std::fs::remove_dir_all(&dir);
        assert!(loader.fetch_config().await.is_none());
    }

    #[test]
    fn relative_urls_join_against_base() {
        let loader = HttpImageLoader::new(Some("https://host.test/tours/museum")).unwrap();
        assert_eq!(
            loader.url_for("./images/scene_1.jpg").unwrap().as_str(),
            "https://host.test/tours/museum/images/scene_1.jpg"
        );
        let bare = HttpImageLoader::new(None).unwrap();
        assert!(bare.url_for("images/a.jpg").is_err());
    }

    #[test]
    fn bundle_source_parsing() {
        assert_eq!(
            BundleSource::parse("https://h.test/t/"),
            BundleSource::Url("https://h.test/t/".into())
        );
        assert_eq!(BundleSource::parse("out/tour"), BundleSource::Dir(PathBuf::from("out/tour")));
    }
}
