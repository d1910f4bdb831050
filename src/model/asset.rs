use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::TourError;

/// Where a media resource's bytes live.
///
/// Ambiguous raw strings are classified exactly once, at the authoring or
/// import boundary, via [`classify`]. Everything past that boundary matches on
/// the tag instead of sniffing prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AssetRef {
    /// `http://` or `https://` URL, left untouched on export.
    RemoteUrl { url: String },
    /// Bytes picked from a local file (or decoded from a `data:` URI).
    EmbeddedBlob {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        filename: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Path relative to the bundle root, e.g. `images/lobby.jpg`.
    PackagedPath { path: String },
}

/// Unclassified media input as it arrives from the UI or a document.
#[derive(Debug, Clone)]
pub enum RawAsset {
    Text(String),
    Blob {
        bytes: Vec<u8>,
        filename: String,
        mime_type: Option<String>,
    },
}

const DATA_SCHEME: &str = "data:";

/// Classify a raw media value into its tagged form.
pub fn classify(raw: RawAsset) -> Result<AssetRef, TourError> {
    match raw {
        RawAsset::Blob {
            bytes,
            filename,
            mime_type,
        } => {
            if bytes.is_empty() {
                return Err(TourError::validation(format!("File '{filename}' is empty")));
            }
            let filename = sanitize_filename(&filename);
            let mime_type = mime_type.unwrap_or_else(|| mime_for_filename(&filename).to_string());
            Ok(AssetRef::EmbeddedBlob {
                bytes,
                filename,
                mime_type,
            })
        }
        RawAsset::Text(text) => classify_str(&text),
    }
}

/// Classify a string value (URL, `data:` URI or relative path).
pub fn classify_str(text: &str) -> Result<AssetRef, TourError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TourError::validation("Media reference is empty"));
    }
    let lower = text.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(AssetRef::RemoteUrl {
            url: text.to_string(),
        });
    }
    if lower.starts_with(DATA_SCHEME) {
        return decode_data_uri(text);
    }
    Ok(AssetRef::PackagedPath {
        path: text.trim_start_matches("./").to_string(),
    })
}

fn decode_data_uri(uri: &str) -> Result<AssetRef, TourError> {
    let body = uri.get(DATA_SCHEME.len()..).unwrap_or_default();
    let (header, payload) = body
        .split_once(',')
        .ok_or_else(|| TourError::validation("Malformed data URI: missing ','"))?;
    let mut parts = header.split(';');
    let mime_type = parts
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let is_base64 = parts.any(|p| p.eq_ignore_ascii_case("base64"));
    let bytes = if is_base64 {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| TourError::validation(format!("Malformed data URI: {e}")))?
    } else {
        payload.as_bytes().to_vec()
    };
    if bytes.is_empty() {
        return Err(TourError::validation("Data URI carries no bytes"));
    }
    let filename = format!("embedded.{}", extension_for_mime(&mime_type));
    Ok(AssetRef::EmbeddedBlob {
        bytes,
        filename,
        mime_type,
    })
}

impl AssetRef {
    pub fn remote(url: impl Into<String>) -> Self {
        AssetRef::RemoteUrl { url: url.into() }
    }

    pub fn packaged(path: impl Into<String>) -> Self {
        AssetRef::PackagedPath { path: path.into() }
    }

    pub fn blob(bytes: Vec<u8>, filename: &str) -> Self {
        let filename = sanitize_filename(filename);
        AssetRef::EmbeddedBlob {
            mime_type: mime_for_filename(&filename).to_string(),
            bytes,
            filename,
        }
    }

    /// True when there is nothing to load behind this reference.
    pub fn is_empty(&self) -> bool {
        match self {
            AssetRef::RemoteUrl { url } => url.trim().is_empty(),
            AssetRef::EmbeddedBlob { bytes, .. } => bytes.is_empty(),
            AssetRef::PackagedPath { path } => path.trim().is_empty(),
        }
    }

    /// Self-contained string form: blobs become `data:` URIs. Used by template
    /// documents, which must round-trip without a bundle directory.
    pub fn to_inline_string(&self) -> String {
        match self {
            AssetRef::RemoteUrl { url } => url.clone(),
            AssetRef::EmbeddedBlob {
                bytes, mime_type, ..
            } => format!("{DATA_SCHEME}{mime_type};base64,{}", STANDARD.encode(bytes)),
            AssetRef::PackagedPath { path } => path.clone(),
        }
    }

    /// Short human label for logs and listings (never dumps blob bytes).
    pub fn describe(&self) -> String {
        match self {
            AssetRef::RemoteUrl { url } => url.clone(),
            AssetRef::EmbeddedBlob {
                bytes, filename, ..
            } => format!("{filename} ({} bytes, embedded)", bytes.len()),
            AssetRef::PackagedPath { path } => path.clone(),
        }
    }
}

/// Reduce a user-supplied filename to a single safe path component.
pub fn sanitize_filename(name: &str) -> String {
    let leaf = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = leaf
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "asset".to_string()
    } else {
        cleaned
    }
}

fn mime_for_filename(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/mp4" => "m4a",
        _ => "bin",
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn classifies_remote_urls() {
        let asset = classify_str("https://example.com/pano.jpg").unwrap();
        assert_eq!(asset, AssetRef::remote("https://example.com/pano.jpg"));
        assert!(matches!(
            classify_str("HTTP://EXAMPLE.COM/a.mp3").unwrap(),
            AssetRef::RemoteUrl { .. }
        ));
    }

    #[test]
    fn classifies_packaged_paths() {
        assert_eq!(
            classify_str("./images/scene_1.jpg").unwrap(),
            AssetRef::packaged("images/scene_1.jpg")
        );
        assert_eq!(classify_str("audio/a.mp3").unwrap(), AssetRef::packaged("audio/a.mp3"));
    }

    #[test]
    fn decodes_base64_data_uri() {
        let asset = classify_str("data:audio/mpeg;base64,AAEC").unwrap();
        match asset {
            AssetRef::EmbeddedBlob {
                bytes,
                filename,
                mime_type,
            } => {
                assert_eq!(bytes, vec![0, 1, 2]);
                assert_eq!(filename, "embedded.mp3");
                assert_eq!(mime_type, "audio/mpeg");
            }
            other => panic!("expected blob, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_and_malformed_values() {
        assert!(classify_str("   ").is_err());
        assert!(classify_str("data:image/png;base64").is_err());
        assert!(classify(RawAsset::Blob {
            bytes: vec![],
            filename: "x.jpg".into(),
            mime_type: None,
        })
        .is_err());
    }

    #[test]
    fn blob_keeps_sanitized_filename_and_guesses_mime() {
        let asset = classify(RawAsset::Blob {
            bytes: vec![1, 2, 3],
            filename: "C:\\Users\\me\\My Clip.mp3".into(),
            mime_type: None,
        })
        .unwrap();
        match asset {
            AssetRef::EmbeddedBlob {
                filename,
                mime_type,
                ..
            } => {
                assert_eq!(filename, "My_Clip.mp3");
                assert_eq!(mime_type, "audio/mpeg");
            }
            other => panic!("expected blob, got {other:?}"),
        }
    }

    #[test]
    fn inline_string_round_trips_through_classify() {
        let blob = AssetRef::blob(vec![9, 8, 7, 6], "room.jpg");
        let inline = blob.to_inline_string();
        assert!(inline.starts_with("data:image/jpeg;base64,"));
        match classify_str(&inline).unwrap() {
            AssetRef::EmbeddedBlob { bytes, .. } => assert_eq!(bytes, vec![9, 8, 7, 6]),
            other => panic!("expected blob, got {other:?}"),
        }
    }

    #[test]
    fn persisted_form_is_tagged() {
        let json = serde_json::to_value(AssetRef::blob(vec![0, 1, 2], "a.png")).unwrap();
        assert_eq!(json["kind"], "embeddedBlob");
        assert_eq!(json["bytes"], "AAEC");
        assert_eq!(json["mimeType"], "image/png");
        let back: AssetRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, AssetRef::blob(vec![0, 1, 2], "a.png"));
    }
}
