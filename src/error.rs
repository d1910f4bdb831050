use std::fmt;

use serde::Serialize;
use ts_rs::TS;

/// Structured error type for the tour core. Tagged with a `code` so the
/// authoring frontend can match on the kind of failure and pick the right UI
/// (inline field error, "cannot delete" notice, "could not load" dialog).
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(tag = "code", content = "detail")]
#[ts(export)]
pub enum TourError {
    /// A hotspot or scene edit is missing a field its type requires.
    ValidationError { message: String },
    /// Attempt to delete something the project cannot live without.
    ProtectedResource { what: String },
    /// A navigation hotspot names a scene that no longer exists. Repaired
    /// silently by the consistency pass; only ever logged.
    ReferenceIntegrity { hotspot: u64, target: String },
    /// An image or audio payload could not be fetched or decoded.
    AssetLoad {
        scene: String,
        path: String,
        message: String,
    },
    /// A project document could not be parsed. Nothing was applied.
    Serialization { message: String },
    NotFound { what: String },
    IoError { message: String },
    HostError { message: String },
}

impl TourError {
    pub fn validation(message: impl Into<String>) -> Self {
        TourError::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        TourError::NotFound { what: what.into() }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        TourError::Serialization {
            message: message.into(),
        }
    }
}

impl fmt::Display for TourError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TourError::ValidationError { message } => write!(f, "{message}"),
            TourError::ProtectedResource { what } => write!(f, "{what} cannot be deleted"),
            TourError::ReferenceIntegrity { hotspot, target } => {
                write!(f, "Hotspot {hotspot} points at missing scene '{target}'")
            }
            TourError::AssetLoad {
                scene,
                path,
                message,
            } => write!(f, "Could not load '{path}' for scene '{scene}': {message}"),
            TourError::Serialization { message } => {
                write!(f, "Could not load project: {message}")
            }
            TourError::NotFound { what } => write!(f, "{what} not found"),
            TourError::IoError { message } => write!(f, "I/O error: {message}"),
            TourError::HostError { message } => write!(f, "Hosting error: {message}"),
        }
    }
}

impl std::error::Error for TourError {}

impl From<std::io::Error> for TourError {
    fn from(e: std::io::Error) -> Self {
        TourError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<crate::project::StoreError> for TourError {
    fn from(e: crate::project::StoreError) -> Self {
        match e {
            crate::project::StoreError::Io(io_err) => TourError::IoError {
                message: io_err.to_string(),
            },
            crate::project::StoreError::Json(json_err) => TourError::Serialization {
                message: json_err.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for TourError {
    fn from(e: reqwest::Error) -> Self {
        TourError::HostError {
            message: e.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for TourError {
    fn from(e: zip::result::ZipError) -> Self {
        TourError::IoError {
            message: e.to_string(),
        }
    }
}

/// Allow converting TourError to String for CLI output and HTTP bodies.
impl From<TourError> for String {
    fn from(e: TourError) -> String {
        e.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_code_tag() {
        let err = TourError::ProtectedResource {
            what: "Default scene".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "ProtectedResource");
        assert_eq!(json["detail"]["what"], "Default scene");
    }

    #[test]
    fn display_names_scene_and_path() {
        let err = TourError::AssetLoad {
            scene: "scene_2".into(),
            path: "./images/scene_2.jpg".into(),
            message: "404".into(),
        };
        let text = err.to_string();
        assert!(text.contains("scene_2"));
        assert!(text.contains("./images/scene_2.jpg"));
    }
}
