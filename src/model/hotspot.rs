use std::fmt;

use serde::{Deserialize, Serialize};

use super::asset::AssetRef;
use super::scene::SceneId;
use crate::error::TourError;

/// Hotspot identity. Unique across the whole project, not just one scene.
///
/// `0` means "not assigned yet"; the consistency pass replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HotspotId(pub u64);

impl HotspotId {
    pub const UNASSIGNED: HotspotId = HotspotId(0);

    pub fn is_assigned(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for HotspotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position in the panorama's 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HotspotKind {
    Text,
    Audio,
    TextAudio,
    Navigation,
}

impl HotspotKind {
    pub const ALL: [HotspotKind; 4] = [
        HotspotKind::Text,
        HotspotKind::Audio,
        HotspotKind::TextAudio,
        HotspotKind::Navigation,
    ];

    /// Wire name as used in documents (`"text-audio"` etc.).
    pub fn as_str(self) -> &'static str {
        match self {
            HotspotKind::Text => "text",
            HotspotKind::Audio => "audio",
            HotspotKind::TextAudio => "text-audio",
            HotspotKind::Navigation => "navigation",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub fn has_text(self) -> bool {
        matches!(self, HotspotKind::Text | HotspotKind::TextAudio)
    }
}

impl fmt::Display for HotspotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Popup size ──────────────────────────────────────────────────────

pub const POPUP_WIDTH_RANGE: (f64, f64) = (2.0, 10.0);
pub const POPUP_HEIGHT_RANGE: (f64, f64) = (1.5, 10.0);

/// Popup panel size for text-bearing hotspots, in scene units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopupSize {
    pub width: f64,
    pub height: f64,
}

impl Default for PopupSize {
    fn default() -> Self {
        Self {
            width: 4.0,
            height: 2.5,
        }
    }
}

impl PopupSize {
    /// Build a size clamped to the allowed ranges. Non-finite inputs fall back
    /// to the default for that axis.
    pub fn clamped(width: f64, height: f64) -> Self {
        let default = Self::default();
        let clamp = |v: f64, fallback: f64, (lo, hi): (f64, f64)| {
            if v.is_finite() {
                v.clamp(lo, hi)
            } else {
                fallback
            }
        };
        Self {
            width: clamp(width, default.width, POPUP_WIDTH_RANGE),
            height: clamp(height, default.height, POPUP_HEIGHT_RANGE),
        }
    }

    pub fn clamp(self) -> Self {
        Self::clamped(self.width, self.height)
    }
}

// ── Content ─────────────────────────────────────────────────────────

/// Type-dependent hotspot payload. Each variant carries exactly the fields its
/// type requires, so a text hotspot without text cannot be represented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HotspotContent {
    Text {
        text: String,
        #[serde(default)]
        popup: PopupSize,
    },
    Audio {
        audio: AssetRef,
    },
    TextAudio {
        text: String,
        audio: AssetRef,
        #[serde(default)]
        popup: PopupSize,
    },
    Navigation {
        target: SceneId,
    },
}

impl HotspotContent {
    pub fn kind(&self) -> HotspotKind {
        match self {
            HotspotContent::Text { .. } => HotspotKind::Text,
            HotspotContent::Audio { .. } => HotspotKind::Audio,
            HotspotContent::TextAudio { .. } => HotspotKind::TextAudio,
            HotspotContent::Navigation { .. } => HotspotKind::Navigation,
        }
    }

    fn clamp_popup(&mut self) {
        if let HotspotContent::Text { popup, .. } | HotspotContent::TextAudio { popup, .. } = self {
            *popup = popup.clamp();
        }
    }
}

/// A positioned interactive marker inside a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub id: HotspotId,
    /// Owning scene. Kept in sync with the scene that holds the hotspot.
    pub scene_id: SceneId,
    pub position: Position,
    pub content: HotspotContent,
}

impl Hotspot {
    pub fn kind(&self) -> HotspotKind {
        self.content.kind()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            HotspotContent::Text { text, .. } | HotspotContent::TextAudio { text, .. } => {
                Some(text)
            }
            _ => None,
        }
    }

    pub fn audio(&self) -> Option<&AssetRef> {
        match &self.content {
            HotspotContent::Audio { audio } | HotspotContent::TextAudio { audio, .. } => {
                Some(audio)
            }
            _ => None,
        }
    }

    pub fn navigation_target(&self) -> Option<&SceneId> {
        match &self.content {
            HotspotContent::Navigation { target } => Some(target),
            _ => None,
        }
    }

    pub fn popup(&self) -> Option<PopupSize> {
        match &self.content {
            HotspotContent::Text { popup, .. } | HotspotContent::TextAudio { popup, .. } => {
                Some(*popup)
            }
            _ => None,
        }
    }
}

/// Hotspot as submitted by the authoring UI, before it has an id or owner.
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotDraft {
    pub position: Position,
    pub content: HotspotContent,
}

impl HotspotDraft {
    pub fn new(position: Position, content: HotspotContent) -> Self {
        Self { position, content }
    }

    /// Check required fields for the hotspot's type. `owner` is the scene the
    /// hotspot will live in; `scene_exists` answers whether a navigation target
    /// is a current scene.
    pub fn validate(
        &self,
        owner: &SceneId,
        scene_exists: impl Fn(&SceneId) -> bool,
    ) -> Result<(), TourError> {
        if !self.position.is_finite() {
            return Err(TourError::validation("Hotspot position must be finite"));
        }
        match &self.content {
            HotspotContent::Text { text, .. } => require_text(text),
            HotspotContent::Audio { audio } => require_audio(audio),
            HotspotContent::TextAudio { text, audio, .. } => {
                require_text(text)?;
                require_audio(audio)
            }
            HotspotContent::Navigation { target } => {
                if target == owner {
                    Err(TourError::validation(
                        "A navigation hotspot cannot target its own scene",
                    ))
                } else if scene_exists(target) {
                    Ok(())
                } else {
                    Err(TourError::validation(format!(
                        "Navigation target '{target}' does not exist"
                    )))
                }
            }
        }
    }

    /// Consume into a hotspot with popup sizes clamped into range.
    pub(crate) fn into_hotspot(self, id: HotspotId, scene_id: SceneId) -> Hotspot {
        let mut content = self.content;
        content.clamp_popup();
        Hotspot {
            id,
            scene_id,
            position: self.position,
            content,
        }
    }
}

fn require_text(text: &str) -> Result<(), TourError> {
    if text.trim().is_empty() {
        Err(TourError::validation("Text is required for this hotspot type"))
    } else {
        Ok(())
    }
}

fn require_audio(audio: &AssetRef) -> Result<(), TourError> {
    if audio.is_empty() {
        Err(TourError::validation("Audio is required for this hotspot type"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn scene(id: &str) -> SceneId {
        SceneId::from(id)
    }

    #[test]
    fn popup_is_clamped_into_range() {
        assert_eq!(PopupSize::clamped(1.0, 20.0), PopupSize { width: 2.0, height: 10.0 });
        assert_eq!(PopupSize::clamped(5.0, 3.0), PopupSize { width: 5.0, height: 3.0 });
        assert_eq!(PopupSize::clamped(f64::NAN, 1.0), PopupSize { width: 4.0, height: 1.5 });
    }

    #[test]
    fn text_hotspot_requires_text() {
        let draft = HotspotDraft::new(
            Position::default(),
            HotspotContent::Text {
                text: "   ".into(),
                popup: PopupSize::default(),
            },
        );
        let err = draft.validate(&scene("scene_1"), |_| true).unwrap_err();
        assert!(matches!(err, TourError::ValidationError { .. }));
    }

    #[test]
    fn text_audio_requires_both_fields() {
        let draft = HotspotDraft::new(
            Position::default(),
            HotspotContent::TextAudio {
                text: "Hello".into(),
                audio: AssetRef::packaged(""),
                popup: PopupSize::default(),
            },
        );
        assert!(draft.validate(&scene("scene_1"), |_| true).is_err());
    }

    #[test]
    fn navigation_target_must_exist_and_differ_from_owner() {
        let to_b = HotspotDraft::new(
            Position::default(),
            HotspotContent::Navigation { target: scene("scene_2") },
        );
        assert!(to_b.validate(&scene("scene_1"), |s| s.as_str() == "scene_2").is_ok());
        assert!(to_b.validate(&scene("scene_1"), |_| false).is_err());
        assert!(to_b.validate(&scene("scene_2"), |_| true).is_err());
    }

    #[test]
    fn into_hotspot_clamps_popup() {
        let draft = HotspotDraft::new(
            Position::new(1.0, 2.0, -3.0),
            HotspotContent::Text {
                text: "Hi".into(),
                popup: PopupSize { width: 50.0, height: 0.1 },
            },
        );
        let hotspot = draft.into_hotspot(HotspotId(3), scene("scene_1"));
        assert_eq!(hotspot.popup(), Some(PopupSize { width: 10.0, height: 1.5 }));
        assert_eq!(hotspot.kind(), HotspotKind::Text);
        assert_eq!(hotspot.text(), Some("Hi"));
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in HotspotKind::ALL {
            assert_eq!(HotspotKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(HotspotKind::parse("portal"), None);
    }
}
