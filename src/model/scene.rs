use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::asset::AssetRef;
use super::hotspot::Hotspot;

/// Stable scene identity (`scene_<n>`). Never reused within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub String);

impl SceneId {
    pub const PREFIX: &'static str = "scene_";

    pub fn numbered(n: u64) -> Self {
        Self(format!("{}{n}", Self::PREFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric suffix of a `scene_<n>` id, if it has that shape.
    pub fn number(&self) -> Option<u64> {
        self.0.strip_prefix(Self::PREFIX)?.parse().ok()
    }

    /// Scene ids become bundle filenames, so they must be a single plain
    /// path component.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.contains("..")
            && !self.0.contains(['/', '\\', ':'])
            && !self.0.chars().any(char::is_control)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SceneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Camera orientation applied on scene entry, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StartingPoint {
    pub yaw: f64,
    pub pitch: f64,
    #[serde(default)]
    pub roll: f64,
}

impl StartingPoint {
    /// Yaw wrapped to (-180, 180], pitch clamped to the poles.
    pub fn normalized(self) -> Self {
        let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
        let mut yaw = finite(self.yaw) % 360.0;
        if yaw > 180.0 {
            yaw -= 360.0;
        } else if yaw <= -180.0 {
            yaw += 360.0;
        }
        Self {
            yaw,
            pitch: finite(self.pitch).clamp(-90.0, 90.0),
            roll: finite(self.roll) % 360.0,
        }
    }
}

/// Per-scene ambient sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSound {
    pub audio: AssetRef,
    pub volume: f64,
    pub enabled: bool,
}

impl GlobalSound {
    pub const DEFAULT_VOLUME: f64 = 0.5;

    pub fn new(audio: AssetRef, volume: f64, enabled: bool) -> Self {
        Self {
            audio,
            volume: clamp_volume(volume),
            enabled,
        }
    }
}

pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        GlobalSound::DEFAULT_VOLUME
    }
}

/// One panoramic image plus its hotspots, ambient sound and start orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub image: AssetRef,
    #[serde(default)]
    pub hotspots: Vec<Hotspot>,
    #[serde(default)]
    pub starting_point: Option<StartingPoint>,
    #[serde(default)]
    pub global_sound: Option<GlobalSound>,
}

impl Scene {
    pub fn new(id: SceneId, name: impl Into<String>, image: AssetRef) -> Self {
        Self {
            id,
            name: name.into(),
            image,
            hotspots: Vec::new(),
            starting_point: None,
            global_sound: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_id_numbers() {
        assert_eq!(SceneId::numbered(42).as_str(), "scene_42");
        assert_eq!(SceneId::from("scene_42").number(), Some(42));
        assert_eq!(SceneId::from("lobby").number(), None);
    }

    #[test]
    fn scene_id_path_safety() {
        assert!(SceneId::numbered(3).is_path_safe());
        assert!(SceneId::from("main-hall").is_path_safe());
        for bad in ["", "../../x", "a/b", "a\\b", "C:x", "..", "tab\there"] {
            assert!(!SceneId::from(bad).is_path_safe(), "{bad:?}");
        }
    }

    #[test]
    fn starting_point_normalizes() {
        let sp = StartingPoint {
            yaw: 270.0,
            pitch: 120.0,
            roll: 0.0,
        }
        .normalized();
        assert!((sp.yaw - -90.0).abs() < f64::EPSILON);
        assert!((sp.pitch - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn volume_is_clamped() {
        let sound = GlobalSound::new(AssetRef::packaged("audio/a.mp3"), 3.0, true);
        assert!((sound.volume - 1.0).abs() < f64::EPSILON);
        assert!((clamp_volume(f64::NAN) - GlobalSound::DEFAULT_VOLUME).abs() < f64::EPSILON);
    }
}
