//! Portable project documents: `config.json` inside an exported bundle and the
//! author-facing template file. Both share one shape.
//!
//! Asset references travel as plain strings here; they are classified back
//! into [`AssetRef`] on import. Which string a reference becomes depends on the
//! caller (packaged path for bundles, inline `data:` URI for templates), so
//! [`ProjectDocument::build`] takes the rewriting step as a closure.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::assets::AssetSlot;
use crate::model::{AssetRef, CustomStyles, Hotspot, Position, Project, SceneId, StartingPoint};
use crate::settings::ViewerTiming;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProjectDocument {
    #[serde(default)]
    pub name: String,
    /// RFC 3339 creation timestamp.
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Absent in legacy single-scene documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenes: Option<IndexMap<String, SceneDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_scene: Option<String>,
    /// Flat mirror of every hotspot. In legacy documents this is the only
    /// hotspot list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotspots: Option<Vec<HotspotDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_styles: Option<CustomStyles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotspot_id_counter: Option<u64>,
    /// Panorama of a legacy single-scene document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerTiming>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub hotspots: Vec<HotspotDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_point: Option<StartingPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_sound: Option<GlobalSoundDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct GlobalSoundDocument {
    pub audio: String,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_volume() -> f64 {
    crate::model::GlobalSound::DEFAULT_VOLUME
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct HotspotDocument {
    /// Kept loose: older documents carry strings, floats or nothing at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub position: PositionDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popup_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popup_height: Option<f64>,
}

/// Positions are written as `{x,y,z}` and read from any of the three forms
/// found in the wild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
pub enum PositionDocument {
    Object { x: f64, y: f64, z: f64 },
    Array(Vec<f64>),
    Text(String),
}

impl Default for PositionDocument {
    fn default() -> Self {
        PositionDocument::Object {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

impl From<Position> for PositionDocument {
    fn from(p: Position) -> Self {
        PositionDocument::Object {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}

impl PositionDocument {
    /// `None` for malformed or non-finite coordinates.
    pub fn to_position(&self) -> Option<Position> {
        let position = match self {
            PositionDocument::Object { x, y, z } => Position::new(*x, *y, *z),
            PositionDocument::Array(v) => match v.as_slice() {
                [x, y, z] => Position::new(*x, *y, *z),
                _ => return None,
            },
            PositionDocument::Text(s) => {
                let parts: Vec<f64> = s
                    .split_whitespace()
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .ok()?;
                match parts.as_slice() {
                    [x, y, z] => Position::new(*x, *y, *z),
                    _ => return None,
                }
            }
        };
        position.is_finite().then_some(position)
    }
}

impl ProjectDocument {
    /// Serialize `project` into document form.
    ///
    /// `entry` becomes `currentScene`. `asset_path` turns each reference into
    /// the string stored in the document.
    pub fn build(
        project: &Project,
        styles: &CustomStyles,
        entry: &SceneId,
        mut asset_path: impl FnMut(&AssetRef, AssetSlot<'_>) -> String,
    ) -> Self {
        let mut scenes = IndexMap::new();
        let mut flat = Vec::new();
        for scene in project.scenes() {
            let image = asset_path(&scene.image, AssetSlot::SceneImage { scene: &scene.id });
            let hotspots: Vec<HotspotDocument> = scene
                .hotspots
                .iter()
                .map(|h| hotspot_document(h, &mut asset_path))
                .collect();
            flat.extend(hotspots.iter().cloned());
            let global_sound = scene.global_sound.as_ref().map(|sound| GlobalSoundDocument {
                audio: asset_path(&sound.audio, AssetSlot::GlobalSound { scene: &scene.id }),
                volume: sound.volume,
                enabled: sound.enabled,
            });
            scenes.insert(
                scene.id.to_string(),
                SceneDocument {
                    name: scene.name.clone(),
                    image,
                    hotspots,
                    starting_point: scene.starting_point,
                    global_sound,
                },
            );
        }
        Self {
            name: project.name.clone(),
            created: Some(project.created_at.to_rfc3339()),
            scenes: Some(scenes),
            current_scene: Some(entry.to_string()),
            hotspots: Some(flat),
            custom_styles: Some(styles.clone()),
            hotspot_id_counter: Some(project.hotspot_id_counter()),
            image: None,
            viewer: None,
        }
    }

    /// Legacy documents carry a flat hotspot list and no scene map.
    pub fn is_legacy(&self) -> bool {
        self.scenes.is_none()
    }
}

fn hotspot_document(
    hotspot: &Hotspot,
    asset_path: &mut impl FnMut(&AssetRef, AssetSlot<'_>) -> String,
) -> HotspotDocument {
    let popup = hotspot.popup();
    HotspotDocument {
        id: Some(serde_json::Value::from(hotspot.id.0)),
        kind: hotspot.kind().as_str().to_string(),
        position: hotspot.position.into(),
        scene_id: Some(hotspot.scene_id.to_string()),
        text: hotspot.text().map(str::to_string),
        audio: hotspot.audio().map(|audio| {
            asset_path(
                audio,
                AssetSlot::HotspotAudio {
                    scene: &hotspot.scene_id,
                    hotspot: hotspot.id,
                },
            )
        }),
        navigation_target: hotspot.navigation_target().map(ToString::to_string),
        popup_width: popup.map(|p| p.width),
        popup_height: popup.map(|p| p.height),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{HotspotContent, HotspotDraft, PopupSize};

    #[test]
    fn positions_accept_three_forms() {
        let forms = [
            serde_json::json!({ "x": 1.0, "y": 2.0, "z": -3.0 }),
            serde_json::json!([1.0, 2.0, -3.0]),
            serde_json::json!("1 2 -3"),
        ];
        for form in forms {
            let doc: PositionDocument = serde_json::from_value(form).unwrap();
            assert_eq!(doc.to_position(), Some(Position::new(1.0, 2.0, -3.0)));
        }
        let short: PositionDocument = serde_json::from_value(serde_json::json!([1.0])).unwrap();
        assert!(short.to_position().is_none());
        let junk = PositionDocument::Text("one two three".into());
        assert!(junk.to_position().is_none());
    }

    #[test]
    fn build_writes_scene_map_and_flat_mirror() {
        let mut project = Project::with_default_scene("Museum");
        let a = project.default_scene_id().clone();
        let b = project
            .add_scene("Gallery", AssetRef::remote("https://x.test/g.jpg"))
            .unwrap();
        project
            .add_hotspot(
                &a,
                HotspotDraft::new(
                    Position::new(1.0, 1.0, 1.0),
                    HotspotContent::Text {
                        text: "Hi".into(),
                        popup: PopupSize::default(),
                    },
                ),
            )
            .unwrap();
        project
            .add_hotspot(
                &b,
                HotspotDraft::new(Position::default(), HotspotContent::Navigation { target: a.clone() }),
            )
            .unwrap();

        let doc = ProjectDocument::build(&project, &CustomStyles::default(), &a, |asset, _| {
            asset.to_inline_string()
        });

        assert!(!doc.is_legacy());
        let scenes = doc.scenes.as_ref().unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes["scene_2"].image, "https://x.test/g.jpg");
        assert_eq!(doc.hotspots.as_ref().unwrap().len(), 2);
        assert_eq!(doc.current_scene.as_deref(), Some("scene_1"));

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["scenes"]["scene_1"]["hotspots"][0]["type"], "text");
        assert_eq!(json["scenes"]["scene_1"]["hotspots"][0]["popupWidth"], 4.0);
        assert_eq!(json["scenes"]["scene_2"]["hotspots"][0]["navigationTarget"], "scene_1");
        assert_eq!(json["hotspotIdCounter"], 2);
    }

    #[test]
    fn legacy_document_parses() {
        let json = r#"{ "hotspots": [ { "id": 3, "type": "text", "text": "x", "position": "0 1 2" } ] }"#;
        let doc: ProjectDocument = serde_json::from_str(json).unwrap();
        assert!(doc.is_legacy());
        assert_eq!(doc.hotspots.unwrap()[0].kind, "text");
    }
}
