//! Document → project. Accepts the current multi-scene shape and upgrades
//! legacy single-scene documents. Parsing is all-or-nothing: either a
//! complete, repaired project comes back or a `Serialization` error does.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::consistency::RepairReport;
use crate::document::{GlobalSoundDocument, HotspotDocument, ProjectDocument, SceneDocument};
use crate::error::TourError;
use crate::model::{
    classify_str, AssetRef, CustomStyles, GlobalSound, Hotspot, HotspotContent, HotspotId,
    HotspotKind, PopupSize, Project, Scene, SceneId,
};
use crate::paths;
use crate::settings::ViewerTiming;

/// Which document shape an import came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    MultiScene,
    LegacySingleScene,
}

#[derive(Debug, Clone)]
pub struct ImportedProject {
    pub project: Project,
    pub styles: CustomStyles,
    pub shape: DocumentShape,
    /// Viewer timing embedded by an export, if any.
    pub viewer: Option<ViewerTiming>,
    /// Hotspots dropped because their fields were unusable.
    pub skipped_hotspots: usize,
    pub report: RepairReport,
}

/// Parse and import a document from JSON text.
pub fn import_project(json: &str) -> Result<ImportedProject, TourError> {
    let doc: ProjectDocument =
        serde_json::from_str(json).map_err(|e| TourError::serialization(e.to_string()))?;
    import_document(doc)
}

pub fn import_document(doc: ProjectDocument) -> Result<ImportedProject, TourError> {
    let created_at = parse_created(doc.created.as_deref());
    let styles = doc.custom_styles.unwrap_or_default();
    let mut skipped = 0;

    let (shape, scenes, current, counter) = match doc.scenes {
        Some(scene_docs) => {
            let mut scenes = IndexMap::new();
            for (key, scene_doc) in scene_docs {
                let id = SceneId::from(key.trim());
                if id.as_str().is_empty() {
                    return Err(TourError::serialization("scene with an empty id"));
                }
                if !id.is_path_safe() {
                    return Err(TourError::serialization(format!(
                        "scene id '{}' is not a valid file name",
                        key.escape_debug()
                    )));
                }
                if scenes.contains_key(&id) {
                    return Err(TourError::serialization(format!("duplicate scene id '{id}'")));
                }
                let scene = scene_from_document(id.clone(), scene_doc, &mut skipped);
                scenes.insert(id, scene);
            }
            let current = doc.current_scene.map(SceneId::from);
            (
                DocumentShape::MultiScene,
                scenes,
                current,
                doc.hotspot_id_counter.unwrap_or(0),
            )
        }
        None => {
            let Some(hotspot_docs) = doc.hotspots else {
                return Err(TourError::serialization(
                    "document has neither scenes nor hotspots",
                ));
            };
            let id = SceneId::numbered(1);
            let image = doc
                .image
                .as_deref()
                .and_then(|s| asset_or_warn(s, &id, "panorama"))
                .unwrap_or_else(|| AssetRef::packaged(paths::scene_image_path(&id)));
            let name = if doc.name.trim().is_empty() {
                "Scene 1".to_string()
            } else {
                doc.name.clone()
            };
            let mut scene = Scene::new(id.clone(), name, image);
            scene.hotspots = hotspots_from_documents(&id, hotspot_docs, &mut skipped);
            let max_id = scene.hotspots.iter().map(|h| h.id.0).max().unwrap_or(0);
            let mut scenes = IndexMap::new();
            scenes.insert(id.clone(), scene);
            log::info!("Upgrading legacy single-scene document ({max_id} max hotspot id)");
            (DocumentShape::LegacySingleScene, scenes, Some(id), max_id)
        }
    };

    let (project, report) = Project::from_parts(doc.name, created_at, scenes, current, counter)?;
    if skipped > 0 {
        log::warn!("Import skipped {skipped} unusable hotspots");
    }
    log::info!(
        "Imported '{}': {} scenes, {} hotspots ({report})",
        project.name,
        project.scene_count(),
        project.hotspot_count()
    );
    Ok(ImportedProject {
        project,
        styles,
        shape,
        viewer: doc.viewer,
        skipped_hotspots: skipped,
        report,
    })
}

fn parse_created(created: Option<&str>) -> DateTime<Utc> {
    created
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc))
}

fn scene_from_document(id: SceneId, doc: SceneDocument, skipped: &mut usize) -> Scene {
    let image = asset_or_warn(&doc.image, &id, "image")
        .unwrap_or_else(|| AssetRef::packaged(paths::scene_image_path(&id)));
    let name = if doc.name.trim().is_empty() {
        id.to_string()
    } else {
        doc.name
    };
    let mut scene = Scene::new(id.clone(), name, image);
    scene.hotspots = hotspots_from_documents(&id, doc.hotspots, skipped);
    scene.starting_point = doc.starting_point.map(|p| p.normalized());
    scene.global_sound = doc
        .global_sound
        .and_then(|sound| global_sound_from_document(&id, &sound));
    scene
}

fn global_sound_from_document(scene: &SceneId, doc: &GlobalSoundDocument) -> Option<GlobalSound> {
    let audio = asset_or_warn(&doc.audio, scene, "ambient sound")?;
    Some(GlobalSound::new(audio, doc.volume, doc.enabled))
}

fn hotspots_from_documents(
    scene: &SceneId,
    docs: Vec<HotspotDocument>,
    skipped: &mut usize,
) -> Vec<Hotspot> {
    docs.into_iter()
        .filter_map(|doc| match hotspot_from_document(scene, &doc) {
            Ok(hotspot) => Some(hotspot),
            Err(reason) => {
                log::warn!("Skipping hotspot {:?} in {scene}: {reason}", doc.id);
                *skipped += 1;
                None
            }
        })
        .collect()
}

/// Build a hotspot from its loose document form. Ids that are not positive
/// integers come back unassigned and are filled in by the repair pass.
pub fn hotspot_from_document(scene: &SceneId, doc: &HotspotDocument) -> Result<Hotspot, String> {
    let kind = HotspotKind::parse(&doc.kind).ok_or_else(|| format!("unknown type '{}'", doc.kind))?;
    let position = doc
        .position
        .to_position()
        .ok_or_else(|| "malformed position".to_string())?;
    let popup = PopupSize::clamped(
        doc.popup_width.unwrap_or(PopupSize::default().width),
        doc.popup_height.unwrap_or(PopupSize::default().height),
    );
    let text = || {
        doc.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("{kind} hotspot has no text"))
    };
    let audio = || {
        doc.audio
            .as_deref()
            .and_then(|a| classify_str(a).ok())
            .ok_or_else(|| format!("{kind} hotspot has no usable audio"))
    };
    let content = match kind {
        HotspotKind::Text => HotspotContent::Text {
            text: text()?,
            popup,
        },
        HotspotKind::Audio => HotspotContent::Audio { audio: audio()? },
        HotspotKind::TextAudio => HotspotContent::TextAudio {
            text: text()?,
            audio: audio()?,
            popup,
        },
        HotspotKind::Navigation => {
            let target = doc
                .navigation_target
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(SceneId::from)
                .ok_or_else(|| "navigation hotspot has no target".to_string())?;
            if &target == scene {
                return Err("navigation hotspot targets its own scene".to_string());
            }
            HotspotContent::Navigation { target }
        }
    };
    Ok(Hotspot {
        id: parse_id(doc.id.as_ref()),
        scene_id: scene.clone(),
        position,
        content,
    })
}

/// Positive finite integers (as numbers or numeric strings) are ids;
/// anything else counts as missing.
fn parse_id(value: Option<&serde_json::Value>) -> HotspotId {
    let as_float = match value {
        Some(serde_json::Value::Number(n)) => {
            if let Some(id) = n.as_u64() {
                return HotspotId(id);
            }
            n.as_f64()
        }
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match as_float {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(f) if f.is_finite() && f > 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            HotspotId(f as u64)
        }
        _ => HotspotId::UNASSIGNED,
    }
}

fn asset_or_warn(raw: &str, scene: &SceneId, what: &str) -> Option<AssetRef> {
    match classify_str(raw) {
        Ok(asset) => Some(asset),
        Err(e) => {
            log::warn!("Scene {scene}: ignoring {what} '{}': {e}", truncate(raw));
            None
        }
    }
}

fn truncate(raw: &str) -> &str {
    raw.char_indices().nth(64).map_or(raw, |(i, _)| raw.get(..i).unwrap_or(raw))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn legacy_document_becomes_one_scene() {
        let json = r#"{
            "name": "Old tour",
            "hotspots": [
                { "id": 4, "type": "text", "text": "A", "position": "0 1 -2" },
                { "id": 9, "type": "audio", "audio": "audio/b.mp3", "position": [1, 1, 1] },
                { "id": 2, "type": "text-audio", "text": "C", "audio": "https://x.test/c.mp3",
                  "position": { "x": 0, "y": 0, "z": -5 }, "popupWidth": 30 }
            ]
        }"#;
        let imported = import_project(json).unwrap();
        assert_eq!(imported.shape, DocumentShape::LegacySingleScene);
        let project = &imported.project;
        assert_eq!(project.scene_count(), 1);
        assert_eq!(project.hotspot_count(), 3);
        assert_eq!(project.hotspot_id_counter(), 9);
        let scene = project.scenes().next().unwrap();
        assert_eq!(scene.id.as_str(), "scene_1");
        assert_eq!(scene.image, AssetRef::packaged("images/scene_1.jpg"));
        assert_eq!(scene.hotspots[2].popup().unwrap().width, 10.0);
    }

    #[test]
    fn multi_scene_document_is_repaired_on_import() {
        let json = r#"{
            "name": "Tour",
            "currentScene": "scene_2",
            "scenes": {
                "scene_1": { "name": "Lobby", "image": "images/lobby.jpg", "hotspots": [
                    { "id": 5, "type": "text", "text": "hi", "position": {"x":0,"y":0,"z":0} },
                    { "id": 6, "type": "navigation", "navigationTarget": "scene_9", "position": [0,0,0] }
                ]},
                "scene_2": { "name": "Hall", "image": "https://x.test/hall.jpg", "hotspots": [
                    { "id": 5, "type": "navigation", "navigationTarget": "scene_1", "position": [0,0,0] },
                    { "type": "text", "text": "no id", "position": [0,0,0] }
                ]}
            }
        }"#;
        let imported = import_project(json).unwrap();
        let project = &imported.project;
        assert_eq!(imported.shape, DocumentShape::MultiScene);
        assert_eq!(project.current_scene_id().as_str(), "scene_2");
        assert_eq!(imported.report.pruned_orphans, 1);
        assert_eq!(imported.report.reassigned_duplicates, 1);
        assert_eq!(imported.report.assigned_missing, 1);
        let ids: Vec<u64> = project
            .scenes()
            .flat_map(|s| s.hotspots.iter().map(|h| h.id.0))
            .collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], 5);
        assert!(!ids[1..].contains(&5));
    }

    #[test]
    fn malformed_document_is_rejected() {
        let err = import_project("{ \"scenes\": ").unwrap_err();
        assert!(matches!(err, TourError::Serialization { .. }));
        assert!(err.to_string().starts_with("Could not load project"));
        assert!(import_project(r#"{ "scenes": {} }"#).is_err());
        assert!(import_project(r#"{ "name": "nothing" }"#).is_err());
    }

    #[test]
    fn scene_ids_that_are_not_file_names_are_rejected() {
        for key in ["../../escaped", "a/b", "c:\\\\x", ".."] {
            let json = format!(
                r#"{{ "scenes": {{ "scene_1": {{ "name": "A", "image": "a.jpg" }},
                    "{key}": {{ "name": "B", "image": "data:image/jpeg;base64,/9j/AA==" }} }} }}"#
            );
            let err = import_project(&json).unwrap_err();
            assert!(matches!(err, TourError::Serialization { .. }), "{key}: {err}");
        }
    }

    #[test]
    fn scene_ids_equal_after_trimming_are_rejected() {
        let json = r#"{ "scenes": {
            "scene_1": { "name": "A", "image": "a.jpg",
                "hotspots": [{ "id": 1, "type": "text", "text": "kept", "position": [0,0,0] }] },
            " scene_1 ": { "name": "B", "image": "b.jpg" } } }"#;
        let err = import_project(json).unwrap_err();
        assert!(matches!(err, TourError::Serialization { .. }));
        assert!(err.to_string().contains("duplicate scene id"));
    }

    #[test]
    fn unusable_hotspots_are_skipped() {
        let json = r#"{ "scenes": { "scene_1": { "name": "A", "image": "a.jpg", "hotspots": [
            { "id": 1, "type": "text", "text": "  ", "position": [0,0,0] },
            { "id": 2, "type": "laser", "position": [0,0,0] },
            { "id": 3, "type": "audio", "position": [0,0,0] },
            { "id": 4, "type": "text", "text": "ok", "position": "1 2" },
            { "id": 5, "type": "text", "text": "ok", "position": [0,0,0] }
        ]}}}"#;
        let imported = import_project(json).unwrap();
        assert_eq!(imported.skipped_hotspots, 4);
        assert_eq!(imported.project.hotspot_count(), 1);
    }

    #[test]
    fn ids_must_be_positive_integers() {
        use serde_json::json;
        assert_eq!(parse_id(Some(&json!(7))), HotspotId(7));
        assert_eq!(parse_id(Some(&json!(7.0))), HotspotId(7));
        assert_eq!(parse_id(Some(&json!("12"))), HotspotId(12));
        assert_eq!(parse_id(Some(&json!(2.5))), HotspotId::UNASSIGNED);
        assert_eq!(parse_id(Some(&json!(-3))), HotspotId::UNASSIGNED);
        assert_eq!(parse_id(Some(&json!(0))), HotspotId::UNASSIGNED);
        assert_eq!(parse_id(Some(&json!(null))), HotspotId::UNASSIGNED);
        assert_eq!(parse_id(None), HotspotId::UNASSIGNED);
    }

    #[test]
    fn embedded_data_uri_becomes_blob() {
        let json = r#"{ "scenes": { "scene_1": { "name": "A",
            "image": "data:image/png;base64,iVBORw0KGgo=" } } }"#;
        let imported = import_project(json).unwrap();
        let scene = imported.project.scenes().next().unwrap();
        assert!(matches!(scene.image, AssetRef::EmbeddedBlob { .. }));
    }
}
