use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::asset::AssetRef;
use super::hotspot::{Hotspot, HotspotDraft, HotspotId};
use super::scene::{GlobalSound, Scene, SceneId, StartingPoint};
use crate::consistency::{self, RepairReport};
use crate::error::TourError;
use crate::paths;

/// The top-level tour model: an ordered set of scenes and the bookkeeping
/// needed to keep ids unique.
///
/// Invariants, re-established after every structural edit:
/// - there is at least one scene, and `current_scene_id` names one of them;
/// - hotspot ids are unique across all scenes;
/// - every navigation hotspot targets an existing scene.
///
/// The first scene in insertion order is the default scene. It cannot be
/// deleted, and exported tours open on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ProjectRecord")]
pub struct Project {
    pub name: String,
    pub created_at: DateTime<Utc>,
    scenes: IndexMap<SceneId, Scene>,
    current_scene_id: SceneId,
    hotspot_id_counter: u64,
    scene_counter: u64,
}

/// Unchecked shape of a persisted project. Converted through
/// [`Project::from_parts`] so a stored entry is repaired on load.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRecord {
    #[serde(default)]
    name: String,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    scenes: IndexMap<SceneId, Scene>,
    #[serde(default)]
    current_scene_id: Option<SceneId>,
    #[serde(default)]
    hotspot_id_counter: u64,
    #[serde(default)]
    scene_counter: u64,
}

impl TryFrom<ProjectRecord> for Project {
    type Error = TourError;

    fn try_from(record: ProjectRecord) -> Result<Self, Self::Error> {
        let (mut project, _) = Project::from_parts(
            record.name,
            record.created_at,
            record.scenes,
            record.current_scene_id,
            record.hotspot_id_counter,
        )?;
        project.scene_counter = project.scene_counter.max(record.scene_counter);
        Ok(project)
    }
}

/// Scene reachable from the current one, for the navigation-target picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationTarget {
    pub id: SceneId,
    pub name: String,
}

impl Project {
    /// New project with a single scene showing `image`.
    pub fn new(name: impl Into<String>, first_scene_name: impl Into<String>, image: AssetRef) -> Self {
        let id = SceneId::numbered(1);
        let mut scenes = IndexMap::new();
        scenes.insert(id.clone(), Scene::new(id.clone(), first_scene_name, image));
        Self {
            name: name.into(),
            created_at: Utc::now(),
            scenes,
            current_scene_id: id,
            hotspot_id_counter: 0,
            scene_counter: 1,
        }
    }

    /// Single empty scene whose image is the conventional packaged path.
    pub fn with_default_scene(name: impl Into<String>) -> Self {
        let image = AssetRef::packaged(paths::scene_image_path(&SceneId::numbered(1)));
        Self::new(name, "Scene 1", image)
    }

    /// Assemble a project from loaded parts and run both repair passes.
    ///
    /// Fails only if there are no scenes at all. A missing or dangling
    /// `current` falls back to the first scene.
    pub fn from_parts(
        name: String,
        created_at: DateTime<Utc>,
        scenes: IndexMap<SceneId, Scene>,
        current: Option<SceneId>,
        hotspot_id_counter: u64,
    ) -> Result<(Self, RepairReport), TourError> {
        let first = scenes
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| TourError::serialization("project contains no scenes"))?;
        let current_scene_id = current.filter(|c| scenes.contains_key(c)).unwrap_or(first);
        let scene_counter = scenes
            .keys()
            .filter_map(SceneId::number)
            .max()
            .unwrap_or(0)
            .max(scenes.len() as u64);
        let mut project = Self {
            name,
            created_at,
            scenes,
            current_scene_id,
            hotspot_id_counter,
            scene_counter,
        };
        let report = project.repair();
        Ok((project, report))
    }

    /// Run the consistency passes. Idempotent.
    pub fn repair(&mut self) -> RepairReport {
        consistency::repair(self)
    }

    // ── Read operations ─────────────────────────────────────────────

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub fn scene_ids(&self) -> impl Iterator<Item = &SceneId> {
        self.scenes.keys()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn get_scene(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn contains_scene(&self, id: &SceneId) -> bool {
        self.scenes.contains_key(id)
    }

    pub fn current_scene_id(&self) -> &SceneId {
        &self.current_scene_id
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.scenes.get(&self.current_scene_id)
    }

    /// First scene in insertion order: the protected default and the entry
    /// point of exported tours.
    pub fn default_scene_id(&self) -> &SceneId {
        // from_parts/new guarantee at least one scene
        self.scenes.keys().next().unwrap_or(&self.current_scene_id)
    }

    pub fn hotspot_id_counter(&self) -> u64 {
        self.hotspot_id_counter
    }

    pub fn hotspot_count(&self) -> usize {
        self.scenes.values().map(|s| s.hotspots.len()).sum()
    }

    /// Hotspots of one scene, in placement order. Empty for an unknown scene.
    pub fn hotspots_in(&self, id: &SceneId) -> &[Hotspot] {
        self.scenes.get(id).map_or(&[], |s| s.hotspots.as_slice())
    }

    pub fn find_hotspot(&self, id: HotspotId) -> Option<&Hotspot> {
        self.scenes
            .values()
            .flat_map(|s| s.hotspots.iter())
            .find(|h| h.id == id)
    }

    /// Every scene except the current one, in authoring order.
    pub fn list_navigation_targets(&self) -> Vec<NavigationTarget> {
        self.scenes
            .values()
            .filter(|s| s.id != self.current_scene_id)
            .map(|s| NavigationTarget {
                id: s.id.clone(),
                name: s.name.clone(),
            })
            .collect()
    }

    // ── Scene mutations ─────────────────────────────────────────────

    /// Append a scene and make it current. Returns the new id.
    pub fn add_scene(&mut self, name: &str, image: AssetRef) -> Result<SceneId, TourError> {
        if image.is_empty() {
            return Err(TourError::validation("A scene needs an image"));
        }
        let id = self.next_scene_id();
        let name = if name.trim().is_empty() {
            format!("Scene {}", self.scenes.len() + 1)
        } else {
            name.trim().to_string()
        };
        self.scenes.insert(id.clone(), Scene::new(id.clone(), name, image));
        self.current_scene_id = id.clone();
        let report = self.repair();
        log::info!("Added scene {id} ({report})");
        Ok(id)
    }

    /// Remove a scene. The default scene is protected. Navigation hotspots
    /// in other scenes that pointed at it are pruned before returning.
    pub fn delete_scene(&mut self, id: &SceneId) -> Result<Scene, TourError> {
        if id == self.default_scene_id() {
            let name = self.scenes.get(id).map_or(id.as_str(), |s| s.name.as_str());
            return Err(TourError::ProtectedResource {
                what: format!("Default scene '{name}'"),
            });
        }
        let removed = self
            .scenes
            .shift_remove(id)
            .ok_or_else(|| TourError::not_found(format!("Scene '{id}'")))?;
        if &self.current_scene_id == id {
            self.current_scene_id = self.default_scene_id().clone();
        }
        let report = self.repair();
        log::info!("Deleted scene {id} ({report})");
        Ok(removed)
    }

    pub fn rename_scene(&mut self, id: &SceneId, name: &str) -> Result<(), TourError> {
        if name.trim().is_empty() {
            return Err(TourError::validation("Scene name cannot be empty"));
        }
        self.scene_mut(id)?.name = name.trim().to_string();
        Ok(())
    }

    pub fn set_scene_image(&mut self, id: &SceneId, image: AssetRef) -> Result<(), TourError> {
        if image.is_empty() {
            return Err(TourError::validation("A scene needs an image"));
        }
        self.scene_mut(id)?.image = image;
        Ok(())
    }

    pub fn set_current_scene(&mut self, id: &SceneId) -> Result<(), TourError> {
        if !self.scenes.contains_key(id) {
            return Err(TourError::not_found(format!("Scene '{id}'")));
        }
        self.current_scene_id = id.clone();
        Ok(())
    }

    pub fn set_starting_point(
        &mut self,
        id: &SceneId,
        point: StartingPoint,
    ) -> Result<(), TourError> {
        self.scene_mut(id)?.starting_point = Some(point.normalized());
        Ok(())
    }

    pub fn clear_starting_point(&mut self, id: &SceneId) -> Result<(), TourError> {
        self.scene_mut(id)?.starting_point = None;
        Ok(())
    }

    pub fn set_global_sound(&mut self, id: &SceneId, sound: GlobalSound) -> Result<(), TourError> {
        if sound.audio.is_empty() {
            return Err(TourError::validation("Ambient sound needs an audio file"));
        }
        let sound = GlobalSound::new(sound.audio, sound.volume, sound.enabled);
        self.scene_mut(id)?.global_sound = Some(sound);
        Ok(())
    }

    pub fn clear_global_sound(&mut self, id: &SceneId) -> Result<(), TourError> {
        self.scene_mut(id)?.global_sound = None;
        Ok(())
    }

    // ── Hotspot mutations ───────────────────────────────────────────

    pub fn add_hotspot(
        &mut self,
        scene_id: &SceneId,
        draft: HotspotDraft,
    ) -> Result<HotspotId, TourError> {
        if !self.scenes.contains_key(scene_id) {
            return Err(TourError::not_found(format!("Scene '{scene_id}'")));
        }
        draft.validate(scene_id, |s| self.scenes.contains_key(s))?;
        let id = self.allocate_hotspot_id();
        let hotspot = draft.into_hotspot(id, scene_id.clone());
        self.scene_mut(scene_id)?.hotspots.push(hotspot);
        let report = self.repair();
        log::debug!("Added hotspot {id} to {scene_id} ({report})");
        Ok(id)
    }

    /// Replace a hotspot's position and content, keeping its id and owner.
    pub fn update_hotspot(&mut self, id: HotspotId, draft: HotspotDraft) -> Result<(), TourError> {
        let owner = self
            .find_hotspot(id)
            .map(|h| h.scene_id.clone())
            .ok_or_else(|| TourError::not_found(format!("Hotspot {id}")))?;
        draft.validate(&owner, |s| self.scenes.contains_key(s))?;
        let updated = draft.into_hotspot(id, owner.clone());
        let slot = self
            .scene_mut(&owner)?
            .hotspots
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| TourError::not_found(format!("Hotspot {id}")))?;
        *slot = updated;
        Ok(())
    }

    pub fn delete_hotspot(&mut self, id: HotspotId) -> Result<Hotspot, TourError> {
        let removed = self
            .scenes
            .values_mut()
            .find_map(|scene| {
                let index = scene.hotspots.iter().position(|h| h.id == id)?;
                Some(scene.hotspots.remove(index))
            })
            .ok_or_else(|| TourError::not_found(format!("Hotspot {id}")))?;
        let report = self.repair();
        log::debug!("Deleted hotspot {id} ({report})");
        Ok(removed)
    }

    // ── Internals shared with the consistency manager ───────────────

    pub(crate) fn scenes_mut(&mut self) -> &mut IndexMap<SceneId, Scene> {
        &mut self.scenes
    }

    pub(crate) fn raise_hotspot_counter(&mut self, seen_max: u64) {
        self.hotspot_id_counter = self.hotspot_id_counter.max(seen_max);
    }

    /// Keep id counters at least as high as `other`'s, so ids handed out
    /// there are never handed out again here.
    pub(crate) fn carry_counters(&mut self, other: &Project) {
        self.hotspot_id_counter = self.hotspot_id_counter.max(other.hotspot_id_counter);
        self.scene_counter = self.scene_counter.max(other.scene_counter);
    }

    fn scene_mut(&mut self, id: &SceneId) -> Result<&mut Scene, TourError> {
        self.scenes
            .get_mut(id)
            .ok_or_else(|| TourError::not_found(format!("Scene '{id}'")))
    }

    fn allocate_hotspot_id(&mut self) -> HotspotId {
        self.hotspot_id_counter += 1;
        HotspotId(self.hotspot_id_counter)
    }

    fn next_scene_id(&mut self) -> SceneId {
        loop {
            self.scene_counter += 1;
            let id = SceneId::numbered(self.scene_counter);
            if !self.scenes.contains_key(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::hotspot::{HotspotContent, Position, PopupSize};

    fn text(msg: &str) -> HotspotDraft {
        HotspotDraft::new(
            Position::new(0.0, 1.6, -3.0),
            HotspotContent::Text {
                text: msg.into(),
                popup: PopupSize::default(),
            },
        )
    }

    fn portal(target: &SceneId) -> HotspotDraft {
        HotspotDraft::new(
            Position::new(2.0, 1.0, -4.0),
            HotspotContent::Navigation {
                target: target.clone(),
            },
        )
    }

    fn two_scene_project() -> (Project, SceneId, SceneId) {
        let mut project = Project::with_default_scene("Tour");
        let a = project.default_scene_id().clone();
        let b = project.add_scene("Hallway", AssetRef::packaged("images/hall.jpg")).unwrap();
        (project, a, b)
    }

    #[test]
    fn new_project_has_one_current_scene() {
        let project = Project::with_default_scene("Tour");
        assert_eq!(project.scene_count(), 1);
        assert_eq!(project.current_scene_id(), project.default_scene_id());
        assert!(project.current_scene().is_some());
    }

    #[test]
    fn scene_ids_are_never_reused() {
        let (mut project, _, b) = two_scene_project();
        project.delete_scene(&b).unwrap();
        let c = project.add_scene("Kitchen", AssetRef::packaged("images/k.jpg")).unwrap();
        assert_ne!(b, c);
        assert_eq!(c.as_str(), "scene_3");
    }

    #[test]
    fn default_scene_is_protected() {
        let (mut project, a, _) = two_scene_project();
        let before = project.clone();
        let err = project.delete_scene(&a).unwrap_err();
        assert!(matches!(err, TourError::ProtectedResource { .. }));
        assert_eq!(project, before);
    }

    #[test]
    fn deleting_current_scene_falls_back_to_default() {
        let (mut project, a, b) = two_scene_project();
        assert_eq!(project.current_scene_id(), &b);
        project.delete_scene(&b).unwrap();
        assert_eq!(project.current_scene_id(), &a);
    }

    #[test]
    fn deleting_a_scene_prunes_portals_into_it() {
        let (mut project, a, b) = two_scene_project();
        project.add_hotspot(&a, portal(&b)).unwrap();
        assert_eq!(project.get_scene(&a).unwrap().hotspots.len(), 1);

        project.delete_scene(&b).unwrap();
        assert!(project.get_scene(&a).unwrap().hotspots.is_empty());
    }

    #[test]
    fn hotspot_ids_are_project_wide() {
        let (mut project, a, b) = two_scene_project();
        let h1 = project.add_hotspot(&a, text("one")).unwrap();
        let h2 = project.add_hotspot(&b, text("two")).unwrap();
        let h3 = project.add_hotspot(&a, text("three")).unwrap();
        assert_eq!((h1, h2, h3), (HotspotId(1), HotspotId(2), HotspotId(3)));

        project.delete_hotspot(h3).unwrap();
        let h4 = project.add_hotspot(&a, text("four")).unwrap();
        assert_eq!(h4, HotspotId(4));
    }

    #[test]
    fn invalid_hotspot_leaves_project_unchanged() {
        let (mut project, a, _) = two_scene_project();
        let before = project.clone();
        let err = project.add_hotspot(&a, text("")).unwrap_err();
        assert!(matches!(err, TourError::ValidationError { .. }));
        assert_eq!(project, before);
    }

    #[test]
    fn update_keeps_id_and_owner() {
        let (mut project, a, b) = two_scene_project();
        let id = project.add_hotspot(&a, text("old")).unwrap();
        project.update_hotspot(id, portal(&b)).unwrap();
        let hotspot = project.find_hotspot(id).unwrap();
        assert_eq!(hotspot.scene_id, a);
        assert_eq!(hotspot.navigation_target(), Some(&b));
    }

    #[test]
    fn navigation_targets_exclude_current() {
        let (mut project, a, b) = two_scene_project();
        project.set_current_scene(&a).unwrap();
        let targets = project.list_navigation_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, b);
    }

    #[test]
    fn starting_point_and_sound_round_trip() {
        let (mut project, a, _) = two_scene_project();
        project
            .set_starting_point(&a, StartingPoint { yaw: 90.0, pitch: 10.0, roll: 0.0 })
            .unwrap();
        project
            .set_global_sound(&a, GlobalSound::new(AssetRef::packaged("audio/wind.mp3"), 0.4, true))
            .unwrap();
        assert!(project.get_scene(&a).unwrap().starting_point.is_some());
        project.clear_starting_point(&a).unwrap();
        project.clear_global_sound(&a).unwrap();
        let scene = project.get_scene(&a).unwrap();
        assert!(scene.starting_point.is_none());
        assert!(scene.global_sound.is_none());
    }

    #[test]
    fn persisted_form_round_trips() {
        let (mut project, a, b) = two_scene_project();
        project.add_hotspot(&a, portal(&b)).unwrap();
        let json = serde_json::to_string(&project).unwrap();
        let back: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(back, project);
    }

    #[test]
    fn persisted_form_without_scenes_is_rejected() {
        let json = r#"{"name":"x","scenes":{}}"#;
        assert!(serde_json::from_str::<Project>(json).is_err());
    }
}
