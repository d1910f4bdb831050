//! Identity and consistency repair for a [`Project`].
//!
//! Two independent passes, both idempotent:
//!
//! 1. **Ids**: [`assign_missing_ids`] then [`dedupe_ids`]. The order matters:
//!    an id handed out for a missing one must not be allowed to collide with an
//!    id that appears later in iteration order, so duplicates are only resolved
//!    once every hotspot holds some id.
//! 2. **Orphans**: [`prune_orphan_navigation`] drops navigation hotspots whose
//!    target scene is gone.
//!
//! Repairs are silent: they log what changed and never fail.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::error::TourError;
use crate::model::{HotspotId, Project};

/// What a repair run changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub reowned: usize,
    pub assigned_missing: usize,
    pub reassigned_duplicates: usize,
    pub pruned_orphans: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return f.write_str("no repairs");
        }
        write!(
            f,
            "{} missing ids assigned, {} duplicate ids reassigned, {} orphan portals pruned, {} owners fixed",
            self.assigned_missing, self.reassigned_duplicates, self.pruned_orphans, self.reowned
        )
    }
}

/// Run every pass in order and log a summary when anything changed.
pub fn repair(project: &mut Project) -> RepairReport {
    let report = RepairReport {
        reowned: sync_owners(project),
        assigned_missing: assign_missing_ids(project),
        reassigned_duplicates: dedupe_ids(project),
        pruned_orphans: prune_orphan_navigation(project),
    };
    if !report.is_clean() {
        log::info!("Project '{}' repaired: {report}", project.name);
    }
    report
}

/// Point every hotspot's `scene_id` at the scene that actually holds it.
pub fn sync_owners(project: &mut Project) -> usize {
    let mut fixed = 0;
    for (scene_id, scene) in project.scenes_mut() {
        for hotspot in &mut scene.hotspots {
            if &hotspot.scene_id != scene_id {
                hotspot.scene_id = scene_id.clone();
                fixed += 1;
            }
        }
    }
    fixed
}

fn max_seen_id(project: &Project) -> u64 {
    let seen = project
        .scenes()
        .flat_map(|s| s.hotspots.iter())
        .map(|h| h.id.0)
        .max()
        .unwrap_or(0);
    seen.max(project.hotspot_id_counter())
}

/// Pass 1a: give every unassigned hotspot `max + 1`, where `max` covers both
/// the ids present and the persisted counter.
pub fn assign_missing_ids(project: &mut Project) -> usize {
    let mut max = max_seen_id(project);
    let mut assigned = 0;
    for scene in project.scenes_mut().values_mut() {
        for hotspot in &mut scene.hotspots {
            if !hotspot.id.is_assigned() {
                max += 1;
                hotspot.id = HotspotId(max);
                assigned += 1;
            }
        }
    }
    project.raise_hotspot_counter(max);
    assigned
}

/// Pass 1b: walk scenes in authoring order and hotspots in list order; the
/// first holder of an id keeps it, later holders get a fresh `max + 1`.
pub fn dedupe_ids(project: &mut Project) -> usize {
    let mut max = max_seen_id(project);
    let mut seen = HashSet::new();
    let mut reassigned = 0;
    for scene in project.scenes_mut().values_mut() {
        for hotspot in &mut scene.hotspots {
            if !seen.insert(hotspot.id) {
                max += 1;
                log::debug!(
                    "Hotspot id {} duplicated in {}; reassigned to {max}",
                    hotspot.id,
                    scene.id
                );
                hotspot.id = HotspotId(max);
                seen.insert(hotspot.id);
                reassigned += 1;
            }
        }
    }
    project.raise_hotspot_counter(max);
    reassigned
}

/// Pass 2: drop navigation hotspots whose target scene no longer exists.
pub fn prune_orphan_navigation(project: &mut Project) -> usize {
    let existing: HashSet<_> = project.scene_ids().cloned().collect();
    let mut pruned = 0;
    for scene in project.scenes_mut().values_mut() {
        scene.hotspots.retain(|h| match h.navigation_target() {
            Some(target) if !existing.contains(target) => {
                let err = TourError::ReferenceIntegrity {
                    hotspot: h.id.0,
                    target: target.to_string(),
                };
                log::warn!("{err}; removing it");
                pruned += 1;
                false
            }
            _ => true,
        });
    }
    pruned
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::model::{
        AssetRef, Hotspot, HotspotContent, PopupSize, Position, Scene, SceneId,
    };

    fn text_hotspot(id: u64, scene: &str) -> Hotspot {
        Hotspot {
            id: HotspotId(id),
            scene_id: SceneId::from(scene),
            position: Position::default(),
            content: HotspotContent::Text {
                text: format!("hotspot {id}"),
                popup: PopupSize::default(),
            },
        }
    }

    fn portal(id: u64, scene: &str, target: &str) -> Hotspot {
        Hotspot {
            id: HotspotId(id),
            scene_id: SceneId::from(scene),
            position: Position::default(),
            content: HotspotContent::Navigation {
                target: SceneId::from(target),
            },
        }
    }

    /// Build a project without running repair, so tests see raw input.
    fn raw_project(scenes: Vec<(&str, Vec<Hotspot>)>) -> Project {
        let mut map = IndexMap::new();
        for (id, hotspots) in scenes {
            let mut scene = Scene::new(SceneId::from(id), id, AssetRef::packaged("images/x.jpg"));
            scene.hotspots = hotspots;
            map.insert(SceneId::from(id), scene);
        }
        let mut project = Project::with_default_scene("raw");
        *project.scenes_mut() = map;
        project
    }

    fn all_ids(project: &Project) -> Vec<u64> {
        project
            .scenes()
            .flat_map(|s| s.hotspots.iter())
            .map(|h| h.id.0)
            .collect()
    }

    #[test]
    fn duplicate_across_scenes_keeps_first_holder() {
        let mut project = raw_project(vec![
            ("scene_1", vec![text_hotspot(5, "scene_1")]),
            ("scene_2", vec![text_hotspot(5, "scene_2")]),
        ]);
        let report = repair(&mut project);
        assert_eq!(report.reassigned_duplicates, 1);
        assert_eq!(all_ids(&project), vec![5, 6]);
        assert_eq!(project.hotspot_id_counter(), 6);
    }

    #[test]
    fn missing_ids_get_max_plus_one() {
        let mut project = raw_project(vec![(
            "scene_1",
            vec![text_hotspot(0, "scene_1"), text_hotspot(3, "scene_1")],
        )]);
        let report = repair(&mut project);
        assert_eq!(report.assigned_missing, 1);
        assert_eq!(all_ids(&project), vec![4, 3]);
    }

    #[test]
    fn fresh_id_never_collides_with_later_id() {
        // Assigning 3 first would clash with the 3 that follows; the
        // counter-based max avoids that, and dedupe cleans any leftovers.
        let mut project = raw_project(vec![(
            "scene_1",
            vec![
                text_hotspot(0, "scene_1"),
                text_hotspot(2, "scene_1"),
                text_hotspot(3, "scene_1"),
                text_hotspot(3, "scene_1"),
            ],
        )]);
        repair(&mut project);
        let ids = all_ids(&project);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.iter().all(|&id| id > 0));
    }

    #[test]
    fn counter_is_respected_for_new_ids() {
        let mut project = raw_project(vec![("scene_1", vec![text_hotspot(0, "scene_1")])]);
        project.raise_hotspot_counter(40);
        repair(&mut project);
        assert_eq!(all_ids(&project), vec![41]);
    }

    #[test]
    fn orphan_portal_is_pruned() {
        let mut project = raw_project(vec![(
            "scene_1",
            vec![portal(1, "scene_1", "scene_2"), text_hotspot(2, "scene_1")],
        )]);
        let report = repair(&mut project);
        assert_eq!(report.pruned_orphans, 1);
        assert_eq!(all_ids(&project), vec![2]);
    }

    #[test]
    fn owners_are_synchronized() {
        let mut project = raw_project(vec![("scene_1", vec![text_hotspot(1, "elsewhere")])]);
        let report = repair(&mut project);
        assert_eq!(report.reowned, 1);
        let scene = project.scenes().next().unwrap();
        assert_eq!(scene.hotspots[0].scene_id, scene.id);
    }

    #[test]
    fn repair_is_idempotent() {
        let mut project = raw_project(vec![
            (
                "scene_1",
                vec![
                    text_hotspot(0, "scene_1"),
                    text_hotspot(7, "scene_1"),
                    portal(9, "scene_1", "scene_9"),
                ],
            ),
            (
                "scene_2",
                vec![text_hotspot(7, "scene_1"), portal(0, "scene_2", "scene_1")],
            ),
        ]);
        repair(&mut project);
        let once = serde_json::to_string(&project).unwrap();
        let second = repair(&mut project);
        let twice = serde_json::to_string(&project).unwrap();
        assert!(second.is_clean());
        assert_eq!(once, twice);
    }

    #[test]
    fn ids_unique_and_targets_valid_after_repair() {
        let mut project = raw_project(vec![
            ("scene_1", vec![text_hotspot(1, "scene_1"), portal(1, "scene_1", "scene_2")]),
            ("scene_2", vec![portal(1, "scene_2", "scene_1"), portal(2, "scene_2", "gone")]),
        ]);
        repair(&mut project);
        let ids = all_ids(&project);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        for scene in project.scenes() {
            for hotspot in &scene.hotspots {
                if let Some(target) = hotspot.navigation_target() {
                    assert!(project.contains_scene(target));
                }
            }
        }
    }
}
