//! Scene-to-scene navigation as a pure state machine.
//!
//! The navigator never performs I/O. Each event returns the commands the
//! host (renderer, audio, loader) must carry out, in order. The async
//! [`super::driver::ViewerRuntime`] feeds it events and executes commands.
//!
//! ```text
//! Uninitialized --start--> Loading(entry) --preload settled--> (display)
//!   --scene loaded | safety timeout--> Ready(s)
//! Ready(s) --navigate_to(t)--> Transitioning(s, t) --scene loaded | safety timeout--> Ready(t)
//! ```
//!
//! `navigate_to` is only honored in `Ready`; requests arriving while loading
//! or transitioning are dropped.

use std::time::Duration;

use indexmap::IndexMap;

use crate::assets::{resolve_for_runtime_load, runtime_fallback};
use crate::error::TourError;
use crate::import::import_project;
use crate::model::styles::MarkerStyle;
use crate::model::{
    CustomStyles, HotspotId, HotspotKind, PopupSize, Position, Project, SceneId, StartingPoint,
};
use crate::paths;
use crate::settings::ViewerTiming;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavState {
    Uninitialized,
    Loading { scene: SceneId },
    Ready { scene: SceneId },
    Transitioning { from: SceneId, to: SceneId },
}

/// One image the host should fetch during the up-front preload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadRequest {
    pub scene: SceneId,
    pub path: String,
}

/// Outcome of the bulk preload. Failures are counted, never fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub loaded: Vec<SceneId>,
    pub failed: Vec<SceneId>,
    /// Scenes still pending when the budget ran out.
    pub timed_out: Vec<SceneId>,
}

impl PreloadReport {
    pub fn is_loaded(&self, scene: &SceneId) -> bool {
        self.loaded.contains(scene)
    }
}

/// Everything the renderer needs to show one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePresentation {
    pub scene: SceneId,
    pub name: String,
    pub image: String,
    pub starting_point: Option<StartingPoint>,
    pub hotspots: Vec<HotspotPlacement>,
}

/// A hotspot as handed to the renderer: position plus type-specific visuals.
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotPlacement {
    pub id: HotspotId,
    pub kind: HotspotKind,
    pub position: Position,
    pub marker: MarkerStyle,
    pub text: Option<String>,
    pub popup: Option<PopupSize>,
    pub audio: Option<String>,
    pub target: Option<SceneId>,
    /// Thumbnail of the target scene, shown on hover.
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    Preload(Vec<PreloadRequest>),
    /// Cover the screen before swapping scenes.
    FadeOut { color: String, duration: Duration },
    /// Release the cover.
    FadeIn { duration: Duration },
    Display(ScenePresentation),
    /// Replace the panorama of the displayed scene (error fallback).
    SwapImage { scene: SceneId, path: String },
    StopAmbient,
    PlayAmbient { scene: SceneId, path: String, volume: f64 },
    /// Call [`Navigator::safety_timeout`] with `ticket` after `after`.
    ArmSafetyTimer { ticket: u64, after: Duration },
    /// Visible, dismissible message.
    ShowError(TourError),
}

#[derive(Debug, Clone, PartialEq)]
struct AmbientRequest {
    scene: SceneId,
    path: String,
    volume: f64,
}

pub struct Navigator {
    project: Project,
    styles: CustomStyles,
    timing: ViewerTiming,
    state: NavState,
    /// Resolved panorama path per scene, computed once.
    images: IndexMap<SceneId, String>,
    preload: Option<PreloadReport>,
    next_ticket: u64,
    pending_ticket: Option<u64>,
    fade_visible: bool,
    ambient: Option<AmbientRequest>,
    /// Set when autoplay was refused and the one retry is still available.
    ambient_retry: Option<AmbientRequest>,
}

impl Navigator {
    pub fn new(project: Project, styles: CustomStyles, timing: ViewerTiming) -> Self {
        let images = project
            .scenes()
            .map(|s| (s.id.clone(), resolve_for_runtime_load(Some(&s.image), &s.id)))
            .collect();
        Self {
            project,
            styles,
            timing,
            state: NavState::Uninitialized,
            images,
            preload: None,
            next_ticket: 0,
            pending_ticket: None,
            fade_visible: false,
            ambient: None,
            ambient_retry: None,
        }
    }

    /// Build from `config.json` text. A missing or unreadable document yields
    /// a single empty default scene instead of an error.
    pub fn from_config_text(config: Option<&str>, timing: ViewerTiming) -> Self {
        let imported = config.map(import_project);
        match imported {
            Some(Ok(imported)) => {
                let timing = imported.viewer.unwrap_or(timing);
                Self::new(imported.project, imported.styles, timing)
            }
            Some(Err(e)) => {
                log::warn!("Config unreadable, starting with an empty tour: {e}");
                Self::empty(timing)
            }
            None => {
                log::warn!("No config found, starting with an empty tour");
                Self::empty(timing)
            }
        }
    }

    fn empty(timing: ViewerTiming) -> Self {
        Self::new(
            Project::with_default_scene("Untitled tour"),
            CustomStyles::default(),
            timing,
        )
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn preload_report(&self) -> Option<&PreloadReport> {
        self.preload.as_ref()
    }

    pub fn is_fade_visible(&self) -> bool {
        self.fade_visible
    }

    pub fn resolved_image(&self, scene: &SceneId) -> Option<&str> {
        self.images.get(scene).map(String::as_str)
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Enter `Loading` on the project's current scene and ask for every
    /// scene image to be preloaded.
    pub fn start(&mut self) -> Vec<ViewerCommand> {
        if self.state != NavState::Uninitialized {
            log::debug!("start ignored in {:?}", self.state);
            return Vec::new();
        }
        let entry = self.project.current_scene_id().clone();
        log::debug!("Uninitialized -> Loading({entry})");
        self.state = NavState::Loading { scene: entry };
        let requests = self
            .images
            .iter()
            .map(|(scene, path)| PreloadRequest {
                scene: scene.clone(),
                path: path.clone(),
            })
            .collect();
        vec![ViewerCommand::Preload(requests)]
    }

    /// The bulk preload finished or ran out of budget. Show the entry scene.
    pub fn preload_settled(&mut self, report: PreloadReport) -> Vec<ViewerCommand> {
        let NavState::Loading { scene } = &self.state else {
            log::debug!("preload result ignored in {:?}", self.state);
            return Vec::new();
        };
        let scene = scene.clone();
        if !report.failed.is_empty() || !report.timed_out.is_empty() {
            log::warn!(
                "Preload: {} loaded, {} failed, {} timed out",
                report.loaded.len(),
                report.failed.len(),
                report.timed_out.len()
            );
        }
        self.preload = Some(report);
        self.enter_scene(&scene)
    }

    /// Request navigation. Unknown targets and requests outside `Ready` are
    /// no-ops.
    pub fn navigate_to(&mut self, target: &SceneId) -> Vec<ViewerCommand> {
        let NavState::Ready { scene: from } = &self.state else {
            log::debug!("navigate_to({target}) ignored in {:?}", self.state);
            return Vec::new();
        };
        if !self.project.contains_scene(target) {
            log::warn!("navigate_to: no scene '{target}'");
            return Vec::new();
        }
        let from = from.clone();
        log::debug!("Ready({from}) -> Transitioning({from}, {target})");
        self.state = NavState::Transitioning {
            from,
            to: target.clone(),
        };
        self.fade_visible = true;
        let mut commands = vec![
            ViewerCommand::StopAmbient,
            ViewerCommand::FadeOut {
                color: self.styles.transition.fade_color.clone(),
                duration: self.fade_duration(),
            },
        ];
        self.ambient = None;
        self.ambient_retry = None;
        commands.extend(self.enter_scene(target));
        commands
    }

    /// The renderer reports the scene is showing.
    pub fn scene_loaded(&mut self, scene: &SceneId) -> Vec<ViewerCommand> {
        if self.entering() != Some(scene) {
            log::debug!("scene_loaded({scene}) ignored in {:?}", self.state);
            return Vec::new();
        }
        self.finish_entry()
    }

    /// The safety timer armed for `ticket` elapsed.
    pub fn safety_timeout(&mut self, ticket: u64) -> Vec<ViewerCommand> {
        if self.pending_ticket != Some(ticket) {
            return Vec::new();
        }
        log::warn!("Scene did not report loaded in time; releasing the fade");
        self.finish_entry()
    }

    /// The platform refused to start ambient audio without a user gesture.
    pub fn autoplay_refused(&mut self, scene: &SceneId) {
        match &self.ambient {
            Some(current) if &current.scene == scene => {
                log::warn!("Ambient audio for {scene} blocked; retrying on next interaction");
                self.ambient_retry = Some(current.clone());
            }
            _ => log::debug!("autoplay refusal for inactive scene {scene} ignored"),
        }
    }

    /// Any click, key or touch. Retries a refused ambient track once.
    pub fn user_interaction(&mut self) -> Vec<ViewerCommand> {
        match self.ambient_retry.take() {
            Some(request) => vec![
                ViewerCommand::StopAmbient,
                ViewerCommand::PlayAmbient {
                    scene: request.scene,
                    path: request.path,
                    volume: request.volume,
                },
            ],
            None => Vec::new(),
        }
    }

    /// The renderer could not display `path` for `scene`. Show a message and
    /// fall back to `./images/<id>.jpg`, then to a blank panorama.
    pub fn display_failed(&mut self, scene: &SceneId, path: &str, message: &str) -> Vec<ViewerCommand> {
        let error = TourError::AssetLoad {
            scene: scene.to_string(),
            path: path.to_string(),
            message: message.to_string(),
        };
        log::warn!("{error}");
        let fallback = runtime_fallback(scene);
        let next = if path == fallback || path == paths::BLANK_PANORAMA {
            paths::BLANK_PANORAMA.to_string()
        } else {
            fallback
        };
        let mut commands = vec![ViewerCommand::ShowError(error)];
        if path != paths::BLANK_PANORAMA {
            commands.push(ViewerCommand::SwapImage {
                scene: scene.clone(),
                path: next,
            });
        }
        commands
    }

    // ── Internals ───────────────────────────────────────────────────

    fn entering(&self) -> Option<&SceneId> {
        match &self.state {
            NavState::Loading { scene } => Some(scene),
            NavState::Transitioning { to, .. } => Some(to),
            _ => None,
        }
    }

    fn fade_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.styles.transition.fade_duration_ms))
    }

    /// Display `scene`, start its ambient sound and arm the safety timer.
    fn enter_scene(&mut self, scene: &SceneId) -> Vec<ViewerCommand> {
        let mut commands = vec![ViewerCommand::Display(self.present(scene))];
        commands.push(ViewerCommand::StopAmbient);
        if let Some(request) = self.ambient_request(scene) {
            self.ambient = Some(request.clone());
            commands.push(ViewerCommand::PlayAmbient {
                scene: request.scene,
                path: request.path,
                volume: request.volume,
            });
        }
        self.next_ticket += 1;
        self.pending_ticket = Some(self.next_ticket);
        commands.push(ViewerCommand::ArmSafetyTimer {
            ticket: self.next_ticket,
            after: Duration::from_millis(self.timing.fade_safety_ms),
        });
        commands
    }

    fn finish_entry(&mut self) -> Vec<ViewerCommand> {
        let Some(scene) = self.entering().cloned() else {
            return Vec::new();
        };
        self.pending_ticket = None;
        log::debug!("{:?} -> Ready({scene})", self.state);
        self.state = NavState::Ready { scene };
        if std::mem::take(&mut self.fade_visible) {
            vec![ViewerCommand::FadeIn {
                duration: self.fade_duration(),
            }]
        } else {
            Vec::new()
        }
    }

    fn ambient_request(&self, scene: &SceneId) -> Option<AmbientRequest> {
        let sound = self.project.get_scene(scene)?.global_sound.as_ref()?;
        if !sound.enabled || sound.audio.is_empty() {
            return None;
        }
        Some(AmbientRequest {
            scene: scene.clone(),
            path: resolve_for_runtime_load(Some(&sound.audio), scene),
            volume: sound.volume,
        })
    }

    fn present(&self, scene_id: &SceneId) -> ScenePresentation {
        let image = self
            .images
            .get(scene_id)
            .cloned()
            .unwrap_or_else(|| runtime_fallback(scene_id));
        let Some(scene) = self.project.get_scene(scene_id) else {
            return ScenePresentation {
                scene: scene_id.clone(),
                name: scene_id.to_string(),
                image,
                starting_point: None,
                hotspots: Vec::new(),
            };
        };
        let preview_enabled = self.styles.navigation_preview.enabled;
        let hotspots = scene
            .hotspots
            .iter()
            .filter_map(|h| {
                let target = h.navigation_target().cloned();
                if let Some(t) = &target {
                    if !self.project.contains_scene(t) {
                        log::warn!("Skipping hotspot {} with missing target {t}", h.id);
                        return None;
                    }
                }
                let audio = match h.audio() {
                    Some(a) if a.is_empty() => {
                        log::warn!("Skipping hotspot {} with empty audio", h.id);
                        return None;
                    }
                    Some(a) => Some(resolve_for_runtime_load(Some(a), scene_id)),
                    None => None,
                };
                let preview = target
                    .as_ref()
                    .filter(|_| preview_enabled)
                    .and_then(|t| self.images.get(t).cloned());
                Some(HotspotPlacement {
                    id: h.id,
                    kind: h.kind(),
                    position: h.position,
                    marker: self.styles.hotspots.for_kind(h.kind()).clone(),
                    text: h.text().map(str::to_string),
                    popup: h.popup(),
                    audio,
                    target,
                    preview,
                })
            })
            .collect();
        ScenePresentation {
            scene: scene_id.clone(),
            name: scene.name.clone(),
            image,
            starting_point: scene.starting_point,
            hotspots,
        }
    }
}
