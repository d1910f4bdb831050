//! Async host for the [`Navigator`]: executes its commands against a
//! renderer, an audio sink and an image loader, and feeds events back in.
//!
//! Everything runs on one task. The only overlapping work is the bulk
//! preload, a fan-out/fan-in over every scene image bounded by the preload
//! budget.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::loader::ImageLoader;
use super::navigator::{
    NavState, Navigator, PreloadReport, PreloadRequest, ScenePresentation, ViewerCommand,
};
use crate::error::TourError;
use crate::model::SceneId;

/// The external 3D engine, seen from the navigation core.
pub trait PanoramaRenderer {
    /// Swap in a scene: panorama, hotspots and camera orientation.
    fn display(&mut self, scene: &ScenePresentation) -> Result<(), TourError>;
    fn swap_image(&mut self, scene: &SceneId, path: &str) -> Result<(), TourError>;
    fn fade_out(&mut self, color: &str, duration: Duration);
    fn fade_in(&mut self, duration: Duration);
    fn show_error(&mut self, error: &TourError);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmbientError {
    /// Playback needs a user gesture first.
    AutoplayRefused,
    Failed(String),
}

/// The single ambient-audio channel.
pub trait AmbientAudio {
    fn play(&mut self, path: &str, volume: f64) -> Result<(), AmbientError>;
    fn stop(&mut self);
}

/// Inputs from the renderer and the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    /// A navigation hotspot was activated.
    Navigate(SceneId),
    /// The renderer finished showing a scene.
    SceneLoaded(SceneId),
    UserInteraction,
    DisplayFailed {
        scene: SceneId,
        path: String,
        message: String,
    },
    Shutdown,
}

pub struct ViewerRuntime<R, A, L> {
    navigator: Navigator,
    renderer: R,
    audio: A,
    loader: L,
    preload_budget: Duration,
    timer: Option<(u64, Instant)>,
}

impl<R, A, L> ViewerRuntime<R, A, L>
where
    R: PanoramaRenderer,
    A: AmbientAudio,
    L: ImageLoader,
{
    pub fn new(navigator: Navigator, renderer: R, audio: A, loader: L, preload_budget: Duration) -> Self {
        Self {
            navigator,
            renderer,
            audio,
            loader,
            preload_budget,
            timer: None,
        }
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Start the tour and process events until `Shutdown` or the channel
    /// closes. Returns the parts for inspection.
    pub async fn run(mut self, mut events: mpsc::Receiver<ViewerEvent>) -> (Navigator, R, A) {
        let commands = self.navigator.start();
        self.execute(commands).await;

        loop {
            let deadline = self.timer.map(|(_, at)| at);
            let commands = tokio::select! {
                event = events.recv() => match event {
                    None | Some(ViewerEvent::Shutdown) => break,
                    Some(event) => self.handle(event),
                },
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    match self.timer.take() {
                        Some((ticket, _)) => self.navigator.safety_timeout(ticket),
                        None => Vec::new(),
                    }
                }
            };
            self.execute(commands).await;
        }

        log::debug!("Viewer stopped in {:?}", self.navigator.state());
        self.audio.stop();
        (self.navigator, self.renderer, self.audio)
    }

    fn handle(&mut self, event: ViewerEvent) -> Vec<ViewerCommand> {
        log::debug!("Viewer event {event:?}");
        match event {
            ViewerEvent::Navigate(target) => self.navigator.navigate_to(&target),
            ViewerEvent::SceneLoaded(scene) => {
                let commands = self.navigator.scene_loaded(&scene);
                if matches!(self.navigator.state(), NavState::Ready { .. }) {
                    self.timer = None;
                }
                commands
            }
            ViewerEvent::UserInteraction => self.navigator.user_interaction(),
            ViewerEvent::DisplayFailed {
                scene,
                path,
                message,
            } => self.navigator.display_failed(&scene, &path, &message),
            ViewerEvent::Shutdown => Vec::new(),
        }
    }

    async fn execute(&mut self, commands: Vec<ViewerCommand>) {
        let mut queue: VecDeque<ViewerCommand> = commands.into();
        while let Some(command) = queue.pop_front() {
            match command {
                ViewerCommand::Preload(requests) => {
                    let report = preload_all(&self.loader, requests, self.preload_budget).await;
                    queue.extend(self.navigator.preload_settled(report));
                }
                ViewerCommand::FadeOut { color, duration } => {
                    self.renderer.fade_out(&color, duration);
                    tokio::time::sleep(duration).await;
                }
                ViewerCommand::FadeIn { duration } => self.renderer.fade_in(duration),
                ViewerCommand::Display(presentation) => {
                    if let Err(e) = self.renderer.display(&presentation) {
                        queue.extend(self.navigator.display_failed(
                            &presentation.scene,
                            &presentation.image,
                            &e.to_string(),
                        ));
                    }
                }
                ViewerCommand::SwapImage { scene, path } => {
                    if let Err(e) = self.renderer.swap_image(&scene, &path) {
                        queue.extend(self.navigator.display_failed(&scene, &path, &e.to_string()));
                    }
                }
                ViewerCommand::StopAmbient => self.audio.stop(),
                ViewerCommand::PlayAmbient {
                    scene,
                    path,
                    volume,
                } => match self.audio.play(&path, volume) {
                    Ok(()) => {}
                    Err(AmbientError::AutoplayRefused) => self.navigator.autoplay_refused(&scene),
                    Err(AmbientError::Failed(message)) => {
                        log::warn!("Ambient audio '{path}' for {scene} failed: {message}");
                    }
                },
                ViewerCommand::ArmSafetyTimer { ticket, after } => {
                    self.timer = Some((ticket, Instant::now() + after));
                }
                ViewerCommand::ShowError(error) => self.renderer.show_error(&error),
            }
        }
    }
}

/// Load every requested image concurrently and wait for all of them, or for
/// `budget` to run out. Never fails: per-scene errors are counted, and scenes
/// still pending at the deadline are reported as timed out.
pub async fn preload_all<L: ImageLoader>(
    loader: &L,
    requests: Vec<PreloadRequest>,
    budget: Duration,
) -> PreloadReport {
    let report = Mutex::new(PreloadReport::default());
    let jobs = requests.iter().map(|request| {
        let report = &report;
        async move {
            match loader.load(&request.path).await {
                Ok(bytes) => {
                    log::debug!("Preloaded {} ({} bytes)", request.scene, bytes.len());
                    report.lock().loaded.push(request.scene.clone());
                }
                Err(e) => {
                    log::warn!("Preload of '{}' for {} failed: {e}", request.path, request.scene);
                    report.lock().failed.push(request.scene.clone());
                }
            }
        }
    });
    let finished = tokio::time::timeout(budget, join_all(jobs)).await.is_ok();

    let mut report = report.into_inner();
    if !finished {
        let settled: Vec<SceneId> = report.loaded.iter().chain(&report.failed).cloned().collect();
        report.timed_out = requests
            .into_iter()
            .map(|r| r.scene)
            .filter(|s| !settled.contains(s))
            .collect();
        log::warn!(
            "Preload budget of {budget:?} exhausted with {} scenes pending",
            report.timed_out.len()
        );
    }
    report
}

// ── Headless host ───────────────────────────────────────────────────

/// Renderer that logs instead of drawing and reports every scene as loaded
/// right away. Drives previews from the command line.
pub struct HeadlessRenderer {
    events: mpsc::Sender<ViewerEvent>,
    route: Option<VecDeque<SceneId>>,
    pub shown: Vec<SceneId>,
}

impl HeadlessRenderer {
    pub fn new(events: mpsc::Sender<ViewerEvent>) -> Self {
        Self {
            events,
            route: None,
            shown: Vec::new(),
        }
    }

    /// Walk `route` one scene per completed display, then shut the viewer down.
    pub fn with_route(events: mpsc::Sender<ViewerEvent>, route: Vec<SceneId>) -> Self {
        Self {
            events,
            route: Some(route.into()),
            shown: Vec::new(),
        }
    }

    fn send(&self, event: ViewerEvent) {
        if let Err(e) = self.events.try_send(event) {
            log::warn!("Viewer event dropped: {e}");
        }
    }
}

impl PanoramaRenderer for HeadlessRenderer {
    fn display(&mut self, scene: &ScenePresentation) -> Result<(), TourError> {
        log::info!(
            "Showing {} '{}' ({}, {} hotspots)",
            scene.scene,
            scene.name,
            scene.image,
            scene.hotspots.len()
        );
        for hotspot in &scene.hotspots {
            log::info!("  {} {} at {}", hotspot.kind, hotspot.id, hotspot.position);
        }
        self.shown.push(scene.scene.clone());
        self.send(ViewerEvent::SceneLoaded(scene.scene.clone()));
        if let Some(route) = &mut self.route {
            let next = match route.pop_front() {
                Some(target) => ViewerEvent::Navigate(target),
                None => ViewerEvent::Shutdown,
            };
            self.send(next);
        }
        Ok(())
    }

    fn swap_image(&mut self, scene: &SceneId, path: &str) -> Result<(), TourError> {
        log::info!("Fallback image for {scene}: {path}");
        Ok(())
    }

    fn fade_out(&mut self, color: &str, duration: Duration) {
        log::debug!("Fade out to {color} over {duration:?}");
    }

    fn fade_in(&mut self, duration: Duration) {
        log::debug!("Fade in over {duration:?}");
    }

    fn show_error(&mut self, error: &TourError) {
        log::error!("{error}");
    }
}

/// Audio sink that only logs.
#[derive(Debug, Default)]
pub struct LoggedAudio {
    pub playing: Option<String>,
}

impl AmbientAudio for LoggedAudio {
    fn play(&mut self, path: &str, volume: f64) -> Result<(), AmbientError> {
        log::info!("Ambient: {path} at volume {volume:.2}");
        self.playing = Some(path.to_string());
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(path) = self.playing.take() {
            log::info!("Ambient stopped: {path}");
        }
    }
}
