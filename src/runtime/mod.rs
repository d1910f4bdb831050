//! Runtime navigation engine used to play back an exported tour.

pub mod driver;
pub mod loader;
pub mod navigator;

pub use driver::{
    preload_all, AmbientAudio, AmbientError, HeadlessRenderer, LoggedAudio, PanoramaRenderer,
    ViewerEvent, ViewerRuntime,
};
pub use loader::{BundleImageLoader, BundleSource, FsImageLoader, HttpImageLoader, ImageLoader};
pub use navigator::{
    HotspotPlacement, NavState, Navigator, PreloadReport, PreloadRequest, ScenePresentation,
    ViewerCommand,
};
