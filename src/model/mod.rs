pub mod asset;
pub mod hotspot;
pub mod project;
pub mod scene;
pub mod styles;

// Re-export commonly used types at the model level.
pub use asset::{classify, classify_str, AssetRef, RawAsset};
pub use hotspot::{
    Hotspot, HotspotContent, HotspotDraft, HotspotId, HotspotKind, PopupSize, Position,
};
pub use project::{NavigationTarget, Project};
pub use scene::{GlobalSound, Scene, SceneId, StartingPoint};
pub use styles::CustomStyles;
