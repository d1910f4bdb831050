//! Asset reference resolution: where a media reference lands in an exported
//! bundle, and what path the viewer loads it from at runtime.

use crate::model::asset::sanitize_filename;
use crate::model::{AssetRef, HotspotId, SceneId};
use crate::paths;

/// Which slot of the project an asset fills. Decides its packaged filename.
#[derive(Debug, Clone, Copy)]
pub enum AssetSlot<'a> {
    SceneImage { scene: &'a SceneId },
    HotspotAudio { scene: &'a SceneId, hotspot: HotspotId },
    GlobalSound { scene: &'a SceneId },
}

/// Result of resolving one reference for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// Value written into `config.json`.
    pub path: String,
    /// Bytes that must be written to `path` inside the bundle, if any.
    pub payload: Option<Vec<u8>>,
}

/// Resolve a reference for export.
///
/// - `RemoteUrl`: kept verbatim, nothing to copy.
/// - `EmbeddedBlob`: gets a generated packaged filename and its bytes are
///   handed back for copying into the bundle.
/// - `PackagedPath`: kept verbatim (minus a leading `./`).
pub fn resolve_for_export(asset: &AssetRef, slot: AssetSlot<'_>) -> ResolvedAsset {
    match asset {
        AssetRef::RemoteUrl { url } => ResolvedAsset {
            path: url.clone(),
            payload: None,
        },
        AssetRef::PackagedPath { path } => ResolvedAsset {
            path: path.trim_start_matches("./").to_string(),
            payload: None,
        },
        AssetRef::EmbeddedBlob {
            bytes, filename, ..
        } => {
            let filename = sanitize_filename(filename);
            let path = match slot {
                AssetSlot::SceneImage { scene } => paths::scene_image_path(scene),
                AssetSlot::HotspotAudio { scene, hotspot } => {
                    paths::hotspot_audio_path(scene, hotspot, &filename)
                }
                AssetSlot::GlobalSound { scene } => paths::global_sound_path(scene, &filename),
            };
            ResolvedAsset {
                path,
                payload: Some(bytes.clone()),
            }
        }
    }
}

/// Path the viewer should load for a reference.
///
/// Remote URLs load as-is, packaged paths load relative to the bundle root,
/// and embedded blobs load from an inline `data:` URI. Anything that cannot be
/// resolved (missing or empty reference) falls back to
/// `./images/<sceneId>.jpg` so a malformed entry never stops the loader.
pub fn resolve_for_runtime_load(asset: Option<&AssetRef>, scene: &SceneId) -> String {
    match asset {
        Some(asset) if !asset.is_empty() => match asset {
            AssetRef::RemoteUrl { url } => url.clone(),
            AssetRef::PackagedPath { path } => paths::viewer_relative(path),
            AssetRef::EmbeddedBlob { .. } => asset.to_inline_string(),
        },
        _ => runtime_fallback(scene),
    }
}

pub fn runtime_fallback(scene: &SceneId) -> String {
    paths::viewer_relative(&paths::scene_image_path(scene))
}

/// A packaged path is only copied from disk when it stays inside the asset root.
pub fn is_safe_relative(path: &str) -> bool {
    let path = path.trim_start_matches("./");
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && !path.contains(':')
        && path.split('/').all(|part| part != "..")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn embedded_scene_image_exports_under_images() {
        let scene = SceneId::from("scene_3");
        let asset = AssetRef::blob(vec![1, 2, 3], "IMG_0042.JPG");
        let resolved = resolve_for_export(&asset, AssetSlot::SceneImage { scene: &scene });
        assert_eq!(resolved.path, "images/scene_3.jpg");
        assert_eq!(resolved.payload, Some(vec![1, 2, 3]));
    }

    #[test]
    fn remote_audio_exports_unchanged() {
        let scene = SceneId::from("scene_1");
        let asset = AssetRef::remote("https://cdn.example.com/birds.mp3");
        let resolved = resolve_for_export(
            &asset,
            AssetSlot::HotspotAudio {
                scene: &scene,
                hotspot: HotspotId(2),
            },
        );
        assert_eq!(resolved.path, "https://cdn.example.com/birds.mp3");
        assert!(resolved.payload.is_none());
    }

    #[test]
    fn embedded_hotspot_audio_gets_scene_and_id_prefix() {
        let scene = SceneId::from("scene_42");
        let asset = AssetRef::blob(vec![0xFF, 0xFB], "clip.mp3");
        let resolved = resolve_for_export(
            &asset,
            AssetSlot::HotspotAudio {
                scene: &scene,
                hotspot: HotspotId(7),
            },
        );
        assert_eq!(resolved.path, "audio/scene_42_7_clip.mp3");
    }

    #[test]
    fn embedded_global_sound_gets_global_prefix() {
        let scene = SceneId::from("scene_2");
        let asset = AssetRef::blob(vec![1], "wind.ogg");
        let resolved = resolve_for_export(&asset, AssetSlot::GlobalSound { scene: &scene });
        assert_eq!(resolved.path, "audio/global_scene_2_wind.ogg");
    }

    #[test]
    fn packaged_path_is_kept() {
        let scene = SceneId::from("scene_1");
        let asset = AssetRef::packaged("./images/lobby.jpg");
        let resolved = resolve_for_export(&asset, AssetSlot::SceneImage { scene: &scene });
        assert_eq!(resolved.path, "images/lobby.jpg");
        assert!(resolved.payload.is_none());
    }

    #[test]
    fn runtime_load_paths() {
        let scene = SceneId::from("scene_5");
        assert_eq!(
            resolve_for_runtime_load(Some(&AssetRef::packaged("images/a.jpg")), &scene),
            "./images/a.jpg"
        );
        assert_eq!(
            resolve_for_runtime_load(Some(&AssetRef::remote("https://x.test/a.jpg")), &scene),
            "https://x.test/a.jpg"
        );
        assert_eq!(resolve_for_runtime_load(None, &scene), "./images/scene_5.jpg");
        assert_eq!(
            resolve_for_runtime_load(Some(&AssetRef::packaged("  ")), &scene),
            "./images/scene_5.jpg"
        );
        assert!(resolve_for_runtime_load(Some(&AssetRef::blob(vec![1], "a.png")), &scene)
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn relative_path_safety() {
        assert!(is_safe_relative("images/a.jpg"));
        assert!(is_safe_relative("./audio/b.mp3"));
        assert!(!is_safe_relative("../secret.txt"));
        assert!(!is_safe_relative("/etc/passwd"));
        assert!(!is_safe_relative("C:\\x.jpg"));
    }
}
