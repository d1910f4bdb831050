//! Centralized path definitions for bundle layout, store keys and data files.
//!
//! This module is the single source of truth for leaf filenames, directory names,
//! and path-building functions. No other module should hard-code these strings.

use std::path::{Path, PathBuf};

use crate::model::{HotspotId, SceneId};

// ── Application identity ─────────────────────────────────────────

pub const APP_ID: &str = "com.panotour.app";

// ── Export bundle layout ─────────────────────────────────────────

pub const INDEX_HTML: &str = "index.html";
pub const SCRIPT_JS: &str = "script.js";
pub const STYLE_CSS: &str = "style.css";
pub const CONFIG_JSON: &str = "config.json";
pub const README_MD: &str = "README.md";
pub const IMAGES_DIR: &str = "images";
pub const AUDIO_DIR: &str = "audio";

/// Shown when neither a scene's image nor its `images/<id>.jpg` fallback loads.
pub const BLANK_PANORAMA: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAICAgAAAACH5BAAAAAAALAAAAAABAAEAAAICRAEAOw==";

/// `images/<sceneId>.jpg`
pub fn scene_image_path(scene: &SceneId) -> String {
    format!("{IMAGES_DIR}/{scene}.jpg")
}

/// `audio/<sceneId>_<hotspotId>_<filename>`
pub fn hotspot_audio_path(scene: &SceneId, hotspot: HotspotId, filename: &str) -> String {
    format!("{AUDIO_DIR}/{scene}_{hotspot}_{filename}")
}

/// `audio/global_<sceneId>_<filename>`
pub fn global_sound_path(scene: &SceneId, filename: &str) -> String {
    format!("{AUDIO_DIR}/global_{scene}_{filename}")
}

/// Relative path as the viewer fetches it: `./images/scene_1.jpg`.
pub fn viewer_relative(path: &str) -> String {
    let trimmed = path.trim_start_matches("./").trim_start_matches('/');
    format!("./{trimmed}")
}

// ── Authoring store ──────────────────────────────────────────────

/// Key of the serialized project (scenes + hotspots) entry.
pub const PROJECT_KEY: &str = "vr_project";
/// Key of the custom style tree entry. Stored independently of the project.
pub const STYLES_KEY: &str = "vr_custom_styles";

pub fn store_entry_path(store_dir: &Path, key: &str) -> PathBuf {
    store_dir.join(format!("{key}.json"))
}

// ── Config-dir functions ─────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";
pub const STORE_DIR: &str = "store";

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

pub fn default_store_dir(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(STORE_DIR)
}

// ── Hosting service data dir ─────────────────────────────────────

pub const UPLOADS_DIR: &str = "uploads";
pub const HOSTED_DIR: &str = "hosted";
pub const UPLOAD_INDEX_FILE: &str = "uploads.json";
/// URL prefix hosted tours are served under.
pub const HOSTED_URL_PREFIX: &str = "/tours";

pub fn uploads_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(UPLOADS_DIR)
}

pub fn hosted_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(HOSTED_DIR)
}

pub fn upload_index_path(data_dir: &Path) -> PathBuf {
    data_dir.join(UPLOAD_INDEX_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_asset_paths() {
        let scene = SceneId::from("scene_42");
        assert_eq!(scene_image_path(&scene), "images/scene_42.jpg");
        assert_eq!(
            hotspot_audio_path(&scene, HotspotId(7), "clip.mp3"),
            "audio/scene_42_7_clip.mp3"
        );
        assert_eq!(global_sound_path(&scene, "wind.ogg"), "audio/global_scene_42_wind.ogg");
    }

    #[test]
    fn viewer_relative_normalizes_prefix() {
        assert_eq!(viewer_relative("images/a.jpg"), "./images/a.jpg");
        assert_eq!(viewer_relative("./images/a.jpg"), "./images/a.jpg");
        assert_eq!(viewer_relative("/images/a.jpg"), "./images/a.jpg");
    }
}
