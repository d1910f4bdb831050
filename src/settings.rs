use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::project::{read_json, write_json, StoreError};

// ── Viewer timing ────────────────────────────────────────────────

/// Timing knobs of the navigation engine. Exported bundles embed these so the
/// generated viewer and the headless preview agree. The fade itself is styled
/// by `CustomStyles::transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(default, rename_all = "camelCase")]
#[ts(export)]
pub struct ViewerTiming {
    /// Upper bound on the up-front preload of every scene image.
    #[serde(alias = "preload_budget_ms")]
    pub preload_budget_ms: u64,
    /// The fade is released after this long even if the scene never reports loaded.
    #[serde(alias = "fade_safety_ms")]
    pub fade_safety_ms: u64,
}

impl Default for ViewerTiming {
    fn default() -> Self {
        Self {
            preload_budget_ms: 15_000,
            fade_safety_ms: 1_500,
        }
    }
}

// ── Tool settings ────────────────────────────────────────────────

/// Tool-level settings stored in the OS config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ToolSettings {
    pub version: u32,
    /// Where the authoring key-value store lives.
    pub store_dir: PathBuf,
    /// Name uploads are bound to when none is given on the command line.
    #[serde(default)]
    pub author_name: Option<String>,
    /// Base URL of the hosting service, e.g. `http://localhost:3000`.
    #[serde(default)]
    pub host_url: Option<String>,
    #[serde(default)]
    pub viewer: ViewerTiming,
}

const SETTINGS_VERSION: u32 = 1;

impl ToolSettings {
    pub fn new(store_dir: PathBuf) -> Self {
        Self {
            version: SETTINGS_VERSION,
            store_dir,
            author_name: None,
            host_url: None,
            viewer: ViewerTiming::default(),
        }
    }

    /// Defaults rooted at `app_config_dir`.
    pub fn defaults_for(app_config_dir: &Path) -> Self {
        Self::new(crate::paths::default_store_dir(app_config_dir))
    }
}

/// `<os config dir>/com.panotour.app`, or a temp-dir fallback on platforms
/// without one.
pub fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(crate::paths::APP_ID)
}

/// Load settings from the app config directory. Returns None if no settings
/// file exists or it cannot be parsed.
pub fn load_settings(app_config_dir: &Path) -> Option<ToolSettings> {
    let path = crate::paths::settings_path(app_config_dir);
    if !path.exists() {
        return None;
    }
    match read_json::<ToolSettings>(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            log::warn!("Ignoring unreadable settings at {}: {e}", path.display());
            None
        }
    }
}

/// Load settings, falling back to defaults for `app_config_dir`.
pub fn load_or_default(app_config_dir: &Path) -> ToolSettings {
    load_settings(app_config_dir).unwrap_or_else(|| ToolSettings::defaults_for(app_config_dir))
}

/// Save settings to the app config directory.
pub fn save_settings(app_config_dir: &Path, settings: &ToolSettings) -> Result<(), StoreError> {
    std::fs::create_dir_all(app_config_dir)?;
    write_json(&crate::paths::settings_path(app_config_dir), settings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip() {
        let dir = std::env::temp_dir().join("panotour_test_settings");
        let _ = std::fs::remove_dir_all(&dir);

        let mut settings = ToolSettings::new(PathBuf::from("/some/store"));
        settings.author_name = Some("Ms. Rivera".into());
        settings.viewer.fade_safety_ms = 900;
        save_settings(&dir, &settings).unwrap();

        let loaded = load_settings(&dir).expect("should load");
        assert_eq!(loaded, settings);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_older_file_gets_default_timing() {
        let dir = std::env::temp_dir().join("panotour_test_settings_old");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let old_json = serde_json::json!({ "version": 1, "store_dir": "/s" });
        std::fs::write(crate::paths::settings_path(&dir), old_json.to_string()).unwrap();

        let loaded = load_settings(&dir).expect("should load");
        assert_eq!(loaded.viewer, ViewerTiming::default());
        assert!(loaded.host_url.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_viewer_timing_keys_are_camel_case() {
        let json = serde_json::to_value(ViewerTiming::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "preloadBudgetMs": 15000, "fadeSafetyMs": 1500 }));

        let older: ViewerTiming =
            serde_json::from_str(r#"{ "preload_budget_ms": 200, "fade_safety_ms": 20 }"#).unwrap();
        assert_eq!(older.preload_budget_ms, 200);
        assert_eq!(older.fade_safety_ms, 20);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = std::env::temp_dir().join("panotour_test_no_settings");
        let _ = std::fs::remove_dir_all(&dir);
        assert!(load_settings(&dir).is_none());
        assert_eq!(load_or_default(&dir).store_dir, dir.join("store"));
    }
}
