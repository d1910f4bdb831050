use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::hotspot::HotspotKind;

/// Visual theme of the tour. Inert data: copied wholesale into exported
/// bundles and template documents, never interpreted by the core beyond that.
///
/// Every field has a default so documents written by older versions (or with
/// only a few overrides) still load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct CustomStyles {
    pub hotspots: HotspotStyles,
    pub popup: PopupStyle,
    pub audio_controls: AudioControlStyle,
    pub navigation_preview: NavigationPreviewStyle,
    pub transition: TransitionStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct HotspotStyles {
    pub text: MarkerStyle,
    pub audio: MarkerStyle,
    pub text_audio: MarkerStyle,
    pub navigation: MarkerStyle,
}

impl HotspotStyles {
    pub fn for_kind(&self, kind: HotspotKind) -> &MarkerStyle {
        match kind {
            HotspotKind::Text => &self.text,
            HotspotKind::Audio => &self.audio,
            HotspotKind::TextAudio => &self.text_audio,
            HotspotKind::Navigation => &self.navigation,
        }
    }
}

impl Default for HotspotStyles {
    fn default() -> Self {
        Self {
            text: MarkerStyle::new("#4A90E2", "ℹ"),
            audio: MarkerStyle::new("#FF6B6B", "♪"),
            text_audio: MarkerStyle::new("#9B59B6", "♫"),
            navigation: MarkerStyle::new("#2ECC71", "➜"),
        }
    }
}

/// Marker appearance for one hotspot kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerStyle {
    pub color: String,
    pub icon: String,
    pub size: f64,
    pub opacity: f64,
    pub hover_scale: f64,
}

impl MarkerStyle {
    fn new(color: &str, icon: &str) -> Self {
        Self {
            color: color.to_string(),
            icon: icon.to_string(),
            ..Self::default()
        }
    }
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            color: "#FFFFFF".to_string(),
            icon: "●".to_string(),
            size: 0.6,
            opacity: 0.9,
            hover_scale: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct PopupStyle {
    pub background_color: String,
    pub text_color: String,
    pub border_color: String,
    pub border_width: f64,
    pub border_radius: f64,
    pub opacity: f64,
    pub font_size: f64,
    pub padding: f64,
    pub close_button_color: String,
}

impl Default for PopupStyle {
    fn default() -> Self {
        Self {
            background_color: "#1A1A2E".to_string(),
            text_color: "#FFFFFF".to_string(),
            border_color: "#4A90E2".to_string(),
            border_width: 0.02,
            border_radius: 0.1,
            opacity: 0.92,
            font_size: 0.12,
            padding: 0.2,
            close_button_color: "#FF6B6B".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioControlStyle {
    pub play_color: String,
    pub pause_color: String,
    pub size: f64,
    pub opacity: f64,
}

impl Default for AudioControlStyle {
    fn default() -> Self {
        Self {
            play_color: "#2ECC71".to_string(),
            pause_color: "#E67E22".to_string(),
            size: 0.5,
            opacity: 0.9,
        }
    }
}

/// Thumbnail shown while hovering a navigation hotspot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationPreviewStyle {
    pub enabled: bool,
    pub width: f64,
    pub height: f64,
    pub border_color: String,
}

impl Default for NavigationPreviewStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 1.6,
            height: 0.9,
            border_color: "#FFFFFF".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct TransitionStyle {
    pub fade_color: String,
    pub fade_duration_ms: u32,
}

impl Default for TransitionStyle {
    fn default() -> Self {
        Self {
            fade_color: "#000000".to_string(),
            fade_duration_ms: 500,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_fills_defaults() {
        let json = serde_json::json!({
            "hotspots": { "navigation": { "color": "#123456" } },
            "transition": { "fadeDurationMs": 800 }
        });
        let styles: CustomStyles = serde_json::from_value(json).unwrap();
        assert_eq!(styles.hotspots.navigation.color, "#123456");
        assert!((styles.hotspots.navigation.size - 0.6).abs() < f64::EPSILON);
        assert_eq!(styles.hotspots.text, HotspotStyles::default().text);
        assert_eq!(styles.transition.fade_duration_ms, 800);
        assert_eq!(styles.popup, PopupStyle::default());
    }

    #[test]
    fn marker_lookup_by_kind() {
        let styles = CustomStyles::default();
        assert_eq!(styles.hotspots.for_kind(HotspotKind::Audio).color, "#FF6B6B");
    }
}
