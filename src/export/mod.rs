//! Project → bundle. Every asset reference is rewritten to a bundle-relative
//! path, embedded bytes become files, and the viewer is generated alongside
//! `config.json`.

pub mod viewer;

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::assets::{is_safe_relative, resolve_for_export, AssetSlot};
use crate::document::ProjectDocument;
use crate::error::TourError;
use crate::model::{AssetRef, CustomStyles, Project};
use crate::paths;
use crate::project::atomic_write;
use crate::settings::ViewerTiming;

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Directory `PackagedPath` references are relative to. When set, the
    /// referenced files are copied into the bundle under the same path.
    pub asset_root: Option<PathBuf>,
    pub timing: ViewerTiming,
}

/// Contents of one bundle entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleFile {
    Text(String),
    Bytes(Vec<u8>),
    /// Copied from a static asset on disk when the bundle is written.
    Copy(PathBuf),
}

/// A finished, self-contained tour, keyed by bundle-relative path.
#[derive(Debug, Clone)]
pub struct Bundle {
    files: IndexMap<String, BundleFile>,
    document: ProjectDocument,
}

/// Per-file outcome summary of [`Bundle::write_to_dir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub files: usize,
    pub bytes: u64,
}

impl Bundle {
    pub fn files(&self) -> impl Iterator<Item = (&str, &BundleFile)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn file(&self, path: &str) -> Option<&BundleFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn document(&self) -> &ProjectDocument {
        &self.document
    }

    /// The `config.json` text.
    pub fn config_json(&self) -> &str {
        match self.files.get(paths::CONFIG_JSON) {
            Some(BundleFile::Text(text)) => text,
            _ => "",
        }
    }

    /// Write every entry under `dir`. Files are written concurrently; the call
    /// returns once all of them have finished, with the first error if any
    /// failed.
    pub async fn write_to_dir(&self, dir: &Path) -> Result<WriteSummary, TourError> {
        self.check_entries()?;
        tokio::fs::create_dir_all(dir).await?;
        let mut tasks = JoinSet::new();
        for (rel, file) in &self.files {
            let dest = dir.join(rel);
            let file = file.clone();
            let rel = rel.clone();
            tasks.spawn(async move {
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let bytes = match file {
                    BundleFile::Text(text) => {
                        tokio::fs::write(&dest, text.as_bytes()).await?;
                        text.len() as u64
                    }
                    BundleFile::Bytes(bytes) => {
                        tokio::fs::write(&dest, &bytes).await?;
                        bytes.len() as u64
                    }
                    BundleFile::Copy(src) => tokio::fs::copy(&src, &dest).await?,
                };
                log::debug!("Wrote {rel} ({bytes} bytes)");
                Ok::<u64, std::io::Error>(bytes)
            });
        }

        let mut summary = WriteSummary::default();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(bytes)) => {
                    summary.files += 1;
                    summary.bytes += bytes;
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(TourError::from(e));
                }
                Err(e) => {
                    first_error.get_or_insert(TourError::IoError {
                        message: format!("bundle write task failed: {e}"),
                    });
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!(
                    "Bundle written to {} ({} files, {} bytes)",
                    dir.display(),
                    summary.files,
                    summary.bytes
                );
                Ok(summary)
            }
        }
    }

    /// Pack the bundle into a zip archive, e.g. for upload.
    pub fn to_zip(&self) -> Result<Vec<u8>, TourError> {
        self.check_entries()?;
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (rel, file) in &self.files {
            writer.start_file(rel.as_str(), options)?;
            match file {
                BundleFile::Text(text) => writer.write_all(text.as_bytes())?,
                BundleFile::Bytes(bytes) => writer.write_all(bytes)?,
                BundleFile::Copy(src) => writer.write_all(&std::fs::read(src)?)?,
            }
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Every entry must stay inside the bundle root.
    fn check_entries(&self) -> Result<(), TourError> {
        match self.files.keys().find(|rel| !is_safe_relative(rel)) {
            Some(rel) => Err(TourError::validation(format!(
                "Bundle entry '{rel}' would be written outside the bundle"
            ))),
            None => Ok(()),
        }
    }

    /// Write the zip archive to `path` atomically.
    pub fn write_zip(&self, path: &Path) -> Result<(), TourError> {
        atomic_write(path, &self.to_zip()?)?;
        Ok(())
    }
}

/// Builds bundles. Holds the style tree by reference; nothing is read from
/// shared state.
pub struct Exporter<'a> {
    styles: &'a CustomStyles,
    options: ExportOptions,
}

impl<'a> Exporter<'a> {
    pub fn new(styles: &'a CustomStyles, options: ExportOptions) -> Self {
        Self { styles, options }
    }

    /// Export `project`. The bundle always opens on the first scene in
    /// authoring order, regardless of which scene the author has open.
    pub fn export(&self, project: &Project) -> Result<Bundle, TourError> {
        let entry = project.default_scene_id().clone();
        let mut assets: IndexMap<String, BundleFile> = IndexMap::new();

        let mut document = ProjectDocument::build(project, self.styles, &entry, |asset, slot| {
            self.collect_asset(asset, slot, &mut assets)
        });
        document.viewer = Some(self.options.timing);

        let config = serde_json::to_string_pretty(&document)
            .map_err(|e| TourError::serialization(e.to_string()))?;
        let script = viewer::script_js(self.styles, &self.options.timing)
            .map_err(|e| TourError::serialization(e.to_string()))?;

        let mut files = IndexMap::new();
        files.insert(paths::INDEX_HTML.to_string(), BundleFile::Text(viewer::index_html(&project.name)));
        files.insert(paths::SCRIPT_JS.to_string(), BundleFile::Text(script));
        files.insert(paths::STYLE_CSS.to_string(), BundleFile::Text(viewer::style_css(self.styles)));
        files.insert(paths::CONFIG_JSON.to_string(), BundleFile::Text(config));
        files.insert(
            paths::README_MD.to_string(),
            BundleFile::Text(viewer::readme(&project.name, project.scene_count(), project.hotspot_count())),
        );
        let asset_count = assets.len();
        files.extend(assets);

        log::info!(
            "Exported '{}': {} scenes, {} hotspots, {asset_count} asset files, entry {entry}",
            project.name,
            project.scene_count(),
            project.hotspot_count()
        );
        Ok(Bundle { files, document })
    }

    /// Resolve one reference and record the file it needs, if any. Returns the
    /// string written into `config.json`.
    fn collect_asset(
        &self,
        asset: &AssetRef,
        slot: AssetSlot<'_>,
        assets: &mut IndexMap<String, BundleFile>,
    ) -> String {
        let resolved = resolve_for_export(asset, slot);
        if let Some(bytes) = resolved.payload {
            assets.insert(resolved.path.clone(), BundleFile::Bytes(bytes));
        } else if let (AssetRef::PackagedPath { .. }, Some(root)) = (asset, &self.options.asset_root) {
            if !is_safe_relative(&resolved.path) {
                log::warn!("Not copying '{}': path leaves the asset root", resolved.path);
            } else {
                let src = root.join(&resolved.path);
                if src.is_file() {
                    assets.insert(resolved.path.clone(), BundleFile::Copy(src));
                } else {
                    log::warn!("Static asset '{}' not found under {}", resolved.path, root.display());
                }
            }
        }
        resolved.path
    }
}

/// Export with the given styles and default options.
pub fn export_project(project: &Project, styles: &CustomStyles) -> Result<Bundle, TourError> {
    Exporter::new(styles, ExportOptions::default()).export(project)
}

// ── Templates ───────────────────────────────────────────────────────

/// Author-facing template document. Blobs stay inline as `data:` URIs so the
/// file is self-contained, and the author's open scene is kept.
pub fn template_document(project: &Project, styles: &CustomStyles) -> ProjectDocument {
    ProjectDocument::build(project, styles, project.current_scene_id(), |asset, _| {
        asset.to_inline_string()
    })
}

pub fn save_template(path: &Path, project: &Project, styles: &CustomStyles) -> Result<(), TourError> {
    crate::project::write_json(path, &template_document(project, styles))?;
    log::info!("Saved template '{}' to {}", project.name, path.display());
    Ok(())
}

pub fn load_template(path: &Path) -> Result<crate::import::ImportedProject, TourError> {
    let text = std::fs::read_to_string(path)?;
    crate::import::import_project(&text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::model::{
        GlobalSound, HotspotContent, HotspotDraft, PopupSize, Position, Scene, SceneId,
    };

    fn sample() -> Project {
        let mut project = Project::new("Museum", "Lobby", AssetRef::blob(vec![0xFF, 0xD8, 0xFF], "lobby.JPG"));
        let lobby = project.default_scene_id().clone();
        let hall = project
            .add_scene("Hall", AssetRef::remote("https://cdn.test/hall.jpg"))
            .unwrap();
        project
            .add_hotspot(
                &lobby,
                HotspotDraft::new(
                    Position::new(0.0, 1.0, -3.0),
                    HotspotContent::TextAudio {
                        text: "Welcome".into(),
                        audio: AssetRef::blob(vec![1, 2, 3], "clip.mp3"),
                        popup: PopupSize::default(),
                    },
                ),
            )
            .unwrap();
        project
            .add_hotspot(
                &lobby,
                HotspotDraft::new(Position::new(3.0, 1.0, 0.0), HotspotContent::Navigation { target: hall.clone() }),
            )
            .unwrap();
        project
            .set_global_sound(&hall, GlobalSound::new(AssetRef::blob(vec![9], "wind.ogg"), 0.3, true))
            .unwrap();
        project
    }

    #[test]
    fn bundle_has_fixed_layout() {
        let bundle = export_project(&sample(), &CustomStyles::default()).unwrap();
        for name in ["index.html", "script.js", "style.css", "config.json", "README.md"] {
            assert!(bundle.file(name).is_some(), "missing {name}");
        }
        assert_eq!(bundle.file("images/scene_1.jpg"), Some(&BundleFile::Bytes(vec![0xFF, 0xD8, 0xFF])));
        assert_eq!(bundle.file("audio/scene_1_1_clip.mp3"), Some(&BundleFile::Bytes(vec![1, 2, 3])));
        assert_eq!(bundle.file("audio/global_scene_2_wind.ogg"), Some(&BundleFile::Bytes(vec![9])));
    }

    #[test]
    fn config_references_are_rewritten() {
        let bundle = export_project(&sample(), &CustomStyles::default()).unwrap();
        let config: serde_json::Value = serde_json::from_str(bundle.config_json()).unwrap();
        assert_eq!(config["scenes"]["scene_1"]["image"], "images/scene_1.jpg");
        assert_eq!(config["scenes"]["scene_2"]["image"], "https://cdn.test/hall.jpg");
        assert_eq!(config["scenes"]["scene_1"]["hotspots"][0]["audio"], "audio/scene_1_1_clip.mp3");
        assert_eq!(
            config["scenes"]["scene_2"]["globalSound"]["audio"],
            "audio/global_scene_2_wind.ogg"
        );
        assert!(!bundle.config_json().contains("data:"));
    }

    #[test]
    fn entry_scene_is_first_scene() {
        let project = sample();
        assert_eq!(project.current_scene_id().as_str(), "scene_2");
        let bundle = export_project(&project, &CustomStyles::default()).unwrap();
        assert_eq!(bundle.document().current_scene.as_deref(), Some("scene_1"));
    }

    #[test]
    fn static_assets_are_copied_from_root() {
        let root = std::env::temp_dir().join("panotour_test_static_assets");
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(root.join("images")).unwrap();
        std::fs::write(root.join("images/lobby.jpg"), b"jpg").unwrap();

        let mut project = Project::new("Static", "Lobby", AssetRef::packaged("images/lobby.jpg"));
        project.add_scene("Gone", AssetRef::packaged("images/missing.jpg")).unwrap();
        project.add_scene("Escape", AssetRef::packaged("../outside.jpg")).unwrap();
        let options = ExportOptions {
            asset_root: Some(root.clone()),
            ..ExportOptions::default()
        };
        let styles = CustomStyles::default();
        let bundle = Exporter::new(&styles, options).export(&project).unwrap();

        assert_eq!(
            bundle.file("images/lobby.jpg"),
            Some(&BundleFile::Copy(root.join("images/lobby.jpg")))
        );
        assert!(bundle.file("images/missing.jpg").is_none());
        assert!(bundle.file("../outside.jpg").is_none());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn write_to_dir_writes_every_file() {
        let dir = std::env::temp_dir().join("panotour_test_bundle_dir");
        let _ = std::fs::remove_dir_all(&dir);

        let bundle = export_project(&sample(), &CustomStyles::default()).unwrap();
        let summary = bundle.write_to_dir(&dir).await.unwrap();
        assert_eq!(summary.files, bundle.len());
        assert_eq!(std::fs::read(dir.join("audio/scene_1_1_clip.mp3")).unwrap(), vec![1, 2, 3]);
        assert!(dir.join("config.json").is_file());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn escaping_entries_are_never_written() {
        let root = std::env::temp_dir().join("panotour_test_bundle_escape");
        let _ = std::fs::remove_dir_all(&root);
        let dir = root.join("a").join("bundle");

        let escaped = SceneId::from("../../escaped");
        let mut scenes = IndexMap::new();
        scenes.insert(
            escaped.clone(),
            Scene::new(escaped, "Bad", AssetRef::blob(vec![0xFF, 0xD8], "bad.jpg")),
        );
        let (project, _) =
            Project::from_parts("Bad".into(), chrono::Utc::now(), scenes, None, 0).unwrap();
        let bundle = export_project(&project, &CustomStyles::default()).unwrap();
        assert!(bundle.file("images/../../escaped.jpg").is_some());

        let err = bundle.write_to_dir(&dir).await.unwrap_err();
        assert!(matches!(err, TourError::ValidationError { .. }));
        assert!(!root.join("a").join("escaped.jpg").exists());
        assert!(!dir.exists());
        assert!(bundle.to_zip().is_err());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn zip_contains_every_entry() {
        let bundle = export_project(&sample(), &CustomStyles::default()).unwrap();
        let bytes = bundle.to_zip().unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), bundle.len());
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"config.json"));
        assert!(names.contains(&"images/scene_1.jpg"));
    }

    #[test]
    fn template_keeps_blobs_inline_and_current_scene() {
        let project = sample();
        let doc = template_document(&project, &CustomStyles::default());
        assert_eq!(doc.current_scene.as_deref(), Some("scene_2"));
        let scenes = doc.scenes.unwrap();
        assert!(scenes["scene_1"].image.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn template_file_round_trips() {
        let dir = std::env::temp_dir().join("panotour_test_template");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("museum.json");

        let project = sample();
        let mut styles = CustomStyles::default();
        styles.transition.fade_color = "#222222".into();
        save_template(&path, &project, &styles).unwrap();

        let loaded = load_template(&path).unwrap();
        assert_eq!(loaded.styles, styles);
        assert_eq!(loaded.project.scene_count(), 2);
        assert_eq!(loaded.project.current_scene_id().as_str(), "scene_2");
        let lobby = loaded.project.scenes().next().unwrap();
        match &lobby.image {
            AssetRef::EmbeddedBlob { bytes, .. } => assert_eq!(bytes, &vec![0xFF, 0xD8, 0xFF]),
            other => panic!("expected blob, got {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
