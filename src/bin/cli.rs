use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;

use panotour::dispatcher::{CommandOutput, CommandResult, EditCommand};
use panotour::document::PositionDocument;
use panotour::error::TourError;
use panotour::export::ExportOptions;
use panotour::hosting::HostClient;
use panotour::model::{
    classify_str, AssetRef, GlobalSound, HotspotContent, HotspotId, HotspotKind, PopupSize,
    Position, SceneId, StartingPoint,
};
use panotour::project::FileStore;
use panotour::runtime::{
    BundleImageLoader, BundleSource, HeadlessRenderer, LoggedAudio, Navigator, ViewerRuntime,
};
use panotour::session::AuthoringSession;
use panotour::settings::{self, ToolSettings};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "panotour-cli", about = "Panoramic tour authoring CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store directory override
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the project: scenes, hotspot counts, default and current scene
    Info,
    /// Scene management
    Scene {
        #[command(subcommand)]
        action: SceneAction,
    },
    /// Hotspot management
    Hotspot {
        #[command(subcommand)]
        action: HotspotAction,
    },
    /// Rename the project
    Rename { name: String },
    /// Re-run the consistency passes and report what changed
    Repair,
    /// Export a viewer bundle as a directory and/or zip file
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        zip: Option<PathBuf>,
        /// Directory packaged asset paths are resolved against
        #[arg(long)]
        asset_root: Option<PathBuf>,
    },
    /// Replace the project with a saved, exported or legacy config file
    Import { file: PathBuf },
    /// Project templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// Export, upload and optionally host the tour
    Publish {
        /// Name the upload is bound to (defaults to the configured author)
        #[arg(long)]
        author: Option<String>,
        /// Host the upload under this URL path
        #[arg(long)]
        path: Option<String>,
        /// Hosting service URL (defaults to the configured one)
        #[arg(long)]
        host_url: Option<String>,
        #[arg(long)]
        asset_root: Option<PathBuf>,
    },
    /// Run an exported bundle headlessly, visiting scenes in order
    Preview {
        /// Bundle directory or URL
        bundle: String,
        /// Scene ids to navigate to, comma separated
        #[arg(long, value_delimiter = ',')]
        visit: Vec<String>,
    },
    /// Tool settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SceneAction {
    /// List scenes in order
    List,
    /// Add a scene and make it current. Prefix a local file with '@' to embed it
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        image: String,
    },
    Delete { id: String },
    Rename {
        id: String,
        #[arg(long)]
        name: String,
    },
    /// Replace a scene's panorama
    Image {
        id: String,
        #[arg(long)]
        image: String,
    },
    /// Make a scene current
    Select { id: String },
    /// Set or clear the starting view
    View {
        id: String,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        yaw: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        pitch: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        roll: f64,
        #[arg(long)]
        clear: bool,
    },
    /// Set or clear the ambient sound
    Sound {
        id: String,
        #[arg(long)]
        audio: Option<String>,
        #[arg(long, default_value_t = GlobalSound::DEFAULT_VOLUME)]
        volume: f64,
        #[arg(long)]
        disabled: bool,
        #[arg(long)]
        clear: bool,
    },
    /// Scenes a navigation hotspot in the current scene may target
    Targets,
}

#[derive(Subcommand)]
enum HotspotAction {
    List {
        #[arg(long)]
        scene: Option<String>,
    },
    /// Add a hotspot (to the current scene unless --scene is given)
    Add {
        #[arg(long)]
        scene: Option<String>,
        #[command(flatten)]
        fields: HotspotFields,
    },
    Update {
        id: u64,
        #[command(flatten)]
        fields: HotspotFields,
    },
    Move {
        id: u64,
        /// "x y z" or "x,y,z"
        #[arg(long, allow_hyphen_values = true)]
        position: String,
    },
    Delete { id: u64 },
}

#[derive(Args)]
struct HotspotFields {
    /// text, audio, text-audio or navigation
    #[arg(long = "type")]
    kind: String,
    /// "x y z" or "x,y,z"
    #[arg(long, allow_hyphen_values = true)]
    position: String,
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    audio: Option<String>,
    /// Target scene id for navigation hotspots
    #[arg(long)]
    target: Option<String>,
    #[arg(long)]
    width: Option<f64>,
    #[arg(long)]
    height: Option<f64>,
}

#[derive(Subcommand)]
enum TemplateAction {
    Save { file: PathBuf },
    Load { file: PathBuf },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        store_dir: Option<PathBuf>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        host_url: Option<String>,
    },
}

// ── Argument conversion ──────────────────────────────────────────

/// `@path` embeds a local file; anything else is a URL, data URI or
/// bundle-relative path.
fn asset_arg(raw: &str) -> Result<AssetRef, TourError> {
    match raw.strip_prefix('@') {
        Some(file) => {
            let path = Path::new(file);
            let bytes = std::fs::read(path)?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("asset");
            Ok(AssetRef::blob(bytes, name))
        }
        None => classify_str(raw),
    }
}

fn position_arg(raw: &str) -> Result<Position, TourError> {
    PositionDocument::Text(raw.replace(',', " "))
        .to_position()
        .ok_or_else(|| TourError::validation(format!("'{raw}' is not an \"x y z\" position")))
}

impl HotspotFields {
    fn content(&self) -> Result<HotspotContent, TourError> {
        let kind = HotspotKind::parse(&self.kind)
            .ok_or_else(|| TourError::validation(format!("Unknown hotspot type '{}'", self.kind)))?;
        let text = || {
            self.text
                .clone()
                .ok_or_else(|| TourError::validation(format!("{kind} hotspots need --text")))
        };
        let audio = || {
            self.audio
                .as_deref()
                .ok_or_else(|| TourError::validation(format!("{kind} hotspots need --audio")))
                .and_then(asset_arg)
        };
        let defaults = PopupSize::default();
        let popup = PopupSize::clamped(
            self.width.unwrap_or(defaults.width),
            self.height.unwrap_or(defaults.height),
        );
        Ok(match kind {
            HotspotKind::Text => HotspotContent::Text { text: text()?, popup },
            HotspotKind::Audio => HotspotContent::Audio { audio: audio()? },
            HotspotKind::TextAudio => HotspotContent::TextAudio {
                text: text()?,
                audio: audio()?,
                popup,
            },
            HotspotKind::Navigation => HotspotContent::Navigation {
                target: self
                    .target
                    .as_deref()
                    .map(SceneId::from)
                    .ok_or_else(|| TourError::validation("navigation hotspots need --target"))?,
            },
        })
    }
}

// ── Output ───────────────────────────────────────────────────────

fn print_output(output: &CommandOutput, raw_json: bool) {
    if raw_json {
        println!("{}", serde_json::to_string_pretty(output).unwrap_or_default());
    } else {
        println!("{}", output.message);
    }
}

fn print_value<T: serde::Serialize>(value: &T, raw_json: bool, text: impl FnOnce() -> String) {
    if raw_json {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    } else {
        println!("{}", text());
    }
}

// ── Commands ─────────────────────────────────────────────────────

type Session = AuthoringSession<FileStore>;

fn scene_command(session: &mut Session, action: SceneAction, raw: bool) -> Result<(), TourError> {
    let cmd = match action {
        SceneAction::List => {
            let project = session.project();
            let rows: Vec<_> = project
                .scenes()
                .map(|s| {
                    serde_json::json!({
                        "id": s.id,
                        "name": s.name,
                        "image": s.image.describe(),
                        "hotspots": s.hotspots.len(),
                    })
                })
                .collect();
            print_value(&rows, raw, || {
                project
                    .scenes()
                    .map(|s| {
                        let mut marks = String::new();
                        if &s.id == project.default_scene_id() {
                            marks.push_str(" [default]");
                        }
                        if &s.id == project.current_scene_id() {
                            marks.push_str(" [current]");
                        }
                        format!(
                            "{:<10} {:<24} {} hotspots  {}{marks}",
                            s.id,
                            s.name,
                            s.hotspots.len(),
                            s.image.describe()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            return Ok(());
        }
        SceneAction::Targets => {
            let targets = session.project().list_navigation_targets();
            print_value(&targets, raw, || {
                targets
                    .iter()
                    .map(|t| format!("{}  {}", t.id, t.name))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            return Ok(());
        }
        SceneAction::Add { name, image } => EditCommand::AddScene {
            name,
            image: asset_arg(&image)?,
        },
        SceneAction::Delete { id } => EditCommand::DeleteScene { scene: id.into() },
        SceneAction::Rename { id, name } => EditCommand::RenameScene {
            scene: id.into(),
            name,
        },
        SceneAction::Image { id, image } => EditCommand::SetSceneImage {
            scene: id.into(),
            image: asset_arg(&image)?,
        },
        SceneAction::Select { id } => EditCommand::SetCurrentScene { scene: id.into() },
        SceneAction::View { id, clear: true, .. } => {
            EditCommand::ClearStartingPoint { scene: id.into() }
        }
        SceneAction::View {
            id, yaw, pitch, roll, ..
        } => EditCommand::SetStartingPoint {
            scene: id.into(),
            point: StartingPoint { yaw, pitch, roll },
        },
        SceneAction::Sound { id, clear: true, .. } => {
            EditCommand::ClearGlobalSound { scene: id.into() }
        }
        SceneAction::Sound {
            id,
            audio,
            volume,
            disabled,
            ..
        } => {
            let audio = audio.ok_or_else(|| TourError::validation("Pass --audio or --clear"))?;
            EditCommand::SetGlobalSound {
                scene: id.into(),
                sound: GlobalSound::new(asset_arg(&audio)?, volume, !disabled),
            }
        }
    };
    let output = session.execute(&cmd)?;
    print_output(&output, raw);
    Ok(())
}

fn hotspot_command(
    session: &mut Session,
    action: HotspotAction,
    raw: bool,
) -> Result<(), TourError> {
    let cmd = match action {
        HotspotAction::List { scene } => {
            let project = session.project();
            let hotspots: Vec<_> = match scene {
                Some(id) => project.hotspots_in(&SceneId::from(id)).iter().collect(),
                None => project.scenes().flat_map(|s| s.hotspots.iter()).collect(),
            };
            print_value(&hotspots, raw, || {
                hotspots
                    .iter()
                    .map(|h| {
                        let detail = match (&h.content, h.text()) {
                            (HotspotContent::Navigation { target }, _) => format!("-> {target}"),
                            (_, Some(text)) => format!("\"{text}\""),
                            _ => h.audio().map(AssetRef::describe).unwrap_or_default(),
                        };
                        format!("{:>4} {:<10} {:<10} {:<20} {detail}", h.id, h.kind(), h.scene_id, h.position)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            return Ok(());
        }
        HotspotAction::Add { scene, fields } => EditCommand::AddHotspot {
            scene: scene
                .map(SceneId::from)
                .unwrap_or_else(|| session.project().current_scene_id().clone()),
            position: position_arg(&fields.position)?,
            content: fields.content()?,
        },
        HotspotAction::Update { id, fields } => EditCommand::UpdateHotspot {
            id: HotspotId(id),
            position: position_arg(&fields.position)?,
            content: fields.content()?,
        },
        HotspotAction::Move { id, position } => EditCommand::MoveHotspot {
            id: HotspotId(id),
            position: position_arg(&position)?,
        },
        HotspotAction::Delete { id } => EditCommand::DeleteHotspot { id: HotspotId(id) },
    };
    let output = session.execute(&cmd)?;
    print_output(&output, raw);
    Ok(())
}

fn info(session: &Session, raw: bool) {
    let project = session.project();
    print_value(project, raw, || {
        let current = project
            .current_scene()
            .map_or_else(String::new, |s| format!("{} ({})", s.name, s.id));
        format!(
            "{}\n  created {}\n  {} scenes, {} hotspots\n  current scene: {current}",
            project.name,
            project.created_at.format("%Y-%m-%d %H:%M"),
            project.scene_count(),
            project.hotspot_count(),
        )
    });
}

async fn export(
    session: &Session,
    settings: &ToolSettings,
    out: Option<PathBuf>,
    zip: Option<PathBuf>,
    asset_root: Option<PathBuf>,
) -> Result<(), TourError> {
    if out.is_none() && zip.is_none() {
        return Err(TourError::validation("Pass --out and/or --zip"));
    }
    let bundle = session.export(ExportOptions {
        asset_root,
        timing: settings.viewer,
    })?;
    if let Some(dir) = out {
        let summary = bundle.write_to_dir(&dir).await?;
        println!(
            "Wrote {} files ({} bytes) to {}",
            summary.files,
            summary.bytes,
            dir.display()
        );
    }
    if let Some(path) = zip {
        bundle.write_zip(&path)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

async fn publish(
    session: &Session,
    settings: &ToolSettings,
    author: Option<String>,
    path: Option<String>,
    host_url: Option<String>,
    asset_root: Option<PathBuf>,
    raw: bool,
) -> Result<(), TourError> {
    let author = author
        .or_else(|| settings.author_name.clone())
        .ok_or_else(|| TourError::validation("Pass --author or set one with `settings set`"))?;
    let host_url = host_url
        .or_else(|| settings.host_url.clone())
        .ok_or_else(|| TourError::validation("Pass --host-url or set one with `settings set`"))?;
    let bundle = session.export(ExportOptions {
        asset_root,
        timing: settings.viewer,
    })?;
    let published = HostClient::new(&host_url)?
        .publish(&bundle, &author, path.as_deref())
        .await?;
    print_value(&published, raw, || match &published.url {
        Some(url) => format!("Uploaded {} and hosted at {url}", published.upload.filename),
        None => format!("Uploaded {}", published.upload.filename),
    });
    Ok(())
}

async fn preview(settings: &ToolSettings, bundle: &str, visit: Vec<String>) -> Result<(), TourError> {
    let loader = BundleImageLoader::new(&BundleSource::parse(bundle))?;
    let config = loader.fetch_config().await;
    let navigator = Navigator::from_config_text(config.as_deref(), settings.viewer);

    let route: Vec<SceneId> = visit.into_iter().map(SceneId::from).collect();
    if let Some(unknown) = route.iter().find(|s| !navigator.project().contains_scene(s)) {
        return Err(TourError::not_found(format!("Scene '{unknown}'")));
    }

    let budget = Duration::from_millis(settings.viewer.preload_budget_ms);
    let (tx, rx) = mpsc::channel(64);
    let runtime = ViewerRuntime::new(
        navigator,
        HeadlessRenderer::with_route(tx, route),
        LoggedAudio::default(),
        loader,
        budget,
    );
    let limit = budget + Duration::from_secs(60);
    let (navigator, renderer, _) = tokio::time::timeout(limit, runtime.run(rx))
        .await
        .map_err(|_| TourError::validation("Preview did not finish"))?;

    let visited: Vec<&str> = renderer.shown.iter().map(SceneId::as_str).collect();
    println!("Visited: {}", visited.join(" -> "));
    if let Some(report) = navigator.preload_report() {
        println!(
            "Preloaded {} scenes ({} failed, {} timed out)",
            report.loaded.len(),
            report.failed.len(),
            report.timed_out.len()
        );
    }
    Ok(())
}

fn settings_command(
    config_dir: &Path,
    mut tool_settings: ToolSettings,
    action: SettingsAction,
    raw: bool,
) -> Result<(), TourError> {
    if let SettingsAction::Set {
        store_dir,
        author,
        host_url,
    } = action
    {
        if let Some(dir) = store_dir {
            tool_settings.store_dir = dir;
        }
        if author.is_some() {
            tool_settings.author_name = author;
        }
        if host_url.is_some() {
            tool_settings.host_url = host_url;
        }
        settings::save_settings(config_dir, &tool_settings)?;
    }
    print_value(&tool_settings, raw, || {
        format!(
            "store: {}\nauthor: {}\nhost: {}\npreload budget: {} ms\nfade safety: {} ms",
            tool_settings.store_dir.display(),
            tool_settings.author_name.as_deref().unwrap_or("-"),
            tool_settings.host_url.as_deref().unwrap_or("-"),
            tool_settings.viewer.preload_budget_ms,
            tool_settings.viewer.fade_safety_ms,
        )
    });
    Ok(())
}

async fn run(cli: Cli, config_dir: &Path, mut tool_settings: ToolSettings) -> Result<(), TourError> {
    let raw = cli.json;
    match cli.command {
        Commands::Settings { action } => {
            return settings_command(config_dir, tool_settings, action, raw);
        }
        Commands::Preview { bundle, visit } => return preview(&tool_settings, &bundle, visit).await,
        _ => {}
    }

    if let Some(dir) = cli.store_dir {
        tool_settings.store_dir = dir;
    }
    let store = FileStore::open(&tool_settings.store_dir)?;
    let mut session = AuthoringSession::open(store)?;

    match cli.command {
        Commands::Info => info(&session, raw),
        Commands::Scene { action } => scene_command(&mut session, action, raw)?,
        Commands::Hotspot { action } => hotspot_command(&mut session, action, raw)?,
        Commands::Rename { name } => {
            let output = session.execute(&EditCommand::RenameProject { name })?;
            print_output(&output, raw);
        }
        Commands::Repair => {
            let output = session.execute(&EditCommand::Repair)?;
            if let CommandResult::Repaired(report) = &output.result {
                if report.is_clean() {
                    log::info!("Project was already consistent");
                }
            }
            print_output(&output, raw);
        }
        Commands::Export {
            out,
            zip,
            asset_root,
        } => export(&session, &tool_settings, out, zip, asset_root).await?,
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            let imported = session.import_json(&text)?;
            println!(
                "Imported \"{}\" ({:?}): {} scenes, {} hotspots, {} skipped; {}",
                imported.project.name,
                imported.shape,
                imported.project.scene_count(),
                imported.project.hotspot_count(),
                imported.skipped_hotspots,
                imported.report
            );
        }
        Commands::Template { action } => match action {
            TemplateAction::Save { file } => {
                session.save_template(&file)?;
                println!("Saved template to {}", file.display());
            }
            TemplateAction::Load { file } => {
                let imported = session.load_template(&file)?;
                println!(
                    "Loaded template \"{}\" with {} scenes",
                    imported.project.name,
                    imported.project.scene_count()
                );
            }
        },
        Commands::Publish {
            author,
            path,
            host_url,
            asset_root,
        } => publish(&session, &tool_settings, author, path, host_url, asset_root, raw).await?,
        Commands::Settings { .. } | Commands::Preview { .. } => {}
    }
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config_dir = settings::app_config_dir();
    let tool_settings = settings::load_or_default(&config_dir);

    if let Err(e) = run(cli, &config_dir, tool_settings).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
