use std::time::Instant;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::consistency::RepairReport;
use crate::error::TourError;
use crate::model::{
    AssetRef, CustomStyles, GlobalSound, HotspotContent, HotspotDraft, HotspotId, Position,
    Project, SceneId, StartingPoint,
};

/// An undoable authoring command. Each variant corresponds to one user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EditCommand {
    AddScene {
        name: String,
        image: AssetRef,
    },
    DeleteScene {
        scene: SceneId,
    },
    RenameScene {
        scene: SceneId,
        name: String,
    },
    SetSceneImage {
        scene: SceneId,
        image: AssetRef,
    },
    SetCurrentScene {
        scene: SceneId,
    },
    SetStartingPoint {
        scene: SceneId,
        point: StartingPoint,
    },
    ClearStartingPoint {
        scene: SceneId,
    },
    SetGlobalSound {
        scene: SceneId,
        sound: GlobalSound,
    },
    ClearGlobalSound {
        scene: SceneId,
    },
    AddHotspot {
        scene: SceneId,
        position: Position,
        content: HotspotContent,
    },
    UpdateHotspot {
        id: HotspotId,
        position: Position,
        content: HotspotContent,
    },
    /// Reposition a hotspot, keeping its content. Sent repeatedly while dragging.
    MoveHotspot {
        id: HotspotId,
        position: Position,
    },
    DeleteHotspot {
        id: HotspotId,
    },
    SetStyles {
        styles: Box<CustomStyles>,
    },
    RenameProject {
        name: String,
    },
    Repair,
    Batch {
        description: String,
        commands: Vec<EditCommand>,
    },
}

impl EditCommand {
    /// Human-readable description for the history list and CLI output.
    pub fn description(&self) -> String {
        match self {
            EditCommand::AddScene { name, .. } => format!("Add scene \"{name}\""),
            EditCommand::DeleteScene { scene } => format!("Delete scene {scene}"),
            EditCommand::RenameScene { name, .. } => format!("Rename scene to \"{name}\""),
            EditCommand::SetSceneImage { scene, .. } => format!("Change image of {scene}"),
            EditCommand::SetCurrentScene { scene } => format!("Switch to {scene}"),
            EditCommand::SetStartingPoint { scene, .. } => format!("Set starting view of {scene}"),
            EditCommand::ClearStartingPoint { scene } => {
                format!("Clear starting view of {scene}")
            }
            EditCommand::SetGlobalSound { scene, .. } => format!("Set ambient sound of {scene}"),
            EditCommand::ClearGlobalSound { scene } => format!("Remove ambient sound of {scene}"),
            EditCommand::AddHotspot { content, .. } => format!("Add {} hotspot", content.kind()),
            EditCommand::UpdateHotspot { id, .. } => format!("Edit hotspot {id}"),
            EditCommand::MoveHotspot { id, .. } => format!("Move hotspot {id}"),
            EditCommand::DeleteHotspot { id } => format!("Delete hotspot {id}"),
            EditCommand::SetStyles { .. } => "Update styles".to_string(),
            EditCommand::RenameProject { name } => format!("Rename project to \"{name}\""),
            EditCommand::Repair => "Repair project".to_string(),
            EditCommand::Batch { description, .. } => description.clone(),
        }
    }

    /// Key for coalescing consecutive identical edits into a single undo entry.
    fn coalesce_key(&self) -> Option<String> {
        match self {
            EditCommand::MoveHotspot { id, .. } => Some(format!("move:{id}")),
            EditCommand::SetStartingPoint { scene, .. } => Some(format!("view:{scene}")),
            _ => None,
        }
    }
}

/// Result of executing an EditCommand.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum CommandResult {
    Scene(SceneId),
    Hotspot(HotspotId),
    Repaired(RepairReport),
    Unit,
}

/// `message` serves the CLI, `result` carries typed data for callers.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub message: String,
    pub result: CommandResult,
}

impl CommandOutput {
    pub fn new(message: impl Into<String>, result: CommandResult) -> Self {
        Self {
            message: message.into(),
            result,
        }
    }
}

/// Undo/redo state for the UI.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UndoState {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_description: Option<String>,
    pub redo_description: Option<String>,
}

/// Project and styles as they were before a command ran.
#[derive(Clone)]
struct Snapshot {
    project: Project,
    styles: CustomStyles,
}

struct UndoEntry {
    description: String,
    snapshot: Snapshot,
    coalesce_key: Option<String>,
}

const MAX_UNDO_LEVELS: usize = 50;

/// Maximum elapsed time between two coalescing edits for them to share one
/// undo entry.
const COALESCE_WINDOW: std::time::Duration = std::time::Duration::from_millis(500);

/// Executes authoring commands with snapshot-based undo/redo.
pub struct CommandDispatcher {
    undo_stack: Vec<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    last_coalesce_key: Option<String>,
    last_coalesce_time: Option<Instant>,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            last_coalesce_key: None,
            last_coalesce_time: None,
        }
    }

    /// Execute a command. A failing command leaves project and styles exactly
    /// as they were, including every earlier step of a failing batch.
    ///
    /// Consecutive commands with the same coalesce key arriving within
    /// [`COALESCE_WINDOW`] share one undo entry, so a drag is undone in one step.
    pub fn execute(
        &mut self,
        project: &mut Project,
        styles: &mut CustomStyles,
        cmd: &EditCommand,
    ) -> Result<CommandOutput, TourError> {
        let description = cmd.description();
        let new_coalesce_key = cmd.coalesce_key();
        let now = Instant::now();

        let coalesced = new_coalesce_key.as_ref().and_then(|new_key| {
            let key_matches = self.last_coalesce_key.as_ref() == Some(new_key);
            let within_window = self
                .last_coalesce_time
                .is_some_and(|t| now.duration_since(t) < COALESCE_WINDOW);
            if key_matches && within_window {
                self.undo_stack
                    .iter()
                    .rposition(|e| e.coalesce_key.as_ref() == Some(new_key))
            } else {
                None
            }
        });

        let snapshot = Snapshot {
            project: project.clone(),
            styles: styles.clone(),
        };
        let result = match apply(project, styles, cmd) {
            Ok(result) => result,
            Err(e) => {
                *project = snapshot.project;
                *styles = snapshot.styles;
                return Err(e);
            }
        };

        match coalesced {
            Some(index) => {
                if let Some(entry) = self.undo_stack.get_mut(index) {
                    entry.description = description.clone();
                }
            }
            None => {
                self.undo_stack.push(UndoEntry {
                    description: description.clone(),
                    snapshot,
                    coalesce_key: new_coalesce_key.clone(),
                });
                if self.undo_stack.len() > MAX_UNDO_LEVELS {
                    self.undo_stack.remove(0);
                }
            }
        }
        self.redo_stack.clear();
        if new_coalesce_key.is_some() {
            self.last_coalesce_key = new_coalesce_key;
            self.last_coalesce_time = Some(now);
        }

        Ok(CommandOutput::new(describe_result(&description, &result), result))
    }

    /// Undo the last command. Returns the description of what was undone.
    pub fn undo(
        &mut self,
        project: &mut Project,
        styles: &mut CustomStyles,
    ) -> Result<String, TourError> {
        self.last_coalesce_key = None;
        self.last_coalesce_time = None;

        let entry = self
            .undo_stack
            .pop()
            .ok_or_else(|| TourError::validation("Nothing to undo"))?;
        let current = swap_in(project, styles, entry.snapshot);
        self.redo_stack.push(UndoEntry {
            description: entry.description.clone(),
            snapshot: current,
            coalesce_key: None,
        });
        Ok(entry.description)
    }

    /// Redo the last undone command. Returns the description of what was redone.
    pub fn redo(
        &mut self,
        project: &mut Project,
        styles: &mut CustomStyles,
    ) -> Result<String, TourError> {
        self.last_coalesce_key = None;
        self.last_coalesce_time = None;

        let entry = self
            .redo_stack
            .pop()
            .ok_or_else(|| TourError::validation("Nothing to redo"))?;
        let current = swap_in(project, styles, entry.snapshot);
        self.undo_stack.push(UndoEntry {
            description: entry.description.clone(),
            snapshot: current,
            coalesce_key: None,
        });
        Ok(entry.description)
    }

    pub fn undo_state(&self) -> UndoState {
        UndoState {
            can_undo: !self.undo_stack.is_empty(),
            can_redo: !self.redo_stack.is_empty(),
            undo_description: self.undo_stack.last().map(|e| e.description.clone()),
            redo_description: self.redo_stack.last().map(|e| e.description.clone()),
        }
    }

    /// Clear all undo/redo history (e.g. after importing a different project).
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.last_coalesce_key = None;
        self.last_coalesce_time = None;
    }
}

/// Put `snapshot` in place and return what was there. Id counters never go
/// backwards.
fn swap_in(project: &mut Project, styles: &mut CustomStyles, snapshot: Snapshot) -> Snapshot {
    let previous = std::mem::replace(project, snapshot.project);
    project.carry_counters(&previous);
    Snapshot {
        project: previous,
        styles: std::mem::replace(styles, snapshot.styles),
    }
}

fn describe_result(description: &str, result: &CommandResult) -> String {
    match result {
        CommandResult::Scene(id) => format!("{description}: {id}"),
        CommandResult::Hotspot(id) => format!("{description}: id {id}"),
        CommandResult::Repaired(report) => format!("{description}: {report}"),
        CommandResult::Unit => description.to_string(),
    }
}

/// Apply a command without touching undo state.
fn apply(
    project: &mut Project,
    styles: &mut CustomStyles,
    cmd: &EditCommand,
) -> Result<CommandResult, TourError> {
    match cmd {
        EditCommand::AddScene { name, image } => {
            let id = project.add_scene(name, image.clone())?;
            Ok(CommandResult::Scene(id))
        }
        EditCommand::DeleteScene { scene } => {
            project.delete_scene(scene)?;
            Ok(CommandResult::Unit)
        }
        EditCommand::RenameScene { scene, name } => {
            project.rename_scene(scene, name)?;
            Ok(CommandResult::Unit)
        }
        EditCommand::SetSceneImage { scene, image } => {
            project.set_scene_image(scene, image.clone())?;
            Ok(CommandResult::Unit)
        }
        EditCommand::SetCurrentScene { scene } => {
            project.set_current_scene(scene)?;
            Ok(CommandResult::Scene(scene.clone()))
        }
        EditCommand::SetStartingPoint { scene, point } => {
            project.set_starting_point(scene, *point)?;
            Ok(CommandResult::Unit)
        }
        EditCommand::ClearStartingPoint { scene } => {
            project.clear_starting_point(scene)?;
            Ok(CommandResult::Unit)
        }
        EditCommand::SetGlobalSound { scene, sound } => {
            project.set_global_sound(scene, sound.clone())?;
            Ok(CommandResult::Unit)
        }
        EditCommand::ClearGlobalSound { scene } => {
            project.clear_global_sound(scene)?;
            Ok(CommandResult::Unit)
        }
        EditCommand::AddHotspot {
            scene,
            position,
            content,
        } => {
            let draft = HotspotDraft::new(*position, content.clone());
            let id = project.add_hotspot(scene, draft)?;
            Ok(CommandResult::Hotspot(id))
        }
        EditCommand::UpdateHotspot {
            id,
            position,
            content,
        } => {
            project.update_hotspot(*id, HotspotDraft::new(*position, content.clone()))?;
            Ok(CommandResult::Hotspot(*id))
        }
        EditCommand::MoveHotspot { id, position } => {
            let content = project
                .find_hotspot(*id)
                .map(|h| h.content.clone())
                .ok_or_else(|| TourError::not_found(format!("Hotspot {id}")))?;
            project.update_hotspot(*id, HotspotDraft::new(*position, content))?;
            Ok(CommandResult::Hotspot(*id))
        }
        EditCommand::DeleteHotspot { id } => {
            project.delete_hotspot(*id)?;
            Ok(CommandResult::Unit)
        }
        EditCommand::SetStyles { styles: new_styles } => {
            *styles = new_styles.as_ref().clone();
            Ok(CommandResult::Unit)
        }
        EditCommand::RenameProject { name } => {
            let name = name.trim();
            if name.is_empty() {
                return Err(TourError::validation("Project name cannot be empty"));
            }
            project.name = name.to_string();
            Ok(CommandResult::Unit)
        }
        EditCommand::Repair => Ok(CommandResult::Repaired(project.repair())),
        EditCommand::Batch { commands, .. } => {
            let mut last_result = CommandResult::Unit;
            for c in commands {
                last_result = apply(project, styles, c)?;
            }
            Ok(last_result)
        }
    }
}
