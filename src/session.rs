//! Authoring session: the project being edited, its styles, and the store
//! both are persisted to after every change.

use std::path::Path;

use crate::dispatcher::{CommandDispatcher, CommandOutput, EditCommand, UndoState};
use crate::error::TourError;
use crate::export::{self, Bundle, ExportOptions, Exporter};
use crate::import::{self, ImportedProject};
use crate::model::{CustomStyles, Project};
use crate::project::{load_project, load_styles, save_project, save_styles, KeyValueStore};

/// Name given to a project created because the store was empty.
pub const UNTITLED: &str = "Untitled Tour";

pub struct AuthoringSession<S: KeyValueStore> {
    store: S,
    project: Project,
    styles: CustomStyles,
    dispatcher: CommandDispatcher,
}

impl<S: KeyValueStore> AuthoringSession<S> {
    /// Open the project held in `store`, or start a fresh one-scene project
    /// when the store is empty.
    pub fn open(store: S) -> Result<Self, TourError> {
        let project = match load_project(&store)? {
            Some(project) => project,
            None => {
                log::info!("No stored project, starting \"{UNTITLED}\"");
                Project::with_default_scene(UNTITLED)
            }
        };
        let styles = load_styles(&store);
        Ok(Self {
            store,
            project,
            styles,
            dispatcher: CommandDispatcher::new(),
        })
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn styles(&self) -> &CustomStyles {
        &self.styles
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn undo_state(&self) -> UndoState {
        self.dispatcher.undo_state()
    }

    pub fn execute(&mut self, cmd: &EditCommand) -> Result<CommandOutput, TourError> {
        let output = self
            .dispatcher
            .execute(&mut self.project, &mut self.styles, cmd)?;
        self.persist()?;
        Ok(output)
    }

    pub fn undo(&mut self) -> Result<String, TourError> {
        let description = self.dispatcher.undo(&mut self.project, &mut self.styles)?;
        self.persist()?;
        Ok(description)
    }

    pub fn redo(&mut self) -> Result<String, TourError> {
        let description = self.dispatcher.redo(&mut self.project, &mut self.styles)?;
        self.persist()?;
        Ok(description)
    }

    /// Write both store entries.
    pub fn persist(&mut self) -> Result<(), TourError> {
        save_project(&mut self.store, &self.project)?;
        save_styles(&mut self.store, &self.styles)
    }

    pub fn export(&self, options: ExportOptions) -> Result<Bundle, TourError> {
        Exporter::new(&self.styles, options).export(&self.project)
    }

    /// Import a saved or exported document, replacing project and styles
    /// together. On error nothing changes. History is cleared.
    pub fn import_json(&mut self, json: &str) -> Result<ImportedProject, TourError> {
        let imported = import::import_project(json)?;
        self.replace(&imported)?;
        Ok(imported)
    }

    pub fn load_template(&mut self, path: &Path) -> Result<ImportedProject, TourError> {
        let imported = export::load_template(path)?;
        self.replace(&imported)?;
        Ok(imported)
    }

    pub fn save_template(&self, path: &Path) -> Result<(), TourError> {
        export::save_template(path, &self.project, &self.styles)
    }

    fn replace(&mut self, imported: &ImportedProject) -> Result<(), TourError> {
        self.project = imported.project.clone();
        self.styles = imported.styles.clone();
        self.dispatcher.clear();
        log::info!(
            "Imported \"{}\": {} scenes, {} hotspots ({})",
            self.project.name,
            self.project.scene_count(),
            self.project.hotspot_count(),
            imported.report
        );
        self.persist()
    }
}
