//! Authoring core for multi-scene panoramic tours: project model, consistency
//! repair, bundle export/import, hosting, and the viewer's navigation engine.

pub mod assets;
pub mod consistency;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod export;
pub mod hosting;
pub mod import;
pub mod model;
pub mod paths;
pub mod project;
pub mod runtime;
pub mod session;
pub mod settings;
