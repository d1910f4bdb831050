//! Upload/hosting service for finished bundles: a filesystem store, an HTTP
//! server over it, and the client the authoring side publishes with.

pub mod client;
pub mod server;
pub mod store;

pub use client::{HostClient, Published};
pub use server::{router, start_server};
pub use store::{HostingStore, UploadRecord};
