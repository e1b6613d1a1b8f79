// espdoc - Document loading pipeline for Bethesda master/plugin files
//
// This is the library crate containing the document model, the dependency-resolving
// mediator, and the background loader. The binary crate (main.rs) provides a small
// driver around them.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::{ConfigManager, FilePaths};
pub use models::{Document, DocumentHandle, EditorConfig, GroupData};
pub use services::{DocumentMediator, Loader, LoaderEvent, PluginCodec};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
