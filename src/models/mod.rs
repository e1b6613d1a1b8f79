//! Data models for the espdoc library.
//!
//! This module contains the core data structures:
//! - [`Document`]: one master/plugin file in memory - identity, parent list,
//!   and the record-group content the loader fills in
//! - [`DocumentHandle`]: shared ownership handle (`Arc<RwLock<Document>>`)
//!   referenced by the mediator, the loader work list, and event payloads
//! - [`GroupData`]: opaque parsed payload for one record group
//! - [`EditorConfig`]: persisted settings loaded from `EspDoc Config.yaml`
//!
//! # Architecture Note
//!
//! Document content is mutated only by the loader's worker thread through the
//! handle's write lock; everything else takes the read lock. The parent list
//! is immutable after construction so dependency resolution can run on the
//! caller thread before the document is ever queued.

pub mod config;
pub mod document;

pub use config::{EditorConfig, EditorSettings};
pub use document::{Document, DocumentHandle, GroupData};
