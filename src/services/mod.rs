//! Services module - the document loading pipeline.
//!
//! Everything here is framework-agnostic: no UI dependencies, all inputs
//! explicit, which keeps the pipeline testable from plain integration tests.
//!
//! # Components
//!
//! - [`Loader`]: background worker that parses queued documents in bounded
//!   record-group stages. Handles:
//!   - round-robin interleaving of multiple documents on one worker thread
//!   - progress/completion/failure/diagnostic events over a broadcast channel
//!   - per-document abort and terminal stop
//!   - a configurable tick that paces stages for UI event cadence
//!
//! - [`DocumentMediator`]: owns the ordered set of open documents and
//!   resolves transitive master-file dependencies (depth-first, pre-order,
//!   cycle-safe) before enqueueing documents with the loader.
//!
//! - [`PluginCodec`]: the record-level binary parser, treated as an external
//!   collaborator behind a trait. [`ScriptedCodec`] is the deterministic
//!   in-memory implementation used by tests and the demo binary.
//!
//! - [`discovery`]: data-directory scan for candidate `*.esm`/`*.esp` files.
//!
//! # Threading
//!
//! Exactly two roles: the caller thread (mediator operations, enqueue/abort/
//! stop, event consumption) and the loader's single worker thread. The work
//! list is the only state shared between them and always sits under its
//! mutex. No document is parsed by more than one thread at a time.

pub mod codec;
pub mod discovery;
pub mod loader;
pub mod mediator;

pub use codec::{CodecError, GroupBatch, PluginCodec, PluginHeader, ScriptedCodec, ScriptedPlugin};
pub use discovery::{DiscoveryError, discover_data_files, is_plugin_file};
pub use loader::{DEFAULT_TICK_INTERVAL, Loader, LoaderError, LoaderEvent};
pub use mediator::{DocumentMediator, MediatorError};
