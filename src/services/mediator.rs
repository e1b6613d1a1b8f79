use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use thiserror::Error;

use crate::config::FilePaths;
use crate::models::{Document, DocumentHandle};
use crate::services::codec::{CodecError, PluginCodec, PluginHeader};
use crate::services::loader::{Loader, LoaderError};

/// Errors reported by the document mediator.
///
/// All of these are synchronous: they surface at the triggering call, unlike
/// parse failures which arrive as loader events.
#[derive(Error, Debug)]
pub enum MediatorError {
    #[error("no file open, cannot save")]
    NoDocumentOpen,

    #[error("file paths are not configured, call set_paths first")]
    PathsNotConfigured,

    #[error("failed to read header of {path}: {source}")]
    Header {
        path: Utf8PathBuf,
        source: CodecError,
    },

    #[error("failed to save {path}: {source}")]
    Save {
        path: Utf8PathBuf,
        source: CodecError,
    },

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// Owns the authoritative set of open documents and resolves master-file
/// dependencies before handing documents to the [`Loader`].
///
/// The document set is insertion-ordered; the most recently added document is
/// the active one for save operations. Dependency resolution appends
/// documents in discovery order (pre-order over the master graph), NOT in
/// dependency order - callers must not assume set order equals load-before-use
/// order.
///
/// Not thread-safe: opens and saves must be serialized on the caller thread.
pub struct DocumentMediator {
    documents: Vec<DocumentHandle>,
    paths: Option<FilePaths>,
    codec: Arc<dyn PluginCodec>,
    loader: Arc<Loader>,
}

impl DocumentMediator {
    pub fn new(codec: Arc<dyn PluginCodec>, loader: Arc<Loader>) -> Self {
        Self {
            documents: Vec::new(),
            paths: None,
            codec,
            loader,
        }
    }

    /// Install the working-directory configuration. Must be called before any
    /// open or save operation that resolves file names against the data
    /// directory.
    pub fn set_paths(&mut self, paths: FilePaths) {
        tracing::debug!("Mediator paths set, data dir {}", paths.data_dir());
        self.paths = Some(paths);
    }

    /// Drop all document ownership handles. Documents stay alive as long as
    /// the loader work list or in-flight events still reference them.
    pub fn clear_files(&mut self) {
        if !self.documents.is_empty() {
            tracing::info!("Clearing {} open document(s)", self.documents.len());
        }
        self.documents.clear();
    }

    /// The open documents, in discovery order.
    pub fn documents(&self) -> &[DocumentHandle] {
        &self.documents
    }

    /// Create documents for freshly authored files and resolve everything
    /// they depend on.
    pub fn new_file(&mut self, files: &[String]) -> Result<(), MediatorError> {
        self.load_related_files(files, true, None, None)
    }

    /// Open existing files with explicit authorship metadata, resolving their
    /// master dependencies.
    pub fn open_file(
        &mut self,
        files: &[String],
        is_new: bool,
        author: Option<String>,
        description: Option<String>,
    ) -> Result<(), MediatorError> {
        self.load_related_files(files, is_new, author, description)
    }

    /// Persist the most recently added document to `path`.
    pub fn save_file(&self, path: &str) -> Result<(), MediatorError> {
        let Some(active) = self.documents.last() else {
            return Err(MediatorError::NoDocumentOpen);
        };
        let target = self.resolve_path(path)?;

        active
            .read()
            .unwrap()
            .save(self.codec.as_ref(), &target)
            .map_err(|source| MediatorError::Save {
                path: target,
                source,
            })
    }

    /// Depth-first, on-demand transitive closure over the master graph rooted
    /// at `files`.
    ///
    /// Each file's own document is appended (and enqueued with the loader)
    /// before its parents are resolved, so the final set order is a pre-order
    /// traversal. Files already represented in the document set are skipped,
    /// which makes resolution idempotent; the in-progress set short-circuits
    /// cyclic master graphs silently.
    fn load_related_files(
        &mut self,
        files: &[String],
        is_new: bool,
        author: Option<String>,
        description: Option<String>,
    ) -> Result<(), MediatorError> {
        let mut in_progress = IndexSet::new();
        for file in files {
            self.resolve_file(
                file,
                is_new,
                author.clone(),
                description.clone(),
                &mut in_progress,
            )?;
        }
        Ok(())
    }

    fn resolve_file(
        &mut self,
        name: &str,
        is_new: bool,
        author: Option<String>,
        description: Option<String>,
        in_progress: &mut IndexSet<String>,
    ) -> Result<(), MediatorError> {
        if self.find_document(name).is_some() {
            tracing::debug!("{} already open, skipping", name);
            return Ok(());
        }
        if !in_progress.insert(name.to_ascii_lowercase()) {
            // Cyclic master reference; the earlier visit already owns this file
            tracing::debug!("{} is already being resolved, skipping", name);
            return Ok(());
        }

        let path = self.resolve_path(name)?;
        let (header, backed) = self.read_header(&path, is_new)?;

        let document = Document::with_header(
            path,
            is_new,
            author.or_else(|| header.author.clone()),
            description.or_else(|| header.description.clone()),
            header.masters.clone(),
        )
        .into_handle();

        // Pre-order: the file's own document lands before its parents
        self.documents.push(Arc::clone(&document));
        if backed {
            self.loader.load_document(&document)?;
        } else {
            // No backing file yet; the document starts out empty and complete
            document.write().unwrap().mark_loaded();
            tracing::debug!("{} has no backing file, created empty", name);
        }

        for parent in &header.masters {
            self.loader
                .post_message(&document, format!("resolving master file {parent}"));
            self.resolve_file(parent, false, None, None, in_progress)?;
        }
        Ok(())
    }

    /// Read the header at `path`. The second element is false when a freshly
    /// authored file has no backing storage yet; such a document must not be
    /// handed to the loader, there is nothing for it to parse.
    fn read_header(
        &self,
        path: &Utf8Path,
        is_new: bool,
    ) -> Result<(PluginHeader, bool), MediatorError> {
        match self.codec.read_header(path) {
            Ok(header) => Ok((header, true)),
            // A freshly authored file may not exist on disk yet
            Err(source) if is_new => {
                tracing::debug!("No header for new file {}: {}", path, source);
                Ok((PluginHeader::default(), false))
            }
            Err(source) => Err(MediatorError::Header {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// Find an open document whose save path names `file`, matching bare file
    /// names ASCII case-insensitively (plugin names are case-insensitive on
    /// the platforms these files come from).
    fn find_document(&self, file: &str) -> Option<&DocumentHandle> {
        self.documents.iter().find(|handle| {
            handle
                .read()
                .unwrap()
                .file_name()
                .eq_ignore_ascii_case(file)
        })
    }

    fn resolve_path(&self, name: &str) -> Result<Utf8PathBuf, MediatorError> {
        let paths = self.paths.as_ref().ok_or(MediatorError::PathsNotConfigured)?;
        let candidate = Utf8Path::new(name);
        if candidate.is_absolute() {
            Ok(candidate.to_owned())
        } else {
            Ok(paths.data_dir().join(name))
        }
    }
}
