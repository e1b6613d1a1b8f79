use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::sync::{Arc, RwLock};

use crate::services::codec::{CodecError, PluginCodec};

/// Shared ownership handle for a [`Document`].
///
/// Documents are referenced from several places at once: the mediator's
/// ordered document set, the loader's work list, and in-flight
/// [`LoaderEvent`](crate::services::loader::LoaderEvent) payloads. A document
/// is destroyed only when the last of these releases it.
///
/// The loader's worker thread mutates content through the write lock; the
/// mediator and event subscribers only take the read lock.
pub type DocumentHandle = Arc<RwLock<Document>>;

/// Parsed payload for one record group.
///
/// The loader treats this as opaque: it only appends what the codec hands it
/// and tracks the record count for progress reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupData {
    /// Number of records the codec parsed into this group
    pub records: usize,

    /// Raw parsed payload, interpreted only by the codec layer
    pub data: Vec<u8>,
}

/// In-memory representation of one master/plugin file.
///
/// Holds the file's identity (save path, new-vs-existing origin flag,
/// authorship metadata), its declared parent (master) file list, and the
/// record-group content the loader fills in stage by stage.
///
/// # Invariants
///
/// - `parent_files` is fixed at construction. Header metadata is read
///   synchronously by the mediator before the document ever reaches the
///   loader, so no later stage may change the parent list.
/// - `content` is append-only while loading; groups are never removed.
/// - `loaded` flips to true exactly once, when the loader finishes the last
///   record group.
#[derive(Debug)]
pub struct Document {
    /// Where this document is saved (or will be, for new files)
    save_path: Utf8PathBuf,

    /// True if the document was freshly authored rather than opened from storage
    is_new: bool,

    author: Option<String>,
    description: Option<String>,

    /// Master files this document declares it depends on, in declaration order
    parent_files: Vec<String>,

    /// Record-group identifier -> parsed data, in the order groups were parsed
    content: IndexMap<String, GroupData>,

    loaded: bool,
}

impl Document {
    /// Create a document with no metadata, e.g. a freshly authored plugin.
    pub fn new(save_path: impl Into<Utf8PathBuf>, is_new: bool) -> Self {
        Self::with_header(save_path, is_new, None, None, Vec::new())
    }

    /// Create a document from header metadata read by the codec layer.
    pub fn with_header(
        save_path: impl Into<Utf8PathBuf>,
        is_new: bool,
        author: Option<String>,
        description: Option<String>,
        parent_files: Vec<String>,
    ) -> Self {
        Self {
            save_path: save_path.into(),
            is_new,
            author,
            description,
            parent_files,
            content: IndexMap::new(),
            loaded: false,
        }
    }

    /// Wrap this document in a shared ownership handle.
    pub fn into_handle(self) -> DocumentHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn save_path(&self) -> &Utf8Path {
        &self.save_path
    }

    /// Bare file name of the save path, e.g. `Skyrim.esm`.
    pub fn file_name(&self) -> &str {
        self.save_path.file_name().unwrap_or(self.save_path.as_str())
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared master files, in declaration order. Fixed at construction.
    pub fn parent_files(&self) -> &[String] {
        &self.parent_files
    }

    /// Parsed record groups in parse order.
    pub fn content(&self) -> &IndexMap<String, GroupData> {
        &self.content
    }

    /// Total records parsed into this document so far.
    pub fn total_records(&self) -> usize {
        self.content.values().map(|g| g.records).sum()
    }

    /// True once the loader has finished the last record group.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Append one parsed record group. Called only by the loader's worker.
    ///
    /// A repeated group identifier extends the existing entry; content is
    /// never replaced or removed.
    pub(crate) fn append_group(&mut self, group: &str, records: usize, data: Vec<u8>) {
        if let Some(existing) = self.content.get_mut(group) {
            existing.records += records;
            existing.data.extend(data);
        } else {
            self.content
                .insert(group.to_string(), GroupData { records, data });
        }
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    /// Serialize current content to storage at `path`.
    ///
    /// The binary layout is owned by the codec layer; the document only hands
    /// itself over.
    pub fn save(&self, codec: &dyn PluginCodec, path: &Utf8Path) -> Result<(), CodecError> {
        codec.write(self, path)?;
        tracing::info!("Saved {} to {}", self.file_name(), path);
        Ok(())
    }
}
