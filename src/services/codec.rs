use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Serialize;
use std::fs;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

use crate::models::Document;

/// Errors reported by the codec layer.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("no plugin data at {0}")]
    UnknownPlugin(Utf8PathBuf),

    #[error("failed to parse {path}: {message}")]
    Parse { path: Utf8PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

/// Header metadata of one plugin file.
///
/// Everything the loading pipeline needs from the file header: identity
/// metadata, the declared master list, and the total record count used to
/// bound stage progress.
#[derive(Debug, Clone, Default)]
pub struct PluginHeader {
    pub author: Option<String>,
    pub description: Option<String>,

    /// Master files referenced by this plugin, in declaration order
    pub masters: Vec<String>,

    /// Total records in the file body
    pub record_count: usize,
}

/// One bounded unit of parsing: a single record group.
#[derive(Debug, Clone)]
pub struct GroupBatch {
    /// Record-group identifier, e.g. `GRUP03`
    pub group: String,

    /// Records parsed in this batch
    pub records: usize,

    /// Opaque parsed payload appended to the document
    pub data: Vec<u8>,

    /// True when this batch exhausts the file
    pub done: bool,
}

/// Record-level binary codec, treated as an external collaborator.
///
/// The loading pipeline never looks inside plugin files itself; it asks the
/// codec for the header up front and then for one record group at a time
/// using the count of records loaded so far as the cursor.
///
/// Implementations must be `Send + Sync`: `read_header` runs on the caller
/// thread during dependency resolution while `next_group` runs on the
/// loader's worker thread.
pub trait PluginCodec: Send + Sync {
    /// Read the file header: authorship, master list, total record count.
    fn read_header(&self, path: &Utf8Path) -> Result<PluginHeader, CodecError>;

    /// Parse the next record group. `records_loaded` is the stage cursor:
    /// the number of records already parsed from this file.
    fn next_group(&self, path: &Utf8Path, records_loaded: usize)
    -> Result<GroupBatch, CodecError>;

    /// Serialize a document's current content to `path`.
    fn write(&self, document: &Document, path: &Utf8Path) -> Result<(), CodecError>;
}

/// Scripted description of one plugin served by [`ScriptedCodec`].
#[derive(Debug, Clone)]
pub struct ScriptedPlugin {
    pub header: PluginHeader,

    /// Records per group, i.e. per bounded parse unit
    pub group_size: usize,

    /// Fail parsing once this many records have been loaded
    pub fail_after: Option<usize>,

    /// Simulated parse latency per group
    pub delay: Option<Duration>,
}

impl ScriptedPlugin {
    pub fn new(record_count: usize, group_size: usize) -> Self {
        Self {
            header: PluginHeader {
                record_count,
                ..PluginHeader::default()
            },
            group_size,
            fail_after: None,
            delay: None,
        }
    }

    pub fn with_masters<I, S>(mut self, masters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header.masters = masters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.header.author = Some(author.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.header.description = Some(description.into());
        self
    }

    pub fn failing_after(mut self, records: usize) -> Self {
        self.fail_after = Some(records);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Deterministic in-memory codec.
///
/// Serves scripted headers and record groups for registered plugin paths and
/// writes documents out as YAML manifests. Used by the test-suite and the
/// demo binary; the real TES4 record codec lives behind the same trait.
#[derive(Default)]
pub struct ScriptedCodec {
    plugins: RwLock<IndexMap<Utf8PathBuf, ScriptedPlugin>>,
}

impl ScriptedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under `path`. Later registrations replace earlier ones.
    pub fn insert(&self, path: impl Into<Utf8PathBuf>, plugin: ScriptedPlugin) {
        self.plugins.write().unwrap().insert(path.into(), plugin);
    }

    fn lookup(&self, path: &Utf8Path) -> Result<ScriptedPlugin, CodecError> {
        self.plugins
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| CodecError::UnknownPlugin(path.to_owned()))
    }
}

impl PluginCodec for ScriptedCodec {
    fn read_header(&self, path: &Utf8Path) -> Result<PluginHeader, CodecError> {
        self.lookup(path).map(|plugin| plugin.header)
    }

    fn next_group(
        &self,
        path: &Utf8Path,
        records_loaded: usize,
    ) -> Result<GroupBatch, CodecError> {
        let plugin = self.lookup(path)?;

        if let Some(delay) = plugin.delay {
            std::thread::sleep(delay);
        }

        if let Some(fail_after) = plugin.fail_after {
            if records_loaded >= fail_after {
                return Err(CodecError::Parse {
                    path: path.to_owned(),
                    message: format!("scripted failure after {fail_after} records"),
                });
            }
        }

        let group_size = plugin.group_size.max(1);
        let total = plugin.header.record_count;
        let remaining = total.saturating_sub(records_loaded);
        let records = remaining.min(group_size);
        let data = (0..records)
            .map(|i| ((records_loaded + i) % 256) as u8)
            .collect();

        Ok(GroupBatch {
            group: format!("GRUP{:02}", records_loaded / group_size),
            records,
            data,
            done: records_loaded + records >= total,
        })
    }

    fn write(&self, document: &Document, path: &Utf8Path) -> Result<(), CodecError> {
        let manifest = DocumentManifest::from(document);
        let yaml = serde_yaml_ng::to_string(&manifest)
            .map_err(|e| CodecError::Serialize(e.to_string()))?;
        fs::write(path.as_std_path(), yaml)?;
        Ok(())
    }
}

/// YAML shape [`ScriptedCodec::write`] persists.
#[derive(Serialize)]
struct DocumentManifest<'a> {
    file: &'a str,
    is_new: bool,
    author: Option<&'a str>,
    description: Option<&'a str>,
    masters: &'a [String],
    record_count: usize,
    groups: IndexMap<&'a str, usize>,
}

impl<'a> From<&'a Document> for DocumentManifest<'a> {
    fn from(document: &'a Document) -> Self {
        Self {
            file: document.file_name(),
            is_new: document.is_new(),
            author: document.author(),
            description: document.description(),
            masters: document.parent_files(),
            record_count: document.total_records(),
            groups: document
                .content()
                .iter()
                .map(|(group, data)| (group.as_str(), data.records))
                .collect(),
        }
    }
}
