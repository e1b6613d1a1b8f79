use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::metrics::Metrics;
use crate::models::DocumentHandle;
use crate::services::codec::PluginCodec;

/// Default pause between record-group stages, giving a UI thread a bounded
/// cadence at which to drain progress events.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(25);

/// Buffer size of the loader's broadcast event channel
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Errors that can occur when talking to the loader
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LoaderError {
    #[error("loader has been stopped")]
    Stopped,
}

/// Notifications emitted by the loader while documents are processed.
///
/// Per document, `NextRecordGroup` events carry a non-decreasing
/// `records_loaded` and the stream ends with exactly one of
/// `DocumentLoaded` / `DocumentNotLoaded` - unless the document is aborted
/// or the loader is stopped, in which case the stream simply ends.
/// No ordering is guaranteed across different documents.
#[derive(Clone, Debug)]
pub enum LoaderEvent {
    /// The document finished parsing; its content is complete
    DocumentLoaded { document: DocumentHandle },

    /// Parsing failed; the document was dropped from the work list
    DocumentNotLoaded {
        document: DocumentHandle,
        error: String,
    },

    /// One record group finished; `records_loaded` is cumulative
    NextRecordGroup {
        document: DocumentHandle,
        records_loaded: usize,
    },

    /// Free-text diagnostic, advisory only
    LoadMessage {
        document: DocumentHandle,
        message: String,
    },
}

/// Per-document load progress
#[derive(Debug, Clone, Copy)]
struct Stage {
    /// Records parsed so far, monotonically increasing
    records_loaded: usize,

    /// Flips false exactly once, on completion or failure
    records_left: bool,
}

impl Stage {
    fn new() -> Self {
        Self {
            records_loaded: 0,
            records_left: true,
        }
    }
}

struct WorkItem {
    document: DocumentHandle,
    stage: Stage,
}

#[derive(Default)]
struct WorkList {
    items: VecDeque<WorkItem>,
    should_stop: bool,
}

struct Shared {
    work: Mutex<WorkList>,
    to_do: Condvar,
}

/// Background document loader.
///
/// One worker thread pulls queued documents and parses them in bounded
/// record-group stages, interleaving documents round-robin. All shared state
/// is the work list under a single mutex; the worker parks on a condition
/// variable when the list is empty and is woken by enqueue, abort, and stop.
///
/// Progress and outcomes are reported through a broadcast channel (see
/// [`LoaderEvent`]); the caller thread never blocks on the loader.
///
/// Events are published while the work-list lock is held. Because
/// [`abort_loading`](Self::abort_loading) and [`stop`](Self::stop) take the
/// same lock, once either returns no further event for the affected
/// document(s) can be observed.
pub struct Loader {
    shared: Arc<Shared>,
    event_tx: broadcast::Sender<LoaderEvent>,
    metrics: Arc<Metrics>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Loader {
    /// Create a loader over `codec` with the default tick interval.
    pub fn new(codec: Arc<dyn PluginCodec>) -> Self {
        Self::with_tick_interval(codec, DEFAULT_TICK_INTERVAL)
    }

    /// Create a loader that pauses `tick` between record-group stages.
    /// A zero tick disables pacing; the worker then runs stages back to back.
    pub fn with_tick_interval(codec: Arc<dyn PluginCodec>, tick: Duration) -> Self {
        let shared = Arc::new(Shared {
            work: Mutex::new(WorkList::default()),
            to_do: Condvar::new(),
        });
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let metrics = Arc::new(Metrics::new());

        let worker = Worker {
            shared: Arc::clone(&shared),
            codec,
            event_tx: event_tx.clone(),
            metrics: Arc::clone(&metrics),
            tick,
        };
        let handle = thread::Builder::new()
            .name("espdoc-loader".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn loader worker");

        tracing::debug!("Loader worker started (tick {:?})", tick);

        Self {
            shared,
            event_tx,
            metrics,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Subscribe to loader events. Every subscriber sees every event emitted
    /// after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.event_tx.subscribe()
    }

    /// Enqueue a document for loading.
    ///
    /// A document that is already queued or already loaded is a no-op (logged
    /// at debug). After [`stop`](Self::stop) this returns
    /// [`LoaderError::Stopped`].
    pub fn load_document(&self, document: &DocumentHandle) -> Result<(), LoaderError> {
        let mut work = self.shared.work.lock().unwrap();
        if work.should_stop {
            return Err(LoaderError::Stopped);
        }

        let file_name = document.read().unwrap().file_name().to_string();

        if document.read().unwrap().is_loaded() {
            tracing::debug!("{} already loaded, ignoring enqueue", file_name);
            return Ok(());
        }
        if work
            .items
            .iter()
            .any(|item| Arc::ptr_eq(&item.document, document))
        {
            tracing::debug!("{} already queued, ignoring enqueue", file_name);
            return Ok(());
        }

        work.items.push_back(WorkItem {
            document: Arc::clone(document),
            stage: Stage::new(),
        });
        emit(
            &self.event_tx,
            &self.metrics,
            LoaderEvent::LoadMessage {
                document: Arc::clone(document),
                message: format!("queued {file_name} for loading"),
            },
        );
        drop(work);

        self.shared.to_do.notify_one();
        Ok(())
    }

    /// Remove a queued or loading document from the work list.
    ///
    /// Cooperative: an in-flight parse unit is not preempted, its result is
    /// discarded. Once this returns, no further events are delivered for the
    /// document. Unknown or already-completed documents are a no-op.
    pub fn abort_loading(&self, document: &DocumentHandle) {
        let mut work = self.shared.work.lock().unwrap();
        let before = work.items.len();
        work.items
            .retain(|item| !Arc::ptr_eq(&item.document, document));

        if work.items.len() < before {
            self.metrics.record_document_aborted();
            tracing::debug!(
                "Aborted loading of {}",
                document.read().unwrap().file_name()
            );
            drop(work);
            self.shared.to_do.notify_all();
        }
    }

    /// Post an advisory diagnostic message associated with a document.
    pub fn post_message(&self, document: &DocumentHandle, message: impl Into<String>) {
        emit(
            &self.event_tx,
            &self.metrics,
            LoaderEvent::LoadMessage {
                document: Arc::clone(document),
                message: message.into(),
            },
        );
    }

    /// Stop the worker. Terminal.
    ///
    /// Pending work is abandoned without completion or failure events, the
    /// current parse unit (if any) is discarded, and the worker thread is
    /// joined. Subsequent [`load_document`](Self::load_document) calls fail
    /// with [`LoaderError::Stopped`]. Calling `stop` twice is a no-op.
    pub fn stop(&self) {
        {
            let mut work = self.shared.work.lock().unwrap();
            if work.should_stop {
                return;
            }
            work.should_stop = true;
            if !work.items.is_empty() {
                tracing::debug!("Abandoning {} queued document(s)", work.items.len());
            }
            work.items.clear();
        }
        self.shared.to_do.notify_all();

        if let Some(handle) = self.worker.lock().unwrap().take() {
            if handle.join().is_err() {
                tracing::error!("Loader worker panicked");
            }
        }
        self.metrics.log_summary();
    }

    /// True once [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.shared.work.lock().unwrap().should_stop
    }

    /// Number of documents currently queued or loading.
    pub fn queue_len(&self) -> usize {
        self.shared.work.lock().unwrap().items.len()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn emit(tx: &broadcast::Sender<LoaderEvent>, metrics: &Metrics, event: LoaderEvent) {
    metrics.record_event_broadcast();
    if tx.send(event).is_err() {
        // No subscriber; events are advisory so this is fine
        metrics.record_event_unobserved();
    }
}

struct Worker {
    shared: Arc<Shared>,
    codec: Arc<dyn PluginCodec>,
    event_tx: broadcast::Sender<LoaderEvent>,
    metrics: Arc<Metrics>,
    tick: Duration,
}

impl Worker {
    fn run(self) {
        loop {
            // Wait until a document is pending or the loader stops
            let (document, save_path, records_loaded) = {
                let mut work = self.shared.work.lock().unwrap();
                loop {
                    if work.should_stop {
                        return;
                    }
                    if let Some(item) = work.items.front() {
                        let document = Arc::clone(&item.document);
                        let save_path = document.read().unwrap().save_path().to_owned();
                        break (document, save_path, item.stage.records_loaded);
                    }
                    work = self.shared.to_do.wait(work).unwrap();
                }
            };

            // One bounded parse unit, outside the lock
            let outcome = self.codec.next_group(&save_path, records_loaded);

            // Fold the result back in. The document may have been aborted or
            // the loader stopped while the lock was released; in either case
            // the stage result is discarded without events.
            let mut work = self.shared.work.lock().unwrap();
            if work.should_stop {
                return;
            }
            let Some(pos) = work
                .items
                .iter()
                .position(|item| Arc::ptr_eq(&item.document, &document))
            else {
                continue;
            };
            let Some(mut item) = work.items.remove(pos) else {
                continue;
            };

            match outcome {
                Ok(batch) => {
                    item.stage.records_loaded += batch.records;
                    item.stage.records_left = !batch.done;
                    let records_loaded = item.stage.records_loaded;
                    {
                        let mut doc = document.write().unwrap();
                        doc.append_group(&batch.group, batch.records, batch.data);
                        if !item.stage.records_left {
                            doc.mark_loaded();
                        }
                    }
                    self.metrics.record_records_loaded(batch.records);

                    self.emit(LoaderEvent::NextRecordGroup {
                        document: Arc::clone(&document),
                        records_loaded,
                    });
                    if !item.stage.records_left {
                        self.metrics.record_document_loaded();
                        self.emit(LoaderEvent::DocumentLoaded {
                            document: Arc::clone(&document),
                        });
                        tracing::info!("Loaded {} ({} records)", save_path, records_loaded);
                    } else {
                        // Round-robin: rotate the document behind other queued work
                        work.items.push_back(item);
                    }
                }
                Err(err) => {
                    item.stage.records_left = false;
                    self.metrics.record_document_failed();
                    self.emit(LoaderEvent::DocumentNotLoaded {
                        document: Arc::clone(&document),
                        error: err.to_string(),
                    });
                    tracing::warn!("Failed to load {}: {}", save_path, err);
                }
            }

            // Pace stages so a UI thread can drain events between groups.
            // Enqueue/abort/stop wake the worker early, preserving the
            // wake-if-nonempty tick semantics.
            if !self.tick.is_zero() && !work.items.is_empty() {
                let _ = self.shared.to_do.wait_timeout(work, self.tick);
            }
        }
    }

    // Called with the work-list lock held; see the Loader doc comment for why
    fn emit(&self, event: LoaderEvent) {
        emit(&self.event_tx, &self.metrics, event);
    }
}
