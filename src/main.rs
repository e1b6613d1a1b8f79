//! espdoc - Document loading pipeline for Bethesda master/plugin files.
//!
//! Demo driver for the loading pipeline. It initializes:
//! - Logging infrastructure (rotating file logs + console output)
//! - Configuration loading ([`ConfigManager`])
//! - The document pipeline ([`DocumentMediator`] + [`Loader`])
//!
//! # Execution Flow
//!
//! 1. Initialize logging -> logs/espdoc_<date>.log
//! 2. Load `EspDoc Data/EspDoc Config.yaml` (defaults if missing)
//! 3. Discover `*.esm`/`*.esp` files in the data directory; fall back to a
//!    built-in demo plugin pair when none exist
//! 4. Open the files through the mediator (which resolves master
//!    dependencies and enqueues every discovered document)
//! 5. Drain loader events until every document completed or failed
//! 6. Stop the loader, which logs a metrics summary
//!
//! The record-level codec is a scripted stand-in until the TES4 record
//! codec lands behind the same trait.

use anyhow::Result;
use camino::Utf8Path;
use espdoc::services::discovery::{DiscoveryError, discover_data_files};
use espdoc::services::{DocumentMediator, Loader, LoaderEvent, ScriptedCodec, ScriptedPlugin};
use espdoc::{APP_NAME, ConfigManager, FilePaths, VERSION};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new("EspDoc Data")?;
    let config = config_manager.load_config()?;
    let settings = &config.settings;

    let _guard = espdoc::logging::setup_logging("logs", "espdoc", settings.debug_mode, true)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let working_dir = if settings.working_dir.is_empty() {
        ".".to_string()
    } else {
        settings.working_dir.clone()
    };
    let paths = FilePaths::new(&working_dir);
    if !paths.data_dir().exists() {
        fs::create_dir_all(paths.data_dir().as_std_path())?;
    }

    // Seed the scripted codec: real data files get synthetic record counts
    // derived from their size, an empty data directory gets a demo pair
    let codec = Arc::new(ScriptedCodec::new());
    let files = match discover_data_files(paths.data_dir()) {
        Ok(found) => {
            for path in &found {
                let records = record_count_for(path);
                codec.insert(path.clone(), ScriptedPlugin::new(records, 25));
            }
            found
                .iter()
                .filter_map(|p| p.file_name())
                .map(str::to_string)
                .collect()
        }
        Err(DiscoveryError::NoFilesFound { dir }) => {
            tracing::warn!("No .esm or .esp files were found in {}, running demo pair", dir);
            codec.insert(
                paths.data_dir().join("Master.esm"),
                ScriptedPlugin::new(100, 25).with_author("espdoc demo"),
            );
            codec.insert(
                paths.data_dir().join("Plugin.esp"),
                ScriptedPlugin::new(50, 25).with_masters(["Master.esm"]),
            );
            vec!["Plugin.esp".to_string()]
        }
        Err(err) => return Err(err.into()),
    };

    let loader = Arc::new(Loader::with_tick_interval(
        Arc::clone(&codec) as Arc<dyn espdoc::PluginCodec>,
        Duration::from_millis(settings.tick_interval_ms),
    ));
    let mut events = loader.subscribe();

    let mut mediator = DocumentMediator::new(codec, Arc::clone(&loader));
    mediator.set_paths(paths);
    mediator.open_file(&files, false, None, None)?;

    let mut outstanding = mediator.documents().len();
    tracing::info!("Loading {} document(s)", outstanding);

    while outstanding > 0 {
        let event = match events.blocking_recv() {
            Ok(event) => event,
            // Fell behind the channel; progress events are droppable
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Event receiver lagged, skipped {} event(s)", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            LoaderEvent::DocumentLoaded { document } => {
                let doc = document.read().unwrap();
                tracing::info!(
                    "{} loaded: {} records in {} group(s)",
                    doc.file_name(),
                    doc.total_records(),
                    doc.content().len()
                );
                outstanding -= 1;
            }
            LoaderEvent::DocumentNotLoaded { document, error } => {
                tracing::error!(
                    "{} not loaded: {}",
                    document.read().unwrap().file_name(),
                    error
                );
                outstanding -= 1;
            }
            LoaderEvent::NextRecordGroup {
                document,
                records_loaded,
            } => {
                tracing::debug!(
                    "{}: {} records loaded",
                    document.read().unwrap().file_name(),
                    records_loaded
                );
            }
            LoaderEvent::LoadMessage { message, .. } => {
                tracing::debug!("{}", message);
            }
        }
    }

    loader.stop();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Synthetic record count for a data file, derived from its size.
fn record_count_for(path: &Utf8Path) -> usize {
    fs::metadata(path.as_std_path())
        .map(|meta| (meta.len() / 32).max(1) as usize)
        .unwrap_or(1)
}
