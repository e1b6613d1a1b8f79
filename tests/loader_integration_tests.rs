//! Integration tests for the background loader: stage progression, failure
//! isolation, abort and stop guarantees, and idempotent enqueueing.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use espdoc::models::{Document, DocumentHandle};
use espdoc::services::codec::{PluginCodec, ScriptedCodec, ScriptedPlugin};
use espdoc::services::loader::{Loader, LoaderError, LoaderEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

fn scripted_loader(plugins: &[(&str, ScriptedPlugin)]) -> Loader {
    let codec = ScriptedCodec::new();
    for (path, plugin) in plugins {
        codec.insert(*path, plugin.clone());
    }
    Loader::with_tick_interval(Arc::new(codec) as Arc<dyn PluginCodec>, Duration::ZERO)
}

fn handle_for(path: &str) -> DocumentHandle {
    Document::new(path, false).into_handle()
}

fn is_for(event_doc: &DocumentHandle, doc: &DocumentHandle) -> bool {
    Arc::ptr_eq(event_doc, doc)
}

/// Collect events until `terminals` completion/failure events have arrived.
fn recv_until_terminals(
    events: &mut broadcast::Receiver<LoaderEvent>,
    terminals: usize,
) -> Vec<LoaderEvent> {
    let mut collected = Vec::new();
    let mut seen = 0;
    while seen < terminals {
        let event = events.blocking_recv().expect("event channel closed");
        match &event {
            LoaderEvent::DocumentLoaded { .. } | LoaderEvent::DocumentNotLoaded { .. } => {
                seen += 1;
            }
            _ => {}
        }
        collected.push(event);
    }
    collected
}

/// Cumulative progress values observed for `doc`, in delivery order.
fn progress_for(events: &[LoaderEvent], doc: &DocumentHandle) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            LoaderEvent::NextRecordGroup {
                document,
                records_loaded,
            } if is_for(document, doc) => Some(*records_loaded),
            _ => None,
        })
        .collect()
}

fn terminal_count_for(events: &[LoaderEvent], doc: &DocumentHandle) -> (usize, usize) {
    let loaded = events
        .iter()
        .filter(|event| matches!(event, LoaderEvent::DocumentLoaded { document } if is_for(document, doc)))
        .count();
    let failed = events
        .iter()
        .filter(
            |event| matches!(event, LoaderEvent::DocumentNotLoaded { document, .. } if is_for(document, doc)),
        )
        .count();
    (loaded, failed)
}

#[test]
fn test_stage_progression_then_single_completion() {
    let loader = scripted_loader(&[("Data/Plugin.esp", ScriptedPlugin::new(100, 25))]);
    let mut events = loader.subscribe();

    let doc = handle_for("Data/Plugin.esp");
    loader.load_document(&doc).unwrap();

    let collected = recv_until_terminals(&mut events, 1);

    assert_eq!(progress_for(&collected, &doc), [25, 50, 75, 100]);
    assert_eq!(terminal_count_for(&collected, &doc), (1, 0));

    // The terminal event is the last event for the document
    let last_for_doc = collected
        .iter()
        .rev()
        .find(|event| match event {
            LoaderEvent::DocumentLoaded { document }
            | LoaderEvent::DocumentNotLoaded { document, .. }
            | LoaderEvent::NextRecordGroup { document, .. }
            | LoaderEvent::LoadMessage { document, .. } => is_for(document, &doc),
        })
        .unwrap();
    assert!(matches!(last_for_doc, LoaderEvent::DocumentLoaded { .. }));

    let doc = doc.read().unwrap();
    assert!(doc.is_loaded());
    assert_eq!(doc.total_records(), 100);
    assert_eq!(doc.content().len(), 4);
}

#[test]
fn test_parse_failure_is_isolated_per_document() {
    let loader = scripted_loader(&[
        (
            "Data/Broken.esp",
            ScriptedPlugin::new(100, 25).failing_after(50),
        ),
        ("Data/Fine.esp", ScriptedPlugin::new(50, 25)),
    ]);
    let mut events = loader.subscribe();

    let broken = handle_for("Data/Broken.esp");
    let fine = handle_for("Data/Fine.esp");
    loader.load_document(&broken).unwrap();
    loader.load_document(&fine).unwrap();

    let collected = recv_until_terminals(&mut events, 2);

    // The broken document progressed up to the failure point, then failed once
    assert_eq!(progress_for(&collected, &broken), [25, 50]);
    assert_eq!(terminal_count_for(&collected, &broken), (0, 1));
    let failure = collected
        .iter()
        .find_map(|event| match event {
            LoaderEvent::DocumentNotLoaded { document, error } if is_for(document, &broken) => {
                Some(error.clone())
            }
            _ => None,
        })
        .unwrap();
    assert!(failure.contains("scripted failure"));
    assert!(!broken.read().unwrap().is_loaded());

    // The other document completed untouched
    assert_eq!(terminal_count_for(&collected, &fine), (1, 0));
    assert_eq!(fine.read().unwrap().total_records(), 50);
}

#[test]
fn test_abort_delivers_no_further_events() {
    // Slow, long document so the abort lands mid-load
    let loader = scripted_loader(&[(
        "Data/Huge.esp",
        ScriptedPlugin::new(1_000, 1).with_delay(Duration::from_millis(15)),
    )]);
    let mut events = loader.subscribe();

    let doc = handle_for("Data/Huge.esp");
    loader.load_document(&doc).unwrap();

    // Wait until loading is demonstrably under way
    loop {
        if let LoaderEvent::NextRecordGroup { .. } = events.blocking_recv().unwrap() {
            break;
        }
    }

    loader.abort_loading(&doc);
    assert_eq!(loader.queue_len(), 0);

    // Events already emitted before the abort may still sit in the channel
    while events.try_recv().is_ok() {}

    // After the abort returned and the buffer drained, the document stays silent
    thread::sleep(Duration::from_millis(150));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert!(!doc.read().unwrap().is_loaded());
}

#[test]
fn test_abort_after_completion_is_noop() {
    let loader = scripted_loader(&[("Data/Plugin.esp", ScriptedPlugin::new(10, 10))]);
    let mut events = loader.subscribe();

    let doc = handle_for("Data/Plugin.esp");
    loader.load_document(&doc).unwrap();
    recv_until_terminals(&mut events, 1);

    loader.abort_loading(&doc);
    assert!(doc.read().unwrap().is_loaded());
}

#[test]
fn test_stop_abandons_queued_documents() {
    let loader = scripted_loader(&[
        (
            "Data/First.esp",
            ScriptedPlugin::new(1_000, 1).with_delay(Duration::from_millis(10)),
        ),
        (
            "Data/Second.esp",
            ScriptedPlugin::new(1_000, 1).with_delay(Duration::from_millis(10)),
        ),
    ]);
    let mut events = loader.subscribe();

    let first = handle_for("Data/First.esp");
    let second = handle_for("Data/Second.esp");
    loader.load_document(&first).unwrap();
    loader.load_document(&second).unwrap();

    loop {
        if let LoaderEvent::NextRecordGroup { .. } = events.blocking_recv().unwrap() {
            break;
        }
    }

    loader.stop();
    assert!(loader.is_stopped());
    assert_eq!(loader.queue_len(), 0);

    // Enqueueing after stop is a hard error
    let late = handle_for("Data/Late.esp");
    assert_eq!(loader.load_document(&late), Err(LoaderError::Stopped));

    // Nothing queued at the moment of the stop ever completes or fails
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    assert_eq!(terminal_count_for(&drained, &first), (0, 0));
    assert_eq!(terminal_count_for(&drained, &second), (0, 0));

    thread::sleep(Duration::from_millis(100));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_duplicate_enqueue_is_idempotent() {
    let loader = scripted_loader(&[(
        "Data/Plugin.esp",
        ScriptedPlugin::new(100, 25).with_delay(Duration::from_millis(5)),
    )]);
    let mut events = loader.subscribe();

    let doc = handle_for("Data/Plugin.esp");
    loader.load_document(&doc).unwrap();
    loader.load_document(&doc).unwrap();

    let collected = recv_until_terminals(&mut events, 1);

    // Loaded once, not twice
    assert_eq!(progress_for(&collected, &doc), [25, 50, 75, 100]);
    assert_eq!(terminal_count_for(&collected, &doc), (1, 0));
    assert_eq!(doc.read().unwrap().total_records(), 100);
}

#[test]
fn test_enqueue_after_completion_is_noop() {
    let loader = scripted_loader(&[("Data/Plugin.esp", ScriptedPlugin::new(50, 25))]);
    let mut events = loader.subscribe();

    let doc = handle_for("Data/Plugin.esp");
    loader.load_document(&doc).unwrap();
    recv_until_terminals(&mut events, 1);

    loader.load_document(&doc).unwrap();

    thread::sleep(Duration::from_millis(100));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(doc.read().unwrap().total_records(), 50);
}

#[test]
fn test_zero_record_document_completes() {
    let loader = scripted_loader(&[("Data/Empty.esp", ScriptedPlugin::new(0, 25))]);
    let mut events = loader.subscribe();

    let doc = handle_for("Data/Empty.esp");
    loader.load_document(&doc).unwrap();

    let collected = recv_until_terminals(&mut events, 1);
    assert_eq!(terminal_count_for(&collected, &doc), (1, 0));
    assert!(doc.read().unwrap().is_loaded());
    assert_eq!(doc.read().unwrap().total_records(), 0);
}

#[test]
fn test_interleaved_documents_stay_monotone() {
    let loader = scripted_loader(&[
        ("Data/A.esp", ScriptedPlugin::new(75, 25)),
        ("Data/B.esp", ScriptedPlugin::new(50, 25)),
    ]);
    let mut events = loader.subscribe();

    let a = handle_for("Data/A.esp");
    let b = handle_for("Data/B.esp");
    loader.load_document(&a).unwrap();
    loader.load_document(&b).unwrap();

    let collected = recv_until_terminals(&mut events, 2);

    for (doc, total) in [(&a, 75usize), (&b, 50usize)] {
        let progress = progress_for(&collected, doc);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last().copied(), Some(total));
        assert_eq!(terminal_count_for(&collected, doc), (1, 0));
    }
}

#[test]
fn test_receiver_recovers_after_lagging() {
    // More events than the broadcast channel buffers; a slow receiver lags
    // but can keep draining and still observes the terminal event
    let loader = scripted_loader(&[("Data/Flood.esp", ScriptedPlugin::new(150, 1))]);
    let mut events = loader.subscribe();

    let doc = handle_for("Data/Flood.esp");
    loader.load_document(&doc).unwrap();

    while loader.queue_len() > 0 {
        thread::sleep(Duration::from_millis(5));
    }

    let mut loaded = 0;
    loop {
        match events.try_recv() {
            Ok(LoaderEvent::DocumentLoaded { .. }) => loaded += 1,
            Ok(_) => {}
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    assert_eq!(loaded, 1);
    assert!(doc.read().unwrap().is_loaded());
}

#[test]
fn test_metrics_track_outcomes() {
    let loader = scripted_loader(&[
        ("Data/Fine.esp", ScriptedPlugin::new(50, 25)),
        ("Data/Broken.esp", ScriptedPlugin::new(50, 25).failing_after(25)),
    ]);
    let mut events = loader.subscribe();

    let fine = handle_for("Data/Fine.esp");
    let broken = handle_for("Data/Broken.esp");
    loader.load_document(&fine).unwrap();
    loader.load_document(&broken).unwrap();

    recv_until_terminals(&mut events, 2);

    use std::sync::atomic::Ordering;
    assert_eq!(loader.metrics().documents_loaded.load(Ordering::Relaxed), 1);
    assert_eq!(loader.metrics().documents_failed.load(Ordering::Relaxed), 1);
    // 50 from the good document, 25 from the broken one before it failed
    assert_eq!(loader.metrics().records_loaded.load(Ordering::Relaxed), 75);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// For any record count and group size, progress is strictly
        /// increasing, ends at the total, and exactly one completion follows.
        #[test]
        fn progress_is_monotone_and_complete(total in 1usize..=60, group in 1usize..=20) {
            let loader =
                scripted_loader(&[("Data/Any.esp", ScriptedPlugin::new(total, group))]);
            let mut events = loader.subscribe();

            let doc = handle_for("Data/Any.esp");
            loader.load_document(&doc).unwrap();

            let collected = recv_until_terminals(&mut events, 1);
            let progress = progress_for(&collected, &doc);

            prop_assert!(progress.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(progress.last().copied(), Some(total));
            prop_assert_eq!(terminal_count_for(&collected, &doc), (1, 0));
            prop_assert_eq!(doc.read().unwrap().total_records(), total);

            loader.stop();
        }
    }
}
