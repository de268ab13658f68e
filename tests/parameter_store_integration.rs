use autotune::domain::optimization::parameter_set::ParameterSet;
use autotune::infrastructure::{ParameterStore, RunHistory};
use autotune::domain::pipeline::run::PipelineRun;
use chrono::Utc;
use std::sync::Arc;

#[test]
fn test_missing_store_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParameterStore::new(dir.path().join("current_parameters.json"));

    let loaded = store.load().unwrap();
    assert!(loaded.is_default());
    assert_eq!(loaded, ParameterSet::default());
}

#[test]
fn test_save_replaces_current_and_appends_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParameterStore::new(dir.path().join("current_parameters.json"));

    let first = ParameterSet::default().with_provenance("weekly_auto_optimization", 1.0, Utc::now());
    let second = ParameterSet::default().with_provenance("weekly_auto_optimization", 2.0, Utc::now());
    store.save(&first).unwrap();
    store.save(&second).unwrap();

    assert_eq!(store.load().unwrap(), second);
    let history = std::fs::read_to_string(store.history_path()).unwrap();
    assert_eq!(history.lines().count(), 2);
    // No temp files left behind.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_concurrent_saves_leave_a_whole_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ParameterStore::new(dir.path().join("current_parameters.json")));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                let set = ParameterSet::default().with_provenance("concurrent", i as f64, Utc::now());
                store.save(&set).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let loaded = store.load().unwrap();
    assert_eq!(loaded.source, "concurrent");
    assert!((0.0..8.0).contains(&loaded.score));
}

#[test]
fn test_pending_slot_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = ParameterStore::new(dir.path().join("current_parameters.json"));
    assert!(store.load_pending().unwrap().is_none());

    let parked = ParameterSet::default().with_provenance("weekly_auto_optimization", 4.2, Utc::now());
    store.save_pending(&parked).unwrap();
    assert_eq!(store.load_pending().unwrap(), Some(parked));

    store.clear_pending().unwrap();
    assert!(store.load_pending().unwrap().is_none());
    // Clearing twice is fine.
    store.clear_pending().unwrap();
}

#[test]
fn test_run_history_appends_terminal_runs() {
    let dir = tempfile::tempdir().unwrap();
    let history = RunHistory::new(dir.path().join("results/run_history.jsonl"));

    for reason in ["first", "second", "third"] {
        let mut run = PipelineRun::new();
        run.abort(reason).unwrap();
        history.append(&run).unwrap();
    }

    let recent = history.recent(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[1].diagnostic.as_deref(), Some("third"));
}
