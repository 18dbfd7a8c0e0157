//! C5: single background worker that incrementally rebuilds a pre-merged
//! artifact from the rolling window and atomically publishes it (§4.5).
//! Grounded on the teacher's `audio.rs` capture/upload split — here the
//! "upload" side becomes a lower-priority merge thread gated by a
//! condvar, matching the command-queue + dedicated-worker-thread shape used
//! throughout the teacher's `state.rs`/`audio.rs` pairing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{info, warn};
use parking_lot::{Condvar, Mutex};

use crate::error::EngineResult;
use crate::muxer;
use crate::segment_store::SegmentStore;
use crate::window::RollingWindowController;

struct MergerShared {
    merged_version: AtomicU64,
    stop: AtomicBool,
    wake: Mutex<bool>,
    condvar: Condvar,
    /// Names (not full paths) of the segments the last published artifact
    /// was built from, in order — used to decide append vs rebuild.
    last_names: Mutex<Vec<String>>,
}

/// Handle to the running merger thread plus its publication state, which
/// `Finalizer` reads directly (§4.6 step 4a).
pub struct BackgroundMerger {
    shared: Arc<MergerShared>,
    merged_path: PathBuf,
    handle: Option<JoinHandle<()>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl BackgroundMerger {
    pub fn start(store: Arc<SegmentStore>, window: Arc<RollingWindowController>) -> Self {
        let shared = Arc::new(MergerShared {
            merged_version: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            wake: Mutex::new(false),
            condvar: Condvar::new(),
            last_names: Mutex::new(Vec::new()),
        });
        let merged_path = store.merged_temp_path();

        let shared_thread = shared.clone();
        let handle = std::thread::Builder::new()
            .name("pre-merge-worker".into())
            .spawn(move || merger_loop(store, window, shared_thread))
            .expect("spawning the pre-merge worker thread should not fail");

        BackgroundMerger {
            shared,
            merged_path,
            handle: Some(handle),
        }
    }

    pub fn merged_path(&self) -> &PathBuf {
        &self.merged_path
    }

    pub fn merged_version(&self) -> u64 {
        self.shared.merged_version.load(Ordering::SeqCst)
    }

    /// Wakes the worker; called by C4 after every admission or eviction.
    pub fn notify(&self) {
        let mut wake = self.shared.wake.lock();
        *wake = true;
        self.shared.condvar.notify_one();
    }

    /// Requests one more tick and waits briefly for it to land, then joins
    /// the worker (§4.6 step 2).
    pub fn stop_and_join(mut self) {
        self.notify();
        std::thread::sleep(Duration::from_millis(150));
        self.shared.stop.store(true, Ordering::SeqCst);
        self.notify();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn merger_loop(store: Arc<SegmentStore>, window: Arc<RollingWindowController>, shared: Arc<MergerShared>) {
    loop {
        {
            let mut wake = shared.wake.lock();
            while !*wake {
                shared.condvar.wait_for(&mut wake, Duration::from_millis(500));
                if shared.stop.load(Ordering::SeqCst) {
                    return;
                }
            }
            *wake = false;
        }

        let plan_version = window.plan_version();
        if shared.merged_version.load(Ordering::SeqCst) == plan_version {
            if shared.stop.load(Ordering::SeqCst) {
                return;
            }
            continue;
        }

        if let Err(e) = run_merge_tick(&store, &window, &shared, plan_version) {
            warn!("pre-merge tick failed: {e}");
        }

        if shared.stop.load(Ordering::SeqCst) {
            return;
        }
    }
}

fn run_merge_tick(
    store: &SegmentStore,
    window: &RollingWindowController,
    shared: &MergerShared,
    plan_version: u64,
) -> EngineResult<()> {
    let paths = window.snapshot_paths();
    let names: Vec<String> = paths
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();

    let work_path = store.merge_work_path(now_ms());
    let path_refs: Vec<&std::path::Path> = paths.iter().map(|p| p.as_path()).collect();

    let previous_names = shared.last_names.lock().clone();
    let is_append = !previous_names.is_empty()
        && names.len() > previous_names.len()
        && names[..previous_names.len()] == previous_names[..];

    if path_refs.is_empty() {
        // Nothing to merge yet; treat as up to date.
        shared.merged_version.store(plan_version, Ordering::SeqCst);
        *shared.last_names.lock() = names;
        return Ok(());
    }

    let merged_path = store.merged_temp_path();

    if is_append && merged_path.exists() {
        let new_count = names.len() - previous_names.len();
        info!("pre-merge: appending {new_count} new segment(s)");
        let new_refs: Vec<&std::path::Path> = path_refs[previous_names.len()..].to_vec();
        if let Err(e) = muxer::append_segments(&merged_path, &new_refs, &work_path) {
            warn!("pre-merge append failed, rebuilding from scratch: {e}");
            muxer::merge_segments(&path_refs, &work_path)?;
        }
    } else {
        info!("pre-merge: rebuilding from {} segment(s)", names.len());
        muxer::merge_segments(&path_refs, &work_path)?;
    }

    let _ = store.delete_with_retry(&merged_path);
    std::fs::rename(&work_path, &merged_path)
        .map_err(|e| crate::error::EngineError::io(&merged_path, e))?;

    shared.merged_version.store(plan_version, Ordering::SeqCst);
    *shared.last_names.lock() = names;
    Ok(())
}
