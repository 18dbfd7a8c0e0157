use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

const DELETE_MAX_ATTEMPTS: u32 = 3;
const DELETE_BACKOFF: Duration = Duration::from_millis(500);

pub const MERGED_TEMP_NAME: &str = ".merged_temp.wav";
pub const CONTINUOUS_WINDOW_TEMP_NAME: &str = ".continuous_window_temp.wav";
const INDEX_NAME: &str = "segment_index.json";

/// Crash-recovery snapshot of the window, written whenever it changes.
/// Used only to discover leftover files on startup for orphan cleanup —
/// never to resurrect a previous session's audio (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SegmentIndex {
    pub segment_names: Vec<String>,
    pub segment_sizes: Vec<u64>,
    pub recording_start_epoch_ms: Option<u64>,
    pub segment_counter: u64,
    pub keep_duration_ms: Option<u64>,
}

/// Owns the segments directory: id allocation, retrying deletes, startup
/// orphan cleanup, and the crash-recovery index. No other component writes
/// or deletes files under `dir` (§5 "shared resources").
pub struct SegmentStore {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl SegmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;
        Ok(SegmentStore {
            dir,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn merged_temp_path(&self) -> PathBuf {
        self.dir.join(MERGED_TEMP_NAME)
    }

    pub fn merge_work_path(&self, timestamp_ms: u64) -> PathBuf {
        self.dir.join(format!(".merged_work_{timestamp_ms}.wav"))
    }

    pub fn continuous_window_temp_path(&self) -> PathBuf {
        self.dir.join(CONTINUOUS_WINDOW_TEMP_NAME)
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_NAME)
    }

    /// Allocates the next monotonic segment id and its on-disk path.
    pub fn allocate_segment_path(&self) -> (u64, PathBuf) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        (id, self.dir.join(format!("segment_{id}.wav")))
    }

    /// Deletes `path` with up to three retries on a 500 ms backoff. Failures
    /// are logged and returned, never panicked on — mobile filesystems can
    /// briefly hold descriptors open against short-lived scanners.
    pub fn delete_with_retry(&self, path: &Path) -> EngineResult<()> {
        if !path.exists() {
            return Ok(());
        }
        let mut last_err = None;
        for attempt in 1..=DELETE_MAX_ATTEMPTS {
            match fs::remove_file(path) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "delete attempt {attempt}/{DELETE_MAX_ATTEMPTS} failed for {:?}: {e}",
                        path
                    );
                    last_err = Some(e);
                    if attempt < DELETE_MAX_ATTEMPTS {
                        thread::sleep(DELETE_BACKOFF);
                    }
                }
            }
        }
        let err = last_err.unwrap();
        error!("giving up deleting {:?} after {DELETE_MAX_ATTEMPTS} attempts: {err}", path);
        Err(EngineError::io(path, err))
    }

    /// Removes leftover segment/premerge/continuous/index files from a prior
    /// session. Run once at startup (P10). Never fails the pipeline: any
    /// individual delete failure is logged and skipped.
    pub fn cleanup_leftovers(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("could not scan segments dir {:?} for cleanup: {e}", self.dir);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            let is_leftover = name.starts_with("segment_")
                || name == MERGED_TEMP_NAME
                || name.starts_with(".merged_work_")
                || name == CONTINUOUS_WINDOW_TEMP_NAME
                || name == INDEX_NAME;
            if is_leftover {
                if let Err(e) = self.delete_with_retry(&path) {
                    warn!("leftover cleanup could not remove {:?}: {e}", path);
                }
            }
        }
        info!("startup orphan cleanup complete for {:?}", self.dir);
    }

    pub fn write_index(&self, index: &SegmentIndex) {
        match serde_json::to_string_pretty(index) {
            Ok(json) => {
                if let Err(e) = fs::write(self.index_path(), json) {
                    warn!("failed to write segment index: {e}");
                }
            }
            Err(e) => warn!("failed to serialize segment index: {e}"),
        }
    }

    pub fn read_index(&self) -> Option<SegmentIndex> {
        let content = fs::read_to_string(self.index_path()).ok()?;
        serde_json::from_str(&content).ok()
    }
}
