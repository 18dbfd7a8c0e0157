use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use log::{info, warn};
use parking_lot::Mutex;

use crate::error::EngineResult;
use crate::muxer;
use crate::segment::{Segment, SegmentId};
use crate::segment_store::SegmentStore;

const MIN_SEGMENT_BYTES: u64 = 1024;

struct WindowInner {
    segments: VecDeque<Segment>,
    total_duration_us: u64,
    plan_version: u64,
}

/// C4: owns the Window exclusively (§3 ownership table). One coarse lock
/// (`window_lock`) guards admission, eviction, and reads, matching the
/// locking discipline in §5 — no lock is held across file I/O beyond a
/// single delete call.
pub struct RollingWindowController {
    inner: Mutex<WindowInner>,
    keep_duration_ms: Option<u64>,
    segment_length_ms: u64,
}

impl RollingWindowController {
    pub fn new(keep_duration_ms: Option<u64>, segment_length_ms: u64) -> Self {
        RollingWindowController {
            inner: Mutex::new(WindowInner {
                segments: VecDeque::new(),
                total_duration_us: 0,
                plan_version: 0,
            }),
            keep_duration_ms,
            segment_length_ms,
        }
    }

    pub fn plan_version(&self) -> u64 {
        self.inner.lock().plan_version
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.inner.lock().total_duration_us / 1_000
    }

    pub fn segment_count(&self) -> usize {
        self.inner.lock().segments.len()
    }

    pub fn snapshot_paths(&self) -> Vec<std::path::PathBuf> {
        self.inner
            .lock()
            .segments
            .iter()
            .map(|s| s.path.clone())
            .collect()
    }

    pub fn snapshot_ids(&self) -> Vec<SegmentId> {
        self.inner.lock().segments.iter().map(|s| s.id).collect()
    }

    /// Probes a sealed file's duration via the muxer, falling back to the
    /// configured segment length if probing fails (§4.4 step 2). Duration
    /// extraction must never fail the admission pipeline.
    fn probe_duration_us(&self, path: &Path) -> u64 {
        match muxer::duration_us(path) {
            Ok(us) if us > 0 => us,
            _ => self.segment_length_ms * 1_000,
        }
    }

    /// Validates a freshly sealed file and builds its `Segment` record
    /// (§4.4 step 1-2). Returns `None` (and deletes the file) when it fails
    /// validation.
    pub fn validate_sealed_file(
        &self,
        store: &SegmentStore,
        id: SegmentId,
        path: std::path::PathBuf,
    ) -> Option<Segment> {
        let byte_len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("segment {:?} vanished before validation: {e}", path);
                return None;
            }
        };
        if byte_len < MIN_SEGMENT_BYTES {
            warn!("segment {:?} is only {byte_len} bytes, rejecting", path);
            let _ = store.delete_with_retry(&path);
            return None;
        }
        if muxer::duration_us(&path).is_err() {
            // Best-effort decodability check; still proceed, duration
            // extraction falls back below per §4.4 step 2.
            warn!("segment {:?} could not be probed as audio, continuing with fallback duration", path);
        }
        let duration_us = self.probe_duration_us(&path);
        Some(Segment {
            id,
            path,
            byte_len,
            duration_us,
            sealed: true,
        })
    }

    /// Admits a validated, sealed segment into the window, enforcing the
    /// tolerant/strict retention limit and bumping `plan_version` on every
    /// admission and eviction (§4.4 steps 3-7).
    pub fn admit(&self, segment: Segment, store: &SegmentStore) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        inner.segments.push_back(segment.clone());
        inner.total_duration_us += segment.duration_us;
        inner.plan_version += 1;

        let Some(keep_ms) = self.keep_duration_ms else {
            return Ok(());
        };

        let partial = segment.is_partial(self.segment_length_ms);
        let limit_ms = if partial {
            keep_ms
        } else {
            keep_ms + self.segment_length_ms / 2
        };
        let limit_us = limit_ms * 1_000;

        let mut evicted = Vec::new();
        while inner.total_duration_us > limit_us && inner.segments.len() > 1 {
            if let Some(oldest) = inner.segments.pop_front() {
                inner.total_duration_us = inner.total_duration_us.saturating_sub(oldest.duration_us);
                inner.plan_version += 1;
                evicted.push(oldest);
            } else {
                break;
            }
        }
        drop(inner);

        for seg in evicted {
            info!("evicting segment {:?} to respect retention window", seg.path);
            let _ = store.delete_with_retry(&seg.path);
        }

        Ok(())
    }

    /// Final strict cleanup (§4.4): walk newest → oldest, keep a segment
    /// only while the cumulative kept duration stays within `keep_duration`.
    /// Ties are broken in favor of the newer segment since we always walk
    /// from the newest first.
    pub fn final_strict_cleanup(&self, store: &SegmentStore) {
        let Some(keep_ms) = self.keep_duration_ms else {
            return;
        };
        let keep_us = keep_ms * 1_000;

        let mut inner = self.inner.lock();
        let mut kept = VecDeque::new();
        let mut kept_total_us: u64 = 0;
        let mut to_delete = Vec::new();

        for seg in inner.segments.drain(..).rev() {
            if kept_total_us + seg.duration_us <= keep_us {
                kept_total_us += seg.duration_us;
                kept.push_front(seg);
            } else {
                to_delete.push(seg);
            }
        }

        inner.segments = kept;
        inner.total_duration_us = kept_total_us;
        if !to_delete.is_empty() {
            inner.plan_version += 1;
        }
        drop(inner);

        for seg in to_delete {
            info!("strict cleanup evicting segment {:?}", seg.path);
            let _ = store.delete_with_retry(&seg.path);
        }
    }

    /// Discards the entire window without touching files (caller does that,
    /// e.g. via `SegmentStore::cleanup_leftovers` on `reset`).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.segments.clear();
        inner.total_duration_us = 0;
        inner.plan_version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: SegmentId, duration_ms: u64) -> Segment {
        Segment {
            id,
            path: std::path::PathBuf::from(format!("segment_{id}.wav")),
            byte_len: 4096,
            duration_us: duration_ms * 1_000,
            sealed: true,
        }
    }

    #[test]
    fn admission_without_keep_duration_never_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        let window = RollingWindowController::new(None, 10_000);
        for i in 0..5 {
            window.admit(seg(i, 10_000), &store).unwrap();
        }
        assert_eq!(window.segment_count(), 5);
        assert_eq!(window.total_duration_ms(), 50_000);
    }

    #[test]
    fn full_segment_admission_uses_tolerant_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        // keep=60s, segment_length=10s -> tolerant limit = 65s
        let window = RollingWindowController::new(Some(60_000), 10_000);
        for i in 0..7 {
            window.admit(seg(i, 10_000), &store).unwrap();
        }
        // 7 * 10s = 70s > 65s tolerant limit, so eviction must have happened
        assert!(window.total_duration_ms() <= 65_000);
        assert!(window.segment_count() < 7);
    }

    #[test]
    fn partial_segment_admission_uses_strict_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        let window = RollingWindowController::new(Some(30_000), 10_000);
        window.admit(seg(0, 10_000), &store).unwrap();
        window.admit(seg(1, 10_000), &store).unwrap();
        window.admit(seg(2, 10_000), &store).unwrap();
        // now at 30s; admit a small partial segment (< 5s -> partial)
        window.admit(seg(3, 2_000), &store).unwrap();
        assert!(window.total_duration_ms() <= 30_000);
    }

    #[test]
    fn final_strict_cleanup_trims_to_exact_keep_duration() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        let window = RollingWindowController::new(Some(25_000), 10_000);
        for i in 0..4 {
            window.admit(seg(i, 10_000), &store).unwrap();
        }
        window.final_strict_cleanup(&store);
        assert!(window.total_duration_ms() <= 25_000);
    }

    #[test]
    fn plan_version_increments_on_admission_and_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        let window = RollingWindowController::new(Some(15_000), 10_000);
        let v0 = window.plan_version();
        window.admit(seg(0, 10_000), &store).unwrap();
        let v1 = window.plan_version();
        assert!(v1 > v0);
        window.admit(seg(1, 10_000), &store).unwrap(); // triggers eviction (tolerant=20s, total=20s not evicted actually)
        let v2 = window.plan_version();
        assert!(v2 > v1);
    }
}
