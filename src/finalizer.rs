//! C6: at `stop`, picks the fastest valid artifact and produces the final
//! recording file (§4.6). Selection order: pre-merged fast path, continuous
//! fast path, live merge, empty fallback.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use hound::WavSpec;
use log::{info, warn};

use crate::continuous_writer::ContinuousWriterHandle;
use crate::error::{EngineError, EngineResult};
use crate::merger::BackgroundMerger;
use crate::muxer;
use crate::segment_store::SegmentStore;
use crate::window::RollingWindowController;

const MIN_VALID_ARTIFACT_BYTES: u64 = 1024;
/// §4.6 "final duration must be within 10 ms of keep_duration when trimmed".
const PRECISION_TRIM_TOLERANCE_US: i64 = 10_000;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn final_output_path(recordings_dir: &Path) -> PathBuf {
    recordings_dir.join(format!("recording_{}.wav", now_ms()))
}

/// Trims `path` in place down to the most recent `keep_duration_ms`,
/// replacing it with the trimmed copy. No-op if already within range.
fn trim_to_keep_duration(path: &Path, keep_duration_ms: u64) -> EngineResult<()> {
    let total_us = muxer::duration_us(path)?;
    let keep_us = keep_duration_ms * 1_000;
    if total_us as i64 - keep_us as i64 <= PRECISION_TRIM_TOLERANCE_US {
        return Ok(());
    }
    let start_s = (total_us - keep_us) as f64 / 1_000_000.0;
    let end_s = total_us as f64 / 1_000_000.0;
    let trimmed = path.with_extension("trim.wav");
    muxer::fast_trim(path, &trimmed, start_s, end_s)?;
    std::fs::rename(&trimmed, path).map_err(|e| EngineError::io(path, e))?;
    Ok(())
}

pub struct Finalizer;

impl Finalizer {
    /// Runs the full stop pipeline. Callers must have already stopped C1 and
    /// admitted its last segment into the window before calling this.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize(
        store: &SegmentStore,
        window: &RollingWindowController,
        merger: BackgroundMerger,
        continuous: Option<ContinuousWriterHandle>,
        keep_duration_ms: Option<u64>,
        spec: WavSpec,
        recordings_dir: &Path,
    ) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(recordings_dir).map_err(|e| EngineError::io(recordings_dir, e))?;

        let merged_path = merger.merged_path().clone();
        let merged_version_before_join = merger.merged_version();
        merger.stop_and_join();

        window.final_strict_cleanup(store);
        let final_plan_version = window.plan_version();

        let out_path = final_output_path(recordings_dir);

        // (a) Pre-merged fast path.
        if merged_version_before_join == final_plan_version {
            if let Ok(meta) = std::fs::metadata(&merged_path) {
                if meta.len() >= MIN_VALID_ARTIFACT_BYTES {
                    info!("finalizer: using pre-merged fast path");
                    std::fs::rename(&merged_path, &out_path)
                        .map_err(|e| EngineError::io(&out_path, e))?;
                    return Ok(out_path);
                }
            }
        }

        // (b) Continuous fast path.
        if let Some(continuous) = continuous {
            match continuous.stop_safely() {
                Ok(continuous_path) => {
                    if let Ok(meta) = std::fs::metadata(&continuous_path) {
                        if meta.len() >= MIN_VALID_ARTIFACT_BYTES {
                            info!("finalizer: using continuous fast path");
                            let Some(keep_ms) = keep_duration_ms else {
                                std::fs::rename(&continuous_path, &out_path)
                                    .map_err(|e| EngineError::io(&out_path, e))?;
                                return Ok(out_path);
                            };
                            if let Err(e) = trim_to_keep_duration(&continuous_path, keep_ms) {
                                warn!(
                                    "fast-trim of continuous artifact failed, retrying with decode/re-encode: {e}"
                                );
                                // §4.6b: a fast-trim failure must not discard the
                                // continuous artifact's audio. Re-encode it whole
                                // (no sample-range slicing) and only give up on it
                                // if that also fails.
                                match muxer::merge_segments(&[continuous_path.as_path()], &out_path) {
                                    Ok(_) => {
                                        if let Err(e) = trim_to_keep_duration(&out_path, keep_ms) {
                                            warn!("precision trim of re-encoded continuous artifact failed: {e}");
                                        }
                                        return Ok(out_path);
                                    }
                                    Err(e) => warn!(
                                        "decode/re-encode of continuous artifact also failed, falling back to live merge: {e}"
                                    ),
                                }
                            } else {
                                std::fs::rename(&continuous_path, &out_path)
                                    .map_err(|e| EngineError::io(&out_path, e))?;
                                return Ok(out_path);
                            }
                        }
                    }
                }
                Err(e) => warn!("continuous writer failed to stop cleanly: {e}"),
            }
        }

        // (c) Live merge.
        let paths = window.snapshot_paths();
        if !paths.is_empty() {
            let refs: Vec<&Path> = paths.iter().map(|p| p.as_path()).collect();
            match muxer::merge_segments(&refs, &out_path) {
                Ok(_) => {
                    info!("finalizer: using live merge");
                    if let Some(keep_ms) = keep_duration_ms {
                        if let Err(e) = trim_to_keep_duration(&out_path, keep_ms) {
                            warn!("precision trim of live-merged artifact failed: {e}");
                        }
                    }
                    return Ok(out_path);
                }
                Err(e) => warn!("live merge failed, falling back to empty artifact: {e}"),
            }
        }

        // (d) Empty fallback.
        info!("finalizer: no usable audio, writing empty artifact");
        muxer::write_empty(&out_path, spec)?;
        Ok(out_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use crate::window::RollingWindowController;
    use hound::{WavSpec, WavWriter};
    use std::sync::Arc;

    fn spec() -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    fn write_tone(path: &Path, frames: u32) {
        let mut w = WavWriter::create(path, spec()).unwrap();
        for i in 0..frames {
            w.write_sample(if i % 2 == 0 { 1000 } else { -1000 }).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn live_merge_path_produces_output_when_nothing_pre_merged() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SegmentStore::new(dir.path()).unwrap());
        let window = Arc::new(RollingWindowController::new(None, 10_000));

        let (id, path) = store.allocate_segment_path();
        write_tone(&path, 16_000);
        window
            .admit(
                Segment {
                    id,
                    path: path.clone(),
                    byte_len: std::fs::metadata(&path).unwrap().len(),
                    duration_us: 1_000_000,
                    sealed: true,
                },
                &store,
            )
            .unwrap();

        let merger = BackgroundMerger::start(store.clone(), window.clone());
        // Do not notify: merged_version stays behind plan_version, forcing
        // the live-merge fallback path.
        let out_dir = dir.path().join("out");
        let result = Finalizer::finalize(&store, &window, merger, None, None, spec(), &out_dir).unwrap();
        assert!(result.exists());
        let reader = hound::WavReader::open(&result).unwrap();
        assert_eq!(reader.duration(), 16_000);
    }

    #[test]
    fn empty_session_produces_empty_valid_wav() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SegmentStore::new(dir.path()).unwrap());
        let window = Arc::new(RollingWindowController::new(None, 10_000));
        let merger = BackgroundMerger::start(store.clone(), window.clone());
        let out_dir = dir.path().join("out");
        let result = Finalizer::finalize(&store, &window, merger, None, None, spec(), &out_dir).unwrap();
        assert!(result.exists());
        let reader = hound::WavReader::open(&result).unwrap();
        assert_eq!(reader.duration(), 0);
    }
}
