//! C2: encodes the whole session into a single WAV file in parallel with C1,
//! enabling the finalizer's fast path (§4.2, §4.6). Same contract as
//! `segment_writer` — start / pause / resume / stop_safely — but against one
//! long-lived file instead of rotating segments. Optional: if it fails to
//! start the engine simply does not get the fast path and falls back to
//! merging the window at stop (§4.6).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use hound::{WavSpec, WavWriter};
use log::{error, info};

use crate::error::{EngineError, EngineResult};

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

enum Control {
    Stop,
}

pub struct ContinuousWriterHandle {
    path: PathBuf,
    paused: Arc<AtomicBool>,
    control_tx: crossbeam_channel::Sender<Control>,
    handle: JoinHandle<EngineResult<()>>,
}

impl ContinuousWriterHandle {
    pub fn start(path: PathBuf, rx: Receiver<Arc<[f32]>>, spec: WavSpec) -> EngineResult<Self> {
        let writer = WavWriter::create(&path, spec).map_err(|e| {
            EngineError::EncoderUnavailable(format!("could not open continuous writer: {e}"))
        })?;

        let paused = Arc::new(AtomicBool::new(false));
        let paused_thread = paused.clone();
        let (control_tx, control_rx) = crossbeam_channel::unbounded::<Control>();
        let path_thread = path.clone();

        let handle = std::thread::spawn(move || -> EngineResult<()> {
            let mut writer = writer;
            loop {
                if control_rx.try_recv().is_ok() {
                    break;
                }
                match rx.recv_timeout(RECV_TIMEOUT) {
                    Ok(frame) => {
                        if paused_thread.load(Ordering::SeqCst) {
                            continue;
                        }
                        for sample in frame.iter() {
                            let amplitude = i16::MAX as f32;
                            let quantized = (sample.clamp(-1.0, 1.0) * amplitude) as i16;
                            if let Err(e) = writer.write_sample(quantized) {
                                error!("continuous writer failed on {path_thread:?}: {e}");
                                return Err(EngineError::EncoderFailure {
                                    message: e.to_string(),
                                    partial_path: Some(path_thread.clone()),
                                });
                            }
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
            writer.finalize().map_err(|e| EngineError::EncoderFailure {
                message: e.to_string(),
                partial_path: Some(path_thread.clone()),
            })?;
            info!("continuous artifact sealed: {path_thread:?}");
            Ok(())
        });

        Ok(ContinuousWriterHandle {
            path,
            paused,
            control_tx,
            handle,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Stops and seals the continuous artifact, returning its path. A
    /// zero-length artifact (capture never produced frames) is still a
    /// valid, empty WAV per the muxer's empty-fallback contract.
    pub fn stop_safely(self) -> EngineResult<PathBuf> {
        let _ = self.control_tx.send(Control::Stop);
        match self.handle.join() {
            Ok(Ok(())) => Ok(self.path),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::EncoderFailure {
                message: "continuous writer thread panicked".into(),
                partial_path: Some(self.path),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_spec() -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[test]
    fn continuous_artifact_accumulates_across_simulated_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("continuous.wav");
        let (tx, rx) = crossbeam_channel::unbounded();
        let writer = ContinuousWriterHandle::start(path.clone(), rx, default_spec()).unwrap();

        let frame: Arc<[f32]> = vec![0.2f32; 1600].into();
        for _ in 0..10 {
            tx.send(frame.clone()).unwrap();
        }
        std::thread::sleep(Duration::from_millis(400));

        let sealed = writer.stop_safely().unwrap();
        let reader = hound::WavReader::open(&sealed).unwrap();
        assert!(reader.duration() >= 16_000);
    }

    #[test]
    fn never_started_produces_no_file_but_start_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("missing_dir").join("continuous.wav");
        let (_tx, rx) = crossbeam_channel::unbounded();
        let result = ContinuousWriterHandle::start(bogus, rx, default_spec());
        assert!(result.is_err());
    }
}
