//! C1: encodes one segment at a time to a WAV file, honoring start / pause /
//! resume / stop_safely (§4.1). Grounded on the teacher's per-segment
//! `hound::WavWriter` loop in `audio.rs::start_segment`, split out of the
//! combined capture+upload loop so the writer only owns file I/O — frame
//! sourcing now comes from `capture::CaptureSession`.

use std::io::BufWriter;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use hound::{WavSpec, WavWriter};
use log::{error, info};

use crate::error::{EngineError, EngineResult};
use crate::segment::SegmentId;
use crate::segment_store::SegmentStore;

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug)]
enum Control {
    Stop,
}

/// A segment currently being written. Dropping without calling
/// `stop_safely` abandons the file mid-write — callers must always stop
/// explicitly (§4.1 "supports start/stop/pause/resume").
#[derive(Debug)]
pub struct SegmentWriterHandle {
    id: SegmentId,
    path: PathBuf,
    paused: Arc<AtomicBool>,
    control_tx: crossbeam_channel::Sender<Control>,
    handle: JoinHandle<EngineResult<()>>,
}

impl SegmentWriterHandle {
    pub fn start(
        store: &SegmentStore,
        rx: Receiver<Arc<[f32]>>,
        spec: WavSpec,
    ) -> EngineResult<Self> {
        let (id, path) = store.allocate_segment_path();
        let writer = WavWriter::create(&path, spec)
            .map_err(|e| EngineError::EncoderUnavailable(format!("could not open segment writer: {e}")))?;

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
                                error!("segment writer failed on {path_thread:?}: {e}");
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
            info!("segment sealed: {path_thread:?}");
            Ok(())
        });

        Ok(SegmentWriterHandle {
            id,
            path,
            paused,
            control_tx,
            handle,
        })
    }

    pub fn id(&self) -> SegmentId {
        self.id
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

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stops recording, flushes and seals the WAV container, and returns
    /// the sealed segment's id and path. Idempotent to call only once.
    pub fn stop_safely(self) -> EngineResult<(SegmentId, PathBuf)> {
        let _ = self.control_tx.send(Control::Stop);
        match self.handle.join() {
            Ok(Ok(())) => Ok((self.id, self.path)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::EncoderFailure {
                message: "segment writer thread panicked".into(),
                partial_path: Some(self.path),
            }),
        }
    }
}
