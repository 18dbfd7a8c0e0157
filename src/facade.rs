//! C9: the single serialized command surface. All state transitions route
//! through one command-queue thread (`T_command`), matching the teacher's
//! `AudioCommand`/`audio_command_tx` split in `state.rs`/`main.rs` — here
//! generalized from a four-command recorder into the full
//! start/pause/resume/reset/stop/interrupt state machine plus status and
//! event fan-out.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use hound::WavSpec;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::capture::CaptureSession;
use crate::config::EngineConfig;
use crate::continuous_writer::ContinuousWriterHandle;
use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventListener};
use crate::finalizer::Finalizer;
use crate::interruption::{AccountingEffect, CoordinatorAction, InterruptionEvent, PauseAccounting};
use crate::merger::BackgroundMerger;
use crate::segment_store::SegmentStore;
use crate::segment_writer::SegmentWriterHandle;
use crate::waveform::{WaveformAnalyzer, WaveformConfig, WaveformFrame};
use crate::window::RollingWindowController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    PausedManual,
    PausedInterrupt,
    Stopping,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: SessionState,
    pub duration_ms: u64,
    pub path: Option<PathBuf>,
    pub window_segments: usize,
    pub buffered_duration_ms: u64,
}

/// Drives the §5 `T_duration_tick`: emits `duration_changed` once a second
/// while a session is active, so a listener tracking elapsed time doesn't
/// have to poll `/status`.
struct DurationTicker {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl DurationTicker {
    fn start(facade: SessionFacade) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let handle = std::thread::spawn(move || {
            while !stop_thread.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_secs(1));
                if stop_thread.load(Ordering::SeqCst) {
                    break;
                }
                let inner = facade.inner.lock();
                if inner.state == SessionState::Idle {
                    continue;
                }
                let duration_ms = facade.duration_ms_locked(&inner);
                drop(inner);
                facade.emit(Event::DurationChanged { duration_ms });
            }
        });
        DurationTicker {
            stop,
            handle: Some(handle),
        }
    }

    fn stop_and_join(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Owns one active WAV segment at a time, forwarding frames from the long
/// lived capture tap into successive `SegmentWriterHandle`s as the session
/// rotates segments every `segment_length_ms` (§4.4 admission happens per
/// sealed segment, §4.1 is the single-segment contract this reuses).
struct RotationController {
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
}

impl RotationController {
    fn start(
        store: Arc<SegmentStore>,
        window: Arc<RollingWindowController>,
        merger: Arc<Mutex<Option<BackgroundMerger>>>,
        capture_rx: Receiver<Arc<[f32]>>,
        spec: WavSpec,
        segment_length_ms: u64,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let paused_thread = paused.clone();

        let handle = std::thread::spawn(move || {
            while !stop_thread.load(Ordering::SeqCst) {
                let (seg_tx, seg_rx) = crossbeam_channel::unbounded();
                let writer = match SegmentWriterHandle::start(&store, seg_rx, spec) {
                    Ok(w) => w,
                    Err(e) => {
                        warn!("segment writer failed to start mid-session: {e}");
                        break;
                    }
                };
                if paused_thread.load(Ordering::SeqCst) {
                    writer.pause();
                }

                let segment_deadline = Instant::now() + Duration::from_millis(segment_length_ms);
                loop {
                    if stop_thread.load(Ordering::SeqCst) || Instant::now() >= segment_deadline {
                        break;
                    }
                    if paused_thread.load(Ordering::SeqCst) {
                        writer.pause();
                    } else {
                        writer.resume();
                    }
                    match capture_rx.recv_timeout(Duration::from_millis(200)) {
                        Ok(frame) => {
                            let _ = seg_tx.try_send(frame);
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                            stop_thread.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }
                drop(seg_tx);

                match writer.stop_safely() {
                    Ok((id, path)) => {
                        if let Some(seg) = window.validate_sealed_file(&store, id, path) {
                            let _ = window.admit(seg, &store);
                            if let Some(m) = merger.lock().as_ref() {
                                m.notify();
                            }
                        }
                    }
                    Err(e) => warn!("segment rotation: writer failed to seal cleanly: {e}"),
                }
            }
        });

        RotationController { stop, paused, handle }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop_and_join(self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

struct ActiveSession {
    capture: CaptureSession,
    rotation: RotationController,
    continuous: Option<ContinuousWriterHandle>,
    merger: Arc<Mutex<Option<BackgroundMerger>>>,
    store: Arc<SegmentStore>,
    window: Arc<RollingWindowController>,
    waveform: Option<WaveformAnalyzer>,
    duration_ticker: DurationTicker,
}

struct Inner {
    state: SessionState,
    session: Option<ActiveSession>,
    pause_accounting: PauseAccounting,
    recording_start: Option<Instant>,
    last_auto_paused_by_phone_call: bool,
    /// §6.1 `get_status().path`: the most recently finalized output, if any.
    /// Cleared again once a new session starts.
    last_output_path: Option<PathBuf>,
}

/// Thread-safe façade over the whole engine. Cheap to clone (wraps `Arc`s);
/// every command acquires the single `command_lock` internally, realizing
/// the "single-writer command queue" of §4.9.
#[derive(Clone)]
pub struct SessionFacade {
    config: EngineConfig,
    inner: Arc<Mutex<Inner>>,
    listeners: Arc<Mutex<Vec<EventListener>>>,
    waveform_cfg: Arc<Mutex<WaveformConfig>>,
}

impl SessionFacade {
    pub fn new(config: EngineConfig) -> Self {
        let waveform_cfg = WaveformConfig::new(config.sample_rate);
        SessionFacade {
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                session: None,
                pause_accounting: PauseAccounting::default(),
                recording_start: None,
                last_auto_paused_by_phone_call: false,
                last_output_path: None,
            })),
            listeners: Arc::new(Mutex::new(Vec::new())),
            waveform_cfg: Arc::new(Mutex::new(waveform_cfg)),
        }
    }

    /// §6.1 `configure_waveform({debounce_s, bars})`.
    pub fn configure_waveform(&self, debounce_s: Option<f64>, bars: Option<u32>) {
        let mut cfg = self.waveform_cfg.lock();
        if let Some(debounce_s) = debounce_s {
            cfg.debounce_ms = (debounce_s * 1000.0).max(0.0) as u64;
        }
        if bars.is_some() {
            cfg.bars = bars;
        }
    }

    /// §6.1 `configure_speech_detection({enabled, threshold, vad, calibration_ms})`.
    pub fn configure_speech_detection(
        &self,
        enabled: bool,
        threshold: Option<f64>,
        vad: Option<bool>,
        calibration_ms: Option<u64>,
    ) {
        let mut cfg = self.waveform_cfg.lock();
        cfg.speech_detection = enabled;
        if let Some(threshold) = threshold {
            cfg.speech_threshold = threshold;
        }
        if let Some(vad) = vad {
            cfg.vad_enabled = vad;
        }
        if let Some(calibration_ms) = calibration_ms {
            cfg.speech_calibration_ms = calibration_ms;
        }
    }

    /// §6.1 `configure_advanced_vad({enabled, window, voice_filter})`.
    pub fn configure_advanced_vad(&self, enabled: bool, window: Option<usize>, voice_filter: Option<bool>) {
        let mut cfg = self.waveform_cfg.lock();
        cfg.vad_enabled = enabled;
        if let Some(window) = window {
            cfg.vad_window = window;
        }
        if let Some(voice_filter) = voice_filter {
            cfg.voice_band_gate = voice_filter;
        }
    }

    pub fn on_event(&self, listener: EventListener) {
        self.listeners.lock().push(listener);
    }

    fn emit(&self, event: Event) {
        for listener in self.listeners.lock().iter() {
            listener(&event);
        }
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: self.config.channels,
            sample_rate: self.config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let inner = self.inner.lock();
        let (window_segments, buffered_duration_ms) = inner
            .session
            .as_ref()
            .map(|s| (s.window.segment_count(), s.window.total_duration_ms()))
            .unwrap_or((0, 0));
        StatusSnapshot {
            state: inner.state,
            duration_ms: self.duration_ms_locked(&inner),
            path: inner.last_output_path.clone(),
            window_segments,
            buffered_duration_ms,
        }
    }

    fn duration_ms_locked(&self, inner: &Inner) -> u64 {
        let Some(start) = inner.recording_start else {
            return 0;
        };
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(start);
        let paused = inner.pause_accounting.total_paused(now);
        elapsed.saturating_sub(paused).as_millis() as u64
    }

    /// §4.9: `idle --start--> recording`.
    pub fn start(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Idle {
            return Err(EngineError::InvalidState(format!(
                "start requires idle, session is {:?}",
                inner.state
            )));
        }

        let store = Arc::new(SegmentStore::new(self.config.segments_dir())?);
        store.cleanup_leftovers();
        let window = Arc::new(RollingWindowController::new(
            self.config.keep_duration_ms,
            self.config.segment_length_ms,
        ));
        let merger_slot: Arc<Mutex<Option<BackgroundMerger>>> = Arc::new(Mutex::new(None));
        if self.config.pre_merge {
            *merger_slot.lock() = Some(BackgroundMerger::start(store.clone(), window.clone()));
        }

        let (seg_tx, seg_rx) = crossbeam_channel::unbounded();
        let mut subscribers = vec![seg_tx];

        let continuous_path = self.config.resolved_base_dir().join(".continuous_session.wav");
        let continuous = if self.config.continuous {
            let (cont_tx, cont_rx) = crossbeam_channel::unbounded();
            subscribers.push(cont_tx);
            match ContinuousWriterHandle::start(continuous_path, cont_rx, self.wav_spec()) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    warn!("continuous writer unavailable, degrading to window-merge-only mode: {e}");
                    None
                }
            }
        } else {
            None
        };

        let (wave_tx, wave_rx) = crossbeam_channel::unbounded();
        subscribers.push(wave_tx);

        let capture = match CaptureSession::start(&self.config, subscribers) {
            Ok(c) => c,
            Err(e) => return Err(e),
        };

        let rotation = RotationController::start(
            store.clone(),
            window.clone(),
            merger_slot.clone(),
            seg_rx,
            self.wav_spec(),
            self.config.segment_length_ms,
        );

        let facade_for_waveform = self.clone();
        let waveform_cfg = self.waveform_cfg.clone();
        let (debounce_ms, gain) = {
            let cfg = waveform_cfg.lock();
            (cfg.debounce_ms, cfg.gain)
        };
        let waveform = WaveformAnalyzer::start(waveform_cfg, wave_rx, move |frame: WaveformFrame| {
            facade_for_waveform.emit(Event::WaveformData {
                level: frame.level,
                timestamp_ms: frame.timestamp_ms,
                voiced: frame.voiced,
            });
        });
        let duration_ticker = DurationTicker::start(self.clone());

        inner.session = Some(ActiveSession {
            capture,
            rotation,
            continuous,
            merger: merger_slot,
            store,
            window,
            waveform: Some(waveform),
            duration_ticker,
        });
        inner.state = SessionState::Recording;
        inner.recording_start = Some(Instant::now());
        inner.pause_accounting.reset();
        inner.last_output_path = None;

        self.emit(Event::WaveformInit { debounce_ms, gain });
        self.emit(Event::RecordingStatus {
            state: SessionState::Recording,
            duration_ms: 0,
            path: None,
        });
        info!("session started");
        Ok(())
    }

    /// §4.9: `recording --pause--> paused_manual`.
    pub fn pause(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Recording {
            return Err(EngineError::InvalidState(format!(
                "pause requires recording, session is {:?}",
                inner.state
            )));
        }
        if let Some(session) = &inner.session {
            session.rotation.pause();
            if let Some(continuous) = &session.continuous {
                continuous.pause();
            }
            if let Some(waveform) = &session.waveform {
                waveform.pause();
            }
        }
        inner.pause_accounting.begin_manual_pause(Instant::now());
        inner.state = SessionState::PausedManual;
        let duration_ms = self.duration_ms_locked(&inner);
        drop(inner);
        self.emit(Event::RecordingStatus {
            state: SessionState::PausedManual,
            duration_ms,
            path: None,
        });
        Ok(())
    }

    /// §4.9: `paused_manual --resume--> recording`.
    pub fn resume(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::PausedManual && inner.state != SessionState::PausedInterrupt {
            return Err(EngineError::InvalidState(format!(
                "resume requires a paused session, session is {:?}",
                inner.state
            )));
        }
        if let Some(session) = &inner.session {
            session.rotation.resume();
            if let Some(continuous) = &session.continuous {
                continuous.resume();
            }
            if let Some(waveform) = &session.waveform {
                waveform.resume();
            }
        }
        let now = Instant::now();
        inner.pause_accounting.end_manual_pause(now);
        inner.pause_accounting.end_interrupt_pause(now);
        inner.state = SessionState::Recording;
        let duration_ms = self.duration_ms_locked(&inner);
        drop(inner);
        self.emit(Event::RecordingStatus {
            state: SessionState::Recording,
            duration_ms,
            path: None,
        });
        Ok(())
    }

    /// §4.9 reset semantics: discard window/artifacts, zero counters, land
    /// in `paused_manual` rather than `recording` so the caller must
    /// explicitly resume.
    pub fn reset(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Recording && inner.state != SessionState::PausedManual {
            return Err(EngineError::InvalidState(format!(
                "reset requires an active session, session is {:?}",
                inner.state
            )));
        }
        if let Some(session) = inner.session.take() {
            session.rotation.stop_and_join();
            session.capture.stop();
            if let Some(continuous) = session.continuous {
                let _ = continuous.stop_safely();
            }
            if let Some(merger) = session.merger.lock().take() {
                merger.stop_and_join();
            }
            if let Some(waveform) = session.waveform {
                waveform.stop();
            }
            session.duration_ticker.stop_and_join();
            session.window.clear();
            session.store.cleanup_leftovers();
        }
        self.emit(Event::WaveformDestroy {
            reason: "reset".into(),
            timestamp_ms: 0,
        });

        // Start a fresh session immediately so reset behaves like "start
        // over", but land in paused_manual per spec rather than recording.
        inner.session = None;
        inner.pause_accounting.reset();
        inner.recording_start = Some(Instant::now());
        inner.pause_accounting.begin_manual_pause(Instant::now());
        inner.state = SessionState::Idle;
        drop(inner);

        self.start()?;
        let mut inner = self.inner.lock();
        if let Some(session) = &inner.session {
            session.rotation.pause();
            if let Some(continuous) = &session.continuous {
                continuous.pause();
            }
            if let Some(waveform) = &session.waveform {
                waveform.pause();
            }
        }
        inner.pause_accounting.begin_manual_pause(Instant::now());
        inner.state = SessionState::PausedManual;
        drop(inner);

        self.emit(Event::RecordingStatus {
            state: SessionState::PausedManual,
            duration_ms: 0,
            path: None,
        });
        Ok(())
    }

    /// §4.9/§4.6: `any --stop--> stopping --> idle`, running the Finalizer.
    pub fn stop(&self) -> EngineResult<PathBuf> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Idle {
            return Err(EngineError::InvalidState("stop requires an active session".into()));
        }
        let session = inner.session.take().ok_or_else(|| {
            EngineError::InvalidState("stop called with no active session".into())
        })?;
        inner.state = SessionState::Stopping;
        drop(inner);

        self.emit(Event::RecordingStatus {
            state: SessionState::Stopping,
            duration_ms: 0,
            path: None,
        });

        let ActiveSession {
            capture,
            rotation,
            continuous,
            merger,
            store,
            window,
            waveform,
            duration_ticker,
        } = session;

        rotation.stop_and_join();
        capture.stop();
        if let Some(waveform) = waveform {
            waveform.stop();
        }
        duration_ticker.stop_and_join();
        self.emit(Event::WaveformDestroy {
            reason: "stop".into(),
            timestamp_ms: 0,
        });
        let merger = merger.lock().take();

        let result = match merger {
            Some(merger) => Finalizer::finalize(
                &store,
                &window,
                merger,
                continuous,
                self.config.keep_duration_ms,
                self.wav_spec(),
                &self.config.resolved_base_dir().join("Recordings"),
            ),
            None => {
                // pre_merge disabled: Finalizer always takes a merger handle,
                // so hand it a freshly started, never-notified one. Its
                // merged_version stays behind plan_version, so the pre-merge
                // fast path is correctly skipped in favor of live merge.
                let placeholder = BackgroundMerger::start(store.clone(), window.clone());
                Finalizer::finalize(
                    &store,
                    &window,
                    placeholder,
                    continuous,
                    self.config.keep_duration_ms,
                    self.wav_spec(),
                    &self.config.resolved_base_dir().join("Recordings"),
                )
            }
        };

        let mut inner = self.inner.lock();
        inner.state = SessionState::Idle;
        inner.recording_start = None;
        inner.pause_accounting.reset();
        inner.last_output_path = result.as_ref().ok().cloned();
        drop(inner);

        match &result {
            Ok(path) => {
                self.emit(Event::RecordingStatus {
                    state: SessionState::Idle,
                    duration_ms: 0,
                    path: Some(path.clone()),
                });
            }
            Err(e) => {
                self.emit(Event::Error {
                    kind: e.kind_name().to_string(),
                    message: e.to_string(),
                });
            }
        }
        result
    }

    /// §4.8: routes an external interruption event into the façade's
    /// pause/resume machinery, tracking whether an auto-pause was caused by
    /// a phone call so `phone_call_end` only auto-resumes in that case.
    pub fn handle_interruption(&self, event: InterruptionEvent) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        match event.accounting_effect() {
            AccountingEffect::Pause => inner.pause_accounting.begin_interrupt_pause(now),
            AccountingEffect::Resume => inner.pause_accounting.end_interrupt_pause(now),
            AccountingEffect::Unchanged => {}
        }

        match event.capture_action() {
            CoordinatorAction::PauseCapture => {
                if inner.state == SessionState::Recording {
                    if let Some(session) = &inner.session {
                        session.rotation.pause();
                        if let Some(continuous) = &session.continuous {
                            continuous.pause();
                        }
                        if let Some(waveform) = &session.waveform {
                            waveform.pause();
                        }
                    }
                    inner.state = SessionState::PausedInterrupt;
                    if event == InterruptionEvent::PhoneCallBegin {
                        inner.last_auto_paused_by_phone_call = true;
                    }
                }
            }
            CoordinatorAction::ResumeCaptureIfAutoPaused => {
                if inner.state == SessionState::PausedInterrupt && inner.last_auto_paused_by_phone_call {
                    if let Some(session) = &inner.session {
                        session.rotation.resume();
                        if let Some(continuous) = &session.continuous {
                            continuous.resume();
                        }
                        if let Some(waveform) = &session.waveform {
                            waveform.resume();
                        }
                    }
                    inner.state = SessionState::Recording;
                    inner.last_auto_paused_by_phone_call = false;
                }
            }
            CoordinatorAction::None => {}
        }

        let state = inner.state;
        let duration_ms = self.duration_ms_locked(&inner);
        drop(inner);

        self.emit(Event::Interruption {
            kind: format!("{event:?}"),
            began: matches!(event.capture_action(), CoordinatorAction::PauseCapture),
        });
        self.emit(Event::RecordingStatus {
            state,
            duration_ms,
            path: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.base_dir = Some(dir.to_path_buf());
        cfg.continuous = false;
        cfg.pre_merge = false;
        cfg
    }

    #[test]
    fn start_on_non_idle_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let facade = SessionFacade::new(test_config(dir.path()));
        // Can't actually start capture in a headless test environment
        // without a real input device, so only exercise the error path
        // that doesn't require hardware: stop on idle.
        let err = facade.stop().unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn pause_before_start_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let facade = SessionFacade::new(test_config(dir.path()));
        let err = facade.pause().unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn resume_before_start_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let facade = SessionFacade::new(test_config(dir.path()));
        let err = facade.resume().unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn status_before_start_has_zeroed_window_fields() {
        let dir = tempfile::tempdir().unwrap();
        let facade = SessionFacade::new(test_config(dir.path()));
        let status = facade.status();
        assert_eq!(status.state, SessionState::Idle);
        assert_eq!(status.window_segments, 0);
        assert_eq!(status.buffered_duration_ms, 0);
        assert_eq!(status.path, None);
    }

    #[test]
    fn configure_waveform_updates_shared_config() {
        let dir = tempfile::tempdir().unwrap();
        let facade = SessionFacade::new(test_config(dir.path()));
        facade.configure_waveform(Some(0.1), Some(12));
        let cfg = *facade.waveform_cfg.lock();
        assert_eq!(cfg.debounce_ms, 100);
        assert_eq!(cfg.bars, Some(12));
    }

    #[test]
    fn configure_speech_detection_updates_shared_config() {
        let dir = tempfile::tempdir().unwrap();
        let facade = SessionFacade::new(test_config(dir.path()));
        facade.configure_speech_detection(true, Some(0.05), Some(true), Some(800));
        let cfg = *facade.waveform_cfg.lock();
        assert!(cfg.speech_detection);
        assert_eq!(cfg.speech_threshold, 0.05);
        assert!(cfg.vad_enabled);
        assert_eq!(cfg.speech_calibration_ms, 800);
    }

    #[test]
    fn configure_advanced_vad_updates_shared_config() {
        let dir = tempfile::tempdir().unwrap();
        let facade = SessionFacade::new(test_config(dir.path()));
        facade.configure_advanced_vad(true, Some(8), Some(false));
        let cfg = *facade.waveform_cfg.lock();
        assert!(cfg.vad_enabled);
        assert_eq!(cfg.vad_window, 8);
        assert!(!cfg.voice_band_gate);
    }
}
