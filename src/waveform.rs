//! C7: parallel PCM tap producing a debounced waveform/VAD level stream
//! (§4.7). Independent of the capture-to-disk path — analysis never
//! throttles recording. Grounded on the teacher's `record_input_level`
//! RMS helper in `audio.rs`/`state.rs`, expanded into the full gain /
//! calibration / speech-detection / VAD pipeline the distilled spec calls
//! for but the teacher only partially implemented.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

const F_MIN_HZ: f64 = 85.0;
const F_MAX_HZ: f64 = 3400.0;
const CALIBRATION_WINDOW: usize = 10;
const DEFAULT_SPEECH_CALIBRATION_MS: u64 = 600;
const SOFT_PEAK: f64 = 0.7;
const MIN_DEBOUNCE_MS: u64 = 20;
const DEFAULT_DEBOUNCE_MS: u64 = 50;
/// §4.7 step 10 buffer-sizing floor. Not spec-given; chosen as a round
/// number comfortably below a 20 ms buffer at 16 kHz (320 samples) so the
/// analyzer never processes a buffer shorter than one debounce tick even at
/// the minimum debounce.
const MIN_BUFFER_SAMPLES: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct WaveformConfig {
    pub sample_rate: u32,
    pub voice_band_gate: bool,
    pub gain: f64,
    pub bars: Option<u32>,
    pub speech_detection: bool,
    pub speech_threshold: f64,
    pub speech_calibration_ms: u64,
    pub vad_enabled: bool,
    pub vad_window: usize,
    pub debounce_ms: u64,
}

impl WaveformConfig {
    pub fn new(sample_rate: u32) -> Self {
        let gain = if sample_rate >= 48_000 { 30.0 } else { 20.0 };
        WaveformConfig {
            sample_rate,
            voice_band_gate: true,
            gain,
            bars: None,
            speech_detection: false,
            speech_threshold: 0.02,
            speech_calibration_ms: DEFAULT_SPEECH_CALIBRATION_MS,
            vad_enabled: false,
            vad_window: 5,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }

    fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(MIN_DEBOUNCE_MS))
    }

    /// §4.7 step 10: `max(min_buffer, samples_per_debounce * 2)`, capped at
    /// `2 * min_buffer`.
    fn buffer_samples(&self) -> usize {
        let samples_per_debounce =
            (self.sample_rate as u64 * self.debounce_ms.max(MIN_DEBOUNCE_MS)) / 1_000;
        let target = samples_per_debounce.saturating_mul(2);
        target.clamp(MIN_BUFFER_SAMPLES as u64, 2 * MIN_BUFFER_SAMPLES as u64) as usize
    }

    /// Number of processed buffers to spend calibrating the speech-detection
    /// background level, derived from `speech_calibration_ms` and the
    /// buffer duration implied by `buffer_samples`/`sample_rate`.
    fn speech_calibration_frames(&self) -> usize {
        let buffer_ms = (self.buffer_samples() as f64 / self.sample_rate as f64) * 1_000.0;
        if buffer_ms <= 0.0 {
            return 1;
        }
        ((self.speech_calibration_ms as f64 / buffer_ms).ceil() as usize).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformFrame {
    pub level: f64,
    pub timestamp_ms: u64,
    pub voiced: bool,
}

fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|s| (*s as f64).powi(2)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

fn zero_crossing_rate(samples: &[f32]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64
}

fn expected_zcr_range(n: usize, sample_rate: u32) -> (f64, f64) {
    let sr = sample_rate as f64;
    let n = n as f64;
    (2.0 * F_MIN_HZ * n / sr, 2.0 * F_MAX_HZ * n / sr)
}

/// Stateful single-threaded pipeline implementing §4.7 steps 1-9. One
/// instance per analyzer; `process` is called once per accumulated buffer,
/// with the analyzer's current config passed in on every call so a live
/// `configure_*` update takes effect on the next buffer rather than
/// requiring the analyzer to restart.
struct Pipeline {
    calibration_ring: VecDeque<f64>,
    calibration_factor: f64,
    speech_frames_seen: usize,
    speech_bg_samples: Vec<f64>,
    speech_bg: f64,
    vad_energy_window: VecDeque<f64>,
    started_at: Instant,
}

impl Pipeline {
    fn new() -> Self {
        Pipeline {
            calibration_ring: VecDeque::with_capacity(CALIBRATION_WINDOW),
            calibration_factor: 1.0,
            speech_frames_seen: 0,
            speech_bg_samples: Vec::new(),
            speech_bg: 0.0,
            vad_energy_window: VecDeque::with_capacity(20),
            started_at: Instant::now(),
        }
    }

    fn process(&mut self, cfg: &WaveformConfig, samples: &[f32]) -> (f64, bool) {
        // 1. RMS, normalized to [0,1]. Incoming samples are cpal-normalized
        // floats in [-1.0, 1.0] (capture.rs's `to_mono`) — scale to int16
        // range first, the same convention C1/C2 use when writing PCM to
        // disk, so the normalization below operates on the right magnitude.
        let scaled: Vec<f32> = samples
            .iter()
            .map(|s| s.clamp(-1.0, 1.0) * i16::MAX as f32)
            .collect();
        let mut level = rms(&scaled) / i16::MAX as f64;

        // 2. Voice-band gate.
        if cfg.voice_band_gate {
            let zcr = zero_crossing_rate(samples);
            let (lo, hi) = expected_zcr_range(samples.len(), cfg.sample_rate);
            if zcr < lo || zcr > hi {
                level *= 0.3;
            }
        }

        // 3. Gain.
        level *= cfg.gain;

        // 4. Calibration.
        if self.calibration_ring.len() == CALIBRATION_WINDOW {
            self.calibration_ring.pop_front();
        }
        self.calibration_ring.push_back(level);
        if self.calibration_ring.len() == CALIBRATION_WINDOW {
            let non_zero: Vec<f64> = self.calibration_ring.iter().copied().filter(|v| *v > 0.0).collect();
            if !non_zero.is_empty() {
                let mean = non_zero.iter().sum::<f64>() / non_zero.len() as f64;
                if mean > 0.0 {
                    self.calibration_factor = (0.6 / mean).clamp(0.5, 2.0);
                }
            }
        }
        level *= self.calibration_factor;

        // 5. Speech detection.
        let mut energy_for_vad = level;
        if cfg.speech_detection {
            let calibration_frames = cfg.speech_calibration_frames();
            if self.speech_frames_seen < calibration_frames {
                self.speech_bg_samples.push(level);
                self.speech_frames_seen += 1;
                if self.speech_frames_seen == calibration_frames {
                    let mean = self.speech_bg_samples.iter().sum::<f64>()
                        / self.speech_bg_samples.len() as f64;
                    self.speech_bg = 1.2 * mean;
                }
            }
            let effective_threshold = cfg.speech_threshold.max(self.speech_bg + 0.005);
            energy_for_vad = level;
            if level < effective_threshold {
                level = 0.0;
            }
        }

        // 6. VAD.
        let mut voiced = level > 0.0;
        if cfg.vad_enabled {
            let window = cfg.vad_window.clamp(3, 20);
            if self.vad_energy_window.len() == window {
                self.vad_energy_window.pop_front();
            }
            self.vad_energy_window.push_back(energy_for_vad);

            let zcr = zero_crossing_rate(samples);
            let above_bg = energy_for_vad > self.speech_bg;
            let zcr_ok = (10.0..=1000.0).contains(&zcr);
            let fraction_above = self
                .vad_energy_window
                .iter()
                .filter(|v| **v > self.speech_bg)
                .count() as f64
                / self.vad_energy_window.len().max(1) as f64;
            voiced = above_bg && zcr_ok && fraction_above >= 0.3;
            if !voiced {
                level = 0.0;
            }
        }

        // 7. Silence gate.
        let silence_floor = 0.01_f64.max(cfg.speech_threshold);
        if level < silence_floor {
            level = 0.0;
        }

        // 8. Soft peak.
        level = level.min(SOFT_PEAK);

        // 9. Quantization to 1/1000.
        level = (level * 1000.0).round() / 1000.0;

        (level, voiced)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// Runs the analyzer on its own thread, consuming frames from `rx` and
/// invoking `on_frame` at most once per `debounce_ms` (§4.7 step 10). `cfg`
/// is shared with the façade so `configure_waveform`/`configure_speech_detection`/
/// `configure_advanced_vad` take effect on the next buffer without
/// restarting the analyzer.
pub struct WaveformAnalyzer {
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl WaveformAnalyzer {
    pub fn start(
        cfg: Arc<Mutex<WaveformConfig>>,
        rx: Receiver<Arc<[f32]>>,
        on_frame: impl Fn(WaveformFrame) + Send + 'static,
    ) -> Self {
        let paused = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let paused_thread = paused.clone();
        let stop_thread = stop.clone();

        let handle = std::thread::spawn(move || {
            let mut pipeline = Pipeline::new();
            let mut last_emit: Option<Instant> = None;
            let mut acc: Vec<f32> = Vec::new();

            while !stop_thread.load(Ordering::SeqCst) {
                match rx.recv_timeout(Duration::from_millis(200)) {
                    Ok(samples) => {
                        if paused_thread.load(Ordering::SeqCst) {
                            continue;
                        }
                        acc.extend_from_slice(&samples);
                        let current_cfg = *cfg.lock();
                        let buffer_samples = current_cfg.buffer_samples();
                        let debounce = current_cfg.debounce();

                        while acc.len() >= buffer_samples {
                            let chunk: Vec<f32> = acc.drain(..buffer_samples).collect();
                            let (level, voiced) = pipeline.process(&current_cfg, &chunk);
                            let due = last_emit.map(|t| t.elapsed() >= debounce).unwrap_or(true);
                            if due {
                                last_emit = Some(Instant::now());
                                on_frame(WaveformFrame {
                                    level,
                                    timestamp_ms: pipeline.elapsed_ms(),
                                    voiced,
                                });
                            }
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        WaveformAnalyzer {
            paused,
            stop,
            handle: Some(handle),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WaveformAnalyzer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
