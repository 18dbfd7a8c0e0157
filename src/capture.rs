//! Owns the single microphone session and fans captured frames out to every
//! consumer (§5 "shared resources": "the PCM source is multiplexed — at most
//! one microphone session at a time; C1+C2+C7 share the same session").
//! Grounded on the teacher's `audio.rs::start_segment`, which built a cpal
//! input stream and an `is_recording` flag inside a dedicated thread; here
//! the stream is built once per recording and broadcasts mono f32 frames to
//! however many subscribers registered before `start`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use log::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels as usize)
        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn find_input_device(host: &cpal::Host, config: &EngineConfig) -> Option<cpal::Device> {
    if let Some(ref name) = config.input_device_name {
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if matches!(device.name().as_deref(), Ok(n) if n == name.as_str()) {
                    info!("using configured input device: {name}");
                    return Some(device);
                }
            }
        }
        warn!("configured input device '{name}' not found, falling back to default");
    }
    host.default_input_device()
}

/// A live microphone capture. Dropping it (or calling `stop`) tears down the
/// stream and joins the thread that owns it.
pub struct CaptureSession {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl CaptureSession {
    /// Starts the microphone stream on a dedicated thread (cpal streams are
    /// not `Send` on every backend, so the stream never leaves the thread
    /// that created it) and registers `subscribers` to receive every mono
    /// frame captured. Blocks until the stream is confirmed running or
    /// failed to start.
    pub fn start(
        config: &EngineConfig,
        subscribers: Vec<Sender<Arc<[f32]>>>,
    ) -> EngineResult<Self> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<EngineResult<(u32, u16)>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let config = config.clone();

        let handle = std::thread::spawn(move || {
            // Device/stream setup is glue code against an external, fallible
            // API surface (cpal) — collect it with `anyhow` the way the
            // teacher's `start_segment` did, then convert to the one typed
            // error this module actually reports at its boundary.
            let run = || -> anyhow::Result<(cpal::Stream, u32, u16)> {
                let host = cpal::default_host();
                let device = find_input_device(&host, &config)
                    .ok_or_else(|| anyhow::anyhow!("no input device available"))?;
                let supported = device
                    .default_input_config()
                    .map_err(|e| anyhow::anyhow!("no input config: {e}"))?;
                let sample_rate = supported.sample_rate().0;
                let channels = supported.channels();

                let err_fn = |err| error!("capture stream error: {err}");
                let senders = subscribers.clone();
                let stream = device
                    .build_input_stream(
                        &supported.into(),
                        move |data: &[f32], _: &_| {
                            let mono: Arc<[f32]> = to_mono(data, channels).into();
                            for tx in &senders {
                                let _ = tx.try_send(mono.clone());
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| anyhow::anyhow!("could not build input stream: {e}"))?;
                stream
                    .play()
                    .map_err(|e| anyhow::anyhow!("could not start stream: {e}"))?;
                Ok((stream, sample_rate, channels))
            };

            match run() {
                Ok((stream, sample_rate, channels)) => {
                    let _ = ready_tx.send(Ok((sample_rate, channels)));
                    while !stop_thread.load(Ordering::SeqCst) {
                        std::thread::sleep(std::time::Duration::from_millis(50));
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(EngineError::EncoderUnavailable(e.to_string())));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok((sample_rate, channels))) => Ok(CaptureSession {
                stop,
                handle: Some(handle),
                sample_rate,
                channels,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(EngineError::EncoderUnavailable("capture thread died before starting".into()))
            }
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
