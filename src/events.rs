use serde::Serialize;
use std::path::PathBuf;

use crate::facade::SessionState;

/// Closed set of events the engine emits (§6.4). Replaces "runtime
/// reflection of event names" with an enum; marshalling to a host only
/// happens at the command-surface boundary (`server.rs`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    RecordingStatus {
        state: SessionState,
        duration_ms: u64,
        path: Option<PathBuf>,
    },
    DurationChanged {
        duration_ms: u64,
    },
    WaveformInit {
        debounce_ms: u64,
        gain: f64,
    },
    WaveformData {
        level: f64,
        timestamp_ms: u64,
        voiced: bool,
    },
    WaveformDestroy {
        reason: String,
        timestamp_ms: u64,
    },
    Interruption {
        kind: String,
        began: bool,
    },
    Error {
        kind: String,
        message: String,
    },
}

/// A boxed callback invoked on every emitted event, grounded on the
/// teacher's tray/status-update closures replaced here with a plain
/// listener record (spec.md §9: "inheritance for listeners" becomes
/// closures grouped in a record).
pub type EventListener = Box<dyn Fn(&Event) + Send + Sync>;
