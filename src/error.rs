use std::path::PathBuf;

/// How a caller should treat an [`EngineError`]: retry locally, surface it to
/// the session's user, or treat the session as unrecoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Recoverable without surfacing to the caller (retry, drop, fall back).
    Local,
    /// Surface to the caller; the session itself may still be usable.
    Surface,
    /// Fatal to the current session; a best-effort finalize should run.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no microphone permission")]
    PermissionDenied,

    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("encoder failed mid-session: {message} (partial file: {partial_path:?})")]
    EncoderFailure {
        message: String,
        partial_path: Option<PathBuf>,
    },

    #[error("I/O failure on {path:?}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("segment {path:?} failed validation: {reason}")]
    SegmentInvalid { path: PathBuf, reason: String },

    #[error("merge failed: {0}")]
    MergeFailure(String),

    #[error("invalid command for current session state: {0}")]
    InvalidState(String),

    #[error("interrupted by phone call")]
    InterruptedByCall,

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl EngineError {
    pub fn propagation(&self) -> Propagation {
        match self {
            EngineError::PermissionDenied => Propagation::Surface,
            EngineError::EncoderUnavailable(_) => Propagation::Surface,
            EngineError::EncoderFailure { .. } => Propagation::Fatal,
            EngineError::IoFailure { .. } => Propagation::Surface,
            EngineError::SegmentInvalid { .. } => Propagation::Local,
            EngineError::MergeFailure(_) => Propagation::Local,
            EngineError::InvalidState(_) => Propagation::Surface,
            EngineError::InterruptedByCall => Propagation::Local,
            EngineError::Timeout(_) => Propagation::Local,
        }
    }

    /// The §6.4 `error(kind, message)` event payload kind string.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EngineError::PermissionDenied => "PermissionDenied",
            EngineError::EncoderUnavailable(_) => "EncoderUnavailable",
            EngineError::EncoderFailure { .. } => "EncoderFailure",
            EngineError::IoFailure { .. } => "IOFailure",
            EngineError::SegmentInvalid { .. } => "SegmentInvalid",
            EngineError::MergeFailure(_) => "MergeFailure",
            EngineError::InvalidState(_) => "InvalidState",
            EngineError::InterruptedByCall => "InterruptedByCall",
            EngineError::Timeout(_) => "Timeout",
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::IoFailure {
            path: path.into(),
            source,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
