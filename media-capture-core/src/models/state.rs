use serde::{Deserialize, Serialize};

use super::device::DeviceKind;
use super::time::TimeBase;

/// Capture session lifecycle.
///
/// ```text
/// uninitialized → configuring → ready → running → stopped
///        ↓             ↓                             │
/// permission_denied  failed      (configure again) ◄─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSessionState {
    Uninitialized,
    PermissionDenied(DeviceKind),
    Configuring,
    Ready,
    Running,
    Stopped,
    Failed,
}

impl CaptureSessionState {
    /// Device bindings exist (ready or running).
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Recording controller state machine.
///
/// ```text
/// idle → recording ⇄ paused
///            ↓         ↓
///         finishing ◄──┘ → finished
/// (any) → failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Recording,
    Paused,
    Finishing,
    Finished,
    Failed,
}

impl RecordingState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// Status of the output container, as in `AVAssetWriter.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Unknown,
    Writing,
    Completed,
    Failed,
}

/// Per-track bookkeeping of the track writer.
///
/// `pause_correction` never decreases. It is recomputed once per
/// pause/resume cycle, on the first frame of the track after `pause()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterTrackState {
    /// Corrected end time (`pts + duration`) of the last written frame.
    pub last_emitted_time: Option<TimeBase>,
    /// Corrected presentation time of the last written frame.
    pub last_presentation_time: Option<TimeBase>,
    pub pause_correction: TimeBase,
    pub pending_correction_update: bool,
}

impl WriterTrackState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Counters for debugging a recording.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordingDiagnostics {
    pub video_frames_delivered: u64,
    pub audio_frames_delivered: u64,
    pub video_frames_written: u64,
    pub audio_frames_written: u64,
    pub video_frames_dropped: u64,
    pub audio_frames_dropped: u64,
    pub bytes_written: u64,
}
