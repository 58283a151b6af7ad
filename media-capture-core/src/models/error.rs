use std::path::PathBuf;

use thiserror::Error;

use super::device::DeviceKind;

/// Errors raised by the capture, writing and playback components.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("{device} permission denied")]
    PermissionDenied { device: DeviceKind },

    #[error("device not available: {0}")]
    DeviceUnavailable(String),

    #[error("device configuration failed: {0}")]
    DeviceConfigurationFailed(String),

    #[error("stale output file could not be removed: {}", .0.display())]
    OutputPathCollision(PathBuf),

    #[error("writer initialization failed: {0}")]
    WriterInitFailed(String),

    #[error("writer failed: {0}")]
    WriterRuntimeFailed(String),

    #[error("recording requested before the capture session was ready")]
    RecordBeforeReady,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("playback failed: {0}")]
    Playback(String),
}

impl CaptureError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied { device } => format!(
                "This app does not have access to your {device}. You can enable access in Privacy Settings."
            ),
            Self::DeviceUnavailable(_) | Self::DeviceConfigurationFailed(_) | Self::OutputPathCollision(_) => {
                "Could not activate the camera or microphone.".to_string()
            }
            Self::WriterInitFailed(_) | Self::WriterRuntimeFailed(_) | Self::Storage(_) => {
                "Recording failed.".to_string()
            }
            Self::RecordBeforeReady => "The camera is not ready yet.".to_string(),
            Self::InvalidConfiguration(_) => "The recording settings are invalid.".to_string(),
            Self::Playback(_) => "Could not play back the video.".to_string(),
        }
    }

    /// Whether this error puts the reporting component into its sticky
    /// failed state.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::RecordBeforeReady | Self::Playback(_))
    }
}
