use crate::models::error::CaptureError;
use crate::models::frame::{Frame, TrackKind};
use crate::models::recording_result::ContainerSummary;
use crate::models::state::ContainerStatus;
use crate::models::time::TimeBase;

/// Encoding parameters for one output track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSettings {
    Video { width: u32, height: u32, bitrate: u32 },
    Audio { sample_rate: u32, channels: u16 },
}

impl TrackSettings {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackSettings::Video { .. } => TrackKind::Video,
            TrackSettings::Audio { .. } => TrackKind::Audio,
        }
    }
}

/// Multiplexing output: one file, one track per kind.
///
/// Lifecycle mirrors an asset writer: tracks are added while the status is
/// `Unknown`, `start_writing` moves to `Writing`, `finish` consumes the
/// sink and yields `Completed` (or an error).
pub trait ContainerSink: Send {
    fn status(&self) -> ContainerStatus;

    fn track_count(&self) -> usize;

    /// Add a track. Only valid before writing starts; one per kind.
    fn add_track(&mut self, settings: TrackSettings) -> Result<(), CaptureError>;

    /// Begin the file; `start_time` becomes time zero of the output.
    fn start_writing(&mut self, start_time: TimeBase) -> Result<(), CaptureError>;

    /// Backpressure signal: `false` means the frame should be dropped.
    fn is_ready_for_more(&self, track: TrackKind) -> bool;

    /// Append an already-corrected frame to its track.
    fn append(&mut self, frame: &Frame) -> Result<(), CaptureError>;

    /// Finalize the file. May block; the track writer calls it off the
    /// writer thread.
    fn finish(self: Box<Self>) -> Result<ContainerSummary, CaptureError>;
}
