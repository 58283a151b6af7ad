use std::fmt;

use serde::{Deserialize, Serialize};

use super::time::TimeBase;

/// Which of the two output tracks a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    /// Wire-format byte used by the container.
    pub fn as_u8(&self) -> u8 {
        match self {
            TrackKind::Video => 0,
            TrackKind::Audio => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TrackKind::Video),
            1 => Some(TrackKind::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// One timestamped unit of captured media.
///
/// Immutable once built. Moves by value from the device callback through
/// the capture queue into the writer; nothing keeps a copy.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    track: TrackKind,
    payload: Vec<u8>,
    presentation_time: TimeBase,
    duration: TimeBase,
}

impl Frame {
    pub fn new(track: TrackKind, payload: Vec<u8>, presentation_time: TimeBase, duration: TimeBase) -> Self {
        Self {
            track,
            payload,
            presentation_time,
            duration,
        }
    }

    pub fn video(payload: Vec<u8>, presentation_time: TimeBase, duration: TimeBase) -> Self {
        Self::new(TrackKind::Video, payload, presentation_time, duration)
    }

    pub fn audio(payload: Vec<u8>, presentation_time: TimeBase, duration: TimeBase) -> Self {
        Self::new(TrackKind::Audio, payload, presentation_time, duration)
    }

    pub fn track(&self) -> TrackKind {
        self.track
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn presentation_time(&self) -> TimeBase {
        self.presentation_time
    }

    pub fn duration(&self) -> TimeBase {
        self.duration
    }

    /// Presentation time of the sample that should follow this one.
    pub fn end_time(&self) -> TimeBase {
        self.presentation_time + self.duration
    }

    /// Consume the frame, re-stamping it at `presentation_time`.
    pub fn retimed(self, presentation_time: TimeBase) -> Self {
        Self {
            presentation_time,
            ..self
        }
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("track", &self.track)
            .field("payload_len", &self.payload.len())
            .field("presentation_time", &self.presentation_time)
            .field("duration", &self.duration)
            .finish()
    }
}
