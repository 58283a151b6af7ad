use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::frame::TrackKind;
use super::time::TimeBase;

/// Still image taken from the finished recording.
///
/// `data` is the payload of the video sample nearest the requested time,
/// in whatever encoding the camera delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// Offset of the sample from the start of the file.
    pub time: TimeBase,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// What the container writer reports once the file is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub file_path: PathBuf,
    pub checksum: String,
    pub bytes_written: u64,
    pub video_samples: u64,
    pub audio_samples: u64,
}

/// Delivered with the `finished` event.
///
/// Duration and thumbnail are read back from the finalized file, not from
/// the elapsed counter.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub thumbnail: Option<Thumbnail>,
    pub duration: TimeBase,
    pub metadata: RecordingMetadata,
}

impl RecordingResult {
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// One track entry in the metadata sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    #[serde(rename = "type")]
    pub track: TrackKind,
    pub samples: u64,
}

/// Metadata stored alongside a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: String,
    pub size_bytes: u64,
    pub created_at: String,
    pub tracks: Vec<TrackMetadata>,
}

impl RecordingMetadata {
    /// Metadata for a finished video + audio recording.
    pub fn from_summary(summary: &ContainerSummary, duration: TimeBase) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            duration_secs: duration.as_secs_f64(),
            file_path: summary.file_path.to_string_lossy().to_string(),
            checksum: summary.checksum.clone(),
            size_bytes: summary.bytes_written,
            created_at: chrono::Utc::now().to_rfc3339(),
            tracks: vec![
                TrackMetadata {
                    track: TrackKind::Video,
                    samples: summary.video_samples,
                },
                TrackMetadata {
                    track: TrackKind::Audio,
                    samples: summary.audio_samples,
                },
            ],
        }
    }
}
