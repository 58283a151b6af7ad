use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::device::CameraPosition;
use super::error::CaptureError;
use super::time::TimeBase;

/// Video bitrate tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureQuality {
    Low,
    Medium,
    High,
}

impl CaptureQuality {
    /// Average video bitrate in bits per second.
    pub fn video_bitrate(&self) -> u32 {
        match self {
            CaptureQuality::Low => 500_000,
            CaptureQuality::Medium => 1_000_000,
            CaptureQuality::High => 2_000_000,
        }
    }
}

/// Session preset. Only VGA is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPreset {
    Vga640x480,
}

impl SessionPreset {
    /// Capture dimensions (landscape, as the sensor delivers them).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            SessionPreset::Vga640x480 => (640, 480),
        }
    }
}

/// When the active camera may be swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPolicy {
    /// Only while no recording exists (controller idle).
    IdleOnly,
    /// Whenever the session is configured and frames are not being forwarded.
    WhileConfigured,
}

/// Configuration for a capture session and the recordings it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    pub preset: SessionPreset,

    pub quality: CaptureQuality,

    /// Encoded video size, portrait (default: 480×640).
    pub video_width: u32,
    pub video_height: u32,

    /// Audio sample rate in Hz (default: 44100).
    pub audio_sample_rate: u32,

    /// Audio channel count (default: 1, mono).
    pub audio_channels: u16,

    /// Camera bound on first configure (default: front).
    pub initial_camera: CameraPosition,

    /// Container written by each recording. A stale file is removed on configure.
    pub output_path: PathBuf,

    /// Offset into the finished file at which the thumbnail is taken.
    pub thumbnail_time: TimeBase,

    pub switch_policy: SwitchPolicy,

    /// Stop automatically once the elapsed clock reaches this many seconds.
    pub max_duration_secs: Option<f64>,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.video_width == 0 || self.video_height == 0 {
            return Err(CaptureError::InvalidConfiguration(format!(
                "video size must be non-zero, got {}x{}",
                self.video_width, self.video_height
            )));
        }
        if self.audio_sample_rate == 0 {
            return Err(CaptureError::InvalidConfiguration(
                "audio sample rate must be positive".into(),
            ));
        }
        if ![1, 2].contains(&self.audio_channels) {
            return Err(CaptureError::InvalidConfiguration(format!(
                "unsupported channel count: {}",
                self.audio_channels
            )));
        }
        if self.thumbnail_time.is_negative() {
            return Err(CaptureError::InvalidConfiguration(
                "thumbnail time must not be negative".into(),
            ));
        }
        if let Some(max) = self.max_duration_secs {
            if !(max > 0.0) {
                return Err(CaptureError::InvalidConfiguration(format!(
                    "max duration must be positive, got {max}"
                )));
            }
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(CaptureError::InvalidConfiguration("output path is empty".into()));
        }
        Ok(())
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let json = fs::read_to_string(path)
            .map_err(|e| CaptureError::InvalidConfiguration(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| CaptureError::InvalidConfiguration(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            preset: SessionPreset::Vga640x480,
            quality: CaptureQuality::Medium,
            video_width: 480,
            video_height: 640,
            audio_sample_rate: 44_100,
            audio_channels: 1,
            initial_camera: CameraPosition::Front,
            output_path: std::env::temp_dir().join("output.mcap"),
            thumbnail_time: TimeBase::new(1, 60),
            switch_policy: SwitchPolicy::IdleOnly,
            max_duration_secs: None,
        }
    }
}

/// Configuration for the playback controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfiguration {
    /// Restart from the beginning when the end is reached.
    #[serde(rename = "loop")]
    pub looping: bool,

    /// Start playing as soon as the file is loaded.
    pub autoplay: bool,

    /// How often position events are reported while playing.
    #[serde(with = "millis")]
    pub tick_interval: Duration,
}

impl Default for PlaybackConfiguration {
    fn default() -> Self {
        Self {
            looping: false,
            autoplay: false,
            tick_interval: Duration::from_millis(100),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = CaptureConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.preset.dimensions(), (640, 480));
        assert_eq!((config.video_width, config.video_height), (480, 640));
        assert_eq!(config.thumbnail_time, TimeBase::new(1, 60));
    }

    #[test]
    fn rejects_bad_channel_count() {
        let config = CaptureConfiguration {
            audio_channels: 6,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CaptureError::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_non_positive_max_duration() {
        let config = CaptureConfiguration {
            max_duration_secs: Some(0.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn quality_tiers_are_ordered() {
        assert!(CaptureQuality::Low.video_bitrate() < CaptureQuality::Medium.video_bitrate());
        assert!(CaptureQuality::Medium.video_bitrate() < CaptureQuality::High.video_bitrate());
    }

    #[test]
    fn loads_partial_json() {
        let path = std::env::temp_dir().join(format!("capture_config_{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, r#"{ "quality": "high", "initial_camera": "back" }"#).unwrap();

        let config = CaptureConfiguration::from_json_file(&path).unwrap();
        assert_eq!(config.quality, CaptureQuality::High);
        assert_eq!(config.initial_camera, CameraPosition::Back);
        assert_eq!(config.audio_sample_rate, 44_100);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn playback_defaults() {
        let config = PlaybackConfiguration::default();
        assert!(!config.looping);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
    }
}
