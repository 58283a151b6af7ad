//! On-disk layout of the recording container.
//!
//! ```text
//! [32-byte file header]
//! [16-byte track descriptor] × track_count
//! [40-byte sample header | payload] × sample_count
//! ```
//!
//! All integers are little-endian. The header is written with status
//! `writing` and a zero sample count; both are patched on finalize.

use crate::models::error::CaptureError;
use crate::models::frame::TrackKind;
use crate::models::time::TimeBase;
use crate::traits::container_sink::TrackSettings;

pub const MAGIC: &[u8; 4] = b"MCAP";
pub const VERSION: u16 = 2;

pub const FILE_HEADER_SIZE: usize = 32;
pub const TRACK_DESCRIPTOR_SIZE: usize = 16;
pub const SAMPLE_HEADER_SIZE: usize = 40;

/// Byte offset of the status field.
pub const STATUS_OFFSET: u64 = 8;
/// Byte offset of the sample-count field.
pub const SAMPLE_COUNT_OFFSET: u64 = 12;

pub const STATUS_WRITING: u8 = 0;
pub const STATUS_COMPLETED: u8 = 1;

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub track_count: u16,
    pub status: u8,
    pub start_time: TimeBase,
    pub sample_count: u32,
}

/// Parsed sample header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleHeader {
    pub track: TrackKind,
    pub presentation_time: TimeBase,
    pub duration: TimeBase,
    pub payload_len: u32,
}

/// Layout:
/// ```text
/// [0-3]    "MCAP"
/// [4-5]    version
/// [6-7]    track count
/// [8]      status (0 = writing, 1 = completed)
/// [9-11]   reserved
/// [12-15]  sample count
/// [16-23]  start time value (i64)
/// [24-31]  start time timescale (u64)
/// ```
pub fn encode_file_header(header: &FileHeader) -> [u8; FILE_HEADER_SIZE] {
    let mut out = [0u8; FILE_HEADER_SIZE];
    out[0..4].copy_from_slice(MAGIC);
    out[4..6].copy_from_slice(&header.version.to_le_bytes());
    out[6..8].copy_from_slice(&header.track_count.to_le_bytes());
    out[8] = header.status;
    out[12..16].copy_from_slice(&header.sample_count.to_le_bytes());
    out[16..24].copy_from_slice(&header.start_time.value().to_le_bytes());
    out[24..32].copy_from_slice(&header.start_time.timescale().to_le_bytes());
    out
}

pub fn decode_file_header(bytes: &[u8]) -> Result<FileHeader, CaptureError> {
    if bytes.len() < FILE_HEADER_SIZE {
        return Err(CaptureError::Storage("truncated file header".into()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(CaptureError::Storage("not a recording container".into()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(CaptureError::Storage(format!("unsupported container version {version}")));
    }
    Ok(FileHeader {
        version,
        track_count: u16::from_le_bytes([bytes[6], bytes[7]]),
        status: bytes[8],
        start_time: decode_time(&bytes[16..32])?,
        sample_count: read_u32(&bytes[12..16]),
    })
}

/// Layout:
/// ```text
/// [0]      track kind
/// [1-3]    reserved
/// [4-7]    width | sample rate
/// [8-11]   height | channels
/// [12-15]  bitrate (video only)
/// ```
pub fn encode_track_descriptor(settings: &TrackSettings) -> [u8; TRACK_DESCRIPTOR_SIZE] {
    let mut out = [0u8; TRACK_DESCRIPTOR_SIZE];
    out[0] = settings.kind().as_u8();
    let (a, b, c) = match *settings {
        TrackSettings::Video { width, height, bitrate } => (width, height, bitrate),
        TrackSettings::Audio { sample_rate, channels } => (sample_rate, channels as u32, 0),
    };
    out[4..8].copy_from_slice(&a.to_le_bytes());
    out[8..12].copy_from_slice(&b.to_le_bytes());
    out[12..16].copy_from_slice(&c.to_le_bytes());
    out
}

pub fn decode_track_descriptor(bytes: &[u8]) -> Result<TrackSettings, CaptureError> {
    if bytes.len() < TRACK_DESCRIPTOR_SIZE {
        return Err(CaptureError::Storage("truncated track descriptor".into()));
    }
    let kind = TrackKind::from_u8(bytes[0])
        .ok_or_else(|| CaptureError::Storage(format!("unknown track kind {}", bytes[0])))?;
    let a = read_u32(&bytes[4..8]);
    let b = read_u32(&bytes[8..12]);
    let c = read_u32(&bytes[12..16]);
    Ok(match kind {
        TrackKind::Video => TrackSettings::Video {
            width: a,
            height: b,
            bitrate: c,
        },
        TrackKind::Audio => TrackSettings::Audio {
            sample_rate: a,
            channels: b as u16,
        },
    })
}

/// Layout:
/// ```text
/// [0]      track kind
/// [1-3]    reserved
/// [4-7]    payload length
/// [8-15]   presentation time value (i64)
/// [16-23]  presentation time timescale (u64)
/// [24-31]  duration value (i64)
/// [32-39]  duration timescale (u64)
/// ```
pub fn encode_sample_header(header: &SampleHeader) -> [u8; SAMPLE_HEADER_SIZE] {
    let mut out = [0u8; SAMPLE_HEADER_SIZE];
    out[0] = header.track.as_u8();
    out[4..8].copy_from_slice(&header.payload_len.to_le_bytes());
    out[8..16].copy_from_slice(&header.presentation_time.value().to_le_bytes());
    out[16..24].copy_from_slice(&header.presentation_time.timescale().to_le_bytes());
    out[24..32].copy_from_slice(&header.duration.value().to_le_bytes());
    out[32..40].copy_from_slice(&header.duration.timescale().to_le_bytes());
    out
}

pub fn decode_sample_header(bytes: &[u8]) -> Result<SampleHeader, CaptureError> {
    if bytes.len() < SAMPLE_HEADER_SIZE {
        return Err(CaptureError::Storage("truncated sample header".into()));
    }
    let track = TrackKind::from_u8(bytes[0])
        .ok_or_else(|| CaptureError::Storage(format!("unknown track kind {}", bytes[0])))?;
    Ok(SampleHeader {
        track,
        presentation_time: decode_time(&bytes[8..24])?,
        duration: decode_time(&bytes[24..40])?,
        payload_len: read_u32(&bytes[4..8]),
    })
}

/// Value (`i64`) followed by timescale (`u64`).
fn decode_time(bytes: &[u8]) -> Result<TimeBase, CaptureError> {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[0..8]);
    let value = i64::from_le_bytes(word);
    word.copy_from_slice(&bytes[8..16]);
    let timescale = u64::from_le_bytes(word);
    if timescale == 0 {
        return Err(CaptureError::Storage("zero timescale in container".into()));
    }
    Ok(TimeBase::new(value, timescale))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_layout() {
        let header = FileHeader {
            version: VERSION,
            track_count: 2,
            status: STATUS_WRITING,
            start_time: TimeBase::new(7, 600),
            sample_count: 0,
        };
        let bytes = encode_file_header(&header);
        assert_eq!(bytes.len(), FILE_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"MCAP");
        assert_eq!(bytes[STATUS_OFFSET as usize], STATUS_WRITING);
        assert_eq!(decode_file_header(&bytes).unwrap(), header);
    }

    #[test]
    fn rejects_foreign_files() {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[0..4].copy_from_slice(b"RIFF");
        assert!(matches!(decode_file_header(&bytes), Err(CaptureError::Storage(_))));
        assert!(decode_file_header(&bytes[..10]).is_err());
    }

    #[test]
    fn track_descriptors_keep_settings() {
        let video = TrackSettings::Video {
            width: 480,
            height: 640,
            bitrate: 1_000_000,
        };
        let audio = TrackSettings::Audio {
            sample_rate: 44_100,
            channels: 1,
        };
        assert_eq!(decode_track_descriptor(&encode_track_descriptor(&video)).unwrap(), video);
        assert_eq!(decode_track_descriptor(&encode_track_descriptor(&audio)).unwrap(), audio);
    }

    #[test]
    fn sample_header_preserves_exact_times() {
        let header = SampleHeader {
            track: TrackKind::Audio,
            presentation_time: TimeBase::new(1024 * 3, 44_100),
            duration: TimeBase::new(1024, 44_100),
            payload_len: 2048,
        };
        let bytes = encode_sample_header(&header);
        assert_eq!(bytes[0], TrackKind::Audio.as_u8());
        assert_eq!(decode_sample_header(&bytes).unwrap(), header);
    }

    #[test]
    fn wide_timescales_survive_the_header() {
        // Sum of a nanosecond stamp and an audio sample period.
        let at = TimeBase::from_nanos(1) + TimeBase::new(1, 44_100);
        assert!(at.timescale() > u32::MAX as u64);
        let header = SampleHeader {
            track: TrackKind::Video,
            presentation_time: at,
            duration: TimeBase::new(1, 30),
            payload_len: 7,
        };
        let decoded = decode_sample_header(&encode_sample_header(&header)).unwrap();
        assert_eq!(decoded.presentation_time.value(), at.value());
        assert_eq!(decoded.presentation_time.timescale(), at.timescale());

        let file = FileHeader {
            version: VERSION,
            track_count: 2,
            status: STATUS_COMPLETED,
            start_time: at,
            sample_count: 3,
        };
        let bytes = encode_file_header(&file);
        assert_eq!(read_u32(&bytes[SAMPLE_COUNT_OFFSET as usize..]), 3);
        assert_eq!(decode_file_header(&bytes).unwrap(), file);
    }

    #[test]
    fn zero_timescale_is_corrupt() {
        let mut bytes = encode_sample_header(&SampleHeader {
            track: TrackKind::Video,
            presentation_time: TimeBase::from_seconds(1),
            duration: TimeBase::new(1, 30),
            payload_len: 0,
        });
        bytes[16..24].copy_from_slice(&0u64.to_le_bytes());
        assert!(decode_sample_header(&bytes).is_err());
    }
}
