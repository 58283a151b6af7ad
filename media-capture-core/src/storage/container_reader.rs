use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::frame::TrackKind;
use crate::models::recording_result::Thumbnail;
use crate::models::time::TimeBase;
use crate::storage::container_format::{self, FILE_HEADER_SIZE, SAMPLE_HEADER_SIZE, TRACK_DESCRIPTOR_SIZE};
use crate::traits::container_sink::TrackSettings;

/// Index entry for one sample in a finalized container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    pub track: TrackKind,
    pub presentation_time: TimeBase,
    pub duration: TimeBase,
    /// Byte offset of the payload.
    pub offset: u64,
    pub len: u32,
}

impl SampleEntry {
    pub fn end_time(&self) -> TimeBase {
        self.presentation_time + self.duration
    }
}

/// Reads back a finalized container: duration, thumbnail, sample index.
///
/// Opening indexes every sample header; payloads are read on demand.
#[derive(Debug, Clone)]
pub struct ContainerReader {
    path: PathBuf,
    start_time: TimeBase,
    tracks: Vec<TrackSettings>,
    samples: Vec<SampleEntry>,
}

impl ContainerReader {
    /// Open and index a container. Files that were never finalized are rejected.
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let file = File::open(path)
            .map_err(|e| CaptureError::Storage(format!("failed to open {}: {}", path.display(), e)))?;
        let file_len = file
            .metadata()
            .map_err(|e| CaptureError::Storage(format!("failed to stat {}: {}", path.display(), e)))?
            .len();
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; FILE_HEADER_SIZE];
        read_exact(&mut reader, &mut header_bytes)?;
        let header = container_format::decode_file_header(&header_bytes)?;
        if header.status != container_format::STATUS_COMPLETED {
            return Err(CaptureError::Storage(format!(
                "{} was not finalized",
                path.display()
            )));
        }

        let mut tracks = Vec::with_capacity(header.track_count as usize);
        for _ in 0..header.track_count {
            let mut bytes = [0u8; TRACK_DESCRIPTOR_SIZE];
            read_exact(&mut reader, &mut bytes)?;
            tracks.push(container_format::decode_track_descriptor(&bytes)?);
        }

        let mut offset = (FILE_HEADER_SIZE + TRACK_DESCRIPTOR_SIZE * tracks.len()) as u64;
        // The count comes from disk; never reserve more than the file can hold.
        let room = file_len.saturating_sub(offset) / SAMPLE_HEADER_SIZE as u64;
        let mut samples = Vec::with_capacity(u64::from(header.sample_count).min(room) as usize);
        for _ in 0..header.sample_count {
            let mut bytes = [0u8; SAMPLE_HEADER_SIZE];
            read_exact(&mut reader, &mut bytes)?;
            let sample = container_format::decode_sample_header(&bytes)?;
            offset += SAMPLE_HEADER_SIZE as u64;

            if offset + sample.payload_len as u64 > file_len {
                return Err(CaptureError::Storage("sample payload runs past end of file".into()));
            }
            samples.push(SampleEntry {
                track: sample.track,
                presentation_time: sample.presentation_time,
                duration: sample.duration,
                offset,
                len: sample.payload_len,
            });

            reader
                .seek(SeekFrom::Current(sample.payload_len as i64))
                .map_err(|e| CaptureError::Storage(format!("seek failed: {}", e)))?;
            offset += sample.payload_len as u64;
        }

        Ok(Self {
            path: path.to_path_buf(),
            start_time: header.start_time,
            tracks,
            samples,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source time that maps to zero in the output.
    pub fn start_time(&self) -> TimeBase {
        self.start_time
    }

    pub fn tracks(&self) -> &[TrackSettings] {
        &self.tracks
    }

    pub fn samples(&self) -> &[SampleEntry] {
        &self.samples
    }

    pub fn samples_for(&self, track: TrackKind) -> impl Iterator<Item = &SampleEntry> {
        self.samples.iter().filter(move |s| s.track == track)
    }

    /// Latest track end minus the start time.
    pub fn duration(&self) -> TimeBase {
        self.samples
            .iter()
            .map(SampleEntry::end_time)
            .max()
            .map(|end| (end - self.start_time).max(TimeBase::ZERO))
            .unwrap_or(TimeBase::ZERO)
    }

    /// Duration of a single track, measured from the file start.
    pub fn track_duration(&self, track: TrackKind) -> TimeBase {
        self.samples_for(track)
            .map(SampleEntry::end_time)
            .max()
            .map(|end| (end - self.start_time).max(TimeBase::ZERO))
            .unwrap_or(TimeBase::ZERO)
    }

    pub fn read_payload(&self, sample: &SampleEntry) -> Result<Vec<u8>, CaptureError> {
        let mut file = File::open(&self.path)
            .map_err(|e| CaptureError::Storage(format!("failed to open {}: {}", self.path.display(), e)))?;
        file.seek(SeekFrom::Start(sample.offset))
            .map_err(|e| CaptureError::Storage(format!("seek failed: {}", e)))?;
        let mut payload = vec![0u8; sample.len as usize];
        read_exact(&mut file, &mut payload)?;
        Ok(payload)
    }

    /// The video sample closest to `offset` from the start of the file.
    ///
    /// Returns `None` when the file has no video samples.
    pub fn thumbnail(&self, offset: TimeBase) -> Result<Option<Thumbnail>, CaptureError> {
        let target = self.start_time + offset;
        let nearest = self.samples_for(TrackKind::Video).min_by(|a, b| {
            distance(a.presentation_time, target)
                .cmp(&distance(b.presentation_time, target))
                .then(a.presentation_time.cmp(&b.presentation_time))
        });
        let Some(sample) = nearest.copied() else {
            return Ok(None);
        };

        let (width, height) = self
            .tracks
            .iter()
            .find_map(|t| match *t {
                TrackSettings::Video { width, height, .. } => Some((width, height)),
                TrackSettings::Audio { .. } => None,
            })
            .unwrap_or((0, 0));

        Ok(Some(Thumbnail {
            time: sample.presentation_time - self.start_time,
            width,
            height,
            data: self.read_payload(&sample)?,
        }))
    }
}

fn distance(a: TimeBase, b: TimeBase) -> TimeBase {
    if a > b {
        a - b
    } else {
        b - a
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), CaptureError> {
    reader
        .read_exact(buf)
        .map_err(|e| CaptureError::Storage(format!("container truncated: {}", e)))
}
