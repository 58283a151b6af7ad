use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::frame::{Frame, TrackKind};
use crate::models::recording_result::ContainerSummary;
use crate::models::state::ContainerStatus;
use crate::models::time::TimeBase;
use crate::storage::container_format::{self, FileHeader, SampleHeader};
use crate::traits::container_sink::{ContainerSink, TrackSettings};

/// Streaming container file writer.
///
/// Creating the writer truncates any stale file at `file_path`. The header
/// and track descriptors are written by `start_writing`; `finish` patches
/// status and sample count, flushes, and checksums the completed file.
///
/// Not thread-safe on its own; the track writer owns it on its writer queue.
pub struct ContainerFileWriter {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    tracks: Vec<TrackSettings>,
    status: ContainerStatus,
    sample_count: u32,
    video_samples: u64,
    audio_samples: u64,
    total_bytes_written: u64,
}

impl ContainerFileWriter {
    /// Create (or overwrite) the output file.
    pub fn create(file_path: PathBuf) -> Result<Self, CaptureError> {
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| CaptureError::WriterInitFailed(format!("failed to create directory: {}", e)))?;
            }
        }

        let file = File::create(&file_path)
            .map_err(|e| CaptureError::WriterInitFailed(format!("failed to create {}: {}", file_path.display(), e)))?;

        Ok(Self {
            file_path,
            file: Some(BufWriter::new(file)),
            tracks: Vec::with_capacity(2),
            status: ContainerStatus::Unknown,
            sample_count: 0,
            video_samples: 0,
            audio_samples: 0,
            total_bytes_written: 0,
        })
    }

    /// Total bytes written so far (including header and descriptors).
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn has_track(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::WriterRuntimeFailed("file is not open".into()))?;
        file.write_all(data)
            .map_err(|e| CaptureError::WriterRuntimeFailed(format!("write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }

    fn fail<T>(&mut self, error: CaptureError) -> Result<T, CaptureError> {
        self.status = ContainerStatus::Failed;
        Err(error)
    }

    fn patch_header(&mut self) -> Result<(), CaptureError> {
        let sample_count = self.sample_count;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::WriterRuntimeFailed("file is not open".into()))?;
        let io = |e: std::io::Error| CaptureError::WriterRuntimeFailed(format!("finalize failed: {}", e));

        file.seek(SeekFrom::Start(container_format::STATUS_OFFSET)).map_err(io)?;
        file.write_all(&[container_format::STATUS_COMPLETED]).map_err(io)?;

        file.seek(SeekFrom::Start(container_format::SAMPLE_COUNT_OFFSET)).map_err(io)?;
        file.write_all(&sample_count.to_le_bytes()).map_err(io)?;

        file.seek(SeekFrom::End(0)).map_err(io)?;
        file.flush().map_err(io)?;
        file.get_ref().sync_all().map_err(io)?;
        Ok(())
    }
}

impl ContainerSink for ContainerFileWriter {
    fn status(&self) -> ContainerStatus {
        self.status
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn add_track(&mut self, settings: TrackSettings) -> Result<(), CaptureError> {
        if self.status != ContainerStatus::Unknown {
            return Err(CaptureError::WriterInitFailed(
                "tracks can only be added before writing starts".into(),
            ));
        }
        if self.has_track(settings.kind()) {
            return Err(CaptureError::WriterInitFailed(format!(
                "container already has a {} track",
                settings.kind()
            )));
        }
        self.tracks.push(settings);
        Ok(())
    }

    fn start_writing(&mut self, start_time: TimeBase) -> Result<(), CaptureError> {
        if self.status != ContainerStatus::Unknown {
            return Err(CaptureError::WriterRuntimeFailed(format!(
                "cannot start writing in {:?} status",
                self.status
            )));
        }

        let header = container_format::encode_file_header(&FileHeader {
            version: container_format::VERSION,
            track_count: self.tracks.len() as u16,
            status: container_format::STATUS_WRITING,
            start_time,
            sample_count: 0,
        });
        if let Err(e) = self.write_raw(&header) {
            return self.fail(e);
        }

        let descriptors: Vec<_> = self.tracks.iter().map(container_format::encode_track_descriptor).collect();
        for descriptor in descriptors {
            if let Err(e) = self.write_raw(&descriptor) {
                return self.fail(e);
            }
        }

        self.status = ContainerStatus::Writing;
        log::debug!("container {} started at {}", self.file_path.display(), start_time);
        Ok(())
    }

    fn is_ready_for_more(&self, track: TrackKind) -> bool {
        self.status != ContainerStatus::Failed && self.file.is_some() && self.has_track(track)
    }

    fn append(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        if self.status != ContainerStatus::Writing {
            return Err(CaptureError::WriterRuntimeFailed(format!(
                "cannot append in {:?} status",
                self.status
            )));
        }
        if !self.has_track(frame.track()) {
            return self.fail(CaptureError::WriterRuntimeFailed(format!(
                "container has no {} track",
                frame.track()
            )));
        }

        let payload_len = match u32::try_from(frame.payload().len()) {
            Ok(len) => len,
            Err(_) => return self.fail(CaptureError::WriterRuntimeFailed("sample payload too large".into())),
        };
        let header = container_format::encode_sample_header(&SampleHeader {
            track: frame.track(),
            presentation_time: frame.presentation_time(),
            duration: frame.duration(),
            payload_len,
        });

        if let Err(e) = self.write_raw(&header) {
            return self.fail(e);
        }
        if let Err(e) = self.write_raw(frame.payload()) {
            return self.fail(e);
        }

        self.sample_count += 1;
        match frame.track() {
            TrackKind::Video => self.video_samples += 1,
            TrackKind::Audio => self.audio_samples += 1,
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<ContainerSummary, CaptureError> {
        if self.status != ContainerStatus::Writing {
            return Err(CaptureError::WriterRuntimeFailed(format!(
                "cannot finish in {:?} status",
                self.status
            )));
        }

        if let Err(e) = self.patch_header() {
            self.status = ContainerStatus::Failed;
            return Err(e);
        }
        self.file = None;
        self.status = ContainerStatus::Completed;

        let checksum = sha256_file(&self.file_path)?;
        log::info!(
            "container {} finalized: {} samples, {} bytes",
            self.file_path.display(),
            self.sample_count,
            self.total_bytes_written
        );

        Ok(ContainerSummary {
            file_path: self.file_path.clone(),
            checksum,
            bytes_written: self.total_bytes_written,
            video_samples: self.video_samples,
            audio_samples: self.audio_samples,
        })
    }
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data = fs::read(path)
        .map_err(|e| CaptureError::WriterRuntimeFailed(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
