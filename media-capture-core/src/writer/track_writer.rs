use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::dispatch::serial_queue::SerialQueue;
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::frame::{Frame, TrackKind};
use crate::models::recording_result::ContainerSummary;
use crate::models::state::{ContainerStatus, RecordingDiagnostics, WriterTrackState};
use crate::models::time::TimeBase;
use crate::storage::container_writer::ContainerFileWriter;
use crate::traits::container_sink::{ContainerSink, TrackSettings};

use super::correction;

/// Receives writer notifications. Called on the writer thread with no
/// writer lock held.
pub trait WriterEvents: Send + Sync {
    /// Recorded time after an accepted audio frame, pauses excluded.
    fn on_elapsed(&self, elapsed: TimeBase);

    /// A write failed; the writer is now inert. Called once.
    fn on_error(&self, error: &CaptureError);
}

/// Finalization result callback. Invoked exactly once, off the writer thread.
pub type FinishCallback = Box<dyn FnOnce(Result<ContainerSummary, CaptureError>) + Send + 'static>;

/// Why a frame was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Writer failed, stopped, or never initialized.
    NotReady,
    /// The track signalled it cannot take more data right now.
    Backpressure,
}

/// What happened to one `write` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written {
        presentation_time: TimeBase,
        elapsed: Option<TimeBase>,
    },
    Dropped(DropReason),
    Failed(CaptureError),
}

/// Result of a `stop` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Finalization started; the callback will fire exactly once.
    Finalizing,
    /// Nothing was ever written, so there is no file to finalize. The
    /// writer is inert and the callback was dropped.
    NotWriting,
    /// A previous `stop` (or a failure) already ended this writer.
    AlreadyStopped,
}

/// Writer state proper. Single-threaded; always accessed under the lock
/// from the writer queue, or from the finalize thread once the sink has
/// been handed off.
struct WriterCore {
    sink: Option<Box<dyn ContainerSink>>,
    status: ContainerStatus,
    accepting: bool,
    start_time: Option<TimeBase>,
    video: WriterTrackState,
    audio: WriterTrackState,
    diagnostics: RecordingDiagnostics,
}

impl WriterCore {
    fn track_state(&self, track: TrackKind) -> WriterTrackState {
        match track {
            TrackKind::Video => self.video,
            TrackKind::Audio => self.audio,
        }
    }

    fn count_drop(&mut self, track: TrackKind) {
        match track {
            TrackKind::Video => self.diagnostics.video_frames_dropped += 1,
            TrackKind::Audio => self.diagnostics.audio_frames_dropped += 1,
        }
    }

    fn write(&mut self, frame: Frame) -> WriteOutcome {
        let track = frame.track();
        if !self.accepting {
            self.count_drop(track);
            return WriteOutcome::Dropped(DropReason::NotReady);
        }
        let Some(sink) = self.sink.as_mut() else {
            self.count_drop(track);
            return WriteOutcome::Dropped(DropReason::NotReady);
        };
        if !sink.is_ready_for_more(track) {
            log::debug!("{} track not ready for more data, dropping frame", track);
            self.count_drop(track);
            return WriteOutcome::Dropped(DropReason::Backpressure);
        }

        if self.status == ContainerStatus::Unknown {
            let start = frame.presentation_time();
            if let Err(e) = sink.start_writing(start) {
                return self.fail(e);
            }
            log::info!("writer started at {}", start);
            self.start_time = Some(start);
            self.status = ContainerStatus::Writing;
        }

        let duration = frame.duration();
        let (state, other) = match track {
            TrackKind::Video => (&mut self.video, &self.audio),
            TrackKind::Audio => (&mut self.audio, &self.video),
        };
        let corrected = correction::corrected_time(state, other, frame.presentation_time());
        let frame = frame.retimed(corrected);
        let payload_len = frame.payload().len() as u64;

        if let Err(e) = sink.append(&frame) {
            return self.fail(e);
        }

        let end = corrected + duration;
        state.last_presentation_time = Some(corrected);
        state.last_emitted_time = Some(end);

        self.diagnostics.bytes_written += payload_len;
        match track {
            TrackKind::Video => self.diagnostics.video_frames_written += 1,
            TrackKind::Audio => self.diagnostics.audio_frames_written += 1,
        }

        // Audio is continuous within a capture run, so it drives the clock.
        let elapsed = match (track, self.start_time) {
            (TrackKind::Audio, Some(start)) => Some(end - start),
            _ => None,
        };

        WriteOutcome::Written {
            presentation_time: corrected,
            elapsed,
        }
    }

    fn fail(&mut self, error: CaptureError) -> WriteOutcome {
        log::error!("writer failed: {}", error);
        self.status = ContainerStatus::Failed;
        self.accepting = false;
        // Close the partial file; the caller discards it.
        self.sink = None;
        let error = match error {
            CaptureError::WriterRuntimeFailed(_) => error,
            other => CaptureError::WriterRuntimeFailed(other.to_string()),
        };
        WriteOutcome::Failed(error)
    }

    fn pause(&mut self) {
        self.video.pending_correction_update = true;
        self.audio.pending_correction_update = true;
    }

    /// Hand the sink off for finalization, or explain why not.
    fn begin_finish(&mut self) -> Result<Box<dyn ContainerSink>, StopOutcome> {
        if !self.accepting {
            return Err(StopOutcome::AlreadyStopped);
        }
        self.accepting = false;

        if self.status != ContainerStatus::Writing {
            self.sink = None;
            return Err(StopOutcome::NotWriting);
        }
        self.sink.take().ok_or(StopOutcome::AlreadyStopped)
    }
}

/// Multiplexes video and audio frames into one container, removing
/// paused intervals from the timeline.
///
/// Owns its serial writer queue; `write`, `pause` and `stop` all run
/// there, one at a time. `write` is synchronous so a slow writer pushes
/// back on the caller instead of growing a queue.
pub struct TrackWriter {
    core: Arc<Mutex<WriterCore>>,
    queue: SerialQueue,
    events: Arc<dyn WriterEvents>,
    output_path: Option<PathBuf>,
}

impl TrackWriter {
    /// Bind a writer to `sink`, adding one track per entry of `tracks`.
    pub fn new(
        mut sink: Box<dyn ContainerSink>,
        tracks: &[TrackSettings],
        events: Arc<dyn WriterEvents>,
    ) -> Result<Self, CaptureError> {
        for settings in tracks {
            sink.add_track(*settings).map_err(|e| match e {
                CaptureError::WriterInitFailed(_) => e,
                other => CaptureError::WriterInitFailed(other.to_string()),
            })?;
        }

        let queue = SerialQueue::new("track-writer").map_err(|e| CaptureError::WriterInitFailed(e.to_string()))?;
        let status = sink.status();

        Ok(Self {
            core: Arc::new(Mutex::new(WriterCore {
                sink: Some(sink),
                status,
                accepting: true,
                start_time: None,
                video: WriterTrackState::new(),
                audio: WriterTrackState::new(),
                diagnostics: RecordingDiagnostics::default(),
            })),
            queue,
            events,
            output_path: None,
        })
    }

    /// Writer for a fresh container file at `path`, with the video and audio
    /// tracks described by `config`.
    pub fn create(
        path: PathBuf,
        config: &CaptureConfiguration,
        events: Arc<dyn WriterEvents>,
    ) -> Result<Self, CaptureError> {
        let sink = ContainerFileWriter::create(path.clone())?;
        let mut writer = Self::new(Box::new(sink), &Self::track_settings(config), events)?;
        writer.output_path = Some(path);
        Ok(writer)
    }

    /// Track layout for a configuration: one video, one audio.
    pub fn track_settings(config: &CaptureConfiguration) -> [TrackSettings; 2] {
        [
            TrackSettings::Video {
                width: config.video_width,
                height: config.video_height,
                bitrate: config.quality.video_bitrate(),
            },
            TrackSettings::Audio {
                sample_rate: config.audio_sample_rate,
                channels: config.audio_channels,
            },
        ]
    }

    /// Path of the output file, when created with [`TrackWriter::create`].
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output_path.as_ref()
    }

    /// Write one frame. Blocks until the writer has appended or dropped it.
    pub fn write(&self, frame: Frame) -> WriteOutcome {
        let core = Arc::clone(&self.core);
        let events = Arc::clone(&self.events);
        self.queue.sync(move || {
            let outcome = core.lock().write(frame);
            match &outcome {
                WriteOutcome::Written {
                    elapsed: Some(elapsed), ..
                } => events.on_elapsed(*elapsed),
                WriteOutcome::Failed(error) => events.on_error(error),
                _ => {}
            }
            outcome
        })
    }

    /// Mark a pause boundary. The correction is recomputed lazily, per track,
    /// on that track's next frame.
    pub fn pause(&self) {
        let core = Arc::clone(&self.core);
        self.queue.sync(move || core.lock().pause());
    }

    /// Finalize the container.
    ///
    /// Returns immediately; `on_finished` fires exactly once from a
    /// finalize thread when the file is complete (or failed). Later calls
    /// return [`StopOutcome::AlreadyStopped`] and drop their callback.
    pub fn stop<F>(&self, on_finished: F) -> StopOutcome
    where
        F: FnOnce(Result<ContainerSummary, CaptureError>) + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        let on_finished: FinishCallback = Box::new(on_finished);
        self.queue.sync(move || {
            let sink = match core.lock().begin_finish() {
                Ok(sink) => sink,
                Err(outcome) => {
                    log::debug!("writer stop ignored: {:?}", outcome);
                    return outcome;
                }
            };
            spawn_finalize(core, sink, on_finished);
            StopOutcome::Finalizing
        })
    }

    /// Block until every call submitted so far has been processed.
    pub fn flush(&self) {
        self.queue.flush();
    }

    /// Whether `write` would currently consider frames.
    pub fn is_ready(&self) -> bool {
        let core = self.core.lock();
        core.accepting && core.sink.is_some()
    }

    pub fn container_status(&self) -> ContainerStatus {
        self.core.lock().status
    }

    /// Tracks on the underlying sink; zero once the sink was handed off.
    pub fn track_count(&self) -> usize {
        self.core.lock().sink.as_ref().map(|s| s.track_count()).unwrap_or(0)
    }

    /// Source time anchored by the first written frame.
    pub fn start_time(&self) -> Option<TimeBase> {
        self.core.lock().start_time
    }

    pub fn track_state(&self, track: TrackKind) -> WriterTrackState {
        self.core.lock().track_state(track)
    }

    pub fn diagnostics(&self) -> RecordingDiagnostics {
        self.core.lock().diagnostics.clone()
    }
}

/// Run `sink.finish()` on its own thread and report through `on_finished`.
///
/// If the thread cannot be spawned the work runs on the caller instead, so
/// the callback still fires exactly once.
fn spawn_finalize(core: Arc<Mutex<WriterCore>>, sink: Box<dyn ContainerSink>, on_finished: FinishCallback) {
    type Job = Box<dyn FnOnce() + Send>;

    let job: Job = Box::new(move || {
        let result = sink.finish();
        core.lock().status = match result {
            Ok(_) => ContainerStatus::Completed,
            Err(_) => ContainerStatus::Failed,
        };
        match &result {
            Ok(summary) => log::info!("writer finalized {}", summary.file_path.display()),
            Err(e) => log::error!("writer finalize failed: {}", e),
        }
        on_finished(result);
    });

    let slot = Arc::new(Mutex::new(Some(job)));
    let thread_slot = Arc::clone(&slot);
    let spawned = thread::Builder::new().name("container-finalize".into()).spawn(move || {
        if let Some(job) = thread_slot.lock().take() {
            job();
        }
    });

    if let Err(e) = spawned {
        log::warn!("failed to spawn finalize thread ({}), finalizing inline", e);
        if let Some(job) = slot.lock().take() {
            job();
        }
    }
}
