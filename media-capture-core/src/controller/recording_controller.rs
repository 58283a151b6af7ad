use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::dispatch::notifier::Notifier;
use crate::dispatch::serial_queue::Executor;
use crate::models::config::{CaptureConfiguration, SwitchPolicy};
use crate::models::device::CameraDevice;
use crate::models::error::CaptureError;
use crate::models::frame::{Frame, TrackKind};
use crate::models::recording_result::{ContainerSummary, RecordingMetadata, RecordingResult};
use crate::models::state::{CaptureSessionState, RecordingDiagnostics, RecordingState};
use crate::models::time::TimeBase;
use crate::session::capture_session::CaptureSession;
use crate::storage::container_reader::ContainerReader;
use crate::storage::container_writer::ContainerFileWriter;
use crate::storage::metadata;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::container_sink::ContainerSink;
use crate::traits::device_provider::DeviceProvider;
use crate::traits::frame_consumer::FrameConsumer;
use crate::writer::track_writer::{StopOutcome, TrackWriter, WriterEvents};

/// Opens the container a recording is written to.
pub type SinkFactory = Arc<dyn Fn(&Path) -> Result<Box<dyn ContainerSink>, CaptureError> + Send + Sync>;

/// Sink factory writing `.mcap` files with [`ContainerFileWriter`].
pub fn file_sink_factory() -> SinkFactory {
    Arc::new(|path: &Path| {
        let writer = ContainerFileWriter::create(path.to_path_buf())?;
        Ok(Box::new(writer) as Box<dyn ContainerSink>)
    })
}

struct ControllerInner {
    state: RecordingState,
    writer: Option<Arc<TrackWriter>>,
    video_frames_delivered: u64,
    audio_frames_delivered: u64,
    auto_stop_requested: bool,
}

struct ControllerShared {
    session: CaptureSession,
    config: CaptureConfiguration,
    notifier: Notifier,
    executor: Arc<dyn Executor>,
    sink_factory: SinkFactory,
    inner: Mutex<ControllerInner>,
}

/// Drives one recording: glues capture session output to a track writer
/// and reports progress to the delegate.
///
/// ```text
/// idle ──start──→ recording ──pause──→ paused
///                   ↑   ↓ ←──resume/start─┘ │
///                   │  stop                 stop
///                   │   ↓                   │
///                   └ finishing ←───────────┘ ──(finalized)──→ finished
/// any failure → failed ──configure──→ idle
/// ```
///
/// Every delegate call goes through the executor passed to [`new`]; nothing
/// reaches the delegate from the capture or writer thread.
///
/// [`new`]: RecordingController::new
pub struct RecordingController {
    shared: Arc<ControllerShared>,
}

impl RecordingController {
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        config: CaptureConfiguration,
        delegate: Arc<dyn CaptureDelegate>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, CaptureError> {
        Self::with_sink_factory(provider, config, delegate, executor, file_sink_factory())
    }

    /// Like [`RecordingController::new`], writing through `sink_factory`.
    pub fn with_sink_factory(
        provider: Arc<dyn DeviceProvider>,
        config: CaptureConfiguration,
        delegate: Arc<dyn CaptureDelegate>,
        executor: Arc<dyn Executor>,
        sink_factory: SinkFactory,
    ) -> Result<Self, CaptureError> {
        let notifier = Notifier::new(Some(delegate), Arc::clone(&executor));
        let session = CaptureSession::new(provider, config.clone(), notifier.clone())?;

        let shared = Arc::new(ControllerShared {
            session,
            config,
            notifier,
            executor,
            sink_factory,
            inner: Mutex::new(ControllerInner {
                state: RecordingState::Idle,
                writer: None,
                video_frames_delivered: 0,
                audio_frames_delivered: 0,
                auto_stop_requested: false,
            }),
        });

        shared.session.set_consumer(Arc::new(SessionBridge {
            controller: Arc::downgrade(&shared),
        }));

        Ok(Self { shared })
    }

    pub fn state(&self) -> RecordingState {
        self.shared.inner.lock().state
    }

    /// The session is configured and this controller can still record.
    pub fn ready(&self) -> bool {
        let state = self.state();
        self.shared.session.is_ready()
            && matches!(state, RecordingState::Idle | RecordingState::Recording | RecordingState::Paused)
    }

    pub fn session(&self) -> &CaptureSession {
        &self.shared.session
    }

    pub fn available_cameras(&self) -> Vec<CameraDevice> {
        self.shared.session.available_cameras()
    }

    /// Frame counters for the current (or last) recording.
    pub fn diagnostics(&self) -> RecordingDiagnostics {
        let (writer, video, audio) = {
            let inner = self.shared.inner.lock();
            (
                inner.writer.clone(),
                inner.video_frames_delivered,
                inner.audio_frames_delivered,
            )
        };
        let mut diagnostics = writer.map(|w| w.diagnostics()).unwrap_or_default();
        diagnostics.video_frames_delivered = video;
        diagnostics.audio_frames_delivered = audio;
        diagnostics
    }

    /// Configure the capture session and start its devices.
    ///
    /// Also the way out of `Failed`: the controller returns to `Idle` first.
    pub fn configure(&self) -> Result<(), CaptureError> {
        self.shared.configure()
    }

    /// Idle: begin a new recording. Paused: resume.
    pub fn start(&self) -> Result<(), CaptureError> {
        self.shared.start()
    }

    pub fn pause(&self) {
        self.shared.pause();
    }

    pub fn resume(&self) {
        self.shared.resume();
    }

    /// Finalize the recording. The `finished` event fires once the file is
    /// complete; further calls while finishing do nothing.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Toggle the active camera, subject to the configured switch policy.
    pub fn switch_camera(&self) -> Result<(), CaptureError> {
        let state = self.state();
        let allowed = match self.shared.config.switch_policy {
            SwitchPolicy::IdleOnly => !state.is_active() && state != RecordingState::Finishing,
            SwitchPolicy::WhileConfigured => state != RecordingState::Recording,
        };
        if !allowed {
            log::debug!("switch_camera ignored while {:?}", state);
            return Ok(());
        }
        self.shared.session.switch_camera()
    }
}

impl ControllerShared {
    fn configure(&self) -> Result<(), CaptureError> {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                RecordingState::Idle => {}
                RecordingState::Failed => {
                    inner.state = RecordingState::Idle;
                    inner.auto_stop_requested = false;
                    self.notifier.state_changed(RecordingState::Idle);
                }
                other => {
                    log::debug!("configure ignored while {:?}", other);
                    return Ok(());
                }
            }
        }

        // The session reports its own failures.
        let result = self.session.configure().and_then(|()| self.session.start());
        if let Err(e) = &result {
            log::warn!("recording controller not ready: {}", e);
            self.set_failed_silently();
        }
        result
    }

    fn start(self: &Arc<Self>) -> Result<(), CaptureError> {
        let state = self.state();
        match state {
            RecordingState::Idle => {}
            RecordingState::Paused => {
                self.resume();
                return Ok(());
            }
            other => {
                log::debug!("start ignored while {:?}", other);
                return Ok(());
            }
        }

        match self.session.state() {
            CaptureSessionState::Running => {}
            CaptureSessionState::Ready => {
                if let Err(e) = self.session.start() {
                    self.set_failed_silently();
                    return Err(e);
                }
            }
            other => {
                log::warn!("record requested while session is {:?}", other);
                let error = CaptureError::RecordBeforeReady;
                self.notifier.error(&error);
                return Err(error);
            }
        }

        let writer = match self.create_writer() {
            Ok(writer) => Arc::new(writer),
            Err(e) => {
                self.fail(e.clone());
                return Err(e);
            }
        };

        {
            let mut inner = self.inner.lock();
            if inner.state != RecordingState::Idle {
                return Ok(());
            }
            inner.state = RecordingState::Recording;
            inner.writer = Some(writer);
            inner.video_frames_delivered = 0;
            inner.audio_frames_delivered = 0;
            inner.auto_stop_requested = false;
        }
        log::info!("recording to {}", self.config.output_path.display());
        self.notifier.state_changed(RecordingState::Recording);
        self.session.set_forwarding(true);
        Ok(())
    }

    fn create_writer(self: &Arc<Self>) -> Result<TrackWriter, CaptureError> {
        let sink = (self.sink_factory)(&self.config.output_path)?;
        let events = Arc::new(WriterBridge {
            controller: Arc::downgrade(self),
        });
        TrackWriter::new(sink, &TrackWriter::track_settings(&self.config), events)
    }

    fn pause(&self) {
        if self.state() != RecordingState::Recording {
            log::debug!("pause ignored while {:?}", self.state());
            return;
        }
        // No frame reaches the writer after this returns.
        self.session.set_forwarding(false);
        self.pause_writer();
    }

    /// Mark the pause boundary on the writer, once forwarding is off.
    fn pause_writer(&self) {
        let writer = {
            let mut inner = self.inner.lock();
            if inner.state != RecordingState::Recording {
                return;
            }
            inner.state = RecordingState::Paused;
            inner.writer.clone()
        };
        if let Some(writer) = writer {
            writer.pause();
        }
        log::info!("recording paused");
        self.notifier.state_changed(RecordingState::Paused);
    }

    fn resume(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state != RecordingState::Paused {
                log::debug!("resume ignored while {:?}", inner.state);
                return;
            }
            inner.state = RecordingState::Recording;
        }
        log::info!("recording resumed");
        self.notifier.state_changed(RecordingState::Recording);
        self.session.set_forwarding(true);
    }

    fn stop(self: &Arc<Self>) {
        let writer = {
            let mut inner = self.inner.lock();
            if !inner.state.is_active() {
                log::debug!("stop ignored while {:?}", inner.state);
                return;
            }
            inner.state = RecordingState::Finishing;
            inner.writer.clone()
        };
        self.notifier.state_changed(RecordingState::Finishing);
        self.session.set_forwarding(false);

        let Some(writer) = writer else {
            self.fail(CaptureError::WriterRuntimeFailed("no writer for recording".into()));
            return;
        };

        let shared = Arc::clone(self);
        match writer.stop(move |result| shared.finalized(result)) {
            StopOutcome::Finalizing => log::info!("finalizing recording"),
            StopOutcome::NotWriting => {
                self.fail(CaptureError::WriterRuntimeFailed("no frames were recorded".into()));
            }
            // The writer already failed and reported it.
            StopOutcome::AlreadyStopped => {}
        }
    }

    /// Finalize callback; runs on the writer's finalize thread.
    fn finalized(&self, result: Result<ContainerSummary, CaptureError>) {
        let recording = result.and_then(|summary| self.read_back(&summary));
        match recording {
            Ok(recording) => {
                {
                    let mut inner = self.inner.lock();
                    if inner.state != RecordingState::Finishing {
                        return;
                    }
                    inner.state = RecordingState::Finished;
                }
                log::info!(
                    "recording finished: {} ({:.2}s)",
                    recording.file_path.display(),
                    recording.duration_secs()
                );
                self.notifier.state_changed(RecordingState::Finished);
                self.notifier.finished(recording);
            }
            Err(e) => self.fail(e),
        }
    }

    /// Duration and thumbnail come from the finalized file itself.
    fn read_back(&self, summary: &ContainerSummary) -> Result<RecordingResult, CaptureError> {
        let reader = ContainerReader::open(&summary.file_path)?;
        let duration = reader.duration();
        let thumbnail = reader.thumbnail(self.config.thumbnail_time)?;
        let metadata = RecordingMetadata::from_summary(summary, duration);
        metadata::write_metadata(&metadata, &summary.file_path)?;

        Ok(RecordingResult {
            file_path: summary.file_path.clone(),
            thumbnail,
            duration,
            metadata,
        })
    }

    fn on_frame(&self, frame: Frame) {
        let writer = {
            let mut inner = self.inner.lock();
            match frame.track() {
                TrackKind::Video => inner.video_frames_delivered += 1,
                TrackKind::Audio => inner.audio_frames_delivered += 1,
            }
            inner.writer.clone()
        };
        if let Some(writer) = writer {
            writer.write(frame);
        }
    }

    fn on_elapsed(self: &Arc<Self>, elapsed: TimeBase) {
        let seconds = elapsed.as_secs_f64();
        self.notifier.elapsed(seconds);

        let Some(max) = self.config.max_duration_secs else {
            return;
        };
        if seconds < max {
            return;
        }
        {
            let mut inner = self.inner.lock();
            if inner.auto_stop_requested || inner.state != RecordingState::Recording {
                return;
            }
            inner.auto_stop_requested = true;
        }
        log::info!("maximum duration of {}s reached, stopping", max);
        // Stopping waits on the capture queue, which is blocked on this
        // write; hand it to the executor.
        let shared = Arc::clone(self);
        self.executor.execute(Box::new(move || shared.stop()));
    }

    /// Writer failure; runs on the writer thread inside frame delivery.
    fn on_writer_error(&self, error: &CaptureError) {
        self.fail(error.clone());
    }

    /// Move to `Failed`, report `error` once and discard the partial file.
    fn fail(&self, error: CaptureError) {
        {
            let mut inner = self.inner.lock();
            if inner.state == RecordingState::Failed {
                return;
            }
            inner.state = RecordingState::Failed;
        }
        self.session.halt_forwarding();
        log::error!("recording failed: {}", error);
        self.notifier.state_changed(RecordingState::Failed);
        self.notifier.error(&error);
        self.discard_output();
    }

    /// Failure already reported by the session.
    fn set_failed_silently(&self) {
        let mut inner = self.inner.lock();
        if inner.state != RecordingState::Failed {
            inner.state = RecordingState::Failed;
            self.notifier.state_changed(RecordingState::Failed);
        }
    }

    fn discard_output(&self) {
        let path = &self.config.output_path;
        match fs::remove_file(path) {
            Ok(()) => log::info!("discarded partial recording {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("failed to discard {}: {}", path.display(), e),
        }
    }

    fn state(&self) -> RecordingState {
        self.inner.lock().state
    }
}

/// Session → controller. Holds the controller weakly; the session lives
/// inside it.
struct SessionBridge {
    controller: Weak<ControllerShared>,
}

impl FrameConsumer for SessionBridge {
    fn on_frame(&self, frame: Frame) {
        if let Some(controller) = self.controller.upgrade() {
            controller.on_frame(frame);
        }
    }

    fn on_capture_stopped(&self) {
        if let Some(controller) = self.controller.upgrade() {
            controller.pause_writer();
        }
    }
}

/// Writer → controller.
struct WriterBridge {
    controller: Weak<ControllerShared>,
}

impl WriterEvents for WriterBridge {
    fn on_elapsed(&self, elapsed: TimeBase) {
        if let Some(controller) = self.controller.upgrade() {
            controller.on_elapsed(elapsed);
        }
    }

    fn on_error(&self, error: &CaptureError) {
        if let Some(controller) = self.controller.upgrade() {
            controller.on_writer_error(error);
        }
    }
}
