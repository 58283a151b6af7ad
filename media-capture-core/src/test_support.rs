//! Test doubles shared by the unit tests: an in-memory container sink,
//! scripted devices the test drives by hand, and event logs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::dispatch::serial_queue::{Executor, Job, SerialQueue};
use crate::models::device::{AuthorizationStatus, CameraDevice, CameraPosition, DeviceInfo, DeviceKind};
use crate::models::error::CaptureError;
use crate::models::frame::{Frame, TrackKind};
use crate::models::recording_result::{ContainerSummary, RecordingResult};
use crate::models::state::{ContainerStatus, RecordingState};
use crate::models::time::TimeBase;
use crate::traits::capture_delegate::{CaptureDelegate, PlaybackDelegate};
use crate::traits::container_sink::{ContainerSink, TrackSettings};
use crate::traits::device_provider::{DeviceInput, DeviceProvider, FrameCallback};
use crate::traits::frame_consumer::FrameConsumer;
use crate::writer::track_writer::WriterEvents;

/// Poll `cond` until it holds, panicking after five seconds.
pub(crate) fn wait_for<F: FnMut() -> bool>(mut cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        thread::sleep(Duration::from_millis(2));
    }
}

pub(crate) fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("media_capture_{}_{}", uuid::Uuid::new_v4(), name))
}

// ---------------------------------------------------------------------------
// Container sink
// ---------------------------------------------------------------------------

struct SinkShared {
    status: ContainerStatus,
    tracks: Vec<TrackSettings>,
    start_time: Option<TimeBase>,
    frames: Vec<Frame>,
    ready: HashMap<TrackKind, bool>,
    fail_append_after: Option<usize>,
    fail_finish: bool,
    finish_count: usize,
}

/// Container sink that keeps appended frames in memory.
pub(crate) struct MemorySink {
    shared: Arc<Mutex<SinkShared>>,
}

/// Inspects and steers a [`MemorySink`] after it was boxed away.
#[derive(Clone)]
pub(crate) struct SinkProbe {
    shared: Arc<Mutex<SinkShared>>,
}

impl MemorySink {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(SinkShared {
                status: ContainerStatus::Unknown,
                tracks: Vec::new(),
                start_time: None,
                frames: Vec::new(),
                ready: HashMap::new(),
                fail_append_after: None,
                fail_finish: false,
                finish_count: 0,
            })),
        }
    }

    pub(crate) fn probe(&self) -> SinkProbe {
        SinkProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl SinkProbe {
    pub(crate) fn start_time(&self) -> Option<TimeBase> {
        self.shared.lock().start_time
    }

    pub(crate) fn times(&self, track: TrackKind) -> Vec<TimeBase> {
        self.shared
            .lock()
            .frames
            .iter()
            .filter(|f| f.track() == track)
            .map(|f| f.presentation_time())
            .collect()
    }

    pub(crate) fn set_ready_for_more(&self, track: TrackKind, ready: bool) {
        self.shared.lock().ready.insert(track, ready);
    }

    /// Let `n` appends succeed, then fail every later one.
    pub(crate) fn fail_append_after(&self, n: usize) {
        self.shared.lock().fail_append_after = Some(n);
    }

    pub(crate) fn fail_finish(&self) {
        self.shared.lock().fail_finish = true;
    }

    pub(crate) fn finish_count(&self) -> usize {
        self.shared.lock().finish_count
    }
}

impl ContainerSink for MemorySink {
    fn status(&self) -> ContainerStatus {
        self.shared.lock().status
    }

    fn track_count(&self) -> usize {
        self.shared.lock().tracks.len()
    }

    fn add_track(&mut self, settings: TrackSettings) -> Result<(), CaptureError> {
        let mut s = self.shared.lock();
        if s.status != ContainerStatus::Unknown {
            return Err(CaptureError::WriterInitFailed("writing already started".into()));
        }
        s.tracks.push(settings);
        Ok(())
    }

    fn start_writing(&mut self, start_time: TimeBase) -> Result<(), CaptureError> {
        let mut s = self.shared.lock();
        s.status = ContainerStatus::Writing;
        s.start_time = Some(start_time);
        Ok(())
    }

    fn is_ready_for_more(&self, track: TrackKind) -> bool {
        self.shared.lock().ready.get(&track).copied().unwrap_or(true)
    }

    fn append(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        let mut s = self.shared.lock();
        if let Some(limit) = s.fail_append_after {
            if s.frames.len() >= limit {
                s.status = ContainerStatus::Failed;
                return Err(CaptureError::WriterRuntimeFailed("disk full".into()));
            }
        }
        s.frames.push(frame.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<ContainerSummary, CaptureError> {
        let mut s = self.shared.lock();
        s.finish_count += 1;
        if s.fail_finish {
            s.status = ContainerStatus::Failed;
            return Err(CaptureError::Storage("finalize failed".into()));
        }
        s.status = ContainerStatus::Completed;
        let count = |track| s.frames.iter().filter(|f| f.track() == track).count() as u64;
        Ok(ContainerSummary {
            file_path: PathBuf::from("memory.mcap"),
            checksum: String::new(),
            bytes_written: s.frames.iter().map(|f| f.payload().len() as u64).sum(),
            video_samples: count(TrackKind::Video),
            audio_samples: count(TrackKind::Audio),
        })
    }
}

/// Collects writer notifications.
#[derive(Default)]
pub(crate) struct WriterEventLog {
    elapsed: Mutex<Vec<TimeBase>>,
    errors: Mutex<Vec<CaptureError>>,
}

impl WriterEventLog {
    pub(crate) fn elapsed(&self) -> Vec<TimeBase> {
        self.elapsed.lock().clone()
    }

    pub(crate) fn errors(&self) -> Vec<CaptureError> {
        self.errors.lock().clone()
    }
}

impl WriterEvents for WriterEventLog {
    fn on_elapsed(&self, elapsed: TimeBase) {
        self.elapsed.lock().push(elapsed);
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InputSlot {
    callback: Option<FrameCallback>,
    stopped: usize,
}

/// Handle through which a test delivers frames from a [`ManualInput`].
#[derive(Clone)]
pub(crate) struct InputHandle {
    info: DeviceInfo,
    slot: Arc<Mutex<InputSlot>>,
}

impl InputHandle {
    /// Deliver `frame` as the device thread would. Returns `false` when the
    /// input is not started.
    pub(crate) fn push(&self, frame: Frame) -> bool {
        let callback = self.slot.lock().callback.clone();
        match callback {
            Some(callback) => {
                callback(frame);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.slot.lock().callback.is_some()
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.slot.lock().stopped
    }

    pub(crate) fn id(&self) -> &str {
        &self.info.id
    }
}

/// Device input that only delivers what the test pushes.
pub(crate) struct ManualInput {
    info: DeviceInfo,
    slot: Arc<Mutex<InputSlot>>,
    fail_start: bool,
}

impl DeviceInput for ManualInput {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::DeviceUnavailable(self.info.name.clone()));
        }
        let mut slot = self.slot.lock();
        slot.callback = Some(callback);
        Ok(())
    }

    fn stop(&mut self) {
        let mut slot = self.slot.lock();
        slot.callback = None;
        slot.stopped += 1;
    }
}

struct ProviderScript {
    authorization: HashMap<DeviceKind, AuthorizationStatus>,
    cameras: Vec<CameraDevice>,
    failing_cameras: Vec<String>,
    microphone_missing: bool,
    opened: Vec<InputHandle>,
    open_count: usize,
}

/// Device provider whose devices and permissions are set up by the test.
#[derive(Clone)]
pub(crate) struct ScriptedProvider {
    script: Arc<Mutex<ProviderScript>>,
}

impl ScriptedProvider {
    /// Front and back camera, microphone, everything authorized.
    pub(crate) fn new() -> Self {
        Self::with_cameras(&[CameraPosition::Front, CameraPosition::Back])
    }

    pub(crate) fn with_cameras(positions: &[CameraPosition]) -> Self {
        let cameras = positions
            .iter()
            .map(|p| CameraDevice {
                id: format!("camera-{}", p),
                name: format!("{} camera", p),
                position: *p,
            })
            .collect();
        Self {
            script: Arc::new(Mutex::new(ProviderScript {
                authorization: HashMap::new(),
                cameras,
                failing_cameras: Vec::new(),
                microphone_missing: false,
                opened: Vec::new(),
                open_count: 0,
            })),
        }
    }

    pub(crate) fn deny(&self, kind: DeviceKind) {
        self.script.lock().authorization.insert(kind, AuthorizationStatus::Denied);
    }

    pub(crate) fn fail_camera(&self, position: CameraPosition) {
        self.script.lock().failing_cameras.push(format!("camera-{}", position));
    }

    pub(crate) fn remove_microphone(&self) {
        self.script.lock().microphone_missing = true;
    }

    /// How many inputs have been opened so far.
    pub(crate) fn open_count(&self) -> usize {
        self.script.lock().open_count
    }

    /// Most recently opened input whose id starts with `prefix`.
    pub(crate) fn input(&self, prefix: &str) -> InputHandle {
        self.script
            .lock()
            .opened
            .iter()
            .rev()
            .find(|h| h.id().starts_with(prefix))
            .cloned()
            .unwrap_or_else(|| panic!("no input opened for {prefix}"))
    }

    pub(crate) fn camera(&self) -> InputHandle {
        self.input("camera")
    }

    pub(crate) fn microphone(&self) -> InputHandle {
        self.input("microphone")
    }

    fn open(&self, info: DeviceInfo, fail_start: bool) -> Box<dyn DeviceInput> {
        let slot = Arc::new(Mutex::new(InputSlot::default()));
        let mut script = self.script.lock();
        script.open_count += 1;
        script.opened.push(InputHandle {
            info: info.clone(),
            slot: Arc::clone(&slot),
        });
        Box::new(ManualInput { info, slot, fail_start })
    }
}

impl DeviceProvider for ScriptedProvider {
    fn authorization(&self, kind: DeviceKind) -> AuthorizationStatus {
        self.script
            .lock()
            .authorization
            .get(&kind)
            .copied()
            .unwrap_or(AuthorizationStatus::Authorized)
    }

    fn cameras(&self) -> Vec<CameraDevice> {
        self.script.lock().cameras.clone()
    }

    fn open_camera(&self, camera: &CameraDevice) -> Result<Box<dyn DeviceInput>, CaptureError> {
        if self.script.lock().failing_cameras.contains(&camera.id) {
            return Err(CaptureError::DeviceConfigurationFailed(format!("cannot open {}", camera.name)));
        }
        let info = DeviceInfo {
            id: camera.id.clone(),
            name: camera.name.clone(),
            kind: DeviceKind::Camera,
        };
        Ok(self.open(info, false))
    }

    fn open_microphone(&self) -> Result<Box<dyn DeviceInput>, CaptureError> {
        if self.script.lock().microphone_missing {
            return Err(CaptureError::DeviceUnavailable("microphone".into()));
        }
        let info = DeviceInfo {
            id: "microphone-default".into(),
            name: "Built-in microphone".into(),
            kind: DeviceKind::Microphone,
        };
        Ok(self.open(info, false))
    }
}

/// Frame consumer that keeps what it receives and checks that deliveries
/// never overlap.
#[derive(Default)]
pub(crate) struct CollectingConsumer {
    frames: Mutex<Vec<Frame>>,
    threads: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    stopped: AtomicUsize,
}

impl CollectingConsumer {
    /// Consumer that sleeps for `delay` inside every delivery.
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub(crate) fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }

    /// Distinct names of the threads deliveries ran on.
    pub(crate) fn threads(&self) -> Vec<String> {
        self.threads.lock().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn stopped_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl FrameConsumer for CollectingConsumer {
    fn on_frame(&self, frame: Frame) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let name = thread::current().name().unwrap_or("<unnamed>").to_string();
        {
            let mut threads = self.threads.lock();
            if !threads.contains(&name) {
                threads.push(name);
            }
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.frames.lock().push(frame);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn on_capture_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Delegates
// ---------------------------------------------------------------------------

/// Everything a delegate can observe, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Error(CaptureError),
    CameraDenied,
    MicrophoneDenied,
    Elapsed(f64),
    Finished(RecordingResult),
    State(RecordingState),
    PlaybackStarted,
    PlaybackPaused,
    PlaybackStopped,
    BufferingStarted,
    BufferingFinished,
    Position(f64),
    PlaybackFinished,
}

/// Delegate that records every event it receives.
#[derive(Default)]
pub(crate) struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub(crate) fn errors(&self) -> Vec<CaptureError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn elapsed(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Elapsed(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn finished(&self) -> Vec<RecordingResult> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Finished(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, event: &Event) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl CaptureDelegate for EventLog {
    fn on_error(&self, error: &CaptureError) {
        self.push(Event::Error(error.clone()));
    }

    fn on_camera_permission_denied(&self) {
        self.push(Event::CameraDenied);
    }

    fn on_microphone_permission_denied(&self) {
        self.push(Event::MicrophoneDenied);
    }

    fn on_elapsed(&self, seconds: f64) {
        self.push(Event::Elapsed(seconds));
    }

    fn on_finished(&self, result: &RecordingResult) {
        self.push(Event::Finished(result.clone()));
    }

    fn on_state_changed(&self, state: RecordingState) {
        self.push(Event::State(state));
    }
}

impl PlaybackDelegate for EventLog {
    fn on_started(&self) {
        self.push(Event::PlaybackStarted);
    }

    fn on_paused(&self) {
        self.push(Event::PlaybackPaused);
    }

    fn on_stopped(&self) {
        self.push(Event::PlaybackStopped);
    }

    fn on_buffering_started(&self) {
        self.push(Event::BufferingStarted);
    }

    fn on_buffering_finished(&self) {
        self.push(Event::BufferingFinished);
    }

    fn on_position(&self, seconds: f64) {
        self.push(Event::Position(seconds));
    }

    fn on_finished(&self) {
        self.push(Event::PlaybackFinished);
    }

    fn on_error(&self, error: &CaptureError) {
        self.push(Event::Error(error.clone()));
    }
}

/// Stand-in for the UI thread.
pub(crate) struct UiExecutor {
    queue: SerialQueue,
}

impl UiExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: SerialQueue::new("ui").expect("ui queue"),
        })
    }

    /// Wait until every job posted so far has run.
    pub(crate) fn flush(&self) {
        self.queue.flush();
    }
}

impl Executor for UiExecutor {
    fn execute(&self, job: Job) {
        self.queue.execute(job);
    }
}
