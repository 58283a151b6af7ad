//! Records a short clip from the virtual devices, pausing once in the
//! middle, then plays the file back.
//!
//! ```text
//! record-demo [config.json]
//! ```
//!
//! `RUST_LOG` controls log verbosity. `MEDIA_CAPTURE_DENY=camera` (or
//! `microphone`) simulates a refused permission.

use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use media_capture_core::{
    CaptureConfiguration, CaptureDelegate, CaptureError, PlaybackConfiguration, PlaybackController,
    PlaybackDelegate, RecordingController, RecordingResult, RecordingState, SerialQueue,
};
use media_capture_virtual::VirtualDeviceProvider;

const SEGMENT: Duration = Duration::from_millis(1500);
const PAUSE: Duration = Duration::from_millis(1000);

struct ConsoleDelegate {
    outcome: Mutex<Option<Sender<Result<RecordingResult, CaptureError>>>>,
}

impl ConsoleDelegate {
    fn send(&self, outcome: Result<RecordingResult, CaptureError>) {
        if let Some(tx) = self.outcome.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

impl CaptureDelegate for ConsoleDelegate {
    fn on_error(&self, error: &CaptureError) {
        log::error!("recording error: {error}");
        if error.is_fatal() {
            self.send(Err(error.clone()));
        }
    }

    fn on_camera_permission_denied(&self) {
        log::warn!("camera permission denied");
    }

    fn on_microphone_permission_denied(&self) {
        log::warn!("microphone permission denied");
    }

    fn on_elapsed(&self, seconds: f64) {
        log::debug!("elapsed {seconds:.3}s");
    }

    fn on_finished(&self, result: &RecordingResult) {
        self.send(Ok(result.clone()));
    }

    fn on_state_changed(&self, state: RecordingState) {
        log::info!("recording state: {state:?}");
    }
}

struct PlaybackLog {
    done: Mutex<Option<Sender<()>>>,
}

impl PlaybackLog {
    fn done(&self) {
        if let Some(tx) = self.done.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl PlaybackDelegate for PlaybackLog {
    fn on_started(&self) {
        log::info!("playback started");
    }

    fn on_paused(&self) {
        log::info!("playback paused");
    }

    fn on_stopped(&self) {
        log::info!("playback stopped");
        self.done();
    }

    fn on_position(&self, seconds: f64) {
        log::debug!("position {seconds:.2}s");
    }

    fn on_finished(&self) {
        log::info!("playback finished");
        self.done();
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("playback error: {error}");
        self.done();
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{e}");
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

fn run() -> Result<(), CaptureError> {
    let config = match std::env::args().nth(1) {
        Some(path) => CaptureConfiguration::from_json_file(Path::new(&path))?,
        None => CaptureConfiguration::default(),
    };
    config.validate()?;

    let provider = Arc::new(
        VirtualDeviceProvider::builder()
            .for_configuration(&config)
            .authorization_from_env()
            .build(),
    );
    let ui = Arc::new(SerialQueue::new("ui")?);

    let (tx, rx) = mpsc::channel();
    let delegate = Arc::new(ConsoleDelegate {
        outcome: Mutex::new(Some(tx)),
    });
    let controller = RecordingController::new(provider, config, delegate, ui.clone())?;

    for camera in controller.available_cameras() {
        log::info!("camera available: {} ({})", camera.name, camera.position);
    }

    controller.configure()?;
    controller.start()?;
    thread::sleep(SEGMENT);
    controller.pause();
    thread::sleep(PAUSE);
    controller.resume();
    thread::sleep(SEGMENT);
    controller.stop();

    let result = rx
        .recv_timeout(Duration::from_secs(10))
        .map_err(|_| CaptureError::WriterRuntimeFailed("recording did not finish".into()))??;

    log::info!(
        "recorded {:.3}s to {} (thumbnail: {})",
        result.duration_secs(),
        result.file_path.display(),
        if result.thumbnail.is_some() { "yes" } else { "no" }
    );
    let metadata =
        serde_json::to_string_pretty(&result.metadata).map_err(|e| CaptureError::Storage(e.to_string()))?;
    println!("{metadata}");

    play(&result, ui)
}

fn play(result: &RecordingResult, ui: Arc<SerialQueue>) -> Result<(), CaptureError> {
    let (tx, rx) = mpsc::channel();
    let events = Arc::new(PlaybackLog {
        done: Mutex::new(Some(tx)),
    });
    let player = PlaybackController::open(
        &result.file_path,
        PlaybackConfiguration {
            autoplay: true,
            ..PlaybackConfiguration::default()
        },
        events,
        ui,
    );
    if !player.ready() {
        return Err(CaptureError::Playback(format!("cannot open {}", result.file_path.display())));
    }

    let timeout = Duration::from_secs_f64(player.duration()) + Duration::from_secs(5);
    rx.recv_timeout(timeout)
        .map_err(|_| CaptureError::Playback("playback did not finish".into()))
}
