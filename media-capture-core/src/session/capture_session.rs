use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::dispatch::notifier::Notifier;
use crate::dispatch::serial_queue::SerialQueue;
use crate::models::config::CaptureConfiguration;
use crate::models::device::{AuthorizationStatus, CameraDevice, CameraPosition, DeviceKind};
use crate::models::error::CaptureError;
use crate::models::frame::Frame;
use crate::models::state::CaptureSessionState;
use crate::traits::device_provider::{DeviceInput, DeviceProvider, FrameCallback};
use crate::traits::frame_consumer::FrameConsumer;

/// Mutable session state, protected by `parking_lot::Mutex`.
struct SessionInner {
    state: CaptureSessionState,
    active_camera: Option<CameraDevice>,
    video_input: Option<Box<dyn DeviceInput>>,
    audio_input: Option<Box<dyn DeviceInput>>,
    consumer: Option<Arc<dyn FrameConsumer>>,
}

impl SessionInner {
    fn take_inputs(&mut self) -> Vec<Box<dyn DeviceInput>> {
        self.video_input.take().into_iter().chain(self.audio_input.take()).collect()
    }
}

/// State reachable from device callbacks.
struct SessionShared {
    queue: SerialQueue,
    inner: Mutex<SessionInner>,
    forwarding: AtomicBool,
}

impl SessionShared {
    /// Runs on the capture queue, one frame at a time.
    fn deliver(&self, frame: Frame) {
        let consumer = {
            let inner = self.inner.lock();
            if !inner.state.is_running() {
                return;
            }
            inner.consumer.clone()
        };
        if !self.forwarding.load(Ordering::Acquire) {
            return;
        }
        if let Some(consumer) = consumer {
            consumer.on_frame(frame);
        }
    }
}

/// Owns the camera and microphone inputs and delivers their frames to
/// a single registered [`FrameConsumer`].
///
/// Every device callback is funnelled through the session's serial
/// capture queue with a blocking hand-off, so video and audio frames never
/// overlap and a slow consumer pushes back on the device threads.
///
/// ```text
/// [camera thread] ─┐
///                  ├─ sync ─→ [capture queue] ─→ FrameConsumer::on_frame
/// [mic thread] ────┘
/// ```
pub struct CaptureSession {
    provider: Arc<dyn DeviceProvider>,
    config: CaptureConfiguration,
    shared: Arc<SessionShared>,
    notifier: Notifier,
}

impl CaptureSession {
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        config: CaptureConfiguration,
        notifier: Notifier,
    ) -> Result<Self, CaptureError> {
        let queue = SerialQueue::new("capture")?;
        Ok(Self {
            provider,
            config,
            shared: Arc::new(SessionShared {
                queue,
                inner: Mutex::new(SessionInner {
                    state: CaptureSessionState::Uninitialized,
                    active_camera: None,
                    video_input: None,
                    audio_input: None,
                    consumer: None,
                }),
                forwarding: AtomicBool::new(false),
            }),
            notifier,
        })
    }

    pub fn state(&self) -> CaptureSessionState {
        self.shared.inner.lock().state
    }

    /// Configured and able to deliver frames.
    pub fn is_ready(&self) -> bool {
        self.state().is_configured()
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn output_path(&self) -> &Path {
        &self.config.output_path
    }

    pub fn active_camera(&self) -> Option<CameraDevice> {
        self.shared.inner.lock().active_camera.clone()
    }

    /// Register the receiver of forwarded frames, replacing any previous one.
    pub fn set_consumer(&self, consumer: Arc<dyn FrameConsumer>) {
        self.shared.inner.lock().consumer = Some(consumer);
    }

    /// Check authorization and bind both devices.
    ///
    /// Transitions: uninitialized | stopped | permission_denied | failed →
    /// configuring → ready. A denied permission leaves the hardware
    /// untouched and moves to `PermissionDenied`. Calling this on a
    /// configured session does nothing.
    pub fn configure(&self) -> Result<(), CaptureError> {
        {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                CaptureSessionState::Ready | CaptureSessionState::Running | CaptureSessionState::Configuring => {
                    log::debug!("configure ignored in state {:?}", inner.state);
                    return Ok(());
                }
                _ => {}
            }
            inner.state = CaptureSessionState::Configuring;
        }

        let camera = self.provider.authorization(DeviceKind::Camera);
        let microphone = self.provider.authorization(DeviceKind::Microphone);
        if camera.is_denied() || microphone.is_denied() {
            return Err(self.permission_denied(camera, microphone));
        }

        match self.bind_devices() {
            Ok(()) => {
                log::info!("capture session ready ({})", self.config.output_path.display());
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Start delivering frames. Transitions: ready → running; no-op when
    /// already running.
    pub fn start(&self) -> Result<(), CaptureError> {
        let callback = frame_callback(&self.shared);
        let result = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                CaptureSessionState::Running => return Ok(()),
                CaptureSessionState::Ready => {}
                other => {
                    log::warn!("start ignored in state {:?}", other);
                    return Err(CaptureError::DeviceConfigurationFailed(format!(
                        "capture session cannot start while {:?}",
                        other
                    )));
                }
            }
            inner.state = CaptureSessionState::Running;
            start_inputs(&mut inner, &callback)
        };

        match result {
            Ok(()) => {
                log::info!("capture session running");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Halt capture and release both devices.
    ///
    /// When frames were being forwarded, forwarding is halted first and the
    /// consumer is told via [`FrameConsumer::on_capture_stopped`]. The
    /// session must be configured again before reuse.
    pub fn stop(&self) {
        if self.shared.forwarding.swap(false, Ordering::AcqRel) {
            self.barrier();
            let consumer = self.shared.inner.lock().consumer.clone();
            if let Some(consumer) = consumer {
                consumer.on_capture_stopped();
            }
        }

        let shared = Arc::clone(&self.shared);
        let inputs = self.shared.queue.sync(move || {
            let mut inner = shared.inner.lock();
            if !inner.state.is_configured() {
                return Vec::new();
            }
            inner.state = CaptureSessionState::Stopped;
            inner.take_inputs()
        });

        if inputs.is_empty() {
            return;
        }
        for mut input in inputs {
            input.stop();
        }
        log::info!("capture session stopped");
    }

    /// Whether frames currently reach the consumer.
    pub fn is_forwarding(&self) -> bool {
        self.shared.forwarding.load(Ordering::Acquire)
    }

    /// Enable or disable forwarding to the consumer.
    ///
    /// Returns once any frame already in delivery has been consumed, so no
    /// frame reaches the consumer after `set_forwarding(false)` returns.
    pub fn set_forwarding(&self, forwarding: bool) {
        self.shared.forwarding.store(forwarding, Ordering::Release);
        self.barrier();
    }

    /// Disable forwarding without waiting for the capture queue. Safe to
    /// call from inside frame delivery.
    pub fn halt_forwarding(&self) {
        self.shared.forwarding.store(false, Ordering::Release);
    }

    /// Cameras with distinct positions, in provider order.
    pub fn available_cameras(&self) -> Vec<CameraDevice> {
        let mut cameras: Vec<CameraDevice> = Vec::new();
        for camera in self.provider.cameras() {
            if !cameras.iter().any(|c| c.position == camera.position) {
                cameras.push(camera);
            }
        }
        cameras
    }

    /// The camera at `position`, or the first camera when none matches.
    pub fn camera_device(&self, position: CameraPosition) -> Option<CameraDevice> {
        let cameras = self.available_cameras();
        cameras
            .iter()
            .find(|c| c.position == position)
            .or_else(|| cameras.first())
            .cloned()
    }

    /// Swap the bound camera for the one at `position`.
    ///
    /// The microphone keeps running. The new input is opened before the old
    /// one is released; if that fails the previous camera stays bound and
    /// the error is reported. Not allowed while frames are forwarded.
    pub fn set_active_camera(&self, position: CameraPosition) -> Result<(), CaptureError> {
        let camera = self
            .available_cameras()
            .into_iter()
            .find(|c| c.position == position)
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no {} camera", position)))?;

        {
            let inner = self.shared.inner.lock();
            if !inner.state.is_configured() {
                return Err(CaptureError::DeviceConfigurationFailed(format!(
                    "cannot switch camera while {:?}",
                    inner.state
                )));
            }
            if inner.active_camera.as_ref() == Some(&camera) {
                return Ok(());
            }
        }
        if self.is_forwarding() {
            return Err(CaptureError::DeviceConfigurationFailed(
                "cannot switch camera while recording".into(),
            ));
        }

        let input = match self.provider.open_camera(&camera) {
            Ok(input) => input,
            Err(e) => {
                log::warn!("keeping previous camera: {}", e);
                self.notifier.error(&e);
                return Err(e);
            }
        };

        // Swap on the capture queue so no delivery observes a half-done change.
        let shared = Arc::clone(&self.shared);
        let callback = frame_callback(&self.shared);
        let swapped = self.shared.queue.sync(move || {
            let mut inner = shared.inner.lock();
            let mut input = input;
            if inner.state.is_running() {
                if let Err(e) = input.start(callback) {
                    return Err(e);
                }
            }
            let old = inner.video_input.replace(input);
            inner.active_camera = Some(camera);
            Ok(old)
        });

        match swapped {
            Ok(old) => {
                if let Some(mut old) = old {
                    old.stop();
                }
                log::info!("active camera is now {}", position);
                Ok(())
            }
            Err(e) => {
                log::warn!("keeping previous camera: {}", e);
                self.notifier.error(&e);
                Err(e)
            }
        }
    }

    /// Toggle between the first two available cameras.
    ///
    /// No-op with fewer than two cameras or while frames are forwarded.
    pub fn switch_camera(&self) -> Result<(), CaptureError> {
        let cameras = self.available_cameras();
        if cameras.len() < 2 || self.is_forwarding() {
            log::debug!("switch_camera ignored");
            return Ok(());
        }
        let current = self.active_camera();
        let next = cameras
            .iter()
            .take(2)
            .find(|c| Some(*c) != current.as_ref())
            .map(|c| c.position)
            .unwrap_or(cameras[0].position);
        self.set_active_camera(next)
    }

    fn bind_devices(&self) -> Result<(), CaptureError> {
        self.config.validate()?;

        let camera = self
            .camera_device(self.config.initial_camera)
            .ok_or_else(|| CaptureError::DeviceUnavailable("no camera available".into()))?;
        if camera.position != self.config.initial_camera {
            log::warn!("no {} camera, using {}", self.config.initial_camera, camera.name);
        }

        // Inputs are parked in the session as soon as they open so that a
        // later failure releases them.
        let video_input = self.provider.open_camera(&camera)?;
        self.shared.inner.lock().video_input = Some(video_input);
        let audio_input = self.provider.open_microphone()?;
        self.shared.inner.lock().audio_input = Some(audio_input);

        remove_stale_output(&self.config.output_path)?;

        let mut inner = self.shared.inner.lock();
        inner.active_camera = Some(camera);
        inner.state = CaptureSessionState::Ready;
        Ok(())
    }

    fn permission_denied(&self, camera: AuthorizationStatus, microphone: AuthorizationStatus) -> CaptureError {
        let device = if camera.is_denied() {
            DeviceKind::Camera
        } else {
            DeviceKind::Microphone
        };
        self.shared.inner.lock().state = CaptureSessionState::PermissionDenied(device);

        if camera.is_denied() {
            self.notifier.camera_permission_denied();
        }
        if microphone.is_denied() {
            self.notifier.microphone_permission_denied();
        }
        CaptureError::PermissionDenied { device }
    }

    /// Mark the session failed, release the devices and report `error` once.
    fn fail(&self, error: CaptureError) -> CaptureError {
        self.shared.forwarding.store(false, Ordering::Release);
        let inputs = {
            let mut inner = self.shared.inner.lock();
            inner.state = CaptureSessionState::Failed;
            inner.active_camera = None;
            inner.take_inputs()
        };
        for mut input in inputs {
            input.stop();
        }
        self.notifier.error(&error);
        error
    }

    fn barrier(&self) {
        if !self.shared.queue.is_current() {
            self.shared.queue.flush();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let inputs = self.shared.inner.lock().take_inputs();
        for mut input in inputs {
            input.stop();
        }
    }
}

/// Device callback that hands each frame to the capture queue and waits.
fn frame_callback(shared: &Arc<SessionShared>) -> FrameCallback {
    let weak: Weak<SessionShared> = Arc::downgrade(shared);
    Arc::new(move |frame: Frame| {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let target = Arc::clone(&shared);
        shared.queue.sync(move || target.deliver(frame));
    })
}

fn start_inputs(inner: &mut SessionInner, callback: &FrameCallback) -> Result<(), CaptureError> {
    if let Some(input) = inner.video_input.as_mut() {
        input.start(Arc::clone(callback))?;
    }
    if let Some(input) = inner.audio_input.as_mut() {
        input.start(Arc::clone(callback))?;
    }
    Ok(())
}

fn remove_stale_output(path: &Path) -> Result<(), CaptureError> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("removed stale output {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            log::error!("cannot remove {}: {}", path.display(), e);
            Err(CaptureError::OutputPathCollision(path.to_path_buf()))
        }
    }
}
