use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordingState;
use crate::traits::capture_delegate::CaptureDelegate;

use super::serial_queue::Executor;

/// Marshals delegate calls onto the UI executor.
///
/// Shared by the capture session and the recording controller so both
/// report through the one registered delegate. Nothing here calls the
/// delegate on the current thread.
#[derive(Clone)]
pub struct Notifier {
    delegate: Option<Arc<dyn CaptureDelegate>>,
    executor: Arc<dyn Executor>,
}

impl Notifier {
    pub fn new(delegate: Option<Arc<dyn CaptureDelegate>>, executor: Arc<dyn Executor>) -> Self {
        Self { delegate, executor }
    }

    pub fn error(&self, error: &CaptureError) {
        log::error!("capture error: {}", error);
        let error = error.clone();
        self.post(move |d| d.on_error(&error));
    }

    pub fn camera_permission_denied(&self) {
        log::warn!("camera permission denied");
        self.post(|d| d.on_camera_permission_denied());
    }

    pub fn microphone_permission_denied(&self) {
        log::warn!("microphone permission denied");
        self.post(|d| d.on_microphone_permission_denied());
    }

    pub fn elapsed(&self, seconds: f64) {
        self.post(move |d| d.on_elapsed(seconds));
    }

    pub fn finished(&self, result: RecordingResult) {
        self.post(move |d| d.on_finished(&result));
    }

    pub fn state_changed(&self, state: RecordingState) {
        self.post(move |d| d.on_state_changed(state));
    }

    fn post<F>(&self, f: F)
    where
        F: FnOnce(&dyn CaptureDelegate) + Send + 'static,
    {
        let Some(delegate) = self.delegate.clone() else {
            return;
        };
        self.executor.execute(Box::new(move || f(delegate.as_ref())));
    }
}
