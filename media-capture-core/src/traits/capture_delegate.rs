use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordingState;

/// Event delegate for recording notifications.
///
/// Exactly one delegate is registered per controller. Every call is
/// marshalled onto the UI executor the controller was built with; no
/// method is ever invoked from the capture or writer thread.
pub trait CaptureDelegate: Send + Sync {
    /// A device, configuration or writer failure. Reported once per failure.
    fn on_error(&self, error: &CaptureError);

    /// Camera access is denied; nothing was opened.
    fn on_camera_permission_denied(&self);

    /// Microphone access is denied; nothing was opened.
    fn on_microphone_permission_denied(&self);

    /// Recorded time with pauses removed, driven by the audio track.
    fn on_elapsed(&self, seconds: f64);

    /// The file is finalized. Fires at most once per recording.
    fn on_finished(&self, result: &RecordingResult);

    /// Called when the controller changes state.
    fn on_state_changed(&self, _state: RecordingState) {}
}

/// Event delegate for the playback controller.
///
/// Calls arrive on the UI executor the playback controller was built with.
pub trait PlaybackDelegate: Send + Sync {
    fn on_started(&self);

    fn on_paused(&self);

    fn on_stopped(&self);

    fn on_buffering_started(&self) {}

    fn on_buffering_finished(&self) {}

    /// Current playback position in seconds.
    fn on_position(&self, seconds: f64);

    /// The end of the file was reached and looping is off.
    fn on_finished(&self) {}

    fn on_error(&self, error: &CaptureError);
}
