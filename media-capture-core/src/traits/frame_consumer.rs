use crate::models::frame::Frame;

/// The single registered receiver of frames from a capture session.
///
/// `on_frame` runs on the session's capture thread, one frame at a time,
/// and takes ownership of the frame.
pub trait FrameConsumer: Send + Sync {
    fn on_frame(&self, frame: Frame);

    /// The session is being stopped while frames were being forwarded.
    /// Forwarding has already been halted when this is called.
    fn on_capture_stopped(&self) {}
}
