use std::sync::Arc;

use crate::models::device::{AuthorizationStatus, CameraDevice, DeviceInfo, DeviceKind};
use crate::models::error::CaptureError;
use crate::models::frame::Frame;

/// Callback invoked by a device input for every captured frame.
///
/// Runs on the backend's own thread. The capture session funnels every
/// invocation through its serial capture queue, so the callback may block
/// until the frame has been consumed.
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync + 'static>;

/// Platform device layer: authorization, enumeration, and opening inputs.
///
/// Implemented by:
/// - `VirtualDeviceProvider` (synthetic devices, `media-capture-virtual`)
/// - Future: AVFoundation, Camera2, V4L2 backends
pub trait DeviceProvider: Send + Sync {
    /// Current user authorization for `kind`. Must not touch hardware.
    fn authorization(&self, kind: DeviceKind) -> AuthorizationStatus;

    /// Cameras currently attached, in the platform's preferred order.
    fn cameras(&self) -> Vec<CameraDevice>;

    /// Construct an input for `camera`. The input does not deliver frames
    /// until started.
    fn open_camera(&self, camera: &CameraDevice) -> Result<Box<dyn DeviceInput>, CaptureError>;

    /// Construct an input for the default microphone.
    fn open_microphone(&self) -> Result<Box<dyn DeviceInput>, CaptureError>;
}

/// An opened camera or microphone bound into a capture session.
pub trait DeviceInput: Send {
    /// Information about the device backing this input.
    fn info(&self) -> DeviceInfo;

    /// Start delivering frames via `callback`.
    fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError>;

    /// Stop delivering frames and release the device. Once this returns
    /// no further callback invocations begin.
    fn stop(&mut self);
}
