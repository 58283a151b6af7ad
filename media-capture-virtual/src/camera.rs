//! Virtual camera input.
//!
//! Generates a small grayscale test picture per frame at a fixed frame
//! rate. Presentation times come from the provider's host clock on the
//! 90 kHz video timescale, so a camera restarted after a switch continues
//! on the same timeline as the microphone.

use std::time::Duration;

use media_capture_core::{
    CameraDevice, CameraPosition, CaptureError, DeviceInfo, DeviceInput, DeviceKind, Frame, FrameCallback, TimeBase,
};

use crate::clock::{HostClock, VIDEO_TIMESCALE};
use crate::pacer::PacedWorker;

/// Side length divisor between the configured video size and the
/// generated test picture.
const PICTURE_SCALE: u32 = 8;

pub struct VirtualCamera {
    device: CameraDevice,
    clock: HostClock,
    frame_rate: u32,
    picture_size: (u32, u32),
    worker: PacedWorker,
}

impl VirtualCamera {
    pub fn new(device: CameraDevice, clock: HostClock, frame_rate: u32, video_size: (u32, u32)) -> Self {
        let picture_size = (
            (video_size.0 / PICTURE_SCALE).max(1),
            (video_size.1 / PICTURE_SCALE).max(1),
        );
        Self {
            device,
            clock,
            frame_rate: frame_rate.max(1),
            picture_size,
            worker: PacedWorker::new(),
        }
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Nominal duration of one frame.
    pub fn frame_duration(&self) -> TimeBase {
        TimeBase::new(1, u64::from(self.frame_rate))
    }
}

/// A flat picture whose brightness cycles with the frame index. Front and
/// back cameras cycle in opposite directions so their output differs.
fn test_picture(position: CameraPosition, index: u64, (width, height): (u32, u32)) -> Vec<u8> {
    let step = (index % 256) as u8;
    let shade = match position {
        CameraPosition::Front => step,
        CameraPosition::Back => u8::MAX - step,
    };
    vec![shade; (width * height) as usize]
}

impl DeviceInput for VirtualCamera {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.device.id.clone(),
            name: self.device.name.clone(),
            kind: DeviceKind::Camera,
        }
    }

    fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError> {
        let clock = self.clock;
        let position = self.device.position;
        let picture_size = self.picture_size;
        let duration = self.frame_duration();
        let period = Duration::from_secs(1) / self.frame_rate;

        log::debug!("{}: starting at {} fps", self.device.id, self.frame_rate);
        self.worker.start("virtual-camera", period, move |index| {
            let pts = clock.now(VIDEO_TIMESCALE);
            callback(Frame::video(test_picture(position, index, picture_size), pts, duration));
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
        log::debug!("{}: stopped", self.device.id);
    }
}
