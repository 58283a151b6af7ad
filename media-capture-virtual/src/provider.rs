//! The virtual device provider.

use media_capture_core::{
    AuthorizationStatus, CameraDevice, CameraPosition, CaptureConfiguration, CaptureError, DeviceInput,
    DeviceKind, DeviceProvider,
};

use crate::camera::VirtualCamera;
use crate::clock::HostClock;
use crate::microphone::VirtualMicrophone;
use crate::permissions::AuthorizationTable;

const DEFAULT_FRAME_RATE: u32 = 30;

/// Provides virtual cameras and a virtual microphone.
///
/// Every input opened from one provider shares its [`HostClock`].
///
/// ```no_run
/// use std::sync::Arc;
/// use media_capture_core::CameraPosition;
/// use media_capture_virtual::VirtualDeviceProvider;
///
/// let provider = Arc::new(
///     VirtualDeviceProvider::builder()
///         .cameras(&[CameraPosition::Back])
///         .frame_rate(24)
///         .build(),
/// );
/// ```
pub struct VirtualDeviceProvider {
    clock: HostClock,
    cameras: Vec<CameraDevice>,
    microphone: bool,
    frame_rate: u32,
    video_size: (u32, u32),
    sample_rate: u32,
    channels: u16,
    permissions: AuthorizationTable,
}

impl VirtualDeviceProvider {
    /// Front and back camera plus a microphone, all authorized.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> VirtualDeviceProviderBuilder {
        VirtualDeviceProviderBuilder::default()
    }

    pub fn clock(&self) -> HostClock {
        self.clock
    }

    pub fn permissions(&self) -> &AuthorizationTable {
        &self.permissions
    }

    pub fn set_authorization(&self, kind: DeviceKind, status: AuthorizationStatus) {
        self.permissions.set(kind, status);
    }
}

impl Default for VirtualDeviceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProvider for VirtualDeviceProvider {
    fn authorization(&self, kind: DeviceKind) -> AuthorizationStatus {
        self.permissions.status(kind)
    }

    fn cameras(&self) -> Vec<CameraDevice> {
        self.cameras.clone()
    }

    fn open_camera(&self, camera: &CameraDevice) -> Result<Box<dyn DeviceInput>, CaptureError> {
        let device = self
            .cameras
            .iter()
            .find(|c| c.id == camera.id)
            .cloned()
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no camera with id {}", camera.id)))?;
        log::info!("opening {} ({})", device.name, device.id);
        Ok(Box::new(VirtualCamera::new(
            device,
            self.clock,
            self.frame_rate,
            self.video_size,
        )))
    }

    fn open_microphone(&self) -> Result<Box<dyn DeviceInput>, CaptureError> {
        if !self.microphone {
            return Err(CaptureError::DeviceUnavailable("no microphone attached".into()));
        }
        log::info!("opening virtual microphone");
        Ok(Box::new(VirtualMicrophone::new(self.clock, self.sample_rate, self.channels)))
    }
}

/// Builder for [`VirtualDeviceProvider`].
pub struct VirtualDeviceProviderBuilder {
    cameras: Vec<CameraPosition>,
    microphone: bool,
    frame_rate: u32,
    video_size: (u32, u32),
    sample_rate: u32,
    channels: u16,
    permissions: AuthorizationTable,
}

impl Default for VirtualDeviceProviderBuilder {
    fn default() -> Self {
        let config = CaptureConfiguration::default();
        Self {
            cameras: vec![CameraPosition::Front, CameraPosition::Back],
            microphone: true,
            frame_rate: DEFAULT_FRAME_RATE,
            video_size: (config.video_width, config.video_height),
            sample_rate: config.audio_sample_rate,
            channels: config.audio_channels,
            permissions: AuthorizationTable::new(),
        }
    }
}

impl VirtualDeviceProviderBuilder {
    /// Attached cameras, in enumeration order.
    pub fn cameras(mut self, positions: &[CameraPosition]) -> Self {
        self.cameras = positions.to_vec();
        self
    }

    pub fn without_microphone(mut self) -> Self {
        self.microphone = false;
        self
    }

    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps.max(1);
        self
    }

    /// Match the generated picture size and audio format to `config`.
    pub fn for_configuration(mut self, config: &CaptureConfiguration) -> Self {
        self.video_size = (config.video_width, config.video_height);
        self.sample_rate = config.audio_sample_rate;
        self.channels = config.audio_channels;
        self
    }

    pub fn authorization(self, kind: DeviceKind, status: AuthorizationStatus) -> Self {
        self.permissions.set(kind, status);
        self
    }

    /// Seed authorization from `MEDIA_CAPTURE_DENY`.
    pub fn authorization_from_env(mut self) -> Self {
        self.permissions = AuthorizationTable::from_env();
        self
    }

    pub fn build(self) -> VirtualDeviceProvider {
        let cameras = self
            .cameras
            .iter()
            .map(|position| {
                let label = match position {
                    CameraPosition::Front => "Front",
                    CameraPosition::Back => "Back",
                };
                CameraDevice {
                    id: format!("virtual-camera-{position}"),
                    name: format!("Virtual {label} Camera"),
                    position: *position,
                }
            })
            .collect();

        VirtualDeviceProvider {
            clock: HostClock::new(),
            cameras,
            microphone: self.microphone,
            frame_rate: self.frame_rate,
            video_size: self.video_size,
            sample_rate: self.sample_rate,
            channels: self.channels,
            permissions: self.permissions,
        }
    }
}
