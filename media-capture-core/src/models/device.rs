use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of physical capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Camera,
    Microphone,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Camera => f.write_str("camera"),
            DeviceKind::Microphone => f.write_str("microphone"),
        }
    }
}

/// Logical position of a camera on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Front,
    Back,
}

impl CameraPosition {
    pub fn opposite(&self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back => CameraPosition::Front,
        }
    }
}

impl fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraPosition::Front => f.write_str("front"),
            CameraPosition::Back => f.write_str("back"),
        }
    }
}

/// A camera reported by the device backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: String,
    pub name: String,
    pub position: CameraPosition,
}

/// Description of an opened device input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
}

/// User authorization for a device kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

impl AuthorizationStatus {
    /// Only an explicit refusal blocks configuration. `NotDetermined`
    /// lets the platform prompt when the device is opened.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied | Self::Restricted)
    }
}
