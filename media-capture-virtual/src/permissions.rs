//! Authorization answers for the virtual devices.
//!
//! Real platforms keep camera and microphone consent in system privacy
//! settings. The virtual backend keeps it in a table that tests and the
//! demo can change at any time; the capture session reads it on every
//! configure.
//!
//! `MEDIA_CAPTURE_DENY` seeds the table from the environment: a comma
//! separated list of device kinds (`camera`, `microphone`) to deny.

use std::collections::HashMap;

use parking_lot::Mutex;

use media_capture_core::{AuthorizationStatus, DeviceKind};

pub const DENY_ENV_VAR: &str = "MEDIA_CAPTURE_DENY";

/// Per-kind authorization. Kinds without an entry are authorized.
#[derive(Debug, Default)]
pub struct AuthorizationTable {
    statuses: Mutex<HashMap<DeviceKind, AuthorizationStatus>>,
}

impl AuthorizationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded from `MEDIA_CAPTURE_DENY`.
    pub fn from_env() -> Self {
        let table = Self::new();
        if let Ok(value) = std::env::var(DENY_ENV_VAR) {
            for kind in parse_denied(&value) {
                table.set(kind, AuthorizationStatus::Denied);
            }
        }
        table
    }

    pub fn status(&self, kind: DeviceKind) -> AuthorizationStatus {
        self.statuses
            .lock()
            .get(&kind)
            .copied()
            .unwrap_or(AuthorizationStatus::Authorized)
    }

    pub fn set(&self, kind: DeviceKind, status: AuthorizationStatus) {
        log::debug!("{kind} authorization set to {status:?}");
        self.statuses.lock().insert(kind, status);
    }
}

/// Device kinds named in a deny list. Unknown names are ignored.
fn parse_denied(value: &str) -> Vec<DeviceKind> {
    value
        .split(',')
        .map(str::trim)
        .filter_map(|name| match name.to_ascii_lowercase().as_str() {
            "camera" => Some(DeviceKind::Camera),
            "microphone" | "mic" => Some(DeviceKind::Microphone),
            "" => None,
            other => {
                log::warn!("{DENY_ENV_VAR}: unknown device kind {other:?}");
                None
            }
        })
        .collect()
}
