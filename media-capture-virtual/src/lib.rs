//! # media-capture-virtual
//!
//! Synthetic device backend for `media-capture-core`.
//!
//! Provides virtual front/back cameras and a virtual microphone that
//! generate frames in real time on their own threads, stamped from a
//! shared host clock the way hardware inputs are. Useful for running the
//! full recording pipeline on machines without capture hardware, and for
//! end-to-end tests.
//!
//! ```text
//! VirtualDeviceProvider
//! ├── AuthorizationTable   ← per-kind authorization answers
//! ├── HostClock            ← shared monotonic timeline
//! ├── VirtualCamera        ← "virtual-camera" thread, 90 kHz timestamps
//! └── VirtualMicrophone    ← "virtual-microphone" thread, sample-clock timestamps
//! ```

pub mod camera;
pub mod clock;
pub mod microphone;
mod pacer;
pub mod permissions;
pub mod provider;

pub use camera::VirtualCamera;
pub use clock::HostClock;
pub use microphone::VirtualMicrophone;
pub use permissions::AuthorizationTable;
pub use provider::{VirtualDeviceProvider, VirtualDeviceProviderBuilder};
