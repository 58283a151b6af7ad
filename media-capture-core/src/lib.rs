//! # media-capture-core
//!
//! Platform-agnostic camera + microphone recording core.
//!
//! Provides the capture session, the pause-aware track writer, the
//! recording and playback controllers, and the `.mcap` container format.
//! Platform device backends implement the `DeviceProvider` trait and plug
//! into the generic `CaptureSession`.
//!
//! ## Architecture
//!
//! ```text
//! media-capture-core (this crate)
//! ├── traits/       ← DeviceProvider, DeviceInput, FrameConsumer, ContainerSink, CaptureDelegate
//! ├── models/       ← TimeBase, Frame, CaptureError, states, CaptureConfiguration, RecordingResult
//! ├── dispatch/     ← SerialQueue (capture/writer threads), Executor, Notifier
//! ├── session/      ← CaptureSession (device lifecycle, frame delivery)
//! ├── writer/       ← TrackWriter (timestamp correction, multiplexing)
//! ├── controller/   ← RecordingController (recording state machine)
//! ├── playback/     ← PlaybackController
//! └── storage/      ← ContainerFileWriter, ContainerReader, metadata
//! ```
//!
//! ## Threads
//!
//! ```text
//! [device threads] ─sync─→ [capture] ─sync─→ [track-writer] ─→ file
//!                                                  └─ stop ─→ [container-finalize]
//! delegate calls ─────────────────────────────────────────→ injected Executor (UI)
//! ```

pub mod controller;
pub mod dispatch;
pub mod models;
pub mod playback;
pub mod session;
pub mod storage;
pub mod traits;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types at crate root for convenience.
pub use controller::recording_controller::{file_sink_factory, RecordingController, SinkFactory};
pub use dispatch::notifier::Notifier;
pub use dispatch::serial_queue::{Executor, Job, SerialQueue};
pub use models::config::{CaptureConfiguration, CaptureQuality, PlaybackConfiguration, SessionPreset, SwitchPolicy};
pub use models::device::{AuthorizationStatus, CameraDevice, CameraPosition, DeviceInfo, DeviceKind};
pub use models::error::CaptureError;
pub use models::frame::{Frame, TrackKind};
pub use models::recording_result::{ContainerSummary, RecordingMetadata, RecordingResult, Thumbnail};
pub use models::state::{CaptureSessionState, ContainerStatus, RecordingDiagnostics, RecordingState, WriterTrackState};
pub use models::time::TimeBase;
pub use playback::playback_controller::PlaybackController;
pub use session::capture_session::CaptureSession;
pub use storage::container_reader::ContainerReader;
pub use storage::container_writer::ContainerFileWriter;
pub use traits::capture_delegate::{CaptureDelegate, PlaybackDelegate};
pub use traits::container_sink::{ContainerSink, TrackSettings};
pub use traits::device_provider::{DeviceInput, DeviceProvider, FrameCallback};
pub use traits::frame_consumer::FrameConsumer;
pub use writer::track_writer::{DropReason, StopOutcome, TrackWriter, WriteOutcome, WriterEvents};
