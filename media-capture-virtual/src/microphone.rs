//! Virtual microphone input.
//!
//! Delivers 16-bit little-endian PCM packets of a 440 Hz tone. The first
//! packet is stamped from the host clock; later packets follow on the
//! sample clock, so consecutive packets abut exactly.

use std::f64::consts::TAU;
use std::time::Duration;

use media_capture_core::{CaptureError, DeviceInfo, DeviceInput, DeviceKind, Frame, FrameCallback, TimeBase};

use crate::clock::HostClock;
use crate::pacer::PacedWorker;

/// Samples per channel in one delivered packet.
pub const PACKET_SAMPLES: u32 = 1024;

const TONE_HZ: f64 = 440.0;
const TONE_AMPLITUDE: f64 = 0.25;

pub struct VirtualMicrophone {
    id: String,
    name: String,
    clock: HostClock,
    sample_rate: u32,
    channels: u16,
    worker: PacedWorker,
}

impl VirtualMicrophone {
    pub fn new(clock: HostClock, sample_rate: u32, channels: u16) -> Self {
        Self {
            id: "virtual-microphone".into(),
            name: "Virtual Microphone".into(),
            clock,
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            worker: PacedWorker::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub fn packet_duration(&self) -> TimeBase {
        TimeBase::new(PACKET_SAMPLES as i64, u64::from(self.sample_rate))
    }
}

/// Interleaved PCM for the packet starting at absolute sample `first`.
fn tone_packet(first: u64, sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(PACKET_SAMPLES as usize * channels as usize * 2);
    for n in 0..PACKET_SAMPLES as u64 {
        let t = (first + n) as f64 / sample_rate as f64;
        let sample = ((TAU * TONE_HZ * t).sin() * TONE_AMPLITUDE * i16::MAX as f64) as i16;
        for _ in 0..channels {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }
    pcm
}

impl DeviceInput for VirtualMicrophone {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: DeviceKind::Microphone,
        }
    }

    fn start(&mut self, callback: FrameCallback) -> Result<(), CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;
        let duration = self.packet_duration();
        let timescale = u64::from(sample_rate);
        let origin = self.clock.now(timescale).rescale(timescale).value();
        let period = Duration::from_secs(PACKET_SAMPLES as u64) / sample_rate;

        log::debug!("{}: starting at {} Hz, {} channel(s)", self.id, sample_rate, channels);
        self.worker.start("virtual-microphone", period, move |index| {
            let first = index * PACKET_SAMPLES as u64;
            let pts = TimeBase::new(origin + first as i64, timescale);
            callback(Frame::audio(tone_packet(first, sample_rate, channels), pts, duration));
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
        log::debug!("{}: stopped", self.id);
    }
}
