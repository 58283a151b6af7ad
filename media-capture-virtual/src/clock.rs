//! Shared host clock for the virtual devices.

use std::time::Instant;

use media_capture_core::TimeBase;

/// Timescale used for video timestamps, the usual 90 kHz video clock.
pub const VIDEO_TIMESCALE: u64 = 90_000;

/// A monotonic timeline shared by every device of one provider.
///
/// Cameras and the microphone read the same origin, so their timestamps
/// are comparable like those of inputs attached to one hardware session.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Time since the origin, truncated to `timescale` units.
    pub fn now(&self, timescale: u64) -> TimeBase {
        let nanos = self.origin.elapsed().as_nanos() as i128;
        let ticks = nanos * timescale as i128 / 1_000_000_000;
        TimeBase::new(i64::try_from(ticks).unwrap_or(i64::MAX), timescale)
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn clock_advances() {
        let clock = HostClock::new();
        let first = clock.now(VIDEO_TIMESCALE);
        thread::sleep(Duration::from_millis(20));
        let second = clock.now(VIDEO_TIMESCALE);
        assert!(second > first);
        assert!((second - first).as_secs_f64() >= 0.019);
    }

    #[test]
    fn copies_share_the_origin() {
        let clock = HostClock::new();
        let copy = clock;
        thread::sleep(Duration::from_millis(5));
        let a = clock.now(1_000);
        let b = copy.now(1_000);
        assert!((b - a).as_secs_f64().abs() < 0.5);
        assert!(a >= TimeBase::from_millis(5));
    }
}
