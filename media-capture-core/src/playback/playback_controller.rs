use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use crate::dispatch::serial_queue::Executor;
use crate::models::config::PlaybackConfiguration;
use crate::models::error::CaptureError;
use crate::models::time::TimeBase;
use crate::storage::container_reader::ContainerReader;
use crate::traits::capture_delegate::PlaybackDelegate;

struct PlaybackInner {
    reader: Option<ContainerReader>,
    duration: TimeBase,
    looping: bool,
    playing: bool,
    /// Position when playback was last started, seeked or paused.
    anchor_position: TimeBase,
    anchor_instant: Option<Instant>,
    /// Bumped whenever the running clock thread must exit.
    generation: u64,
}

impl PlaybackInner {
    fn position(&self) -> TimeBase {
        let position = match (self.playing, self.anchor_instant) {
            (true, Some(started)) => {
                let played = TimeBase::from_nanos(started.elapsed().as_nanos() as i64);
                self.anchor_position + played
            }
            _ => self.anchor_position,
        };
        position.min(self.duration)
    }

    fn reanchor(&mut self, position: TimeBase) {
        self.anchor_position = position;
        self.anchor_instant = self.playing.then(Instant::now);
    }
}

struct PlaybackShared {
    path: PathBuf,
    config: PlaybackConfiguration,
    delegate: Arc<dyn PlaybackDelegate>,
    executor: Arc<dyn Executor>,
    inner: Mutex<PlaybackInner>,
}

impl PlaybackShared {
    fn post<F>(&self, f: F)
    where
        F: FnOnce(&dyn PlaybackDelegate) + Send + 'static,
    {
        let delegate = Arc::clone(&self.delegate);
        self.executor.execute(Box::new(move || f(delegate.as_ref())));
    }

    /// One clock tick. Returns `false` once this clock should exit.
    fn tick(&self, generation: u64) -> bool {
        let (position, reached_end) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || !inner.playing {
                return false;
            }
            let position = inner.position();
            if position < inner.duration {
                (position, false)
            } else if inner.looping {
                inner.reanchor(TimeBase::ZERO);
                (TimeBase::ZERO, false)
            } else {
                let end = inner.duration;
                inner.playing = false;
                inner.reanchor(end);
                (end, true)
            }
        };

        let seconds = position.as_secs_f64();
        self.post(move |d| d.on_position(seconds));
        if reached_end {
            log::info!("playback of {} finished", self.path.display());
            self.post(|d| d.on_finished());
        }
        !reached_end
    }
}

/// Plays back a finished recording.
///
/// There is no rendering here: the controller tracks the position
/// against a wall clock and reports it, the way a player UI would
/// observe it. A "playback-clock" thread emits `on_position` every
/// `tick_interval` while playing.
pub struct PlaybackController {
    shared: Arc<PlaybackShared>,
}

impl PlaybackController {
    /// Load `path`. A file that cannot be read is reported through
    /// `on_error` and leaves the controller not ready.
    pub fn open(
        path: &Path,
        config: PlaybackConfiguration,
        delegate: Arc<dyn PlaybackDelegate>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let reader = match ContainerReader::open(path) {
            Ok(reader) => Some(reader),
            Err(e) => {
                log::error!("cannot play {}: {}", path.display(), e);
                None
            }
        };
        let duration = reader.as_ref().map(ContainerReader::duration).unwrap_or(TimeBase::ZERO);

        let controller = Self {
            shared: Arc::new(PlaybackShared {
                path: path.to_path_buf(),
                delegate,
                executor,
                inner: Mutex::new(PlaybackInner {
                    reader,
                    duration,
                    looping: config.looping,
                    playing: false,
                    anchor_position: TimeBase::ZERO,
                    anchor_instant: None,
                    generation: 0,
                }),
                config,
            }),
        };

        if !controller.ready() {
            let error = CaptureError::Playback(format!("cannot open {}", path.display()));
            controller.shared.post(move |d| d.on_error(&error));
        } else if controller.shared.config.autoplay {
            controller.play();
        }
        controller
    }

    pub fn ready(&self) -> bool {
        self.shared.inner.lock().reader.is_some()
    }

    pub fn playing(&self) -> bool {
        self.shared.inner.lock().playing
    }

    /// Length of the file in seconds.
    pub fn duration(&self) -> f64 {
        self.shared.inner.lock().duration.as_secs_f64()
    }

    /// Current position in seconds.
    pub fn position(&self) -> f64 {
        self.shared.inner.lock().position().as_secs_f64()
    }

    pub fn looping(&self) -> bool {
        self.shared.inner.lock().looping
    }

    pub fn set_looping(&self, looping: bool) {
        self.shared.inner.lock().looping = looping;
    }

    pub fn play(&self) {
        let generation = {
            let mut inner = self.shared.inner.lock();
            if inner.reader.is_none() {
                drop(inner);
                let error = CaptureError::Playback("nothing to play".into());
                self.shared.post(move |d| d.on_error(&error));
                return;
            }
            if inner.playing {
                return;
            }
            let start = if inner.position() >= inner.duration {
                TimeBase::ZERO
            } else {
                inner.position()
            };
            inner.playing = true;
            inner.reanchor(start);
            inner.generation += 1;
            inner.generation
        };

        self.shared.post(|d| d.on_buffering_started());
        self.shared.post(|d| d.on_buffering_finished());
        self.shared.post(|d| d.on_started());

        if let Err(e) = spawn_clock(Arc::downgrade(&self.shared), self.shared.config.tick_interval, generation) {
            log::error!("failed to spawn playback clock: {}", e);
            let mut inner = self.shared.inner.lock();
            inner.playing = false;
            inner.anchor_instant = None;
            drop(inner);
            let error = CaptureError::Playback(format!("failed to start playback clock: {}", e));
            self.shared.post(move |d| d.on_error(&error));
        }
    }

    pub fn pause(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if !inner.playing {
                return;
            }
            let position = inner.position();
            inner.playing = false;
            inner.reanchor(position);
            inner.generation += 1;
        }
        self.shared.post(|d| d.on_paused());
    }

    /// Jump to `seconds`, clamped to the file.
    pub fn seek(&self, seconds: f64) {
        let position = {
            let mut inner = self.shared.inner.lock();
            if inner.reader.is_none() {
                return;
            }
            let target = if seconds.is_finite() && seconds > 0.0 {
                TimeBase::from_nanos((seconds * 1e9) as i64).min(inner.duration)
            } else {
                TimeBase::ZERO
            };
            inner.reanchor(target);
            target
        };
        let seconds = position.as_secs_f64();
        self.shared.post(move |d| d.on_position(seconds));
    }

    /// Stop and rewind.
    pub fn stop(&self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.playing = false;
            inner.reanchor(TimeBase::ZERO);
            inner.generation += 1;
        }
        self.shared.post(|d| d.on_stopped());
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shared.inner.lock().generation += 1;
    }
}

fn spawn_clock(shared: Weak<PlaybackShared>, interval: std::time::Duration, generation: u64) -> std::io::Result<()> {
    thread::Builder::new().name("playback-clock".into()).spawn(move || loop {
        thread::sleep(interval);
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !shared.tick(generation) {
            return;
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::Frame;
    use crate::storage::container_writer::ContainerFileWriter;
    use crate::test_support::{temp_path, wait_for, Event, EventLog, UiExecutor};
    use crate::traits::container_sink::{ContainerSink, TrackSettings};
    use approx::assert_relative_eq;
    use std::fs;
    use std::time::Duration;

    /// A finalized audio-only file `tenths` tenths of a second long.
    fn recording(tenths: i64) -> PathBuf {
        let path = temp_path("playback.mcap");
        let mut writer = ContainerFileWriter::create(path.clone()).unwrap();
        writer
            .add_track(TrackSettings::Audio {
                sample_rate: 44_100,
                channels: 1,
            })
            .unwrap();
        writer.start_writing(TimeBase::ZERO).unwrap();
        for i in 0..tenths {
            writer
                .append(&Frame::audio(vec![0; 4], TimeBase::new(i, 10), TimeBase::new(1, 10)))
                .unwrap();
        }
        Box::new(writer).finish().unwrap();
        path
    }

    fn config(looping: bool) -> PlaybackConfiguration {
        PlaybackConfiguration {
            looping,
            autoplay: false,
            tick_interval: Duration::from_millis(10),
        }
    }

    fn open(path: &Path, config: PlaybackConfiguration) -> (PlaybackController, Arc<EventLog>, Arc<UiExecutor>) {
        let events = Arc::new(EventLog::default());
        let ui = UiExecutor::new();
        let player = PlaybackController::open(path, config, events.clone(), ui.clone());
        (player, events, ui)
    }

    #[test]
    fn missing_file_is_reported() {
        let (player, events, ui) = open(&temp_path("missing.mcap"), config(false));
        ui.flush();
        assert!(!player.ready());
        assert_eq!(events.errors().len(), 1);

        player.play();
        ui.flush();
        assert!(!player.playing());
        assert_eq!(events.errors().len(), 2);
    }

    #[test]
    fn plays_to_the_end_once() {
        let path = recording(3);
        let (player, events, ui) = open(&path, config(false));
        assert!(player.ready());
        assert_relative_eq!(player.duration(), 0.3);

        player.play();
        wait_for(|| events.count(&Event::PlaybackFinished) == 1);
        ui.flush();
        assert!(!player.playing());
        assert_relative_eq!(player.position(), 0.3);

        let all = events.events();
        assert_eq!(
            &all[..3],
            &[Event::BufferingStarted, Event::BufferingFinished, Event::PlaybackStarted]
        );
        let positions: Vec<f64> = all
            .iter()
            .filter_map(|e| match e {
                Event::Position(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[1] >= w[0]));
        assert_relative_eq!(*positions.last().unwrap(), 0.3);

        fs::remove_file(path).ok();
    }

    #[test]
    fn looping_restarts_until_stopped() {
        let path = recording(1);
        let (player, events, ui) = open(&path, config(true));
        assert!(player.looping());
        player.play();

        // Wrapped around at least once.
        wait_for(|| events.count(&Event::Position(0.0)) >= 1);
        assert!(player.playing());
        assert_eq!(events.count(&Event::PlaybackFinished), 0);

        player.stop();
        ui.flush();
        assert!(!player.playing());
        assert_eq!(player.position(), 0.0);
        assert_eq!(events.count(&Event::PlaybackStopped), 1);

        fs::remove_file(path).ok();
    }

    #[test]
    fn pause_freezes_position() {
        let path = recording(50);
        let (player, events, ui) = open(&path, config(false));
        player.play();
        thread::sleep(Duration::from_millis(30));
        player.pause();
        let frozen = player.position();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(player.position(), frozen);
        assert!(frozen > 0.0);
        ui.flush();
        assert_eq!(events.count(&Event::PlaybackPaused), 1);

        fs::remove_file(path).ok();
    }

    #[test]
    fn seek_is_clamped() {
        let path = recording(10);
        let (player, events, ui) = open(&path, config(false));

        player.seek(100.0);
        assert_relative_eq!(player.position(), 1.0);
        player.seek(-3.0);
        assert_eq!(player.position(), 0.0);
        player.seek(0.25);
        assert_relative_eq!(player.position(), 0.25);
        ui.flush();
        assert_eq!(
            events.events(),
            vec![Event::Position(1.0), Event::Position(0.0), Event::Position(0.25)]
        );

        fs::remove_file(path).ok();
    }

    #[test]
    fn autoplay_starts_immediately() {
        let path = recording(10);
        let config = PlaybackConfiguration {
            autoplay: true,
            ..config(false)
        };
        let (player, events, ui) = open(&path, config);
        assert!(player.playing());
        player.stop();
        ui.flush();
        assert_eq!(events.count(&Event::PlaybackStarted), 1);

        fs::remove_file(path).ok();
    }

    #[test]
    fn play_at_end_rewinds() {
        let path = recording(2);
        let (player, events, _ui) = open(&path, config(false));
        player.seek(1.0);
        player.play();
        assert!(player.position() < 0.2);
        wait_for(|| events.count(&Event::PlaybackFinished) == 1);

        fs::remove_file(path).ok();
    }
}
