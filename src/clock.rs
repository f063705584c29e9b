//! The audio-master playback clock.
//!
//! Tracks media time as a linear function of wall time: `mediaTime =
//! mediaOrigin + rate * (now - wallOrigin)` while running, frozen at
//! `mediaOrigin` while paused. The audio sink periodically corrects
//! `mediaOrigin` to the PTS of the last submitted sample; with no audio
//! track (or muted), the controller instead feeds it the last video
//! frame's PTS, so the clock always has a master time source.

use std::time::Instant;

/// Wall-clock-driven media time tracker.
#[derive(Debug)]
pub struct Clock {
    wall_origin: Instant,
    media_origin: f64,
    rate: f64,
    paused: bool,
}

impl Clock {
    /// Creates a paused clock at media time `0.0`, rate `1.0`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            wall_origin: Instant::now(),
            media_origin: 0.0,
            rate: 1.0,
            paused: true,
        }
    }

    /// Starts (or resumes) the clock at `media_time_at_start` and `rate`.
    pub fn start(&mut self, media_time_at_start: f64, rate: f64) {
        self.wall_origin = Instant::now();
        self.media_origin = media_time_at_start;
        self.rate = rate;
        self.paused = false;
    }

    /// Freezes the clock at its current media time.
    pub fn pause(&mut self) {
        self.media_origin = self.current_media_time();
        self.paused = true;
    }

    /// Changes playback rate without losing the current media time.
    pub fn set_rate(&mut self, rate: f64) {
        let now = self.current_media_time();
        self.media_origin = now;
        self.wall_origin = Instant::now();
        self.rate = rate;
    }

    /// Repositions the clock's media time to `media_time`, preserving
    /// running/paused state.
    pub fn seek(&mut self, media_time: f64) {
        self.media_origin = media_time;
        self.wall_origin = Instant::now();
    }

    /// Corrects the running origin to `media_time` as reported by the
    /// clock master (audio sink, or last video frame PTS with no audio).
    /// A no-op while paused.
    pub fn correct(&mut self, media_time: f64) {
        if !self.paused {
            self.media_origin = media_time;
            self.wall_origin = Instant::now();
        }
    }

    /// Current media time in seconds.
    #[must_use]
    pub fn current_media_time(&self) -> f64 {
        if self.paused {
            self.media_origin
        } else {
            self.media_origin + self.rate * self.wall_origin.elapsed().as_secs_f64()
        }
    }

    /// Current playback rate.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Whether the clock is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn paused_clock_reports_fixed_media_time() {
        let clock = Clock::new();
        assert_eq!(clock.current_media_time(), 0.0);
        assert!(clock.is_paused());
    }

    #[test]
    fn running_clock_advances_with_rate() {
        let mut clock = Clock::new();
        clock.start(10.0, 1.0);
        sleep(Duration::from_millis(20));
        assert!(clock.current_media_time() >= 10.0);
    }

    #[test]
    fn pause_freezes_current_time() {
        let mut clock = Clock::new();
        clock.start(0.0, 1.0);
        sleep(Duration::from_millis(20));
        clock.pause();
        let t1 = clock.current_media_time();
        sleep(Duration::from_millis(20));
        let t2 = clock.current_media_time();
        assert_eq!(t1, t2);
    }

    #[test]
    fn set_rate_preserves_current_media_time() {
        let mut clock = Clock::new();
        clock.start(0.0, 1.0);
        sleep(Duration::from_millis(10));
        let before = clock.current_media_time();
        clock.set_rate(2.0);
        let after = clock.current_media_time();
        assert!((after - before).abs() < 0.05);
        assert_eq!(clock.rate(), 2.0);
    }

    #[test]
    fn seek_sets_media_time_immediately() {
        let mut clock = Clock::new();
        clock.start(0.0, 1.0);
        clock.seek(42.0);
        assert!((clock.current_media_time() - 42.0).abs() < 0.01);
    }

    #[test]
    fn correct_is_noop_while_paused() {
        let mut clock = Clock::new();
        clock.pause();
        clock.correct(99.0);
        assert_eq!(clock.current_media_time(), 0.0);
    }
}
