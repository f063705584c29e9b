//! Presentation contracts for video, audio, and subtitles.
//!
//! These are intentionally narrow: pixel-format conversion, the
//! WebGL/Canvas path, and Web-Audio-style graph construction belong to
//! the embedder, not the core.

use crate::decode::audio::AudioFrame;
use crate::decode::video::VideoFrame;

/// Takes ownership of decoded video frames and displays them atomically.
pub trait VideoSink: Send {
    /// Displays `frame`, releasing whatever frame was previously shown.
    fn present(&mut self, frame: VideoFrame);
}

/// Takes ownership of decoded audio frames, schedules their playback,
/// and reports progress back to the controller's clock.
pub trait AudioSink: Send {
    /// Enqueues `frame` for playback.
    fn enqueue(&mut self, frame: AudioFrame);

    /// Mutes or unmutes output without affecting the enqueue pipeline.
    fn set_muted(&mut self, muted: bool);

    /// Sets output volume, clamped to `[0.0, 1.0]`.
    fn set_volume(&mut self, volume: f32);

    /// Sets playback rate.
    fn set_rate(&mut self, rate: f64);

    /// PTS, in seconds, of the last sample actually committed to output.
    /// `None` before any sample has been committed.
    fn last_scheduled_pts(&self) -> Option<f64>;

    /// Resumes output, called when the controller enters `playing`.
    fn resume(&mut self);

    /// Pauses output without dropping queued frames, called when the
    /// controller enters `paused`.
    fn pause(&mut self);

    /// Drops all queued frames, called on seek.
    fn clear(&mut self);
}

/// Displays subtitle cues as either plain text or a bitmap overlay.
pub trait SubtitleSink: Send {
    /// Shows `text`, or clears the overlay when `None`.
    fn show_text(&mut self, text: Option<&str>);

    /// Shows an RGBA bitmap at `(x, y)`.
    fn show_image(&mut self, rgba: &[u8], width: u32, height: u32, x: i32, y: i32);

    /// Clears whatever is currently shown.
    fn clear(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingVideoSink {
        last: Option<VideoFrame>,
    }

    impl VideoSink for RecordingVideoSink {
        fn present(&mut self, frame: VideoFrame) {
            self.last = Some(frame);
        }
    }

    #[test]
    fn video_sink_present_replaces_last_frame() {
        let mut sink = RecordingVideoSink::default();
        sink.present(VideoFrame {
            pts: 1.0,
            width: 4,
            height: 4,
            rgba: vec![0; 64],
        });
        assert_eq!(sink.last.as_ref().unwrap().pts, 1.0);
    }

    #[derive(Default)]
    struct RecordingSubtitleSink {
        current: Option<String>,
    }

    impl SubtitleSink for RecordingSubtitleSink {
        fn show_text(&mut self, text: Option<&str>) {
            self.current = text.map(str::to_owned);
        }

        fn show_image(&mut self, _rgba: &[u8], _width: u32, _height: u32, _x: i32, _y: i32) {
            self.current = Some("<image>".to_owned());
        }

        fn clear(&mut self) {
            self.current = None;
        }
    }

    #[test]
    fn subtitle_sink_clear_removes_text() {
        let mut sink = RecordingSubtitleSink::default();
        sink.show_text(Some("hello"));
        sink.clear();
        assert!(sink.current.is_none());
    }
}
