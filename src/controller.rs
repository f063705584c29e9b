//! The playback state machine: the one place all observable state
//! changes go through.
//!
//! Owns the demuxer, track manager, clock, decoders, and presentation
//! queues, and drives them through the documented state graph. Nothing
//! outside the controller is allowed to push packets to a decoder or
//! hand a frame to a sink directly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::ChunkCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::decode::audio::{AudioDecoder, AudioTrackConfig, SoftwareAudioDecoder};
use crate::decode::subtitle::{Cue, SoftwareSubtitleDecoder, SubtitleDecoder};
use crate::decode::video::{SoftwareVideoDecoder, VideoDecoder, VideoFrame, VideoTrackConfig};
use crate::demux::{CachedMediaSource, Demuxer, StreamKind};
use crate::error::{Error, ErrorKind, Result};
use crate::events::{ErrorEvent, Events};
use crate::preload::Preloader;
use crate::sink::{AudioSink, SubtitleSink, VideoSink};
use crate::source::Source;
use crate::track::TrackManager;

/// Authoritative playback states.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Buffering,
    Seeking,
    Ended,
    Error,
}

/// Policy applied when the hardware decoder rejects a codec at configure
/// time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FallbackPolicy {
    /// Reconfigure with the software decoder and resume silently.
    Auto,
    /// Enter `error` with a recoverable flag; an external action must
    /// re-enter via software explicitly.
    Manual,
}

/// Maximum contiguous per-packet decode errors tolerated before the
/// controller gives up and transitions to `error`.
const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 16;

/// Maximum frames held in the video presentation queue before the
/// packet pump backpressures.
const MAX_QUEUED_VIDEO_FRAMES: usize = 32;

/// Assumed frame period when none is known yet, for the "drop frames
/// older than one frame period" rule.
const DEFAULT_FRAME_PERIOD: f64 = 1.0 / 30.0;

/// How many [`Controller::pump_once`] calls between preload fills. The
/// fill itself is cheap when the window is already warm (one cache
/// lookup per chunk), so this just bounds the lock-contention rate
/// against the demuxer's own reads.
const PUMPS_PER_PRELOAD: u32 = 8;

/// The pipeline orchestrator.
pub struct Controller {
    state: State,
    resume_state: Option<State>,
    fallback_policy: FallbackPolicy,

    demuxer: Option<Demuxer>,
    tracks: TrackManager,
    clock: Clock,
    events: Arc<Events>,

    cache: Arc<Mutex<ChunkCache>>,
    preloader: Option<Preloader>,
    read_cursor: Option<Arc<AtomicU64>>,
    pumps_since_preload: u32,
    preload_chunks_ahead: u64,
    preload_chunks_behind: u64,
    downmix_to_stereo: bool,
    video_fps_cap: Option<f64>,

    video_decoder: Option<Box<dyn VideoDecoder>>,
    audio_decoder: Option<Box<dyn AudioDecoder>>,
    subtitle_decoder: Option<Box<dyn SubtitleDecoder>>,

    video_queue: VecDeque<VideoFrame>,
    cues: Vec<Cue>,
    last_displayed_pts: Option<f64>,
    frame_period: f64,

    video_sink: Option<Box<dyn VideoSink>>,
    audio_sink: Option<Box<dyn AudioSink>>,
    subtitle_sink: Option<Box<dyn SubtitleSink>>,

    loop_enabled: bool,
    consecutive_decode_errors: u32,
    buffered_end_pts: f64,
}

impl Controller {
    /// Creates a controller with no source loaded, reading tuning knobs
    /// (cache capacity, preload window, downmix policy, fps cap) from
    /// `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            state: State::Idle,
            resume_state: None,
            fallback_policy: config.fallback_policy.into(),
            demuxer: None,
            tracks: TrackManager::new(),
            clock: Clock::new(),
            events: Arc::new(Events::default()),
            cache: Arc::new(Mutex::new(ChunkCache::new(config.cache_capacity_bytes))),
            preloader: None,
            read_cursor: None,
            pumps_since_preload: 0,
            preload_chunks_ahead: config.preload_chunks_ahead,
            preload_chunks_behind: config.preload_chunks_behind,
            downmix_to_stereo: config.downmix_to_stereo,
            video_fps_cap: config.video_fps_cap,
            video_decoder: None,
            audio_decoder: None,
            subtitle_decoder: None,
            video_queue: VecDeque::new(),
            cues: Vec::new(),
            last_displayed_pts: None,
            frame_period: DEFAULT_FRAME_PERIOD,
            video_sink: None,
            audio_sink: None,
            subtitle_sink: None,
            loop_enabled: false,
            consecutive_decode_errors: 0,
            buffered_end_pts: 0.0,
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// The event fan-out for this controller.
    #[must_use]
    pub fn events(&self) -> Arc<Events> {
        self.events.clone()
    }

    /// Sets the fallback policy applied on hardware decode rejection.
    pub fn set_fallback_policy(&mut self, policy: FallbackPolicy) {
        self.fallback_policy = policy;
    }

    /// Enables or disables looping on EOF.
    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    /// Installs the presentation sinks. Safe to call before or after load.
    pub fn set_sinks(
        &mut self,
        video: Option<Box<dyn VideoSink>>,
        audio: Option<Box<dyn AudioSink>>,
        subtitle: Option<Box<dyn SubtitleSink>>,
    ) {
        self.video_sink = video;
        self.audio_sink = audio;
        self.subtitle_sink = subtitle;
    }

    fn transition(&mut self, next: State) {
        self.state = next;
        self.events.state_change.emit(&next);
    }

    fn fail(&mut self, error: Error) {
        self.events.error.emit(&ErrorEvent {
            kind: error.kind,
            message: error.to_string(),
        });
        self.transition(State::Error);
    }

    /// `idle --load()--> loading`, then opens the source and, on
    /// success, `loading --open ok--> ready`; on failure,
    /// `loading --fail--> error`.
    ///
    /// # Errors
    ///
    /// Returns the same error reflected into the `error` event and state.
    pub async fn load(&mut self, source: Arc<dyn Source>) -> Result<()> {
        if self.state != State::Idle {
            return Err(Error::invalid_state("load() requires the idle state"));
        }

        self.transition(State::Loading);
        self.events.load_start.emit(&());

        match self.open(source).await {
            Ok(()) => {
                self.transition(State::Ready);
                self.events.load_end.emit(&());
                if let Some(duration) = self.demuxer.as_ref().and_then(Demuxer::duration) {
                    self.events.duration_change.emit(&duration);
                }
                Ok(())
            }
            Err(err) => {
                self.fail(Error::new(ErrorKind::Fatal, err.to_string()));
                Err(err)
            }
        }
    }

    async fn open(&mut self, source: Arc<dyn Source>) -> Result<()> {
        let cached = CachedMediaSource::new(source.clone(), self.cache.clone())?;
        self.read_cursor = Some(cached.cursor());
        self.preloader = Some(Preloader::with_window(
            source,
            self.cache.clone(),
            self.preload_chunks_ahead,
            self.preload_chunks_behind,
        ));

        let demuxer = Demuxer::open(Box::new(cached), None)?;

        self.tracks.set_tracks(
            &(0..demuxer.stream_count())
                .filter_map(|i| demuxer.stream_info(i).cloned())
                .collect::<Vec<_>>(),
            &self.events,
        );

        self.demuxer = Some(demuxer);
        self.configure_active_decoders()?;
        Ok(())
    }

    fn configure_active_decoders(&mut self) -> Result<()> {
        if let Some(video) = self.tracks.active_video().cloned() {
            let mut decoder: Box<dyn VideoDecoder> = Box::new(SoftwareVideoDecoder::new());
            decoder.configure(
                &video.info,
                &VideoTrackConfig { target_fps: self.video_fps_cap },
            )?;
            self.video_decoder = Some(decoder);
        }

        if let Some(audio) = self.tracks.active_audio().cloned() {
            let mut decoder: Box<dyn AudioDecoder> = Box::new(SoftwareAudioDecoder::new());
            let codec_params = self
                .demuxer
                .as_ref()
                .and_then(|d| d.codec_params(audio.index))
                .cloned();
            decoder.configure(&AudioTrackConfig {
                codec_params,
                downmix_to_stereo: self.downmix_to_stereo,
            })?;
            self.audio_decoder = Some(decoder);
        }

        Ok(())
    }

    /// `ready --play()--> playing`, `paused --play()--> playing`, and
    /// `ended --play()--> playing` (with an implicit seek to `0`).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidState`] from any other state.
    pub async fn play(&mut self) -> Result<()> {
        match self.state {
            State::Ready | State::Paused => {
                self.clock.start(self.clock.current_media_time(), self.clock.rate());
                if let Some(sink) = self.audio_sink.as_mut() {
                    sink.resume();
                }
                self.transition(State::Playing);
                Ok(())
            }
            State::Ended => {
                self.seek(0.0).await?;
                self.clock.start(0.0, self.clock.rate());
                if let Some(sink) = self.audio_sink.as_mut() {
                    sink.resume();
                }
                self.transition(State::Playing);
                Ok(())
            }
            _ => Err(Error::invalid_state("play() requires ready, paused, or ended")),
        }
    }

    /// `playing --pause()--> paused`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidState`] from any other state.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != State::Playing {
            return Err(Error::invalid_state("pause() requires playing"));
        }
        self.clock.pause();
        if let Some(sink) = self.audio_sink.as_mut() {
            sink.pause();
        }
        self.transition(State::Paused);
        Ok(())
    }

    /// Sets playback rate without flushing anything.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidState`] while idle or loading.
    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        if matches!(self.state, State::Idle | State::Loading) {
            return Err(Error::invalid_state("set_rate() requires a loaded source"));
        }
        self.clock.set_rate(rate);
        if let Some(sink) = self.audio_sink.as_mut() {
            sink.set_rate(rate);
        }
        Ok(())
    }

    /// `{playing,paused,ready} --seek(t)--> seeking`, then back to the
    /// state it was in before the seek.
    ///
    /// # Errors
    ///
    /// Propagates demuxer seek failures; on failure the controller stays
    /// in whatever state it was in (recoverable, per the design note on
    /// seek failure).
    pub async fn seek(&mut self, target: f64) -> Result<()> {
        if !matches!(self.state, State::Playing | State::Paused | State::Ready) {
            return Err(Error::invalid_state("seek() requires playing, paused, or ready"));
        }

        self.resume_state = Some(self.state);
        self.transition(State::Seeking);

        let active_video = self.tracks.active_video().map(|t| t.index);
        let result = self
            .demuxer
            .as_mut()
            .ok_or_else(|| Error::invalid_state("no demuxer loaded"))?
            .seek(target, active_video);

        if let Err(err) = result {
            let resume = self.resume_state.take().unwrap_or(State::Ready);
            self.transition(resume);
            return Err(err);
        }

        if let Some(decoder) = self.video_decoder.as_mut() {
            decoder.reset();
        }
        if let Some(decoder) = self.audio_decoder.as_mut() {
            decoder.reset();
        }
        self.video_queue.clear();
        self.cues.retain(|cue| cue.end >= target);
        if let Some(sink) = self.audio_sink.as_mut() {
            sink.clear();
        }

        if let Some(video_index) = active_video {
            if self.video_decoder.is_some() {
                self.decode_video_to_target(video_index, target)?;
            }
        }

        self.clock.seek(target);
        self.last_displayed_pts = None;

        if let Some(frame) = self.video_queue.pop_front() {
            self.last_displayed_pts = Some(frame.pts);
            if let Some(sink) = self.video_sink.as_mut() {
                sink.present(frame);
            }
        }

        let resume = self.resume_state.take().unwrap_or(State::Ready);
        self.transition(resume);
        Ok(())
    }

    /// Decodes and discards video packets on `track_index` from the
    /// keyframe the demuxer just landed on, until the first decoded
    /// frame at or after `target`. That frame (and any later frame
    /// decoded alongside it) is left at the front of the video queue for
    /// [`Self::seek`] to display immediately, satisfying "first
    /// displayed frame after a seek has `pts >= target`".
    fn decode_video_to_target(&mut self, track_index: u32, target: f64) -> Result<()> {
        loop {
            let packet = {
                let demuxer = self
                    .demuxer
                    .as_mut()
                    .ok_or_else(|| Error::invalid_state("no demuxer loaded"))?;
                match demuxer.read_packet()? {
                    Some(packet) => packet,
                    None => break,
                }
            };

            if packet.stream_index != track_index {
                continue;
            }

            if let Some(decoder) = self.video_decoder.as_mut() {
                let queue = &mut self.video_queue;
                decoder.decode(&packet.bytes, packet.pts, packet.dts, packet.keyframe, &mut |frame| {
                    let pos = queue.iter().position(|f| f.pts > frame.pts).unwrap_or(queue.len());
                    queue.insert(pos, frame);
                })?;
            }

            if self.video_queue.iter().any(|frame| frame.pts >= target) {
                break;
            }
            self.video_queue.clear();
        }

        self.video_queue.retain(|frame| frame.pts >= target);
        Ok(())
    }

    /// Switches the active audio track, flushing and reconfiguring the
    /// audio decoder, then performing an implicit seek to the current
    /// media time so the new decoder starts from a keyframe.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::track::TrackManager::select_audio`] and seek
    /// errors.
    pub async fn select_audio_track(&mut self, id: u32) -> Result<()> {
        self.tracks.select_audio(id, &self.events)?;
        if let Some(decoder) = self.audio_decoder.as_mut() {
            decoder.close();
        }
        let mut decoder = SoftwareAudioDecoder::new();
        let codec_params = self.demuxer.as_ref().and_then(|d| d.codec_params(id)).cloned();
        decoder.configure(&AudioTrackConfig {
            codec_params,
            downmix_to_stereo: self.downmix_to_stereo,
        })?;
        self.audio_decoder = Some(Box::new(decoder));
        let current = self.clock.current_media_time();
        self.seek(current).await
    }

    /// Switches the active video track, flushing and reconfiguring the
    /// video decoder, then performing an implicit seek to the current
    /// media time so the new decoder starts from a keyframe.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::track::TrackManager::select_video`] and seek
    /// errors.
    pub async fn select_video_track(&mut self, id: u32) -> Result<()> {
        self.tracks.select_video(id, &self.events)?;
        if let Some(decoder) = self.video_decoder.as_mut() {
            decoder.close();
        }
        let mut decoder: Box<dyn VideoDecoder> = Box::new(SoftwareVideoDecoder::new());
        if let Some(video) = self.tracks.active_video().cloned() {
            decoder.configure(
                &video.info,
                &VideoTrackConfig { target_fps: self.video_fps_cap },
            )?;
        }
        self.video_decoder = Some(decoder);
        let current = self.clock.current_media_time();
        self.seek(current).await
    }

    /// Switches the active subtitle track, or turns subtitles off when
    /// `id` is `None`. Does not flush the subtitle decoder's already
    /// buffered cues older than the current media time; [`Self::seek`]
    /// already prunes those.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::track::TrackManager::select_subtitle`].
    pub fn select_subtitle_track(&mut self, id: Option<u32>) -> Result<()> {
        self.tracks.select_subtitle(id, &self.events)?;
        if let Some(decoder) = self.subtitle_decoder.as_mut() {
            decoder.close();
        }
        self.subtitle_decoder = match self.tracks.active_subtitle().cloned() {
            Some(subtitle) => {
                let mut decoder: Box<dyn SubtitleDecoder> = Box::new(SoftwareSubtitleDecoder::new());
                decoder.configure(&subtitle.info, &subtitle.info.extradata)?;
                Some(decoder)
            }
            None => None,
        };
        self.cues.clear();
        Ok(())
    }

    /// Reads one packet from the demuxer and routes it to the matching
    /// decoder, or handles end-of-stream. Returns `false` at EOF.
    ///
    /// # Errors
    ///
    /// Propagates demuxer I/O errors. Per-packet decode errors are
    /// absorbed here up to [`MAX_CONSECUTIVE_DECODE_ERRORS`], after which
    /// the controller transitions to `error`.
    pub async fn pump_once(&mut self) -> Result<bool> {
        if self.video_queue.len() >= MAX_QUEUED_VIDEO_FRAMES {
            // Backpressure: let the presentation tick drain frames first.
            return Ok(true);
        }

        self.pumps_since_preload += 1;
        if self.pumps_since_preload >= PUMPS_PER_PRELOAD {
            self.pumps_since_preload = 0;
            if let (Some(preloader), Some(cursor)) = (self.preloader.as_ref(), self.read_cursor.as_ref()) {
                preloader.fill_around(cursor.load(Ordering::Relaxed)).await?;
            }
        }

        let Some(demuxer) = self.demuxer.as_mut() else {
            return Err(Error::invalid_state("no demuxer loaded"));
        };

        let packet = match demuxer.read_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                if self.state == State::Playing && !self.loop_enabled {
                    self.transition(State::Ended);
                }
                if self.state == State::Playing && self.loop_enabled {
                    self.seek(0.0).await?;
                }
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        let active_video = self.tracks.active_video().map(|t| t.index);
        let active_audio = self.tracks.active_audio().map(|t| t.index);
        let active_subtitle = self.tracks.active_subtitle().map(|t| t.index);

        let kind = self
            .tracks
            .tracks()
            .iter()
            .find(|t| t.index == packet.stream_index)
            .map(|t| t.kind);

        let decode_result = match kind {
            Some(StreamKind::Video) if Some(packet.stream_index) == active_video => {
                if let Some(decoder) = self.video_decoder.as_mut() {
                    let queue = &mut self.video_queue;
                    decoder.decode(&packet.bytes, packet.pts, packet.dts, packet.keyframe, &mut |frame| {
                        let pos = queue.iter().position(|f| f.pts > frame.pts).unwrap_or(queue.len());
                        queue.insert(pos, frame);
                    })
                } else {
                    Ok(())
                }
            }
            Some(StreamKind::Audio) if Some(packet.stream_index) == active_audio => {
                if let Some(decoder) = self.audio_decoder.as_mut() {
                    let mut frames = Vec::new();
                    let result = decoder.decode(
                        &packet.bytes,
                        packet.pts,
                        packet.dts,
                        packet.keyframe,
                        &mut |frame| frames.push(frame),
                    );

                    for frame in frames {
                        let pts = frame.pts;
                        if let Some(sink) = self.audio_sink.as_mut() {
                            sink.enqueue(frame);
                        }
                        // With no audio sink attached, the decoded PTS is
                        // the best available master-clock correction.
                        let master_pts = self
                            .audio_sink
                            .as_ref()
                            .and_then(|s| s.last_scheduled_pts())
                            .unwrap_or(pts);
                        self.clock.correct(master_pts);
                    }

                    result
                } else {
                    Ok(())
                }
            }
            Some(StreamKind::Subtitle) if Some(packet.stream_index) == active_subtitle => {
                if let Some(decoder) = self.subtitle_decoder.as_mut() {
                    let cues = &mut self.cues;
                    decoder.decode(&packet.bytes, packet.pts, Some(packet.duration), &mut |cue| {
                        let pos = cues.iter().position(|c| c.start > cue.start).unwrap_or(cues.len());
                        cues.insert(pos, cue);
                    })
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        };

        if let Err(err) = decode_result {
            if err.kind == ErrorKind::Decode {
                self.consecutive_decode_errors += 1;
                if self.consecutive_decode_errors > MAX_CONSECUTIVE_DECODE_ERRORS {
                    self.fail(err);
                    return Ok(false);
                }
            } else {
                return Err(err);
            }
        } else {
            self.consecutive_decode_errors = 0;
        }

        self.buffered_end_pts = self.buffered_end_pts.max(packet.pts);
        Ok(true)
    }

    /// Runs one presentation tick: selects the video frame whose PTS is
    /// at or before the clock's current time (and whose successor's PTS
    /// is after it), handing it to the video sink if it differs from the
    /// last displayed frame. Drops frames more than one frame period
    /// stale.
    pub fn tick(&mut self) {
        let now = self.clock.current_media_time();

        while let Some(front) = self.video_queue.front() {
            if now - front.pts > self.frame_period {
                self.video_queue.pop_front();
            } else {
                break;
            }
        }

        let selected_index = self
            .video_queue
            .iter()
            .enumerate()
            .take_while(|(_, frame)| frame.pts <= now)
            .last()
            .map(|(i, _)| i);

        if let Some(index) = selected_index {
            let pts = self.video_queue[index].pts;
            if self.last_displayed_pts != Some(pts) {
                if let Some(frame) = self.video_queue.remove(index) {
                    if let Some(sink) = self.video_sink.as_mut() {
                        sink.present(frame);
                    }
                    self.last_displayed_pts = Some(pts);
                }
            }
        }

        if let Some(sink) = self.subtitle_sink.as_mut() {
            match self.cues.iter().find(|cue| cue.start <= now && now <= cue.end) {
                Some(cue) => match &cue.content {
                    crate::decode::subtitle::CueContent::Text(text) => sink.show_text(Some(text)),
                    crate::decode::subtitle::CueContent::Image { rgba, width, height, x, y } => {
                        sink.show_image(rgba, *width, *height, *x, *y);
                    }
                },
                None => sink.show_text(None),
            }
        }

        self.events.time_update.emit(&now);
    }

    /// Latest contiguous buffered PTS end, for progress/UI consumption.
    #[must_use]
    pub fn buffered_end(&self) -> f64 {
        self.buffered_end_pts
    }

    /// `* --close--> idle`. Releases decoders and the demuxer.
    pub fn close(&mut self) {
        if let Some(decoder) = self.video_decoder.as_mut() {
            decoder.close();
        }
        if let Some(decoder) = self.audio_decoder.as_mut() {
            decoder.close();
        }
        if let Some(decoder) = self.subtitle_decoder.as_mut() {
            decoder.close();
        }
        self.video_decoder = None;
        self.audio_decoder = None;
        self.subtitle_decoder = None;
        self.demuxer = None;
        self.preloader = None;
        self.read_cursor = None;
        self.pumps_since_preload = 0;
        self.video_queue.clear();
        self.cues.clear();
        self.consecutive_decode_errors = 0;
        self.resume_state = None;
        self.transition(State::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_controller_starts_idle() {
        let controller = Controller::new(&Config::default());
        assert_eq!(controller.state(), State::Idle);
    }

    #[tokio::test]
    async fn play_before_load_is_invalid_state() {
        let mut controller = Controller::new(&Config::default());
        let err = controller.play().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn pause_before_playing_is_invalid_state() {
        let mut controller = Controller::new(&Config::default());
        let err = controller.pause().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn close_resets_to_idle() {
        let mut controller = Controller::new(&Config::default());
        controller.close();
        assert_eq!(controller.state(), State::Idle);
    }
}
