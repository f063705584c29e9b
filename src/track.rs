//! Track selection across the three media kinds.
//!
//! At most one track is active per kind; subtitles may have none active.
//! Switching the active track is the track manager's job only in the
//! sense of bookkeeping — the controller is the one that actually flushes
//! and reconfigures the affected decoder, since only it owns decoder
//! instances.

use crate::demux::{StreamInfo, StreamKind};
use crate::error::{Error, Result};
use crate::events::Events;

/// The track manager's view of one demuxed stream.
#[derive(Clone, Debug)]
pub struct Track {
    pub index: u32,
    pub kind: StreamKind,
    pub info: StreamInfo,
}

/// Tracks enumerated tracks and which one is active per kind.
pub struct TrackManager {
    tracks: Vec<Track>,
    active_video: Option<u32>,
    active_audio: Option<u32>,
    active_subtitle: Option<u32>,
}

impl TrackManager {
    /// Creates an empty track manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            active_video: None,
            active_audio: None,
            active_subtitle: None,
        }
    }

    /// Registers the demuxer's enumerated tracks, applying the default
    /// selection policy: first video track active, first audio track
    /// active, subtitles off.
    pub fn set_tracks(&mut self, streams: &[StreamInfo], events: &Events) {
        self.tracks = streams
            .iter()
            .map(|info| Track {
                index: info.index,
                kind: info.kind,
                info: info.clone(),
            })
            .collect();

        self.active_video = self.tracks.iter().find(|t| t.kind == StreamKind::Video).map(|t| t.index);
        self.active_audio = self.tracks.iter().find(|t| t.kind == StreamKind::Audio).map(|t| t.index);
        self.active_subtitle = None;

        events.tracks_change.emit(&());
    }

    /// The currently active video track, if any.
    #[must_use]
    pub fn active_video(&self) -> Option<&Track> {
        self.active_video.and_then(|index| self.find(index))
    }

    /// The currently active audio track, if any.
    #[must_use]
    pub fn active_audio(&self) -> Option<&Track> {
        self.active_audio.and_then(|index| self.find(index))
    }

    /// The currently active subtitle track, if any.
    #[must_use]
    pub fn active_subtitle(&self) -> Option<&Track> {
        self.active_subtitle.and_then(|index| self.find(index))
    }

    /// Switches the active video track.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorKind::NotFound`] if `id` isn't a
    /// known video track.
    pub fn select_video(&mut self, id: u32, events: &Events) -> Result<()> {
        self.require_kind(id, StreamKind::Video)?;
        self.active_video = Some(id);
        events.tracks_change.emit(&());
        Ok(())
    }

    /// Switches the active audio track.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorKind::NotFound`] if `id` isn't a
    /// known audio track.
    pub fn select_audio(&mut self, id: u32, events: &Events) -> Result<()> {
        self.require_kind(id, StreamKind::Audio)?;
        self.active_audio = Some(id);
        events.audio_track_change.emit(&Some(id));
        Ok(())
    }

    /// Switches the active subtitle track, or turns subtitles off when
    /// `id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorKind::NotFound`] if `id` is `Some`
    /// and isn't a known subtitle track.
    pub fn select_subtitle(&mut self, id: Option<u32>, events: &Events) -> Result<()> {
        if let Some(id) = id {
            self.require_kind(id, StreamKind::Subtitle)?;
        }
        self.active_subtitle = id;
        events.subtitle_track_change.emit(&id);
        Ok(())
    }

    /// All registered tracks, in demuxer order.
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn find(&self, index: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.index == index)
    }

    fn require_kind(&self, id: u32, kind: StreamKind) -> Result<()> {
        match self.find(id) {
            Some(track) if track.kind == kind => Ok(()),
            Some(_) => Err(Error::not_found(format!("track {id} is not a {kind:?} track"))),
            None => Err(Error::not_found(format!("no track with id {id}"))),
        }
    }
}

impl Default for TrackManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::ColorTriple;

    fn stream(index: u32, kind: StreamKind) -> StreamInfo {
        StreamInfo {
            index,
            kind,
            codec_name: "test".to_owned(),
            profile: None,
            level: None,
            language: None,
            label: None,
            duration: None,
            bit_rate: None,
            extradata: Vec::new(),
            width: None,
            height: None,
            frame_rate: None,
            rotation: None,
            pixel_format: None,
            color_range: None,
            color: ColorTriple::default(),
            sample_rate: None,
            channels: None,
        }
    }

    #[test]
    fn set_tracks_selects_first_video_and_audio() {
        let mut manager = TrackManager::new();
        let events = Events::default();
        let streams = vec![
            stream(0, StreamKind::Video),
            stream(1, StreamKind::Audio),
            stream(2, StreamKind::Subtitle),
        ];
        manager.set_tracks(&streams, &events);

        assert_eq!(manager.active_video().unwrap().index, 0);
        assert_eq!(manager.active_audio().unwrap().index, 1);
        assert!(manager.active_subtitle().is_none());
    }

    #[test]
    fn select_audio_rejects_wrong_kind() {
        let mut manager = TrackManager::new();
        let events = Events::default();
        manager.set_tracks(&[stream(0, StreamKind::Video)], &events);

        assert!(manager.select_audio(0, &events).is_err());
    }

    #[test]
    fn select_subtitle_none_clears_selection() {
        let mut manager = TrackManager::new();
        let events = Events::default();
        manager.set_tracks(&[stream(0, StreamKind::Subtitle)], &events);

        manager.select_subtitle(Some(0), &events).unwrap();
        assert!(manager.active_subtitle().is_some());

        manager.select_subtitle(None, &events).unwrap();
        assert!(manager.active_subtitle().is_none());
    }
}
