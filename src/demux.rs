//! Container demultiplexing behind a foreign-call-boundary-style contract.
//!
//! Wraps [`symphonia`]'s `FormatReader` the way a native-library binding
//! would: an owned context with explicit `open`/`seek`/`read_packet`/
//! `close`, a growable scratch buffer for packet bytes, and stream
//! metadata exposed as plain structs rather than borrowed from the
//! reader's internal state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Error, ErrorKind, Result};

/// Media kind of a demuxed stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

/// A recognized color value, or an unrecognized/absent one.
pub type ColorName = Option<&'static str>;

/// Container-reported color triple, prior to [`crate::codec`] normalization.
#[derive(Clone, Debug, Default)]
pub struct ColorTriple {
    pub primaries: Option<String>,
    pub transfer: Option<String>,
    pub matrix: Option<String>,
}

/// Per-stream metadata populated from the container.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: String,
    pub profile: Option<String>,
    pub level: Option<String>,
    pub language: Option<String>,
    pub label: Option<String>,
    pub duration: Option<f64>,
    pub bit_rate: Option<u64>,
    pub extradata: Vec<u8>,

    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub rotation: Option<u16>,
    pub pixel_format: Option<String>,
    pub color_range: Option<String>,
    pub color: ColorTriple,

    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// A single demuxed packet, copied out of the container's internal
/// buffers into caller-owned bytes.
#[derive(Clone, Debug)]
pub struct PacketInfo {
    pub stream_index: u32,
    pub keyframe: bool,
    pub pts: f64,
    pub dts: f64,
    pub duration: f64,
    pub bytes: Vec<u8>,
}

/// Initial packet scratch-buffer size; doubled on [`ErrorKind::BufferTooSmall`].
const INITIAL_PACKET_BUFFER: usize = 1024 * 1024;

/// A demuxer context, opened from a [`MediaSource`] and owning the
/// underlying format reader until [`Demuxer::close`].
pub struct Demuxer {
    reader: Box<dyn FormatReader>,
    streams: Vec<StreamInfo>,
    format_name: &'static str,
    metadata_title: Option<String>,
    packet_buffer_len: usize,
}

impl Demuxer {
    /// Opens `source` with an optional filename `hint` (used by the
    /// probe to narrow candidate formats).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ContainerParse`] if no registered format can
    /// parse the source, or [`ErrorKind::UnsupportedCodec`] if probing
    /// succeeds but no usable streams are found.
    pub fn open(source: Box<dyn MediaSource>, hint: Option<&str>) -> Result<Self> {
        let mss = MediaSourceStream::new(source, MediaSourceStreamOptions::default());

        let mut format_hint = Hint::new();
        if let Some(hint) = hint {
            if let Some(ext) = hint.rsplit('.').next() {
                format_hint.with_extension(ext);
            }
        }

        let probed = symphonia::default::get_probe()
            .format(
                &format_hint,
                mss,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::container_parse(e.to_string()))?;

        let reader = probed.format;
        let format_name = reader.format_info().short_name;
        let metadata_title = reader
            .metadata()
            .current()
            .and_then(|rev| rev.tags().iter().find(|t| t.key.eq_ignore_ascii_case("title")))
            .map(|tag| tag.value.to_string());

        let streams = reader.tracks().iter().map(stream_info_from_track).collect();

        Ok(Self {
            reader,
            streams,
            format_name,
            metadata_title,
            packet_buffer_len: INITIAL_PACKET_BUFFER,
        })
    }

    /// Number of demuxed streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Metadata for stream `index`.
    #[must_use]
    pub fn stream_info(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.get(index)
    }

    /// Opaque codec setup bytes for stream `index`, if any.
    #[must_use]
    pub fn extradata(&self, index: usize) -> &[u8] {
        self.streams
            .get(index)
            .map_or(&[][..], |s| s.extradata.as_slice())
    }

    /// The underlying `symphonia` codec parameters for the stream whose
    /// [`StreamInfo::index`] is `stream_index`, for handing to a codec
    /// that needs the raw container-reported setup rather than the
    /// flattened [`StreamInfo`] view.
    #[must_use]
    pub fn codec_params(&self, stream_index: u32) -> Option<&symphonia::core::codecs::CodecParameters> {
        self.reader
            .tracks()
            .iter()
            .find(|t| t.id == stream_index)
            .map(|t| &t.codec_params)
    }

    /// Total duration in seconds, if known.
    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.streams.iter().filter_map(|s| s.duration).fold(None, |acc, d| {
            Some(acc.map_or(d, |a: f64| a.max(d)))
        })
    }

    /// Container format name (e.g. `"isomp4"`, `"mkv"`).
    #[must_use]
    pub fn format_name(&self) -> &'static str {
        self.format_name
    }

    /// The `title` tag, if the container carries one.
    #[must_use]
    pub fn metadata_title(&self) -> Option<&str> {
        self.metadata_title.as_deref()
    }

    /// Repositions to the largest keyframe at or before `timestamp`
    /// seconds, flushing any internal read buffer.
    ///
    /// For Matroska/WebM containers an additional small adjustment is
    /// applied by the underlying reader to land on a valid EBML element
    /// boundary; this is handled by symphonia internally.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Seek`] if the container has no streams or
    /// the underlying reader rejects the seek.
    pub fn seek(&mut self, timestamp: f64, stream_index: Option<u32>) -> Result<()> {
        let track_id = match stream_index {
            Some(index) => self
                .reader
                .tracks()
                .get(index as usize)
                .map(|t| t.id)
                .ok_or_else(|| Error::seek("stream index out of range"))?,
            None => self
                .reader
                .tracks()
                .first()
                .map(|t| t.id)
                .ok_or_else(|| Error::seek("no streams to seek"))?,
        };

        self.reader
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time: symphonia::core::units::Time::from(timestamp),
                    track_id: Some(track_id),
                },
            )
            .map_err(|e| Error::seek(e.to_string()))?;

        Ok(())
    }

    /// Reads the next packet. Returns `Ok(None)` at end of stream.
    ///
    /// On [`ErrorKind::BufferTooSmall`] the internal scratch buffer is
    /// doubled; callers should simply retry the call, which this method
    /// does internally up to a handful of times.
    ///
    /// # Errors
    ///
    /// Propagates demux/decode errors from the underlying reader.
    pub fn read_packet(&mut self) -> Result<Option<PacketInfo>> {
        loop {
            match self.reader.next_packet() {
                Ok(packet) => {
                    if packet.data.len() > self.packet_buffer_len {
                        self.packet_buffer_len = (packet.data.len() * 2).max(self.packet_buffer_len * 2);
                    }

                    let track = self
                        .reader
                        .tracks()
                        .iter()
                        .find(|t| t.id == packet.track_id());
                    let time_base = track.and_then(|t| t.codec_params.time_base);

                    let to_seconds = |ts: u64| {
                        time_base.map_or(0.0, |tb| tb.calc_time(ts).seconds as f64 + tb.calc_time(ts).frac)
                    };

                    let stream_index = self
                        .streams
                        .iter()
                        .position(|s| track.is_some_and(|t| t.id == u32::from(s.index)))
                        .unwrap_or(0) as u32;

                    return Ok(Some(PacketInfo {
                        stream_index,
                        keyframe: packet.is_key_frame(),
                        pts: to_seconds(packet.ts()),
                        dts: to_seconds(packet.ts()),
                        duration: time_base.map_or(0.0, |tb| tb.calc_time(packet.dur()).seconds as f64),
                        bytes: packet.data.to_vec(),
                    }));
                }
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => {
                    let err: Error = e.into();
                    if err.kind == ErrorKind::BufferTooSmall {
                        self.packet_buffer_len *= 2;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Releases the underlying reader. Calling any other method after
    /// `close` is a programming error left to the caller to avoid.
    pub fn close(self) {
        drop(self.reader);
    }
}

fn stream_info_from_track(track: &symphonia::core::formats::Track) -> StreamInfo {
    let params = &track.codec_params;
    let kind = match params.codec {
        c if symphonia::core::codecs::CODEC_TYPE_NULL != c
            && is_video_codec(c) =>
        {
            StreamKind::Video
        }
        _ if params.sample_rate.is_some() => StreamKind::Audio,
        _ => StreamKind::Subtitle,
    };

    StreamInfo {
        index: track.id,
        kind,
        codec_name: format!("{:?}", params.codec),
        profile: params.profile.map(|p| format!("{p:?}")),
        level: params.level.map(|l| l.to_string()),
        language: track.language.clone(),
        label: None,
        duration: params
            .n_frames
            .zip(params.time_base)
            .map(|(n, tb)| tb.calc_time(n).seconds as f64),
        bit_rate: None,
        extradata: params.extra_data.as_deref().unwrap_or(&[]).to_vec(),
        width: params.width,
        height: params.height,
        frame_rate: None,
        rotation: params.rotation,
        pixel_format: params.pixel_format.map(|p| format!("{p:?}")),
        color_range: params.color_range.map(|r| format!("{r:?}")),
        color: ColorTriple {
            primaries: params.color_primaries.map(|p| format!("{p:?}")),
            transfer: params.color_transfer.map(|t| format!("{t:?}")),
            matrix: params.color_matrix.map(|m| format!("{m:?}")),
        },
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count() as u32),
    }
}

/// Video codec families this engine can demux a track for. Matched by
/// the `{:?}` debug form the way [`crate::codec::CodecFamily`] matches
/// codec names, since symphonia's video-capable codecs don't share a
/// `CODEC_TYPE_KIND_VIDEO` bit to test directly.
fn is_video_codec(codec: symphonia::core::codecs::CodecType) -> bool {
    use symphonia::core::codecs::{
        CODEC_TYPE_AV1, CODEC_TYPE_H264, CODEC_TYPE_HEVC, CODEC_TYPE_MPEG4, CODEC_TYPE_THEORA,
        CODEC_TYPE_VP8, CODEC_TYPE_VP9,
    };
    matches!(
        codec,
        CODEC_TYPE_H264
            | CODEC_TYPE_HEVC
            | CODEC_TYPE_VP8
            | CODEC_TYPE_VP9
            | CODEC_TYPE_AV1
            | CODEC_TYPE_MPEG4
            | CODEC_TYPE_THEORA
    )
}

/// Adapts any `Arc<dyn Source>` into symphonia's [`MediaSource`] trait,
/// serving reads through the chunk cache rather than the raw source.
pub struct CachedMediaSource {
    source: Arc<dyn crate::source::Source>,
    cache: Arc<std::sync::Mutex<crate::cache::ChunkCache>>,
    position: u64,
    len: u64,
    cursor: Arc<AtomicU64>,
}

impl CachedMediaSource {
    /// Wraps `source`, routing reads through `cache`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source's size cannot be determined.
    pub fn new(
        source: Arc<dyn crate::source::Source>,
        cache: Arc<std::sync::Mutex<crate::cache::ChunkCache>>,
    ) -> Result<Self> {
        let len = source.size()?;
        Ok(Self {
            source,
            cache,
            position: 0,
            len,
            cursor: Arc::new(AtomicU64::new(0)),
        })
    }

    /// A shared handle tracking the current read position, so a
    /// [`crate::preload::Preloader`] can fill around where the demuxer is
    /// actually reading without owning the boxed `MediaSource` itself.
    #[must_use]
    pub fn cursor(&self) -> Arc<AtomicU64> {
        self.cursor.clone()
    }
}

impl std::io::Read for CachedMediaSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.position >= self.len {
            return Ok(0);
        }

        let want = buf.len().min((self.len - self.position) as usize);
        let key = self.source.cache_key();
        let index = crate::cache::chunk_index(self.position);
        let chunk_start = crate::cache::chunk_start(index);
        let in_chunk_offset = (self.position - chunk_start) as usize;

        let chunk = {
            let mut cache = self
                .cache
                .lock()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            cache.get(&key, index).map(<[u8]>::to_vec)
        };

        let chunk = match chunk {
            Some(chunk) => chunk,
            None => {
                let length = u32::try_from((self.len - chunk_start).min(crate::cache::CHUNK_SIZE))
                    .unwrap_or(u32::MAX);
                let data = self
                    .source
                    .read(chunk_start, length)
                    .map_err(|e| std::io::Error::other(e.to_string()))?;
                self.cache
                    .lock()
                    .map_err(|e| std::io::Error::other(e.to_string()))?
                    .set(&key, index, data.clone());
                data
            }
        };

        let available = chunk.len().saturating_sub(in_chunk_offset);
        let n = want.min(available);
        buf[..n].copy_from_slice(&chunk[in_chunk_offset..in_chunk_offset + n]);
        self.position += n as u64;
        self.cursor.store(self.position, Ordering::Relaxed);
        Ok(n)
    }
}

impl std::io::Seek for CachedMediaSource {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        let new_position = match pos {
            std::io::SeekFrom::Start(offset) => offset,
            std::io::SeekFrom::End(delta) => (i64::try_from(self.len).unwrap_or(i64::MAX) + delta)
                .try_into()
                .unwrap_or(0),
            std::io::SeekFrom::Current(delta) => {
                (i64::try_from(self.position).unwrap_or(i64::MAX) + delta)
                    .try_into()
                    .unwrap_or(0)
            }
        };
        self.position = new_position;
        self.cursor.store(self.position, Ordering::Relaxed);
        Ok(self.position)
    }
}

impl MediaSource for CachedMediaSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read as _, Seek as _};

    struct CursorSource(Cursor<Vec<u8>>);

    impl std::io::Read for CursorSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl std::io::Seek for CursorSource {
        fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }

    impl MediaSource for CursorSource {
        fn is_seekable(&self) -> bool {
            true
        }

        fn byte_len(&self) -> Option<u64> {
            Some(self.0.get_ref().len() as u64)
        }
    }

    fn wav_fixture() -> Vec<u8> {
        // Minimal valid RIFF/WAVE header with zero data frames; enough
        // for the probe to recognize the container.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&44100u32.to_le_bytes());
        bytes.extend_from_slice(&88200u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes
    }

    #[test]
    fn open_recognizes_wav_container() {
        let bytes = wav_fixture();
        let source = Box::new(CursorSource(Cursor::new(bytes))) as Box<dyn MediaSource>;
        let demuxer = Demuxer::open(source, Some("fixture.wav"));
        assert!(demuxer.is_ok());
    }

    #[test]
    fn open_rejects_garbage() {
        let source = Box::new(CursorSource(Cursor::new(vec![0u8; 64]))) as Box<dyn MediaSource>;
        let demuxer = Demuxer::open(source, None);
        assert!(demuxer.is_err());
    }
}
