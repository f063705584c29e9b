//! Video decoding: shared contract plus the software (`ffmpeg-next`
//! `send_packet`/`receive_frame`) and hardware (stub) variants.

use ffmpeg_next as ffmpeg;

use crate::codec::codec_string;
use crate::demux::StreamInfo;
use crate::error::{Error, ErrorKind, Result};

/// Packed RGBA frame, owned until handed to the video sink.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub pts: f64,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Configuration passed to [`VideoDecoder::configure`].
#[derive(Clone, Debug, Default)]
pub struct VideoTrackConfig {
    pub target_fps: Option<f64>,
}

/// Shared contract for both video decoder variants.
pub trait VideoDecoder: Send {
    /// Prepares the decoder for `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnsupportedCodec`] if this variant cannot
    /// handle the track's codec.
    fn configure(&mut self, stream: &StreamInfo, config: &VideoTrackConfig) -> Result<()>;

    /// Submits one packet; ordering must follow DTS. Decoded frames are
    /// reported through `on_frame` in roughly PTS-increasing order,
    /// subject to the decoder's own B-frame reordering.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Decode`] on a packet-level failure.
    fn decode(
        &mut self,
        bytes: &[u8],
        pts: f64,
        dts: f64,
        keyframe: bool,
        on_frame: &mut dyn FnMut(VideoFrame),
    ) -> Result<()>;

    /// Drains internal queues without emitting new frames.
    fn flush(&mut self);

    /// Equivalent to `flush()` followed by clearing any queued outputs.
    fn reset(&mut self) {
        self.flush();
    }

    /// Releases decoder resources.
    fn close(&mut self);
}

/// Caps decoded width for software decode; taller/wider sources are
/// proportionally downscaled to keep main-thread work bounded.
const MAX_SOFTWARE_WIDTH: u32 = 1920;

/// Target fraction of the frame period below which an emitted frame is
/// considered "too close" to the previous one and skipped when a target
/// frame rate is configured.
const EMIT_THROTTLE_FACTOR: f64 = 0.9;

/// Below this target frame rate, non-reference frames are discarded by
/// the underlying codec to reduce CPU use (ambient/thumbnail use case).
const LOW_FPS_THRESHOLD: f64 = 10.0;

/// Software video decoder backed by `ffmpeg-next`.
pub struct SoftwareVideoDecoder {
    decoder: Option<ffmpeg::decoder::Video>,
    scaler: Option<ffmpeg::software::scaling::Context>,
    track_id: u32,
    target_fps: Option<f64>,
    last_emitted_pts: Option<f64>,
    out_width: u32,
    out_height: u32,
}

impl SoftwareVideoDecoder {
    /// Creates an unconfigured decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoder: None,
            scaler: None,
            track_id: 0,
            target_fps: None,
            last_emitted_pts: None,
            out_width: 0,
            out_height: 0,
        }
    }

    fn should_throttle(&self, pts: f64) -> bool {
        let Some(fps) = self.target_fps else { return false };
        let Some(last) = self.last_emitted_pts else { return false };
        if fps <= 0.0 {
            return false;
        }
        (pts - last).abs() < EMIT_THROTTLE_FACTOR * (1.0 / fps)
    }
}

impl Default for SoftwareVideoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for SoftwareVideoDecoder {
    fn configure(&mut self, stream: &StreamInfo, config: &VideoTrackConfig) -> Result<()> {
        let codec_id = codec_id_for(stream)?;
        let codec = ffmpeg::decoder::find(codec_id)
            .ok_or_else(|| Error::unsupported_codec(format!("no ffmpeg decoder for {codec_id:?}")))?;

        let context = ffmpeg::codec::context::Context::new_with_codec(codec);
        let mut decoder = context
            .decoder()
            .video()
            .map_err(|e| Error::unsupported_codec(e.to_string()))?;

        if let Some(fps) = config.target_fps {
            if fps > 0.0 && fps < LOW_FPS_THRESHOLD {
                decoder.set_skip_frame(ffmpeg::discard::Discard::NonRef);
            }
        }

        let width = stream.width.unwrap_or(decoder.width());
        let height = stream.height.unwrap_or(decoder.height());
        let (out_width, out_height) = downscale_to_cap(width, height, MAX_SOFTWARE_WIDTH);

        self.out_width = out_width;
        self.out_height = out_height;
        self.target_fps = config.target_fps;
        self.track_id = stream.index;
        self.decoder = Some(decoder);
        self.scaler = None;
        Ok(())
    }

    fn decode(
        &mut self,
        bytes: &[u8],
        pts: f64,
        _dts: f64,
        _keyframe: bool,
        on_frame: &mut dyn FnMut(VideoFrame),
    ) -> Result<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| Error::invalid_state("decode() called before configure()"))?;

        let packet = ffmpeg::Packet::copy(bytes);
        decoder
            .send_packet(&packet)
            .map_err(|e| Error::decode(e.to_string()))?;

        let mut decoded = ffmpeg::frame::Video::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            if self.should_throttle(pts) {
                continue;
            }

            let scaler = self.scaler.get_or_insert_with(|| {
                ffmpeg::software::scaling::Context::get(
                    decoder.format(),
                    decoder.width(),
                    decoder.height(),
                    ffmpeg::format::Pixel::RGBA,
                    self.out_width,
                    self.out_height,
                    ffmpeg::software::scaling::Flags::BILINEAR,
                )
                .expect("scaler construction with fixed RGBA target should not fail")
            });

            let mut rgba_frame = ffmpeg::frame::Video::empty();
            scaler
                .run(&decoded, &mut rgba_frame)
                .map_err(|e| Error::decode(e.to_string()))?;

            let stride = rgba_frame.stride(0);
            let width = self.out_width as usize;
            let height = self.out_height as usize;
            let mut rgba = Vec::with_capacity(width * height * 4);
            let data = rgba_frame.data(0);
            for row in 0..height {
                let start = row * stride;
                rgba.extend_from_slice(&data[start..start + width * 4]);
            }

            self.last_emitted_pts = Some(pts);
            on_frame(VideoFrame {
                pts,
                width: self.out_width,
                height: self.out_height,
                rgba,
            });
        }

        Ok(())
    }

    fn flush(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
    }

    fn close(&mut self) {
        self.decoder = None;
        self.scaler = None;
    }
}

fn downscale_to_cap(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scale = f64::from(max_width) / f64::from(width);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled_height = (f64::from(height) * scale).round() as u32;
    (max_width, scaled_height.max(1))
}

fn codec_id_for(stream: &StreamInfo) -> Result<ffmpeg::codec::Id> {
    use crate::codec::CodecFamily;
    match CodecFamily::from_internal_name(&stream.codec_name) {
        CodecFamily::H264 => Ok(ffmpeg::codec::Id::H264),
        CodecFamily::Hevc => Ok(ffmpeg::codec::Id::HEVC),
        CodecFamily::Vp8 => Ok(ffmpeg::codec::Id::VP8),
        CodecFamily::Vp9 => Ok(ffmpeg::codec::Id::VP9),
        CodecFamily::Av1 => Ok(ffmpeg::codec::Id::AV1),
        CodecFamily::Mpeg4 => Ok(ffmpeg::codec::Id::MPEG4),
        CodecFamily::Theora => Ok(ffmpeg::codec::Id::THEORA),
        _ => Err(Error::unsupported_codec(format!(
            "{} is not a known video codec",
            stream.codec_name
        ))),
    }
}

/// Hardware video decoder stub. Reports [`ErrorKind::UnsupportedCodec`]
/// unless the embedding host substitutes a real implementation; gated
/// by [`crate::decode::HardwareCapability`] before the controller ever
/// configures it.
pub struct HardwareVideoDecoder;

impl VideoDecoder for HardwareVideoDecoder {
    fn configure(&mut self, stream: &StreamInfo, _config: &VideoTrackConfig) -> Result<()> {
        Err(Error::new(
            ErrorKind::UnsupportedCodec,
            format!(
                "hardware decode for {} ({}) is not available in this build",
                stream.codec_name,
                codec_string(stream)
            ),
        ))
    }

    fn decode(
        &mut self,
        _bytes: &[u8],
        _pts: f64,
        _dts: f64,
        _keyframe: bool,
        _on_frame: &mut dyn FnMut(VideoFrame),
    ) -> Result<()> {
        Err(Error::invalid_state("hardware decoder never configured"))
    }

    fn flush(&mut self) {}

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downscale_preserves_aspect_ratio() {
        let (w, h) = downscale_to_cap(3840, 2160, 1920);
        assert_eq!(w, 1920);
        assert_eq!(h, 1080);
    }

    #[test]
    fn downscale_is_noop_under_cap() {
        let (w, h) = downscale_to_cap(1280, 720, 1920);
        assert_eq!((w, h), (1280, 720));
    }

    #[test]
    fn hardware_decoder_reports_unsupported() {
        let stream = StreamInfo {
            index: 0,
            kind: crate::demux::StreamKind::Video,
            codec_name: "h264".to_owned(),
            profile: None,
            level: None,
            language: None,
            label: None,
            duration: None,
            bit_rate: None,
            extradata: Vec::new(),
            width: Some(1920),
            height: Some(1080),
            frame_rate: None,
            rotation: None,
            pixel_format: None,
            color_range: None,
            color: crate::demux::ColorTriple::default(),
            sample_rate: None,
            channels: None,
        };
        let mut decoder = HardwareVideoDecoder;
        let err = decoder.configure(&stream, &VideoTrackConfig::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedCodec);
    }
}
