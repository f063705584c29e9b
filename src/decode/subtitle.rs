//! Subtitle decoding: text and bitmap cues behind one contract.

use crate::codec::CodecFamily;
use crate::demux::StreamInfo;
use crate::error::{Error, ErrorKind, Result};

/// Either a text cue or a bitmap cue; matches what the source codec
/// family can actually produce (see [`CodecFamily::is_image_subtitle`]).
#[derive(Clone, Debug)]
pub enum CueContent {
    Text(String),
    Image {
        rgba: Vec<u8>,
        width: u32,
        height: u32,
        x: i32,
        y: i32,
    },
}

/// A decoded subtitle cue with explicit source-time bounds.
#[derive(Clone, Debug)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub content: CueContent,
}

/// Shared contract for subtitle decoding.
pub trait SubtitleDecoder: Send {
    /// Prepares the decoder for `stream`. Returns `Ok(false)` (not an
    /// error) if the codec is recognized but not compiled into this
    /// build, matching the native-library "not available" case.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnsupportedCodec`] if the codec is not a
    /// known subtitle family at all.
    fn configure(&mut self, stream: &StreamInfo, extradata: &[u8]) -> Result<bool>;

    /// Submits one packet; on success, emits zero or one cue through
    /// `on_cue`. Callers must treat a cue's buffers as released once
    /// `on_cue` returns (mirrors `freeSubtitle()` in the native contract).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Decode`] on a packet-level failure.
    fn decode(
        &mut self,
        bytes: &[u8],
        pts: f64,
        duration: Option<f64>,
        on_cue: &mut dyn FnMut(Cue),
    ) -> Result<()>;

    /// Releases decoder resources.
    fn close(&mut self);
}

/// Software subtitle decoder. Handles text-based families directly
/// (`SubRip`, `WebVTT`, `ASS`/`SSA`, `MOV` text) by treating the packet
/// payload as UTF-8; bitmap families (PGS, DVD, DVB) require a real
/// bitmap subtitle renderer that this build does not provide.
pub struct SoftwareSubtitleDecoder {
    family: CodecFamily,
}

impl SoftwareSubtitleDecoder {
    /// Creates an unconfigured decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            family: CodecFamily::Unknown,
        }
    }
}

impl Default for SoftwareSubtitleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SubtitleDecoder for SoftwareSubtitleDecoder {
    fn configure(&mut self, stream: &StreamInfo, _extradata: &[u8]) -> Result<bool> {
        let family = CodecFamily::from_internal_name(&stream.codec_name);
        self.family = family;

        if family.is_image_subtitle() {
            // Recognized, but this build has no bitmap subtitle renderer.
            return Ok(false);
        }

        match family {
            CodecFamily::SubRip | CodecFamily::WebVtt | CodecFamily::Ass | CodecFamily::Ssa | CodecFamily::MovText => {
                Ok(true)
            }
            _ => Err(Error::unsupported_codec(format!(
                "{} is not a known subtitle codec",
                stream.codec_name
            ))),
        }
    }

    fn decode(
        &mut self,
        bytes: &[u8],
        pts: f64,
        duration: Option<f64>,
        on_cue: &mut dyn FnMut(Cue),
    ) -> Result<()> {
        if self.family.is_image_subtitle() {
            return Err(Error::unsupported_codec("bitmap subtitle decode is not available in this build"));
        }

        let text = strip_markup(
            std::str::from_utf8(bytes).map_err(|e| Error::decode(e.to_string()))?,
        );
        let end = pts + duration.unwrap_or(0.0);

        on_cue(Cue {
            start: pts,
            end,
            content: CueContent::Text(text),
        });
        Ok(())
    }

    fn close(&mut self) {
        self.family = CodecFamily::Unknown;
    }
}

/// Strips the handful of inline markup tags `ASS`/`SSA` and `WebVTT`
/// cues commonly carry (`{\...}`, `<...>`), leaving plain text.
fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth_brace = 0u32;
    let mut depth_angle = 0u32;
    for ch in raw.chars() {
        match ch {
            '{' => depth_brace += 1,
            '}' => depth_brace = depth_brace.saturating_sub(1),
            '<' => depth_angle += 1,
            '>' => depth_angle = depth_angle.saturating_sub(1),
            _ if depth_brace == 0 && depth_angle == 0 => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subrip_stream() -> StreamInfo {
        StreamInfo {
            index: 0,
            kind: crate::demux::StreamKind::Subtitle,
            codec_name: "subrip".to_owned(),
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
            color: crate::demux::ColorTriple::default(),
            sample_rate: None,
            channels: None,
        }
    }

    #[test]
    fn configure_accepts_subrip() {
        let mut decoder = SoftwareSubtitleDecoder::new();
        assert!(decoder.configure(&subrip_stream(), &[]).unwrap());
    }

    #[test]
    fn configure_reports_unavailable_for_image_subs() {
        let mut stream = subrip_stream();
        stream.codec_name = "pgs".to_owned();
        let mut decoder = SoftwareSubtitleDecoder::new();
        assert!(!decoder.configure(&stream, &[]).unwrap());
    }

    #[test]
    fn decode_emits_one_text_cue() {
        let mut decoder = SoftwareSubtitleDecoder::new();
        decoder.configure(&subrip_stream(), &[]).unwrap();

        let mut cues = Vec::new();
        decoder
            .decode(b"Hello, world!", 1.0, Some(2.0), &mut |cue| cues.push(cue))
            .unwrap();

        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].start, 1.0);
        assert_eq!(cues[0].end, 3.0);
        match &cues[0].content {
            CueContent::Text(text) => assert_eq!(text, "Hello, world!"),
            CueContent::Image { .. } => panic!("expected text cue"),
        }
    }

    #[test]
    fn strip_markup_removes_ass_override_blocks() {
        assert_eq!(strip_markup("{\\b1}Bold{\\b0} text"), "Bold text");
    }

    #[test]
    fn strip_markup_removes_vtt_tags() {
        assert_eq!(strip_markup("<b>Hi</b> there"), "Hi there");
    }
}
