//! Codec identification and color-space normalization.
//!
//! Maps the demuxer's raw, container-specific codec/color names onto the
//! fixed vocabularies the rest of the pipeline relies on, and derives the
//! handful of values (HDR-ness, text-vs-image subtitle class) that later
//! stages need but the container doesn't state directly.

use crate::demux::{ColorTriple, StreamInfo, StreamKind};

/// Canonical codec family, independent of container-specific spelling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CodecFamily {
    H264,
    Hevc,
    Vp8,
    Vp9,
    Av1,
    Mpeg4,
    Theora,
    Aac,
    Mp3,
    Opus,
    Flac,
    Vorbis,
    Ac3,
    Eac3,
    Dts,
    Pcm,
    SubRip,
    Ass,
    Ssa,
    WebVtt,
    Pgs,
    DvdSub,
    DvbSub,
    MovText,
    Unknown,
}

impl CodecFamily {
    /// Classifies a subtitle family as image-based or text-based.
    #[must_use]
    pub fn is_image_subtitle(self) -> bool {
        matches!(self, Self::Pgs | Self::DvdSub | Self::DvbSub)
    }

    /// Maps a symphonia-reported codec name to a canonical family.
    ///
    /// Symphonia's `{:?}` debug form for codec types is used as the
    /// lookup key since the crate does not expose stable string names
    /// for every codec it registers.
    #[must_use]
    pub fn from_internal_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("h264") || lower.contains("avc") {
            Self::H264
        } else if lower.contains("hevc") || lower.contains("h265") {
            Self::Hevc
        } else if lower.contains("vp8") {
            Self::Vp8
        } else if lower.contains("vp9") {
            Self::Vp9
        } else if lower.contains("av1") {
            Self::Av1
        } else if lower.contains("mpeg4") || lower.contains("mpeg-4") {
            Self::Mpeg4
        } else if lower.contains("theora") {
            Self::Theora
        } else if lower.contains("aac") {
            Self::Aac
        } else if lower.contains("mp3") || lower.contains("mpa") {
            Self::Mp3
        } else if lower.contains("opus") {
            Self::Opus
        } else if lower.contains("flac") {
            Self::Flac
        } else if lower.contains("vorbis") {
            Self::Vorbis
        } else if lower.contains("eac3") || lower.contains("e-ac-3") {
            Self::Eac3
        } else if lower.contains("ac3") {
            Self::Ac3
        } else if lower.contains("dts") {
            Self::Dts
        } else if lower.contains("pcm") {
            Self::Pcm
        } else if lower.contains("subrip") || lower.contains("srt") {
            Self::SubRip
        } else if lower.contains("ssa") {
            Self::Ssa
        } else if lower.contains("ass") {
            Self::Ass
        } else if lower.contains("webvtt") || lower.contains("vtt") {
            Self::WebVtt
        } else if lower.contains("pgs") || lower.contains("hdmv") {
            Self::Pgs
        } else if lower.contains("dvd") {
            Self::DvdSub
        } else if lower.contains("dvb") {
            Self::DvbSub
        } else if lower.contains("mov_text") || lower.contains("movtext") {
            Self::MovText
        } else {
            Self::Unknown
        }
    }
}

/// Normalized color primaries vocabulary.
pub const PRIMARIES: &[&str] = &["bt709", "bt2020", "bt470bg", "smpte170m"];

/// Normalized transfer-function vocabulary.
pub const TRANSFERS: &[&str] = &[
    "bt709",
    "smpte170m",
    "smpte2084",
    "arib-std-b67",
    "linear",
    "iec61966-2-1",
];

/// Normalized matrix-coefficients vocabulary.
pub const MATRICES: &[&str] = &["bt709", "bt2020-ncl", "bt2020-cl", "smpte170m", "bt470bg"];

fn normalize(raw: &str, vocabulary: &[&'static str]) -> Option<&'static str> {
    let lower = raw.to_ascii_lowercase();
    let remapped = match lower.as_str() {
        "bt2020nc" => "bt2020-ncl",
        "bt2020c" => "bt2020-cl",
        other => other,
    };
    vocabulary.iter().copied().find(|&v| v == remapped)
}

/// A color triple after mapping to the fixed output vocabularies; any
/// field the container reported but couldn't be mapped becomes `None`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NormalizedColor {
    pub primaries: Option<&'static str>,
    pub transfer: Option<&'static str>,
    pub matrix: Option<&'static str>,
}

/// Normalizes a container-reported color triple to the fixed vocabularies.
#[must_use]
pub fn normalize_color(raw: &ColorTriple) -> NormalizedColor {
    NormalizedColor {
        primaries: raw.primaries.as_deref().and_then(|p| normalize(p, PRIMARIES)),
        transfer: raw.transfer.as_deref().and_then(|t| normalize(t, TRANSFERS)),
        matrix: raw.matrix.as_deref().and_then(|m| normalize(m, MATRICES)),
    }
}

/// Width/height threshold above which a `bt709`-tagged stream triggers
/// the extradata-based HDR fallback heuristic.
const UHD_WIDTH: u32 = 3840;
const UHD_HEIGHT: u32 = 2160;

/// Determines whether a video stream is HDR, applying the container's
/// reported color triple, a UHD + `bt709` fallback heuristic, and
/// finally an HDR10 default for 10-bit HEVC with no usable color data.
///
/// `probe_extradata` is invoked only in the fallback path and should
/// attempt to recover `{primaries, transfer, matrix}` from VUI/SPS; it
/// may return `None` if no usable data is present.
#[must_use]
pub fn is_hdr(
    stream: &StreamInfo,
    color: NormalizedColor,
    is_10bit: bool,
    probe_extradata: impl FnOnce(&[u8]) -> Option<NormalizedColor>,
) -> bool {
    if matches!(color.transfer, Some("smpte2084" | "arib-std-b67")) {
        return true;
    }
    if matches!(color.primaries, Some("bt2020")) {
        return true;
    }

    let is_uhd = stream.width.unwrap_or(0) >= UHD_WIDTH && stream.height.unwrap_or(0) >= UHD_HEIGHT;
    if matches!(color.primaries, Some("bt709") | None) && is_uhd {
        if let Some(recovered) = probe_extradata(&stream.extradata) {
            return matches!(recovered.transfer, Some("smpte2084" | "arib-std-b67"))
                || matches!(recovered.primaries, Some("bt2020"));
        }
        if is_10bit && CodecFamily::from_internal_name(&stream.codec_name) == CodecFamily::Hevc {
            return true;
        }
    }

    false
}

/// Synthesizes a WebCodecs-style codec string for the handful of
/// families that need profile/level/tier encoded (currently HEVC).
#[must_use]
pub fn codec_string(stream: &StreamInfo) -> String {
    let family = CodecFamily::from_internal_name(&stream.codec_name);
    match family {
        CodecFamily::Hevc => hevc_codec_string(stream),
        _ => stream.codec_name.clone(),
    }
}

fn hevc_codec_string(stream: &StreamInfo) -> String {
    let profile = stream
        .profile
        .as_deref()
        .and_then(|p| p.trim_start_matches(|c: char| !c.is_ascii_digit()).parse::<u8>().ok())
        .unwrap_or(1);
    let level = stream
        .level
        .as_deref()
        .and_then(|l| l.parse::<f32>().ok())
        .map_or(93, |l| (l * 30.0).round() as u32);

    // General profile space 0 ("unspecified"), main tier ("L").
    format!("hev1.{profile}.4.L{level}.B0")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_with(width: u32, height: u32, codec: &str, profile: Option<&str>) -> StreamInfo {
        StreamInfo {
            index: 0,
            kind: StreamKind::Video,
            codec_name: codec.to_owned(),
            profile: profile.map(str::to_owned),
            level: None,
            language: None,
            label: None,
            duration: None,
            bit_rate: None,
            extradata: Vec::new(),
            width: Some(width),
            height: Some(height),
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
    fn maps_internal_names_to_families() {
        assert_eq!(CodecFamily::from_internal_name("CODEC_TYPE_HEVC"), CodecFamily::Hevc);
        assert_eq!(CodecFamily::from_internal_name("mp3"), CodecFamily::Mp3);
        assert_eq!(CodecFamily::from_internal_name("totally_unknown"), CodecFamily::Unknown);
    }

    #[test]
    fn remaps_bt2020_variants() {
        let raw = ColorTriple {
            primaries: Some("bt2020nc".to_owned()),
            transfer: Some("bt2020nc".to_owned()),
            matrix: Some("bt2020nc".to_owned()),
        };
        let normalized = normalize_color(&raw);
        assert_eq!(normalized.matrix, Some("bt2020-ncl"));
    }

    #[test]
    fn hdr_true_for_smpte2084_transfer() {
        let stream = stream_with(1920, 1080, "hevc", None);
        let color = NormalizedColor {
            transfer: Some("smpte2084"),
            ..Default::default()
        };
        assert!(is_hdr(&stream, color, true, |_| None));
    }

    #[test]
    fn hdr_falls_back_to_hdr10_for_uhd_10bit_hevc_with_no_color_data() {
        let stream = stream_with(UHD_WIDTH, UHD_HEIGHT, "hevc", None);
        assert!(is_hdr(&stream, NormalizedColor::default(), true, |_| None));
    }

    #[test]
    fn hdr_false_for_sdr_1080p() {
        let stream = stream_with(1920, 1080, "h264", None);
        assert!(!is_hdr(&stream, NormalizedColor::default(), false, |_| None));
    }

    #[test]
    fn hevc_codec_string_encodes_profile_and_level() {
        let stream = stream_with(1920, 1080, "hevc", Some("1"));
        assert!(codec_string(&stream).starts_with("hev1.1.4.L"));
    }

    #[test]
    fn image_subtitle_classification() {
        assert!(CodecFamily::Pgs.is_image_subtitle());
        assert!(!CodecFamily::SubRip.is_image_subtitle());
    }
}
