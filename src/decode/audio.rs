//! Audio decoding: shared contract plus the software (symphonia-backed)
//! and hardware (stub) variants.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::formats::Packet;

use crate::error::{Error, ErrorKind, Result};

/// Sample layout of a decoded audio frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SampleFormat {
    F32Planar,
    F32Interleaved,
}

/// A decoded audio frame. Owns its sample buffer until consumed by a sink.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    pub pts: f64,
    pub sample_rate: u32,
    pub channels: u32,
    pub format: SampleFormat,
    pub samples_per_channel: usize,
    pub samples: Vec<f32>,
}

/// Configuration passed to [`AudioDecoder::configure`].
#[derive(Clone, Debug, Default)]
pub struct AudioTrackConfig {
    pub codec_params: Option<CodecParameters>,
    pub downmix_to_stereo: bool,
}

/// Shared contract for both audio decoder variants.
pub trait AudioDecoder: Send {
    /// Prepares the decoder for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnsupportedCodec`] if this variant cannot
    /// handle the track's codec.
    fn configure(&mut self, config: &AudioTrackConfig) -> Result<()>;

    /// Submits one packet of compressed audio, invoking `on_data` for
    /// each decoded frame produced (typically one per call).
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
        on_data: &mut dyn FnMut(AudioFrame),
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

/// Software audio decoder backed by `symphonia`'s codec registry.
pub struct SoftwareAudioDecoder {
    decoder: Option<Box<dyn symphonia::core::codecs::Decoder>>,
    track_id: u32,
    downmix_to_stereo: bool,
    sample_buffer: Option<SampleBuffer<f32>>,
}

impl SoftwareAudioDecoder {
    /// Creates an unconfigured decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoder: None,
            track_id: 0,
            downmix_to_stereo: false,
            sample_buffer: None,
        }
    }
}

impl Default for SoftwareAudioDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDecoder for SoftwareAudioDecoder {
    fn configure(&mut self, config: &AudioTrackConfig) -> Result<()> {
        let params = config
            .codec_params
            .as_ref()
            .ok_or_else(|| Error::unsupported_codec("no codec parameters supplied"))?;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| Error::unsupported_codec(e.to_string()))?;

        self.decoder = Some(decoder);
        self.downmix_to_stereo = config.downmix_to_stereo;
        Ok(())
    }

    fn decode(
        &mut self,
        bytes: &[u8],
        pts: f64,
        _dts: f64,
        _keyframe: bool,
        on_data: &mut dyn FnMut(AudioFrame),
    ) -> Result<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| Error::invalid_state("decode() called before configure()"))?;

        let packet = Packet::new_from_slice(self.track_id, 0, 0, bytes);

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                return Err(Error::decode(e));
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;

        let buffer = self
            .sample_buffer
            .get_or_insert_with(|| SampleBuffer::new(duration, spec));
        buffer.copy_interleaved_ref(decoded);

        let channels = if self.downmix_to_stereo {
            2.min(spec.channels.count() as u32).max(1)
        } else {
            spec.channels.count() as u32
        };

        let samples = if self.downmix_to_stereo && spec.channels.count() > 2 {
            downmix_to_stereo(buffer.samples(), spec.channels.count())
        } else {
            buffer.samples().to_vec()
        };

        let samples_per_channel = if channels == 0 {
            0
        } else {
            samples.len() / channels as usize
        };

        on_data(AudioFrame {
            pts,
            sample_rate: spec.rate,
            channels,
            format: SampleFormat::F32Interleaved,
            samples_per_channel,
            samples,
        });

        Ok(())
    }

    fn flush(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
    }

    fn close(&mut self) {
        self.decoder = None;
        self.sample_buffer = None;
    }
}

fn downmix_to_stereo(samples: &[f32], input_channels: usize) -> Vec<f32> {
    if input_channels == 0 {
        return Vec::new();
    }
    let frames = samples.len() / input_channels;
    let mut out = Vec::with_capacity(frames * 2);
    for frame in samples.chunks_exact(input_channels) {
        let left = frame[0];
        let right = frame.get(1).copied().unwrap_or(left);
        out.push(left);
        out.push(right);
    }
    out
}

/// Hardware audio decoder stub. Always reports [`ErrorKind::UnsupportedCodec`]
/// unless the embedding host provides a real implementation; present so
/// the controller can treat hardware/software uniformly behind
/// [`crate::decode::HardwareCapability`].
pub struct HardwareAudioDecoder;

impl AudioDecoder for HardwareAudioDecoder {
    fn configure(&mut self, _config: &AudioTrackConfig) -> Result<()> {
        Err(Error::new(
            ErrorKind::UnsupportedCodec,
            "hardware audio decode is not available in this build",
        ))
    }

    fn decode(
        &mut self,
        _bytes: &[u8],
        _pts: f64,
        _dts: f64,
        _keyframe: bool,
        _on_data: &mut dyn FnMut(AudioFrame),
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
    fn configure_without_params_is_unsupported() {
        let mut decoder = SoftwareAudioDecoder::new();
        let err = decoder.configure(&AudioTrackConfig::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedCodec);
    }

    #[test]
    fn decode_before_configure_is_invalid_state() {
        let mut decoder = SoftwareAudioDecoder::new();
        let mut frames = Vec::new();
        let err = decoder
            .decode(&[0u8; 4], 0.0, 0.0, true, &mut |f| frames.push(f))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn downmix_averages_extra_channels_away() {
        // 4 channels, 2 frames, channel i = value i.
        let samples = vec![0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0];
        let stereo = downmix_to_stereo(&samples, 4);
        assert_eq!(stereo.len(), 4);
        assert_eq!(stereo[0], 0.0);
        assert_eq!(stereo[1], 1.0);
    }

    #[test]
    fn hardware_decoder_reports_unsupported() {
        let mut decoder = HardwareAudioDecoder;
        let err = decoder.configure(&AudioTrackConfig::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedCodec);
    }
}
