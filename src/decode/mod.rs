//! Hardware and software decoder variants behind shared contracts.
//!
//! Each media kind exposes one trait (`VideoDecoder`, `AudioDecoder`,
//! `SubtitleDecoder`) with two implementations: a software decoder doing
//! the real work via `symphonia`, and a hardware decoder stub gated by an
//! injectable capability probe (see [`HardwareCapability`]). Track
//! activation picks between them; the controller doesn't otherwise care
//! which one it's holding.

pub mod audio;
pub mod subtitle;
pub mod video;

pub use audio::{AudioDecoder, AudioFrame, SampleFormat, SoftwareAudioDecoder};
pub use subtitle::{Cue, CueContent, SoftwareSubtitleDecoder, SubtitleDecoder};
pub use video::{HardwareVideoDecoder, SoftwareVideoDecoder, VideoDecoder, VideoFrame};

use crate::demux::StreamInfo;

/// Decides whether the hardware decoder variant should be attempted for
/// a given stream. Defaults to rejecting everything, since this crate
/// has no access to a real platform hardware-decode API; embedders
/// inject a real probe (or a test double) through [`HardwareCapability::custom`].
pub struct HardwareCapability(Box<dyn Fn(&StreamInfo) -> bool + Send + Sync>);

impl HardwareCapability {
    /// A capability probe that always reports no hardware support.
    #[must_use]
    pub fn none() -> Self {
        Self(Box::new(|_| false))
    }

    /// Wraps a caller-supplied probe function.
    pub fn custom(f: impl Fn(&StreamInfo) -> bool + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Reports whether `stream` can be handled by the hardware decoder.
    #[must_use]
    pub fn supports(&self, stream: &StreamInfo) -> bool {
        (self.0)(stream)
    }
}

impl Default for HardwareCapability {
    fn default() -> Self {
        Self::none()
    }
}
