//! A concrete [`crate::sink::AudioSink`] backed by `rodio`/`cpal`.
//!
//! Device selection mirrors the teacher's `Player::get_device`: a
//! `"[<host>][|<device>][|<sample rate>][|<sample format>]"` selector
//! string, case-insensitive, with every field optional. Playback itself
//! goes through a `rodio::queue` the same way the teacher queues decoded
//! track sources, except each enqueued item here is one already-decoded
//! [`AudioFrame`] rather than a whole track.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::buffer::SamplesBuffer;
use rodio::Sink;

use crate::decode::audio::AudioFrame;
use crate::error::{Error, Result};
use crate::sink::AudioSink;
use crate::util::ToF32;

/// Sample rates probed when enumerating output devices, matching the
/// ranges real audio hardware commonly supports.
const SAMPLE_RATES: [u32; 8] = [
    44_100, 48_000, 88_200, 96_000, 176_400, 192_000, 352_800, 384_000,
];

/// Parses a device selector string and opens the matching host/device.
///
/// # Errors
///
/// Returns [`crate::error::ErrorKind::NotFound`] if the host or device
/// named isn't present, or an error if the device's configuration can't
/// be read.
fn get_device(device: &str) -> Result<(rodio::Device, rodio::SupportedStreamConfig)> {
    let mut components = device.split('|');

    let host = match components.next() {
        Some("") | None => cpal::default_host(),
        Some(name) => cpal::available_hosts()
            .into_iter()
            .find_map(|host_id| {
                let host = cpal::host_from_id(host_id).ok()?;
                if host.id().name().eq_ignore_ascii_case(name) {
                    Some(host)
                } else {
                    None
                }
            })
            .ok_or_else(|| Error::not_found(format!("audio host {name} not found")))?,
    };

    let output_device = match components.next() {
        Some("") | None => host.default_output_device().ok_or_else(|| {
            Error::not_found(format!(
                "default audio output device not found on {}",
                host.id().name()
            ))
        })?,
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::not_found(e.to_string()))?;
            devices
                .find(|device| device.name().is_ok_and(|n| n.eq_ignore_ascii_case(name)))
                .ok_or_else(|| {
                    Error::not_found(format!(
                        "audio output device {name} not found on {}",
                        host.id().name()
                    ))
                })?
        }
    };

    let config = match components.next() {
        Some("") | None => output_device
            .default_output_config()
            .map_err(|e| Error::not_found(format!("default output configuration unavailable: {e}")))?,
        Some(rate) => {
            let rate: u32 = rate
                .parse()
                .map_err(|_| Error::fatal(format!("invalid sample rate {rate}")))?;
            let rate = cpal::SampleRate(rate);

            let format = match components.next() {
                Some("") | None => None,
                other => other,
            };

            output_device
                .supported_output_configs()
                .map_err(|e| Error::not_found(e.to_string()))?
                .find_map(|config| {
                    if format.is_none_or(|format| {
                        config.sample_format().to_string().eq_ignore_ascii_case(format)
                    }) {
                        config.try_with_sample_rate(rate)
                    } else {
                        None
                    }
                })
                .ok_or_else(|| {
                    Error::not_found(format!(
                        "audio output device {} does not support sample rate {} with {} sample format",
                        output_device.name().as_deref().unwrap_or("UNKNOWN"),
                        rate.0,
                        format.unwrap_or("default")
                    ))
                })?
        }
    };

    info!(
        "audio output device: {} on {}",
        output_device.name().as_deref().unwrap_or("UNKNOWN"),
        host.id().name()
    );

    Ok((output_device, config))
}

/// Lists available stereo output configurations across every host, the
/// default marked `(default)`, in the same selector-string shape
/// [`get_device`] parses.
#[must_use]
pub fn enumerate_devices() -> Vec<String> {
    let mut result = HashSet::new();

    let default_host = cpal::default_host();
    let default_device = default_host.default_output_device();
    let default_config = default_device
        .as_ref()
        .and_then(|device| device.default_output_config().ok());

    for host in cpal::available_hosts()
        .into_iter()
        .filter_map(|id| cpal::host_from_id(id).ok())
    {
        let Ok(devices) = host.output_devices() else {
            continue;
        };
        for device in devices {
            let Ok(configs) = device.supported_output_configs() else {
                continue;
            };
            let Ok(device_name) = device.name() else {
                continue;
            };
            for config in configs {
                for sample_rate in &SAMPLE_RATES {
                    if let Some(config) = config.clone().try_with_sample_rate(cpal::SampleRate(*sample_rate)) {
                        let mut line = format!(
                            "{}|{}|{}|{}",
                            host.id().name(),
                            device_name,
                            config.sample_rate().0,
                            config.sample_format(),
                        );

                        if default_host.id() == host.id()
                            && default_device
                                .as_ref()
                                .is_some_and(|d| d.name().is_ok_and(|n| n == device_name))
                            && default_config.as_ref().is_some_and(|c| *c == config)
                        {
                            line.push_str(" (default)");
                        }

                        result.insert(line);
                    }
                }
            }
        }
    }

    let mut result: Vec<String> = result.into_iter().collect();
    result.sort();
    result
}

/// Marks where in the sink's cumulative play position a given frame's
/// PTS begins, so [`RodioAudioSink::last_scheduled_pts`] can interpolate
/// between enqueue events.
struct Marker {
    position_at_enqueue: Duration,
    pts: f64,
}

/// Plays decoded [`AudioFrame`]s through a `rodio` output device.
pub struct RodioAudioSink {
    _stream: rodio::OutputStream,
    sink: Sink,
    queue_input: Arc<rodio::queue::SourcesQueueInput<f32>>,
    markers: VecDeque<Marker>,
    volume: f32,
    muted: bool,
}

impl RodioAudioSink {
    /// Opens `device` (see [`get_device`] for the selector syntax) and
    /// starts a paused sink ready to receive frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened or the output
    /// stream/sink cannot be created.
    pub fn open(device: &str) -> Result<Self> {
        let (device, config) = get_device(device)?;
        let (stream, handle) = rodio::OutputStream::try_from_device_config(&device, config)
            .map_err(|e| Error::fatal(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| Error::fatal(e.to_string()))?;

        let (queue_input, queue_output) = rodio::queue::queue(true);
        sink.append(queue_output);
        sink.pause();

        Ok(Self {
            _stream: stream,
            sink,
            queue_input,
            markers: VecDeque::new(),
            volume: 1.0,
            muted: false,
        })
    }

}

impl AudioSink for RodioAudioSink {
    fn enqueue(&mut self, frame: AudioFrame) {
        if self.markers.len() > 64 {
            self.markers.pop_front();
        }
        self.markers.push_back(Marker {
            position_at_enqueue: self.sink.get_pos(),
            pts: frame.pts,
        });

        let buffer = SamplesBuffer::new(frame.channels as u16, frame.sample_rate, frame.samples);
        self.queue_input.append(buffer);
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.sink.set_volume(if muted { 0.0 } else { self.volume });
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if !self.muted {
            self.sink.set_volume(self.volume);
        }
    }

    fn set_rate(&mut self, rate: f64) {
        self.sink.set_speed(rate.to_f32_lossy());
    }

    fn last_scheduled_pts(&self) -> Option<f64> {
        let position = self.sink.get_pos();
        self.markers
            .iter()
            .rev()
            .find(|marker| marker.position_at_enqueue <= position)
            .map(|marker| {
                marker.pts + (position - marker.position_at_enqueue).as_secs_f64()
            })
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn clear(&mut self) {
        self.sink.clear();
        self.markers.clear();
        let (queue_input, queue_output) = rodio::queue::queue(true);
        self.sink.append(queue_output);
        self.queue_input = queue_input;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_devices_does_not_panic() {
        // CI/headless environments may have zero output devices; this
        // only checks the call completes without error.
        let _ = enumerate_devices();
    }
}
