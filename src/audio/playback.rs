//! Audio playback to output devices

use cpal::traits::{DeviceTrait, StreamTrait};

use super::buffer::{byte_ring, RingWriter};
use super::device::negotiate;
use super::format::AudioFormat;
use super::level::{fill_silence, needs_swap, swap_byte_order};
use super::{Direction, Notifier, Readiness};
use crate::error::AudioError;

/// Periods the playback buffer holds ahead of the device
const PLAYBACK_BUFFER_PERIODS: usize = 4;

/// Consumer of PCM bytes for a playback device. No method blocks.
pub trait PlaybackSink {
    /// Free space in the device buffer, in bytes
    fn bytes_free(&self) -> usize;

    /// Bytes in one device period
    fn period_size_bytes(&self) -> usize;

    /// Queue `data` for playback. Fails with [`AudioError::Overflow`] when
    /// `data` is larger than [`bytes_free`](Self::bytes_free).
    fn write(&mut self, data: &[u8]) -> Result<(), AudioError>;

    /// Format the device was opened with
    fn format(&self) -> &AudioFormat;

    /// Release the device. Calling it again does nothing.
    fn stop(&mut self);
}

/// Playback through a cpal output device
pub struct CpalPlayback {
    stream: Option<cpal::Stream>,
    ring: RingWriter,
    format: AudioFormat,
    device_name: String,
    period_bytes: usize,
}

impl CpalPlayback {
    /// Open `device` with `format` and start playing (silence until fed)
    pub fn open(
        device: cpal::Device,
        format: AudioFormat,
        period_frames: usize,
        notifier: Notifier,
    ) -> Result<Self, AudioError> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let negotiated = negotiate(&device, Direction::Output, &format, period_frames)?;
        let period_bytes = format.period_size_bytes(negotiated.period_frames);

        let (ring, mut reader) = byte_ring(period_bytes * PLAYBACK_BUFFER_PERIODS);
        let swap = needs_swap(&format);
        let sample_bytes = format.bytes_per_sample();
        let error_device = device_name.clone();

        let stream = device
            .build_output_stream_raw(
                &negotiated.config,
                negotiated.sample_format,
                move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                    let out = data.bytes_mut();
                    let n = reader.pop_into(out);
                    if n < out.len() {
                        fill_silence(&format, &mut out[n..]);
                    }
                    if swap {
                        swap_byte_order(sample_bytes, out);
                    }
                    notifier.notify(Readiness::PlaybackReady);
                },
                move |err| {
                    tracing::warn!("Playback stream error on {}: {}", error_device, err);
                },
                None,
            )
            .map_err(|e| AudioError::DeviceUnavailable(format!("{}: {}", device_name, e)))?;

        stream
            .play()
            .map_err(|e| AudioError::DeviceUnavailable(format!("{}: {}", device_name, e)))?;

        tracing::info!(
            "Playback started on {} ({}, {} bytes/period)",
            device_name,
            format,
            period_bytes
        );

        Ok(Self {
            stream: Some(stream),
            ring,
            format,
            device_name,
            period_bytes,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Callbacks that found less queued audio than the device asked for
    pub fn underruns(&self) -> usize {
        self.ring.underrun_count()
    }
}

impl PlaybackSink for CpalPlayback {
    fn bytes_free(&self) -> usize {
        if self.stream.is_none() {
            return 0;
        }
        self.ring.free()
    }

    fn period_size_bytes(&self) -> usize {
        self.period_bytes
    }

    fn write(&mut self, data: &[u8]) -> Result<(), AudioError> {
        let free = self.bytes_free();
        if data.len() > free {
            return Err(AudioError::Overflow {
                requested: data.len(),
                free,
            });
        }
        self.ring.push(data);
        Ok(())
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!(
                "Playback stopped on {} ({} underruns)",
                self.device_name,
                self.underruns()
            );
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
