//! Audio capture from input devices
//!
//! A capture source starts buffering as soon as it is opened and keeps doing
//! so until stopped, whether or not anyone reads. Readers must drain it on
//! every readiness event or the ring overflows and audio is lost.

use cpal::traits::{DeviceTrait, StreamTrait};
use std::path::Path;
use std::time::Instant;

use super::buffer::{byte_ring, RingReader};
use super::device::negotiate;
use super::format::AudioFormat;
use super::level::{needs_swap, swap_byte_order};
use super::{Direction, Notifier, Readiness};
use crate::error::AudioError;

/// Periods of captured audio the ring holds before dropping
const CAPTURE_BUFFER_PERIODS: usize = 16;

/// Producer of captured PCM bytes. No method blocks.
pub trait CaptureSource {
    /// Bytes buffered and readable right now (0 is valid)
    fn bytes_ready(&self) -> usize;

    /// Read up to `out.len()` bytes, returning how many were read
    fn read(&mut self, out: &mut [u8]) -> usize;

    /// Format the device was opened with
    fn format(&self) -> &AudioFormat;

    /// Release the device. Calling it again does nothing.
    fn stop(&mut self);
}

/// Capture from a cpal input device
pub struct CpalCapture {
    stream: Option<cpal::Stream>,
    ring: RingReader,
    format: AudioFormat,
    device_name: String,
    period_frames: usize,
}

impl CpalCapture {
    /// Open `device` with `format` and start capturing
    pub fn open(
        device: cpal::Device,
        format: AudioFormat,
        period_frames: usize,
        notifier: Notifier,
    ) -> Result<Self, AudioError> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let negotiated = negotiate(&device, Direction::Input, &format, period_frames)?;

        let (mut writer, ring) = byte_ring(
            format.period_size_bytes(negotiated.period_frames) * CAPTURE_BUFFER_PERIODS,
        );
        let swap = needs_swap(&format);
        let sample_bytes = format.bytes_per_sample();
        let mut scratch: Vec<u8> = Vec::new();
        let error_device = device_name.clone();

        let stream = device
            .build_input_stream_raw(
                &negotiated.config,
                negotiated.sample_format,
                move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                    let bytes = data.bytes();
                    if swap {
                        scratch.clear();
                        scratch.extend_from_slice(bytes);
                        swap_byte_order(sample_bytes, &mut scratch);
                        writer.push(&scratch);
                    } else {
                        writer.push(bytes);
                    }
                    notifier.notify(Readiness::CaptureReady);
                },
                move |err| {
                    tracing::warn!("Capture stream error on {}: {}", error_device, err);
                },
                None,
            )
            .map_err(|e| AudioError::DeviceUnavailable(format!("{}: {}", device_name, e)))?;

        stream
            .play()
            .map_err(|e| AudioError::DeviceUnavailable(format!("{}: {}", device_name, e)))?;

        tracing::info!(
            "Capture started on {} ({}, {} frames/period)",
            device_name,
            format,
            negotiated.period_frames
        );

        Ok(Self {
            stream: Some(stream),
            ring,
            format,
            device_name,
            period_frames: negotiated.period_frames,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn period_frames(&self) -> usize {
        self.period_frames
    }

    /// Bytes dropped because nobody drained the ring in time
    pub fn dropped_bytes(&self) -> usize {
        self.ring.overflow_count()
    }
}

impl CaptureSource for CpalCapture {
    fn bytes_ready(&self) -> usize {
        if self.stream.is_none() {
            return 0;
        }
        self.ring.len()
    }

    fn read(&mut self, out: &mut [u8]) -> usize {
        self.ring.take_into(out)
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.ring.clear();
            tracing::info!(
                "Capture stopped on {} ({} bytes dropped)",
                self.device_name,
                self.dropped_bytes()
            );
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capture that replays a raw PCM file at the real-time rate of its format
pub struct FileCapture {
    data: Vec<u8>,
    position: usize,
    format: AudioFormat,
    started: Instant,
    stopped: bool,
}

impl FileCapture {
    pub fn open(path: impl AsRef<Path>, format: AudioFormat) -> Result<Self, AudioError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| AudioError::DeviceUnavailable(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Capturing from file {} ({} bytes, {})", path.display(), data.len(), format);
        Ok(Self::from_bytes(data, format))
    }

    pub fn from_bytes(data: Vec<u8>, format: AudioFormat) -> Self {
        Self {
            data,
            position: 0,
            format,
            started: Instant::now(),
            stopped: false,
        }
    }

    /// Whole frames that real time says should have been produced so far
    fn due(&self) -> usize {
        let elapsed_us = self.started.elapsed().as_micros();
        let due = elapsed_us * self.format.byte_rate() as u128 / 1_000_000;
        self.format.whole_frames(due.min(self.data.len() as u128) as usize)
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.format.whole_frames(self.data.len())
    }
}

impl CaptureSource for FileCapture {
    fn bytes_ready(&self) -> usize {
        if self.stopped {
            return 0;
        }
        self.due().saturating_sub(self.position)
    }

    fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.bytes_ready().min(out.len());
        out[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        n
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
