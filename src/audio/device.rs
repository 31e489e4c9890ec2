//! Audio device enumeration and opening

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleFormat, StreamConfig, SupportedBufferSize};

use super::capture::{CaptureSource, CpalCapture, FileCapture};
use super::format::{AudioFormat, SampleType};
use super::playback::{CpalPlayback, PlaybackSink};
use super::{Direction, Notifier};
use crate::error::AudioError;

/// Capture device ids with this prefix name a raw PCM file instead
pub const FILE_DEVICE_PREFIX: &str = "file:";

/// One entry of a device listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Lists the devices an operator can choose from. Each listing starts with
/// the default device, when there is one.
pub trait DeviceDirectory {
    fn list_capture_devices(&self) -> Vec<DeviceInfo>;
    fn list_playback_devices(&self) -> Vec<DeviceInfo>;
}

/// Opens capture and playback handles. `None` selects the default device.
pub trait AudioBackend: DeviceDirectory {
    fn open_capture(
        &self,
        device: Option<&str>,
        format: &AudioFormat,
        period_frames: usize,
    ) -> Result<Box<dyn CaptureSource>, AudioError>;

    fn open_playback(
        &self,
        device: Option<&str>,
        format: &AudioFormat,
        period_frames: usize,
    ) -> Result<Box<dyn PlaybackSink>, AudioError>;
}

/// Backend over the host's default cpal audio API
pub struct CpalBackend {
    host: cpal::Host,
    notifier: Notifier,
}

impl CpalBackend {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            host: cpal::default_host(),
            notifier,
        }
    }

    fn list(&self, direction: Direction) -> Vec<DeviceInfo> {
        let (default_name, devices) = match direction {
            Direction::Input => (
                self.host.default_input_device().and_then(|d| d.name().ok()),
                self.host.input_devices().map(|it| it.collect::<Vec<_>>()),
            ),
            Direction::Output => (
                self.host.default_output_device().and_then(|d| d.name().ok()),
                self.host.output_devices().map(|it| it.collect::<Vec<_>>()),
            ),
        };

        let devices = match devices {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!("Failed to enumerate {} devices: {}", direction.label(), e);
                Vec::new()
            }
        };

        let mut listing: Vec<DeviceInfo> = devices
            .iter()
            .filter_map(|d| d.name().ok())
            .map(|name| DeviceInfo {
                is_default: default_name.as_ref() == Some(&name),
                id: name.clone(),
                name,
            })
            .collect();

        // Default device first, then the rest in host order
        listing.sort_by_key(|d| !d.is_default);
        listing
    }
}

impl DeviceDirectory for CpalBackend {
    fn list_capture_devices(&self) -> Vec<DeviceInfo> {
        self.list(Direction::Input)
    }

    fn list_playback_devices(&self) -> Vec<DeviceInfo> {
        self.list(Direction::Output)
    }
}

impl AudioBackend for CpalBackend {
    fn open_capture(
        &self,
        device: Option<&str>,
        format: &AudioFormat,
        period_frames: usize,
    ) -> Result<Box<dyn CaptureSource>, AudioError> {
        if let Some(path) = device.and_then(|id| id.strip_prefix(FILE_DEVICE_PREFIX)) {
            return Ok(Box::new(FileCapture::open(path, *format)?));
        }
        let device = find_device(&self.host, Direction::Input, device)?;
        let capture = CpalCapture::open(device, *format, period_frames, self.notifier.clone())?;
        Ok(Box::new(capture))
    }

    fn open_playback(
        &self,
        device: Option<&str>,
        format: &AudioFormat,
        period_frames: usize,
    ) -> Result<Box<dyn PlaybackSink>, AudioError> {
        let device = find_device(&self.host, Direction::Output, device)?;
        let playback = CpalPlayback::open(device, *format, period_frames, self.notifier.clone())?;
        Ok(Box::new(playback))
    }
}

/// Look a device up by name, or take the host default
pub fn find_device(
    host: &cpal::Host,
    direction: Direction,
    name: Option<&str>,
) -> Result<cpal::Device, AudioError> {
    let Some(name) = name else {
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or_else(|| {
            AudioError::DeviceUnavailable(format!("no default {} device", direction.label()))
        });
    };

    let devices = match direction {
        Direction::Input => host.input_devices(),
        Direction::Output => host.output_devices(),
    }
    .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceUnavailable(name.to_string()))
}

/// The cpal sample format carrying `format`'s samples, if the host API has one
pub fn cpal_sample_format(format: &AudioFormat) -> Option<SampleFormat> {
    match (format.sample_type, format.bits_per_sample) {
        (SampleType::Signed, 8) => Some(SampleFormat::I8),
        (SampleType::Signed, 16) => Some(SampleFormat::I16),
        (SampleType::Signed, 32) => Some(SampleFormat::I32),
        (SampleType::Unsigned, 8) => Some(SampleFormat::U8),
        (SampleType::Unsigned, 16) => Some(SampleFormat::U16),
        (SampleType::Unsigned, 32) => Some(SampleFormat::U32),
        (SampleType::Float, 32) => Some(SampleFormat::F32),
        _ => None,
    }
}

/// Clamp a requested period to what the device reports it can do
pub fn native_period_frames(buffer_size: &SupportedBufferSize, requested: usize) -> usize {
    match buffer_size {
        SupportedBufferSize::Range { min, max } => {
            (requested as u32).clamp(*min, (*max).max(*min)) as usize
        }
        SupportedBufferSize::Unknown => requested,
    }
}

/// Stream parameters agreed with a device for `format`
pub struct NegotiatedStream {
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub period_frames: usize,
}

/// Find a device configuration matching `format` exactly
pub fn negotiate(
    device: &cpal::Device,
    direction: Direction,
    format: &AudioFormat,
    period_frames: usize,
) -> Result<NegotiatedStream, AudioError> {
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let sample_format = cpal_sample_format(format).ok_or_else(|| {
        AudioError::DeviceUnavailable(format!("{} cannot carry {}", device_name, format))
    })?;

    let configs: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Input => device.supported_input_configs().map(|it| it.collect()),
        Direction::Output => device.supported_output_configs().map(|it| it.collect()),
    }
    .map_err(|e| AudioError::DeviceUnavailable(format!("{}: {}", device_name, e)))?;

    let rate = cpal::SampleRate(format.sample_rate);
    let range = configs
        .iter()
        .find(|c| {
            c.channels() == format.channels
                && c.sample_format() == sample_format
                && c.min_sample_rate() <= rate
                && rate <= c.max_sample_rate()
        })
        .ok_or_else(|| {
            AudioError::DeviceUnavailable(format!("{} does not support {}", device_name, format))
        })?;

    let period_frames = native_period_frames(range.buffer_size(), period_frames);
    let buffer_size = match range.buffer_size() {
        SupportedBufferSize::Range { .. } => cpal::BufferSize::Fixed(period_frames as u32),
        SupportedBufferSize::Unknown => cpal::BufferSize::Default,
    };

    Ok(NegotiatedStream {
        config: StreamConfig {
            channels: format.channels,
            sample_rate: rate,
            buffer_size,
        },
        sample_format,
        period_frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::ByteOrder;

    #[test]
    fn test_sample_format_mapping() {
        let s16 = AudioFormat::s16le(48000, 2);
        assert_eq!(cpal_sample_format(&s16), Some(SampleFormat::I16));

        let f32_format = AudioFormat::new(48000, 2, 32, ByteOrder::Little, SampleType::Float);
        assert_eq!(cpal_sample_format(&f32_format), Some(SampleFormat::F32));

        let s24 = AudioFormat::new(48000, 2, 24, ByteOrder::Little, SampleType::Signed);
        assert_eq!(cpal_sample_format(&s24), None);
    }

    #[test]
    fn test_native_period_clamp() {
        let range = SupportedBufferSize::Range { min: 256, max: 4096 };
        assert_eq!(native_period_frames(&range, 128), 256);
        assert_eq!(native_period_frames(&range, 1024), 1024);
        assert_eq!(native_period_frames(&range, 10_000), 4096);
        assert_eq!(native_period_frames(&SupportedBufferSize::Unknown, 128), 128);
    }

    #[test]
    fn test_device_listing() {
        // Listing must not fail on hosts without audio hardware
        let backend = CpalBackend::new(Notifier::detached());
        let inputs = backend.list_capture_devices();
        assert!(inputs.iter().filter(|d| d.is_default).count() <= 1);
        if let Some(first) = inputs.iter().position(|d| d.is_default) {
            assert_eq!(first, 0);
        }
    }
}
