//! ALSA hardware devices

use alsa::pcm::{Access, Format, Frames, HwParams, State};
use alsa::{Direction, ValueOr, PCM};

use super::pcm::{PcmDevice, PcmState};
use crate::audio::{AudioFormat, ByteOrder, SampleType};
use crate::error::AudioError;

/// Periods in the hardware buffer
const BUFFER_PERIODS: usize = 4;

/// One opened ALSA PCM, interleaved read/write access
pub struct AlsaPcm {
    pcm: PCM,
    name: String,
    period_frames: usize,
    frame_bytes: usize,
}

fn alsa_format(format: &AudioFormat) -> Option<Format> {
    let little = format.byte_order == ByteOrder::Little;
    let fmt = match (format.sample_type, format.bits_per_sample, little) {
        (SampleType::Signed, 8, _) => Format::S8,
        (SampleType::Unsigned, 8, _) => Format::U8,
        (SampleType::Signed, 16, true) => Format::S16LE,
        (SampleType::Signed, 16, false) => Format::S16BE,
        (SampleType::Unsigned, 16, true) => Format::U16LE,
        (SampleType::Unsigned, 16, false) => Format::U16BE,
        (SampleType::Signed, 24, true) => Format::S243LE,
        (SampleType::Signed, 24, false) => Format::S243BE,
        (SampleType::Unsigned, 24, true) => Format::U243LE,
        (SampleType::Unsigned, 24, false) => Format::U243BE,
        (SampleType::Signed, 32, true) => Format::S32LE,
        (SampleType::Signed, 32, false) => Format::S32BE,
        (SampleType::Unsigned, 32, true) => Format::U32LE,
        (SampleType::Unsigned, 32, false) => Format::U32BE,
        (SampleType::Float, 32, true) => Format::FloatLE,
        (SampleType::Float, 32, false) => Format::FloatBE,
        _ => return None,
    };
    Some(fmt)
}

impl AlsaPcm {
    /// Open `name` (e.g. `hw:1,0`), apply `format`, and prepare it
    pub fn open(
        name: &str,
        direction: Direction,
        format: &AudioFormat,
        period_frames: usize,
    ) -> Result<Self, AudioError> {
        let unavailable = |what: &str, e: alsa::Error| {
            AudioError::DeviceUnavailable(format!("{}: {}: {}", name, what, e))
        };

        let pcm = PCM::new(name, direction, false).map_err(|e| unavailable("open", e))?;
        let sample_format = alsa_format(format)
            .ok_or_else(|| AudioError::DeviceUnavailable(format!("{}: unsupported format {}", name, format)))?;

        {
            let hwp = HwParams::any(&pcm).map_err(|e| unavailable("hw params", e))?;
            hwp.set_channels(format.channels as u32)
                .map_err(|e| unavailable("channels", e))?;
            hwp.set_rate(format.sample_rate, ValueOr::Nearest)
                .map_err(|e| unavailable("rate", e))?;
            hwp.set_format(sample_format).map_err(|e| unavailable("format", e))?;
            hwp.set_access(Access::RWInterleaved)
                .map_err(|e| unavailable("access", e))?;
            hwp.set_period_size_near(period_frames as Frames, ValueOr::Nearest)
                .map_err(|e| unavailable("period size", e))?;
            hwp.set_buffer_size_near((period_frames * BUFFER_PERIODS) as Frames)
                .map_err(|e| unavailable("buffer size", e))?;
            pcm.hw_params(&hwp).map_err(|e| unavailable("apply hw params", e))?;
        }

        let (rate, actual_period) = {
            let current = pcm.hw_params_current().map_err(|e| unavailable("read hw params", e))?;
            (
                current.get_rate().unwrap_or(format.sample_rate),
                current
                    .get_period_size()
                    .map(|f| f as usize)
                    .unwrap_or(period_frames),
            )
        };
        pcm.prepare().map_err(|e| unavailable("prepare", e))?;

        tracing::info!(
            "{} {}: {} Hz (requested {}), {} ch, period {} frames",
            match direction {
                Direction::Capture => "Capture",
                Direction::Playback => "Playback",
            },
            name,
            rate,
            format.sample_rate,
            format.channels,
            actual_period
        );

        Ok(Self {
            pcm,
            name: name.to_string(),
            period_frames: actual_period,
            frame_bytes: format.bytes_per_frame(),
        })
    }

    pub fn capture(name: &str, format: &AudioFormat, period_frames: usize) -> Result<Self, AudioError> {
        Self::open(name, Direction::Capture, format, period_frames)
    }

    pub fn playback(name: &str, format: &AudioFormat, period_frames: usize) -> Result<Self, AudioError> {
        Self::open(name, Direction::Playback, format, period_frames)
    }

    /// Map a failed transfer onto the state the device is now in
    fn transfer_error(&self, e: alsa::Error) -> AudioError {
        match self.pcm.state() {
            State::XRun => AudioError::Overrun,
            State::Suspended => AudioError::Suspended,
            _ => AudioError::StreamError(format!("{}: {}", self.name, e)),
        }
    }
}

impl PcmDevice for AlsaPcm {
    fn name(&self) -> &str {
        &self.name
    }

    fn period_frames(&self) -> usize {
        self.period_frames
    }

    fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    fn read_period(&mut self, out: &mut [u8]) -> Result<usize, AudioError> {
        let io = self.pcm.io_bytes();
        match io.readi(out) {
            Ok(frames) => Ok(frames * self.frame_bytes),
            Err(e) => Err(self.transfer_error(e)),
        }
    }

    fn write_period(&mut self, data: &[u8]) -> Result<(), AudioError> {
        let io = self.pcm.io_bytes();
        match io.writei(data) {
            Ok(frames) if frames * self.frame_bytes < data.len() => {
                tracing::debug!("{}: short write of {} frames", self.name, frames);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(self.transfer_error(e)),
        }
    }

    fn state(&self) -> PcmState {
        match self.pcm.state() {
            State::Open => PcmState::Open,
            State::Setup => PcmState::Setup,
            State::Prepared => PcmState::Prepared,
            State::Running => PcmState::Running,
            State::XRun => PcmState::XRun,
            State::Draining => PcmState::Draining,
            State::Paused => PcmState::Paused,
            State::Suspended => PcmState::Suspended,
            State::Disconnected => PcmState::Disconnected,
            #[allow(unreachable_patterns)]
            _ => PcmState::Other,
        }
    }

    fn prepare(&mut self) -> Result<(), AudioError> {
        self.pcm
            .prepare()
            .map_err(|e| AudioError::StreamError(format!("{}: prepare: {}", self.name, e)))
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.pcm
            .resume()
            .map_err(|e| AudioError::StreamError(format!("{}: resume: {}", self.name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mapping() {
        assert_eq!(alsa_format(&AudioFormat::s16le(44100, 2)), Some(Format::S16LE));

        let mut format = AudioFormat::s16le(48000, 1);
        format.bits_per_sample = 24;
        assert_eq!(alsa_format(&format), Some(Format::S243LE));

        format.sample_type = SampleType::Float;
        assert_eq!(alsa_format(&format), None);
    }
}
