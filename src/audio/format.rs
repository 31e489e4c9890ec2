//! PCM stream shape
//!
//! An [`AudioFormat`] is the descriptor both ends of one direction must agree
//! on out-of-band. Nothing on the wire describes the stream, so a mismatch is
//! never detected, only heard.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FormatError;

/// Sample widths a descriptor may carry
pub const ALLOWED_SAMPLE_SIZES: [u16; 4] = [8, 16, 24, 32];

/// Byte order of multi-byte samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the host CPU
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }
}

/// Sample representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Signed,
    Unsigned,
    Float,
}

/// Immutable description of a raw PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub byte_order: ByteOrder,
    pub sample_type: SampleType,
}

impl AudioFormat {
    pub fn new(
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        byte_order: ByteOrder,
        sample_type: SampleType,
    ) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            byte_order,
            sample_type,
        }
    }

    /// Signed 16-bit little-endian, the format the hardware peer defaults to
    pub fn s16le(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, 16, ByteOrder::Little, SampleType::Signed)
    }

    /// Reject descriptors no device can be opened with
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.sample_rate == 0 {
            return Err(FormatError::SampleRate(0));
        }
        if self.channels == 0 {
            return Err(FormatError::Channels(0));
        }
        if !ALLOWED_SAMPLE_SIZES.contains(&self.bits_per_sample) {
            return Err(FormatError::SampleSize(self.bits_per_sample as i64));
        }
        if self.sample_type == SampleType::Float && self.bits_per_sample != 32 {
            return Err(FormatError::FloatWidth(self.bits_per_sample));
        }
        Ok(())
    }

    /// Bytes in one sample of one channel
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes in one frame (one sample for every channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }

    /// Size in bytes of one device period of `native_period_frames` frames
    pub fn period_size_bytes(&self, native_period_frames: usize) -> usize {
        native_period_frames * self.bytes_per_frame()
    }

    /// Bytes produced per second of audio
    pub fn byte_rate(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }

    /// Round `len` down to a whole number of frames
    pub fn whole_frames(&self, len: usize) -> usize {
        let frame = self.bytes_per_frame();
        if frame == 0 {
            0
        } else {
            len - len % frame
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.sample_type {
            SampleType::Signed => "signed",
            SampleType::Unsigned => "unsigned",
            SampleType::Float => "float",
        };
        let order = match self.byte_order {
            ByteOrder::Little => "little-endian",
            ByteOrder::Big => "big-endian",
        };
        write!(
            f,
            "{} Hz, {} ch, {}-bit {} {}",
            self.sample_rate, self.channels, self.bits_per_sample, kind, order
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_period_size_scenario() {
        let format = AudioFormat::new(16000, 1, 16, ByteOrder::Little, SampleType::Signed);
        assert!(format.validate().is_ok());
        assert_eq!(format.period_size_bytes(128), 256);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let good = AudioFormat::s16le(44100, 2);
        assert!(good.validate().is_ok());

        let mut bad = good;
        bad.sample_rate = 0;
        assert_eq!(bad.validate(), Err(FormatError::SampleRate(0)));

        let mut bad = good;
        bad.channels = 0;
        assert_eq!(bad.validate(), Err(FormatError::Channels(0)));

        let mut bad = good;
        bad.bits_per_sample = 12;
        assert_eq!(bad.validate(), Err(FormatError::SampleSize(12)));

        let mut bad = good;
        bad.sample_type = SampleType::Float;
        assert_eq!(bad.validate(), Err(FormatError::FloatWidth(16)));
    }

    #[test]
    fn test_whole_frames() {
        let format = AudioFormat::s16le(48000, 2);
        assert_eq!(format.whole_frames(10), 8);
        assert_eq!(format.whole_frames(3), 0);
        assert_eq!(format.byte_rate(), 192_000);
    }

    #[test]
    fn test_display() {
        let format = AudioFormat::s16le(44100, 2);
        assert_eq!(format.to_string(), "44100 Hz, 2 ch, 16-bit signed little-endian");
    }

    fn valid_format() -> impl Strategy<Value = AudioFormat> {
        (
            1u32..=192_000,
            1u16..=8,
            prop::sample::select(ALLOWED_SAMPLE_SIZES.to_vec()),
            prop::bool::ANY,
            prop::sample::select(vec![SampleType::Signed, SampleType::Unsigned, SampleType::Float]),
        )
            .prop_map(|(rate, channels, bits, big, kind)| {
                let kind = if bits != 32 && kind == SampleType::Float {
                    SampleType::Signed
                } else {
                    kind
                };
                let order = if big { ByteOrder::Big } else { ByteOrder::Little };
                AudioFormat::new(rate, channels, bits, order, kind)
            })
    }

    proptest! {
        #[test]
        fn period_size_is_positive_multiple_of_frame(format in valid_format(), frames in 1usize..=8192) {
            prop_assert!(format.validate().is_ok());
            let frame = format.channels as usize * (format.bits_per_sample as usize / 8);
            let period = format.period_size_bytes(frames);
            prop_assert!(period > 0);
            prop_assert_eq!(period % frame, 0);
        }
    }
}
