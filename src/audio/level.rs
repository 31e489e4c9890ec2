//! Sample-level helpers over raw PCM bytes
//!
//! These decode just enough of a stream to meter it, scale it, or fill a
//! buffer with silence. The transport itself never needs them: at unity gain
//! bytes go to the wire exactly as the device produced them.

use super::format::{AudioFormat, ByteOrder, SampleType};

/// Highest value of a level meter
pub const METER_MAX: u8 = 10;

/// Linear gain applied to outbound samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain(f32);

impl Gain {
    pub const UNITY: Gain = Gain(1.0);

    /// Gain from an operator percentage, clamped to 0..=200
    pub fn from_percent(percent: u32) -> Self {
        Gain(percent.min(200) as f32 / 100.0)
    }

    pub fn is_unity(&self) -> bool {
        (self.0 - 1.0).abs() < f32::EPSILON
    }

    pub fn factor(&self) -> f32 {
        self.0
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::UNITY
    }
}

fn read_raw(format: &AudioFormat, bytes: &[u8]) -> u64 {
    let mut raw = 0u64;
    match format.byte_order {
        ByteOrder::Little => {
            for (i, b) in bytes.iter().enumerate() {
                raw |= (*b as u64) << (8 * i);
            }
        }
        ByteOrder::Big => {
            for b in bytes {
                raw = (raw << 8) | *b as u64;
            }
        }
    }
    raw
}

fn write_raw(format: &AudioFormat, raw: u64, out: &mut [u8]) {
    let n = out.len();
    for i in 0..n {
        let byte = (raw >> (8 * i)) as u8;
        match format.byte_order {
            ByteOrder::Little => out[i] = byte,
            ByteOrder::Big => out[n - 1 - i] = byte,
        }
    }
}

/// Decode one sample into the range -1.0..=1.0
pub fn decode_sample(format: &AudioFormat, bytes: &[u8]) -> f32 {
    let bits = format.bits_per_sample as u32;
    let raw = read_raw(format, bytes);
    let half = (1u64 << (bits - 1)) as f64;
    match format.sample_type {
        SampleType::Signed => {
            let shift = 64 - bits;
            let value = ((raw << shift) as i64) >> shift;
            (value as f64 / half) as f32
        }
        SampleType::Unsigned => ((raw as f64 - half) / half) as f32,
        SampleType::Float => f32::from_bits(raw as u32),
    }
}

/// Encode `value` (clamped to -1.0..=1.0) into one sample
pub fn encode_sample(format: &AudioFormat, value: f32, out: &mut [u8]) {
    let bits = format.bits_per_sample as u32;
    let value = value.clamp(-1.0, 1.0) as f64;
    let half = (1u64 << (bits - 1)) as f64;
    let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
    let raw = match format.sample_type {
        SampleType::Signed => {
            let scaled = (value * half).round().clamp(-half, half - 1.0) as i64;
            scaled as u64 & mask
        }
        SampleType::Unsigned => (value * half + half).round().clamp(0.0, mask as f64) as u64,
        SampleType::Float => (value as f32).to_bits() as u64,
    };
    write_raw(format, raw, out);
}

/// Peak absolute sample value of `data`
pub fn peak(format: &AudioFormat, data: &[u8]) -> f32 {
    let width = format.bytes_per_sample();
    if width == 0 {
        return 0.0;
    }
    data.chunks_exact(width)
        .map(|s| decode_sample(format, s).abs())
        .fold(0.0f32, f32::max)
}

/// Peak level scaled onto a 0..=10 meter
pub fn meter(format: &AudioFormat, data: &[u8]) -> u8 {
    let level = (peak(format, data) * METER_MAX as f32).round();
    (level as u8).min(METER_MAX)
}

/// Scale every sample of `data` in place
pub fn apply_gain(format: &AudioFormat, data: &mut [u8], gain: Gain) {
    if gain.is_unity() {
        return;
    }
    let width = format.bytes_per_sample();
    for sample in data.chunks_exact_mut(width) {
        let value = decode_sample(format, sample) * gain.factor();
        encode_sample(format, value, sample);
    }
}

/// Fill `out` with the format's silence value
pub fn fill_silence(format: &AudioFormat, out: &mut [u8]) {
    if format.sample_type != SampleType::Unsigned {
        out.fill(0);
        return;
    }
    let width = format.bytes_per_sample();
    let mut silence = [0u8; 4];
    encode_sample(format, 0.0, &mut silence[..width]);
    let mut chunks = out.chunks_exact_mut(width);
    for sample in &mut chunks {
        sample.copy_from_slice(&silence[..width]);
    }
    chunks.into_remainder().fill(0);
}

/// Whether samples of `format` must be byte-swapped to or from host order
pub fn needs_swap(format: &AudioFormat) -> bool {
    format.bytes_per_sample() > 1 && format.byte_order != ByteOrder::native()
}

/// Reverse the bytes of every `width`-byte sample in place
pub fn swap_byte_order(width: usize, data: &mut [u8]) {
    if width < 2 {
        return;
    }
    for sample in data.chunks_exact_mut(width) {
        sample.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16le() -> AudioFormat {
        AudioFormat::s16le(48000, 1)
    }

    #[test]
    fn test_signed_decode() {
        let format = s16le();
        assert_eq!(decode_sample(&format, &[0x00, 0x40]), 0.5);
        assert_eq!(decode_sample(&format, &[0x00, 0x80]), -1.0);

        let big = AudioFormat::new(48000, 1, 16, ByteOrder::Big, SampleType::Signed);
        assert_eq!(decode_sample(&big, &[0x40, 0x00]), 0.5);
    }

    #[test]
    fn test_unsigned_and_24_bit() {
        let u8_format = AudioFormat::new(8000, 1, 8, ByteOrder::Little, SampleType::Unsigned);
        assert_eq!(decode_sample(&u8_format, &[0x80]), 0.0);
        assert_eq!(decode_sample(&u8_format, &[0x00]), -1.0);

        let s24 = AudioFormat::new(48000, 1, 24, ByteOrder::Little, SampleType::Signed);
        let mut out = [0u8; 3];
        encode_sample(&s24, -0.5, &mut out);
        assert_eq!(out, [0x00, 0x00, 0xC0]);
        assert_eq!(decode_sample(&s24, &out), -0.5);
    }

    #[test]
    fn test_meter_and_peak() {
        let format = s16le();
        let mut data = vec![0u8; 8];
        encode_sample(&format, 0.31, &mut data[2..4]);
        encode_sample(&format, -0.62, &mut data[6..8]);
        assert_eq!(meter(&format, &data), 6);
        assert_eq!(meter(&format, &[0u8; 8]), 0);
    }

    #[test]
    fn test_gain() {
        let format = s16le();
        let mut data = vec![0u8; 4];
        encode_sample(&format, 0.25, &mut data[..2]);
        encode_sample(&format, 0.75, &mut data[2..]);
        let original = data.clone();

        apply_gain(&format, &mut data, Gain::UNITY);
        assert_eq!(data, original);

        apply_gain(&format, &mut data, Gain::from_percent(200));
        assert_eq!(decode_sample(&format, &data[..2]), 0.5);
        // clipped at full scale
        assert!(decode_sample(&format, &data[2..]) > 0.99);
    }

    #[test]
    fn test_unsigned_silence() {
        let u16_format = AudioFormat::new(48000, 1, 16, ByteOrder::Little, SampleType::Unsigned);
        let mut out = [0xFFu8; 5];
        fill_silence(&u16_format, &mut out);
        assert_eq!(out, [0x00, 0x80, 0x00, 0x80, 0x00]);
    }

    #[test]
    fn test_swap() {
        let mut data = [1u8, 2, 3, 4];
        swap_byte_order(2, &mut data);
        assert_eq!(data, [2, 1, 4, 3]);
        swap_byte_order(1, &mut data);
        assert_eq!(data, [2, 1, 4, 3]);
    }
}
