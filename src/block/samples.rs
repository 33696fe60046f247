//! Convert single samples between the pixel types of a file and of a frame buffer.

use half::f16;
use crate::meta::attribute::SampleType;


/// A single value of one channel of one pixel.
#[derive(Copy, Clone, Debug)]
pub enum Sample {

    /// A 16-bit float sample.
    F16(f16),

    /// A 32-bit float sample.
    F32(f32),

    /// An unsigned integer sample.
    U32(u32)
}

impl Sample {

    /// The zero value of the specified type.
    pub fn zero(sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::F16 => Sample::F16(f16::ZERO),
            SampleType::F32 => Sample::F32(0.0),
            SampleType::U32 => Sample::U32(0),
        }
    }

    /// Convert a double to the specified type,
    /// with the same rules as the other conversions.
    pub fn from_f64(value: f64, sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::F16 => Sample::F16(f16::from_f64(value)),
            SampleType::F32 => Sample::F32(value as f32),
            SampleType::U32 => Sample::U32(value as u32), // saturating, nan becomes zero
        }
    }

    /// The type of this sample.
    pub fn sample_type(self) -> SampleType {
        match self {
            Sample::F16(_) => SampleType::F16,
            Sample::F32(_) => SampleType::F32,
            Sample::U32(_) => SampleType::U32,
        }
    }

    /// Convert this sample to another type.
    #[inline]
    pub fn convert(self, sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::F16 => Sample::F16(self.to_f16()),
            SampleType::F32 => Sample::F32(self.to_f32()),
            SampleType::U32 => Sample::U32(self.to_u32()),
        }
    }

    /// Convert the sample to an f16 value. This has lower precision than f32.
    /// Note: An f16 can only represent integers up to `2048` as precise as a u32 could.
    #[inline]
    pub fn to_f16(self) -> f16 {
        match self {
            Sample::F16(sample) => sample,
            Sample::F32(sample) => f16::from_f32(sample),
            Sample::U32(sample) => f16::from_f32(sample as f32),
        }
    }

    /// Convert the sample to an f32 value.
    /// Note: An f32 can only represent integers up to `16777216` as precise as a u32 could.
    #[inline]
    pub fn to_f32(self) -> f32 {
        match self {
            Sample::F32(sample) => sample,
            Sample::F16(sample) => sample.to_f32(),
            Sample::U32(sample) => sample as f32,
        }
    }

    /// Convert the sample to a u32. Rounds floats towards zero the same way that `3.1 as u32` does.
    /// Negative values and nan become zero, too large values become `u32::MAX`.
    #[inline]
    pub fn to_u32(self) -> u32 {
        match self {
            Sample::F16(sample) => sample.to_f32() as u32,
            Sample::F32(sample) => sample as u32,
            Sample::U32(sample) => sample,
        }
    }

    /// Append the little-endian bytes of this sample.
    #[inline]
    pub fn write_le(self, bytes: &mut Vec<u8>) {
        match self {
            Sample::F16(sample) => bytes.extend_from_slice(&sample.to_le_bytes()),
            Sample::F32(sample) => bytes.extend_from_slice(&sample.to_le_bytes()),
            Sample::U32(sample) => bytes.extend_from_slice(&sample.to_le_bytes()),
        }
    }

    /// Take a sample of the specified type from the front of the little-endian bytes.
    /// Returns `None` if there are not enough bytes.
    #[inline]
    pub fn read_le(sample_type: SampleType, bytes: &mut &[u8]) -> Option<Self> {
        let size = sample_type.bytes_per_sample();
        if bytes.len() < size { return None; }

        let (sample, rest) = bytes.split_at(size);
        *bytes = rest;

        Some(match sample_type {
            SampleType::F16 => Sample::F16(f16::from_le_bytes([sample[0], sample[1]])),
            SampleType::F32 => Sample::F32(f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]])),
            SampleType::U32 => Sample::U32(u32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]])),
        })
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        match *self {
            Sample::F16(num) => num == other.to_f16(),
            Sample::F32(num) => num == other.to_f32(),
            Sample::U32(num) => num == other.to_u32(),
        }
    }
}

impl From<f16> for Sample { #[inline] fn from(f: f16) -> Self { Sample::F16(f) } }
impl From<f32> for Sample { #[inline] fn from(f: f32) -> Self { Sample::F32(f) } }
impl From<u32> for Sample { #[inline] fn from(f: u32) -> Self { Sample::U32(f) } }


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn float_to_integer_saturates() {
        assert_eq!(Sample::F32(-3.5).to_u32(), 0);
        assert_eq!(Sample::F32(f32::NAN).to_u32(), 0);
        assert_eq!(Sample::F32(1.0e20).to_u32(), u32::MAX);
        assert_eq!(Sample::F16(f16::from_f32(7.9)).to_u32(), 7);
        assert_eq!(Sample::from_f64(-1.0, SampleType::U32), Sample::U32(0));
    }

    #[test]
    fn half_and_single_precision() {
        assert_eq!(Sample::F16(f16::from_f32(1.5)).convert(SampleType::F32), Sample::F32(1.5));
        assert_eq!(Sample::U32(3).convert(SampleType::F16).to_f32(), 3.0);
        assert_eq!(Sample::from_f64(1.5, SampleType::F16).sample_type(), SampleType::F16);
    }

    #[test]
    fn little_endian_bytes() {
        let mut bytes = Vec::new();
        Sample::U32(0x01020304).write_le(&mut bytes);
        Sample::F16(f16::ONE).write_le(&mut bytes);
        assert_eq!(&bytes[.. 4], &[4, 3, 2, 1]);

        let mut remaining = bytes.as_slice();
        assert_eq!(Sample::read_le(SampleType::U32, &mut remaining), Some(Sample::U32(0x01020304)));
        assert_eq!(Sample::read_le(SampleType::F16, &mut remaining), Some(Sample::F16(f16::ONE)));
        assert_eq!(Sample::read_le(SampleType::F16, &mut remaining), None);
    }
}
