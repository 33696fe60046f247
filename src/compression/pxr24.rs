
//! Lossy compression for F32 data, but lossless compression for U32 and F16 data.

// The samples of each channel in each line are converted to unsigned integers,
// where f32 values are rounded to 24 bits. Each value is replaced by the difference
// to its left neighbour. The differences are split into their bytes,
// and all most significant bytes of the line are stored first.
// The resulting bytes are compressed with zlib.

use super::*;
use super::zip::{compress_zlib, decompress_zlib};


/// Pixar's 24-bit float compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pxr24;

impl BlockCodec for Pxr24 {
    fn compress(&self, layout: &BlockLayout, uncompressed: Bytes<'_>) -> Result<ByteVec> {
        let mut remaining = uncompressed;
        let mut raw = Vec::with_capacity(uncompressed.len());

        for segment in layout.segments() {
            let byte_count = bytes_per_difference(segment.sample_type);
            let sample_byte_size = segment.sample_type.bytes_per_sample();

            let start = raw.len();
            raw.resize(start + byte_count * segment.sample_count, 0);
            let planes = &mut raw[start ..];

            let mut previous_pixel: u32 = 0;

            for index in 0 .. segment.sample_count {
                let (sample, rest) = split_off(remaining, sample_byte_size)
                    .ok_or_else(|| layout.corrupt("block is shorter than its channels"))?;

                remaining = rest;

                let pixel = match segment.sample_type {
                    SampleType::F16 => u16::from_le_bytes([sample[0], sample[1]]) as u32,
                    SampleType::U32 => u32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]),
                    SampleType::F32 => f32_to_f24(f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]])),
                };

                let difference = pixel.wrapping_sub(previous_pixel);
                previous_pixel = pixel;

                // the most significant byte plane comes first
                for plane in 0 .. byte_count {
                    let shift = 8 * (byte_count - 1 - plane);
                    planes[plane * segment.sample_count + index] = (difference >> shift) as u8;
                }
            }
        }

        Ok(compress_zlib(&raw))
    }

    fn decompress(&self, layout: &BlockLayout, compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
        let raw = decompress_zlib(layout, compressed, expected_byte_size)?;

        let mut remaining = raw.as_slice();
        let mut decompressed = Vec::with_capacity(expected_byte_size);

        for segment in layout.segments() {
            let byte_count = bytes_per_difference(segment.sample_type);

            let (planes, rest) = split_off(remaining, byte_count * segment.sample_count)
                .ok_or_else(|| layout.corrupt("not enough pxr24 data"))?;

            remaining = rest;

            let mut pixel_accumulation: u32 = 0;

            for index in 0 .. segment.sample_count {
                let difference = (0 .. byte_count).fold(0_u32, |difference, plane| {
                    (difference << 8) | planes[plane * segment.sample_count + index] as u32
                });

                pixel_accumulation = pixel_accumulation.wrapping_add(difference);

                match segment.sample_type {
                    SampleType::F16 => decompressed.extend_from_slice(&(pixel_accumulation as u16).to_le_bytes()),
                    SampleType::U32 => decompressed.extend_from_slice(&pixel_accumulation.to_le_bytes()),

                    // reverse conversion of the 24 bit float is an 8 bit left shift
                    SampleType::F32 => decompressed.extend_from_slice(&(pixel_accumulation << 8).to_le_bytes()),
                }
            }
        }

        if !remaining.is_empty() {
            return Err(layout.corrupt("too much pxr24 data"));
        }

        Ok(decompressed)
    }
}


fn bytes_per_difference(sample_type: SampleType) -> usize {
    match sample_type {
        SampleType::F16 => 2,
        SampleType::U32 => 4,
        SampleType::F32 => 3,
    }
}

fn split_off(slice: &[u8], count: usize) -> Option<(&[u8], &[u8])> {
    if count > slice.len() { None }
    else { Some(slice.split_at(count)) }
}


/// Conversion from 32-bit to 24-bit floating-point numbers.
/// Reverse conversion is just a simple 8-bit left shift.
pub fn f32_to_f24(float: f32) -> u32 {
    let bits = float.to_bits();

    let sign = bits & 0x80000000;
    let exponent = bits & 0x7f800000;
    let mantissa = bits & 0x007fffff;

    let result = if exponent == 0x7f800000 {
        if mantissa != 0 {
            // a nan keeps the sign and the 15 leftmost bits of the significand,
            // but must not turn into an infinity if those are all zero
            let mantissa = mantissa >> 8;
            (exponent >> 8) | mantissa | if mantissa == 0 { 1 } else { 0 }
        }
        else { // infinity
            exponent >> 8
        }
    }
    else { // finite, round the significand to 15 bits
        let result = ((exponent | mantissa) + (mantissa & 0x00000080)) >> 8;

        if result >= 0x7f8000 {
            // rounding up overflowed the exponent, so truncate instead
            (exponent | mantissa) >> 8
        }
        else {
            result
        }
    };

    (sign >> 8) | result
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::IntegerBounds;

    fn layout(sample_type: SampleType) -> BlockLayout {
        let channels = [ ChannelDescription::new(sample_type) ];
        BlockLayout::new(IntegerBounds::new((0, 0), (15, 3)), &channels)
    }

    #[test]
    fn lossless_for_integers() {
        let layout = layout(SampleType::U32);
        let samples: Vec<u32> = (0 .. 64_u32).map(|index| index.wrapping_mul(2654435761)).collect();
        let bytes: ByteVec = samples.iter().flat_map(|sample| sample.to_le_bytes()).collect();

        let compressed = Pxr24.compress(&layout, &bytes).unwrap();
        let decompressed = Pxr24.decompress(&layout, &compressed, bytes.len()).unwrap();
        assert_eq!(decompressed, bytes);
    }

    #[test]
    fn floats_lose_low_bits_only() {
        let layout = layout(SampleType::F32);
        let samples: Vec<f32> = (0 .. 64).map(|index| index as f32 * 0.3711 - 4.0).collect();
        let bytes: ByteVec = samples.iter().flat_map(|sample| sample.to_le_bytes()).collect();

        let compressed = Pxr24.compress(&layout, &bytes).unwrap();
        let decompressed = Pxr24.decompress(&layout, &compressed, bytes.len()).unwrap();

        for (original, restored) in samples.iter().zip(decompressed.chunks_exact(4)) {
            let restored = f32::from_le_bytes([restored[0], restored[1], restored[2], restored[3]]);
            assert!((original - restored).abs() <= original.abs() * 1.0e-4, "{} became {}", original, restored);
        }
    }

    #[test]
    fn f24_special_values() {
        assert_eq!(f32_to_f24(0.0), 0);
        assert_eq!(f32::from_bits(f32_to_f24(f32::INFINITY) << 8), f32::INFINITY);
        assert!(f32::from_bits(f32_to_f24(f32::NAN) << 8).is_nan());
        assert_eq!(f32::from_bits(f32_to_f24(-2.0) << 8), -2.0);
    }

    #[test]
    fn missing_planes_are_corrupt() {
        let layout = layout(SampleType::F16);
        let compressed = compress_zlib(&[ 0_u8; 10 ]);
        let result = Pxr24.decompress(&layout, &compressed, layout.byte_size());
        assert!(matches!(result, Err(Error::CorruptBlock { .. })));
    }
}
