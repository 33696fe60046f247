
//! Contains the compression attribute definition
//! and methods to compress and decompress blocks of scan lines.


// private modules make non-breaking changes easier
mod zip;
mod rle;
mod pxr24;

use std::sync::Arc;
use smallvec::SmallVec;

use crate::error::{Result, Error};
use crate::meta::attribute::{IntegerBounds, ChannelDescription, SampleType};


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];

/// Specifies which compression method to use.
/// Use uncompressed data for fastest loading and writing speeds.
/// Use RLE compression for fast loading and writing with slight memory savings.
/// Use ZIP compression for slow processing with large memory savings.
///
/// `PIZ`, `B44`, `B44A`, `DWAA` and `DWAB` can be described in a header,
/// but their blocks can only be processed with a codec attached to the options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {

    /// Store uncompressed values.
    /// Produces large files that can be read and written very quickly.
    Uncompressed,

    /// Produces slightly smaller files
    /// that can still be read and written rather quickly.
    /// Works best for images with large flat areas, such as masks and abstract graphics.
    /// This compression method is lossless.
    RLE,

    /// Uses ZIP compression to compress each line. Slowly produces small images
    /// which can be read with moderate speed. This compression method is lossless.
    ZIP1,

    /// Uses ZIP compression to compress blocks of 16 lines. Slowly produces small images
    /// which can be read with moderate speed. This compression method is lossless.
    ZIP16,

    /// Wavelet and huffman based, in blocks of 32 lines.
    /// Requires an attached codec.
    PIZ,

    /// Like `ZIP16`, but reduces precision of `f32` samples to 24 bits.
    /// Therefore, this is lossless compression for `f16` and `u32` data, lossy compression for `f32` data.
    PXR24,

    /// Lossy 4-by-4 pixel block compression of `f16` samples.
    /// Requires an attached codec.
    B44,

    /// Like `B44`, but flat areas are compressed further.
    /// Requires an attached codec.
    B44A,

    /// Lossy DCT based compression in blocks of 32 lines.
    /// Requires an attached codec.
    DWAA,

    /// Lossy DCT based compression in blocks of 256 lines.
    /// Requires an attached codec.
    DWAB,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::RLE => "rle",
            Compression::ZIP1 => "zip line",
            Compression::ZIP16 => "zip block",
            Compression::B44 => "b44",
            Compression::B44A => "b44a",
            Compression::DWAA => "dwaa",
            Compression::DWAB => "dwab",
            Compression::PIZ => "piz",
            Compression::PXR24 => "pxr24",
        })
    }
}


/// Compresses and decompresses the bytes of a single block.
///
/// The uncompressed bytes contain, for each line of the block from top to bottom,
/// and for each channel in name order that has samples on that line,
/// the little-endian samples of that line.
///
/// Implement this trait to read or write the compression methods
/// that are not built into this library, and attach it to the options.
pub trait BlockCodec: Send + Sync + std::fmt::Debug {

    /// Compress the uncompressed bytes of one block.
    /// The result is stored in the file only if it is smaller than the input.
    fn compress(&self, layout: &BlockLayout, uncompressed: Bytes<'_>) -> Result<ByteVec>;

    /// Decompress the bytes of one block.
    /// Must produce exactly `expected_byte_size` bytes.
    fn decompress(&self, layout: &BlockLayout, compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec>;
}

/// The pixel rectangle and channels of one block,
/// describing how the uncompressed bytes of that block are arranged.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLayout {

    /// The pixels of this block. Spans the whole data window horizontally.
    pub bounds: IntegerBounds,

    /// All channels of the image, sorted by name.
    pub channels: SmallVec<[ChannelDescription; 5]>,
}

/// A section of the uncompressed block bytes, containing the samples of one channel in one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {

    /// The line that contains these samples.
    pub y: i32,

    /// Index into the channels of the layout.
    pub channel_index: usize,

    /// The type of all samples in this segment.
    pub sample_type: SampleType,

    /// The number of samples in this segment.
    pub sample_count: usize,
}


impl BlockLayout {

    /// Describe a block with the specified bounds and channels.
    pub fn new<'c>(bounds: IntegerBounds, channels: impl IntoIterator<Item = &'c ChannelDescription>) -> Self {
        BlockLayout { bounds, channels: channels.into_iter().copied().collect() }
    }

    /// Iterate the line segments in the order they appear in the uncompressed bytes.
    pub fn segments(&self) -> impl Iterator<Item = LineSegment> + '_ {
        let bounds = self.bounds;

        (bounds.min.y() ..= bounds.max.y()).flat_map(move |y| {
            self.channels.iter().enumerate()
                .filter(move |(_, channel)| channel.has_line(y))
                .map(move |(channel_index, channel)| LineSegment {
                    y, channel_index,
                    sample_type: channel.sample_type,
                    sample_count: channel.samples_per_line(bounds),
                })
        })
    }

    /// The number of uncompressed bytes in this block.
    pub fn byte_size(&self) -> usize {
        self.segments()
            .map(|segment| segment.sample_count * segment.sample_type.bytes_per_sample())
            .sum()
    }

    /// The error for a broken compressed block.
    pub fn corrupt(&self, reason: &'static str) -> Error {
        Error::corrupt(self.bounds.min.y(), reason)
    }
}


/// Stores the bytes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl BlockCodec for NoCompression {
    fn compress(&self, _: &BlockLayout, uncompressed: Bytes<'_>) -> Result<ByteVec> {
        Ok(uncompressed.to_vec())
    }

    fn decompress(&self, layout: &BlockLayout, compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
        if compressed.len() != expected_byte_size {
            return Err(layout.corrupt("uncompressed block has the wrong size"));
        }

        Ok(compressed.to_vec())
    }
}

pub use self::rle::RunLength;
pub use self::zip::Zip;
pub use self::pxr24::Pxr24;


impl Compression {

    /// For scan line images, one or more scan lines are
    /// stored together as a scan line block. The number of scan lines per block
    /// depends on how the pixel data are compressed.
    pub fn scan_lines_per_block(self) -> usize {
        use self::Compression::*;
        match self {
            Uncompressed | RLE   | ZIP1    => 1,
            ZIP16 | PXR24                  => 16,
            PIZ   | B44   | B44A | DWAA    => 32,
            DWAB                           => 256,
        }
    }

    /// The codec of this library for this compression method, if any.
    pub fn builtin_codec(self) -> Option<Arc<dyn BlockCodec>> {
        use self::Compression::*;
        match self {
            Uncompressed => Some(Arc::new(NoCompression)),
            RLE => Some(Arc::new(RunLength)),
            ZIP1 | ZIP16 => Some(Arc::new(Zip)),
            PXR24 => Some(Arc::new(Pxr24)),
            PIZ | B44 | B44A | DWAA | DWAB => None,
        }
    }

    /// Most compression methods will reconstruct the exact pixel bytes,
    /// but some might throw away unimportant data for specific types of samples.
    pub fn is_lossless_for(self, sample_type: SampleType) -> bool {
        use self::Compression::*;
        match self {
            PXR24 => sample_type != SampleType::F32, // pxr reduces f32 to f24
            B44 | B44A => sample_type != SampleType::F16, // b44 only compresses f16 values, others are left uncompressed
            Uncompressed | RLE | ZIP1 | ZIP16 | PIZ => true,
            DWAB | DWAA => false,
        }
    }
}


/// Compress the bytes of a block, keeping the raw bytes
/// unless the compressed result is actually smaller.
pub fn compress_block(compression: Compression, codec: &dyn BlockCodec, layout: &BlockLayout, uncompressed: ByteVec) -> Result<ByteVec> {
    if compression == Compression::Uncompressed {
        return Ok(uncompressed);
    }

    let compressed = codec.compress(layout, &uncompressed)?;

    if compressed.len() < uncompressed.len() { Ok(compressed) }
    else { Ok(uncompressed) }
}

/// Decompress the bytes of a block.
/// A block that has exactly the uncompressed size was stored raw.
pub fn decompress_block(codec: &dyn BlockCodec, layout: &BlockLayout, compressed: ByteVec) -> Result<ByteVec> {
    let expected_byte_size = layout.byte_size();

    // note: always true for uncompressed blocks
    if compressed.len() == expected_byte_size {
        return Ok(compressed);
    }

    let bytes = codec.decompress(layout, &compressed, expected_byte_size)?;

    if bytes.len() != expected_byte_size {
        return Err(layout.corrupt("decompressed block has the wrong size"));
    }

    Ok(bytes)
}


/// A collection of functions used to prepare data for compression.
mod optimize_bytes {

    /// Integrate over all differences to the previous value in order to reconstruct sample values.
    pub fn differences_to_samples(buffer: &mut [u8]) {
        let Some((&mut first, rest)) = buffer.split_first_mut() else { return };

        // process elements in pairs, as the computations within a pair are independent
        let mut previous = first as i16;
        let mut chunks = rest.chunks_exact_mut(2);

        for chunk in &mut chunks {
            let diff0 = chunk[0] as i16;
            let diff1 = chunk[1] as i16;
            let sample0 = (previous + diff0 - 128) as u8;
            let sample1 = (previous + diff0 + diff1 - 128 * 2) as u8;
            chunk[0] = sample0;
            chunk[1] = sample1;
            previous = sample1 as i16;
        }

        if let [last] = chunks.into_remainder() {
            *last = (previous + *last as i16 - 128) as u8;
        }
    }

    /// Derive over all values in order to produce differences to the previous value.
    pub fn samples_to_differences(buffer: &mut [u8]) {
        for index in (1..buffer.len()).rev() {
            buffer[index] = (buffer[index] as i32 - buffer[index - 1] as i32 + 128) as u8;
        }
    }

    /// Interleave the bytes such that the second half of the array is each other byte.
    pub fn interleave_byte_blocks(separated: &mut [u8]) {
        let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);

        let mut interleaved = Vec::with_capacity(separated.len());
        let mut second_half = second_half.iter();

        for &byte in first_half {
            interleaved.push(byte);
            interleaved.extend(second_half.next());
        }

        separated.copy_from_slice(interleaved.as_slice())
    }

    /// Separate the bytes such that the second half contains each other byte.
    pub fn separate_bytes_fragments(source: &mut [u8]) {
        let first_half = source.iter().step_by(2);
        let second_half = source.iter().skip(1).step_by(2);

        let separated: Vec<u8> = first_half.chain(second_half).copied().collect();
        source.copy_from_slice(separated.as_slice());
    }


    #[cfg(test)]
    pub mod test {

        #[test]
        fn roundtrip_interleave() {
            for length in 0 .. 12 {
                let source: Vec<u8> = (0 .. length).collect();
                let mut modified = source.clone();

                super::separate_bytes_fragments(&mut modified);
                super::interleave_byte_blocks(&mut modified);

                assert_eq!(source, modified);
            }
        }

        #[test]
        fn separated_halves() {
            let mut bytes = vec![ 0, 1, 2, 3, 4 ];
            super::separate_bytes_fragments(&mut bytes);
            assert_eq!(bytes, vec![ 0, 2, 4, 1, 3 ]);
        }

        #[test]
        fn roundtrip_derive_odd_and_even_lengths() {
            let odd = vec![ 0, 1, 2, 7, 4, 5, 6, 7, 13, 9, 10 ];
            let even = vec![ 200, 1, 2, 7, 4, 5, 6, 255, 13, 9 ];

            for source in [odd, even] {
                let mut modified = source.clone();

                super::samples_to_differences(&mut modified);
                super::differences_to_samples(&mut modified);

                assert_eq!(source, modified);
            }
        }

        #[test]
        fn derive_empty_and_single() {
            let mut empty: Vec<u8> = Vec::new();
            super::differences_to_samples(&mut empty);

            let mut single = vec![ 42 ];
            super::samples_to_differences(&mut single);
            super::differences_to_samples(&mut single);
            assert_eq!(single, vec![ 42 ]);
        }
    }
}


#[cfg(test)]
pub mod test {
    use super::*;

    fn layout() -> BlockLayout {
        let channels = [
            ChannelDescription::new(SampleType::F16),
            ChannelDescription::new(SampleType::U32).with_sampling(2, 2),
        ];

        BlockLayout::new(IntegerBounds::new((0, 0), (3, 1)), &channels)
    }

    #[test]
    fn layout_segments_skip_subsampled_lines() {
        let layout = layout();
        let segments: Vec<(i32, usize, usize)> = layout.segments()
            .map(|segment| (segment.y, segment.channel_index, segment.sample_count))
            .collect();

        assert_eq!(segments, vec![ (0, 0, 4), (0, 1, 2), (1, 0, 4) ]);
        assert_eq!(layout.byte_size(), 4*2 + 2*4 + 4*2);
    }

    #[test]
    fn incompressible_block_is_stored_raw() {
        let layout = layout();
        let raw: ByteVec = (0 .. layout.byte_size() as u8).map(|byte| byte.wrapping_mul(97)).collect();

        let stored = compress_block(Compression::RLE, &RunLength, &layout, raw.clone()).unwrap();
        assert!(stored.len() <= raw.len());

        let restored = decompress_block(&RunLength, &layout, stored).unwrap();
        assert_eq!(restored, raw);
    }

    #[test]
    fn block_with_wrong_size_is_corrupt() {
        let layout = layout();
        let result = decompress_block(&NoCompression, &layout, vec![ 0; 3 ]);
        assert!(matches!(result, Err(Error::CorruptBlock { y: 0, .. })));
    }

    #[test]
    fn lines_per_block() {
        assert_eq!(Compression::RLE.scan_lines_per_block(), 1);
        assert_eq!(Compression::PXR24.scan_lines_per_block(), 16);
        assert_eq!(Compression::B44A.scan_lines_per_block(), 32);
        assert_eq!(Compression::DWAB.scan_lines_per_block(), 256);

        assert!(Compression::PIZ.builtin_codec().is_none());
        assert!(Compression::ZIP1.builtin_codec().is_some());
    }
}
