//! Handle compressed and uncompressed pixel byte blocks.
//! Moves samples between the frame buffer and the uncompressed bytes of a block,
//! and compresses or decompresses those bytes.

pub mod samples;
pub mod chunk;
pub mod parallel;
pub mod writer;
pub mod reader;

use crate::block::chunk::Chunk;
use crate::block::samples::Sample;
use crate::compression::{self, BlockCodec, BlockLayout, ByteVec, Compression};
use crate::error::{Error, Result, UnitResult};
use crate::frame_buffer::FrameBuffer;
use crate::math::{Vec2, mod_p};
use crate::meta::attribute::IntegerBounds;
use crate::meta::header::Header;


/// The uncompressed bytes of one block of scan lines.
/// Bytes are little-endian, ordered by line, then by channel name, then by x.
#[derive(Debug, Clone, PartialEq)]
pub struct UncompressedBlock {

    /// The index of the block in the offset table, counting from the top of the data window.
    pub index: usize,

    /// The pixels and channels contained in the bytes.
    pub layout: BlockLayout,

    /// The uncompressed little-endian samples.
    pub data: ByteVec,
}

impl UncompressedBlock {

    /// The pixels and channels of a block of this header.
    pub fn layout_of(header: &Header, index: usize) -> BlockLayout {
        BlockLayout::new(header.block_bounds(index), header.channel_iter().map(|(_, channel)| channel))
    }

    /// Compress the bytes, falling back to the raw bytes if compression does not help.
    pub fn compress_to_chunk(self, compression: Compression, codec: &dyn BlockCodec) -> Result<Chunk> {
        let y_coordinate = self.layout.bounds.min.y();
        let compressed_pixels_le = compression::compress_block(compression, codec, &self.layout, self.data)?;
        Ok(Chunk { y_coordinate, compressed_pixels_le })
    }

    /// Decompress the bytes of a chunk that was read from the block at this index.
    pub fn decompress_chunk(chunk: Chunk, index: usize, layout: BlockLayout, codec: &dyn BlockCodec) -> Result<Self> {
        let data = compression::decompress_block(codec, &layout, chunk.compressed_pixels_le)?;
        Ok(UncompressedBlock { index, layout, data })
    }
}


/// The x coordinates of the samples in one row, given the horizontal sampling.
fn sampled_columns(bounds: IntegerBounds, x_sampling: usize) -> impl Iterator<Item = i32> {
    // sampling is validated to fit into 32 bits
    let x_sampling = x_sampling as i32;
    (bounds.min.x() ..= bounds.max.x()).filter(move |&x| mod_p(x, x_sampling) == 0)
}

/// Append the uncompressed bytes of one line to the block bytes.
/// Channels without a slice are written as zeros.
pub(crate) fn gather_line(header: &Header, frame_buffer: &FrameBuffer<'_>, y: i32, bytes: &mut ByteVec) -> UnitResult {
    let data_window = header.data_window;

    for (name, channel) in header.channel_iter() {
        if !channel.has_line(y) { continue; }

        let slice = frame_buffer.get(name);

        for x in sampled_columns(data_window, channel.sampling.x()) {
            let sample = match slice {
                None => Sample::zero(channel.sample_type),

                Some(slice) => slice.get(Vec2(x, y), data_window)
                    .ok_or_else(|| Error::slice(name, format!("pixel ({}, {}) lies outside of the memory", x, y)))?
                    .convert(channel.sample_type),
            };

            sample.write_le(bytes);
        }
    }

    Ok(())
}

/// Store the samples of the lines `y_min ..= y_max` of a block in the frame buffer.
/// Channels without a slice are skipped.
pub(crate) fn scatter_block(
    header: &Header, frame_buffer: &FrameBuffer<'_>,
    block: &UncompressedBlock, (y_min, y_max): (i32, i32)
) -> UnitResult {
    let data_window = header.data_window;
    let names: Vec<&str> = header.channel_iter().map(|(name, _)| name).collect();
    let mut remaining: &[u8] = &block.data;

    for segment in block.layout.segments() {
        let name = names.get(segment.channel_index).copied()
            .ok_or_else(|| block.layout.corrupt("block has more channels than the header"))?;

        let byte_count = segment.sample_count * segment.sample_type.bytes_per_sample();
        if remaining.len() < byte_count {
            return Err(block.layout.corrupt("block is too small for its lines"));
        }

        let (mut line_bytes, rest) = remaining.split_at(byte_count);
        remaining = rest;

        let slice = match frame_buffer.get(name) {
            Some(slice) if segment.y >= y_min && segment.y <= y_max => slice,
            _ => continue,
        };

        let x_sampling = block.layout.channels[segment.channel_index].sampling.x();

        for x in sampled_columns(data_window, x_sampling) {
            let sample = Sample::read_le(segment.sample_type, &mut line_bytes)
                .ok_or_else(|| block.layout.corrupt("block is too small for its lines"))?;

            slice.set(Vec2(x, segment.y), data_window, sample)
                .ok_or_else(|| Error::slice(name, format!("pixel ({}, {}) lies outside of the memory", x, segment.y)))?;
        }
    }

    Ok(())
}

/// Store the fill value of each slice that has no channel in the header,
/// for every sampled pixel of the lines `y_min ..= y_max`.
pub(crate) fn fill_missing_channels(header: &Header, frame_buffer: &FrameBuffer<'_>, (y_min, y_max): (i32, i32)) -> UnitResult {
    let data_window = header.data_window;

    for (name, slice) in frame_buffer.iter() {
        if header.channel_exists(name) { continue; }

        let Vec2(x_sampling, y_sampling) = slice.sampling();
        let fill = Sample::from_f64(slice.fill_value(), slice.sample_type());

        // sampling is validated to fit into 32 bits
        for y in (y_min ..= y_max).filter(|&y| mod_p(y, y_sampling as i32) == 0) {
            for x in sampled_columns(data_window, x_sampling) {
                slice.set(Vec2(x, y), data_window, fill)
                    .ok_or_else(|| Error::slice(name, format!("pixel ({}, {}) lies outside of the memory", x, y)))?;
            }
        }
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::frame_buffer::Slice;
    use crate::meta::attribute::{ChannelDescription, LineOrder, SampleType};
    use half::f16;

    fn header() -> Header {
        let mut header = Header::with_window(
            IntegerBounds::new((-1, 0), (1, 1)),
            LineOrder::Increasing, Compression::Uncompressed
        ).unwrap();

        header.insert_channel("B", ChannelDescription::new(SampleType::F16));
        header.insert_channel("A", ChannelDescription::new(SampleType::U32).with_sampling(1, 2));
        header
    }

    #[test]
    fn gathered_line_order() {
        let header = header();
        let mut blue = [ 1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0 ];
        let mut alpha = [ 7_u32, 8, 9 ];

        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert_slice("B", Slice::packed(&mut blue[..], header.data_window));
        frame_buffer.insert_slice("A", Slice::packed(&mut alpha[..], header.data_window).with_sampling(1, 2));
        frame_buffer.validate_for(&header).unwrap();

        let mut bytes = Vec::new();
        gather_line(&header, &frame_buffer, 0, &mut bytes).unwrap();

        // alpha comes first, followed by three f16 blue samples
        let mut expected: Vec<u8> = [ 7_u32, 8, 9 ].iter().flat_map(|value| value.to_le_bytes()).collect();
        for value in [ 1.0_f32, 2.0, 3.0 ] {
            expected.extend_from_slice(&f16::from_f32(value).to_le_bytes());
        }

        assert_eq!(bytes, expected);

        // the odd line has no alpha samples
        let mut bytes = Vec::new();
        gather_line(&header, &frame_buffer, 1, &mut bytes).unwrap();
        assert_eq!(bytes.len(), 3 * 2);
    }

    #[test]
    fn missing_slices_are_zero_or_filled() {
        let header = header();
        let frame_buffer = FrameBuffer::new();

        let mut bytes = Vec::new();
        gather_line(&header, &frame_buffer, 0, &mut bytes).unwrap();
        assert_eq!(bytes, vec![ 0; 3 * 4 + 3 * 2 ]);

        let mut green = [ 0.0_f32; 6 ];
        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert_slice("G", Slice::packed(&mut green[..], header.data_window).with_fill_value(0.5));
        fill_missing_channels(&header, &frame_buffer, (1, 1)).unwrap();
        drop(frame_buffer);

        assert_eq!(green, [ 0.0, 0.0, 0.0, 0.5, 0.5, 0.5 ]);
    }

    #[test]
    fn scatter_only_requested_lines() {
        let header = header();
        let layout = UncompressedBlock::layout_of(&header, 0);

        // header with one line per block: block 1 contains line 1 with blue only
        let mut data = Vec::new();
        for value in [ 4.0_f32, 5.0, 6.0 ] {
            data.extend_from_slice(&f16::from_f32(value).to_le_bytes());
        }

        let block = UncompressedBlock { index: 1, layout: UncompressedBlock::layout_of(&header, 1), data };
        assert_eq!(layout.bounds.min.y(), 0);

        let mut blue = [ 0_u32; 6 ];
        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert_slice("B", Slice::packed(&mut blue[..], header.data_window));

        scatter_block(&header, &frame_buffer, &block, (0, 0)).unwrap();
        scatter_block(&header, &frame_buffer, &block, (1, 1)).unwrap();
        drop(frame_buffer);

        assert_eq!(blue, [ 0, 0, 0, 4, 5, 6 ]);
    }

    #[test]
    fn truncated_block_is_corrupt() {
        let header = header();
        let block = UncompressedBlock { index: 1, layout: UncompressedBlock::layout_of(&header, 1), data: vec![ 0; 5 ] };

        let frame_buffer = FrameBuffer::new();
        assert!(matches!(
            scatter_block(&header, &frame_buffer, &block, (1, 1)),
            Err(Error::CorruptBlock { y: 1, .. })
        ));
    }
}
