//! Read scan lines from a file into a frame buffer.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::block::{fill_missing_channels, scatter_block, UncompressedBlock};
use crate::block::parallel::BlockPool;
use crate::block::reader::ChunkReader;
use crate::compression::{BlockCodec, Compression};
use crate::error::{Error, Result, UnitResult, u64_to_usize};
use crate::file::ReadOptions;
use crate::frame_buffer::FrameBuffer;
use crate::io::{PeekRead, Read, Seek, Tracking, stream_length};
use crate::meta::{magic_number, Requirements};
use crate::meta::header::Header;


/// A scan line file that is being read.
///
/// The header is parsed on construction.
/// Attach a frame buffer, then read any range of lines in any order.
///
/// ```no_run
/// use exr_scanline::prelude::*;
///
/// let mut file = InputFile::open("luma.exr", 4)?;
/// let window = file.header().data_window;
///
/// let mut luma = vec![ 0.0_f32; window.width() * window.height() ];
/// let mut frame_buffer = FrameBuffer::new();
/// frame_buffer.insert_slice("Y", Slice::packed(luma.as_mut_slice(), window));
///
/// file.set_frame_buffer(&frame_buffer)?;
/// file.read_pixels(window.min.y(), window.max.y())?;
/// # Ok::<(), exr_scanline::error::Error>(())
/// ```
#[derive(Debug)]
pub struct InputFile<'f, R: Read + Seek> {
    header: Header,
    version: u32,
    chunk_reader: ChunkReader<R>,
    frame_buffer: Option<&'f FrameBuffer<'f>>,

    /// `None` if no codec is built in or specified for the compression of the file.
    codec: Option<Arc<dyn BlockCodec>>,
    pool: BlockPool,
}


impl InputFile<'_, BufReader<File>> {

    /// Open the file at the path and parse the header.
    /// Zero threads decompress all blocks on the calling thread.
    pub fn open(path: impl AsRef<Path>, thread_count: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|error| Error::from(error).with_path(path))?;
        let options = ReadOptions::default().with_threads(thread_count);

        Self::new(BufReader::new(file), options)
            .map_err(|error| error.with_path(path))
    }
}

impl<'f, R: Read + Seek> InputFile<'f, R> {

    /// Parse the header and the offset table.
    ///
    /// Fails with `MalformedHeader` if the stream is not a readable exr file,
    /// with `UnsupportedVersion` for newer format versions,
    /// and with `NotSupported` for tiled, deep, or multi-part files.
    pub fn new(mut read: R, options: ReadOptions) -> Result<Self> {
        let file_length = u64_to_usize(stream_length(&mut read)?)
            .ok_or_else(|| Error::unsupported("file too large for this platform"))?;

        let mut byte_reader = PeekRead::new(Tracking::new(read));

        magic_number::validate_exr(&mut byte_reader)?;
        let (version, requirements) = Requirements::read(&mut byte_reader)?;
        requirements.validate_scan_lines()?;

        let header = Header::read(&mut byte_reader, requirements.has_long_names, options.pedantic)
            .map_err(Error::into_malformed_header)?;

        tracing::debug!(
            version, compression = %header.compression, channels = header.channels.len(),
            data_window = ?header.data_window, "parsed header"
        );

        let chunk_reader = ChunkReader::read_offset_table(byte_reader, &header, file_length)?;
        let codec = options.codec.or_else(|| header.compression.builtin_codec());

        let pool = if header.compression == Compression::Uncompressed { BlockPool::sequential() }
            else { BlockPool::new(options.threads, "exr block decompressor") };

        Ok(InputFile { header, version, chunk_reader, frame_buffer: None, codec, pool })
    }

    /// The parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The raw version field of the file, containing the format version in the lowest byte
    /// and feature flags in the higher bits.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether the offset table locates every block of the data window.
    /// Does not decompress any block.
    pub fn is_complete(&self) -> bool {
        self.chunk_reader.is_complete()
    }

    /// Use these slices for all following reads.
    /// Fails with `InvalidSlice` if a slice does not cover the data window
    /// or if its sampling differs from the channel in the file.
    pub fn set_frame_buffer(&mut self, frame_buffer: &'f FrameBuffer<'f>) -> UnitResult {
        frame_buffer.validate_for(&self.header)?;
        self.frame_buffer = Some(frame_buffer);
        Ok(())
    }

    /// Decompress the lines `y_min ..= y_max` into the frame buffer.
    ///
    /// Channels without a slice are skipped.
    /// Slices without a channel in the file are filled with their fill value.
    /// If this fails, the frame buffer may be partially overwritten.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn read_pixels(&mut self, y_min: i32, y_max: i32) -> UnitResult {
        if y_min > y_max {
            return Err(Error::InvalidRange { y_min, y_max });
        }

        let data_window = self.header.data_window;
        let window = (data_window.min.y(), data_window.max.y());

        if y_min < window.0 || y_max > window.1 {
            return Err(Error::OutOfRange { requested: (y_min, y_max), window });
        }

        let frame_buffer = self.frame_buffer.ok_or(Error::NoFrameBuffer)?;

        let codec = self.codec.clone().ok_or_else(|| Error::unsupported(format!(
            "{} requires a codec in the read options", self.header.compression
        )))?;

        let first_block = self.header.block_index_of(y_min);
        let last_block = self.header.block_index_of(y_max);

        let mut chunks = Vec::with_capacity(last_block - first_block + 1);
        for index in first_block ..= last_block {
            let chunk = self.chunk_reader.read_chunk(index, &self.header)?;
            chunks.push((index, chunk, UncompressedBlock::layout_of(&self.header, index)));
        }

        let blocks = self.pool.map_ordered(chunks, move |(index, chunk, layout)| {
            UncompressedBlock::decompress_chunk(chunk, index, layout, codec.as_ref())
        })?;

        for block in &blocks {
            tracing::trace!(block = block.index, bytes = block.data.len(), "decompressed block");
            scatter_block(&self.header, frame_buffer, block, (y_min, y_max))?;
        }

        fill_missing_channels(&self.header, frame_buffer, (y_min, y_max))
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use crate::file::output::OutputFile;
    use crate::file::WriteOptions;
    use crate::frame_buffer::Slice;
    use crate::meta::attribute::{ChannelDescription, IntegerBounds, LineOrder, SampleType};

    fn file_bytes(compression: Compression) -> Vec<u8> {
        let window = IntegerBounds::new((3, 5), (4, 40));
        let mut header = Header::with_window(window, LineOrder::Increasing, compression).unwrap();
        header.insert_channel("I", ChannelDescription::new(SampleType::U32));

        let mut ids: Vec<u32> = (0 .. 2 * 36).collect();
        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert_slice("I", Slice::packed(ids.as_mut_slice(), window));

        let mut file = OutputFile::new(Cursor::new(Vec::new()), header, WriteOptions::default()).unwrap();
        file.set_frame_buffer(&frame_buffer).unwrap();
        file.write_pixels(36).unwrap();
        file.finish().unwrap().into_inner()
    }

    #[test]
    fn read_partial_ranges() {
        let mut file = InputFile::new(Cursor::new(file_bytes(Compression::ZIP16)), ReadOptions::default()).unwrap();
        assert!(file.is_complete());
        assert_eq!(file.version(), 2);

        let window = file.header().data_window;
        let cells = vec![ std::cell::Cell::new(0_u32); 2 * 36 ];

        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert_slice("I", Slice::packed(cells.as_slice(), window));
        file.set_frame_buffer(&frame_buffer).unwrap();

        // crosses the border between the first two blocks
        file.read_pixels(19, 22).unwrap();

        let values: Vec<u32> = cells.iter().map(|cell| cell.get()).collect();
        let expected: Vec<u32> = (0 .. 72).map(|id| if (28 .. 36).contains(&id) { id } else { 0 }).collect();
        assert_eq!(values, expected);

        assert!(matches!(file.read_pixels(2, 6), Err(Error::OutOfRange { .. })));
        assert!(matches!(file.read_pixels(9, 8), Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn unknown_codec_is_not_supported_when_reading() {
        let mut bytes = file_bytes(Compression::RLE);

        // replace the compression attribute value with piz
        let name = b"compression\0compression\0";
        let position = bytes.windows(name.len()).position(|window| window == name).unwrap();
        let value = position + name.len() + 4;
        assert_eq!(bytes[value], 1);
        bytes[value] = 4;

        // piz stores 32 lines per block, so the table no longer matches the rle blocks
        let mut file = InputFile::new(Cursor::new(bytes), ReadOptions::default()).unwrap();
        assert_eq!(file.header().compression, Compression::PIZ);

        let frame_buffer = FrameBuffer::new();
        file.set_frame_buffer(&frame_buffer).unwrap();
        assert!(matches!(file.read_pixels(5, 5), Err(Error::NotSupported(_))));
    }
}
