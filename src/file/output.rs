//! Write scan lines from a frame buffer to a file.

use std::fs::File;
use std::io::BufWriter;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use crate::block::{gather_line, UncompressedBlock};
use crate::block::parallel::BlockPool;
use crate::block::writer::ChunkWriter;
use crate::compression::{BlockCodec, ByteVec, Compression};
use crate::error::{Error, Result, UnitResult, usize_to_i32};
use crate::file::WriteOptions;
use crate::frame_buffer::FrameBuffer;
use crate::io::{Seek, Write};
use crate::meta::attribute::LineOrder;
use crate::meta::header::Header;


/// A scan line file that is being written.
///
/// The header is written on construction. Then, attach a frame buffer
/// and write the lines of the data window in the line order of the header.
/// Call `finish` after the last line to write the offset table.
///
/// ```no_run
/// use exr_scanline::prelude::*;
///
/// let window = IntegerBounds::from_dimensions((2, 2));
/// let mut header = Header::with_window(window, LineOrder::Increasing, Compression::ZIP16)?;
/// header.insert_channel("Y", ChannelDescription::new(SampleType::F32));
///
/// let mut luma = vec![ 1.0_f32, 2.0, 3.0, 4.0 ];
/// let mut frame_buffer = FrameBuffer::new();
/// frame_buffer.insert_slice("Y", Slice::packed(luma.as_mut_slice(), window));
///
/// let mut file = OutputFile::create("luma.exr", header, 4)?;
/// file.set_frame_buffer(&frame_buffer)?;
/// file.write_pixels(2)?;
/// file.finish()?;
/// # Ok::<(), exr_scanline::error::Error>(())
/// ```
#[derive(Debug)]
pub struct OutputFile<'f, W: Write + Seek> {
    header: Header,

    /// Only `None` after the file has been finished.
    chunk_writer: Option<ChunkWriter<W>>,

    frame_buffer: Option<&'f FrameBuffer<'f>>,
    codec: Arc<dyn BlockCodec>,
    pool: BlockPool,

    lines_written: usize,

    /// The lines of a block that has been started, but not completed yet.
    pending_block: Option<PendingBlock>,
}

#[derive(Debug)]
struct PendingBlock {
    index: usize,

    /// The uncompressed bytes of each line, in the order they were written.
    lines: Vec<ByteVec>,
}


impl OutputFile<'_, BufWriter<File>> {

    /// Create a file at the path and write the header.
    /// Zero threads compress all blocks on the calling thread.
    pub fn create(path: impl AsRef<Path>, header: Header, thread_count: usize) -> Result<Self> {
        let path = path.as_ref();

        // no file is created for headers that cannot be written
        header.validate_for_scan_lines()?;

        let file = File::create(path).map_err(|error| Error::from(error).with_path(path))?;
        let options = WriteOptions::default().with_threads(thread_count);

        Self::new(BufWriter::new(file), header, options)
            .map_err(|error| error.with_path(path))
    }
}

impl<'f, W: Write + Seek> OutputFile<'f, W> {

    /// Validate the header and write it to the byte destination.
    ///
    /// Fails with `InvalidHeader` for a random line order, an invalid channel list,
    /// or a compression method without a built-in codec when no codec is specified in the options.
    pub fn new(write: W, header: Header, options: WriteOptions) -> Result<Self> {
        header.validate_for_scan_lines()?;

        let codec = options.codec
            .or_else(|| header.compression.builtin_codec())
            .ok_or_else(|| Error::header(format!(
                "{} requires a codec in the write options", header.compression
            )))?;

        let pool = if header.compression == Compression::Uncompressed { BlockPool::sequential() }
            else { BlockPool::new(options.threads, "exr block compressor") };

        let chunk_writer = ChunkWriter::new(write, &header)?;

        tracing::debug!(
            compression = %header.compression, channels = header.channels.len(),
            blocks = chunk_writer.total_chunks_count(), parallel = pool.is_parallel(),
            "created output file"
        );

        Ok(OutputFile {
            header, codec, pool,
            chunk_writer: Some(chunk_writer),
            frame_buffer: None,
            lines_written: 0,
            pending_block: None,
        })
    }

    /// The header that was written.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Use these slices for all following writes.
    /// Fails with `InvalidSlice` if a slice does not cover the data window
    /// or if its sampling differs from the channel in the header.
    pub fn set_frame_buffer(&mut self, frame_buffer: &'f FrameBuffer<'f>) -> UnitResult {
        frame_buffer.validate_for(&self.header)?;
        self.frame_buffer = Some(frame_buffer);
        Ok(())
    }

    /// The number of lines written so far.
    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    /// The line that must be written next.
    /// After the last line, this is just outside of the data window.
    pub fn current_scan_line(&self) -> i32 {
        let written = usize_to_i32(self.lines_written);

        match self.header.line_order {
            LineOrder::Decreasing => self.header.data_window.max.y() - written,
            _ => self.header.data_window.min.y() + written,
        }
    }

    /// Write the next lines, continuing where the previous write stopped.
    /// Writing zero lines does nothing.
    pub fn write_pixels(&mut self, line_count: usize) -> UnitResult {
        if line_count == 0 {
            return Ok(());
        }

        let current = i64::from(self.current_scan_line());
        let count = i64::try_from(line_count).unwrap_or(i64::MAX);

        let (first, last) = match self.header.line_order {
            LineOrder::Decreasing => (current.saturating_sub(count - 1), current),
            _ => (current, current.saturating_add(count - 1)),
        };

        let window = (self.header.data_window.min.y(), self.header.data_window.max.y());
        let clamp = |y: i64| y.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;

        if first < i64::from(window.0) || last > i64::from(window.1) {
            return Err(Error::OutOfRange { requested: (clamp(first), clamp(last)), window });
        }

        self.write_lines(clamp(first) ..= clamp(last))
    }

    /// Write exactly these lines. In increasing line order, the range must start at the
    /// current scan line, and in decreasing line order, the range must end at it.
    ///
    /// Lines are compressed as soon as their block is complete.
    /// If this fails, the file should be discarded.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn write_lines(&mut self, lines: RangeInclusive<i32>) -> UnitResult {
        let (first, last) = (*lines.start(), *lines.end());

        if first > last {
            return Err(Error::InvalidRange { y_min: first, y_max: last });
        }

        let data_window = self.header.data_window;
        let window = (data_window.min.y(), data_window.max.y());

        if first < window.0 || last > window.1 {
            return Err(Error::OutOfRange { requested: (first, last), window });
        }

        let expected = self.current_scan_line();
        let decreasing = self.header.line_order == LineOrder::Decreasing;
        let starts_at_cursor = if decreasing { last == expected } else { first == expected };

        if !starts_at_cursor {
            return Err(Error::OutOfOrderWrite { expected, requested: (first, last) });
        }

        let frame_buffer = self.frame_buffer.ok_or(Error::NoFrameBuffer)?;

        let mut completed_blocks = Vec::new();
        let mut gather = |y: i32| -> UnitResult {
            let mut line_bytes = ByteVec::new();
            gather_line(&self.header, frame_buffer, y, &mut line_bytes)?;

            let index = self.header.block_index_of(y);
            let pending = self.pending_block.get_or_insert_with(|| PendingBlock { index, lines: Vec::new() });
            debug_assert_eq!(pending.index, index, "lines of a block must be contiguous");
            pending.lines.push(line_bytes);

            let (block_first, block_last) = self.header.block_y_range(index);
            if pending.lines.len() == (block_last - block_first + 1) as usize {
                if let Some(PendingBlock { index, mut lines }) = self.pending_block.take() {
                    if decreasing { lines.reverse(); }

                    completed_blocks.push(UncompressedBlock {
                        index, data: lines.concat(),
                        layout: UncompressedBlock::layout_of(&self.header, index),
                    });
                }
            }

            Ok(())
        };

        if decreasing { (first ..= last).rev().try_for_each(&mut gather)?; }
        else { (first ..= last).try_for_each(&mut gather)?; }

        self.lines_written += (i64::from(last) - i64::from(first) + 1) as usize;
        self.write_blocks(completed_blocks)
    }

    /// Compress the blocks, possibly in parallel, and write them in the order they were completed.
    fn write_blocks(&mut self, blocks: Vec<UncompressedBlock>) -> UnitResult {
        if blocks.is_empty() {
            return Ok(());
        }

        let indices: Vec<usize> = blocks.iter().map(|block| block.index).collect();
        let compression = self.header.compression;
        let codec = self.codec.clone();

        let chunks = self.pool.map_ordered(blocks, move |block| {
            block.compress_to_chunk(compression, codec.as_ref())
        })?;

        let chunk_writer = self.chunk_writer.as_mut()
            .ok_or_else(|| Error::header("file is already finished"))?;

        for (index, chunk) in indices.into_iter().zip(chunks) {
            chunk_writer.write_chunk(index, chunk)?;
        }

        Ok(())
    }

    /// Write the offset table and return the byte destination.
    /// Fails with `IncompleteCoverage` if not all lines of the data window were written.
    pub fn finish(mut self) -> Result<W> {
        let expected = self.header.data_window.height();

        if self.lines_written != expected {
            return Err(Error::IncompleteCoverage { written: self.lines_written, expected });
        }

        let mut chunk_writer = self.chunk_writer.take()
            .ok_or_else(|| Error::header("file is already finished"))?;

        chunk_writer.complete_offset_table()?;
        tracing::debug!(lines = self.lines_written, "finished output file");

        Ok(chunk_writer.into_inner())
    }
}

impl<W: Write + Seek> Drop for OutputFile<'_, W> {
    fn drop(&mut self) {
        if let Some(mut chunk_writer) = self.chunk_writer.take() {
            if !chunk_writer.is_complete() {
                tracing::warn!(
                    written = self.lines_written, expected = self.header.data_window.height(),
                    "output file dropped before all lines were written, the file will be incomplete"
                );
            }

            if let Err(error) = chunk_writer.complete_offset_table() {
                tracing::warn!(%error, "cannot write the offset table of the dropped output file");
            }
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use crate::frame_buffer::Slice;
    use crate::meta::attribute::{ChannelDescription, IntegerBounds, SampleType};

    fn header(line_order: LineOrder, compression: Compression) -> Header {
        let mut header = Header::with_window(IntegerBounds::new((0, -2), (3, 17)), line_order, compression).unwrap();
        header.insert_channel("Z", ChannelDescription::new(SampleType::F32));
        header
    }

    #[test]
    fn cursor_follows_line_order() {
        let header = header(LineOrder::Decreasing, Compression::ZIP16);
        let mut depth = vec![ 0.5_f32; 4 * 20 ];

        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert_slice("Z", Slice::packed(depth.as_mut_slice(), header.data_window));

        let mut file = OutputFile::new(Cursor::new(Vec::new()), header, WriteOptions::default()).unwrap();
        file.set_frame_buffer(&frame_buffer).unwrap();
        assert_eq!(file.current_scan_line(), 17);

        // the lowest block of 16 lines is incomplete
        file.write_pixels(3).unwrap();
        assert_eq!(file.current_scan_line(), 14);
        assert!(file.pending_block.is_some());

        // the lowest block is complete now
        file.write_lines(14 ..= 14).unwrap();
        assert!(file.pending_block.is_none());
        assert_eq!(file.lines_written(), 4);

        assert!(matches!(file.write_lines(0 ..= 5), Err(Error::OutOfOrderWrite { expected: 13, .. })));
        assert!(matches!(file.write_pixels(100), Err(Error::OutOfRange { .. })));

        file.write_pixels(16).unwrap();
        assert_eq!(file.current_scan_line(), -3);
        assert!(file.finish().is_ok());
    }

    #[test]
    fn writes_need_frame_buffer() {
        let header = header(LineOrder::Increasing, Compression::Uncompressed);
        let mut file = OutputFile::new(Cursor::new(Vec::new()), header, WriteOptions::default()).unwrap();

        assert!(matches!(file.write_pixels(1), Err(Error::NoFrameBuffer)));
        assert!(file.write_pixels(0).is_ok());
        assert!(matches!(file.write_lines(3 ..= 2), Err(Error::InvalidRange { y_min: 3, y_max: 2 })));
        assert!(matches!(file.finish(), Err(Error::IncompleteCoverage { written: 0, expected: 20 })));
    }

    #[test]
    fn missing_codec_is_invalid() {
        let header = header(LineOrder::Increasing, Compression::B44);
        let result = OutputFile::new(Cursor::new(Vec::new()), header, WriteOptions::default());
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }
}
