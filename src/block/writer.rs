//! Write the meta data, the compressed blocks, and finally the offset table of a file.

use std::ops::Range;

use crate::block::chunk::Chunk;
use crate::error::{Error, Result, UnitResult, usize_to_u64};
use crate::io::{Data, Seek, Tracking, Write};
use crate::meta::{magic_number, Requirements};
use crate::meta::header::Header;


/// Can consume compressed pixel chunks, writing them to a byte destination.
/// Remembers the position of each chunk, so that the offset table
/// can be written after the last chunk.
#[derive(Debug)]
#[must_use]
pub struct ChunkWriter<W> {
    byte_writer: Tracking<W>,
    offset_table_byte_location: Range<usize>,
    offsets_increasing_y: Vec<u64>,
}

impl<W> ChunkWriter<W> where W: Write + Seek {

    /// Writes the meta data and a zeroed offset table as a placeholder.
    /// Does not validate the header.
    pub fn new(write: W, header: &Header) -> Result<Self> {
        let mut byte_writer = Tracking::new(write);

        magic_number::write(&mut byte_writer)?;
        Requirements::scan_lines(header.channels.has_long_names()).write(&mut byte_writer)?;
        header.write(&mut byte_writer)?;

        let block_count = header.block_count();
        let offset_table_start_byte = byte_writer.byte_position();
        let offset_table_end_byte = offset_table_start_byte + block_count * u64::BYTE_SIZE;

        // skip offset table, filling with 0, will be updated after the last chunk has been written
        byte_writer.seek_write_to(offset_table_end_byte)?;

        tracing::debug!(block_count, header_bytes = offset_table_start_byte, "wrote header");

        Ok(ChunkWriter {
            byte_writer,
            offset_table_byte_location: offset_table_start_byte .. offset_table_end_byte,
            offsets_increasing_y: vec![0_u64; block_count],
        })
    }

    /// The total number of chunks that the complete file will contain.
    pub fn total_chunks_count(&self) -> usize {
        self.offsets_increasing_y.len()
    }

    /// Whether a chunk was written for each block.
    pub fn is_complete(&self) -> bool {
        self.offsets_increasing_y.iter().all(|&offset| offset != 0)
    }

    /// Append the chunk and remember its position.
    /// Errors when the chunk at this index was already written.
    pub fn write_chunk(&mut self, index_in_header_increasing_y: usize, chunk: Chunk) -> UnitResult {
        let offset = self.offsets_increasing_y.get_mut(index_in_header_increasing_y)
            .ok_or_else(|| Error::header("too large chunk index"))?;

        if *offset != 0 {
            return Err(Error::header(format!("chunk at index {} is already written", index_in_header_increasing_y)));
        }

        *offset = usize_to_u64(self.byte_writer.byte_position());
        chunk.write(&mut self.byte_writer)?;

        tracing::trace!(
            block = index_in_header_increasing_y, y = chunk.y_coordinate,
            bytes = chunk.compressed_pixels_le.len(), "wrote block"
        );

        Ok(())
    }

    /// Seek back to the meta data, write the offset table, and flush the byte writer.
    /// Blocks that were not written keep a zero offset.
    /// Leaves the writer seeked to the end of the offset table.
    pub fn complete_offset_table(&mut self) -> UnitResult {
        self.byte_writer.seek_write_to(self.offset_table_byte_location.start)?;
        u64::write_slice(&mut self.byte_writer, self.offsets_increasing_y.as_slice())?;

        self.byte_writer.flush()?; // make sure we catch all (possibly delayed) io errors before returning
        Ok(())
    }

    /// Give up the writer.
    pub fn into_inner(self) -> W {
        self.byte_writer.into_inner()
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use crate::compression::Compression;
    use crate::meta::attribute::{ChannelDescription, IntegerBounds, LineOrder, SampleType};

    #[test]
    fn offsets_are_patched_in() {
        let mut header = Header::with_window(
            IntegerBounds::from_dimensions((1, 2)),
            LineOrder::Increasing, Compression::Uncompressed
        ).unwrap();

        header.insert_channel("Y", ChannelDescription::new(SampleType::U32));

        let mut writer = ChunkWriter::new(Cursor::new(Vec::new()), &header).unwrap();
        let table_start = writer.offset_table_byte_location.start;
        assert_eq!(writer.total_chunks_count(), 2);

        writer.write_chunk(1, Chunk { y_coordinate: 1, compressed_pixels_le: vec![ 0; 4 ] }).unwrap();
        assert!(!writer.is_complete());
        assert!(writer.write_chunk(1, Chunk { y_coordinate: 1, compressed_pixels_le: Vec::new() }).is_err());

        writer.write_chunk(0, Chunk { y_coordinate: 0, compressed_pixels_le: vec![ 0; 4 ] }).unwrap();
        assert!(writer.is_complete());

        writer.complete_offset_table().unwrap();
        let bytes = writer.into_inner().into_inner();

        let table: Vec<u64> = bytes[table_start .. table_start + 16].chunks_exact(8)
            .map(|bytes| u64::from_le_bytes(bytes.try_into().unwrap()))
            .collect();

        let table_end = table_start as u64 + 16;
        assert_eq!(table, vec![ table_end + 12, table_end ]);
    }
}
