//! Locate and read the compressed blocks of a file through its offset table.

use std::io::ErrorKind;

use crate::block::chunk::Chunk;
use crate::error::{Error, Result, u64_to_usize};
use crate::io::{Data, PeekRead, Read, Seek, Tracking};
use crate::meta::header::Header;


/// Reads compressed blocks by their index.
/// Knows the byte position of every block that could be located.
#[derive(Debug)]
pub struct ChunkReader<R> {
    byte_reader: PeekRead<Tracking<R>>,
    file_length: usize,

    /// The byte position of each block, in increasing y order.
    /// `None` if the block could not be found.
    offsets: Vec<Option<usize>>,
}

impl<R: Read + Seek> ChunkReader<R> {

    /// Read the offset table, which starts directly at the current position of the reader.
    /// If the table is damaged, the positions are recovered
    /// by scanning the blocks that follow the table.
    pub fn read_offset_table(mut byte_reader: PeekRead<Tracking<R>>, header: &Header, file_length: usize) -> Result<Self> {
        let block_count = header.block_count();

        // every block needs at least one byte in the file,
        // which prevents allocating huge tables for absurd data windows
        if block_count > file_length {
            return Err(Error::malformed(format!("{} blocks cannot fit into a file of {} bytes", block_count, file_length)));
        }

        let table_start = byte_reader.byte_position();
        let table_end = table_start + block_count * u64::BYTE_SIZE;

        let mut offsets = Vec::with_capacity(block_count);
        for _ in 0 .. block_count {
            match u64::read(&mut byte_reader) {
                Ok(offset) => offsets.push(u64_to_usize(offset)),
                Err(Error::Io { ref error, .. }) if error.kind() == ErrorKind::UnexpectedEof => break,
                Err(error) => return Err(error),
            }
        }

        offsets.resize(block_count, None);

        let is_valid = |offset: usize| offset >= table_end
            && offset.checked_add(Chunk::PREFIX_BYTE_SIZE).map_or(false, |end| end <= file_length);

        for offset in &mut offsets {
            *offset = offset.filter(|&offset| is_valid(offset));
        }

        let mut reader = ChunkReader { byte_reader, file_length, offsets };

        let invalid_count = reader.offsets.iter().filter(|offset| offset.is_none()).count();
        if invalid_count != 0 {
            tracing::warn!(invalid_count, block_count, "offset table is damaged, scanning blocks");
            reader.reconstruct_offsets(header, table_end)?;
        }

        Ok(reader)
    }

    /// Walk through the blocks after the offset table and
    /// remember the position of each block that has no valid offset.
    /// Stops at the first block that cannot be parsed.
    fn reconstruct_offsets(&mut self, header: &Header, table_end: usize) -> Result<()> {
        let data_window = header.data_window;
        let lines_per_block = header.lines_per_block() as i64;
        let mut position = table_end;

        while position + Chunk::PREFIX_BYTE_SIZE <= self.file_length {
            self.byte_reader.skip_to(position)?;

            let (y, size) = match (i32::read(&mut self.byte_reader), i32::read(&mut self.byte_reader)) {
                (Ok(y), Ok(size)) => (y, size),
                _ => break,
            };

            let relative_y = i64::from(y) - i64::from(data_window.min.y());
            if data_window.contains_line(y) && relative_y % lines_per_block == 0 {
                let index = (relative_y / lines_per_block) as usize;

                if let Some(offset) = self.offsets.get_mut(index) {
                    if offset.is_none() { *offset = Some(position); }
                }
            }

            let next = usize::try_from(size).ok()
                .and_then(|size| position.checked_add(Chunk::PREFIX_BYTE_SIZE + size));

            match next {
                Some(next) if next <= self.file_length => position = next,
                _ => break,
            }
        }

        let found = self.offsets.iter().filter(|offset| offset.is_some()).count();
        tracing::debug!(found, block_count = self.offsets.len(), "reconstructed offset table");

        Ok(())
    }

    /// Whether the position of every block is known.
    pub fn is_complete(&self) -> bool {
        self.offsets.iter().all(Option::is_some)
    }

    /// Read the compressed block with this index.
    /// Fails with `CorruptBlock` if the block cannot be found or does not fit into the file.
    pub fn read_chunk(&mut self, index: usize, header: &Header) -> Result<Chunk> {
        let (expected_y, _) = header.block_y_range(index);

        let position = self.offsets.get(index).copied().flatten()
            .ok_or_else(|| Error::corrupt(expected_y, "block is missing from the offset table"))?;

        self.byte_reader.skip_to(position)?;
        Chunk::read(&mut self.byte_reader, position, self.file_length, expected_y)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use crate::block::writer::ChunkWriter;
    use crate::compression::Compression;
    use crate::meta::attribute::{ChannelDescription, IntegerBounds, LineOrder, SampleType};
    use crate::meta::{magic_number, Requirements};

    fn header() -> Header {
        let mut header = Header::with_window(
            IntegerBounds::new((0, 10), (0, 12)),
            LineOrder::Increasing, Compression::Uncompressed
        ).unwrap();

        header.insert_channel("Y", ChannelDescription::new(SampleType::U32));
        header
    }

    fn file_bytes(header: &Header, write_table: bool) -> Vec<u8> {
        let mut writer = ChunkWriter::new(Cursor::new(Vec::new()), header).unwrap();

        for index in 0 .. 3 {
            let chunk = Chunk { y_coordinate: 10 + index as i32, compressed_pixels_le: vec![ index as u8; 4 ] };
            writer.write_chunk(index, chunk).unwrap();
        }

        if write_table { writer.complete_offset_table().unwrap(); }
        writer.into_inner().into_inner()
    }

    fn reader(bytes: Vec<u8>, header: &Header) -> ChunkReader<Cursor<Vec<u8>>> {
        let file_length = bytes.len();
        let mut byte_reader = PeekRead::new(Tracking::new(Cursor::new(bytes)));

        magic_number::validate_exr(&mut byte_reader).unwrap();
        Requirements::read(&mut byte_reader).unwrap();
        let parsed = Header::read(&mut byte_reader, false, true).unwrap();
        assert_eq!(&parsed, header);

        ChunkReader::read_offset_table(byte_reader, header, file_length).unwrap()
    }

    #[test]
    fn read_chunks_by_index() {
        let header = header();
        let mut reader = reader(file_bytes(&header, true), &header);
        assert!(reader.is_complete());

        let chunk = reader.read_chunk(2, &header).unwrap();
        assert_eq!(chunk, Chunk { y_coordinate: 12, compressed_pixels_le: vec![ 2; 4 ] });

        let chunk = reader.read_chunk(0, &header).unwrap();
        assert_eq!(chunk.y_coordinate, 10);
    }

    #[test]
    fn zeroed_table_is_reconstructed() {
        let header = header();
        let mut reader = reader(file_bytes(&header, false), &header);
        assert!(reader.is_complete());

        let chunk = reader.read_chunk(1, &header).unwrap();
        assert_eq!(chunk, Chunk { y_coordinate: 11, compressed_pixels_le: vec![ 1; 4 ] });
    }

    #[test]
    fn truncated_file_misses_blocks() {
        let header = header();
        let mut bytes = file_bytes(&header, true);
        bytes.truncate(bytes.len() - 6);

        let mut reader = reader(bytes, &header);
        assert!(!reader.is_complete());
        assert!(reader.read_chunk(1, &header).is_ok());

        assert!(matches!(
            reader.read_chunk(2, &header),
            Err(Error::CorruptBlock { y: 12, .. })
        ));
    }
}
