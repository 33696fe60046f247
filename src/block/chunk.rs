
//! Read and write already compressed pixel data blocks.
//! Does not include the process of compression and decompression.

use crate::compression::ByteVec;
use crate::error::*;
use crate::io::*;


/// A block of possibly compressed scan lines, as stored in the file.
/// The byte data is in little-endian format,
/// as these bytes will be written into the file directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {

    /// The block's y coordinate is the pixel space y coordinate of the top scan line in the block.
    /// The top scan line block in the image is aligned with the top edge of the data window.
    pub y_coordinate: i32,

    /// One or more scan lines, possibly compressed.
    /// For each line in the block, for each channel, the row values are contiguous.
    pub compressed_pixels_le: ByteVec,
}

impl Chunk {

    /// Number of bytes before the pixels.
    pub const PREFIX_BYTE_SIZE: usize = 2 * i32::BYTE_SIZE;

    /// Without validation, write this instance to the byte stream.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        let size = i32::try_from(self.compressed_pixels_le.len()).map_err(|_| Error::unsupported(format!(
            "block at line {} has {} bytes, more than a chunk can store",
            self.y_coordinate, self.compressed_pixels_le.len()
        )))?;

        self.y_coordinate.write(write)?;
        size.write(write)?;
        u8::write_slice(write, &self.compressed_pixels_le)
    }

    /// Read the chunk that starts at `position`, which is expected to contain the line `expected_y`.
    /// The size of the chunk must not exceed the end of the file.
    pub fn read(read: &mut impl Read, position: usize, file_length: usize, expected_y: i32) -> Result<Self> {
        let y_coordinate = i32::read(read).map_err(|error| error.into_corrupt_block(expected_y))?;
        let size = i32::read(read).map_err(|error| error.into_corrupt_block(expected_y))?;

        if y_coordinate != expected_y {
            return Err(Error::corrupt(expected_y, format!("block at byte {} starts at line {}", position, y_coordinate)));
        }

        let size = usize::try_from(size)
            .map_err(|_| Error::corrupt(expected_y, "negative block size"))?;

        if position + Self::PREFIX_BYTE_SIZE + size > file_length {
            return Err(Error::corrupt(expected_y, "block size exceeds the end of the file"));
        }

        let compressed_pixels_le = u8::read_vec(read, size, 1024 * 1024)
            .map_err(|error| error.into_corrupt_block(expected_y))?;

        Ok(Chunk { y_coordinate, compressed_pixels_le })
    }
}
