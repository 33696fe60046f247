
//! Describes the structure of an exr file:
//! the magic number, the version field, and the header.

pub mod attribute;
pub mod header;


use crate::io::*;
use crate::error::*;
use bit_field::BitField;


/// The format version that this library writes, and the newest it reads.
pub const FORMAT_VERSION: u8 = 2;

/// The version number and feature flags found at the start of each exr file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Requirements {

    /// This is currently always 2.
    pub file_format_version: u8,

    /// If true, this image has tiled blocks and contains only a single layer.
    pub is_single_layer_and_tiled: bool,

    /// Whether this file has strings with a length greater than 31.
    pub has_long_names: bool,

    /// This image contains at least one layer with deep data.
    pub has_deep_data: bool,

    /// Whether this file contains multiple layers.
    pub has_multiple_layers: bool,
}


/// The first four bytes of each exr file.
pub mod magic_number {
    use super::*;

    /// The first four bytes of each exr file.
    pub const BYTES: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

    /// Without validation, write this instance to the byte stream.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, &self::BYTES)
    }

    /// Consumes four bytes from the reader and returns whether the file may be an exr file.
    pub fn is_exr(read: &mut impl Read) -> Result<bool> {
        let mut magic_num = [0; 4];
        u8::read_slice(read, &mut magic_num)?;
        Ok(magic_num == self::BYTES)
    }

    /// Validate this image. If it is an exr file, return `Ok(())`.
    pub fn validate_exr(read: &mut impl Read) -> UnitResult {
        if self::is_exr(read).map_err(Error::into_malformed_header)? {
            Ok(())
        }
        else {
            Err(Error::malformed("file identifier missing"))
        }
    }
}

/// A `0_u8` at the end of a sequence.
pub mod sequence_end {
    use super::*;

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(write: &mut W) -> UnitResult {
        0_u8.write(write)
    }

    /// Peeks the next byte. If it is zero, consumes the byte and returns true.
    pub fn has_come(read: &mut PeekRead<impl Read>) -> Result<bool> {
        Ok(read.skip_if_eq(0)?)
    }
}


impl Requirements {

    /// The version field of a single layer scan line file.
    pub fn scan_lines(has_long_names: bool) -> Self {
        Requirements {
            file_format_version: FORMAT_VERSION,
            is_single_layer_and_tiled: false,
            has_long_names,
            has_deep_data: false,
            has_multiple_layers: false,
        }
    }

    /// Decode the raw version field.
    /// Returns `UnsupportedVersion` for unknown versions and reserved flags.
    pub fn from_raw(version_and_flags: u32) -> Result<Self> {

        // take the 8 least significant bits, they contain the file format version number
        let version = (version_and_flags & 0x00FF) as u8;

        // the 24 most significant bits are treated as a set of boolean flags
        let is_single_tile = version_and_flags.get_bit(9);
        let has_long_names = version_and_flags.get_bit(10);
        let has_deep_data = version_and_flags.get_bit(11);
        let has_multiple_layers = version_and_flags.get_bit(12);

        // all remaining bits except 9, 10, 11 and 12 are reserved and should be 0
        // if a file has any of these bits set to 1, it means this file contains
        // a feature that we don't support
        let unknown_flags = version_and_flags >> 13;

        if unknown_flags != 0 || version_and_flags.get_bit(8) || !(1 ..= FORMAT_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion { version: version_and_flags });
        }

        Ok(Requirements {
            file_format_version: version,
            is_single_layer_and_tiled: is_single_tile,
            has_long_names, has_deep_data, has_multiple_layers,
        })
    }

    /// Encode this instance as the raw version field.
    pub fn to_raw(self) -> u32 {

        // the 8 least significant bits contain the file format version number
        // and the flags are set to 0
        let mut version_and_flags = self.file_format_version as u32;

        // the 24 most significant bits are treated as a set of boolean flags
        version_and_flags.set_bit(9, self.is_single_layer_and_tiled);
        version_and_flags.set_bit(10, self.has_long_names);
        version_and_flags.set_bit(11, self.has_deep_data);
        version_and_flags.set_bit(12, self.has_multiple_layers);
        version_and_flags
    }

    /// Read the raw version field and decode it.
    pub fn read<R: Read>(read: &mut R) -> Result<(u32, Self)> {
        let raw = u32::read(read).map_err(Error::into_malformed_header)?;
        Ok((raw, Self::from_raw(raw)?))
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        self.to_raw().write(write)
    }

    /// Only single layer flat scan line files can be read by this library.
    pub fn validate_scan_lines(&self) -> UnitResult {
        if self.is_single_layer_and_tiled {
            return Err(Error::unsupported("tiled images"));
        }

        if self.has_deep_data {
            return Err(Error::unsupported("deep data"));
        }

        if self.has_multiple_layers {
            return Err(Error::unsupported("multi-part files"));
        }

        Ok(())
    }
}
