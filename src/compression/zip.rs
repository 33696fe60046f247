use super::*;
use super::optimize_bytes::*;


/// Zlib compression of the reordered block bytes.
/// Used for both `ZIP1` and `ZIP16`, which only differ in the lines per block.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip;

impl BlockCodec for Zip {
    fn compress(&self, _: &BlockLayout, uncompressed: Bytes<'_>) -> Result<ByteVec> {
        let mut packed = Vec::from(uncompressed);

        separate_bytes_fragments(&mut packed);
        samples_to_differences(&mut packed);

        Ok(compress_zlib(&packed))
    }

    fn decompress(&self, layout: &BlockLayout, compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
        let mut decompressed = decompress_zlib(layout, compressed, expected_byte_size)?;

        differences_to_samples(&mut decompressed);
        interleave_byte_blocks(&mut decompressed);

        Ok(decompressed)
    }
}


/// Zlib without any reordering, shared with the pxr24 codec.
pub(super) fn compress_zlib(bytes: Bytes<'_>) -> ByteVec {
    miniz_oxide::deflate::compress_to_vec_zlib(bytes, 4)
}

/// Inflates at most `expected_byte_size` bytes.
pub(super) fn decompress_zlib(layout: &BlockLayout, compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let options = zune_inflate::DeflateOptions::default()
        .set_limit(expected_byte_size)
        .set_size_hint(expected_byte_size);

    zune_inflate::DeflateDecoder::new_with_options(compressed, options)
        .decode_zlib()
        .map_err(|_| layout.corrupt("zlib-compressed data malformed"))
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::IntegerBounds;

    #[test]
    fn gradient_round_trip() {
        let channels = [ ChannelDescription::new(SampleType::F16) ];
        let layout = BlockLayout::new(IntegerBounds::new((0, 0), (63, 15)), &channels);

        let bytes: ByteVec = (0 .. layout.byte_size()).map(|index| (index / 7) as u8).collect();
        let compressed = Zip.compress(&layout, &bytes).unwrap();
        assert!(compressed.len() < bytes.len());

        let decompressed = Zip.decompress(&layout, &compressed, bytes.len()).unwrap();
        assert_eq!(decompressed, bytes);
    }

    #[test]
    fn garbage_is_corrupt() {
        let channels = [ ChannelDescription::new(SampleType::F32) ];
        let layout = BlockLayout::new(IntegerBounds::new((0, 5), (3, 5)), &channels);

        let result = Zip.decompress(&layout, &[ 1, 2, 3, 4, 5 ], 16);
        assert!(matches!(result, Err(Error::CorruptBlock { y: 5, .. })));
    }
}
