use super::*;
use super::optimize_bytes::*;

const MIN_RUN_LENGTH : usize = 3;
const MAX_RUN_LENGTH : usize = 127;


/// Run length encoding of the reordered block bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLength;

impl BlockCodec for RunLength {
    fn compress(&self, _: &BlockLayout, uncompressed: Bytes<'_>) -> Result<ByteVec> {
        Ok(compress_bytes(uncompressed))
    }

    fn decompress(&self, layout: &BlockLayout, compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
        decompress_bytes(compressed, expected_byte_size).ok_or_else(|| layout.corrupt("run length encoding is malformed"))
    }
}


fn decompress_bytes(mut remaining: Bytes<'_>, expected_byte_size: usize) -> Option<ByteVec> {
    let mut decompressed = Vec::with_capacity(expected_byte_size.min(8*2048));

    while !remaining.is_empty() {
        let count = take_1(&mut remaining)? as i8 as i32;

        if count < 0 {
            // take the next '-count' bytes as-is
            let values = take_n(&mut remaining, (-count) as usize)?;
            decompressed.extend_from_slice(values);
        }
        else {
            // repeat the next value 'count + 1' times
            let value = take_1(&mut remaining)?;
            decompressed.resize(decompressed.len() + count as usize + 1, value);
        }

        if decompressed.len() > expected_byte_size {
            return None;
        }
    }

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);
    Some(decompressed)
}

fn compress_bytes(uncompressed: Bytes<'_>) -> ByteVec {
    let mut data = Vec::from(uncompressed);
    separate_bytes_fragments(&mut data);
    samples_to_differences(&mut data);

    let mut compressed = Vec::with_capacity(data.len());
    let mut run_start = 0;
    let mut run_end = 1;

    while run_start < data.len() {
        while
            run_end < data.len()
                && data[run_start] == data[run_end]
                && (run_end - run_start) as i32 - 1 < MAX_RUN_LENGTH as i32
            {
                run_end += 1;
            }

        if run_end - run_start >= MIN_RUN_LENGTH {
            compressed.push(((run_end - run_start) as i32 - 1) as u8);
            compressed.push(data[run_start]);
            run_start = run_end;

        } else {
            while
                run_end < data.len() && (
                    (run_end + 1 >= data.len() || data[run_end] != data[run_end + 1])
                        || (run_end + 2 >= data.len() || data[run_end + 1] != data[run_end + 2])
                ) && run_end - run_start < MAX_RUN_LENGTH
                {
                    run_end += 1;
                }

            compressed.push((run_start as i32 - run_end as i32) as u8);
            compressed.extend_from_slice(&data[run_start .. run_end]);

            run_start = run_end;
            run_end += 1;
        }
    }

    compressed
}

fn take_1(slice: &mut &[u8]) -> Option<u8> {
    let (&first, rest) = slice.split_first()?;
    *slice = rest;
    Some(first)
}

fn take_n<'s>(slice: &mut &'s [u8], n: usize) -> Option<&'s [u8]> {
    if n > slice.len() { return None; }

    let (front, back) = slice.split_at(n);
    *slice = back;
    Some(front)
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn runs_and_literals() {
        let data = vec![ 0, 23, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 0, 0, 0, 1, 23, 43, 4 ];
        let compressed = compress_bytes(&data);
        let decompressed = decompress_bytes(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn long_flat_area_shrinks() {
        let data = vec![ 9_u8; 1000 ];
        let compressed = compress_bytes(&data);
        assert!(compressed.len() < 40, "{} bytes", compressed.len());
        assert_eq!(decompress_bytes(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn truncated_input_is_rejected() {
        // a literal run of five bytes with only two present
        assert!(decompress_bytes(&[ (-5_i8) as u8, 1, 2 ], 5).is_none());

        // a repetition without its value
        assert!(decompress_bytes(&[ 3 ], 4).is_none());

        // more bytes than the block can hold
        assert!(decompress_bytes(&[ 100, 7 ], 4).is_none());
    }
}
