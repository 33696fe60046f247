
//! Specialized binary input and output.
//! Uses the error handling for this crate.

pub use ::std::io::{Read, Write, Seek, SeekFrom};
use half::slice::HalfFloatSliceExt;
use lebe::prelude::*;
use ::half::f16;
use crate::error::{Error, Result, UnitResult, IoResult};

/// Skip reading uninteresting bytes without allocating.
#[inline]
pub fn skip_bytes(read: &mut impl Read, count: usize) -> IoResult<()> {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count as u64),
        &mut std::io::sink()
    )?;

    if skipped < count as u64 {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }

    Ok(())
}

/// Peek a single byte without consuming it.
#[derive(Debug)]
pub struct PeekRead<T> {

    /// Cannot be exposed as it will not contain peeked values anymore.
    inner: T,

    peeked: Option<IoResult<u8>>,
}

impl<T: Read> PeekRead<T> {

    /// Wrap a reader without peeking yet.
    #[inline]
    pub fn new(inner: T) -> Self {
        Self { inner, peeked: None }
    }

    /// Read a single byte and return that without consuming it.
    /// The next `read` call will include that byte.
    #[inline]
    pub fn peek_u8(&mut self) -> &IoResult<u8> {
        let inner = &mut self.inner;
        self.peeked.get_or_insert_with(|| u8::read_from_little_endian(inner))
    }

    /// Skip a single byte if it equals the specified value.
    /// Returns whether the value was found.
    /// Consumes the peeked result if an error occurred.
    #[inline]
    pub fn skip_if_eq(&mut self, value: u8) -> IoResult<bool> {
        match self.peek_u8() {
            Ok(peeked) if *peeked == value => {
                self.peeked = None; // consume the byte
                Ok(true)
            },

            Ok(_) => Ok(false),

            // io errors cannot be cloned, so the peeked error is taken out
            Err(_) => match self.peeked.take() {
                Some(Err(error)) => Err(error),
                _ => Ok(false),
            }
        }
    }
}


impl<T: Read> Read for PeekRead<T> {
    fn read(&mut self, target_buffer: &mut [u8]) -> IoResult<usize> {
        if target_buffer.is_empty() {
            return Ok(0)
        }

        match self.peeked.take() {
            None => self.inner.read(target_buffer),
            Some(peeked) => {
                target_buffer[0] = peeked?;

                // indexing [1..] is safe because an empty buffer already returned ok
                Ok(1 + self.inner.read(&mut target_buffer[1..])?)
            }
        }
    }
}

impl<T: Read + Seek> PeekRead<Tracking<T>> {

    /// Seek this read to the specified byte position.
    /// Discards any previously peeked value.
    pub fn skip_to(&mut self, position: usize) -> IoResult<()> {
        self.inner.seek_read_to(position)?;
        self.peeked = None;
        Ok(())
    }

    /// Current number of bytes read, not counting a peeked byte.
    pub fn byte_position(&self) -> usize {
        match self.peeked {
            Some(Ok(_)) => self.inner.byte_position() - 1,
            _ => self.inner.byte_position(),
        }
    }
}

/// Keep track of what byte we are at.
/// Used to skip back to a previous place after writing some information.
#[derive(Debug)]
pub struct Tracking<T> {

    /// Do not expose to prevent seeking without updating position
    inner: T,

    position: usize,
}

impl<T: Read> Read for Tracking<T> {
    fn read(&mut self, buffer: &mut [u8]) -> IoResult<usize> {
        let count = self.inner.read(buffer)?;
        self.position += count;
        Ok(count)
    }
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buffer: &[u8]) -> IoResult<usize> {
        let count = self.inner.write(buffer)?;
        self.position += count;
        Ok(count)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}

impl<T> Tracking<T> {

    /// If `inner` is a reference, if must never be seeked directly,
    /// but only through this `Tracking` instance.
    pub fn new(inner: T) -> Self {
        Tracking { inner, position: 0 }
    }

    /// Current number of bytes written or read.
    pub fn byte_position(&self) -> usize {
        self.position
    }

    /// Give up position tracking and return the wrapped stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Seek> Tracking<T> {

    /// Set the reader to the specified byte position.
    /// If it is only a couple of bytes, no seek system call is performed.
    pub fn seek_read_to(&mut self, target_position: usize) -> IoResult<()> {
        let delta = target_position as i64 - self.position as i64;

        if delta > 0 && delta < 16 {
            skip_bytes(&mut self.inner, delta as usize)?;
            self.position += delta as usize;
        }
        else if delta != 0 {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
            self.position = target_position;
        }

        Ok(())
    }
}

impl<T: Write + Seek> Tracking<T> {

    /// Move the writing cursor to the specified target byte index.
    /// If seeking forward, this will write zeroes.
    pub fn seek_write_to(&mut self, target_position: usize) -> IoResult<()> {
        if target_position < self.position {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
        }
        else if target_position > self.position {
            std::io::copy(
                &mut std::io::repeat(0).take((target_position - self.position) as u64),
                &mut self.inner
            )?;
        }

        self.position = target_position;
        Ok(())
    }
}

/// Determine the total byte length of a stream and rewind it to the start.
pub fn stream_length(stream: &mut impl Seek) -> IoResult<u64> {
    let length = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(length)
}


/// Generic trait that defines common binary operations such as reading and writing for this type.
pub trait Data: Sized + Default + Clone {

    /// Number of bytes this would consume in an exr file.
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Read a value of type `Self`.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Read as many values of type `Self` as fit into the specified slice.
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult;

    /// Write this value to the writer.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Write all values of that slice to the writer.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;

    /// Read as many values of type `Self` as specified with `data_size`.
    ///
    /// This method will not allocate more memory than `soft_max` at once,
    /// so that a corrupt size field cannot exhaust memory before the stream ends.
    #[inline]
    fn read_vec(read: &mut impl Read, data_size: usize, soft_max: usize) -> Result<Vec<Self>> {
        let mut data = Vec::with_capacity(data_size.min(soft_max));

        // (most of the time, this loop will run only once)
        while data.len() < data_size {
            let chunk_start = data.len();
            let chunk_end = (chunk_start + soft_max).min(data_size);

            data.resize(chunk_end, Self::default());
            Self::read_slice(read, &mut data[chunk_start .. chunk_end])?;
        }

        Ok(data)
    }
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            #[inline]
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            #[inline]
            fn write(self, write: &mut impl Write) -> Result<()> {
                write.write_as_little_endian(&self)?;
                Ok(())
            }

            #[inline]
            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> Result<()> {
                read.read_from_little_endian_into(slice)?;
                Ok(())
            }

            #[inline]
            fn write_slice(write: &mut impl Write, slice: &[Self]) -> Result<()> {
                write.write_as_little_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(f32);


impl Data for f16 {
    #[inline]
    fn read(read: &mut impl Read) -> Result<Self> {
        u16::read(read).map(f16::from_bits)
    }

    #[inline]
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> Result<()> {
        let bits = slice.reinterpret_cast_mut();
        u16::read_slice(read, bits)
    }

    #[inline]
    fn write(self, write: &mut impl Write) -> Result<()> {
        self.to_bits().write(write)
    }

    #[inline]
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> Result<()> {
        let bits = slice.reinterpret_cast();
        u16::write_slice(write, bits)
    }
}

/// Read a null-terminated string of at most `max_len` bytes.
pub fn read_null_terminated(read: &mut impl Read, max_len: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();

    loop {
        match u8::read(read)? {
            0 => break,
            byte => bytes.push(byte),
        }

        if bytes.len() > max_len {
            return Err(Error::malformed("text too long"));
        }
    }

    Ok(bytes)
}

/// Write the bytes followed by a single zero byte.
pub fn write_null_terminated(bytes: &[u8], write: &mut impl Write) -> UnitResult {
    u8::write_slice(write, bytes)?;
    0_u8.write(write)
}


#[cfg(test)]
mod test {
    use crate::io::*;
    use std::io::Cursor;

    #[test]
    fn peek() {
        let buffer: &[u8] = &[0,1,2,3];
        let mut peek = PeekRead::new(buffer);

        assert_eq!(peek.peek_u8().as_ref().unwrap(), &0);
        assert_eq!(peek.peek_u8().as_ref().unwrap(), &0);
        assert_eq!(u8::read_from_little_endian(&mut peek).unwrap(), 0_u8);

        assert_eq!(peek.read(&mut [0,0]).unwrap(), 2);

        assert_eq!(peek.peek_u8().as_ref().unwrap(), &3);
        assert_eq!(u8::read_from_little_endian(&mut peek).unwrap(), 3_u8);

        assert!(peek.peek_u8().is_err());
        assert!(peek.skip_if_eq(0).is_err());
        assert!(u8::read_from_little_endian(&mut peek).is_err());
    }

    #[test]
    fn tracking_position_ignores_peeked_byte() {
        let mut read = PeekRead::new(Tracking::new(Cursor::new(vec![7_u8, 0, 9])));
        assert_eq!(read.byte_position(), 0);

        assert!(!read.skip_if_eq(0).unwrap());
        assert_eq!(read.byte_position(), 0);

        assert_eq!(u8::read(&mut read).unwrap(), 7);
        assert!(read.skip_if_eq(0).unwrap());
        assert_eq!(read.byte_position(), 2);

        read.skip_to(0).unwrap();
        assert_eq!(u8::read(&mut read).unwrap(), 7);
    }

    #[test]
    fn seek_write_forward_fills_zeroes() {
        let mut write = Tracking::new(Cursor::new(Vec::new()));
        1_u8.write(&mut write).unwrap();
        write.seek_write_to(5).unwrap();
        2_u8.write(&mut write).unwrap();

        write.seek_write_to(1).unwrap();
        3_u8.write(&mut write).unwrap();

        assert_eq!(write.into_inner().into_inner(), vec![1, 3, 0, 0, 0, 2]);
    }

    #[test]
    fn null_terminated_text() {
        let mut bytes = Vec::new();
        write_null_terminated(b"channels", &mut bytes).unwrap();
        assert_eq!(bytes.len(), 9);

        let text = read_null_terminated(&mut bytes.as_slice(), 31).unwrap();
        assert_eq!(text, b"channels");

        assert!(read_null_terminated(&mut bytes.as_slice(), 3).is_err());
    }
}
