
//! Error type definitions.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// A result that may contain an exr error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an exr error.
pub type UnitResult = Result<()>;


/// An error that may happen while describing, reading or writing an exr file.
/// Carries the channel name, the requested lines, or the file path where that helps diagnosing.
#[derive(Debug)]
pub enum Error {

    /// The windows or ratios passed to a header make no sense,
    /// for example an inverted data window.
    InvalidGeometry(Cow<'static, str>),

    /// The header is consistent in itself, but cannot be written as a scan line file.
    InvalidHeader(Cow<'static, str>),

    /// The header has no channel with this name.
    NotFound {
        /// The requested channel name.
        channel: String,
    },

    /// The underlying byte stream could not be opened, read or written.
    Io {
        /// The file that was opened by path, if any.
        path: Option<PathBuf>,

        /// The original error.
        error: IoError,
    },

    /// The stream does not start with an exr header that can be parsed.
    MalformedHeader(Cow<'static, str>),

    /// The file declares a format version newer than this implementation understands.
    UnsupportedVersion {
        /// The raw version field, including flags.
        version: u32,
    },

    /// The file uses a feature that is not implemented, such as tiles or an unattached codec.
    NotSupported(Cow<'static, str>),

    /// A compressed block could not be found or decoded.
    CorruptBlock {
        /// The first scan line of the block.
        y: i32,

        /// What was wrong with the block.
        reason: Cow<'static, str>,
    },

    /// The requested scan lines exceed the data window.
    OutOfRange {
        /// The requested lines, inclusive.
        requested: (i32, i32),

        /// The lines of the data window, inclusive.
        window: (i32, i32),
    },

    /// Lines were written out of the order dictated by the line order of the header.
    OutOfOrderWrite {
        /// The line that had to come next.
        expected: i32,

        /// The requested lines, inclusive.
        requested: (i32, i32),
    },

    /// The file was closed before all lines of the data window were written.
    IncompleteCoverage {
        /// Lines that were written.
        written: usize,

        /// Lines in the data window.
        expected: usize,
    },

    /// The lowest requested line is larger than the highest requested line.
    InvalidRange {
        /// First requested line.
        y_min: i32,

        /// Last requested line.
        y_max: i32,
    },

    /// A frame buffer slice cannot be used with this file.
    InvalidSlice {
        /// The channel that the slice is bound to.
        channel: String,

        /// What was wrong with the slice.
        reason: Cow<'static, str>,
    },

    /// Pixels were requested before a frame buffer was attached.
    NoFrameBuffer,
}


impl Error {

    /// Create an error of the variant `InvalidGeometry`.
    pub(crate) fn geometry(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidGeometry(message.into())
    }

    /// Create an error of the variant `InvalidHeader`.
    pub(crate) fn header(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidHeader(message.into())
    }

    /// Create an error of the variant `MalformedHeader`.
    pub(crate) fn malformed(message: impl Into<Cow<'static, str>>) -> Self {
        Error::MalformedHeader(message.into())
    }

    /// Create an error of the variant `NotSupported`.
    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::NotSupported(message.into())
    }

    /// Create an error of the variant `CorruptBlock`.
    pub(crate) fn corrupt(y: i32, reason: impl Into<Cow<'static, str>>) -> Self {
        Error::CorruptBlock { y, reason: reason.into() }
    }

    /// Create an error of the variant `InvalidSlice`.
    pub(crate) fn slice(channel: &str, reason: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidSlice { channel: channel.to_string(), reason: reason.into() }
    }

    /// Remember the file path on an io error. Other errors are returned unchanged.
    pub fn with_path(self, file: &Path) -> Self {
        match self {
            Error::Io { path: None, error } => Error::Io { path: Some(file.to_path_buf()), error },
            other => other,
        }
    }

    /// While parsing the header, a truncated stream means the header is broken,
    /// not that the device failed.
    pub(crate) fn into_malformed_header(self) -> Self {
        match self {
            Error::Io { ref error, .. } if error.kind() == ErrorKind::UnexpectedEof =>
                Error::malformed("file ends inside the header"),

            other => other,
        }
    }

    /// While reading a block, a truncated stream means the block is broken.
    pub(crate) fn into_corrupt_block(self, y: i32) -> Self {
        match self {
            Error::Io { ref error, .. } if error.kind() == ErrorKind::UnexpectedEof =>
                Error::corrupt(y, "file ends inside the block"),

            other => other,
        }
    }
}


/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io { path: None, error }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidGeometry(message) => write!(formatter, "invalid geometry: {}", message),
            Error::InvalidHeader(message) => write!(formatter, "invalid header: {}", message),
            Error::NotFound { channel } => write!(formatter, "channel `{}` not found", channel),

            Error::Io { path: Some(path), error } => write!(formatter, "{}: {}", path.display(), error),
            Error::Io { path: None, error } => error.fmt(formatter),

            Error::MalformedHeader(message) => write!(formatter, "malformed header: {}", message),
            Error::UnsupportedVersion { version } => write!(formatter, "unsupported file version field {:#010x}", version),
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::CorruptBlock { y, reason } => write!(formatter, "corrupt block at line {}: {}", y, reason),

            Error::OutOfRange { requested, window } => write!(
                formatter, "lines {} to {} are outside of the data window lines {} to {}",
                requested.0, requested.1, window.0, window.1
            ),

            Error::OutOfOrderWrite { expected, requested } => write!(
                formatter, "cannot write lines {} to {}, line {} must be written next",
                requested.0, requested.1, expected
            ),

            Error::IncompleteCoverage { written, expected } => write!(
                formatter, "only {} of {} lines were written", written, expected
            ),

            Error::InvalidRange { y_min, y_max } => write!(
                formatter, "invalid line range {} to {}", y_min, y_max
            ),

            Error::InvalidSlice { channel, reason } => write!(formatter, "slice for channel `{}`: {}", channel, reason),
            Error::NoFrameBuffer => formatter.write_str("no frame buffer attached"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { error, .. } => Some(error),
            _ => None,
        }
    }
}


/// Return error on invalid range.
#[inline]
pub(crate) fn i32_to_usize(value: i32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::malformed(error_message))
}

/// Panics on overflow.
#[inline]
pub(crate) fn usize_to_i32(value: usize) -> i32 {
    i32::try_from(value).expect("(usize as i32) overflowed")
}

/// Panics on overflow.
#[inline]
pub(crate) fn usize_to_u64(value: usize) -> u64 {
    u64::try_from(value).expect("(usize as u64) overflowed")
}

/// Return error on invalid range.
#[inline]
pub(crate) fn u64_to_usize(value: u64) -> Option<usize> {
    usize::try_from(value).ok()
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn io_error_remembers_path() {
        let error = Error::from(IoError::new(ErrorKind::NotFound, "gone"))
            .with_path(Path::new("/tmp/missing.exr"));

        let message = error.to_string();
        assert!(message.contains("missing.exr"), "{}", message);
    }

    #[test]
    fn truncated_header_is_malformed() {
        let error = Error::from(IoError::new(ErrorKind::UnexpectedEof, "eof")).into_malformed_header();
        assert!(matches!(error, Error::MalformedHeader(_)));

        let error = Error::from(IoError::new(ErrorKind::PermissionDenied, "denied")).into_malformed_header();
        assert!(matches!(error, Error::Io { .. }));
    }
}
