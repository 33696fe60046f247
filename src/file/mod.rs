
//! Read and write scan line files through frame buffers.
//! Start with `OutputFile::new` or `InputFile::new`.

pub mod output;
pub mod input;

use std::sync::Arc;
use crate::compression::BlockCodec;


/// How many threads compress or decompress blocks in parallel.
/// Without the `rayon` feature, all blocks are processed on the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Threads {

    /// Process all blocks on the calling thread.
    #[default]
    Sequential,

    /// Process blocks on a pool with this many worker threads.
    /// Zero is the same as `Sequential`.
    Count(usize),
}

/// Options for writing a file.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {

    /// Threads used to compress the blocks.
    pub threads: Threads,

    /// The codec for the compression of the header.
    /// Only required for compression methods without a built-in codec,
    /// but replaces the built-in codec if specified.
    pub codec: Option<Arc<dyn BlockCodec>>,
}

/// Options for reading a file.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {

    /// Threads used to decompress the blocks.
    pub threads: Threads,

    /// The codec for the compression of the file.
    /// Only required for compression methods without a built-in codec,
    /// but replaces the built-in codec if specified.
    pub codec: Option<Arc<dyn BlockCodec>>,

    /// Reject header attributes that are unknown to this library
    /// instead of skipping them.
    pub pedantic: bool,
}


impl From<usize> for Threads {
    fn from(count: usize) -> Self {
        if count == 0 { Threads::Sequential } else { Threads::Count(count) }
    }
}

impl Threads {

    /// The number of worker threads, if any.
    pub fn worker_count(self) -> Option<usize> {
        match self {
            Threads::Count(count) if count > 0 => Some(count),
            _ => None,
        }
    }
}

impl WriteOptions {

    /// Compress on this many threads.
    pub fn with_threads(self, threads: impl Into<Threads>) -> Self {
        Self { threads: threads.into(), ..self }
    }

    /// Compress the blocks with this codec.
    pub fn with_codec(self, codec: Arc<dyn BlockCodec>) -> Self {
        Self { codec: Some(codec), ..self }
    }
}

impl ReadOptions {

    /// Decompress on this many threads.
    pub fn with_threads(self, threads: impl Into<Threads>) -> Self {
        Self { threads: threads.into(), ..self }
    }

    /// Decompress the blocks with this codec.
    pub fn with_codec(self, codec: Arc<dyn BlockCodec>) -> Self {
        Self { codec: Some(codec), ..self }
    }

    /// Reject unknown header attributes.
    pub fn pedantic(self) -> Self {
        Self { pedantic: true, ..self }
    }
}
