
//! Stream the scan lines of an OpenEXR-style file to and from caller-owned pixel memory.
//!
//! Describe the image with a `Header`, bind memory to the channels with a `FrameBuffer`,
//! then use an `OutputFile` or `InputFile` to write or read lines.
//! Compression of independent blocks can run on a thread pool.

#![forbid(unsafe_code)]
#![warn(missing_docs)]


pub mod io; // public to allow for custom attribute byte parsing
pub mod math;
pub mod error;
pub mod meta;
pub mod compression;
pub mod block;
pub mod frame_buffer;
pub mod file;


/// Export the most important items from `exr_scanline`.
/// _Note: This includes a type called `Result`, possibly overwriting the default `std::Result` type usage._
pub mod prelude {

    // main exports
    pub use crate::file::output::OutputFile;
    pub use crate::file::input::InputFile;
    pub use crate::file::{ReadOptions, WriteOptions, Threads};

    // core data types
    pub use crate::meta::header::Header;
    pub use crate::meta::attribute::{ChannelDescription, ChannelList, IntegerBounds, LineOrder, SampleType};
    pub use crate::frame_buffer::{FrameBuffer, Slice, SliceMemory};
    pub use crate::compression::{BlockCodec, BlockLayout, Compression};

    // secondary data types
    pub use crate::math::Vec2;
    pub use crate::error::{Error, Result, UnitResult};

    // re-export external stuff
    pub use half::f16;
}
