
//! Contains the meta data attributes of a scan line image:
//! channel descriptions, rectangles, and line order,
//! as well as the generic attribute record they are stored in.

use std::collections::BTreeMap;
use std::collections::btree_map;

use crate::compression::Compression;
use crate::error::*;
use crate::io::*;
use crate::math::{Vec2, mod_p};
use crate::meta::sequence_end;
use half::f16;


/// Channel names longer than this require the long names flag in the version field.
pub const MAX_SHORT_NAME_LENGTH: usize = 31;

/// No name or attribute text may be longer than this.
pub const MAX_NAME_LENGTH: usize = 255;


/// Contains one of the attributes of a scan line header.
/// Includes a variant for attributes unknown to this library.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {

    /// Channel meta data.
    ChannelList(ChannelList),

    /// Compression method of this image.
    Compression(Compression),

    /// Order of the blocks in the file.
    LineOrder(LineOrder),

    /// 32-bit float
    F32(f32),

    /// 2D integer rectangle.
    IntegerBounds(IntegerBounds),

    /// 2D float vector.
    FloatVec2(Vec2<f32>),

    /// An attribute of any other type.
    Custom {

        /// The name of the type this attribute is an instance of.
        kind: Vec<u8>,

        /// The value, stored in little-endian byte order.
        bytes: Vec<u8>
    },
}

/// A rectangular section anywhere in 2D integer space,
/// described by the inclusive minimum and maximum coordinates.
/// The rectangle is inverted, and contains no pixels, if any maximum is smaller than its minimum.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Hash)]
pub struct IntegerBounds {

    /// The top left corner of this rectangle, inclusive.
    pub min: Vec2<i32>,

    /// The bottom right corner of this rectangle, inclusive.
    pub max: Vec2<i32>,
}

/// Describes the pixels of one channel: the sample type,
/// the subsampling, and whether lossy codecs should quantize linearly.
/// Does not contain the actual pixel data.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescription {

    /// U32, F16 or F32.
    pub sample_type: SampleType,

    /// How many of the samples are skipped compared to the other channels in this image.
    /// Only pixels whose coordinates are divisible by this value contain a sample.
    /// Both values must be at least one and divide the data window.
    pub sampling: Vec2<usize>,

    /// This attribute only tells lossy compression methods
    /// whether this value should be quantized exponentially or linearly.
    ///
    /// Should be `false` for red, green, or blue channels.
    /// Should be `true` for hue, chroma, saturation, or alpha channels.
    pub quantize_linearly: bool,
}

/// A mapping from channel name to channel description.
/// Iteration is always sorted by the byte values of the names,
/// which is also the order of the channels in the file.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ChannelList {
    channels: BTreeMap<String, ChannelDescription>,
}

/// The type of samples in this channel.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Hash)]
pub enum SampleType {

    /// This channel contains 32-bit unsigned int values.
    U32,

    /// This channel contains 16-bit float values.
    F16,

    /// This channel contains 32-bit float values.
    F32,
}

/// In what order the blocks of pixel data appear in a file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LineOrder {

    /// The first block in the file has the lowest y coordinate.
    Increasing,

    /// The first block in the file has the highest y coordinate.
    Decreasing,

    /// The blocks are not ordered in a specific way inside the file.
    /// Only valid for tiled files, which are not written by this library.
    Random,
}


/// Iterates the channels of a list, sorted by name.
/// Every call to `ChannelList::iter` starts a fresh iterator.
#[derive(Clone, Debug)]
pub struct Channels<'c> {
    inner: btree_map::Iter<'c, String, ChannelDescription>,
}

impl<'c> Iterator for Channels<'c> {
    type Item = (&'c str, &'c ChannelDescription);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(name, channel)| (name.as_str(), channel))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Channels<'_> {}


impl IntegerBounds {

    /// Create a rectangle from its inclusive corners.
    pub fn new(min: impl Into<Vec2<i32>>, max: impl Into<Vec2<i32>>) -> Self {
        Self { min: min.into(), max: max.into() }
    }

    /// Create a rectangle with the specified size, starting at zero.
    /// A zero size produces an inverted rectangle.
    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        let Vec2(width, height) = size.into();
        Self::new((0, 0), (usize_to_i32(width) - 1, usize_to_i32(height) - 1))
    }

    /// Whether the maximum is smaller than the minimum in any dimension.
    pub fn is_inverted(&self) -> bool {
        self.max.x() < self.min.x() || self.max.y() < self.min.y()
    }

    /// Number of columns, zero if inverted.
    pub fn width(&self) -> usize {
        (i64::from(self.max.x()) - i64::from(self.min.x()) + 1).max(0) as usize
    }

    /// Number of rows, zero if inverted.
    pub fn height(&self) -> usize {
        (i64::from(self.max.y()) - i64::from(self.min.y()) + 1).max(0) as usize
    }

    /// Width and height.
    pub fn size(&self) -> Vec2<usize> {
        Vec2(self.width(), self.height())
    }

    /// Whether the row is inside the rectangle.
    pub fn contains_line(&self, y: i32) -> bool {
        y >= self.min.y() && y <= self.max.y()
    }

    /// Validate the coordinates, which must stay within half the `i32` range,
    /// so that sizes and ends can be computed without overflow.
    pub fn validate(&self, name: &'static str) -> UnitResult {
        if self.is_inverted() {
            return Err(Error::geometry(format!("{} is inverted: {:?}", name, self)));
        }

        let limit = (i32::MAX / 2) as u32;
        let coordinates = [ self.min.x(), self.min.y(), self.max.x(), self.max.y() ];

        if coordinates.iter().any(|coordinate| coordinate.unsigned_abs() >= limit) {
            return Err(Error::geometry(format!("{} exceeds the coordinate limit: {:?}", name, self)));
        }

        Ok(())
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.min.x().write(write)?;
        self.min.y().write(write)?;
        self.max.x().write(write)?;
        self.max.y().write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let x_min = i32::read(read)?;
        let y_min = i32::read(read)?;
        let x_max = i32::read(read)?;
        let y_max = i32::read(read)?;
        Ok(Self::new((x_min, y_min), (x_max, y_max)))
    }
}


impl SampleType {

    /// How many bytes a single sample takes up.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::F16 => f16::BYTE_SIZE,
            SampleType::F32 => f32::BYTE_SIZE,
            SampleType::U32 => u32::BYTE_SIZE,
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        match *self {
            SampleType::U32 => 0_i32,
            SampleType::F16 => 1_i32,
            SampleType::F32 => 2_i32,
        }.write(write)
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        Ok(match i32::read(read)? {
            0 => SampleType::U32,
            1 => SampleType::F16,
            2 => SampleType::F32,
            _ => return Err(Error::malformed("pixel type attribute value")),
        })
    }
}


impl ChannelDescription {

    /// A channel with one sample per pixel, quantized exponentially by lossy codecs.
    pub fn new(sample_type: SampleType) -> Self {
        Self { sample_type, sampling: Vec2(1, 1), quantize_linearly: false }
    }

    /// Store only every n-th sample horizontally and vertically.
    pub fn with_sampling(self, x_sampling: usize, y_sampling: usize) -> Self {
        Self { sampling: Vec2(x_sampling, y_sampling), ..self }
    }

    /// Tell lossy codecs to quantize this channel linearly.
    pub fn with_linear(self, quantize_linearly: bool) -> Self {
        Self { quantize_linearly, ..self }
    }

    /// Whether this channel has a sample on this row.
    pub fn has_line(&self, y: i32) -> bool {
        mod_p(y, usize_to_i32(self.sampling.y())) == 0
    }

    /// Number of samples in one row of the rectangle.
    pub fn samples_per_line(&self, bounds: IntegerBounds) -> usize {
        crate::math::sample_count(bounds.min.x(), bounds.max.x(), usize_to_i32(self.sampling.x()))
    }

    /// Check that the sampling factors can be used with this data window.
    pub fn validate(&self, name: &str, data_window: IntegerBounds) -> UnitResult {
        let Vec2(x_sampling, y_sampling) = self.sampling;

        if x_sampling == 0 || y_sampling == 0 {
            return Err(Error::header(format!("channel `{}` has a zero sampling factor", name)));
        }

        if x_sampling > i32::MAX as usize || y_sampling > i32::MAX as usize {
            return Err(Error::header(format!("channel `{}` has a too large sampling factor", name)));
        }

        let (x_sampling, y_sampling) = (x_sampling as i32, y_sampling as i32);

        if mod_p(data_window.min.x(), x_sampling) != 0 || mod_p(data_window.min.y(), y_sampling) != 0 {
            return Err(Error::header(format!(
                "sampling factor of channel `{}` does not divide the data window position", name
            )));
        }

        if data_window.width() % x_sampling as usize != 0 || data_window.height() % y_sampling as usize != 0 {
            return Err(Error::header(format!(
                "sampling factor of channel `{}` does not divide the data window size", name
            )));
        }

        Ok(())
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, name: &str, write: &mut W) -> UnitResult {
        write_null_terminated(name.as_bytes(), write)?;
        self.sample_type.write(write)?;

        match self.quantize_linearly {
            false => 0_u8,
            true  => 1_u8,
        }.write(write)?;

        u8::write_slice(write, &[0_u8, 0_u8, 0_u8])?;
        i32::write(usize_to_i32(self.sampling.x()), write)?;
        i32::write(usize_to_i32(self.sampling.y()), write)?;
        Ok(())
    }

    /// Read the name and value without validating the sampling.
    pub fn read<R: Read>(read: &mut R) -> Result<(String, Self)> {
        let name = read_null_terminated(read, MAX_NAME_LENGTH)?;
        let name = String::from_utf8(name).map_err(|_| Error::malformed("channel name is not utf-8"))?;
        let sample_type = SampleType::read(read)?;

        let quantize_linearly = match u8::read(read)? {
            1 => true,
            0 => false,
            _ => return Err(Error::malformed("channel linearity attribute value")),
        };

        let mut reserved = [0_u8; 3];
        u8::read_slice(read, &mut reserved)?;

        let x_sampling = i32_to_usize(i32::read(read)?, "x channel sampling")?;
        let y_sampling = i32_to_usize(i32::read(read)?, "y channel sampling")?;

        Ok((name, ChannelDescription {
            sample_type, quantize_linearly,
            sampling: Vec2(x_sampling, y_sampling),
        }))
    }
}


impl ChannelList {

    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel. If a channel with this name exists already,
    /// it is replaced, and the previous description is returned: the last insertion wins.
    pub fn insert(&mut self, name: impl Into<String>, channel: ChannelDescription) -> Option<ChannelDescription> {
        self.channels.insert(name.into(), channel)
    }

    /// Whether a channel with this exact name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Look up a channel by its exact name.
    pub fn get(&self, name: &str) -> Result<&ChannelDescription> {
        self.channels.get(name).ok_or_else(|| Error::NotFound { channel: name.to_string() })
    }

    /// Iterate all channels, sorted by name.
    /// Each call returns a new iterator that starts at the first channel.
    pub fn iter(&self) -> Channels<'_> {
        Channels { inner: self.channels.iter() }
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel has been added yet.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Whether any name needs the long names flag in the file version.
    pub fn has_long_names(&self) -> bool {
        self.channels.keys().any(|name| name.len() > MAX_SHORT_NAME_LENGTH)
    }

    /// Check names and sampling factors before writing.
    pub fn validate(&self, data_window: IntegerBounds) -> UnitResult {
        if self.is_empty() {
            return Err(Error::header("at least one channel is required"));
        }

        for (name, channel) in self.iter() {
            if name.is_empty() {
                return Err(Error::header("channel name must not be empty"));
            }

            if name.len() > MAX_NAME_LENGTH {
                return Err(Error::header(format!("channel name `{}` is too long", name)));
            }

            if name.as_bytes().contains(&0) {
                return Err(Error::header(format!("channel name `{}` contains a null byte", name.escape_debug())));
            }

            channel.validate(name, data_window)?;
        }

        Ok(())
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        for (name, channel) in self.iter() {
            channel.write(name, write)?;
        }

        sequence_end::write(write)
    }

    /// Read the value without validating.
    pub fn read(read: &mut PeekRead<impl Read>) -> Result<Self> {
        let mut list = ChannelList::new();

        while !sequence_end::has_come(read)? {
            let (name, channel) = ChannelDescription::read(read)?;

            if list.insert(name, channel).is_some() {
                return Err(Error::malformed("channel names are not unique"));
            }
        }

        Ok(list)
    }
}

impl<'c> IntoIterator for &'c ChannelList {
    type Item = (&'c str, &'c ChannelDescription);
    type IntoIter = Channels<'c>;
    fn into_iter(self) -> Self::IntoIter { self.iter() }
}


impl Compression {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::Compression::*;
        match self {
            Uncompressed => 0_u8,
            RLE => 1_u8,
            ZIP1 => 2_u8,
            ZIP16 => 3_u8,
            PIZ => 4_u8,
            PXR24 => 5_u8,
            B44 => 6_u8,
            B44A => 7_u8,
            DWAA => 8_u8,
            DWAB => 9_u8,
        }.write(write)
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::Compression::*;
        Ok(match u8::read(read)? {
            0 => Uncompressed,
            1 => RLE,
            2 => ZIP1,
            3 => ZIP16,
            4 => PIZ,
            5 => PXR24,
            6 => B44,
            7 => B44A,
            8 => DWAA,
            9 => DWAB,
            _ => return Err(Error::malformed("unknown compression method")),
        })
    }
}


impl LineOrder {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::LineOrder::*;
        match self {
            Increasing => 0_u8,
            Decreasing => 1_u8,
            Random => 2_u8,
        }.write(write)
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::LineOrder::*;
        Ok(match u8::read(read)? {
            0 => Increasing,
            1 => Decreasing,
            2 => Random,
            _ => return Err(Error::malformed("line order attribute value")),
        })
    }
}


/// Without validation, write this attribute to the byte stream.
pub fn write<W: Write>(name: &[u8], value: &AttributeValue, write: &mut W) -> UnitResult {
    let mut bytes = Vec::new();
    value.write(&mut bytes)?;

    write_null_terminated(name, write)?;
    write_null_terminated(value.kind_name(), write)?;
    i32::write(usize_to_i32(bytes.len()), write)?;
    u8::write_slice(write, &bytes)
}

/// Read the name and value of the next attribute.
pub fn read(read: &mut PeekRead<impl Read>, max_name_length: usize) -> Result<(Vec<u8>, AttributeValue)> {
    let name = read_null_terminated(read, max_name_length)?;
    let kind = read_null_terminated(read, max_name_length)?;
    let size = i32_to_usize(i32::read(read)?, "attribute size")?;

    // always consume the declared size, even if the value does not use all of it
    let bytes = u8::read_vec(read, size, 1024)?;
    let value = AttributeValue::read(kind, bytes)?;
    Ok((name, value))
}


impl AttributeValue {

    /// The exr name string of the type that an attribute can have.
    pub fn kind_name(&self) -> &[u8] {
        use self::AttributeValue::*;
        use self::type_names as ty;

        match *self {
            ChannelList(_) => ty::CHANNEL_LIST,
            Compression(_) => ty::COMPRESSION,
            LineOrder(_) => ty::LINE_ORDER,
            F32(_) => ty::F32,
            IntegerBounds(_) => ty::I32BOX2,
            FloatVec2(_) => ty::F32VEC2,
            Custom { ref kind, .. } => kind,
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        use self::AttributeValue::*;
        match *self {
            ChannelList(ref channels) => channels.write(write),
            Compression(value) => value.write(write),
            LineOrder(value) => value.write(write),
            F32(value) => value.write(write),
            IntegerBounds(value) => value.write(write),
            FloatVec2(Vec2(x, y)) => { x.write(write)?; y.write(write) },
            Custom { ref bytes, .. } => u8::write_slice(write, bytes),
        }
    }

    /// Parse the bytes of an attribute, choosing the variant by the type name.
    pub fn read(kind: Vec<u8>, bytes: Vec<u8>) -> Result<Self> {
        use self::type_names as ty;

        let parsed = {
            let mut value = bytes.as_slice();

            match kind.as_slice() {
                ty::CHANNEL_LIST => Some(AttributeValue::ChannelList(self::ChannelList::read(&mut PeekRead::new(&mut value))?)),
                ty::COMPRESSION => Some(AttributeValue::Compression(Compression::read(&mut value)?)),
                ty::LINE_ORDER => Some(AttributeValue::LineOrder(self::LineOrder::read(&mut value)?)),
                ty::F32 => Some(AttributeValue::F32(f32::read(&mut value)?)),
                ty::I32BOX2 => Some(AttributeValue::IntegerBounds(self::IntegerBounds::read(&mut value)?)),
                ty::F32VEC2 => Some(AttributeValue::FloatVec2(Vec2(f32::read(&mut value)?, f32::read(&mut value)?))),
                _ => None,
            }
        };

        Ok(parsed.unwrap_or(AttributeValue::Custom { kind, bytes }))
    }
}


/// Contains string literals identifying the type of an attribute.
pub mod type_names {
    macro_rules! define_attribute_type_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte-string name of this attribute type as it appears in an exr file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_attribute_type_names! {
        I32BOX2:        b"box2i",
        F32:            b"float",
        F32VEC2:        b"v2f",
        CHANNEL_LIST:   b"chlist",
        COMPRESSION:    b"compression",
        LINE_ORDER:     b"lineOrder"
    }
}
