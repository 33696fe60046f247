
//! The header of a single part scan line image.

use crate::compression::Compression;
use crate::error::*;
use crate::io::*;
use crate::math::Vec2;
use crate::meta::attribute::{self, AttributeValue, ChannelDescription, ChannelList, Channels, IntegerBounds, LineOrder};
use crate::meta::sequence_end;


/// Describes the geometry, channels and compression of an image.
/// When reading, the header is parsed from the file and exposed read-only.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {

    /// The rectangle that viewers should display, independent of the stored pixels.
    pub display_window: IntegerBounds,

    /// The rectangle for which pixels are stored in the file.
    pub data_window: IntegerBounds,

    /// The width of a pixel divided by its height. Always positive.
    pub pixel_aspect_ratio: f32,

    /// Center of the screen window, in the projection plane of the camera.
    pub screen_window_center: Vec2<f32>,

    /// Width of the screen window, in the projection plane of the camera. Never negative.
    pub screen_window_width: f32,

    /// Order of the blocks in the file.
    pub line_order: LineOrder,

    /// How the pixels of each block are compressed.
    pub compression: Compression,

    /// The channels of this image, sorted by name.
    pub channels: ChannelList,
}


/// The names of the attributes that every scan line header contains.
pub mod attribute_names {
    macro_rules! define_required_attribute_names {
        ( $($name: ident  :  $value: expr),* ) => {
            $(
                /// The byte-string name of this required attribute as it appears in an exr file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_required_attribute_names! {
        CHANNELS: b"channels",
        COMPRESSION: b"compression",
        DATA_WINDOW: b"dataWindow",
        DISPLAY_WINDOW: b"displayWindow",
        LINE_ORDER: b"lineOrder",
        PIXEL_ASPECT: b"pixelAspectRatio",
        WINDOW_CENTER: b"screenWindowCenter",
        WINDOW_WIDTH: b"screenWindowWidth"
    }
}


impl Header {

    /// Create a header without any channels.
    /// Fails with `InvalidGeometry` if a window is inverted
    /// or the pixel aspect ratio is not positive.
    pub fn new(
        display_window: IntegerBounds, data_window: IntegerBounds,
        pixel_aspect_ratio: f32,
        screen_window_center: impl Into<Vec2<f32>>, screen_window_width: f32,
        line_order: LineOrder, compression: Compression
    ) -> Result<Self> {
        let header = Header {
            display_window, data_window, pixel_aspect_ratio,
            screen_window_center: screen_window_center.into(),
            screen_window_width, line_order, compression,
            channels: ChannelList::new(),
        };

        header.validate_geometry()?;
        Ok(header)
    }

    /// A header whose display window equals its data window,
    /// with square pixels and a unit screen window.
    pub fn with_window(window: IntegerBounds, line_order: LineOrder, compression: Compression) -> Result<Self> {
        Self::new(window, window, 1.0, (0.0, 0.0), 1.0, line_order, compression)
    }

    /// Add a channel, replacing any channel with the same name.
    /// Returns the replaced description.
    pub fn insert_channel(&mut self, name: impl Into<String>, channel: ChannelDescription) -> Option<ChannelDescription> {
        self.channels.insert(name, channel)
    }

    /// Whether a channel with this exact name exists.
    pub fn channel_exists(&self, name: &str) -> bool {
        self.channels.contains(name)
    }

    /// Look up a channel by name. Fails with `NotFound` if absent.
    pub fn get_channel(&self, name: &str) -> Result<&ChannelDescription> {
        self.channels.get(name)
    }

    /// Iterate the channels, sorted by name.
    /// Each call starts over at the first channel.
    pub fn channel_iter(&self) -> Channels<'_> {
        self.channels.iter()
    }

    /// Check the windows and the screen geometry.
    pub fn validate_geometry(&self) -> UnitResult {
        self.display_window.validate("display window")?;
        self.data_window.validate("data window")?;

        if !self.pixel_aspect_ratio.is_finite() || self.pixel_aspect_ratio <= 0.0 {
            return Err(Error::geometry(format!("pixel aspect ratio must be positive, but is {}", self.pixel_aspect_ratio)));
        }

        if !self.screen_window_center.x().is_finite() || !self.screen_window_center.y().is_finite() {
            return Err(Error::geometry(format!("screen window center must be finite, but is {:?}", self.screen_window_center)));
        }

        if !self.screen_window_width.is_finite() || self.screen_window_width < 0.0 {
            return Err(Error::geometry(format!("screen window width must not be negative, but is {}", self.screen_window_width)));
        }

        Ok(())
    }

    /// Check whether this header can be written as a scan line file.
    pub fn validate_for_scan_lines(&self) -> UnitResult {
        self.validate_geometry()?;

        if self.line_order == LineOrder::Random {
            return Err(Error::header("random line order is only allowed in tiled files"));
        }

        self.channels.validate(self.data_window)
    }

    /// The number of lines that are compressed together.
    pub fn lines_per_block(&self) -> usize {
        self.compression.scan_lines_per_block()
    }

    /// The number of blocks needed to store the data window.
    pub fn block_count(&self) -> usize {
        let height = self.data_window.height();
        let lines = self.lines_per_block();
        (height + lines - 1) / lines
    }

    /// The block that contains this line. The line must be inside the data window.
    pub fn block_index_of(&self, y: i32) -> usize {
        debug_assert!(self.data_window.contains_line(y), "line outside of data window");
        (i64::from(y) - i64::from(self.data_window.min.y())) as usize / self.lines_per_block()
    }

    /// The first and the last line of a block, inclusive.
    pub fn block_y_range(&self, block_index: usize) -> (i32, i32) {
        let lines = self.lines_per_block();
        let first = self.data_window.min.y() + usize_to_i32(block_index * lines);
        let last = (first + usize_to_i32(lines) - 1).min(self.data_window.max.y());
        (first, last)
    }

    /// The rectangle of pixels stored in a block.
    pub fn block_bounds(&self, block_index: usize) -> IntegerBounds {
        let (first, last) = self.block_y_range(block_index);
        IntegerBounds::new((self.data_window.min.x(), first), (self.data_window.max.x(), last))
    }

    /// Without validation, write the attributes and the terminating byte.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        macro_rules! write_attributes {
            ( $($name: ident : $variant: ident = $value: expr),* ) => { $(
                attribute::write($name, &AttributeValue::$variant($value), write)?;
            )* };
        }

        {
            use self::attribute_names::*;

            write_attributes!(
                CHANNELS: ChannelList = self.channels.clone(),
                COMPRESSION: Compression = self.compression,
                DATA_WINDOW: IntegerBounds = self.data_window,
                DISPLAY_WINDOW: IntegerBounds = self.display_window,
                LINE_ORDER: LineOrder = self.line_order,
                PIXEL_ASPECT: F32 = self.pixel_aspect_ratio,
                WINDOW_CENTER: FloatVec2 = self.screen_window_center,
                WINDOW_WIDTH: F32 = self.screen_window_width
            );
        }

        sequence_end::write(write)
    }

    /// Read the attributes up to and including the terminating byte.
    /// Unknown attributes are skipped, or rejected if `pedantic` is set.
    pub fn read(read: &mut PeekRead<impl Read>, has_long_names: bool, pedantic: bool) -> Result<Self> {
        let max_name_length = if has_long_names { attribute::MAX_NAME_LENGTH } else { attribute::MAX_SHORT_NAME_LENGTH };

        // these required attributes will be filled when encountered while parsing
        let mut channels = None;
        let mut compression = None;
        let mut data_window = None;
        let mut display_window = None;
        let mut line_order = None;
        let mut pixel_aspect_ratio = None;
        let mut screen_window_center = None;
        let mut screen_window_width = None;

        while !sequence_end::has_come(read)? {
            let (name, value) = attribute::read(read, max_name_length)?;

            use self::attribute_names as name;
            use crate::meta::attribute::AttributeValue as Value;

            // only use attributes whose type matches the commonly used type for that attribute
            match (name.as_slice(), value) {
                (name::CHANNELS, Value::ChannelList(value)) => channels = Some(value),
                (name::COMPRESSION, Value::Compression(value)) => compression = Some(value),
                (name::DATA_WINDOW, Value::IntegerBounds(value)) => data_window = Some(value),
                (name::DISPLAY_WINDOW, Value::IntegerBounds(value)) => display_window = Some(value),
                (name::LINE_ORDER, Value::LineOrder(value)) => line_order = Some(value),
                (name::PIXEL_ASPECT, Value::F32(value)) => pixel_aspect_ratio = Some(value),
                (name::WINDOW_CENTER, Value::FloatVec2(value)) => screen_window_center = Some(value),
                (name::WINDOW_WIDTH, Value::F32(value)) => screen_window_width = Some(value),

                (_, value) => {
                    if pedantic {
                        return Err(Error::malformed(format!(
                            "unknown attribute `{}` of type `{}`",
                            String::from_utf8_lossy(&name), String::from_utf8_lossy(value.kind_name())
                        )));
                    }

                    tracing::debug!(attribute = %String::from_utf8_lossy(&name), "skipping unknown header attribute");
                }
            }
        }

        fn missing(name: &str) -> Error {
            Error::malformed(format!("missing or invalid {} attribute", name))
        }

        let header = Header {
            channels: channels.ok_or_else(|| missing("channels"))?,
            compression: compression.ok_or_else(|| missing("compression"))?,
            data_window: data_window.ok_or_else(|| missing("data window"))?,
            display_window: display_window.ok_or_else(|| missing("display window"))?,
            line_order: line_order.ok_or_else(|| missing("line order"))?,
            pixel_aspect_ratio: pixel_aspect_ratio.ok_or_else(|| missing("pixel aspect ratio"))?,
            screen_window_center: screen_window_center.ok_or_else(|| missing("screen window center"))?,
            screen_window_width: screen_window_width.ok_or_else(|| missing("screen window width"))?,
        };

        // geometry that cannot be constructed cannot be parsed either
        header.validate_geometry().map_err(|error| Error::malformed(error.to_string()))?;

        for (name, channel) in header.channel_iter() {
            channel.validate(name, header.data_window).map_err(|error| Error::malformed(error.to_string()))?;
        }

        Ok(header)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::SampleType;

    fn square(size: i32) -> IntegerBounds {
        IntegerBounds::new((0, 0), (size - 1, size - 1))
    }

    #[test]
    fn reject_invalid_geometry() {
        let inverted = IntegerBounds::new((0, 0), (-1, 4));

        let result = Header::new(square(4), inverted, 1.0, (0.0, 0.0), 1.0, LineOrder::Increasing, Compression::Uncompressed);
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));

        let result = Header::new(square(4), square(4), 0.0, (0.0, 0.0), 1.0, LineOrder::Increasing, Compression::Uncompressed);
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));

        let result = Header::new(square(4), square(4), -2.0, (0.0, 0.0), 1.0, LineOrder::Increasing, Compression::Uncompressed);
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));

        let result = Header::new(square(4), square(4), 1.0, (0.0, 0.0), -1.0, LineOrder::Increasing, Compression::Uncompressed);
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));

        let result = Header::new(square(4), square(4), 1.0, (f32::NAN, 0.0), 1.0, LineOrder::Increasing, Compression::Uncompressed);
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));

        let result = Header::new(square(4), square(4), 1.0, (0.0, f32::INFINITY), 1.0, LineOrder::Increasing, Compression::Uncompressed);
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));
    }

    #[test]
    fn reject_extreme_coordinates() {
        let minimum = IntegerBounds::new((i32::MIN, 0), (0, 0));
        let result = Header::new(minimum, square(4), 1.0, (0.0, 0.0), 1.0, LineOrder::Increasing, Compression::Uncompressed);
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));

        let minimum = IntegerBounds::new((0, i32::MIN), (3, 3));
        let result = Header::new(square(4), minimum, 1.0, (0.0, 0.0), 1.0, LineOrder::Increasing, Compression::Uncompressed);
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));

        let maximum = IntegerBounds::new((0, 0), (3, i32::MAX));
        let result = Header::new(square(4), maximum, 1.0, (0.0, 0.0), 1.0, LineOrder::Increasing, Compression::Uncompressed);
        assert!(matches!(result, Err(Error::InvalidGeometry(_))));

        let limit = i32::MAX / 2;
        let just_inside = IntegerBounds::new((-(limit - 1), 0), (limit - 1, 0));
        assert!(Header::with_window(just_inside, LineOrder::Increasing, Compression::Uncompressed).is_ok());

        let at_limit = IntegerBounds::new((-limit, 0), (0, 0));
        assert!(Header::with_window(at_limit, LineOrder::Increasing, Compression::Uncompressed).is_err());
    }

    #[test]
    fn random_line_order_is_not_for_scan_lines() {
        let mut header = Header::with_window(square(4), LineOrder::Random, Compression::Uncompressed).unwrap();
        header.insert_channel("Y", ChannelDescription::new(SampleType::F32));
        assert!(matches!(header.validate_for_scan_lines(), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn channel_iteration_is_restartable() {
        let mut header = Header::with_window(square(2), LineOrder::Increasing, Compression::RLE).unwrap();
        header.insert_channel("G", ChannelDescription::new(SampleType::F16));
        header.insert_channel("B", ChannelDescription::new(SampleType::F16));
        header.insert_channel("R", ChannelDescription::new(SampleType::F16));

        let first: Vec<&str> = header.channel_iter().map(|(name, _)| name).collect();
        let second: Vec<&str> = header.channel_iter().map(|(name, _)| name).collect();
        assert_eq!(first, vec!["B", "G", "R"]);
        assert_eq!(first, second);

        assert!(header.channel_exists("G"));
        assert!(!header.channel_exists("g"));
        assert!(matches!(header.get_channel("missing"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn block_geometry() {
        let window = IntegerBounds::new((0, -3), (9, 36));
        let header = Header::with_window(window, LineOrder::Increasing, Compression::ZIP16).unwrap();

        assert_eq!(header.lines_per_block(), 16);
        assert_eq!(header.block_count(), 3);
        assert_eq!(header.block_y_range(0), (-3, 12));
        assert_eq!(header.block_y_range(2), (29, 36));
        assert_eq!(header.block_index_of(-3), 0);
        assert_eq!(header.block_index_of(13), 1);
        assert_eq!(header.block_index_of(36), 2);
    }

    #[test]
    fn attributes_round_trip() {
        let mut header = Header::new(
            IntegerBounds::new((-5, -5), (20, 20)), IntegerBounds::new((0, 2), (7, 9)),
            1.5, (0.25, -0.5), 2.0, LineOrder::Decreasing, Compression::ZIP1
        ).unwrap();

        header.insert_channel("A", ChannelDescription::new(SampleType::U32).with_linear(true));
        header.insert_channel("Z", ChannelDescription::new(SampleType::F32).with_sampling(2, 2));

        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();

        let parsed = Header::read(&mut PeekRead::new(bytes.as_slice()), false, true).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn missing_attribute_is_malformed() {
        let mut bytes = Vec::new();
        attribute::write(attribute_names::COMPRESSION, &AttributeValue::Compression(Compression::RLE), &mut bytes).unwrap();
        sequence_end::write(&mut bytes).unwrap();

        let result = Header::read(&mut PeekRead::new(bytes.as_slice()), false, false);
        assert!(matches!(result, Err(Error::MalformedHeader(_))));
    }
}
