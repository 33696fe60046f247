
//! Bind caller-owned pixel memory to channel names.
//!
//! A frame buffer never owns the pixels. Each slice borrows a typed buffer
//! of cells, so several slices can view one interleaved buffer,
//! and reading can store samples through a shared borrow.
//! Every access is bounds checked.

use std::cell::Cell;
use std::collections::BTreeMap;
use half::f16;

use crate::block::samples::Sample;
use crate::error::{Error, UnitResult};
use crate::math::{Vec2, div_p};
use crate::meta::attribute::{IntegerBounds, SampleType};
use crate::meta::header::Header;


/// The memory of a slice, with the type that the samples are stored as.
#[derive(Clone, Copy, Debug)]
pub enum SliceMemory<'m> {

    /// 32-bit unsigned integer samples.
    U32(&'m [Cell<u32>]),

    /// 16-bit float samples.
    F16(&'m [Cell<f16>]),

    /// 32-bit float samples.
    F32(&'m [Cell<f32>]),
}

/// Where the samples of one channel are located in caller memory.
///
/// Sample `(x, y)` is stored at the index
/// `origin + floor(x / x_sampling) * x_stride + floor(y / y_sampling) * y_stride`,
/// where `x` and `y` are relative to the data window origin
/// if the tile coordinates flag of that dimension is set.
/// Strides are counted in samples, not in bytes, and may be negative or zero.
#[derive(Clone, Copy, Debug)]
pub struct Slice<'m> {
    memory: SliceMemory<'m>,
    origin: isize,
    stride: Vec2<isize>,
    sampling: Vec2<usize>,
    fill_value: f64,
    tile_coordinates: Vec2<bool>,
}

/// A set of slices, one per channel name.
/// Channels of a file without a slice are skipped, and
/// slices without a channel in the file are filled when reading.
#[derive(Clone, Debug, Default)]
pub struct FrameBuffer<'m> {
    slices: BTreeMap<String, Slice<'m>>,
}


macro_rules! implement_slice_memory_conversions {
    ($($variant: ident : $sample: ty),*) => { $(
        impl<'m> From<&'m mut [$sample]> for SliceMemory<'m> {
            fn from(samples: &'m mut [$sample]) -> Self {
                SliceMemory::$variant(Cell::from_mut(samples).as_slice_of_cells())
            }
        }

        impl<'m> From<&'m [Cell<$sample>]> for SliceMemory<'m> {
            fn from(samples: &'m [Cell<$sample>]) -> Self {
                SliceMemory::$variant(samples)
            }
        }
    )* };
}

implement_slice_memory_conversions!(U32: u32, F16: f16, F32: f32);


impl SliceMemory<'_> {

    /// The type that the samples are stored as.
    pub fn sample_type(&self) -> SampleType {
        match self {
            SliceMemory::U32(_) => SampleType::U32,
            SliceMemory::F16(_) => SampleType::F16,
            SliceMemory::F32(_) => SampleType::F32,
        }
    }

    /// Number of samples in the memory.
    pub fn len(&self) -> usize {
        match self {
            SliceMemory::U32(memory) => memory.len(),
            SliceMemory::F16(memory) => memory.len(),
            SliceMemory::F32(memory) => memory.len(),
        }
    }

    /// Whether the memory has no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<Sample> {
        Some(match self {
            SliceMemory::U32(memory) => Sample::U32(memory.get(index)?.get()),
            SliceMemory::F16(memory) => Sample::F16(memory.get(index)?.get()),
            SliceMemory::F32(memory) => Sample::F32(memory.get(index)?.get()),
        })
    }

    /// Converts the sample to the type of this memory.
    fn set(&self, index: usize, sample: Sample) -> Option<()> {
        match self {
            SliceMemory::U32(memory) => memory.get(index)?.set(sample.to_u32()),
            SliceMemory::F16(memory) => memory.get(index)?.set(sample.to_f16()),
            SliceMemory::F32(memory) => memory.get(index)?.set(sample.to_f32()),
        }

        Some(())
    }
}


impl<'m> Slice<'m> {

    /// A slice with explicit placement in memory,
    /// using absolute pixel coordinates, one sample per pixel, and zero as the fill value.
    pub fn new(memory: impl Into<SliceMemory<'m>>, origin: isize, stride: impl Into<Vec2<isize>>) -> Self {
        Slice {
            memory: memory.into(),
            origin,
            stride: stride.into(),
            sampling: Vec2(1, 1),
            fill_value: 0.0,
            tile_coordinates: Vec2(false, false),
        }
    }

    /// A slice of tightly packed rows that cover exactly the data window,
    /// starting with the top left pixel at index zero.
    /// Assumes one sample per pixel.
    pub fn packed(memory: impl Into<SliceMemory<'m>>, data_window: IntegerBounds) -> Self {
        let width = data_window.width() as isize;
        Self::new(memory, 0, (1, width)).with_tile_coordinates(true, true)
    }

    /// Only every n-th pixel has a sample. Must match the sampling of the channel in the file.
    pub fn with_sampling(self, x_sampling: usize, y_sampling: usize) -> Self {
        Self { sampling: Vec2(x_sampling, y_sampling), ..self }
    }

    /// The value stored when reading a file that does not contain this channel.
    pub fn with_fill_value(self, fill_value: f64) -> Self {
        Self { fill_value, ..self }
    }

    /// Whether coordinates are relative to the data window origin, per dimension.
    pub fn with_tile_coordinates(self, x: bool, y: bool) -> Self {
        Self { tile_coordinates: Vec2(x, y), ..self }
    }

    /// The type that the samples are stored as.
    pub fn sample_type(&self) -> SampleType { self.memory.sample_type() }

    /// The subsampling of this slice.
    pub fn sampling(&self) -> Vec2<usize> { self.sampling }

    /// The value stored when reading a file that does not contain this channel.
    pub fn fill_value(&self) -> f64 { self.fill_value }

    /// The index of the sample with coordinates `(0, 0)`.
    pub fn origin(&self) -> isize { self.origin }

    /// Index distance between horizontally and vertically adjacent samples.
    pub fn stride(&self) -> Vec2<isize> { self.stride }

    /// The memory index of a pixel, or `None` if it lies outside of the memory.
    pub fn index_of(&self, position: Vec2<i32>, data_window: IntegerBounds) -> Option<usize> {
        let x = if self.tile_coordinates.x() { position.x() - data_window.min.x() } else { position.x() };
        let y = if self.tile_coordinates.y() { position.y() - data_window.min.y() } else { position.y() };

        let sampling = |sampling: usize| i32::try_from(sampling).ok().filter(|&sampling| sampling > 0);
        let column = i64::from(div_p(x, sampling(self.sampling.x())?));
        let row = i64::from(div_p(y, sampling(self.sampling.y())?));

        let index = (self.origin as i64)
            .checked_add(column.checked_mul(self.stride.x() as i64)?)?
            .checked_add(row.checked_mul(self.stride.y() as i64)?)?;

        let index = usize::try_from(index).ok()?;
        if index < self.memory.len() { Some(index) } else { None }
    }

    /// Load the sample of a pixel.
    pub fn get(&self, position: Vec2<i32>, data_window: IntegerBounds) -> Option<Sample> {
        self.memory.get(self.index_of(position, data_window)?)
    }

    /// Store the sample of a pixel, converting it to the type of this slice.
    pub fn set(&self, position: Vec2<i32>, data_window: IntegerBounds, sample: Sample) -> Option<()> {
        self.memory.set(self.index_of(position, data_window)?, sample)
    }

    /// Check that every sampled pixel of the data window is inside the memory.
    /// As the index grows linearly in both dimensions,
    /// checking the corners of the sampled grid is sufficient.
    pub fn validate(&self, name: &str, data_window: IntegerBounds) -> UnitResult {
        let Vec2(x_sampling, y_sampling) = self.sampling;

        if x_sampling == 0 || y_sampling == 0 || x_sampling > i32::MAX as usize || y_sampling > i32::MAX as usize {
            return Err(Error::slice(name, "sampling factors must be between 1 and the largest 32-bit integer"));
        }

        let (x_sampling, y_sampling) = (x_sampling as i64, y_sampling as i64);

        let first = |min: i32, sampling: i64| sampling * (i64::from(min) + sampling - 1).div_euclid(sampling);
        let last = |max: i32, sampling: i64| sampling * i64::from(max).div_euclid(sampling);

        let columns = (first(data_window.min.x(), x_sampling), last(data_window.max.x(), x_sampling));
        let rows = (first(data_window.min.y(), y_sampling), last(data_window.max.y(), y_sampling));

        // no sampled pixel in the data window
        if columns.0 > columns.1 || rows.0 > rows.1 {
            return Ok(());
        }

        for x in [columns.0, columns.1] {
            for y in [rows.0, rows.1] {
                // inside the data window, so the coordinates fit into 32 bits
                let position = Vec2(x as i32, y as i32);

                if self.index_of(position, data_window).is_none() {
                    return Err(Error::slice(name, format!(
                        "pixel ({}, {}) lies outside of the {} samples of memory",
                        x, y, self.memory.len()
                    )));
                }
            }
        }

        Ok(())
    }
}


impl<'m> FrameBuffer<'m> {

    /// A frame buffer without any slices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a slice to a channel name, replacing any previous slice of that name.
    /// Returns the replaced slice. The slice is validated when the frame buffer is attached to a file.
    pub fn insert_slice(&mut self, name: impl Into<String>, slice: Slice<'m>) -> Option<Slice<'m>> {
        self.slices.insert(name.into(), slice)
    }

    /// The slice bound to this channel name, if any.
    pub fn get(&self, name: &str) -> Option<&Slice<'m>> {
        self.slices.get(name)
    }

    /// All slices, sorted by channel name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slice<'m>)> + '_ {
        self.slices.iter().map(|(name, slice)| (name.as_str(), slice))
    }

    /// Number of slices.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Whether no slice has been inserted.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Check that all slices can be used with the header of a file.
    /// Slices of channels in the header must use the same sampling as the channel.
    pub(crate) fn validate_for(&self, header: &Header) -> UnitResult {
        for (name, slice) in self.iter() {
            if let Ok(channel) = header.get_channel(name) {
                if channel.sampling != slice.sampling {
                    return Err(Error::slice(name, format!(
                        "sampling {:?} differs from the channel sampling {:?}",
                        slice.sampling, channel.sampling
                    )));
                }
            }

            slice.validate(name, header.data_window)?;
        }

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn packed_indices() {
        let window = IntegerBounds::new((10, 20), (12, 21));
        let mut pixels = vec![ 0.0_f32; 6 ];
        let slice = Slice::packed(pixels.as_mut_slice(), window);

        assert_eq!(slice.index_of(Vec2(10, 20), window), Some(0));
        assert_eq!(slice.index_of(Vec2(12, 20), window), Some(2));
        assert_eq!(slice.index_of(Vec2(11, 21), window), Some(4));
        assert_eq!(slice.index_of(Vec2(13, 21), window), None);
        assert_eq!(slice.index_of(Vec2(9, 20), window), None);
        assert!(slice.validate("Y", window).is_ok());
    }

    #[test]
    fn interleaved_slices_share_memory() {
        let window = IntegerBounds::from_dimensions((2, 1));
        let mut rgb = vec![ 0.0_f32; 6 ];
        let cells = Cell::from_mut(rgb.as_mut_slice()).as_slice_of_cells();

        let red = Slice::new(cells, 0, (3, 6));
        let blue = Slice::new(cells, 2, (3, 6));

        red.set(Vec2(1, 0), window, Sample::F32(1.0)).unwrap();
        blue.set(Vec2(0, 0), window, Sample::F16(f16::from_f32(0.5))).unwrap();

        assert_eq!(rgb, vec![ 0.0, 0.0, 0.5, 1.0, 0.0, 0.0 ]);
    }

    #[test]
    fn absolute_coordinates_with_offset_origin() {
        // a buffer covering only the data window, addressed with absolute coordinates
        let window = IntegerBounds::new((-2, -1), (1, 0));
        let mut pixels = vec![ 0_u32; 8 ];
        let slice = Slice::new(pixels.as_mut_slice(), 2 + 4, (1, 4));

        assert_eq!(slice.index_of(Vec2(-2, -1), window), Some(0));
        assert_eq!(slice.index_of(Vec2(1, 0), window), Some(7));
        assert!(slice.validate("Z", window).is_ok());
    }

    #[test]
    fn too_small_memory_is_rejected() {
        let window = IntegerBounds::from_dimensions((4, 4));
        let mut pixels = vec![ f16::ZERO; 15 ];
        let slice = Slice::packed(pixels.as_mut_slice(), window);

        match slice.validate("R", window) {
            Err(Error::InvalidSlice { channel, .. }) => assert_eq!(channel, "R"),
            other => panic!("unexpected validation result {:?}", other),
        }
    }

    #[test]
    fn subsampled_slice() {
        let window = IntegerBounds::from_dimensions((4, 4));
        let mut pixels = vec![ 0.0_f32; 4 ];
        let slice = Slice::new(pixels.as_mut_slice(), 0, (1, 2)).with_sampling(2, 2);

        assert_eq!(slice.index_of(Vec2(2, 2), window), Some(3));
        assert_eq!(slice.index_of(Vec2(3, 3), window), Some(3));
        assert!(slice.validate("C", window).is_ok());
        assert!(slice.with_sampling(0, 2).validate("C", window).is_err());
    }

    #[test]
    fn insert_replaces() {
        let mut first = vec![ 0.0_f32; 1 ];
        let mut second = vec![ 0_u32; 1 ];

        let mut frame_buffer = FrameBuffer::new();
        assert!(frame_buffer.insert_slice("A", Slice::new(first.as_mut_slice(), 0, (0, 0))).is_none());

        let previous = frame_buffer.insert_slice("A", Slice::new(second.as_mut_slice(), 0, (0, 0)));
        assert_eq!(previous.map(|slice| slice.sample_type()), Some(SampleType::F32));
        assert_eq!(frame_buffer.get("A").map(|slice| slice.sample_type()), Some(SampleType::U32));
        assert_eq!(frame_buffer.len(), 1);
    }
}
