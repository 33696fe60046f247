
//! Simple math utilities.

/// Simple two-dimensional vector of any numerical type.
/// Supports only few mathematical operations
/// as this is used mainly as data struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Vec2<T> (pub T, pub T);

impl<T> Vec2<T> {

    /// The first component of this 2D vector.
    #[inline] pub fn x(self) -> T { self.0 }

    /// The second component of this 2D vector.
    #[inline] pub fn y(self) -> T { self.1 }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self { Vec2(x, y) }
}


/// Integer division that rounds towards negative infinity.
/// Used to place subsampled pixels, where the coordinate may be negative.
pub fn div_p(x: i32, y: i32) -> i32 {
    if x >= 0 {
        if y >= 0 { x / y }
        else { -(x / -y) }
    }
    else if y >= 0 { -((y - 1 - x) / y) }
    else { (-y - 1 - x) / -y }
}

/// Remainder of `div_p`, never negative for positive `y`.
pub fn mod_p(x: i32, y: i32) -> i32 {
    x - y * div_p(x, y)
}

/// Number of integers in `min ..= max` that are divisible by `sampling`.
pub fn sample_count(min: i32, max: i32, sampling: i32) -> usize {
    if max < min { return 0; }

    let first = div_p(min + sampling - 1, sampling);
    let last = div_p(max, sampling);
    (last - first + 1).max(0) as usize
}
