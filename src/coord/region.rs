use std::fmt;
use std::ops::Sub;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: Copy + Sub<Output = T>> Interval<T> {
    pub fn range(&self) -> T {
        self.max - self.min
    }
}

impl<T: Copy + PartialOrd> Interval<T> {
    fn sorted(self) -> Self {
        if self.max < self.min {
            Self::new(self.max, self.min)
        } else {
            self
        }
    }
}

/// Axis aligned rectangle, `x` is the column (easting) axis
///
/// Tile-grid regions are half open: `min <= i < max`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Region<T> {
    pub x: Interval<T>,
    pub y: Interval<T>,
}

impl<T> Region<T> {
    pub fn new(min_x: T, min_y: T, max_x: T, max_y: T) -> Self {
        Self {
            x: Interval::new(min_x, max_x),
            y: Interval::new(min_y, max_y),
        }
    }
}

impl<T: Copy> Region<T> {
    pub fn as_tuple(&self) -> (T, T, T, T) {
        (self.x.min, self.y.min, self.x.max, self.y.max)
    }

    pub fn x_min(&self) -> T {
        self.x.min
    }

    pub fn y_min(&self) -> T {
        self.y.min
    }

    pub fn x_max(&self) -> T {
        self.x.max
    }

    pub fn y_max(&self) -> T {
        self.y.max
    }
}

impl<T: Copy + PartialOrd> Region<T> {
    /// Swaps corners submitted in the wrong order
    pub fn normalized(&self) -> Self {
        Self {
            x: self.x.sorted(),
            y: self.y.sorted(),
        }
    }
}

impl Region<u32> {
    /// Normalized tile-grid region where a collapsed axis covers one tile
    pub fn normalized_grid(&self) -> Self {
        let mut region = self.normalized();
        for axis in [&mut region.x, &mut region.y] {
            if axis.max == axis.min {
                axis.max = axis.min.saturating_add(1);
            }
        }
        region
    }

    pub fn width(&self) -> u32 {
        self.x.range()
    }

    pub fn height(&self) -> u32 {
        self.y.range()
    }

    pub fn tile_count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x.min && x < self.x.max && y >= self.y.min && y < self.y.max
    }

    /// Smallest region covering both
    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.x.min.min(other.x.min),
            self.y.min.min(other.y.min),
            self.x.max.max(other.x.max),
            self.y.max.max(other.y.max),
        )
    }
}

impl<T: fmt::Display> fmt::Display for Region<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[({}, {}) - ({}, {})]",
            self.x.min, self.y.min, self.x.max, self.y.max
        )
    }
}
