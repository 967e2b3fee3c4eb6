use std::fmt;

mod mercator;
mod region;

pub use mercator::{cell_size, dwm_to_iwm, iwm_to_dwm, MAP_SCALE};
pub use region::{Interval, Region};

/// Number of addressable pyramid levels, valid levels are `0..MAX_LEVELS`
pub const MAX_LEVELS: u32 = 30;

const AXIS_BITS: u32 = 29;
const AXIS_MASK: u64 = (1 << AXIS_BITS) - 1;

/// Packed quadtree key `z << 58 | y << 29 | x`
///
/// The packing makes the integer order the level-major, row, column order
/// every level index is sorted by. `y` grows northward, so row 0 is the
/// southern edge of the map.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockCoordinate(u64);

impl BlockCoordinate {
    pub fn new(z: u32, y: u32, x: u32) -> Option<Self> {
        if z >= MAX_LEVELS {
            return None;
        }
        let n = 1_u64 << z;
        if y as u64 >= n || x as u64 >= n {
            return None;
        }
        Some(Self(Self::search_bound(z, y, x)))
    }

    /// Raw sort position of `(z, y, x)` for searching a level's keys
    ///
    /// `x` may equal `1 << z`, which sorts directly before row `y + 1`.
    pub fn search_bound(z: u32, y: u32, x: u32) -> u64 {
        ((z as u64) << (2 * AXIS_BITS)) | ((y as u64) << AXIS_BITS) | x as u64
    }

    /// Validates a key read back from storage
    pub fn from_raw(c: u64) -> Option<Self> {
        let z = (c >> (2 * AXIS_BITS)) as u32;
        let y = ((c >> AXIS_BITS) & AXIS_MASK) as u32;
        let x = (c & AXIS_MASK) as u32;
        Self::new(z, y, x)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn z(self) -> u32 {
        (self.0 >> (2 * AXIS_BITS)) as u32
    }

    pub fn y(self) -> u32 {
        ((self.0 >> AXIS_BITS) & AXIS_MASK) as u32
    }

    pub fn x(self) -> u32 {
        (self.0 & AXIS_MASK) as u32
    }

    pub fn parent(self) -> Option<Self> {
        match self.z() {
            0 => None,
            z => Self::new(z - 1, self.y() >> 1, self.x() >> 1),
        }
    }

    /// Children in key order: south-west, south-east, north-west, north-east
    pub fn children(self) -> Option<[Self; 4]> {
        let (z, y, x) = (self.z() + 1, self.y() << 1, self.x() << 1);
        Some([
            Self::new(z, y, x)?,
            Self::new(z, y, x + 1)?,
            Self::new(z, y + 1, x)?,
            Self::new(z, y + 1, x + 1)?,
        ])
    }

    /// Mercator bounds of the tile
    pub fn world_region(self) -> Region<f64> {
        let size = cell_size(self.z());
        let x0 = self.x() as f64 * size - MAP_SCALE;
        let y0 = self.y() as f64 * size - MAP_SCALE;
        Region::new(x0, y0, x0 + size, y0 + size)
    }
}

impl fmt::Debug for BlockCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockCoordinate({}, {}, {})", self.z(), self.y(), self.x())
    }
}

impl fmt::Display for BlockCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z(), self.y(), self.x())
    }
}
