use super::{Region, MAX_LEVELS};
use crate::error::{PyramidError, PyramidResult};

/// Half the width of the web-mercator square, in meters
pub const MAP_SCALE: f64 = 20037508.342789248;

// Grid positions this close to a tile edge are treated as on it
const EDGE_EPSILON: f64 = 1e-6;

fn check_level(z: u32) -> PyramidResult<u32> {
    if z < MAX_LEVELS {
        Ok(z)
    } else {
        Err(PyramidError::InvalidLevel(z))
    }
}

/// Ground width of one tile at level `z`, in meters
pub fn cell_size(z: u32) -> f64 {
    2.0 * MAP_SCALE / (1_u64 << z.min(63)) as f64
}

/// Tile-grid region at level `z` covering a mercator rectangle
///
/// The result is clamped to the map and is never empty.
pub fn dwm_to_iwm(world: &Region<f64>, z: u32) -> PyramidResult<Region<u32>> {
    let z = check_level(z)?;
    let world = world.normalized();
    let n = (1_u64 << z) as f64;
    let to_grid = |w: f64| (w + MAP_SCALE) / (2.0 * MAP_SCALE) * n;
    let lower = |w: f64| (to_grid(w) + EDGE_EPSILON).floor().clamp(0.0, n - 1.0) as u32;
    let upper = |w: f64, tl: u32| {
        let br = (to_grid(w) - EDGE_EPSILON).ceil().clamp(0.0, n) as u32;
        br.max(tl + 1)
    };
    let x0 = lower(world.x.min);
    let y0 = lower(world.y.min);
    Ok(Region::new(
        x0,
        y0,
        upper(world.x.max, x0),
        upper(world.y.max, y0),
    ))
}

/// Mercator rectangle spanned by a tile-grid region at level `z`
pub fn iwm_to_dwm(grid: &Region<u32>, z: u32) -> PyramidResult<Region<f64>> {
    let z = check_level(z)?;
    let n = (1_u64 << z) as f64;
    let to_world = |i: u32| (i as f64 / n - 0.5) * 2.0 * MAP_SCALE;
    Ok(Region::new(
        to_world(grid.x.min),
        to_world(grid.y.min),
        to_world(grid.x.max),
        to_world(grid.y.max),
    ))
}
