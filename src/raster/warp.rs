// Resampling kernels
//   Matrices map source pixel coordinates to output pixel coordinates, the
//   kernels invert them once and evaluate output -> source per pixel.
//   Pixel centres sit on integer coordinates, sampling is bilinear and
//   out-of-range coordinates clamp to the nearest edge row or column.

use super::{Raster, RasterData, RasterError, Sample};

// Source coordinates this close to an integer are sampled without blending
const SNAP: f64 = 1e-3;
const SINGULAR: f64 = 1e-12;

struct Source<'a, S> {
    samples: &'a [S],
    width: usize,
    height: usize,
    channels: usize,
}

impl<S: Sample> Source<'_, S> {
    fn sample_into(&self, sx: f64, sy: f64, out: &mut [S]) {
        let (x0, fx) = split(sx, self.width);
        let (y0, fy) = split(sy, self.height);
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let c = self.channels;
        let at = |x: usize, y: usize, k: usize| self.samples[(y * self.width + x) * c + k];
        for (k, o) in out.iter_mut().enumerate() {
            *o = S::bilinear([at(x0, y0, k), at(x1, y0, k), at(x0, y1, k), at(x1, y1, k)], fx, fy);
        }
    }
}

/// Clamped integer position and fractional weight along one axis
fn split(v: f64, len: usize) -> (usize, f64) {
    let v = if v.is_finite() { v } else { 0.0 };
    let snapped = v.round();
    let v = if (v - snapped).abs() < SNAP { snapped } else { v };
    let max = (len - 1) as f64;
    if v <= 0.0 {
        (0, 0.0)
    } else if v >= max {
        (len - 1, 0.0)
    } else {
        let floor = v.floor();
        (floor as usize, v - floor)
    }
}

fn for_each_row<S: Sample>(out: &mut [S], row_len: usize, f: impl Fn(usize, &mut [S]) + Send + Sync) {
    if row_len == 0 {
        return;
    }
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        out.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(j, row)| f(j, row));
    }
    #[cfg(not(feature = "rayon"))]
    out.chunks_mut(row_len)
        .enumerate()
        .for_each(|(j, row)| f(j, row));
}

fn resample<S: Sample>(
    samples: &[S],
    src_dims: (u32, u32),
    channels: usize,
    dims: (u32, u32),
    map: impl Fn(f64, f64) -> (f64, f64) + Send + Sync,
) -> Vec<S> {
    let src = Source {
        samples,
        width: src_dims.0 as usize,
        height: src_dims.1 as usize,
        channels,
    };
    let row_len = dims.0 as usize * channels;
    let mut out = vec![S::default(); row_len * dims.1 as usize];
    for_each_row(&mut out, row_len, |j, row| {
        for (i, pixel) in row.chunks_exact_mut(channels).enumerate() {
            let (sx, sy) = map(i as f64, j as f64);
            src.sample_into(sx, sy, pixel);
        }
    });
    out
}

/// Inverse of a 2x3 affine matrix `[a, b, c, d, e, f]`
pub fn invert_affine(m: &[f64; 6]) -> Option<[f64; 6]> {
    let [a, b, c, d, e, f] = *m;
    let det = a * e - b * d;
    if det.abs() < SINGULAR || !det.is_finite() {
        return None;
    }
    let (ia, ib, id, ie) = (e / det, -b / det, -d / det, a / det);
    Some([ia, ib, -(ia * c + ib * f), id, ie, -(id * c + ie * f)])
}

/// Inverse of a row-major 3x3 homography, normalised so element `[2][2]` is 1
pub fn invert_homography(h: &[f64; 9]) -> Option<[f64; 9]> {
    let [a, b, c, d, e, f, g, i, k] = *h;
    let co = [
        e * k - f * i,
        -(d * k - f * g),
        d * i - e * g,
        -(b * k - c * i),
        a * k - c * g,
        -(a * i - b * g),
        b * f - c * e,
        -(a * f - c * d),
        a * e - b * d,
    ];
    let det = a * co[0] + b * co[1] + c * co[2];
    if det.abs() < SINGULAR || !det.is_finite() {
        return None;
    }
    // adjugate is the transposed cofactor matrix
    let inv = [
        co[0] / det,
        co[3] / det,
        co[6] / det,
        co[1] / det,
        co[4] / det,
        co[7] / det,
        co[2] / det,
        co[5] / det,
        co[8] / det,
    ];
    normalize_homography(inv)
}

fn normalize_homography(h: [f64; 9]) -> Option<[f64; 9]> {
    if h[8].abs() < SINGULAR {
        return Some(h);
    }
    Some(h.map(|v| v / h[8]))
}

/// Homography taking each `src[i]` to `dst[i]`
pub fn homography_from_points(src: &[(f64, f64); 4], dst: &[(f64, f64); 4]) -> Option<[f64; 9]> {
    let mut a = [[0.0_f64; 9]; 8];
    for (n, ((x, y), (u, v))) in src.iter().zip(dst.iter()).enumerate() {
        a[2 * n] = [*x, *y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u, *u];
        a[2 * n + 1] = [0.0, 0.0, 0.0, *x, *y, 1.0, -x * v, -y * v, *v];
    }
    // Gaussian elimination with partial pivoting on the augmented system
    for col in 0..8 {
        let pivot = (col..8).max_by(|&p, &q| a[p][col].abs().total_cmp(&a[q][col].abs()))?;
        if a[pivot][col].abs() < SINGULAR {
            return None;
        }
        a.swap(col, pivot);
        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = a[row][col] / a[col][col];
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }
    let mut h = [1.0; 9];
    for (n, row) in a.iter().enumerate() {
        h[n] = row[8] / row[n];
    }
    Some(h)
}

impl Raster {
    fn check_source(&self) -> Result<(), RasterError> {
        if self.width() == 0 || self.height() == 0 {
            return Err(RasterError::NotSupported("Resampling an empty raster".into()));
        }
        Ok(())
    }

    /// Affine warp, `m` maps source pixels to output pixels
    pub fn warp_affine(&self, m: &[f64; 6], dimensions: (u32, u32)) -> Result<Raster, RasterError> {
        self.check_source()?;
        let inv = invert_affine(m).ok_or_else(|| RasterError::SingularTransform(m.to_vec()))?;
        let map = move |x: f64, y: f64| {
            (
                inv[0] * x + inv[1] * y + inv[2],
                inv[3] * x + inv[4] * y + inv[5],
            )
        };
        let (src_dims, c) = (self.dimensions, self.channels as usize);
        let data = map_samples!(&self.data, v => resample(v, src_dims, c, dimensions, map));
        Raster::new(dimensions, self.channels, self.format, data)
    }

    /// Perspective warp, `h` maps source pixels to output pixels
    pub fn warp_perspective(&self, h: &[f64; 9], dimensions: (u32, u32)) -> Result<Raster, RasterError> {
        self.check_source()?;
        let inv = invert_homography(h).ok_or_else(|| RasterError::SingularTransform(h.to_vec()))?;
        let map = move |x: f64, y: f64| {
            let w = inv[6] * x + inv[7] * y + inv[8];
            let w = if w == 0.0 { f64::EPSILON } else { w };
            (
                (inv[0] * x + inv[1] * y + inv[2]) / w,
                (inv[3] * x + inv[4] * y + inv[5]) / w,
            )
        };
        let (src_dims, c) = (self.dimensions, self.channels as usize);
        let data = map_samples!(&self.data, v => resample(v, src_dims, c, dimensions, map));
        Raster::new(dimensions, self.channels, self.format, data)
    }

    /// Per output pixel source coordinates, row-major
    pub fn remap(&self, map: &[(f32, f32)], dimensions: (u32, u32)) -> Result<Raster, RasterError> {
        self.check_source()?;
        let n = dimensions.0 as usize * dimensions.1 as usize;
        if map.len() != n {
            return Err(RasterError::BufferSize((map.len(), dimensions, 2)));
        }
        let w = dimensions.0 as usize;
        let lookup = move |x: f64, y: f64| {
            let (sx, sy) = map[y as usize * w + x as usize];
            (sx as f64, sy as f64)
        };
        let (src_dims, c) = (self.dimensions, self.channels as usize);
        let data = map_samples!(&self.data, v => resample(v, src_dims, c, dimensions, lookup));
        Raster::new(dimensions, self.channels, self.format, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{RasterFormat, SampleType};

    fn ramp(w: u32, h: u32) -> Raster {
        let v = (0..w * h).map(|i| (i * 7 % 256) as u8).collect();
        Raster::new((w, h), 1, RasterFormat::Grayscale, RasterData::U8(v)).unwrap()
    }

    #[test]
    fn test_identity_affine_all_types() {
        let src = ramp(7, 5);
        let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        assert_eq!(src.warp_affine(&identity, (7, 5)).unwrap(), src);

        let terrain = Raster::new(
            (3, 2),
            1,
            RasterFormat::Terrain,
            RasterData::U16(vec![0, 1000, 65535, 7, 8, 9]),
        )
        .unwrap();
        assert_eq!(terrain.warp_affine(&identity, (3, 2)).unwrap(), terrain);

        let float = Raster::new(
            (2, 2),
            1,
            RasterFormat::Terrain,
            RasterData::F32(vec![-1.5, 2.25, 1e6, 0.0]),
        )
        .unwrap();
        assert_eq!(float.warp_affine(&identity, (2, 2)).unwrap(), float);
    }

    #[test]
    fn test_identity_perspective() {
        let src = ramp(6, 4);
        let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        assert_eq!(src.warp_perspective(&identity, (6, 4)).unwrap(), src);
    }

    #[test]
    fn test_translation_clamps_edges() {
        let src = Raster::new((3, 1), 1, RasterFormat::Grayscale, RasterData::U8(vec![10, 20, 30]))
            .unwrap();
        // shift content two pixels to the right
        let out = src.warp_affine(&[1.0, 0.0, 2.0, 0.0, 1.0, 0.0], (3, 1)).unwrap();
        assert_eq!(out.data, RasterData::U8(vec![10, 10, 10]));
        let out = src.warp_affine(&[1.0, 0.0, -2.0, 0.0, 1.0, 0.0], (3, 1)).unwrap();
        assert_eq!(out.data, RasterData::U8(vec![30, 30, 30]));
    }

    #[test]
    fn test_upscale_interpolates() {
        let src = Raster::new((2, 1), 1, RasterFormat::Grayscale, RasterData::U8(vec![0, 100]))
            .unwrap();
        let out = src.warp_affine(&[2.0, 0.0, 0.0, 0.0, 1.0, 0.0], (3, 1)).unwrap();
        assert_eq!(out.data, RasterData::U8(vec![0, 50, 100]));
    }

    #[test]
    fn test_singular_matrix() {
        let src = ramp(2, 2);
        assert!(matches!(
            src.warp_affine(&[0.0; 6], (2, 2)),
            Err(RasterError::SingularTransform(_))
        ));
    }

    #[test]
    fn test_empty_output() {
        let src = ramp(2, 2);
        let out = src.warp_affine(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0], (0, 3)).unwrap();
        assert_eq!(out.dimensions, (0, 3));
        assert!(out.data.is_empty());
    }

    #[test]
    fn test_homography_round_trip() {
        let src = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        let dst = [(1.0, 2.0), (12.0, 1.0), (11.0, 13.0), (0.0, 9.0)];
        let h = homography_from_points(&src, &dst).unwrap();
        for ((x, y), (u, v)) in src.iter().zip(dst.iter()) {
            let w = h[6] * x + h[7] * y + h[8];
            assert!(((h[0] * x + h[1] * y + h[2]) / w - u).abs() < 1e-9);
            assert!(((h[3] * x + h[4] * y + h[5]) / w - v).abs() < 1e-9);
        }
        let inv = invert_homography(&h).unwrap();
        assert!((inv[8] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_affine_inverse() {
        let m = [2.0, 1.0, 3.0, -1.0, 4.0, 5.0];
        let inv = invert_affine(&m).unwrap();
        let (x, y) = (3.0, -2.0);
        let (u, v) = (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5]);
        assert!((inv[0] * u + inv[1] * v + inv[2] - x).abs() < 1e-12);
        assert!((inv[3] * u + inv[4] * v + inv[5] - y).abs() < 1e-12);
    }

    #[test]
    fn test_remap_gathers() {
        let src = Raster::new((2, 2), 1, RasterFormat::Grayscale, RasterData::U8(vec![1, 2, 3, 4]))
            .unwrap();
        let map = [(1.0, 1.0), (0.0, 0.0)];
        let out = src.remap(&map, (2, 1)).unwrap();
        assert_eq!(out.data, RasterData::U8(vec![4, 1]));
        assert!(src.remap(&map, (2, 2)).is_err());
    }

    #[test]
    fn test_multichannel_identity() {
        let src = Raster::filled((3, 3), 4, RasterFormat::Color, SampleType::U8, 77.0).unwrap();
        let out = src.warp_affine(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0], (3, 3)).unwrap();
        assert_eq!(out, src);
    }
}
