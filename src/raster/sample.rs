use super::{RasterData, SampleType};
use num_traits::{NumCast, ToPrimitive};
use std::fmt::Debug;

/// Scalar stored in a raster buffer
///
/// Integer samples interpolate in fixed point with weights scaled by
/// `BILINEAR_RES` and accumulate in `u64`; float samples interpolate in `f64`.
pub trait Sample:
    Copy + Default + PartialEq + PartialOrd + Debug + Send + Sync + NumCast + ToPrimitive + 'static
{
    const TYPE: SampleType;
    /// Fixed-point scale of bilinear weights, zero selects the float path
    const BILINEAR_RES: u64;
    /// Alpha value of a fully opaque pixel
    const OPAQUE: Self;
    /// Largest distance a sample can sit from the nodata marker
    const WEIGHT_SPAN: f64;

    fn wrap(samples: Vec<Self>) -> RasterData;

    fn samples(data: &RasterData) -> Option<&[Self]>;

    /// Saturating conversion, NaN becomes zero for integer samples
    fn from_f64(v: f64) -> Self;

    fn to_f64_lossy(self) -> f64 {
        self.to_f64().unwrap_or(0.0)
    }

    /// Mean of a 2x2 block
    fn average4(a: Self, b: Self, c: Self, d: Self) -> Self;

    /// Mean of two samples, truncated for integers
    fn average2(a: Self, b: Self) -> Self;

    /// `a` moved toward `b` by `wb / (wa + wb)`, truncated toward `a`'s side for integers
    fn blend(a: Self, b: Self, wa: f64, wb: f64) -> Self;

    /// Bilinear mix of `[p00, p01, p10, p11]` where `p01` is the right neighbour
    fn bilinear(p: [Self; 4], fx: f64, fy: f64) -> Self;
}

fn fixed_bilinear(p: [u64; 4], fx: f64, fy: f64, res: u64) -> u64 {
    let ax = ((fx * res as f64).round() as u64).min(res);
    let ay = ((fy * res as f64).round() as u64).min(res);
    let w00 = (res - ax) * (res - ay);
    let w01 = ax * (res - ay);
    let w10 = (res - ax) * ay;
    let w11 = ax * ay;
    let denom = res * res;
    (p[0] * w00 + p[1] * w01 + p[2] * w10 + p[3] * w11 + denom / 2) / denom
}

macro_rules! integer_sample {
    ($t:ty, $variant:ident, $res:expr) => {
        impl Sample for $t {
            const TYPE: SampleType = SampleType::$variant;
            const BILINEAR_RES: u64 = $res;
            const OPAQUE: Self = <$t>::MAX;
            const WEIGHT_SPAN: f64 = <$t>::MAX as f64;

            fn wrap(samples: Vec<Self>) -> RasterData {
                RasterData::$variant(samples)
            }

            fn samples(data: &RasterData) -> Option<&[Self]> {
                match data {
                    RasterData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn from_f64(v: f64) -> Self {
                if v.is_nan() {
                    return 0;
                }
                v.round().clamp(<$t>::MIN as f64, <$t>::MAX as f64) as $t
            }

            fn average4(a: Self, b: Self, c: Self, d: Self) -> Self {
                let sum = a as u32 + b as u32 + c as u32 + d as u32;
                ((sum + 2) / 4) as $t
            }

            fn average2(a: Self, b: Self) -> Self {
                ((a as u32 + b as u32) / 2) as $t
            }

            fn blend(a: Self, b: Self, wa: f64, wb: f64) -> Self {
                let delta = (b as i64 - a as i64) as f64 * wb / (wa + wb);
                (a as i64 + delta.trunc() as i64) as $t
            }

            fn bilinear(p: [Self; 4], fx: f64, fy: f64) -> Self {
                let p = p.map(|v| v as u64);
                fixed_bilinear(p, fx, fy, Self::BILINEAR_RES) as $t
            }
        }
    };
}

integer_sample!(u8, U8, 64);
integer_sample!(u16, U16, 256);

impl Sample for f32 {
    const TYPE: SampleType = SampleType::F32;
    const BILINEAR_RES: u64 = 0;
    const OPAQUE: Self = 1.0;
    const WEIGHT_SPAN: f64 = f32::MAX as f64;

    fn wrap(samples: Vec<Self>) -> RasterData {
        RasterData::F32(samples)
    }

    fn samples(data: &RasterData) -> Option<&[Self]> {
        match data {
            RasterData::F32(v) => Some(v),
            _ => None,
        }
    }

    fn from_f64(v: f64) -> Self {
        v as f32
    }

    fn average4(a: Self, b: Self, c: Self, d: Self) -> Self {
        ((a as f64 + b as f64 + c as f64 + d as f64) / 4.0) as f32
    }

    fn average2(a: Self, b: Self) -> Self {
        ((a as f64 + b as f64) / 2.0) as f32
    }

    fn blend(a: Self, b: Self, wa: f64, wb: f64) -> Self {
        (a as f64 + (b as f64 - a as f64) * wb / (wa + wb)) as f32
    }

    fn bilinear(p: [Self; 4], fx: f64, fy: f64) -> Self {
        let [p00, p01, p10, p11] = p.map(|v| v as f64);
        let top = p00 + (p01 - p00) * fx;
        let bottom = p10 + (p11 - p10) * fx;
        (top + (bottom - top) * fy) as f32
    }
}
