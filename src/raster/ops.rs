use super::{Raster, RasterData, RasterError, Sample};

/// How overlapping tiles are composited
///
/// A pixel is nodata when every one of its channels equals the marker.
/// All modes take the other side's pixel when one side is nodata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Truncated arithmetic mean of the two pixels
    #[default]
    Average,
    /// The first raster's pixel wins
    Keep,
    /// Blend weighted inversely by each pixel's mean channel distance from the marker
    ///
    /// A pixel's weight is the sample range minus that distance, at least one.
    ///
    /// The blend starts from the first raster and truncates toward it, so
    /// `merge(a, b)` and `merge(b, a)` can differ by one unit.
    Weighted,
}

impl Raster {
    /// Box filtered half resolution copy
    pub fn halfscale(&self) -> Result<Raster, RasterError> {
        let (w, h) = self.dimensions;
        if w % 2 != 0 || h % 2 != 0 {
            return Err(RasterError::OddDimensions(self.dimensions));
        }
        let c = self.channels as usize;
        let data = map_samples!(&self.data, v => halfscale_samples(v, w as usize, c));
        Raster::new((w / 2, h / 2), self.channels, self.format, data)
    }

    /// Composite of `self` (first) and `other` (second) under `mode`
    pub fn merge_nodata(
        &self,
        other: &Raster,
        nodata: f64,
        mode: MergeMode,
    ) -> Result<Raster, RasterError> {
        if self.shape() != other.shape() {
            return Err(RasterError::ShapeMismatch((self.shape(), other.shape())));
        }
        let c = self.channels as usize;
        let data = match (&self.data, &other.data) {
            (RasterData::U8(a), RasterData::U8(b)) => RasterData::U8(merge_samples(a, b, c, nodata, mode)),
            (RasterData::U16(a), RasterData::U16(b)) => RasterData::U16(merge_samples(a, b, c, nodata, mode)),
            (RasterData::F32(a), RasterData::F32(b)) => RasterData::F32(merge_samples(a, b, c, nodata, mode)),
            (a, b) => {
                return Err(RasterError::SampleTypeMismatch((
                    a.sample_type(),
                    b.sample_type(),
                )))
            }
        };
        Raster::new(self.dimensions, self.channels, self.format, data)
    }

    /// True when every pixel equals the nodata marker in all channels
    pub fn is_all_nodata(&self, nodata: f64) -> bool {
        match &self.data {
            RasterData::U8(v) => v.iter().all(|s| is_marker(*s, nodata)),
            RasterData::U16(v) => v.iter().all(|s| is_marker(*s, nodata)),
            RasterData::F32(v) => v.iter().all(|s| is_marker(*s, nodata)),
        }
    }
}

fn halfscale_samples<S: Sample>(src: &[S], w: usize, c: usize) -> Vec<S> {
    let row = w * c;
    if row == 0 {
        return vec![];
    }
    let mut out = Vec::with_capacity(src.len() / 4);
    for pair in src.chunks_exact(2 * row) {
        let (top, bottom) = pair.split_at(row);
        for x in (0..w).step_by(2) {
            for k in 0..c {
                let i = x * c + k;
                out.push(S::average4(top[i], top[i + c], bottom[i], bottom[i + c]));
            }
        }
    }
    out
}

fn is_marker<S: Sample>(s: S, nodata: f64) -> bool {
    s.to_f64_lossy() == nodata
}

fn weight<S: Sample>(pixel: &[S], nodata: f64) -> f64 {
    let distance: f64 = pixel
        .iter()
        .map(|s| (s.to_f64_lossy() - nodata).abs())
        .sum();
    (S::WEIGHT_SPAN - (distance / pixel.len() as f64).floor()).max(1.0)
}

fn merge_samples<S: Sample>(a: &[S], b: &[S], c: usize, nodata: f64, mode: MergeMode) -> Vec<S> {
    let mut out = Vec::with_capacity(a.len());
    for (pa, pb) in a.chunks_exact(c).zip(b.chunks_exact(c)) {
        let a_bad = pa.iter().all(|s| is_marker(*s, nodata));
        let b_bad = pb.iter().all(|s| is_marker(*s, nodata));
        if a_bad {
            out.extend_from_slice(pb);
            continue;
        }
        if b_bad {
            out.extend_from_slice(pa);
            continue;
        }
        match mode {
            MergeMode::Average => out.extend(pa.iter().zip(pb).map(|(x, y)| S::average2(*x, *y))),
            MergeMode::Keep => out.extend_from_slice(pa),
            MergeMode::Weighted => {
                let (wa, wb) = (weight(pa, nodata), weight(pb, nodata));
                out.extend(pa.iter().zip(pb).map(|(x, y)| S::blend(*x, *y, wa, wb)));
            }
        }
    }
    out
}
