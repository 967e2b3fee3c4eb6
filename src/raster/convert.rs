use super::{check_channels, Raster, RasterData, RasterError, RasterFormat, Sample};

impl Raster {
    /// Same pixels with a different channel count
    ///
    /// Gray is the truncated mean of the colour channels, alpha is dropped or
    /// added as opaque. Terrain only exists as one channel.
    pub fn to_channels(&self, channels: u8) -> Result<Raster, RasterError> {
        check_channels(channels)?;
        if channels == self.channels {
            return Ok(self.clone());
        }
        if self.format == RasterFormat::Terrain {
            return Err(RasterError::NotSupported(format!(
                "Terrain raster as {channels} channels"
            )));
        }
        let from = self.channels as usize;
        let to = channels as usize;
        let data = map_samples!(&self.data, v => convert_samples(v, from, to));
        let format = match (self.format, channels) {
            (RasterFormat::Color, 1) => RasterFormat::Grayscale,
            (RasterFormat::Grayscale, 3 | 4) => RasterFormat::Color,
            (format, _) => format,
        };
        Raster::new(self.dimensions, channels, format, data)
    }
}

fn gray<S: Sample>(pixel: &[S]) -> S {
    let sum: f64 = pixel[..3].iter().map(|s| s.to_f64_lossy()).sum();
    let mean = sum / 3.0;
    if S::BILINEAR_RES > 0 {
        S::from_f64(mean.floor())
    } else {
        S::from_f64(mean)
    }
}

fn convert_samples<S: Sample>(src: &[S], from: usize, to: usize) -> Vec<S> {
    let mut out = Vec::with_capacity(src.len() / from * to);
    for pixel in src.chunks_exact(from) {
        match (from, to) {
            (1, _) => {
                out.extend(std::iter::repeat(pixel[0]).take(to.min(3)));
                if to == 4 {
                    out.push(S::OPAQUE);
                }
            }
            (_, 1) => out.push(gray(pixel)),
            (3, 4) => {
                out.extend_from_slice(pixel);
                out.push(S::OPAQUE);
            }
            _ => out.extend_from_slice(&pixel[..to]),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::SampleType;

    #[test]
    fn test_color_to_gray_and_back() {
        let rgb = Raster::new((2, 1), 3, RasterFormat::Color, RasterData::U8(vec![10, 20, 31, 255, 255, 255]))
            .unwrap();
        let g = rgb.to_channels(1).unwrap();
        assert_eq!(g.format, RasterFormat::Grayscale);
        assert_eq!(g.data, RasterData::U8(vec![20, 255]));
        let rgba = g.to_channels(4).unwrap();
        assert_eq!(
            rgba.data,
            RasterData::U8(vec![20, 20, 20, 255, 255, 255, 255, 255])
        );
        assert_eq!(rgba.to_channels(3).unwrap().data, RasterData::U8(vec![20, 20, 20, 255, 255, 255]));
    }

    #[test]
    fn test_rgba_gray_ignores_alpha() {
        let rgba = Raster::new((1, 1), 4, RasterFormat::Color, RasterData::U8(vec![30, 30, 30, 0]))
            .unwrap();
        assert_eq!(rgba.to_channels(1).unwrap().data, RasterData::U8(vec![30]));
    }

    #[test]
    fn test_terrain_stays_single_channel() {
        let t = Raster::blank((2, 2), 1, RasterFormat::Terrain, SampleType::U16).unwrap();
        assert!(t.to_channels(1).is_ok());
        assert!(matches!(t.to_channels(3), Err(RasterError::NotSupported(_))));
    }
}
