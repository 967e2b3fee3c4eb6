use super::{CodecError, ExternalCodec};
use crate::raster::{Raster, SampleType};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

/// JPEG through the `image` crate, 8-bit gray or RGB, alpha is dropped
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    pub quality: u8,
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

impl ExternalCodec for JpegCodec {
    fn encode(&self, tile: &Raster) -> Result<Vec<u8>, CodecError> {
        if tile.sample_type() != SampleType::U8 {
            return Err(CodecError::External(format!(
                "JPEG needs 8-bit samples, got {:?}",
                tile.sample_type()
            )));
        }
        let tile = match tile.channels {
            4 => tile.to_channels(3)?,
            _ => tile.clone(),
        };
        let color = match tile.channels {
            1 => ExtendedColorType::L8,
            _ => ExtendedColorType::Rgb8,
        };
        let mut bytes = vec![];
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .write_image(&tile.to_bytes(), tile.width(), tile.height(), color)
            .map_err(|e| CodecError::External(format!("{e:?}")))?;
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Raster, CodecError> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map_err(|e| CodecError::External(format!("{e:?}")))?;
        Ok(Raster::from_image(img)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::RasterFormat;

    #[test]
    fn test_flat_tile_survives() {
        let tile = Raster::filled((16, 16), 3, RasterFormat::Color, SampleType::U8, 128.0).unwrap();
        let codec = JpegCodec::default();
        let back = codec.decode(&codec.encode(&tile).unwrap()).unwrap();
        assert_eq!(back.dimensions, (16, 16));
        assert_eq!(back.channels, 3);
        let v = back.get_sample(8, 8, 0).unwrap();
        assert!((v - 128.0).abs() <= 2.0);
    }

    #[test]
    fn test_rejects_terrain_samples() {
        let tile = Raster::blank((8, 8), 1, RasterFormat::Terrain, SampleType::U16).unwrap();
        assert!(matches!(JpegCodec::default().encode(&tile), Err(CodecError::External(_))));
    }
}
