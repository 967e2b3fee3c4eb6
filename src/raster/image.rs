use super::{Raster, RasterData, RasterError, RasterFormat};
use image::{DynamicImage, ImageBuffer};

impl TryFrom<Raster> for DynamicImage {
    type Error = RasterError;

    fn try_from(raster: Raster) -> Result<Self, Self::Error> {
        let Raster {
            dimensions: (width, height),
            channels,
            data,
            ..
        } = raster;

        let unsupported = |data: &RasterData| {
            RasterError::NotSupported(format!(
                "{channels} channel {:?} image",
                data.sample_type()
            ))
        };
        let size_error = || RasterError::BufferSize((0, (width, height), channels));

        let img = match (channels, data) {
            (1, RasterData::U8(v)) => ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageLuma8),
            (3, RasterData::U8(v)) => ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgb8),
            (4, RasterData::U8(v)) => ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgba8),
            (1, RasterData::U16(v)) => ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageLuma16),
            (3, RasterData::U16(v)) => ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgb16),
            (4, RasterData::U16(v)) => ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgba16),
            (3, RasterData::F32(v)) => ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgb32F),
            (4, RasterData::F32(v)) => ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgba32F),
            (_, data) => return Err(unsupported(&data)),
        };
        img.ok_or_else(size_error)
    }
}

impl Raster {
    pub fn into_image(self) -> Result<DynamicImage, RasterError> {
        self.try_into()
    }

    /// Converts any decoded image, formats without a direct counterpart go through RGBA8
    pub fn from_image(img: DynamicImage) -> Result<Self, RasterError> {
        let dimensions = (img.width(), img.height());
        let (channels, format, data) = match img {
            DynamicImage::ImageLuma8(ib) => (1, RasterFormat::Grayscale, RasterData::U8(ib.into_raw())),
            DynamicImage::ImageRgb8(ib) => (3, RasterFormat::Color, RasterData::U8(ib.into_raw())),
            DynamicImage::ImageRgba8(ib) => (4, RasterFormat::Color, RasterData::U8(ib.into_raw())),
            DynamicImage::ImageLuma16(ib) => (1, RasterFormat::Grayscale, RasterData::U16(ib.into_raw())),
            DynamicImage::ImageRgb16(ib) => (3, RasterFormat::Color, RasterData::U16(ib.into_raw())),
            DynamicImage::ImageRgba16(ib) => (4, RasterFormat::Color, RasterData::U16(ib.into_raw())),
            DynamicImage::ImageRgb32F(ib) => (3, RasterFormat::Color, RasterData::F32(ib.into_raw())),
            DynamicImage::ImageRgba32F(ib) => (4, RasterFormat::Color, RasterData::F32(ib.into_raw())),
            other => (4, RasterFormat::Color, RasterData::U8(other.to_rgba8().into_raw())),
        };
        Self::new(dimensions, channels, format, data)
    }
}
