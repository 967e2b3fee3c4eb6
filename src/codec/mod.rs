use crate::env::DatasetMeta;
use crate::raster::{Raster, RasterError, RasterFormat, SampleType};
use std::fmt;
use std::io;
use std::sync::Arc;

mod compression;
#[cfg(feature = "image")]
mod jpeg;

pub use compression::Compression;
#[cfg(feature = "image")]
pub use jpeg::JpegCodec;

#[derive(Debug)]
pub enum CodecError {
    /// Decoded byte count, expected byte count
    LengthMismatch((usize, usize)),
    CompressionNotSupported(Compression),
    /// Tile shape, codec shape
    ShapeMismatch(((u32, u32, u8, SampleType), (u32, u32, u8, SampleType))),
    MissingExternalCodec(Compression),
    External(String),
    RasterizationError(RasterError),
    IoError(io::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for CodecError {}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::IoError(e)
    }
}

impl From<RasterError> for CodecError {
    fn from(e: RasterError) -> Self {
        CodecError::RasterizationError(e)
    }
}

/// Opinionated image codec used for colour tiles
pub trait ExternalCodec: Send + Sync + fmt::Debug {
    fn encode(&self, tile: &Raster) -> Result<Vec<u8>, CodecError>;

    /// May return fewer or more channels than were encoded, `TileCodec`
    /// converts the result to the dataset's channel count
    fn decode(&self, bytes: &[u8]) -> Result<Raster, CodecError>;
}

/// Tile payload encoder / decoder for one dataset
///
/// Decoding is pure: the same bytes always give the same raster.
#[derive(Clone, Debug)]
pub struct TileCodec {
    pub compression: Compression,
    pub format: RasterFormat,
    pub sample_type: SampleType,
    pub channels: u8,
    pub tile_size: u32,
    external: Option<Arc<dyn ExternalCodec>>,
}

impl TileCodec {
    pub fn from_meta(meta: &DatasetMeta) -> Self {
        Self {
            compression: meta.compression,
            format: meta.format,
            sample_type: meta.sample_type,
            channels: meta.channels,
            tile_size: meta.tile_size,
            external: default_external(meta.compression),
        }
    }

    pub fn with_external(mut self, codec: Arc<dyn ExternalCodec>) -> Self {
        self.external = Some(codec);
        self
    }

    /// Byte size of one decoded tile
    pub fn expected_len(&self) -> usize {
        let side = self.tile_size as usize;
        side * side * self.channels as usize * self.sample_type.size()
    }

    fn shape(&self) -> (u32, u32, u8, SampleType) {
        (self.tile_size, self.tile_size, self.channels, self.sample_type)
    }

    fn external(&self) -> Result<&dyn ExternalCodec, CodecError> {
        self.external
            .as_deref()
            .ok_or(CodecError::MissingExternalCodec(self.compression))
    }

    pub fn encode(&self, tile: &Raster) -> Result<Vec<u8>, CodecError> {
        let shape = (tile.width(), tile.height(), tile.channels, tile.sample_type());
        if self.compression.is_builtin() {
            if shape != self.shape() {
                return Err(CodecError::ShapeMismatch((shape, self.shape())));
            }
            return self.compression.compress(&tile.to_bytes());
        }
        if tile.dimensions != (self.tile_size, self.tile_size) {
            return Err(CodecError::ShapeMismatch((shape, self.shape())));
        }
        self.external()?.encode(tile)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Raster, CodecError> {
        if self.compression.is_builtin() {
            let raw = self.compression.decompress(bytes, self.expected_len())?;
            let dims = (self.tile_size, self.tile_size);
            return Ok(Raster::from_bytes(
                dims,
                self.channels,
                self.format,
                self.sample_type,
                &raw,
            )?);
        }
        let tile = self.external()?.decode(bytes)?;
        if tile.dimensions != (self.tile_size, self.tile_size)
            || tile.sample_type() != self.sample_type
        {
            let shape = (tile.width(), tile.height(), tile.channels, tile.sample_type());
            return Err(CodecError::ShapeMismatch((shape, self.shape())));
        }
        if tile.channels == self.channels {
            return Ok(tile);
        }
        Ok(tile.to_channels(self.channels)?)
    }
}

#[cfg(feature = "image")]
fn default_external(compression: Compression) -> Option<Arc<dyn ExternalCodec>> {
    match compression {
        Compression::Jpeg => Some(Arc::new(JpegCodec::default())),
        _ => None,
    }
}

#[cfg(not(feature = "image"))]
fn default_external(_compression: Compression) -> Option<Arc<dyn ExternalCodec>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::RasterData;

    fn terrain_meta(compression: Compression) -> DatasetMeta {
        DatasetMeta::terrain()
            .with_tile_size(4)
            .with_compression(compression)
    }

    fn terrain_tile() -> Raster {
        let v = (0..16).map(|i| i * 1000 + 7).collect();
        Raster::new((4, 4), 1, RasterFormat::Terrain, RasterData::U16(v)).unwrap()
    }

    #[test]
    fn test_raw_and_deflate_round_trip() {
        for compression in [Compression::Raw, Compression::Deflate] {
            let codec = TileCodec::from_meta(&terrain_meta(compression));
            let tile = terrain_tile();
            let bytes = codec.encode(&tile).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), tile);
            assert_eq!(codec.decode(&bytes).unwrap(), codec.decode(&bytes).unwrap());
        }
    }

    #[test]
    fn test_raw_payload_is_sample_bytes() {
        let codec = TileCodec::from_meta(&terrain_meta(Compression::Raw));
        let bytes = codec.encode(&terrain_tile()).unwrap();
        assert_eq!(bytes.len(), codec.expected_len());
        assert_eq!(&bytes[..2], &[7, 0]);
    }

    #[test]
    fn test_truncated_payload_fails() {
        let codec = TileCodec::from_meta(&terrain_meta(Compression::Raw));
        let bytes = codec.encode(&terrain_tile()).unwrap();
        assert!(matches!(
            codec.decode(&bytes[..30]),
            Err(CodecError::LengthMismatch((30, 32)))
        ));
    }

    #[test]
    fn test_encode_rejects_wrong_shape() {
        let codec = TileCodec::from_meta(&terrain_meta(Compression::Deflate));
        let small = Raster::new((2, 2), 1, RasterFormat::Terrain, RasterData::U16(vec![0; 4])).unwrap();
        assert!(matches!(codec.encode(&small), Err(CodecError::ShapeMismatch(_))));
    }

    #[test]
    fn test_float_terrain() {
        let meta = DatasetMeta::terrain()
            .with_tile_size(2)
            .with_sample_type(SampleType::F32);
        let codec = TileCodec::from_meta(&meta);
        let tile = Raster::new((2, 2), 1, RasterFormat::Terrain, RasterData::F32(vec![-0.5, 1.0, 8848.0, -11034.0]))
            .unwrap();
        assert_eq!(codec.decode(&codec.encode(&tile).unwrap()).unwrap(), tile);
    }

    #[derive(Debug)]
    struct Constant;

    impl ExternalCodec for Constant {
        fn encode(&self, _tile: &Raster) -> Result<Vec<u8>, CodecError> {
            Ok(vec![42])
        }

        fn decode(&self, bytes: &[u8]) -> Result<Raster, CodecError> {
            Ok(Raster::filled((4, 4), 3, RasterFormat::Color, SampleType::U8, bytes[0] as f64)?)
        }
    }

    #[test]
    fn test_external_codec_is_pluggable() {
        let meta = DatasetMeta::color().with_tile_size(4).with_compression(Compression::Jpeg);
        let codec = TileCodec::from_meta(&meta).with_external(Arc::new(Constant));
        let tile = Raster::blank((4, 4), 3, RasterFormat::Color, SampleType::U8).unwrap();
        assert_eq!(codec.encode(&tile).unwrap(), vec![42]);
        assert_eq!(codec.decode(&[42]).unwrap().get_pixel(3, 3), Some(vec![42.0; 3]));
    }

    #[test]
    fn test_external_decode_matches_dataset_channels() {
        let meta = DatasetMeta::color()
            .with_tile_size(4)
            .with_channels(4)
            .with_compression(Compression::Jpeg);
        let codec = TileCodec::from_meta(&meta).with_external(Arc::new(Constant));
        let tile = codec.decode(&[42]).unwrap();
        assert_eq!(tile.channels, 4);
        assert_eq!(tile.get_pixel(0, 0), Some(vec![42.0, 42.0, 42.0, 255.0]));

        let wide = TileCodec::from_meta(&meta.with_sample_type(SampleType::U16))
            .with_external(Arc::new(Constant));
        assert!(matches!(wide.decode(&[42]), Err(CodecError::ShapeMismatch(_))));
    }
}
