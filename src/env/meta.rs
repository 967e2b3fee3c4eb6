// Dataset container layout, little-endian throughout
//   [0, 4096)      header
//   payload        tile payloads, addressed relative to the payload start
//   user metadata  opaque bytes attached by the writer
//   level indices  per level, item_count entries of (key u64, offset u64, length u32)
//
// Header fields
//   magic [u8; 8], version u32, format u8, compression u8, sample type u8,
//   channels u8, tile size u32, reserved u32, nodata f64,
//   payload offset u64, payload length u64, user meta offset u64, user meta length u64,
//   MAX_LEVELS x (index offset u64, item count u64)

use crate::codec::Compression;
use crate::coord::MAX_LEVELS;
use crate::error::BadFileKind;
use crate::io::Endian;
use crate::raster::{RasterFormat, SampleType};
use std::io;

pub const HEADER_LEN: u64 = 4096;
pub const INDEX_ENTRY_LEN: u64 = 20;
const MAGIC: &[u8; 8] = b"QRASTER\0";
const VERSION: u32 = 1;
const MAX_TILE_SIZE: u32 = 1 << 14;

/// What every tile of a dataset looks like and how it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetMeta {
    pub format: RasterFormat,
    pub compression: Compression,
    pub sample_type: SampleType,
    pub channels: u8,
    pub tile_size: u32,
    pub nodata: f64,
}

impl DatasetMeta {
    /// Single channel u16 elevation, deflated, 256 pixel tiles
    pub fn terrain() -> Self {
        Self {
            format: RasterFormat::Terrain,
            compression: Compression::Deflate,
            sample_type: SampleType::U16,
            channels: 1,
            tile_size: 256,
            nodata: 0.0,
        }
    }

    /// RGB u8 imagery, JPEG when the `image` feature is enabled
    pub fn color() -> Self {
        let compression = if cfg!(feature = "image") {
            Compression::Jpeg
        } else {
            Compression::Deflate
        };
        Self {
            format: RasterFormat::Color,
            compression,
            sample_type: SampleType::U8,
            channels: 3,
            tile_size: 256,
            nodata: 0.0,
        }
    }

    pub fn with_format(mut self, format: RasterFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_tile_size(mut self, pixels: u32) -> Self {
        self.tile_size = pixels;
        self
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn is_terrain(&self) -> bool {
        self.format == RasterFormat::Terrain
    }

    pub fn validate(&self) -> Result<(), BadFileKind> {
        if self.format == RasterFormat::Unknown {
            return Err(BadFileKind::UnknownFormat(self.format.into()));
        }
        if self.compression == Compression::Unknown {
            return Err(BadFileKind::UnknownCompression(self.compression.into()));
        }
        if self.sample_type == SampleType::Unknown {
            return Err(BadFileKind::UnknownSampleType(self.sample_type.into()));
        }
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(BadFileKind::BadChannels(self.channels));
        }
        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(BadFileKind::BadTileSize(self.tile_size));
        }
        if self.is_terrain() && self.channels != 1 {
            return Err(BadFileKind::BadChannels(self.channels));
        }
        if self.compression == Compression::Jpeg
            && (self.is_terrain() || self.sample_type != SampleType::U8)
        {
            return Err(BadFileKind::IncompatibleMeta(format!(
                "{:?} {:?} tiles cannot use {:?}",
                self.format, self.sample_type, self.compression
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelSpec {
    pub index_offset: u64,
    pub item_count: u64,
}

impl LevelSpec {
    pub fn index_len(&self) -> u64 {
        self.item_count.saturating_mul(INDEX_ENTRY_LEN)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub meta: DatasetMeta,
    pub payload: (u64, u64),
    pub user_meta: (u64, u64),
    pub levels: [LevelSpec; MAX_LEVELS as usize],
}

impl Header {
    pub fn new(meta: DatasetMeta) -> Self {
        Self {
            meta,
            payload: (HEADER_LEN, 0),
            user_meta: (HEADER_LEN, 0),
            levels: [LevelSpec::default(); MAX_LEVELS as usize],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let le = Endian::Little;
        let mut out = Vec::with_capacity(HEADER_LEN as usize);
        out.extend_from_slice(MAGIC);
        le.put(&mut out, VERSION);
        le.put(&mut out, u8::from(self.meta.format));
        le.put(&mut out, u8::from(self.meta.compression));
        le.put(&mut out, u8::from(self.meta.sample_type));
        le.put(&mut out, self.meta.channels);
        le.put(&mut out, self.meta.tile_size);
        le.put(&mut out, 0_u32);
        le.put(&mut out, self.meta.nodata);
        for v in [self.payload.0, self.payload.1, self.user_meta.0, self.user_meta.1] {
            le.put(&mut out, v);
        }
        for slot in self.levels.iter() {
            le.put(&mut out, slot.index_offset);
            le.put(&mut out, slot.item_count);
        }
        out.resize(HEADER_LEN as usize, 0);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BadFileKind> {
        if (bytes.len() as u64) < HEADER_LEN {
            return Err(BadFileKind::Truncated(bytes.len() as u64));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(BadFileKind::BadMagic);
        }
        let truncated = |_: io::Error| BadFileKind::Truncated(bytes.len() as u64);
        let le = Endian::Little;
        let stream = &mut &bytes[MAGIC.len()..];
        let version: u32 = le.read(stream).map_err(truncated)?;
        if version != VERSION {
            return Err(BadFileKind::UnsupportedVersion(version));
        }
        let format: u8 = le.read(stream).map_err(truncated)?;
        let compression: u8 = le.read(stream).map_err(truncated)?;
        let sample_type: u8 = le.read(stream).map_err(truncated)?;
        let channels: u8 = le.read(stream).map_err(truncated)?;
        let tile_size: u32 = le.read(stream).map_err(truncated)?;
        let _reserved: u32 = le.read(stream).map_err(truncated)?;
        let nodata: f64 = le.read(stream).map_err(truncated)?;

        let meta = DatasetMeta {
            format: RasterFormat::from(format),
            compression: Compression::from(compression),
            sample_type: SampleType::from(sample_type),
            channels,
            tile_size,
            nodata,
        };
        // report the raw tag rather than the fallback variant
        if meta.format == RasterFormat::Unknown {
            return Err(BadFileKind::UnknownFormat(format));
        }
        if meta.compression == Compression::Unknown {
            return Err(BadFileKind::UnknownCompression(compression));
        }
        if meta.sample_type == SampleType::Unknown {
            return Err(BadFileKind::UnknownSampleType(sample_type));
        }
        meta.validate()?;

        let mut regions = [0_u64; 4];
        for v in regions.iter_mut() {
            *v = le.read(stream).map_err(truncated)?;
        }
        let mut levels = [LevelSpec::default(); MAX_LEVELS as usize];
        for slot in levels.iter_mut() {
            slot.index_offset = le.read(stream).map_err(truncated)?;
            slot.item_count = le.read(stream).map_err(truncated)?;
        }
        Ok(Self {
            meta,
            payload: (regions[0], regions[1]),
            user_meta: (regions[2], regions[3]),
            levels,
        })
    }
}
