use crate::io::Endian;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt::Display;

/// Applies a generic expression to whichever sample vector a `RasterData` holds
macro_rules! map_samples {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            RasterData::U8($v) => RasterData::U8($body),
            RasterData::U16($v) => RasterData::U16($body),
            RasterData::F32($v) => RasterData::F32($body),
        }
    };
}

mod convert;
#[cfg(feature = "image")]
mod image;
mod ops;
mod sample;
mod warp;

pub use ops::MergeMode;
pub use sample::Sample;
pub use warp::{homography_from_points, invert_affine, invert_homography};

#[derive(Debug)]
pub enum RasterError {
    BufferSize((usize, (u32, u32), u8)),
    ShapeMismatch(((u32, u32, u8), (u32, u32, u8))),
    SampleTypeMismatch((SampleType, SampleType)),
    OddDimensions((u32, u32)),
    OutOfBounds(((u32, u32), (u32, u32))),
    SingularTransform(Vec<f64>),
    NotSupported(String),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum SampleType {
    U8 = 1,
    U16 = 2,
    F32 = 3,

    #[num_enum(default)]
    Unknown = 0,
}

impl SampleType {
    pub fn size(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
            SampleType::F32 => 4,
            SampleType::Unknown => 0,
        }
    }
}

/// What the samples of a dataset mean
///
/// Only terrain changes behaviour: terrain tiles are single channel
/// elevations and are never routed through the external image codec.
#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum RasterFormat {
    Color = 0,
    Grayscale = 1,
    Terrain = 2,

    #[num_enum(default)]
    Unknown = 255,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RasterData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl RasterData {
    pub fn filled(sample_type: SampleType, n: usize, value: f64) -> Option<Self> {
        match sample_type {
            SampleType::U8 => Some(RasterData::U8(vec![u8::from_f64(value); n])),
            SampleType::U16 => Some(RasterData::U16(vec![u16::from_f64(value); n])),
            SampleType::F32 => Some(RasterData::F32(vec![f32::from_f64(value); n])),
            SampleType::Unknown => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RasterData::U8(v) => v.len(),
            RasterData::U16(v) => v.len(),
            RasterData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            RasterData::U8(_) => SampleType::U8,
            RasterData::U16(_) => SampleType::U16,
            RasterData::F32(_) => SampleType::F32,
        }
    }

    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        match self {
            RasterData::U8(v) => v.clone(),
            RasterData::U16(v) => endian.encode_all(v),
            RasterData::F32(v) => endian.encode_all(v),
        }
    }

    pub fn from_bytes(sample_type: SampleType, bytes: &[u8], endian: Endian) -> Option<Self> {
        match sample_type {
            SampleType::U8 => Some(RasterData::U8(bytes.to_vec())),
            SampleType::U16 => endian.decode_all(bytes).map(RasterData::U16),
            SampleType::F32 => endian.decode_all(bytes).map(RasterData::F32),
            SampleType::Unknown => None,
        }
    }

    fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            RasterData::U8(v) => v.get(i).map(|s| *s as f64),
            RasterData::U16(v) => v.get(i).map(|s| *s as f64),
            RasterData::F32(v) => v.get(i).map(|s| *s as f64),
        }
    }
}

/// Owned pixel buffer, row-major with interleaved channels, row 0 is north
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    pub dimensions: (u32, u32),
    pub channels: u8,
    pub format: RasterFormat,
    pub data: RasterData,
}

impl Raster {
    pub fn new(
        dimensions: (u32, u32),
        channels: u8,
        format: RasterFormat,
        data: RasterData,
    ) -> Result<Self, RasterError> {
        check_channels(channels)?;
        let required = dimensions.0 as usize * dimensions.1 as usize * channels as usize;
        if data.len() != required {
            return Err(RasterError::BufferSize((data.len(), dimensions, channels)));
        }
        Ok(Self {
            dimensions,
            channels,
            format,
            data,
        })
    }

    /// Every sample set to `value`, saturated into the sample type
    pub fn filled(
        dimensions: (u32, u32),
        channels: u8,
        format: RasterFormat,
        sample_type: SampleType,
        value: f64,
    ) -> Result<Self, RasterError> {
        check_channels(channels)?;
        let n = dimensions.0 as usize * dimensions.1 as usize * channels as usize;
        let data = RasterData::filled(sample_type, n, value).ok_or_else(|| {
            RasterError::NotSupported(format!("Sample type {sample_type:?}"))
        })?;
        Self::new(dimensions, channels, format, data)
    }

    pub fn blank(
        dimensions: (u32, u32),
        channels: u8,
        format: RasterFormat,
        sample_type: SampleType,
    ) -> Result<Self, RasterError> {
        Self::filled(dimensions, channels, format, sample_type, 0.0)
    }

    pub fn from_bytes(
        dimensions: (u32, u32),
        channels: u8,
        format: RasterFormat,
        sample_type: SampleType,
        bytes: &[u8],
    ) -> Result<Self, RasterError> {
        let data = RasterData::from_bytes(sample_type, bytes, Endian::Little).ok_or(
            RasterError::BufferSize((bytes.len(), dimensions, channels)),
        )?;
        Self::new(dimensions, channels, format, data)
    }

    /// Little-endian sample bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.to_bytes(Endian::Little)
    }

    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    pub fn sample_type(&self) -> SampleType {
        self.data.sample_type()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() * self.sample_type().size()
    }

    pub fn shape(&self) -> (u32, u32, u8) {
        (self.dimensions.0, self.dimensions.1, self.channels)
    }

    pub fn get_sample(&self, x: u32, y: u32, c: u8) -> Option<f64> {
        if x >= self.dimensions.0 || y >= self.dimensions.1 || c >= self.channels {
            return None;
        }
        let i = (y as usize * self.dimensions.0 as usize + x as usize) * self.channels as usize
            + c as usize;
        self.data.get_f64(i)
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Vec<f64>> {
        (0..self.channels)
            .map(|c| self.get_sample(x, y, c))
            .collect()
    }

    /// Copies `src` into this raster with its top-left corner at `(x0, y0)`
    pub fn paste(&mut self, src: &Raster, x0: u32, y0: u32) -> Result<(), RasterError> {
        if src.channels != self.channels {
            return Err(RasterError::ShapeMismatch((src.shape(), self.shape())));
        }
        if x0 as u64 + src.width() as u64 > self.width() as u64
            || y0 as u64 + src.height() as u64 > self.height() as u64
        {
            return Err(RasterError::OutOfBounds(((x0, y0), src.dimensions)));
        }
        let c = self.channels as usize;
        let dst_row = self.width() as usize * c;
        let src_row = src.width() as usize * c;
        match (&mut self.data, &src.data) {
            (RasterData::U8(d), RasterData::U8(s)) => paste_rows(d, s, dst_row, src_row, x0, y0, c),
            (RasterData::U16(d), RasterData::U16(s)) => paste_rows(d, s, dst_row, src_row, x0, y0, c),
            (RasterData::F32(d), RasterData::F32(s)) => paste_rows(d, s, dst_row, src_row, x0, y0, c),
            (d, s) => {
                return Err(RasterError::SampleTypeMismatch((
                    s.sample_type(),
                    d.sample_type(),
                )))
            }
        }
        Ok(())
    }
}

fn paste_rows<T: Copy>(
    dst: &mut [T],
    src: &[T],
    dst_row: usize,
    src_row: usize,
    x0: u32,
    y0: u32,
    channels: usize,
) {
    if src_row == 0 {
        return;
    }
    for (j, row) in src.chunks_exact(src_row).enumerate() {
        let start = (y0 as usize + j) * dst_row + x0 as usize * channels;
        dst[start..start + src_row].copy_from_slice(row);
    }
}

pub(crate) fn check_channels(channels: u8) -> Result<u8, RasterError> {
    match channels {
        1 | 3 | 4 => Ok(channels),
        other => Err(RasterError::NotSupported(format!("{other} channels"))),
    }
}

impl Display for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Raster({}x{}, {} channels, {:?}, {:?}, {}Bytes)",
            self.dimensions.0,
            self.dimensions.1,
            self.channels,
            self.sample_type(),
            self.format,
            self.byte_len(),
        )
    }
}
