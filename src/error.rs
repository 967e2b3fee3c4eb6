use crate::codec::CodecError;
use crate::coord::BlockCoordinate;
use crate::raster::RasterError;
use std::fmt;
use std::io;
use std::sync::PoisonError;

pub type PyramidResult<T> = Result<T, PyramidError>;

#[derive(Debug)]
pub enum PyramidError {
    /// Requested resolution in meters per tile, deepest present level
    NoValidLevel((f64, Option<u32>)),
    InvalidLevel(u32),
    /// Window size in tiles
    SampleTooLarge((u32, u32)),
    BadFile((String, BadFileKind)),
    DecodeError((BlockCoordinate, CodecError)),
    RasterizationError(RasterError),
    ReadError(io::Error),
    IndexOutOfRange((usize, usize)),
    MutexError(String),
    NotSupported(String),
}

/// Structural problems found while opening a dataset
#[derive(Debug, Clone, PartialEq)]
pub enum BadFileKind {
    Truncated(u64),
    BadMagic,
    UnsupportedVersion(u32),
    UnknownFormat(u8),
    UnknownCompression(u8),
    UnknownSampleType(u8),
    BadChannels(u8),
    BadTileSize(u32),
    IncompatibleMeta(String),
    RegionOutOfBounds(&'static str),
    IndexOutOfBounds(u32),
    KeyLevelMismatch((u32, u64)),
    KeysNotIncreasing((u32, usize)),
    ValueOutOfBounds((u32, usize)),
}

impl fmt::Display for PyramidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for PyramidError {}

impl From<io::Error> for PyramidError {
    fn from(e: io::Error) -> Self {
        PyramidError::ReadError(e)
    }
}

impl From<RasterError> for PyramidError {
    fn from(e: RasterError) -> Self {
        PyramidError::RasterizationError(e)
    }
}

impl<G> From<PoisonError<G>> for PyramidError {
    fn from(e: PoisonError<G>) -> Self {
        PyramidError::MutexError(format!("{e:?}"))
    }
}
