use crate::codec::CodecError;
use crate::coord::BlockCoordinate;
use crate::error::{BadFileKind, PyramidError};
use crate::raster::RasterError;
use std::fmt;
use std::io;

pub type EncodeResult<T> = Result<T, EncodeError>;

#[derive(Debug)]
pub enum EncodeError {
    WriteError(io::Error),
    RasterizationError(RasterError),
    CompressionError(CodecError),
    InvalidMeta(BadFileKind),
    InvalidLevel(u32),
    /// Level still open when another was begun
    LevelOpen(u32),
    NoOpenLevel,
    LevelExists(u32),
    /// Open level, offending key
    LevelMismatch((u32, BlockCoordinate)),
    /// Previous key, offending key
    KeyOrder((BlockCoordinate, BlockCoordinate)),
    PayloadTooLarge(usize),
    SourceError(PyramidError),
    IncompatibleSources(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for EncodeError {}

impl From<io::Error> for EncodeError {
    fn from(e: io::Error) -> Self {
        EncodeError::WriteError(e)
    }
}

impl From<RasterError> for EncodeError {
    fn from(e: RasterError) -> Self {
        EncodeError::RasterizationError(e)
    }
}

impl From<CodecError> for EncodeError {
    fn from(e: CodecError) -> Self {
        EncodeError::CompressionError(e)
    }
}

impl From<PyramidError> for EncodeError {
    fn from(e: PyramidError) -> Self {
        EncodeError::SourceError(e)
    }
}
