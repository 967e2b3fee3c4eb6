use super::CodecError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::io::{Read, Write};

/// Payload strategy recorded in the dataset header
#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum Compression {
    /// Little-endian sample bytes
    Raw = 0,
    /// zlib stream of the raw bytes
    Deflate = 1,
    /// Delegated to the external image codec, colour tiles only
    Jpeg = 2,

    #[num_enum(default)]
    Unknown = 255,
}

impl Compression {
    /// Lossless strategies handled without an external codec
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Raw | Self::Deflate)
    }

    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Raw => Ok(bytes.to_vec()),
            Self::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(bytes)?;
                Ok(encoder.finish()?)
            }
            other => Err(CodecError::CompressionNotSupported(*other)),
        }
    }

    /// Inverse of `compress`, producing exactly `expected` bytes
    pub fn decompress(&self, bytes: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Raw => {
                if bytes.len() != expected {
                    return Err(CodecError::LengthMismatch((bytes.len(), expected)));
                }
                Ok(bytes.to_vec())
            }
            Self::Deflate => {
                let mut buf = Vec::with_capacity(expected);
                ZlibDecoder::new(bytes)
                    .take(expected as u64 + 1)
                    .read_to_end(&mut buf)?;
                if buf.len() != expected {
                    return Err(CodecError::LengthMismatch((buf.len(), expected)));
                }
                Ok(buf)
            }
            other => Err(CodecError::CompressionNotSupported(*other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_round_trip() {
        let bytes: Vec<u8> = (0..4096).map(|i| (i / 16) as u8).collect();
        let packed = Compression::Deflate.compress(&bytes).unwrap();
        assert!(packed.len() < bytes.len());
        assert_eq!(Compression::Deflate.decompress(&packed, bytes.len()).unwrap(), bytes);
    }

    #[test]
    fn test_deflate_wrong_length() {
        let packed = Compression::Deflate.compress(&[7; 100]).unwrap();
        assert!(matches!(
            Compression::Deflate.decompress(&packed, 101),
            Err(CodecError::LengthMismatch((100, 101)))
        ));
        assert!(matches!(
            Compression::Deflate.decompress(&packed, 99),
            Err(CodecError::LengthMismatch((100, 99)))
        ));
    }

    #[test]
    fn test_deflate_garbage() {
        assert!(matches!(
            Compression::Deflate.decompress(&[1, 2, 3, 4], 16),
            Err(CodecError::IoError(_))
        ));
    }

    #[test]
    fn test_raw_length_checked() {
        assert!(Compression::Raw.decompress(&[0; 8], 8).is_ok());
        assert!(matches!(
            Compression::Raw.decompress(&[0; 7], 8),
            Err(CodecError::LengthMismatch((7, 8)))
        ));
    }

    #[test]
    fn test_tags() {
        assert_eq!(u8::from(Compression::Deflate), 1);
        assert_eq!(Compression::from(2), Compression::Jpeg);
        assert_eq!(Compression::from(9), Compression::Unknown);
    }
}
