use eio::{FromBytes, ReadExt, ToBytes};
use std::io::{Read, Result};
use std::mem;

/// Byte order of on-disk fields and sample buffers
///
/// Datasets are always written little-endian; Big exists for sample buffers
/// handed over by callers in network order.
#[derive(PartialEq, Clone, Copy, Debug, Default)]
pub enum Endian {
    Big,
    #[default]
    Little,
}

impl Endian {
    pub fn read<const N: usize, T: FromBytes<N>>(&self, stream: &mut impl Read) -> Result<T> {
        let mut buf = [0u8; N];
        stream.read_exact(&mut buf)?;
        self.decode(buf)
    }

    pub fn decode<const N: usize, T: FromBytes<N>>(&self, bytes: [u8; N]) -> Result<T> {
        match self {
            Endian::Big => bytes.as_slice().read_be(),
            Endian::Little => bytes.as_slice().read_le(),
        }
    }

    /// None when the byte count is not a whole number of samples
    pub fn decode_all<const N: usize, T: FromBytes<N>>(&self, bytes: &[u8]) -> Option<Vec<T>> {
        if bytes.len() % mem::size_of::<T>() != 0 {
            return None;
        }
        bytes
            .chunks_exact(mem::size_of::<T>())
            .map(|chunk| {
                chunk
                    .try_into()
                    .ok()
                    .and_then(|arr| self.decode::<N, T>(arr).ok())
            })
            .collect()
    }

    pub fn encode<const N: usize, T: ToBytes<N>>(&self, value: T) -> [u8; N] {
        match self {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        }
    }

    pub fn encode_all<const N: usize, T: ToBytes<N> + Copy>(&self, values: &[T]) -> Vec<u8> {
        values.iter().flat_map(|v| self.encode(*v)).collect()
    }

    pub fn put<const N: usize, T: ToBytes<N>>(&self, out: &mut Vec<u8>, value: T) {
        out.extend_from_slice(&self.encode(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields() {
        let mut out = vec![];
        Endian::Little.put(&mut out, 0x0102_u16);
        Endian::Little.put(&mut out, 1.5_f64);
        assert_eq!(&out[..2], &[2, 1]);
        let mut stream = out.as_slice();
        let a: u16 = Endian::Little.read(&mut stream).unwrap();
        let b: f64 = Endian::Little.read(&mut stream).unwrap();
        assert_eq!((a, b), (0x0102, 1.5));
    }

    #[test]
    fn test_samples() {
        let values = [1u16, 300, 65535];
        let bytes = Endian::Big.encode_all(&values);
        assert_eq!(&bytes[..2], &[0, 1]);
        let back: Vec<u16> = Endian::Big.decode_all(&bytes).unwrap();
        assert_eq!(back, values);
        assert!(Endian::Little.decode_all::<2, u16>(&bytes[..3]).is_none());
    }
}
