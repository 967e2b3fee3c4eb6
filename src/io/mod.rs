// I/O Traits
//   ReadRange and WriteRange are stateless byte-region collaborators
//   ReadRange is a superset of Read + Seek where self is immutable
//   Required methods
//     fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> { ... }
//     fn byte_len(&self) -> Result<u64> { ... }
//   Provided methods
//     fn read_range_exact(&self, start: u64, buf: &mut [u8]) -> Result<()> { ... }
//     fn read_range_to_vec(&self, start: u64, end: u64) -> Result<Vec<u8>> { ... }
//     fn view_range(&self, start: u64, n: usize) -> Result<Cow<[u8]>> { ... }

use std::borrow::Cow;
use std::fs::File;
use std::io::{Error, ErrorKind, Result};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

mod endian;
mod fs;

pub use endian::Endian;
pub use fs::PathReader;

pub trait ReadRange {
    /// Read bytes from a specific offset
    ///
    /// This is a superset of std::io::{Read + Seek} with a key difference that
    /// self is immutable, so one dataset handle can serve many readers.
    ///
    /// Required methods
    ///   fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize>;
    ///   fn byte_len(&self) -> Result<u64>;
    ///
    /// Provided methods
    ///   fn read_range_exact(&self, start: u64, buf: &mut [u8]) -> Result<()> { ... }
    ///   fn read_range_to_vec(&self, start: u64, end: u64) -> Result<Vec<u8>> { ... }
    ///   fn view_range(&self, start: u64, n: usize) -> Result<Cow<[u8]>> { ... }
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total length of the byte region
    fn byte_len(&self) -> Result<u64>;

    fn read_range_exact(&self, start: u64, buf: &mut [u8]) -> Result<()> {
        let n = buf.len();
        let mut filled = 0;
        while filled < n {
            let bytes_read = self.read_range(start + filled as u64, &mut buf[filled..])?;
            if bytes_read == 0 {
                break;
            }
            filled += bytes_read;
        }
        if filled == n {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::UnexpectedEof,
                format!("Failed to completely fill buffer: {filled} < {n}"),
            ))
        }
    }

    fn read_range_to_vec(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        if end < start {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Bad byte range: {start}..{end}"),
            ));
        }
        let n = (end - start) as usize;
        let mut buf = vec![0; n];
        self.read_range_exact(start, &mut buf)?;
        Ok(buf)
    }

    /// Bytes `start..start + n`, borrowed when the region is already in memory
    fn view_range(&self, start: u64, n: usize) -> Result<Cow<'_, [u8]>> {
        self.read_range_to_vec(start, start + n as u64).map(Cow::Owned)
    }
}

fn slice_range(bytes: &[u8], start: u64, n: usize) -> Result<&[u8]> {
    let start = usize::try_from(start).map_err(|e| Error::new(ErrorKind::InvalidInput, e))?;
    match start.checked_add(n) {
        Some(end) if end <= bytes.len() => Ok(&bytes[start..end]),
        _ => Err(Error::new(
            ErrorKind::UnexpectedEof,
            format!("Range {start}+{n} exceeds {} bytes", bytes.len()),
        )),
    }
}

impl ReadRange for [u8] {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        let start = (start as usize).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn byte_len(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }

    fn view_range(&self, start: u64, n: usize) -> Result<Cow<'_, [u8]>> {
        slice_range(self, start, n).map(Cow::Borrowed)
    }
}

impl ReadRange for Vec<u8> {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        self.as_slice().read_range(start, buf)
    }

    fn byte_len(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }

    fn view_range(&self, start: u64, n: usize) -> Result<Cow<'_, [u8]>> {
        slice_range(self, start, n).map(Cow::Borrowed)
    }
}

impl<T: ReadRange + ?Sized> ReadRange for &T {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_range(start, buf)
    }

    fn byte_len(&self) -> Result<u64> {
        (**self).byte_len()
    }

    fn view_range(&self, start: u64, n: usize) -> Result<Cow<'_, [u8]>> {
        (**self).view_range(start, n)
    }
}

impl<T: ReadRange + ?Sized> ReadRange for Arc<T> {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_range(start, buf)
    }

    fn byte_len(&self) -> Result<u64> {
        (**self).byte_len()
    }

    fn view_range(&self, start: u64, n: usize) -> Result<Cow<'_, [u8]>> {
        (**self).view_range(start, n)
    }
}

impl<R: Read + Seek> ReadRange for Mutex<R> {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        let mut locked_self = self
            .lock()
            .map_err(|e| std::io::Error::other(format!("{e:?}")))?;
        locked_self.seek(SeekFrom::Start(start))?;
        locked_self.read(buf)
    }

    fn byte_len(&self) -> Result<u64> {
        let mut locked_self = self
            .lock()
            .map_err(|e| std::io::Error::other(format!("{e:?}")))?;
        locked_self.seek(SeekFrom::End(0))
    }
}

impl ReadRange for File {
    #[cfg(unix)]
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        self.read_at(buf, start)
    }

    #[cfg(not(unix))]
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        let mut file: &File = self;
        file.seek(SeekFrom::Start(start))?;
        file.read(buf)
    }

    fn byte_len(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }
}

/// Write bytes at a specific offset, growing the region as needed
///
/// The dataset writer appends tile payloads and patches the header in place
/// once every level index is known.
pub trait WriteRange {
    fn write_range(&mut self, start: u64, bytes: &[u8]) -> Result<()>;
}

impl WriteRange for Vec<u8> {
    fn write_range(&mut self, start: u64, bytes: &[u8]) -> Result<()> {
        let start = usize::try_from(start).map_err(|e| Error::new(ErrorKind::InvalidInput, e))?;
        let end = start + bytes.len();
        if self.len() < end {
            self.resize(end, 0);
        }
        self[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl WriteRange for Cursor<Vec<u8>> {
    fn write_range(&mut self, start: u64, bytes: &[u8]) -> Result<()> {
        self.seek(SeekFrom::Start(start))?;
        self.write_all(bytes)
    }
}

impl WriteRange for File {
    fn write_range(&mut self, start: u64, bytes: &[u8]) -> Result<()> {
        self.seek(SeekFrom::Start(start))?;
        self.write_all(bytes)
    }
}

impl<W: WriteRange + ?Sized> WriteRange for &mut W {
    fn write_range(&mut self, start: u64, bytes: &[u8]) -> Result<()> {
        (**self).write_range(start, bytes)
    }
}
