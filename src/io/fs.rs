use super::ReadRange;
use std::fs::File;
use std::io::{Read, Result, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Opens the file on every read, so the handle holds no descriptor
#[derive(Clone, Debug)]
pub struct PathReader(PathBuf);

impl PathReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self(path.as_ref().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl ReadRange for PathReader {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> Result<usize> {
        let mut file = File::open(&self.0)?;
        file.seek(SeekFrom::Start(start))?;
        file.read(buf)
    }

    fn byte_len(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.0)?.len())
    }
}
