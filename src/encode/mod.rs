use crate::codec::{ExternalCodec, TileCodec};
use crate::coord::{BlockCoordinate, MAX_LEVELS};
use crate::env::{DatasetMeta, LevelIndex, LevelSpec, Header, HEADER_LEN, INDEX_ENTRY_LEN};
use crate::io::WriteRange;
use crate::raster::Raster;
use std::sync::Arc;
use tracing::{debug, info};

pub mod error;
mod merge;
mod overview;

pub use error::{EncodeError, EncodeResult};
pub use merge::merge_datasets;
pub use overview::build_overviews;

/// Streams a dataset into a sink, one level at a time
///
/// Payloads are appended as tiles arrive; the indices, user metadata and
/// the final header are written by `finish`.
#[derive(Debug)]
pub struct DatasetWriter<W> {
    sink: W,
    meta: DatasetMeta,
    codec: TileCodec,
    user_meta: Vec<u8>,
    levels: Vec<Option<LevelIndex>>,
    open: Option<LevelIndex>,
    payload_len: u64,
}

impl<W: WriteRange> DatasetWriter<W> {
    pub fn new(mut sink: W, meta: DatasetMeta) -> EncodeResult<Self> {
        meta.validate().map_err(EncodeError::InvalidMeta)?;
        sink.write_range(0, &Header::new(meta.clone()).to_bytes())?;
        Ok(Self {
            sink,
            codec: TileCodec::from_meta(&meta),
            meta,
            user_meta: vec![],
            levels: vec![None; MAX_LEVELS as usize],
            open: None,
            payload_len: 0,
        })
    }

    /// Opaque bytes stored alongside the tiles
    pub fn with_user_meta(mut self, bytes: Vec<u8>) -> Self {
        self.user_meta = bytes;
        self
    }

    pub fn with_external_codec(mut self, codec: Arc<dyn ExternalCodec>) -> Self {
        self.codec = self.codec.with_external(codec);
        self
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn codec(&self) -> &TileCodec {
        &self.codec
    }

    pub fn has_level(&self, z: u32) -> bool {
        self.levels.get(z as usize).is_some_and(|l| l.is_some())
    }

    pub fn begin_level(&mut self, z: u32) -> EncodeResult<()> {
        if z >= MAX_LEVELS {
            return Err(EncodeError::InvalidLevel(z));
        }
        if let Some(open) = &self.open {
            return Err(EncodeError::LevelOpen(open.level()));
        }
        if self.has_level(z) {
            return Err(EncodeError::LevelExists(z));
        }
        self.open = Some(LevelIndex::new(z));
        Ok(())
    }

    pub fn write_tile(&mut self, key: BlockCoordinate, tile: &Raster) -> EncodeResult<()> {
        let bytes = self.codec.encode(tile)?;
        self.write_bytes(key, &bytes)
    }

    /// Appends an already encoded payload
    pub fn write_bytes(&mut self, key: BlockCoordinate, bytes: &[u8]) -> EncodeResult<()> {
        let open = self.open.as_mut().ok_or(EncodeError::NoOpenLevel)?;
        if key.z() != open.level() {
            return Err(EncodeError::LevelMismatch((open.level(), key)));
        }
        let length = u32::try_from(bytes.len()).map_err(|_| EncodeError::PayloadTooLarge(bytes.len()))?;
        open.check_next(key)
            .map_err(|previous| EncodeError::KeyOrder((previous, key)))?;
        self.sink.write_range(HEADER_LEN + self.payload_len, bytes)?;
        open.push(key, self.payload_len, length)
            .map_err(|previous| EncodeError::KeyOrder((previous, key)))?;
        self.payload_len += length as u64;
        Ok(())
    }

    pub fn end_level(&mut self) -> EncodeResult<()> {
        let index = self.open.take().ok_or(EncodeError::NoOpenLevel)?;
        debug!("level {}: {} tiles", index.level(), index.items_used());
        let z = index.level() as usize;
        self.levels[z] = Some(index);
        Ok(())
    }

    /// Writes metadata, indices and header, closing any open level
    pub fn finish(mut self) -> EncodeResult<W> {
        if self.open.is_some() {
            self.end_level()?;
        }
        let mut header = Header::new(self.meta.clone());
        header.payload = (HEADER_LEN, self.payload_len);

        let mut cursor = HEADER_LEN + self.payload_len;
        header.user_meta = (cursor, self.user_meta.len() as u64);
        self.sink.write_range(cursor, &self.user_meta)?;
        cursor += self.user_meta.len() as u64;

        let mut tiles = 0;
        for (z, index) in self.levels.iter().enumerate() {
            let Some(index) = index.as_ref().filter(|l| !l.is_empty()) else {
                continue;
            };
            let bytes = index.to_bytes();
            self.sink.write_range(cursor, &bytes)?;
            header.levels[z] = LevelSpec {
                index_offset: cursor,
                item_count: bytes.len() as u64 / INDEX_ENTRY_LEN,
            };
            cursor += bytes.len() as u64;
            tiles += index.items_used();
        }
        self.sink.write_range(0, &header.to_bytes())?;
        info!(
            "Wrote dataset: {tiles} tiles, {} payload bytes, {cursor} bytes total",
            self.payload_len
        );
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Compression;
    use crate::env::PagedEnvironment;
    use crate::raster::{RasterFormat, SampleType};

    fn meta() -> DatasetMeta {
        DatasetMeta::terrain()
            .with_tile_size(2)
            .with_compression(Compression::Raw)
    }

    fn key(z: u32, y: u32, x: u32) -> BlockCoordinate {
        BlockCoordinate::new(z, y, x).unwrap()
    }

    #[test]
    fn test_written_dataset_opens() {
        let mut writer = DatasetWriter::new(vec![], meta())
            .unwrap()
            .with_user_meta(b"{\"source\":\"test\"}".to_vec());
        writer.begin_level(1).unwrap();
        writer.write_bytes(key(1, 0, 1), &[1, 0, 2, 0, 3, 0, 4, 0]).unwrap();
        writer.end_level().unwrap();
        writer.begin_level(0).unwrap();
        let tile = Raster::filled((2, 2), 1, RasterFormat::Terrain, SampleType::U16, 9.0).unwrap();
        writer.write_tile(key(0, 0, 0), &tile).unwrap();
        let bytes = writer.finish().unwrap();

        let env = PagedEnvironment::open(bytes).unwrap();
        assert_eq!(env.existing_levels(), vec![0, 1]);
        assert_eq!(&*env.lookup(1, key(1, 0, 1)).unwrap().unwrap(), &[1, 0, 2, 0, 3, 0, 4, 0]);
        assert_eq!(&*env.lookup(0, key(0, 0, 0)).unwrap().unwrap(), &[9, 0, 9, 0, 9, 0, 9, 0]);
        assert_eq!(env.user_meta().unwrap(), b"{\"source\":\"test\"}");
    }

    #[test]
    fn test_keys_must_increase() {
        let mut writer = DatasetWriter::new(vec![], meta()).unwrap();
        writer.begin_level(3).unwrap();
        writer.write_bytes(key(3, 2, 2), &[0; 8]).unwrap();
        assert!(matches!(
            writer.write_bytes(key(3, 2, 1), &[0; 8]),
            Err(EncodeError::KeyOrder((prev, next))) if prev == key(3, 2, 2) && next == key(3, 2, 1)
        ));
        assert!(matches!(
            writer.write_bytes(key(4, 9, 9), &[0; 8]),
            Err(EncodeError::LevelMismatch((3, _)))
        ));
    }

    #[test]
    fn test_level_lifecycle() {
        let mut writer = DatasetWriter::new(vec![], meta()).unwrap();
        assert!(matches!(
            writer.write_bytes(key(0, 0, 0), &[]),
            Err(EncodeError::NoOpenLevel)
        ));
        assert!(matches!(writer.begin_level(30), Err(EncodeError::InvalidLevel(30))));
        writer.begin_level(2).unwrap();
        assert!(matches!(writer.begin_level(3), Err(EncodeError::LevelOpen(2))));
        writer.end_level().unwrap();
        assert!(matches!(writer.begin_level(2), Err(EncodeError::LevelExists(2))));

        // empty levels leave no trace, open levels are closed by finish
        writer.begin_level(5).unwrap();
        writer.write_bytes(key(5, 1, 1), &[0; 8]).unwrap();
        let env = PagedEnvironment::open(writer.finish().unwrap()).unwrap();
        assert_eq!(env.existing_levels(), vec![5]);
    }

    #[test]
    fn test_rejects_invalid_meta() {
        let meta = DatasetMeta::terrain().with_channels(3);
        assert!(matches!(
            DatasetWriter::new(vec![], meta),
            Err(EncodeError::InvalidMeta(_))
        ));
    }

    /// Fails every write after the first `budget`
    struct FlakySink {
        bytes: Vec<u8>,
        budget: usize,
    }

    impl WriteRange for FlakySink {
        fn write_range(&mut self, start: u64, bytes: &[u8]) -> std::io::Result<()> {
            if self.budget == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            self.budget -= 1;
            self.bytes.write_range(start, bytes)
        }
    }

    #[test]
    fn test_failed_write_leaves_index_untouched() {
        let sink = FlakySink { bytes: vec![], budget: 2 };
        let mut writer = DatasetWriter::new(sink, meta()).unwrap();
        writer.begin_level(1).unwrap();
        writer.write_bytes(key(1, 0, 0), &[1; 8]).unwrap();
        assert!(matches!(
            writer.write_bytes(key(1, 0, 1), &[2; 8]),
            Err(EncodeError::WriteError(_))
        ));

        // the same key can be retried once the sink recovers
        writer.sink.budget = usize::MAX;
        writer.write_bytes(key(1, 0, 1), &[2; 8]).unwrap();
        let env = PagedEnvironment::open(writer.finish().unwrap().bytes).unwrap();
        assert_eq!(env.items_used(1), 2);
        assert_eq!(&*env.lookup(1, key(1, 0, 0)).unwrap().unwrap(), &[1; 8]);
        assert_eq!(&*env.lookup(1, key(1, 0, 1)).unwrap().unwrap(), &[2; 8]);
    }
}
