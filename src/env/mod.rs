use crate::coord::{BlockCoordinate, Region, MAX_LEVELS};
use crate::error::{BadFileKind, PyramidError, PyramidResult};
use crate::io::ReadRange;
use std::borrow::Cow;
use std::fmt::Display;
use std::ops::Deref;
use tracing::{debug, info};

mod level;
mod meta;

pub use level::LevelIndex;
pub use meta::{DatasetMeta, HEADER_LEN};
pub(crate) use meta::{Header, LevelSpec, INDEX_ENTRY_LEN};

/// Stored payload of one tile, borrowed from the source when it can be
#[derive(Debug, Clone, PartialEq)]
pub struct TileBytes<'a> {
    key: BlockCoordinate,
    bytes: Cow<'a, [u8]>,
}

impl TileBytes<'_> {
    pub fn key(&self) -> BlockCoordinate {
        self.key
    }

    pub fn into_owned(self) -> Vec<u8> {
        self.bytes.into_owned()
    }
}

impl Deref for TileBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Opened dataset: header, per level indices and the byte source behind them
///
/// Everything is validated on open; afterwards lookups only read payloads.
#[derive(Debug)]
pub struct PagedEnvironment<R> {
    source: R,
    name: String,
    meta: DatasetMeta,
    payload: (u64, u64),
    user_meta: (u64, u64),
    levels: Vec<Option<LevelIndex>>,
}

impl<R: ReadRange> PagedEnvironment<R> {
    pub fn open(source: R) -> PyramidResult<Self> {
        Self::open_named(source, "<memory>")
    }

    pub fn open_named(source: R, name: impl Into<String>) -> PyramidResult<Self> {
        let name = name.into();
        let bad = |kind: BadFileKind| PyramidError::BadFile((name.clone(), kind));

        let file_len = source.byte_len()?;
        if file_len < HEADER_LEN {
            return Err(bad(BadFileKind::Truncated(file_len)));
        }
        let head = source.view_range(0, HEADER_LEN as usize)?;
        let header = Header::from_bytes(&head).map_err(bad)?;
        drop(head);

        let within = |(offset, len): (u64, u64)| {
            offset >= HEADER_LEN
                && offset
                    .checked_add(len)
                    .map(|end| end <= file_len)
                    .unwrap_or(false)
        };
        if !within(header.payload) {
            return Err(bad(BadFileKind::RegionOutOfBounds("payload")));
        }
        if !within(header.user_meta) {
            return Err(bad(BadFileKind::RegionOutOfBounds("user metadata")));
        }

        let mut levels = Vec::with_capacity(MAX_LEVELS as usize);
        for (z, slot) in header.levels.iter().enumerate() {
            let z = z as u32;
            if slot.item_count == 0 {
                levels.push(None);
                continue;
            }
            if !within((slot.index_offset, slot.index_len())) {
                return Err(bad(BadFileKind::IndexOutOfBounds(z)));
            }
            let bytes = source.view_range(slot.index_offset, slot.index_len() as usize)?;
            let index = LevelIndex::parse(z, &bytes, header.payload.1).map_err(bad)?;
            debug!("{name}: level {z} holds {} tiles", index.items_used());
            levels.push(Some(index));
        }

        let env = Self {
            source,
            name,
            meta: header.meta,
            payload: header.payload,
            user_meta: header.user_meta,
            levels,
        };
        info!(
            "Opened {} ({:?} {:?} {:?}, levels {:?})",
            env.name,
            env.meta.format,
            env.meta.sample_type,
            env.meta.compression,
            env.existing_levels()
        );
        Ok(env)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn level_index(&self, z: u32) -> Option<&LevelIndex> {
        self.levels.get(z as usize).and_then(|l| l.as_ref())
    }

    pub fn have_level(&self, z: u32) -> bool {
        self.level_index(z).is_some()
    }

    /// Sorted keys stored at level z, empty when the level is absent
    pub fn get_keys(&self, z: u32) -> &[BlockCoordinate] {
        self.level_index(z).map(|l| l.keys()).unwrap_or(&[])
    }

    pub fn items_used(&self, z: u32) -> usize {
        self.level_index(z).map(|l| l.items_used()).unwrap_or(0)
    }

    pub fn existing_levels(&self) -> Vec<u32> {
        (0..MAX_LEVELS).filter(|z| self.have_level(*z)).collect()
    }

    pub fn deepest_level(&self) -> Option<u32> {
        (0..MAX_LEVELS).rev().find(|z| self.have_level(*z))
    }

    /// Ok(None) when the level or the key is absent
    pub fn lookup(&self, z: u32, key: BlockCoordinate) -> PyramidResult<Option<TileBytes<'_>>> {
        if z >= MAX_LEVELS {
            return Err(PyramidError::InvalidLevel(z));
        }
        if key.z() != z {
            return Ok(None);
        }
        let Some(index) = self.level_index(z) else {
            return Ok(None);
        };
        match index.find(key) {
            Some(i) => self.value_at(index, i).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_value_from_idx(&self, z: u32, i: usize) -> PyramidResult<TileBytes<'_>> {
        if z >= MAX_LEVELS {
            return Err(PyramidError::InvalidLevel(z));
        }
        let index = self
            .level_index(z)
            .ok_or(PyramidError::IndexOutOfRange((i, 0)))?;
        if i >= index.items_used() {
            return Err(PyramidError::IndexOutOfRange((i, index.items_used())));
        }
        self.value_at(index, i)
    }

    fn value_at(&self, index: &LevelIndex, i: usize) -> PyramidResult<TileBytes<'_>> {
        let (key, offset, length) = index
            .entry(i)
            .ok_or(PyramidError::IndexOutOfRange((i, index.items_used())))?;
        let bytes = self
            .source
            .view_range(self.payload.0 + offset, length as usize)?;
        Ok(TileBytes { key, bytes })
    }

    pub fn compute_regions_on_deepest_level(&self) -> Vec<Region<u32>> {
        self.deepest_level()
            .and_then(|z| self.level_index(z))
            .map(|index| index.regions())
            .unwrap_or_default()
    }

    /// Opaque bytes the writer attached, empty when none
    pub fn user_meta(&self) -> PyramidResult<Vec<u8>> {
        let (offset, len) = self.user_meta;
        if len == 0 {
            return Ok(vec![]);
        }
        Ok(self.source.read_range_to_vec(offset, offset + len)?)
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R> Display for PagedEnvironment<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.levels.iter().flatten().count();
        writeln!(f, "PagedEnvironment({}, {n} Levels)", self.name)?;
        writeln!(
            f,
            "  {:?} {:?} x{} {:?}, {}px tiles, nodata {}",
            self.meta.format,
            self.meta.sample_type,
            self.meta.channels,
            self.meta.compression,
            self.meta.tile_size,
            self.meta.nodata
        )?;
        for index in self.levels.iter().flatten() {
            let region = index
                .bounding_region()
                .map(|r| r.to_string())
                .unwrap_or_default();
            writeln!(
                f,
                "  Level({}, {} tiles, {region})",
                index.level(),
                index.items_used()
            )?;
        }
        Ok(())
    }
}
