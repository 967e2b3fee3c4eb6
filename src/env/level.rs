use super::meta::INDEX_ENTRY_LEN;
use crate::coord::{BlockCoordinate, Region};
use crate::error::BadFileKind;
use crate::io::Endian;

/// Sorted key -> (offset, length) table of one level
///
/// Offsets are relative to the payload start. Keys are strictly increasing,
/// so lookups are a binary search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelIndex {
    level: u32,
    keys: Vec<BlockCoordinate>,
    offsets: Vec<u64>,
    lengths: Vec<u32>,
}

impl LevelIndex {
    pub fn new(level: u32) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Appends an entry, returning the previous key when order would break
    pub fn push(
        &mut self,
        key: BlockCoordinate,
        offset: u64,
        length: u32,
    ) -> Result<(), BlockCoordinate> {
        self.check_next(key)?;
        self.keys.push(key);
        self.offsets.push(offset);
        self.lengths.push(length);
        Ok(())
    }

    /// Fails with the last stored key unless `key` sorts after it
    pub fn check_next(&self, key: BlockCoordinate) -> Result<(), BlockCoordinate> {
        match self.keys.last() {
            Some(last) if *last >= key => Err(*last),
            _ => Ok(()),
        }
    }

    pub fn parse(level: u32, bytes: &[u8], payload_len: u64) -> Result<Self, BadFileKind> {
        if bytes.len() as u64 % INDEX_ENTRY_LEN != 0 {
            return Err(BadFileKind::IndexOutOfBounds(level));
        }
        let le = Endian::Little;
        let n = bytes.len() / INDEX_ENTRY_LEN as usize;
        let mut index = Self::new(level);
        index.keys.reserve(n);
        let stream = &mut &bytes[..];
        for i in 0..n {
            let truncated = |_| BadFileKind::IndexOutOfBounds(level);
            let raw: u64 = le.read(stream).map_err(truncated)?;
            let offset: u64 = le.read(stream).map_err(truncated)?;
            let length: u32 = le.read(stream).map_err(truncated)?;

            let key = match BlockCoordinate::from_raw(raw) {
                Some(key) if key.z() == level => key,
                _ => return Err(BadFileKind::KeyLevelMismatch((level, raw))),
            };
            if offset.saturating_add(length as u64) > payload_len {
                return Err(BadFileKind::ValueOutOfBounds((level, i)));
            }
            index
                .push(key, offset, length)
                .map_err(|_| BadFileKind::KeysNotIncreasing((level, i)))?;
        }
        Ok(index)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let le = Endian::Little;
        let mut out = Vec::with_capacity(self.keys.len() * INDEX_ENTRY_LEN as usize);
        for i in 0..self.keys.len() {
            le.put(&mut out, self.keys[i].raw());
            le.put(&mut out, self.offsets[i]);
            le.put(&mut out, self.lengths[i]);
        }
        out
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn keys(&self) -> &[BlockCoordinate] {
        &self.keys
    }

    pub fn items_used(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn find(&self, key: BlockCoordinate) -> Option<usize> {
        self.keys.binary_search(&key).ok()
    }

    /// (key, payload offset, length) of the i-th entry
    pub fn entry(&self, i: usize) -> Option<(BlockCoordinate, u64, u32)> {
        Some((*self.keys.get(i)?, self.offsets[i], self.lengths[i]))
    }

    /// Smallest half-open grid region holding every key
    pub fn bounding_region(&self) -> Option<Region<u32>> {
        let first = self.keys.first()?;
        let mut region = Region::new(first.x(), first.y(), first.x() + 1, first.y() + 1);
        for key in self.keys.iter().skip(1) {
            region.x.min = region.x.min.min(key.x());
            region.x.max = region.x.max.max(key.x() + 1);
            region.y.max = region.y.max.max(key.y() + 1);
        }
        Some(region)
    }

    /// Disjoint rectangles covering exactly the present keys
    ///
    /// Runs of consecutive columns are found per row, then stacked onto the
    /// rectangle directly below when the column extents agree.
    pub fn regions(&self) -> Vec<Region<u32>> {
        let mut runs: Vec<(u32, u32, u32)> = vec![];
        for key in self.keys.iter() {
            match runs.last_mut() {
                Some((y, _, x_end)) if *y == key.y() && *x_end == key.x() => *x_end += 1,
                _ => runs.push((key.y(), key.x(), key.x() + 1)),
            }
        }

        let mut closed: Vec<Region<u32>> = vec![];
        let mut open: Vec<Region<u32>> = vec![];
        let mut row = None;
        for (y, x_start, x_end) in runs {
            if row != Some(y) {
                let (growing, done): (Vec<_>, Vec<_>) =
                    open.into_iter().partition(|r| r.y.max == y);
                closed.extend(done);
                open = growing;
                row = Some(y);
            }
            let below = open
                .iter_mut()
                .find(|r| r.y.max == y && r.x.min == x_start && r.x.max == x_end);
            match below {
                Some(region) => region.y.max = y + 1,
                None => open.push(Region::new(x_start, y, x_end, y + 1)),
            }
        }
        closed.extend(open);
        closed.sort_by_key(|r| (r.y.min, r.x.min));
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(level: u32, tiles: &[(u32, u32)]) -> LevelIndex {
        let mut keys: Vec<_> = tiles
            .iter()
            .map(|(y, x)| BlockCoordinate::new(level, *y, *x).unwrap())
            .collect();
        keys.sort();
        let mut index = LevelIndex::new(level);
        for (i, key) in keys.into_iter().enumerate() {
            index.push(key, i as u64 * 10, 10).unwrap();
        }
        index
    }

    #[test]
    fn test_push_keeps_order() {
        let mut index = LevelIndex::new(3);
        let a = BlockCoordinate::new(3, 0, 1).unwrap();
        let b = BlockCoordinate::new(3, 0, 2).unwrap();
        index.push(b, 0, 1).unwrap();
        assert_eq!(index.push(a, 1, 1), Err(b));
        assert_eq!(index.push(b, 1, 1), Err(b));
        assert_eq!(index.items_used(), 1);
    }

    #[test]
    fn test_parse_round_trip_and_find() {
        let index = index(5, &[(3, 3), (3, 4), (7, 1)]);
        let parsed = LevelIndex::parse(5, &index.to_bytes(), 30).unwrap();
        assert_eq!(parsed, index);
        let key = BlockCoordinate::new(5, 3, 4).unwrap();
        assert_eq!(parsed.find(key), Some(1));
        assert_eq!(parsed.entry(1), Some((key, 10, 10)));
        assert_eq!(parsed.find(BlockCoordinate::new(5, 3, 5).unwrap()), None);
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        let index = index(5, &[(3, 3), (3, 4)]);
        let bytes = index.to_bytes();
        assert_eq!(
            LevelIndex::parse(5, &bytes, 19),
            Err(BadFileKind::ValueOutOfBounds((5, 1)))
        );
        assert!(matches!(
            LevelIndex::parse(6, &bytes, 100),
            Err(BadFileKind::KeyLevelMismatch((6, _)))
        ));
        let mut swapped = bytes[20..].to_vec();
        swapped.extend_from_slice(&bytes[..20]);
        assert_eq!(
            LevelIndex::parse(5, &swapped, 100),
            Err(BadFileKind::KeysNotIncreasing((5, 1)))
        );
        assert_eq!(
            LevelIndex::parse(5, &bytes[..25], 100),
            Err(BadFileKind::IndexOutOfBounds(5))
        );
    }

    #[test]
    fn test_bounding_region() {
        let index = index(4, &[(2, 5), (3, 1), (6, 3)]);
        assert_eq!(index.bounding_region(), Some(Region::new(1, 2, 6, 7)));
        assert_eq!(LevelIndex::new(4).bounding_region(), None);
    }

    #[test]
    fn test_regions_cover_exactly() {
        // two stacked 2x2 blocks, a lone tile, and an L that must split
        let tiles = [
            (0, 0), (0, 1), (1, 0), (1, 1),
            (0, 5),
            (4, 2), (4, 3), (5, 2),
        ];
        let index = index(6, &tiles);
        let regions = index.regions();
        assert_eq!(
            regions,
            vec![
                Region::new(0, 0, 2, 2),
                Region::new(5, 0, 6, 1),
                Region::new(2, 4, 4, 5),
                Region::new(2, 5, 3, 6),
            ]
        );
        let covered: u64 = regions.iter().map(|r| r.tile_count()).sum();
        assert_eq!(covered, tiles.len() as u64);
    }
}
