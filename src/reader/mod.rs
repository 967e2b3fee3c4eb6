use crate::cache::TileCache;
use crate::codec::TileCodec;
use crate::coord::{cell_size, dwm_to_iwm, iwm_to_dwm, BlockCoordinate, Region, MAX_LEVELS};
use crate::env::{DatasetMeta, PagedEnvironment};
use crate::error::{PyramidError, PyramidResult};
use crate::io::ReadRange;
use crate::raster::{check_channels, homography_from_points, Raster, RasterError, RasterFormat};
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

mod config;

pub use config::{ReaderConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_RASTER_IO_TILES};

// Relative slack when comparing level resolutions
const RESOLUTION_TOLERANCE: f64 = 1e-9;

type CacheKey = (BlockCoordinate, u8);

/// Query facade over an opened dataset
///
/// Tiles are decoded on demand and kept in a shared LRU cache keyed by tile
/// and requested channel count. All queries take `&self`.
#[derive(Debug)]
pub struct RasterReader<R> {
    env: PagedEnvironment<R>,
    codec: TileCodec,
    config: ReaderConfig,
    cache: Mutex<TileCache<CacheKey, Arc<Raster>>>,
}

impl<R: ReadRange> RasterReader<R> {
    pub fn open(source: R) -> PyramidResult<Self> {
        Self::open_with_config(source, ReaderConfig::default())
    }

    pub fn open_with_config(source: R, config: ReaderConfig) -> PyramidResult<Self> {
        Ok(Self::from_env(PagedEnvironment::open(source)?, config))
    }

    pub fn from_env(env: PagedEnvironment<R>, config: ReaderConfig) -> Self {
        let mut codec = TileCodec::from_meta(env.meta());
        if let Some(external) = config.external_codec.clone() {
            codec = codec.with_external(external);
        }
        let cache = Mutex::new(TileCache::new(config.cache_capacity));
        Self {
            env,
            codec,
            config,
            cache,
        }
    }

    pub fn env(&self) -> &PagedEnvironment<R> {
        &self.env
    }

    pub fn meta(&self) -> &DatasetMeta {
        self.env.meta()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn is_terrain(&self) -> bool {
        self.meta().is_terrain()
    }

    pub fn user_meta(&self) -> PyramidResult<Vec<u8>> {
        self.env.user_meta()
    }

    pub fn existing_levels(&self) -> Vec<u32> {
        self.env.existing_levels()
    }

    pub fn deepest_level(&self) -> Option<u32> {
        self.env.deepest_level()
    }

    /// Number of tiles stored at level z
    pub fn level_size(&self, z: u32) -> PyramidResult<usize> {
        check_level(z)?;
        Ok(self.env.items_used(z))
    }

    /// Deepest level and the grid rectangle bounding everything stored on it
    pub fn determine_extent(&self) -> PyramidResult<(u32, Region<u32>)> {
        let z = self
            .env
            .deepest_level()
            .ok_or(PyramidError::NoValidLevel((0.0, None)))?;
        let region = self
            .env
            .compute_regions_on_deepest_level()
            .into_iter()
            .reduce(|a, b| a.union(&b))
            .ok_or(PyramidError::NoValidLevel((0.0, Some(z))))?;
        Ok((z, region))
    }

    pub fn determine_extent_on_level(&self, z: u32) -> PyramidResult<Option<Region<u32>>> {
        check_level(z)?;
        Ok(self.env.level_index(z).and_then(|l| l.bounding_region()))
    }

    pub fn regions_on_deepest_level(&self) -> Vec<Region<u32>> {
        self.env.compute_regions_on_deepest_level()
    }

    pub fn world_regions_on_deepest_level(&self) -> PyramidResult<Vec<Region<f64>>> {
        let Some(z) = self.env.deepest_level() else {
            return Ok(vec![]);
        };
        self.regions_on_deepest_level()
            .iter()
            .map(|r| iwm_to_dwm(r, z))
            .collect()
    }

    pub fn tile_exists(&self, key: BlockCoordinate) -> bool {
        self.env
            .level_index(key.z())
            .and_then(|l| l.find(key))
            .is_some()
    }

    /// Decoded tile, `Ok(None)` when nothing is stored under the key
    pub fn get_tile(&self, key: BlockCoordinate, channels: u8) -> PyramidResult<Option<Arc<Raster>>> {
        check_channels(channels)?;
        let cache_key = (key, channels);
        if let Some(tile) = self.cache.lock()?.get(&cache_key) {
            return Ok(Some(tile));
        }
        let Some(bytes) = self.env.lookup(key.z(), key)? else {
            return Ok(None);
        };
        trace!("cache miss {key}, decoding {} bytes", bytes.len());
        let tile = self
            .codec
            .decode(&bytes)
            .map_err(|e| PyramidError::DecodeError((key, e)))?;
        let tile = Arc::new(tile.to_channels(channels)?);
        self.cache.lock()?.set(cache_key, tile.clone());
        Ok(Some(tile))
    }

    /// Tiles of `region` at level z assembled north up, gaps filled with nodata
    ///
    /// A region with min == max on an axis covers that single row or column.
    pub fn get_window(&self, z: u32, region: &Region<u32>, channels: u8) -> PyramidResult<Raster> {
        check_level(z)?;
        check_channels(channels)?;
        let region = region.normalized_grid();
        let t = self.meta().tile_size;
        let (cols, rows) = (region.width(), region.height());
        let dims = (
            cols.checked_mul(t).ok_or(PyramidError::SampleTooLarge((cols, rows)))?,
            rows.checked_mul(t).ok_or(PyramidError::SampleTooLarge((cols, rows)))?,
        );
        let mut window = Raster::filled(
            dims,
            channels,
            self.output_format(channels),
            self.meta().sample_type,
            self.meta().nodata,
        )?;

        // keys sort by row then column, so each row of the region is one slice
        let keys = self.env.get_keys(z);
        let n = 1_u32 << z;
        let (x0, x1) = (region.x.min.min(n), region.x.max.min(n));
        let mut found = 0;
        for y in region.y.min..region.y.max.min(n) {
            let lo = keys.partition_point(|k| k.raw() < BlockCoordinate::search_bound(z, y, x0));
            let hi = keys.partition_point(|k| k.raw() < BlockCoordinate::search_bound(z, y, x1));
            for key in &keys[lo..hi] {
                let Some(tile) = self.get_tile(*key, channels)? else {
                    continue;
                };
                let px = (key.x() - region.x.min) * t;
                let py = (rows - 1 - (y - region.y.min)) * t;
                window.paste(&tile, px, py)?;
                found += 1;
            }
        }
        debug!(
            "window {region} at level {z}: {found}/{} tiles present",
            region.tile_count()
        );
        Ok(window)
    }

    /// Coarsest present level at least as fine as the requested output
    pub fn select_level(&self, world: &Region<f64>, dimensions: (u32, u32)) -> PyramidResult<u32> {
        let world = world.normalized();
        let (w, h) = dimensions;
        let t = self.meta().tile_size as f64;
        let res = (world.x.range() * t / w as f64).min(world.y.range() * t / h as f64);
        self.level_for_resolution(res)
    }

    fn level_for_resolution(&self, res: f64) -> PyramidResult<u32> {
        let deepest = self.env.deepest_level();
        let levels = self.env.existing_levels();
        let chosen = levels
            .iter()
            .copied()
            .find(|z| cell_size(*z) <= res * (1.0 + RESOLUTION_TOLERANCE));
        match (chosen, deepest) {
            (Some(z), _) => {
                debug!("resolution {res:.3} m/tile -> level {z}");
                Ok(z)
            }
            (None, Some(z)) if self.config.allow_upsampling && res > 0.0 => {
                debug!("resolution {res:.3} m/tile finer than data, upsampling level {z}");
                Ok(z)
            }
            (None, deepest) => Err(PyramidError::NoValidLevel((res, deepest))),
        }
    }

    /// Grid window covering `world` at level z, bounded by the tile budget
    fn covering_window(&self, world: &Region<f64>, z: u32, channels: u8) -> PyramidResult<(Raster, Region<f64>)> {
        let grid = dwm_to_iwm(world, z)?;
        if grid.tile_count() > self.config.max_raster_io_tiles {
            return Err(PyramidError::SampleTooLarge((grid.width(), grid.height())));
        }
        let window = self.get_window(z, &grid, channels)?;
        Ok((window, iwm_to_dwm(&grid, z)?))
    }

    /// Mercator rectangle resampled north up into `width` x `height` pixels
    pub fn raster_io(
        &self,
        world: &Region<f64>,
        width: u32,
        height: u32,
        channels: u8,
    ) -> PyramidResult<Raster> {
        check_channels(channels)?;
        if width == 0 || height == 0 {
            return Err(PyramidError::NotSupported(format!(
                "Empty output {width}x{height}"
            )));
        }
        let world = world.normalized();
        let z = self.select_level(&world, (width, height))?;
        let (window, sampled) = self.covering_window(&world, z, channels)?;

        // output pixel (i, j) -> window pixel (a i + c, d j + f)
        let p = cell_size(z) / self.meta().tile_size as f64;
        let a = world.x.range() / (width as f64 * p);
        let c = (world.x.min - sampled.x.min) / p;
        let d = world.y.range() / (height as f64 * p);
        let f = window.height() as f64 - (world.y.max - sampled.y.min) / p;
        let forward = [1.0 / a, 0.0, -c / a, 0.0, 1.0 / d, -f / d];
        debug!(
            "raster_io {} at level {z}: {}x{} window -> {width}x{height}",
            world,
            window.width(),
            window.height()
        );
        Ok(window.warp_affine(&forward, (width, height))?)
    }

    /// `raster_io` into a caller buffer, whose shape defines the query
    ///
    /// The buffer is only replaced once the whole query succeeded.
    pub fn raster_io_into(&self, out: &mut Raster, world: &Region<f64>) -> PyramidResult<()> {
        let result = self.raster_io(world, out.width(), out.height(), out.channels)?;
        if result.sample_type() != out.sample_type() {
            return Err(RasterError::SampleTypeMismatch((result.sample_type(), out.sample_type())).into());
        }
        *out = result;
        Ok(())
    }

    /// Arbitrarily oriented output frame
    ///
    /// `corners` are the mercator positions of the output's top-left,
    /// top-right, bottom-right and bottom-left corners.
    pub fn raster_io_oriented(
        &self,
        corners: &[(f64, f64); 4],
        width: u32,
        height: u32,
        channels: u8,
    ) -> PyramidResult<Raster> {
        check_channels(channels)?;
        if width == 0 || height == 0 {
            return Err(PyramidError::NotSupported(format!(
                "Empty output {width}x{height}"
            )));
        }
        let span = |a: (f64, f64), b: (f64, f64)| (b.0 - a.0).hypot(b.1 - a.1);
        let t = self.meta().tile_size as f64;
        let res = (span(corners[0], corners[1]) * t / width as f64)
            .min(span(corners[0], corners[3]) * t / height as f64);
        let z = self.level_for_resolution(res)?;

        let (xs, ys): (Vec<f64>, Vec<f64>) = corners.iter().copied().unzip();
        let fold = |v: &[f64], f: fn(f64, f64) -> f64, init: f64| v.iter().copied().fold(init, f);
        let bounds = Region::new(
            fold(&xs, f64::min, f64::INFINITY),
            fold(&ys, f64::min, f64::INFINITY),
            fold(&xs, f64::max, f64::NEG_INFINITY),
            fold(&ys, f64::max, f64::NEG_INFINITY),
        );
        let (window, sampled) = self.covering_window(&bounds, z, channels)?;

        let p = cell_size(z) / t;
        let h = window.height() as f64;
        let to_pixel = |(x, y): (f64, f64)| ((x - sampled.x.min) / p, h - (y - sampled.y.min) / p);
        let src = corners.map(to_pixel);
        let (w, hh) = (width as f64, height as f64);
        let dst = [(0.0, 0.0), (w, 0.0), (w, hh), (0.0, hh)];
        let homography = homography_from_points(&src, &dst).ok_or_else(|| {
            RasterError::SingularTransform(corners.iter().flat_map(|(x, y)| [*x, *y]).collect())
        })?;
        debug!("oriented raster_io at level {z}: {bounds}");
        Ok(window.warp_perspective(&homography, (width, height))?)
    }

    fn output_format(&self, channels: u8) -> RasterFormat {
        match (self.meta().format, channels) {
            (RasterFormat::Color, 1) => RasterFormat::Grayscale,
            (RasterFormat::Grayscale, 3 | 4) => RasterFormat::Color,
            (format, _) => format,
        }
    }

    pub fn cached_tiles(&self) -> PyramidResult<usize> {
        Ok(self.cache.lock()?.len())
    }
}

fn check_level(z: u32) -> PyramidResult<u32> {
    if z < MAX_LEVELS {
        Ok(z)
    } else {
        Err(PyramidError::InvalidLevel(z))
    }
}

impl<R> Display for RasterReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Compression;
    use crate::encode::DatasetWriter;
    use crate::raster::{RasterData, SampleType};

    fn tile(v: u16) -> Raster {
        Raster::filled((4, 4), 1, RasterFormat::Terrain, SampleType::U16, v as f64).unwrap()
    }

    fn dataset(levels: &[(u32, &[(u32, u32, u16)])]) -> Vec<u8> {
        let meta = DatasetMeta::terrain()
            .with_tile_size(4)
            .with_compression(Compression::Raw)
            .with_nodata(7.0);
        let mut writer = DatasetWriter::new(vec![], meta).unwrap();
        for (z, tiles) in levels {
            writer.begin_level(*z).unwrap();
            for (y, x, v) in tiles.iter() {
                let key = BlockCoordinate::new(*z, *y, *x).unwrap();
                writer.write_tile(key, &tile(*v)).unwrap();
            }
            writer.end_level().unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_window_is_north_up() {
        let reader = RasterReader::open(dataset(&[(3, &[(0, 0, 10), (1, 0, 20)])])).unwrap();
        let window = reader.get_window(3, &Region::new(0, 0, 1, 2), 1).unwrap();
        assert_eq!(window.dimensions, (4, 8));
        // grid row 1 lies north of row 0
        assert_eq!(window.get_sample(0, 0, 0), Some(20.0));
        assert_eq!(window.get_sample(0, 7, 0), Some(10.0));
    }

    #[test]
    fn test_window_past_grid_edge_is_nodata() {
        let reader = RasterReader::open(dataset(&[(1, &[(1, 0, 10)])])).unwrap();
        let beyond = 1 << 29;
        let window = reader.get_window(1, &Region::new(beyond, 0, beyond + 1, 1), 1).unwrap();
        assert_eq!(window.dimensions, (4, 4));
        assert!(window.is_all_nodata(7.0));
    }

    #[test]
    fn test_window_fills_gaps_with_nodata() {
        let reader = RasterReader::open(dataset(&[(3, &[(0, 0, 10)])])).unwrap();
        let window = reader.get_window(3, &Region::new(0, 0, 2, 1), 1).unwrap();
        assert_eq!(window.get_sample(1, 1, 0), Some(10.0));
        assert_eq!(window.get_sample(5, 1, 0), Some(7.0));
        let empty = reader.get_window(4, &Region::new(0, 0, 1, 1), 1).unwrap();
        assert!(empty.is_all_nodata(7.0));
        assert!(matches!(
            reader.get_window(30, &Region::new(0, 0, 1, 1), 1),
            Err(PyramidError::InvalidLevel(30))
        ));
    }

    #[test]
    fn test_tiles_are_cached_per_channel_count() {
        let reader = RasterReader::open_with_config(
            dataset(&[(2, &[(1, 1, 5), (1, 2, 6), (2, 2, 7)])]),
            ReaderConfig::default().with_cache_capacity(2),
        )
        .unwrap();
        let key = BlockCoordinate::new(2, 1, 1).unwrap();
        let first = reader.get_tile(key, 1).unwrap().unwrap();
        let again = reader.get_tile(key, 1).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(matches!(
            reader.get_tile(key, 3),
            Err(PyramidError::RasterizationError(RasterError::NotSupported(_)))
        ));
        for x in [1, 2] {
            reader.get_tile(BlockCoordinate::new(2, 1, x).unwrap(), 1).unwrap();
        }
        reader.get_tile(BlockCoordinate::new(2, 2, 2).unwrap(), 1).unwrap();
        assert_eq!(reader.cached_tiles().unwrap(), 2);
    }

    #[test]
    fn test_level_selection() {
        let reader = RasterReader::open(dataset(&[
            (2, &[(1, 1, 1)]),
            (4, &[(5, 5, 2)]),
            (6, &[(21, 21, 3)]),
        ]))
        .unwrap();
        let world = BlockCoordinate::new(2, 1, 1).unwrap().world_region();
        // one level 2 tile at its native 4 pixels
        assert_eq!(reader.select_level(&world, (4, 4)).unwrap(), 2);
        // 4 pixels per level 3 tile, level 3 is absent so level 4 answers
        assert_eq!(reader.select_level(&world, (8, 8)).unwrap(), 4);
        assert_eq!(reader.select_level(&world, (16, 16)).unwrap(), 4);
        assert_eq!(reader.select_level(&world, (64, 64)).unwrap(), 6);
        assert!(matches!(
            reader.select_level(&world, (65, 65)),
            Err(PyramidError::NoValidLevel((_, Some(6))))
        ));
        // coarser than anything stored still picks the coarsest level
        assert_eq!(reader.select_level(&world, (1, 1)).unwrap(), 2);
    }

    #[test]
    fn test_upsampling_opt_in() {
        let reader = RasterReader::open_with_config(
            dataset(&[(2, &[(1, 1, 9)])]),
            ReaderConfig::default().with_allow_upsampling(true),
        )
        .unwrap();
        let world = BlockCoordinate::new(2, 1, 1).unwrap().world_region();
        let out = reader.raster_io(&world, 16, 16, 1).unwrap();
        assert_eq!(out.dimensions, (16, 16));
        assert_eq!(out.data, RasterData::U16(vec![9; 256]));
    }

    #[test]
    fn test_raster_io_into_keeps_buffer_on_failure() {
        let reader = RasterReader::open_with_config(
            dataset(&[(3, &[(0, 0, 10)])]),
            ReaderConfig::default().with_max_raster_io_tiles(1),
        )
        .unwrap();
        let mut out = Raster::filled((8, 4), 1, RasterFormat::Terrain, SampleType::U16, 1.0).unwrap();
        let world = iwm_to_dwm(&Region::new(0, 0, 2, 1), 3).unwrap();
        assert!(matches!(
            reader.raster_io_into(&mut out, &world),
            Err(PyramidError::SampleTooLarge((2, 1)))
        ));
        assert_eq!(out.data, RasterData::U16(vec![1; 32]));

        let world = iwm_to_dwm(&Region::new(0, 0, 1, 1), 3).unwrap();
        let mut out = Raster::blank((4, 4), 1, RasterFormat::Terrain, SampleType::U16).unwrap();
        reader.raster_io_into(&mut out, &world).unwrap();
        assert_eq!(out.data, RasterData::U16(vec![10; 16]));
    }

    #[test]
    fn test_extent_and_introspection() {
        let reader = RasterReader::open(dataset(&[
            (1, &[(0, 0, 1)]),
            (3, &[(2, 1, 1), (2, 2, 1), (4, 6, 1)]),
        ]))
        .unwrap();
        assert_eq!(reader.existing_levels(), vec![1, 3]);
        assert_eq!(reader.level_size(3).unwrap(), 3);
        assert_eq!(reader.level_size(2).unwrap(), 0);
        assert!(matches!(reader.level_size(31), Err(PyramidError::InvalidLevel(31))));
        assert_eq!(
            reader.determine_extent().unwrap(),
            (3, Region::new(1, 2, 7, 5))
        );
        assert_eq!(reader.regions_on_deepest_level().len(), 2);
        assert_eq!(
            reader.determine_extent_on_level(1).unwrap(),
            Some(Region::new(0, 0, 1, 1))
        );
        assert_eq!(reader.determine_extent_on_level(2).unwrap(), None);
        assert!(reader.tile_exists(BlockCoordinate::new(3, 4, 6).unwrap()));
        assert!(!reader.tile_exists(BlockCoordinate::new(3, 4, 5).unwrap()));
        assert!(reader.is_terrain());
    }

    #[test]
    fn test_empty_dataset_has_no_extent() {
        let reader = RasterReader::open(dataset(&[])).unwrap();
        assert!(matches!(
            reader.determine_extent(),
            Err(PyramidError::NoValidLevel((_, None)))
        ));
        assert!(reader.world_regions_on_deepest_level().unwrap().is_empty());
    }
}
