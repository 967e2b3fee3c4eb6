use super::{DatasetWriter, EncodeError, EncodeResult};
use crate::coord::BlockCoordinate;
use crate::env::DatasetMeta;
use crate::io::{ReadRange, WriteRange};
use crate::raster::Raster;
use crate::reader::RasterReader;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

type Level = BTreeMap<BlockCoordinate, Arc<Raster>>;

/// Tile layout and sample shape must agree for tiles to move between datasets
pub(crate) fn check_compatible(source: &DatasetMeta, target: &DatasetMeta) -> EncodeResult<()> {
    let shape = |m: &DatasetMeta| (m.format, m.sample_type, m.channels, m.tile_size);
    if shape(source) != shape(target) {
        return Err(EncodeError::IncompatibleSources(format!(
            "{:?} cannot be written as {:?}",
            shape(source),
            shape(target)
        )));
    }
    Ok(())
}

/// Copies one stored tile, reusing its payload when the compression matches
pub(crate) fn copy_tile<R: ReadRange, W: WriteRange>(
    reader: &RasterReader<R>,
    writer: &mut DatasetWriter<W>,
    key: BlockCoordinate,
) -> EncodeResult<()> {
    if reader.meta().compression == writer.meta().compression {
        if let Some(bytes) = reader.env().lookup(key.z(), key)? {
            return writer.write_bytes(key, &bytes);
        }
    } else if let Some(tile) = reader.get_tile(key, reader.meta().channels)? {
        return writer.write_tile(key, &tile);
    }
    Ok(())
}

/// Copies every stored level and fills in the missing coarser ones
///
/// A missing level z >= `min_level` above the deepest stored level is built
/// from level z + 1: each parent assembles its four children north up,
/// absent children as nodata, and halfscales the result. Parents without
/// any child are skipped. Returns the generated levels.
pub fn build_overviews<R: ReadRange, W: WriteRange>(
    reader: &RasterReader<R>,
    writer: &mut DatasetWriter<W>,
    min_level: u32,
) -> EncodeResult<Vec<u32>> {
    let meta = reader.meta().clone();
    check_compatible(&meta, writer.meta())?;
    let Some(deepest) = reader.deepest_level() else {
        return Ok(vec![]);
    };

    let mut generated: BTreeMap<u32, Level> = BTreeMap::new();
    for z in (min_level..deepest).rev() {
        if reader.env().have_level(z) {
            continue;
        }
        let child_keys: Vec<BlockCoordinate> = match generated.get(&(z + 1)) {
            Some(level) => level.keys().copied().collect(),
            None => reader.env().get_keys(z + 1).to_vec(),
        };
        let mut parents: Vec<BlockCoordinate> =
            child_keys.iter().filter_map(|k| k.parent()).collect();
        parents.sort_unstable();
        parents.dedup();

        let mut level = Level::new();
        for parent in parents {
            let tile = build_parent(reader, generated.get(&(z + 1)), &meta, parent)?;
            level.insert(parent, Arc::new(tile));
        }
        debug!("generated level {z}: {} tiles", level.len());
        generated.insert(z, level);
    }

    for z in reader.existing_levels() {
        writer.begin_level(z)?;
        for key in reader.env().get_keys(z) {
            copy_tile(reader, writer, *key)?;
        }
        writer.end_level()?;
    }
    for (z, level) in generated.iter() {
        writer.begin_level(*z)?;
        for (key, tile) in level.iter() {
            writer.write_tile(*key, tile)?;
        }
        writer.end_level()?;
    }
    let levels: Vec<u32> = generated.keys().copied().collect();
    info!("Built overview levels {levels:?} above level {deepest}");
    Ok(levels)
}

fn build_parent<R: ReadRange>(
    reader: &RasterReader<R>,
    generated: Option<&Level>,
    meta: &DatasetMeta,
    parent: BlockCoordinate,
) -> EncodeResult<Raster> {
    let t = meta.tile_size;
    let mut block = Raster::filled(
        (2 * t, 2 * t),
        meta.channels,
        meta.format,
        meta.sample_type,
        meta.nodata,
    )?;
    let children = parent
        .children()
        .ok_or(EncodeError::InvalidLevel(parent.z() + 1))?;
    // south-west, south-east, north-west, north-east
    let offsets = [(0, t), (t, t), (0, 0), (t, 0)];
    for (child, (px, py)) in children.into_iter().zip(offsets) {
        let tile = match generated {
            Some(level) => level.get(&child).cloned(),
            None => reader.get_tile(child, meta.channels)?,
        };
        if let Some(tile) = tile {
            block.paste(&tile, px, py)?;
        }
    }
    Ok(block.halfscale()?)
}
