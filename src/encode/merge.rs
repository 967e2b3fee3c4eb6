use super::overview::{check_compatible, copy_tile};
use super::{DatasetWriter, EncodeError, EncodeResult};
use crate::coord::{BlockCoordinate, MAX_LEVELS};
use crate::io::{ReadRange, WriteRange};
use crate::raster::{MergeMode, Raster};
use crate::reader::RasterReader;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Writes the union of several datasets
///
/// A key stored by exactly one source is copied; colliding keys are decoded
/// and folded left to right with `merge_nodata`, the earlier source being the
/// first operand. Returns the number of tiles written.
pub fn merge_datasets<R: ReadRange, W: WriteRange>(
    readers: &[RasterReader<R>],
    writer: &mut DatasetWriter<W>,
    mode: MergeMode,
) -> EncodeResult<usize> {
    for reader in readers {
        check_compatible(reader.meta(), writer.meta())?;
    }
    let nodata = writer.meta().nodata;
    let channels = writer.meta().channels;

    let mut written = 0;
    for z in 0..MAX_LEVELS {
        let mut owners: BTreeMap<BlockCoordinate, Vec<usize>> = BTreeMap::new();
        for (i, reader) in readers.iter().enumerate() {
            for key in reader.env().get_keys(z) {
                owners.entry(*key).or_default().push(i);
            }
        }
        if owners.is_empty() {
            continue;
        }

        writer.begin_level(z)?;
        let mut collisions = 0;
        for (key, sources) in owners.iter() {
            if let [only] = sources.as_slice() {
                copy_tile(&readers[*only], writer, *key)?;
                continue;
            }
            let mut merged: Option<Raster> = None;
            for i in sources {
                let Some(tile) = readers[*i].get_tile(*key, channels)? else {
                    continue;
                };
                merged = Some(match merged {
                    Some(acc) => acc.merge_nodata(&tile, nodata, mode)?,
                    None => (*tile).clone(),
                });
            }
            let tile = merged.ok_or_else(|| {
                EncodeError::IncompatibleSources(format!("{key} listed but not readable"))
            })?;
            writer.write_tile(*key, &tile)?;
            collisions += 1;
        }
        writer.end_level()?;
        debug!("merged level {z}: {} tiles, {collisions} collisions", owners.len());
        written += owners.len();
    }
    info!("Merged {} datasets into {written} tiles", readers.len());
    Ok(written)
}
