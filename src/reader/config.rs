use crate::codec::ExternalCodec;
use std::sync::Arc;

pub const DEFAULT_MAX_RASTER_IO_TILES: u64 = 256;
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Query limits and collaborators of a `RasterReader`
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    /// Largest tile window a single query may assemble
    pub max_raster_io_tiles: u64,
    /// Decoded tiles kept per reader
    pub cache_capacity: usize,
    /// Fall back to the deepest level when none is fine enough
    pub allow_upsampling: bool,
    pub external_codec: Option<Arc<dyn ExternalCodec>>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_raster_io_tiles: DEFAULT_MAX_RASTER_IO_TILES,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            allow_upsampling: false,
            external_codec: None,
        }
    }
}

impl ReaderConfig {
    pub fn with_max_raster_io_tiles(mut self, tiles: u64) -> Self {
        self.max_raster_io_tiles = tiles;
        self
    }

    pub fn with_cache_capacity(mut self, tiles: usize) -> Self {
        self.cache_capacity = tiles;
        self
    }

    pub fn with_allow_upsampling(mut self, allow: bool) -> Self {
        self.allow_upsampling = allow;
        self
    }

    pub fn with_external_codec(mut self, codec: Arc<dyn ExternalCodec>) -> Self {
        self.external_codec = Some(codec);
        self
    }
}
