pub mod cache;
pub mod codec;
pub mod coord;
pub mod encode;
pub mod env;
pub mod error;
pub mod io;
pub mod raster;
pub mod reader;

pub use cache::TileCache;
pub use codec::{Compression, ExternalCodec, TileCodec};
pub use coord::{dwm_to_iwm, iwm_to_dwm, BlockCoordinate, Region};
pub use encode::{build_overviews, merge_datasets, DatasetWriter};
pub use env::{DatasetMeta, PagedEnvironment};
pub use error::{PyramidError, PyramidResult};
pub use raster::{MergeMode, Raster, RasterFormat, SampleType};
pub use reader::{RasterReader, ReaderConfig};
