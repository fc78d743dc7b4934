//! Data collection from external services.
//!
//! Each collector sits behind a trait so the pipeline can run against
//! local stand-ins in tests.

pub mod global_variables;
pub mod nominatim;
pub mod srtm;

use anyhow::Result;
use std::path::Path;

use crate::geo_core::{BoundingBox, StateBoundary};

/// Resolves a state name to its boundary polygon.
pub trait BoundaryProvider {
    fn boundary(&self, state_name: &str) -> Result<StateBoundary>;
}

/// Produces elevation rasters covering a bounding box.
pub trait ElevationSource {
    /// Write a GeoTIFF covering `bbox` to `output`.
    fn fetch(&self, bbox: &BoundingBox, output: &Path) -> Result<()>;

    /// Drop whatever the source keeps between calls (download spool, ...).
    fn clean(&self) -> Result<()>;
}
