use anyhow::{Context, Result};
use gdal::spatial_ref::SpatialRef;
use geo::{LineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// EPSG code of WGS 84, the CRS of SRTM tiles and Nominatim boundaries.
pub const WGS84_EPSG: u32 = 4326;

/// CRS handling shared by the raster and vector steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoCore {
    /// EPSG code
    pub epsg: u32,
}

impl GeoCore {
    pub fn new(epsg: u32) -> Self {
        GeoCore { epsg }
    }

    /// GDAL spatial reference for this CRS
    pub fn spatial_ref(&self) -> Result<SpatialRef> {
        SpatialRef::from_epsg(self.epsg)
            .context(format!("Failed to create spatial reference EPSG:{}", self.epsg))
    }

    /// WKT of this CRS, as stored in GeoTIFF headers
    pub fn wkt(&self) -> Result<String> {
        self.spatial_ref()?
            .to_wkt()
            .context(format!("Failed to export EPSG:{} as WKT", self.epsg))
    }
}

impl Default for GeoCore {
    fn default() -> Self {
        GeoCore::new(WGS84_EPSG)
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Checked constructor: finite values and `min < max` on both axes.
    pub fn try_new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let bbox = BoundingBox::new(min_x, min_y, max_x, max_y);
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.min_x, self.min_y, self.max_x, self.max_y];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MapError::InvalidInput(format!("non-finite bounding box {:?}", self)).into());
        }
        if self.min_x >= self.max_x || self.min_y >= self.max_y {
            return Err(MapError::InvalidInput(format!(
                "bounding box must have min < max on each axis, got {:?}",
                self
            ))
            .into());
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }
}

/// Boundary polygon of a state, as returned by the geocoder
#[derive(Debug, Clone)]
pub struct StateBoundary {
    /// Title-cased state name
    pub name: String,
    /// Boundary geometry (EPSG:4326)
    pub geometry: MultiPolygon<f64>,
    /// Total bounds of `geometry`
    pub bbox: BoundingBox,
}

impl StateBoundary {
    /// Build a boundary and derive its bounds from the geometry
    pub fn new(name: &str, geometry: MultiPolygon<f64>) -> Result<Self> {
        use geo::BoundingRect;

        let rect = geometry
            .bounding_rect()
            .context(format!("Boundary of {} has no coordinates", name))?;
        let bbox = BoundingBox::from_rect(rect);
        bbox.validate()
            .context(format!("Boundary of {} is degenerate", name))?;

        Ok(StateBoundary {
            name: name.to_string(),
            geometry,
            bbox,
        })
    }
}
