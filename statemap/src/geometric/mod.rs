pub mod boundary;
pub mod contour;
pub mod dem;
pub mod grid;
pub mod mosaic;
pub mod raster;
pub mod svg;
