use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::collect::nominatim::NominatimCollect;
use crate::collect::srtm::{SrtmCollect, SrtmProduct};
use crate::collect::{BoundaryProvider, ElevationSource};
use crate::commons::basic_functions::validate_state_name;
use crate::commons::housekeeping::{clean_up_intermediate_files, create_state_folder};
use crate::commons::paths::StatePaths;
use crate::config::PipelineConfig;
use crate::error::MapError;
use crate::geometric::boundary::save_shapefile;
use crate::geometric::contour::{extract_contours, generate_contours};
use crate::geometric::dem::{download_elevation_data, ClippedTile};
use crate::geometric::grid::{partition, Grid};
use crate::geometric::mosaic::merge_tiffs;
use crate::geometric::raster::Raster;
use crate::geometric::svg::{contours_to_svg, render_contours, save_boundary_svg};

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub state_name: String,
    pub grid: Grid,
    /// Tiles that overlapped the boundary, in sub-box order
    pub tiles: Vec<ClippedTile>,
    pub boundary_svg: PathBuf,
    pub boundary_shp: Option<PathBuf>,
    pub merged_tif: PathBuf,
    pub contours_shp: Option<PathBuf>,
    pub contours_svg: PathBuf,
    pub contour_count: usize,
    /// Width and height of the contour SVG
    pub svg_size: (u32, u32),
    /// Intermediate tiles deleted at the end of the run
    pub removed: Vec<PathBuf>,
}

impl RunSummary {
    pub fn sections(&self) -> usize {
        self.grid.sections()
    }
}

/// Contour map pipeline for one US state:
/// geocode, partition, download and clip, merge, contour, render, clean up.
pub struct StateMap<B: BoundaryProvider, E: ElevationSource> {
    pub config: PipelineConfig,
    boundary_provider: B,
    elevation_source: E,
}

impl StateMap<NominatimCollect, SrtmCollect> {
    /// Pipeline backed by Nominatim and the SRTM mirror
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let product = SrtmProduct::from_name(&config.product)?;
        let boundary_provider = NominatimCollect::with_options(
            &config.cache_root,
            &config.nominatim_base_url,
            &config.user_agent,
            config.http_timeout_secs,
        )?;
        let elevation_source = SrtmCollect::with_options(
            &config.cache_root,
            product,
            &config.srtm_base_url,
            &config.user_agent,
            config.http_timeout_secs,
        )?;
        Ok(StateMap::new(config, boundary_provider, elevation_source))
    }
}

impl<B: BoundaryProvider, E: ElevationSource> StateMap<B, E> {
    pub fn new(config: PipelineConfig, boundary_provider: B, elevation_source: E) -> Self {
        StateMap {
            config,
            boundary_provider,
            elevation_source,
        }
    }

    pub fn elevation_source(&self) -> &E {
        &self.elevation_source
    }

    /// Run every step for `state_name`, which must already be title-cased
    pub fn run(&self, state_name: &str) -> Result<RunSummary> {
        if !validate_state_name(state_name) {
            return Err(MapError::InvalidStateName(state_name.to_string()).into());
        }
        let config = &self.config;
        let paths = StatePaths::new(state_name, &config.cache_root, &config.output_dir);

        let boundary = self
            .boundary_provider
            .boundary(state_name)
            .context(format!("Failed to geocode {}", state_name))?;
        let bounds = boundary.bbox;

        let (grid, sub_boxes) = partition(&bounds, config.tile_size_degree)?;
        log::info!(
            "{} requires {} rows, {} cols, for a total of {} sections",
            state_name,
            grid.rows,
            grid.cols,
            grid.sections()
        );

        create_state_folder(&paths)?;
        let boundary_svg = paths.boundary_svg();
        save_boundary_svg(&boundary, &boundary_svg, &config.svg)?;
        let boundary_shp = if config.write_shapefiles {
            Some(save_shapefile(&boundary, &paths)?)
        } else {
            None
        };

        let tiles = download_elevation_data(
            &self.elevation_source,
            &sub_boxes,
            &paths.base_output_path(),
            &boundary.geometry,
            &paths.cache_root,
        )?;

        let merged_tif = paths.merged_tif();
        let clipped: Vec<PathBuf> = tiles.iter().map(|t| t.clipped_path.clone()).collect();
        merge_tiffs(&clipped, &merged_tif)?;

        let contours_svg = paths.contours_svg();
        let (contour_count, contours_shp, drawing) = if config.write_shapefiles {
            let shp = paths.contours_shp();
            let contours = generate_contours(&merged_tif, &shp, &config.contour)?;
            let drawing = contours_to_svg(
                &shp,
                &contours_svg,
                state_name,
                &config.contour.attribute_name,
                &config.svg,
            )?;
            (contours.len(), Some(shp), drawing)
        } else {
            let mosaic = Raster::from_file(&merged_tif)?;
            let contours = extract_contours(&mosaic, &config.contour)?;
            let drawing = render_contours(&contours, state_name, &config.svg)
                .context(format!("Failed to render contours of {}", state_name))?;
            drawing.save(&contours_svg)?;
            (contours.len(), None, drawing)
        };

        let removed = clean_up_intermediate_files(&paths.cache_root, state_name, config.keep_clipped_tiles)?;

        Ok(RunSummary {
            state_name: state_name.to_string(),
            grid,
            tiles,
            boundary_svg,
            boundary_shp,
            merged_tif,
            contours_shp,
            contours_svg,
            contour_count,
            svg_size: (drawing.width, drawing.height),
            removed,
        })
    }
}
