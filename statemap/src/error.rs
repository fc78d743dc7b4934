use thiserror::Error;

/// Failure kinds the pipeline surfaces to its caller.
///
/// Functions return `anyhow::Result`; these variants travel inside the
/// `anyhow::Error` and can be recovered with `downcast_ref::<MapError>()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MapError {
    /// State name is not one of the 50 US states.
    #[error("'{0}' is not a valid US state name.")]
    InvalidStateName(String),

    /// Caller supplied an unusable value (bad bounding box, tile size, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A step that needs at least one input received none.
    #[error("No input: {0}")]
    NoInput(String),

    /// Data bounding box has zero width or height.
    #[error("Degenerate geometry: data bounds are {width} x {height}")]
    DegenerateGeometry {
        /// Width of the data bounding box.
        width: f64,
        /// Height of the data bounding box.
        height: f64,
    },

    /// An external collaborator (geocoder, tile service, GDAL, ogr2ogr) failed.
    #[error("{service} failed: {reason}")]
    Collaborator {
        /// Name of the collaborator.
        service: String,
        /// What went wrong.
        reason: String,
    },

    /// Boundary polygon does not overlap tile `index`.
    #[error("Boundary does not overlap tile {index}")]
    NoOverlap {
        /// Sub-box index.
        index: usize,
    },
}

impl MapError {
    pub fn collaborator(service: &str, reason: impl Into<String>) -> Self {
        MapError::Collaborator {
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}
