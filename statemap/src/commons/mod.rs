pub mod basic_functions;
pub mod housekeeping;
pub mod ogr;
pub mod paths;
