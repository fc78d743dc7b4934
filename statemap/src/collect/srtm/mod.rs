pub mod srtm_collect;

pub use srtm_collect::{SrtmCollect, SrtmProduct};
