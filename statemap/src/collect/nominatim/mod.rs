pub mod nominatim_collect;

pub use nominatim_collect::NominatimCollect;
