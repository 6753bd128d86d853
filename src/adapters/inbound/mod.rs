pub mod csv_table;
pub mod geojson_source;
pub mod memory_source;

pub use csv_table::*;
pub use geojson_source::*;
pub use memory_source::*;
