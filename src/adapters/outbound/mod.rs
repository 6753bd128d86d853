pub mod csv_sink;
pub mod geojson_writer;

pub use csv_sink::*;
pub use geojson_writer::*;
