pub mod aggregate;
pub mod geometry;
pub mod grid;
pub mod join;
pub mod output;
pub mod ports;
pub mod temporal;
pub mod voronoi;

pub use ports::*;
