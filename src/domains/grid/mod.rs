pub mod region_grid;

pub use region_grid::*;
