pub mod crs;
pub mod layer;
pub mod ops;
pub mod store;

pub use crs::*;
pub use layer::*;
pub use ops::*;
pub use store::*;
