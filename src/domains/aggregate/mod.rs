pub mod pivot;
pub mod reduce;

pub use pivot::*;
pub use reduce::*;
