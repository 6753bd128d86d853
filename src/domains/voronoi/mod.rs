pub mod tessellate;

pub use tessellate::*;
