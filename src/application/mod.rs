pub mod dataset;
pub mod pipeline;
pub mod runner;

pub use dataset::*;
pub use pipeline::*;
pub use runner::*;
