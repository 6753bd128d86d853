pub mod filler;

pub use filler::*;
