pub mod joiner;

pub use joiner::*;
