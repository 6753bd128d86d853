pub mod error;
pub mod record;
pub mod value;

pub use error::*;
pub use record::*;
pub use value::*;
