pub mod delimiters;
pub mod value;

pub use delimiters::*;
pub use value::*;
