mod base;
mod builder;
mod matvec;
mod streaming;

pub use base::*;
pub use builder::*;
