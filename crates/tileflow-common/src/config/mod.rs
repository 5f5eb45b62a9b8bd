/// Planning config module.
pub mod planning;

mod base;
mod logger;

pub use base::*;
pub use logger::*;
