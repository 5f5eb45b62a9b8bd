pub mod access;
pub mod channel;
pub mod descriptor;
pub mod device;
pub mod partition;
pub mod program;
pub mod schedule;
pub mod sync;
pub mod topology;

mod error;
mod problem;
mod selection;

pub use error::*;
pub use problem::*;
pub use selection::*;
