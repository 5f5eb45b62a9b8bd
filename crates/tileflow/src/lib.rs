pub use tileflow_plan::*;

pub use tileflow_common as common;
