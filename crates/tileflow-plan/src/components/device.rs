use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::components::{ConfigError, access::TransferLimits};

/// Names of the built-in device profiles.
pub const KNOWN_PROFILES: [&str; 2] = ["npu1", "npu2"];

/// Static description of a target device and of the part of it a plan may use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Name the profile is looked up by.
    pub name: String,
    /// Columns of the physical grid.
    pub total_cols: u32,
    /// Compute rows of the physical grid.
    pub total_rows: u32,
    /// Columns a plan may place tiles in, starting from column 0.
    pub usable_cols: u32,
    /// Compute rows a plan may place tiles in, per column.
    pub usable_rows: u32,
    /// Buffer descriptor ids owned by the DMA engine of each boundary tile.
    pub bd_ids_per_engine: u32,
    /// Maximum number of dimensions of one strided transfer.
    pub max_transfer_dims: usize,
    /// Maximum number of elements along one transfer dimension.
    pub max_dim_size: usize,
}

impl DeviceProfile {
    const BD_IDS_PER_ENGINE: u32 = 16;
    const MAX_TRANSFER_DIMS: usize = 4;
    const MAX_DIM_SIZE: usize = 1024;

    /// Looks a built-in profile up by name.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "npu1" => Ok(Self::npu1()),
            "npu2" => Ok(Self::npu2()),
            _ => Err(ConfigError::UnknownProfile {
                name: name.to_string(),
                known: KNOWN_PROFILES.join(", "),
            }),
        }
    }

    /// Four columns of four compute rows, using every column and the first row.
    pub fn npu1() -> Self {
        Self::custom("npu1", 4, 4, 4, 1)
    }

    /// Eight columns of four compute rows, using the first four columns and the first row.
    pub fn npu2() -> Self {
        Self::custom("npu2", 8, 4, 4, 1)
    }

    /// A profile with the default hardware limits.
    pub fn custom(
        name: &str,
        total_cols: u32,
        total_rows: u32,
        usable_cols: u32,
        usable_rows: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            total_cols,
            total_rows,
            usable_cols,
            usable_rows,
            bd_ids_per_engine: Self::BD_IDS_PER_ENGINE,
            max_transfer_dims: Self::MAX_TRANSFER_DIMS,
            max_dim_size: Self::MAX_DIM_SIZE,
        }
    }

    /// Overrides the number of buffer descriptor ids of each DMA engine.
    pub fn with_bd_ids_per_engine(mut self, bd_ids_per_engine: u32) -> Self {
        self.bd_ids_per_engine = bd_ids_per_engine;
        self
    }

    /// Overrides the addressing limits of a strided transfer.
    pub fn with_transfer_limits(mut self, max_transfer_dims: usize, max_dim_size: usize) -> Self {
        self.max_transfer_dims = max_transfer_dims;
        self.max_dim_size = max_dim_size;
        self
    }

    /// Addressing limits every descriptor must fit in.
    pub fn transfer_limits(&self) -> TransferLimits {
        TransferLimits::new(self.max_transfer_dims, self.max_dim_size)
    }

    /// Returns an error if:
    /// - the usable grid is larger than the device
    /// - any grid dimension or hardware limit is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("total_cols", self.total_cols as usize),
            ("total_rows", self.total_rows as usize),
            ("usable_cols", self.usable_cols as usize),
            ("usable_rows", self.usable_rows as usize),
            ("bd_ids_per_engine", self.bd_ids_per_engine as usize),
            ("max_transfer_dims", self.max_transfer_dims),
            ("max_dim_size", self.max_dim_size),
        ];
        if let Some(&(name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroDimension { name });
        }

        if self.usable_cols > self.total_cols {
            return Err(ConfigError::GridExceedsDevice {
                axis: "columns",
                usable: self.usable_cols,
                total: self.total_cols,
            });
        }

        if self.usable_rows > self.total_rows {
            return Err(ConfigError::GridExceedsDevice {
                axis: "rows",
                usable: self.usable_rows,
                total: self.total_rows,
            });
        }

        Ok(())
    }
}

impl FromStr for DeviceProfile {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::from_name(name)
    }
}
