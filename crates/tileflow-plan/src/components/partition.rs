use serde::{Deserialize, Serialize};

use crate::components::{
    ConfigError, StreamingParams, Workload, WorkloadParams, device::DeviceProfile,
};

/// Per-column and per-tile extents of a matrix-vector workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatVecPartition {
    pub rows: u32,
    pub cols: u32,
    pub tile_m: usize,
    pub tile_k: usize,
    pub k_total: usize,
    /// Rows of A and entries of C owned by one column.
    pub rows_per_column: usize,
    /// Rows of A produced by one column per block, `rows * tile_m`.
    pub block_rows: usize,
    /// Output blocks computed by each column.
    pub blocks_per_column: u32,
    /// K tiles accumulated into each block.
    pub rounds: u32,
}

/// Per-column and per-tile extents of the streaming benchmark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingPartition {
    pub rows: u32,
    pub cols: u32,
    pub burst_len: usize,
    /// Token elements written back by each compute tile.
    pub slice_len: usize,
    /// Bursts consumed per token.
    pub token_rate: u32,
    /// Replays of the whole exchange.
    pub rounds: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Partition {
    MatVec(MatVecPartition),
    Streaming(StreamingPartition),
}

impl Partition {
    /// Validates `workload` against `profile` and decomposes it.
    pub fn new(workload: &Workload, profile: &DeviceProfile) -> Result<Self, ConfigError> {
        profile.validate()?;

        let (rows, cols) = workload.grid();
        check_positive("rows", rows as usize)?;
        check_positive("cols", cols as usize)?;
        check_fits("columns", cols, profile.usable_cols)?;
        check_fits("rows", rows, profile.usable_rows)?;

        match workload {
            Workload::MatVec(params) => Self::matvec(params).map(Partition::MatVec),
            Workload::Streaming(params) => Self::streaming(params).map(Partition::Streaming),
        }
    }

    fn matvec(params: &WorkloadParams) -> Result<MatVecPartition, ConfigError> {
        check_positive("m_total", params.m_total)?;
        check_positive("k_total", params.k_total)?;
        check_positive("tile_m", params.tile_m)?;
        check_positive("tile_k", params.tile_k)?;

        let divisor = (params.rows as usize)
            .checked_mul(params.cols as usize)
            .and_then(|cores| cores.checked_mul(params.tile_m))
            .ok_or(ConfigError::Overflow {
                name: "rows * cols * tile_m",
            })?;
        check_divisible("m_total", params.m_total, "rows * cols * tile_m", divisor)?;
        check_divisible("k_total", params.k_total, "tile_k", params.tile_k)?;
        // The on-chip A layout moves groups of four columns.
        check_divisible("tile_k", params.tile_k, "the A layout group", 4)?;

        let rows_per_column = params.m_total / params.cols as usize;
        let block_rows = params.rows as usize * params.tile_m;

        Ok(MatVecPartition {
            rows: params.rows,
            cols: params.cols,
            tile_m: params.tile_m,
            tile_k: params.tile_k,
            k_total: params.k_total,
            rows_per_column,
            block_rows,
            blocks_per_column: (rows_per_column / block_rows) as u32,
            rounds: (params.k_total / params.tile_k) as u32,
        })
    }

    fn streaming(params: &StreamingParams) -> Result<StreamingPartition, ConfigError> {
        check_positive("burst_len", params.burst_len)?;
        check_positive("token_rate", params.token_rate)?;
        check_positive("rounds", params.rounds as usize)?;
        check_divisible("burst_len", params.burst_len, "rows", params.rows as usize)?;

        Ok(StreamingPartition {
            rows: params.rows,
            cols: params.cols,
            burst_len: params.burst_len,
            slice_len: params.burst_len / params.rows as usize,
            token_rate: params.token_rate as u32,
            rounds: params.rounds,
        })
    }

    pub fn rows(&self) -> u32 {
        match self {
            Partition::MatVec(p) => p.rows,
            Partition::Streaming(p) => p.rows,
        }
    }

    pub fn cols(&self) -> u32 {
        match self {
            Partition::MatVec(p) => p.cols,
            Partition::Streaming(p) => p.cols,
        }
    }

    /// Passes of each compute loop: output blocks, or replays for streaming.
    pub fn iterations(&self) -> u32 {
        match self {
            Partition::MatVec(p) => p.blocks_per_column,
            Partition::Streaming(p) => p.rounds,
        }
    }

    /// Input acquisitions per pass of each compute loop.
    pub fn inner_rounds(&self) -> u32 {
        match self {
            Partition::MatVec(p) => p.rounds,
            Partition::Streaming(p) => p.token_rate,
        }
    }
}

fn check_positive(name: &'static str, value: usize) -> Result<(), ConfigError> {
    match value {
        0 => Err(ConfigError::ZeroDimension { name }),
        _ => Ok(()),
    }
}

fn check_fits(axis: &'static str, requested: u32, usable: u32) -> Result<(), ConfigError> {
    if requested > usable {
        return Err(ConfigError::WorkloadExceedsGrid {
            axis,
            requested,
            usable,
        });
    }
    Ok(())
}

fn check_divisible(
    dividend: &'static str,
    dividend_value: usize,
    divisor: &'static str,
    divisor_value: usize,
) -> Result<(), ConfigError> {
    if dividend_value % divisor_value != 0 {
        return Err(ConfigError::NotDivisible {
            dividend,
            dividend_value,
            divisor,
            divisor_value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matvec(m_total: usize, k_total: usize, rows: u32, cols: u32) -> Workload {
        Workload::MatVec(WorkloadParams::new(m_total, k_total, 128, 128, rows, cols))
    }

    #[test]
    fn splits_matvec_into_blocks_and_rounds() {
        let partition = Partition::new(&matvec(2048, 512, 1, 4), &DeviceProfile::npu2()).unwrap();

        let Partition::MatVec(p) = partition else {
            panic!("expected a matrix-vector partition");
        };
        assert_eq!(p.rows_per_column, 512);
        assert_eq!(p.block_rows, 128);
        assert_eq!(p.blocks_per_column, 4);
        assert_eq!(p.rounds, 4);
        assert_eq!(partition.iterations(), 4);
    }

    #[test]
    fn rejects_indivisible_m() {
        let err = Partition::new(&matvec(2000, 512, 1, 4), &DeviceProfile::npu1()).unwrap_err();

        assert_eq!(
            err,
            ConfigError::NotDivisible {
                dividend: "m_total",
                dividend_value: 2000,
                divisor: "rows * cols * tile_m",
                divisor_value: 512,
            }
        );
    }

    #[test]
    fn rejects_indivisible_k() {
        let err = Partition::new(&matvec(512, 500, 1, 4), &DeviceProfile::npu1()).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::NotDivisible {
                dividend: "k_total",
                ..
            }
        ));
    }

    #[test]
    fn rejects_grids_larger_than_usable() {
        let err = Partition::new(&matvec(1024, 512, 2, 4), &DeviceProfile::npu1()).unwrap_err();

        assert_eq!(
            err,
            ConfigError::WorkloadExceedsGrid {
                axis: "rows",
                requested: 2,
                usable: 1
            }
        );
    }

    #[test]
    fn rejects_zero_dimensions() {
        let err = Partition::new(&matvec(512, 512, 1, 0), &DeviceProfile::npu1()).unwrap_err();

        assert_eq!(err, ConfigError::ZeroDimension { name: "cols" });
    }

    #[test]
    fn huge_grids_do_not_overflow() {
        let profile = DeviceProfile::custom("huge", u32::MAX, u32::MAX, u32::MAX, u32::MAX);

        let err = Partition::new(
            &Workload::MatVec(WorkloadParams::new(1024, 512, 128, 128, 70_000, 70_000)),
            &profile,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotDivisible {
                dividend: "m_total",
                divisor_value: 627_200_000_000,
                ..
            }
        ));

        let err = Partition::new(
            &Workload::MatVec(WorkloadParams::new(1024, 512, 1 << 40, 128, 70_000, 70_000)),
            &profile,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Overflow {
                name: "rows * cols * tile_m"
            }
        );
    }

    #[test]
    fn splits_streaming_bursts_across_rows() {
        let profile = DeviceProfile::custom("tall", 4, 4, 4, 4);
        let workload = Workload::Streaming(StreamingParams::new(1024, 32, 4, 4, 2));
        let partition = Partition::new(&workload, &profile).unwrap();

        let Partition::Streaming(p) = partition else {
            panic!("expected a streaming partition");
        };
        assert_eq!(p.slice_len, 256);
        assert_eq!(partition.inner_rounds(), 32);
        assert_eq!(partition.iterations(), 4);
    }

    #[test]
    fn rejects_indivisible_bursts() {
        let profile = DeviceProfile::custom("tall", 4, 4, 4, 3);
        let workload = Workload::Streaming(StreamingParams::new(1024, 32, 4, 3, 1));
        let err = Partition::new(&workload, &profile).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::NotDivisible {
                dividend: "burst_len",
                divisor: "rows",
                ..
            }
        ));
    }
}
