use core::fmt::Display;
use serde::{Deserialize, Serialize};

use crate::components::ConfigError;

/// Row of the boundary tiles.
pub const BOUNDARY_ROW: u32 = 0;
/// Row of the staging tiles.
pub const STAGING_ROW: u32 = 1;
/// First row of compute tiles.
pub const FIRST_COMPUTE_ROW: u32 = 2;

#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub col: u32,
    pub row: u32,
}

impl Display for TileCoord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileRole {
    /// Moves data between host memory and the grid.
    Boundary,
    /// Buffers and fans data out inside a column.
    Staging,
    /// Runs the kernels.
    Compute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub coord: TileCoord,
    pub role: TileRole,
}

impl Tile {
    pub fn is_boundary(&self) -> bool {
        self.role == TileRole::Boundary
    }
}

impl Display for Tile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}{}", self.role, self.coord)
    }
}

/// Tiles placed for a grid of `cols` columns with `rows` compute rows each.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub boundary: Vec<Tile>,
    pub staging: Vec<Tile>,
    /// Indexed by column, then row.
    pub compute: Vec<Vec<Tile>>,
}

impl Topology {
    pub fn new(cols: u32, rows: u32) -> Result<Self, ConfigError> {
        if cols == 0 {
            return Err(ConfigError::ZeroDimension { name: "cols" });
        }
        if rows == 0 {
            return Err(ConfigError::ZeroDimension { name: "rows" });
        }

        let place = |col, row, role| Tile {
            coord: TileCoord::new(col, row),
            role,
        };

        Ok(Self {
            boundary: (0..cols)
                .map(|col| place(col, BOUNDARY_ROW, TileRole::Boundary))
                .collect(),
            staging: (0..cols)
                .map(|col| place(col, STAGING_ROW, TileRole::Staging))
                .collect(),
            compute: (0..cols)
                .map(|col| {
                    (0..rows)
                        .map(|row| place(col, FIRST_COMPUTE_ROW + row, TileRole::Compute))
                        .collect()
                })
                .collect(),
        })
    }

    pub fn cols(&self) -> u32 {
        self.boundary.len() as u32
    }

    pub fn rows(&self) -> u32 {
        self.compute.first().map(|col| col.len() as u32).unwrap_or(0)
    }

    pub fn boundary(&self, col: u32) -> Tile {
        self.boundary[col as usize]
    }

    pub fn staging(&self, col: u32) -> Tile {
        self.staging[col as usize]
    }

    pub fn compute(&self, col: u32, row: u32) -> Tile {
        self.compute[col as usize][row as usize]
    }

    /// Compute tiles, column by column.
    pub fn compute_tiles(&self) -> impl Iterator<Item = &Tile> {
        self.compute.iter().flatten()
    }

    pub fn num_tiles(&self) -> usize {
        self.boundary.len() + self.staging.len() + self.compute_tiles().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn places_tiles_by_role() {
        let topology = Topology::new(4, 2).unwrap();

        assert_eq!(topology.cols(), 4);
        assert_eq!(topology.rows(), 2);
        assert_eq!(topology.num_tiles(), 4 + 4 + 8);
        assert_eq!(topology.boundary(3).coord, TileCoord::new(3, 0));
        assert_eq!(topology.staging(1).role, TileRole::Staging);
        assert_eq!(topology.compute(2, 1).coord, TileCoord::new(2, 3));
        assert!(
            topology
                .compute_tiles()
                .all(|tile| tile.role == TileRole::Compute)
        );
    }

    #[test]
    fn rejects_empty_grid() {
        assert_eq!(
            Topology::new(0, 1).unwrap_err(),
            ConfigError::ZeroDimension { name: "cols" }
        );
        assert_eq!(
            Topology::new(4, 0).unwrap_err(),
            ConfigError::ZeroDimension { name: "rows" }
        );
    }

    #[test]
    fn displays_coordinates() {
        assert_eq!(Topology::new(1, 1).unwrap().compute(0, 0).to_string(), "Compute(0, 2)");
    }
}
