use serde::{Deserialize, Serialize};

/// Tunable choices of a plan that do not change its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSelection {
    /// Buffering depth of every channel. `None` falls back to the global configuration.
    pub depth: Option<u32>,
    pub granularity: TransferGranularity,
}

impl PlanSelection {
    pub fn builder() -> PlanSelectionBuilder {
        PlanSelectionBuilder::new()
    }
}

impl Default for PlanSelection {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct PlanSelectionBuilder {
    depth: Option<u32>,
    granularity: TransferGranularity,
}

impl PlanSelectionBuilder {
    fn new() -> Self {
        Self {
            depth: None,
            granularity: TransferGranularity::default(),
        }
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn granularity(mut self, granularity: TransferGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn build(self) -> PlanSelection {
        PlanSelection {
            depth: self.depth,
            granularity: self.granularity,
        }
    }
}

#[derive(Default, Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferGranularity {
    /// One descriptor per output block for the inputs, walking every round of the block
    #[default]
    PerBlock,
    /// One descriptor per output block and round for the inputs
    PerRound,
    /// One multi-dimensional descriptor per host buffer and column
    Coalesced,
}
