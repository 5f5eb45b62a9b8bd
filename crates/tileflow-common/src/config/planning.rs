use super::logger::{LogLevel, LoggerConfig};

/// Configuration for the planning passes.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PlanningConfig {
    /// Whether every emitted schedule is replayed through the strict validator before being
    /// returned.
    #[serde(default = "verify_default")]
    pub verify: bool,

    /// Buffering depth used for channels when the selection does not specify one.
    #[serde(default = "default_depth")]
    pub default_depth: u32,

    /// Logger configuration for planning logs.
    #[serde(default)]
    pub logger: LoggerConfig<PlanningLogLevel>,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            verify: verify_default(),
            default_depth: default_depth(),
            logger: Default::default(),
        }
    }
}

fn verify_default() -> bool {
    true
}

fn default_depth() -> u32 {
    2
}

/// Log levels for planning.
#[derive(Default, Clone, Copy, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum PlanningLogLevel {
    /// Planning logging is disabled.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,

    /// One summary line per plan.
    #[serde(rename = "basic")]
    Basic,

    /// Every schedule entry is logged as well.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for PlanningLogLevel {}
