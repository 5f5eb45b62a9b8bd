use thiserror::Error;

use crate::components::{access::PatternError, channel::ChannelId, topology::TileCoord};

/// Errors that can occur while planning a workload.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The input configuration is invalid. Raised before anything is built.
    #[error("Unable to plan because the configuration is invalid\nCaused by:\n  {0}")]
    Config(#[from] ConfigError),

    /// The configuration is valid but no conforming schedule could be produced.
    #[error("Unable to plan because the schedule is invalid\nCaused by:\n  {0}")]
    Scheduling(#[from] SchedulingError),
}

/// The provided configuration is invalid or rejected by a component.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No device profile is registered under the given name.
    #[error("Unknown device profile `{name}`, expected one of: {known}")]
    UnknownProfile { name: String, known: String },

    /// The usable part of the grid is larger than the device.
    #[error("The device has {total} {axis} but {usable} are marked usable")]
    GridExceedsDevice {
        axis: &'static str,
        usable: u32,
        total: u32,
    },

    /// The workload requests more tiles than the profile makes usable.
    #[error("The workload requests {requested} {axis} but only {usable} are usable")]
    WorkloadExceedsGrid {
        axis: &'static str,
        requested: u32,
        usable: u32,
    },

    /// A dimension that must be positive is zero.
    #[error("Dimension `{name}` must be greater than zero")]
    ZeroDimension { name: &'static str },

    /// A divisibility relation required by the partitioning does not hold.
    #[error("{dividend} ({dividend_value}) must be divisible by {divisor} ({divisor_value})")]
    NotDivisible {
        dividend: &'static str,
        dividend_value: usize,
        divisor: &'static str,
        divisor_value: usize,
    },

    /// A product of dimensions does not fit in a machine word.
    #[error("`{name}` overflows")]
    Overflow { name: &'static str },

    /// A channel cannot double buffer with fewer than two slots.
    #[error("Channel `{channel}` has depth {depth}, at least 2 slots are required")]
    ChannelDepth { channel: String, depth: u32 },

    /// A channel must have at least one consumer.
    #[error("Channel `{channel}` has no consumer")]
    EmptyConsumers { channel: String },

    /// Channel names identify channels and must be unique.
    #[error("Channel `{channel}` is declared twice")]
    DuplicateChannel { channel: String },

    /// A compute program calls a kernel that was never declared.
    #[error("Kernel `{kernel}` is called but not declared")]
    UnknownKernel { kernel: String },

    /// A kernel call passes a buffer whose shape differs from the declared signature.
    #[error(
        "Kernel `{kernel}` expects {expected} as argument {argument}, got {actual} from channel `{channel}`"
    )]
    KernelSignature {
        kernel: String,
        argument: usize,
        expected: String,
        actual: String,
        channel: String,
    },
}

/// No valid schedule exists for an otherwise valid configuration.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// A transfer cannot be expressed with the hardware addressing limits.
    #[error("Transfer on channel `{channel}` (round {round}) cannot be addressed: {error}")]
    DimensionLimit {
        channel: String,
        round: u32,
        error: PatternError,
    },

    /// A channel layout cannot be expressed with the hardware addressing limits.
    #[error("Layout of channel `{channel}` cannot be addressed: {error}")]
    Layout {
        channel: String,
        error: PatternError,
    },

    /// A transfer reaches outside of its host buffer.
    #[error(
        "Transfer on channel `{channel}` (round {round}) reaches element {last}, the host buffer has {len}"
    )]
    OutOfBounds {
        channel: String,
        round: u32,
        last: usize,
        len: usize,
    },

    /// Every id of the channel's pool is still owned by an unresolved transfer.
    #[error(
        "Channel `{channel}` (round {round}) has all {pool_size} buffer descriptors in flight and no wait was scheduled"
    )]
    BdPoolExhausted {
        channel: String,
        round: u32,
        pool_size: usize,
    },

    /// A transfer uses an id out of the channel's round-robin order.
    #[error(
        "Channel `{channel}` (round {round}) uses buffer descriptor {actual} but {expected} is next in its pool"
    )]
    BdIdMismatch {
        channel: String,
        round: u32,
        expected: u32,
        actual: u32,
    },

    /// The channels served by one DMA engine need more ids than it has.
    #[error("Engine of tile {tile} needs {requested} buffer descriptors but only has {available}")]
    EngineIdsExhausted {
        tile: TileCoord,
        requested: u32,
        available: u32,
    },

    /// A distribute link must carry one offset per branch.
    #[error("Link has {branches} branches but {offsets} offsets")]
    LinkOffsetMismatch { branches: usize, offsets: usize },

    /// A link is not consistent with the channels it connects.
    #[error("Invalid link: {reason}")]
    InvalidLink { reason: String },

    /// A channel id does not belong to the network.
    #[error("Channel {id} does not exist")]
    UnknownChannel { id: ChannelId },

    /// Descriptors can only be bound to channels served by a boundary tile.
    #[error("Channel `{channel}` is not connected to a boundary tile")]
    NotHostFacing { channel: String },

    /// The schedule does not end with a barrier covering every output channel.
    #[error("The schedule does not end with a wait on every output channel, missing: {missing}")]
    MissingFinalBarrier { missing: String },

    /// The transfers of a channel do not add up to whole objects.
    #[error(
        "Channel `{channel}` moves {moved} elements, not a whole number of {object_elems}-element objects"
    )]
    PartialObjects {
        channel: String,
        moved: usize,
        object_elems: usize,
    },

    /// The schedule does not deliver what the compute tiles acquire.
    #[error(
        "Channel `{channel}` is acquired {expected} times by its compute loop but the schedule moves {scheduled} buffers"
    )]
    CadenceMismatch {
        channel: String,
        expected: usize,
        scheduled: usize,
    },
}

impl core::fmt::Debug for PlanError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

impl core::fmt::Debug for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

impl core::fmt::Debug for SchedulingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}
