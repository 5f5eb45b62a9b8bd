use serde::Serialize;
use std::sync::Arc;
use tileflow_common::config::{GlobalConfig, Logger, planning::PlanningLogLevel};

use crate::components::{
    PlanError, PlanSelection, Workload,
    channel::{Channel, ChannelNetwork},
    descriptor::BdPool,
    device::DeviceProfile,
    partition::Partition,
    program::{CoreProgram, ExternalKernel},
    schedule::Schedule,
    topology::Topology,
};

use super::{PlanBuilder, matvec, streaming};

/// Everything the execution substrate needs to run a workload: the placed tiles, the channel
/// network with its links, the compute programs and the ordered transfers and barriers.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub profile: DeviceProfile,
    pub workload: Workload,
    pub partition: Partition,
    pub topology: Topology,
    pub network: ChannelNetwork,
    pub kernels: Vec<ExternalKernel>,
    pub programs: Vec<CoreProgram>,
    pub bd_pools: Vec<BdPool>,
    pub schedule: Schedule,
}

impl Plan {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.network.channel_by_name(name)
    }
}

/// Maps workloads onto a device.
#[derive(Debug, Clone)]
pub struct Planner {
    profile: DeviceProfile,
    selection: PlanSelection,
    config: Arc<GlobalConfig>,
}

impl Planner {
    /// Creates a planner using the global configuration.
    pub fn new(profile: DeviceProfile) -> Self {
        Self::with_config(profile, GlobalConfig::get())
    }

    pub fn with_config(profile: DeviceProfile, config: Arc<GlobalConfig>) -> Self {
        Self {
            profile,
            selection: PlanSelection::default(),
            config,
        }
    }

    /// Creates a planner for one of the built-in device profiles.
    pub fn from_profile_name(name: &str) -> Result<Self, PlanError> {
        Ok(Self::new(DeviceProfile::from_name(name)?))
    }

    pub fn with_selection(mut self, selection: PlanSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Partitions `workload`, wires it onto the grid and schedules its transfers.
    pub fn plan(&self, workload: &Workload) -> Result<Plan, PlanError> {
        let partition = Partition::new(workload, &self.profile)?;
        let depth = self
            .selection
            .depth
            .unwrap_or(self.config.planning.default_depth);

        log::debug!(
            "Planning {workload:?} on `{}` with depth {depth}",
            self.profile.name
        );

        let mut builder = PlanBuilder::new(
            self.profile.clone(),
            *workload,
            partition,
            depth,
            self.selection.granularity,
        )?;

        match &partition {
            Partition::MatVec(partition) => matvec::wire(&mut builder, partition)?,
            Partition::Streaming(partition) => streaming::wire(&mut builder, partition)?,
        }

        let plan = builder.finish(self.config.planning.verify)?;
        self.log(&plan);

        Ok(plan)
    }

    fn log(&self, plan: &Plan) {
        let mut logger = Logger::from_config(self.config.clone());
        if !logger.is_enabled() {
            return;
        }

        let level = logger.log_level_planning();
        if matches!(level, PlanningLogLevel::Basic | PlanningLogLevel::Full) {
            logger.log_planning(&format!(
                "[{}] {:?}: {} tiles, {} channels, {} links, {} transfers, {} barriers",
                plan.profile.name,
                plan.workload,
                plan.topology.num_tiles(),
                plan.network.channels().len(),
                plan.network.links().len(),
                plan.schedule.transfers().count(),
                plan.schedule.barriers().count(),
            ));
        }

        if matches!(level, PlanningLogLevel::Full) {
            for entry in plan.schedule.entries() {
                logger.log_planning(entry);
            }
        }
    }
}
