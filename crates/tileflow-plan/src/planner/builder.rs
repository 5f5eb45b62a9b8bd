use crate::components::{
    BufferShape, PlanError, TransferGranularity, Workload,
    access::{AccessPattern, TransferLimits},
    channel::{ChannelId, ChannelNetwork, Link},
    descriptor::{BdAllocator, DescriptorScheduler, TransferRequest},
    device::DeviceProfile,
    partition::Partition,
    program::{CoreProgram, ExternalKernel, check_cadence},
    sync::SyncScheduler,
    topology::{Tile, Topology},
};

use super::Plan;

/// Accumulates the parts of a plan while a workload is wired onto the grid.
///
/// Channels, links, kernels, programs and transfer requests are recorded in program order, then
/// [finish](PlanBuilder::finish) turns the requests into a synchronized schedule.
pub struct PlanBuilder {
    profile: DeviceProfile,
    workload: Workload,
    partition: Partition,
    topology: Topology,
    depth: u32,
    granularity: TransferGranularity,
    network: ChannelNetwork,
    kernels: Vec<ExternalKernel>,
    programs: Vec<CoreProgram>,
    requests: Vec<TransferRequest>,
}

impl PlanBuilder {
    pub fn new(
        profile: DeviceProfile,
        workload: Workload,
        partition: Partition,
        depth: u32,
        granularity: TransferGranularity,
    ) -> Result<Self, PlanError> {
        let topology = Topology::new(partition.cols(), partition.rows())?;

        Ok(Self {
            profile,
            workload,
            partition,
            topology,
            depth,
            granularity,
            network: ChannelNetwork::new(),
            kernels: Vec::new(),
            programs: Vec::new(),
            requests: Vec::new(),
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn granularity(&self) -> TransferGranularity {
        self.granularity
    }

    pub fn limits(&self) -> TransferLimits {
        self.profile.transfer_limits()
    }

    /// Declares a channel with the plan's buffering depth.
    pub fn channel<S: Into<String>>(
        &mut self,
        name: S,
        producer: Tile,
        consumers: Vec<Tile>,
        shape: BufferShape,
    ) -> Result<ChannelId, PlanError> {
        Ok(self
            .network
            .create_channel(name, producer, consumers, self.depth, shape)?)
    }

    pub fn layout(&mut self, channel: ChannelId, layout: AccessPattern) -> Result<(), PlanError> {
        let limits = self.limits();
        Ok(self.network.with_layout(channel, layout, &limits)?)
    }

    pub fn link(&mut self, link: Link) -> Result<(), PlanError> {
        Ok(self.network.link(link)?)
    }

    pub fn kernel(&mut self, kernel: ExternalKernel) {
        self.kernels.push(kernel);
    }

    pub fn program(&mut self, program: CoreProgram) {
        self.programs.push(program);
    }

    pub fn transfer(&mut self, request: TransferRequest) {
        self.requests.push(request);
    }

    /// Binds the transfer requests to descriptors, synchronizes them and, when `verify` is set,
    /// replays the schedule and checks it against the compute loops.
    pub fn finish(self, verify: bool) -> Result<Plan, PlanError> {
        for program in self.programs.iter() {
            program.check_signatures(&self.kernels, &self.network)?;
        }

        let allocator = BdAllocator::from_network(&self.network, self.profile.bd_ids_per_engine)?;
        let mut descriptors = DescriptorScheduler::new(
            &self.network,
            &allocator,
            self.limits(),
            self.workload.host_arguments(),
        );
        for request in self.requests {
            descriptors.emit(request)?;
        }
        let descriptors = descriptors.finish();

        let bd_pools = allocator.pools();
        let schedule = SyncScheduler::schedule(&self.network, &bd_pools, descriptors)?;

        if verify {
            schedule.verify(&self.network, &bd_pools)?;
            check_cadence(
                &self.programs,
                self.partition.iterations(),
                &self.network,
                &schedule,
            )?;
        }

        Ok(Plan {
            profile: self.profile,
            workload: self.workload,
            partition: self.partition,
            topology: self.topology,
            network: self.network,
            kernels: self.kernels,
            programs: self.programs,
            bd_pools,
            schedule,
        })
    }
}
