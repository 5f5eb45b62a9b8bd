use crate::components::{
    SchedulingError,
    channel::ChannelNetwork,
    descriptor::{BdPool, StridedDescriptor},
    schedule::{Schedule, ScheduleBuilder, WaitBarrier},
};

/// Interleaves wait barriers with descriptors so that no buffer descriptor id is reused while
/// its previous transfer may still be running.
///
/// Barriers are only placed at pipeline fill boundaries: when the next descriptor targets a
/// channel whose ids are all in flight, a single barrier retires every channel that is full at
/// that point. The schedule always ends with a barrier over every output channel.
pub struct SyncScheduler<'a> {
    network: &'a ChannelNetwork,
    builder: ScheduleBuilder<'a>,
}

impl<'a> SyncScheduler<'a> {
    pub fn new(network: &'a ChannelNetwork, pools: &'a [BdPool]) -> Self {
        Self {
            network,
            builder: ScheduleBuilder::new(network, pools),
        }
    }

    pub fn push(&mut self, descriptor: StridedDescriptor) -> Result<(), SchedulingError> {
        if self.builder.is_full(descriptor.channel) {
            let barrier = WaitBarrier::new(self.builder.full_channels());
            log::debug!("Round {}: {barrier}", descriptor.round);
            self.builder.wait(barrier);
        }

        self.builder.transfer(descriptor)
    }

    pub fn finish(mut self) -> Result<Schedule, SchedulingError> {
        let outputs = WaitBarrier::new(self.network.outputs().map(|channel| channel.id));
        self.builder.wait(outputs);
        self.builder.finish()
    }

    /// Schedules `descriptors` in order.
    pub fn schedule(
        network: &'a ChannelNetwork,
        pools: &'a [BdPool],
        descriptors: Vec<StridedDescriptor>,
    ) -> Result<Schedule, SchedulingError> {
        let mut scheduler = Self::new(network, pools);
        for descriptor in descriptors {
            scheduler.push(descriptor)?;
        }
        scheduler.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        BufferShape, ElemType, HostBuffer,
        access::AccessPattern,
        channel::ChannelId,
        descriptor::BdAllocator,
        schedule::ScheduleEntry,
        topology::Topology,
    };

    struct Fixture {
        network: ChannelNetwork,
        pools: Vec<BdPool>,
        inputs: Vec<ChannelId>,
        output: ChannelId,
    }

    fn fixture(depth: u32) -> Fixture {
        let topology = Topology::new(2, 1).unwrap();
        let mut network = ChannelNetwork::new();
        let shape = BufferShape::new(ElemType::UInt32, vec![16]);

        let inputs = (0..2)
            .map(|col| {
                network
                    .create_channel(
                        format!("in0_{col}"),
                        topology.boundary(col),
                        vec![topology.staging(col)],
                        depth,
                        shape.clone(),
                    )
                    .unwrap()
            })
            .collect();
        let output = network
            .create_channel(
                "token_out_0",
                topology.staging(0),
                vec![topology.boundary(0)],
                depth,
                shape,
            )
            .unwrap();
        let pools = BdAllocator::from_network(&network, 16).unwrap().pools();

        Fixture {
            network,
            pools,
            inputs,
            output,
        }
    }

    fn descriptors(f: &Fixture, rounds: u32) -> Vec<StridedDescriptor> {
        let mut descriptors = Vec::new();
        let mut issued = vec![0; f.network.channels().len()];

        for round in 0..rounds {
            for channel in f.inputs.iter().chain([&f.output]) {
                let pool = f.pools.iter().find(|pool| pool.channel == *channel).unwrap();
                let index = &mut issued[channel.0 as usize];
                descriptors.push(StridedDescriptor {
                    channel: *channel,
                    buffer: HostBuffer::A,
                    round,
                    bd_id: pool.id_at(*index),
                    pattern: AccessPattern::contiguous(0, 16),
                });
                *index += 1;
            }
        }

        descriptors
    }

    fn barrier_positions(schedule: &Schedule) -> Vec<usize> {
        schedule
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, entry)| matches!(entry, ScheduleEntry::Wait(_)))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn waits_only_at_fill_boundaries() {
        let f = fixture(2);
        let schedule = SyncScheduler::schedule(&f.network, &f.pools, descriptors(&f, 5)).unwrap();

        // Three transfers per round, a barrier every two rounds and a final one.
        assert_eq!(barrier_positions(&schedule), vec![6, 13, 17]);
        schedule.verify(&f.network, &f.pools).unwrap();
    }

    #[test]
    fn barrier_covers_every_full_channel() {
        let f = fixture(2);
        let schedule = SyncScheduler::schedule(&f.network, &f.pools, descriptors(&f, 3)).unwrap();

        let first = schedule.barriers().next().unwrap();
        assert_eq!(first.channels, vec![f.inputs[0], f.inputs[1], f.output]);
    }

    #[test]
    fn deeper_channels_wait_less() {
        let f = fixture(3);
        let schedule = SyncScheduler::schedule(&f.network, &f.pools, descriptors(&f, 4)).unwrap();

        assert_eq!(barrier_positions(&schedule), vec![9, 13]);
        schedule.verify(&f.network, &f.pools).unwrap();
    }

    #[test]
    fn single_round_still_ends_with_a_wait() {
        let f = fixture(2);
        let schedule = SyncScheduler::schedule(&f.network, &f.pools, descriptors(&f, 1)).unwrap();

        assert_eq!(schedule.len(), 4);
        assert_eq!(schedule.last_barrier().unwrap().channels, vec![f.output]);
    }
}
