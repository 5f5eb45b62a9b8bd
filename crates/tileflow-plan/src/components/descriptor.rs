//! Strided transfer descriptors between host buffers and boundary channels.

use core::fmt::Display;
use hashbrown::HashMap;
use serde::Serialize;

use crate::components::{
    HostArgument, HostBuffer, SchedulingError,
    access::{AccessPattern, TransferLimits},
    channel::{Channel, ChannelId, ChannelNetwork},
    topology::TileCoord,
};

/// Buffer descriptor ids reserved for one host-facing channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BdPool {
    pub channel: ChannelId,
    /// Boundary tile whose DMA engine owns the ids.
    pub engine: TileCoord,
    pub ids: Vec<u32>,
}

impl BdPool {
    /// Id used by the `index`-th transfer on the channel.
    pub fn id_at(&self, index: usize) -> u32 {
        self.ids[index % self.ids.len()]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Hands out contiguous id ranges from the fixed id space of every DMA engine.
#[derive(Debug)]
pub struct BdAllocator {
    ids_per_engine: u32,
    next_free: HashMap<TileCoord, u32>,
    pools: HashMap<ChannelId, BdPool>,
}

impl BdAllocator {
    pub fn new(ids_per_engine: u32) -> Self {
        Self {
            ids_per_engine,
            next_free: HashMap::new(),
            pools: HashMap::new(),
        }
    }

    /// Reserves a pool for every host-facing channel, in channel order.
    pub fn from_network(
        network: &ChannelNetwork,
        ids_per_engine: u32,
    ) -> Result<Self, SchedulingError> {
        let mut allocator = Self::new(ids_per_engine);
        for channel in network.host_facing() {
            allocator.allocate(channel)?;
        }
        Ok(allocator)
    }

    /// Reserves `depth` ids for `channel` on the engine that serves it.
    pub fn allocate(&mut self, channel: &Channel) -> Result<&BdPool, SchedulingError> {
        let engine = engine_of(channel).ok_or_else(|| SchedulingError::NotHostFacing {
            channel: channel.name.clone(),
        })?;

        let next_free = self.next_free.entry(engine).or_insert(0);
        let end = *next_free + channel.depth;
        if end > self.ids_per_engine {
            return Err(SchedulingError::EngineIdsExhausted {
                tile: engine,
                requested: end,
                available: self.ids_per_engine,
            });
        }

        let ids = (*next_free..end).collect();
        *next_free = end;

        log::debug!("Channel `{}` owns ids {ids:?} of engine {engine}", channel.name);

        Ok(self.pools.entry(channel.id).or_insert(BdPool {
            channel: channel.id,
            engine,
            ids,
        }))
    }

    pub fn pool(&self, channel: ChannelId) -> Option<&BdPool> {
        self.pools.get(&channel)
    }

    /// Every pool, ordered by channel.
    pub fn pools(&self) -> Vec<BdPool> {
        let mut pools: Vec<BdPool> = self.pools.values().cloned().collect();
        pools.sort_by_key(|pool| pool.channel);
        pools
    }
}

fn engine_of(channel: &Channel) -> Option<TileCoord> {
    if channel.producer.is_boundary() {
        return Some(channel.producer.coord);
    }

    channel
        .consumers
        .iter()
        .find(|tile| tile.is_boundary())
        .map(|tile| tile.coord)
}

/// A transfer to bind to a channel before normalization and id assignment.
#[derive(new, Clone, Debug)]
pub struct TransferRequest {
    pub channel: ChannelId,
    pub buffer: HostBuffer,
    pub round: u32,
    pub pattern: AccessPattern,
}

/// One strided transfer, ready to hand over to a DMA engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StridedDescriptor {
    pub channel: ChannelId,
    pub buffer: HostBuffer,
    pub round: u32,
    pub bd_id: u32,
    pub pattern: AccessPattern,
}

impl Display for StridedDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "transfer {} round {} bd {} {} {}",
            self.channel, self.round, self.bd_id, self.buffer, self.pattern
        )
    }
}

/// Binds transfer requests to host-facing channels in program order.
pub struct DescriptorScheduler<'a> {
    network: &'a ChannelNetwork,
    allocator: &'a BdAllocator,
    limits: TransferLimits,
    arguments: Vec<HostArgument>,
    issued: HashMap<ChannelId, usize>,
    descriptors: Vec<StridedDescriptor>,
}

impl<'a> DescriptorScheduler<'a> {
    pub fn new(
        network: &'a ChannelNetwork,
        allocator: &'a BdAllocator,
        limits: TransferLimits,
        arguments: Vec<HostArgument>,
    ) -> Self {
        Self {
            network,
            allocator,
            limits,
            arguments,
            issued: HashMap::new(),
            descriptors: Vec::new(),
        }
    }

    /// Normalizes the request, checks it against its host buffer and assigns the next id of the
    /// channel's pool. Empty transfers are dropped.
    pub fn emit(&mut self, request: TransferRequest) -> Result<(), SchedulingError> {
        let (network, allocator) = (self.network, self.allocator);
        let channel = network.channel(request.channel)?;
        let pool = allocator
            .pool(request.channel)
            .filter(|_| channel.is_host_facing())
            .ok_or_else(|| SchedulingError::NotHostFacing {
                channel: channel.name.clone(),
            })?;

        if request.pattern.is_empty() {
            log::debug!(
                "Skipping empty transfer on `{}` (round {})",
                channel.name,
                request.round
            );
            return Ok(());
        }

        let pattern = request.pattern.normalize(&self.limits).map_err(|error| {
            SchedulingError::DimensionLimit {
                channel: channel.name.clone(),
                round: request.round,
                error,
            }
        })?;

        let len = self
            .arguments
            .iter()
            .find(|argument| argument.buffer == request.buffer)
            .map(HostArgument::len)
            .unwrap_or(0);
        if let Some(last) = pattern.last_offset()
            && last >= len
        {
            return Err(SchedulingError::OutOfBounds {
                channel: channel.name.clone(),
                round: request.round,
                last,
                len,
            });
        }

        let issued = self.issued.entry(request.channel).or_insert(0);
        let bd_id = pool.id_at(*issued);
        *issued += 1;

        self.descriptors.push(StridedDescriptor {
            channel: request.channel,
            buffer: request.buffer,
            round: request.round,
            bd_id,
            pattern,
        });

        Ok(())
    }

    pub fn descriptors(&self) -> &[StridedDescriptor] {
        &self.descriptors
    }

    pub fn finish(self) -> Vec<StridedDescriptor> {
        self.descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{BufferShape, ElemType, access::Dim, topology::Topology};

    struct Fixture {
        network: ChannelNetwork,
        mem_a: ChannelId,
        in_a: ChannelId,
        mem_c: ChannelId,
    }

    fn fixture(depth: u32) -> Fixture {
        let topology = Topology::new(1, 1).unwrap();
        let mut network = ChannelNetwork::new();
        let shape = BufferShape::new(ElemType::Int8, vec![64]);

        let mem_a = network
            .create_channel(
                "mem_a0",
                topology.boundary(0),
                vec![topology.staging(0)],
                depth,
                shape.clone(),
            )
            .unwrap();
        let in_a = network
            .create_channel(
                "in_a0_0",
                topology.staging(0),
                vec![topology.compute(0, 0)],
                depth,
                shape.clone(),
            )
            .unwrap();
        let mem_c = network
            .create_channel(
                "mem_c0",
                topology.staging(0),
                vec![topology.boundary(0)],
                depth,
                shape,
            )
            .unwrap();

        Fixture {
            network,
            mem_a,
            in_a,
            mem_c,
        }
    }

    fn arguments() -> Vec<HostArgument> {
        vec![
            HostArgument::new(HostBuffer::A, BufferShape::new(ElemType::Int8, vec![1024])),
            HostArgument::new(HostBuffer::C, BufferShape::new(ElemType::Int32, vec![64])),
        ]
    }

    fn limits() -> TransferLimits {
        TransferLimits::new(4, 1024)
    }

    #[test]
    fn pools_are_contiguous_per_engine() {
        let f = fixture(3);
        let allocator = BdAllocator::from_network(&f.network, 16).unwrap();

        assert_eq!(allocator.pool(f.mem_a).unwrap().ids, vec![0, 1, 2]);
        assert_eq!(allocator.pool(f.mem_c).unwrap().ids, vec![3, 4, 5]);
        assert!(allocator.pool(f.in_a).is_none());
        assert_eq!(allocator.pools().len(), 2);
    }

    #[test]
    fn engine_ids_run_out() {
        let f = fixture(8);
        let err = BdAllocator::from_network(&f.network, 12).unwrap_err();

        assert_eq!(
            err,
            SchedulingError::EngineIdsExhausted {
                tile: TileCoord::new(0, 0),
                requested: 16,
                available: 12
            }
        );
    }

    #[test]
    fn ids_cycle_with_channel_depth() {
        let f = fixture(3);
        let allocator = BdAllocator::from_network(&f.network, 16).unwrap();
        let mut scheduler = DescriptorScheduler::new(&f.network, &allocator, limits(), arguments());

        for round in 0..7 {
            scheduler
                .emit(TransferRequest::new(
                    f.mem_a,
                    HostBuffer::A,
                    round,
                    AccessPattern::contiguous(round as usize * 64, 64),
                ))
                .unwrap();
        }

        let ids: Vec<u32> = scheduler.finish().iter().map(|d| d.bd_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn patterns_are_normalized() {
        let f = fixture(2);
        let allocator = BdAllocator::from_network(&f.network, 16).unwrap();
        let mut scheduler = DescriptorScheduler::new(&f.network, &allocator, limits(), arguments());

        scheduler
            .emit(TransferRequest::new(
                f.mem_c,
                HostBuffer::C,
                0,
                AccessPattern::from_pairs(0, &[(1, 0), (2, 32), (32, 1)]),
            ))
            .unwrap();

        assert_eq!(scheduler.descriptors()[0].pattern.dims, vec![Dim::new(64, 1)]);
    }

    #[test]
    fn empty_transfers_are_omitted() {
        let f = fixture(2);
        let allocator = BdAllocator::from_network(&f.network, 16).unwrap();
        let mut scheduler = DescriptorScheduler::new(&f.network, &allocator, limits(), arguments());

        scheduler
            .emit(TransferRequest::new(
                f.mem_a,
                HostBuffer::A,
                0,
                AccessPattern::contiguous(0, 0),
            ))
            .unwrap();
        scheduler
            .emit(TransferRequest::new(
                f.mem_a,
                HostBuffer::A,
                1,
                AccessPattern::contiguous(0, 64),
            ))
            .unwrap();

        let descriptors = scheduler.finish();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].bd_id, 0);
    }

    #[test]
    fn transfers_stay_inside_host_buffers() {
        let f = fixture(2);
        let allocator = BdAllocator::from_network(&f.network, 16).unwrap();
        let mut scheduler = DescriptorScheduler::new(&f.network, &allocator, limits(), arguments());

        let err = scheduler
            .emit(TransferRequest::new(
                f.mem_c,
                HostBuffer::C,
                2,
                AccessPattern::contiguous(32, 64),
            ))
            .unwrap_err();

        assert_eq!(
            err,
            SchedulingError::OutOfBounds {
                channel: "mem_c0".into(),
                round: 2,
                last: 95,
                len: 64
            }
        );
    }

    #[test]
    fn on_chip_channels_take_no_descriptor() {
        let f = fixture(2);
        let allocator = BdAllocator::from_network(&f.network, 16).unwrap();
        let mut scheduler = DescriptorScheduler::new(&f.network, &allocator, limits(), arguments());

        let err = scheduler
            .emit(TransferRequest::new(
                f.in_a,
                HostBuffer::A,
                0,
                AccessPattern::contiguous(0, 64),
            ))
            .unwrap_err();

        assert_eq!(
            err,
            SchedulingError::NotHostFacing {
                channel: "in_a0_0".into()
            }
        );
    }

    #[test]
    fn oversized_patterns_fail_with_their_round() {
        let f = fixture(2);
        let allocator = BdAllocator::from_network(&f.network, 16).unwrap();
        let mut scheduler = DescriptorScheduler::new(
            &f.network,
            &allocator,
            TransferLimits::new(1, 1024),
            arguments(),
        );

        let err = scheduler
            .emit(TransferRequest::new(
                f.mem_a,
                HostBuffer::A,
                5,
                AccessPattern::from_pairs(0, &[(2, 128), (64, 1)]),
            ))
            .unwrap_err();

        assert!(matches!(
            err,
            SchedulingError::DimensionLimit { round: 5, .. }
        ));
    }
}
