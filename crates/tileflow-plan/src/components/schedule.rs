use core::fmt::Display;
use hashbrown::HashMap;
use serde::Serialize;

use crate::components::{
    SchedulingError,
    channel::{ChannelId, ChannelNetwork},
    descriptor::{BdPool, StridedDescriptor},
};

/// Blocks until every outstanding transfer of the listed channels has completed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WaitBarrier {
    /// Sorted, without duplicates.
    pub channels: Vec<ChannelId>,
}

impl WaitBarrier {
    pub fn new<I: IntoIterator<Item = ChannelId>>(channels: I) -> Self {
        let mut channels: Vec<ChannelId> = channels.into_iter().collect();
        channels.sort();
        channels.dedup();
        Self { channels }
    }

    pub fn covers(&self, channel: ChannelId) -> bool {
        self.channels.binary_search(&channel).is_ok()
    }
}

impl Display for WaitBarrier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("wait")?;
        for channel in self.channels.iter() {
            write!(f, " {channel}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleEntry {
    Transfer(StridedDescriptor),
    Wait(WaitBarrier),
}

impl Display for ScheduleEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ScheduleEntry::Transfer(descriptor) => descriptor.fmt(f),
            ScheduleEntry::Wait(barrier) => barrier.fmt(f),
        }
    }
}

/// Transfers and barriers in program order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn transfers(&self) -> impl Iterator<Item = &StridedDescriptor> {
        self.entries.iter().filter_map(|entry| match entry {
            ScheduleEntry::Transfer(descriptor) => Some(descriptor),
            ScheduleEntry::Wait(_) => None,
        })
    }

    pub fn barriers(&self) -> impl Iterator<Item = &WaitBarrier> {
        self.entries.iter().filter_map(|entry| match entry {
            ScheduleEntry::Wait(barrier) => Some(barrier),
            ScheduleEntry::Transfer(_) => None,
        })
    }

    /// Transfers bound to `channel`, in program order.
    pub fn transfers_on(&self, channel: ChannelId) -> impl Iterator<Item = &StridedDescriptor> {
        self.transfers()
            .filter(move |descriptor| descriptor.channel == channel)
    }

    pub fn last_barrier(&self) -> Option<&WaitBarrier> {
        match self.entries.last() {
            Some(ScheduleEntry::Wait(barrier)) => Some(barrier),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replays the schedule through a strict [ScheduleBuilder].
    pub fn verify(
        &self,
        network: &ChannelNetwork,
        pools: &[BdPool],
    ) -> Result<(), SchedulingError> {
        let mut builder = ScheduleBuilder::new(network, pools);
        for entry in self.entries.iter() {
            match entry {
                ScheduleEntry::Transfer(descriptor) => builder.transfer(descriptor.clone())?,
                ScheduleEntry::Wait(barrier) => builder.wait(barrier.clone()),
            }
        }
        builder.finish().map(|_| ())
    }
}

/// Appends entries while tracking which buffer descriptor ids are still owned by transfers
/// that no barrier has retired.
pub struct ScheduleBuilder<'a> {
    network: &'a ChannelNetwork,
    pools: HashMap<ChannelId, &'a BdPool>,
    in_flight: HashMap<ChannelId, usize>,
    issued: HashMap<ChannelId, usize>,
    entries: Vec<ScheduleEntry>,
}

impl<'a> ScheduleBuilder<'a> {
    pub fn new(network: &'a ChannelNetwork, pools: &'a [BdPool]) -> Self {
        Self {
            network,
            pools: pools.iter().map(|pool| (pool.channel, pool)).collect(),
            in_flight: HashMap::new(),
            issued: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Appends a transfer.
    ///
    /// Fails if every id of the channel's pool is still in flight, or if the descriptor does not
    /// use the next id of the pool.
    pub fn transfer(&mut self, descriptor: StridedDescriptor) -> Result<(), SchedulingError> {
        let network = self.network;
        let channel = network.channel(descriptor.channel)?;
        let pool = *self
            .pools
            .get(&descriptor.channel)
            .ok_or_else(|| SchedulingError::NotHostFacing {
                channel: channel.name.clone(),
            })?;

        let in_flight = self.in_flight.entry(descriptor.channel).or_insert(0);
        if *in_flight >= pool.len() {
            return Err(SchedulingError::BdPoolExhausted {
                channel: channel.name.clone(),
                round: descriptor.round,
                pool_size: pool.len(),
            });
        }

        let issued = self.issued.entry(descriptor.channel).or_insert(0);
        let expected = pool.id_at(*issued);
        if descriptor.bd_id != expected {
            return Err(SchedulingError::BdIdMismatch {
                channel: channel.name.clone(),
                round: descriptor.round,
                expected,
                actual: descriptor.bd_id,
            });
        }

        *in_flight += 1;
        *issued += 1;
        self.entries.push(ScheduleEntry::Transfer(descriptor));

        Ok(())
    }

    /// Appends a barrier, retiring every id owned by the covered channels.
    pub fn wait(&mut self, barrier: WaitBarrier) {
        for channel in barrier.channels.iter() {
            self.in_flight.remove(channel);
        }
        self.entries.push(ScheduleEntry::Wait(barrier));
    }

    /// Transfers on `channel` not yet retired by a barrier.
    pub fn in_flight(&self, channel: ChannelId) -> usize {
        self.in_flight.get(&channel).copied().unwrap_or(0)
    }

    /// Whether the next transfer on `channel` would need a barrier first.
    pub fn is_full(&self, channel: ChannelId) -> bool {
        self.pools
            .get(&channel)
            .is_some_and(|pool| self.in_flight(channel) >= pool.len())
    }

    /// Channels with every id in flight, sorted.
    pub fn full_channels(&self) -> Vec<ChannelId> {
        let mut full: Vec<ChannelId> = self
            .in_flight
            .keys()
            .copied()
            .filter(|channel| self.is_full(*channel))
            .collect();
        full.sort();
        full
    }

    /// Returns the schedule once it ends with barriers covering every output channel.
    pub fn finish(self) -> Result<Schedule, SchedulingError> {
        let trailing: Vec<&WaitBarrier> = self
            .entries
            .iter()
            .rev()
            .map_while(|entry| match entry {
                ScheduleEntry::Wait(barrier) => Some(barrier),
                ScheduleEntry::Transfer(_) => None,
            })
            .collect();

        let missing: Vec<&str> = self
            .network
            .outputs()
            .filter(|channel| !trailing.iter().any(|barrier| barrier.covers(channel.id)))
            .map(|channel| channel.name.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(SchedulingError::MissingFinalBarrier {
                missing: missing.join(", "),
            });
        }

        Ok(Schedule {
            entries: self.entries,
        })
    }
}
