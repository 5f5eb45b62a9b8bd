//! Depth-bounded channels between tiles and the links that forward them.
//!
//! A channel moves fixed-shape objects from one producer tile to an ordered list of consumer
//! tiles through `depth` buffer slots. Links connect channels that meet on a staging tile so the
//! staging tile forwards data without an extra copy:
//! - [Link::Broadcast] forwards one channel unchanged into a channel with several consumers.
//! - [Link::Distribute] splits one channel into several, or joins several into one, each branch
//!   living at its own byte offset of the shared buffer.

use core::fmt::Display;
use hashbrown::HashMap;
use serde::Serialize;

use crate::components::{
    BufferShape, ConfigError, SchedulingError,
    access::{AccessPattern, TransferLimits},
    topology::Tile,
};

/// Index of a channel in its [ChannelNetwork].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChannelId(pub u32);

impl Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub producer: Tile,
    pub consumers: Vec<Tile>,
    /// Buffer slots, at least 2.
    pub depth: u32,
    /// Shape of one object.
    pub shape: BufferShape,
    /// Reordering applied when the staging tile streams an object out.
    pub layout: Option<AccessPattern>,
}

impl Channel {
    /// Whether a boundary tile reads or writes this channel.
    pub fn is_host_facing(&self) -> bool {
        self.producer.is_boundary() || self.is_output()
    }

    /// Whether results leave the grid through this channel.
    pub fn is_output(&self) -> bool {
        self.consumers.iter().any(Tile::is_boundary)
    }

    pub fn num_elems(&self) -> usize {
        self.shape.num_elems()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Link {
    /// `source` is forwarded as is to every consumer of `dest`.
    Broadcast { source: ChannelId, dest: ChannelId },
    /// One side is a single channel, the other holds the branches. `offsets[i]` is the byte
    /// offset of branch `i` inside the single channel.
    Distribute {
        sources: Vec<ChannelId>,
        dests: Vec<ChannelId>,
        offsets: Vec<usize>,
    },
}

impl Link {
    pub fn sources(&self) -> &[ChannelId] {
        match self {
            Link::Broadcast { source, .. } => core::slice::from_ref(source),
            Link::Distribute { sources, .. } => sources,
        }
    }

    pub fn dests(&self) -> &[ChannelId] {
        match self {
            Link::Broadcast { dest, .. } => core::slice::from_ref(dest),
            Link::Distribute { dests, .. } => dests,
        }
    }

    /// A distribute link with a single source splits it; several sources are joined.
    pub fn is_join(&self) -> bool {
        matches!(self, Link::Distribute { sources, .. } if sources.len() > 1)
    }
}

/// Owns every channel and link of a plan.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ChannelNetwork {
    channels: Vec<Channel>,
    links: Vec<Link>,
    #[serde(skip)]
    names: HashMap<String, ChannelId>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a channel from `producer` to `consumers`.
    pub fn create_channel<S: Into<String>>(
        &mut self,
        name: S,
        producer: Tile,
        consumers: Vec<Tile>,
        depth: u32,
        shape: BufferShape,
    ) -> Result<ChannelId, ConfigError> {
        let name = name.into();

        if depth < 2 {
            return Err(ConfigError::ChannelDepth {
                channel: name,
                depth,
            });
        }
        if consumers.is_empty() {
            return Err(ConfigError::EmptyConsumers { channel: name });
        }
        if self.names.contains_key(&name) {
            return Err(ConfigError::DuplicateChannel { channel: name });
        }

        let id = ChannelId(self.channels.len() as u32);
        log::trace!("Channel {id} `{name}`: {producer} -> {consumers:?}, depth {depth}");

        self.names.insert(name.clone(), id);
        self.channels.push(Channel {
            id,
            name,
            producer,
            consumers,
            depth,
            shape,
            layout: None,
        });

        Ok(id)
    }

    /// Attaches an on-chip layout to a channel.
    pub fn with_layout(
        &mut self,
        id: ChannelId,
        layout: AccessPattern,
        limits: &TransferLimits,
    ) -> Result<(), SchedulingError> {
        let channel = self
            .channels
            .get_mut(id.0 as usize)
            .ok_or(SchedulingError::UnknownChannel { id })?;

        layout
            .normalize(limits)
            .map_err(|error| SchedulingError::Layout {
                channel: channel.name.clone(),
                error,
            })?;

        channel.layout = Some(layout);
        Ok(())
    }

    /// Validates and records a link.
    pub fn link(&mut self, link: Link) -> Result<(), SchedulingError> {
        for id in link.sources().iter().chain(link.dests()) {
            self.channel(*id)?;
        }
        if link.sources().is_empty() || link.dests().is_empty() {
            return Err(invalid("a link needs at least one source and one destination"));
        }

        self.check_not_linked(&link)?;
        self.check_meeting_tile(&link)?;

        match &link {
            Link::Broadcast { source, dest } => {
                let (source, dest) = (self.channel(*source)?, self.channel(*dest)?);
                if source.shape.size_bytes() != dest.shape.size_bytes() {
                    return Err(invalid(format!(
                        "`{}` ({}) cannot be broadcast into `{}` ({})",
                        source.name, source.shape, dest.name, dest.shape
                    )));
                }
            }
            Link::Distribute {
                sources,
                dests,
                offsets,
            } => {
                let (shared, branches) = match (sources.as_slice(), dests.as_slice()) {
                    ([source], _) => (*source, dests.as_slice()),
                    (_, [dest]) => (*dest, sources.as_slice()),
                    _ => {
                        return Err(invalid(
                            "a distribute link needs a single channel on one side",
                        ));
                    }
                };
                self.check_branches(shared, branches, offsets)?;
            }
        }

        self.links.push(link);
        Ok(())
    }

    fn check_not_linked(&self, link: &Link) -> Result<(), SchedulingError> {
        let sides: [(&[ChannelId], fn(&Link) -> &[ChannelId]); 2] = [
            (link.sources(), Link::sources),
            (link.dests(), Link::dests),
        ];

        for (ids, side) in sides {
            for id in ids {
                if self.links.iter().any(|other| side(other).contains(id)) {
                    return Err(invalid(format!(
                        "`{}` is already part of a link on the same side",
                        self.channel(*id)?.name
                    )));
                }
            }
        }

        Ok(())
    }

    // Sources must drain into the tile the destinations start from.
    fn check_meeting_tile(&self, link: &Link) -> Result<(), SchedulingError> {
        let hub = self.channel(link.dests()[0])?.producer;

        for id in link.sources() {
            let source = self.channel(*id)?;
            if source.consumers.as_slice() != [hub] {
                return Err(invalid(format!(
                    "`{}` is not consumed by {hub} alone",
                    source.name
                )));
            }
        }
        for id in link.dests() {
            let dest = self.channel(*id)?;
            if dest.producer != hub {
                return Err(invalid(format!(
                    "`{}` is produced by {} instead of {hub}",
                    dest.name, dest.producer
                )));
            }
        }

        Ok(())
    }

    fn check_branches(
        &self,
        shared: ChannelId,
        branches: &[ChannelId],
        offsets: &[usize],
    ) -> Result<(), SchedulingError> {
        if branches.len() != offsets.len() {
            return Err(SchedulingError::LinkOffsetMismatch {
                branches: branches.len(),
                offsets: offsets.len(),
            });
        }

        let shared = self.channel(shared)?;
        let mut extents = Vec::with_capacity(branches.len());
        for (id, offset) in branches.iter().zip(offsets) {
            let branch = self.channel(*id)?;
            let end = offset.checked_add(branch.shape.size_bytes()).ok_or_else(|| {
                invalid(format!(
                    "`{}` at byte offset {offset} does not fit in memory",
                    branch.name
                ))
            })?;
            if end > shared.shape.size_bytes() {
                return Err(invalid(format!(
                    "`{}` spans bytes {offset}..{end} of `{}` which only has {}",
                    branch.name,
                    shared.name,
                    shared.shape.size_bytes()
                )));
            }
            extents.push((*offset, end, &branch.name));
        }

        extents.sort();
        for pair in extents.windows(2) {
            let ((_, end, first), (start, _, second)) = (&pair[0], &pair[1]);
            if end > start {
                return Err(invalid(format!(
                    "`{first}` and `{second}` overlap inside `{}`",
                    shared.name
                )));
            }
        }

        Ok(())
    }

    pub fn channel(&self, id: ChannelId) -> Result<&Channel, SchedulingError> {
        self.channels
            .get(id.0 as usize)
            .ok_or(SchedulingError::UnknownChannel { id })
    }

    pub fn channel_by_name(&self, name: &str) -> Option<&Channel> {
        self.names
            .get(name)
            .and_then(|id| self.channels.get(id.0 as usize))
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Channels served by the DMA engine of a boundary tile.
    pub fn host_facing(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|channel| channel.is_host_facing())
    }

    /// Channels drained into host memory.
    pub fn outputs(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|channel| channel.is_output())
    }

    /// Elements of one object of the channel.
    pub fn elems(&self, id: ChannelId) -> Result<usize, SchedulingError> {
        self.channel(id).map(Channel::num_elems)
    }

    /// The link feeding `id`, if any.
    pub fn link_into(&self, id: ChannelId) -> Option<&Link> {
        self.links.iter().find(|link| link.dests().contains(&id))
    }

    /// The link draining `id`, if any.
    pub fn link_from(&self, id: ChannelId) -> Option<&Link> {
        self.links.iter().find(|link| link.sources().contains(&id))
    }
}

fn invalid<S: Into<String>>(reason: S) -> SchedulingError {
    SchedulingError::InvalidLink {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ElemType, topology::Topology};

    fn shape(len: usize) -> BufferShape {
        BufferShape::new(ElemType::Int8, vec![len])
    }

    #[test]
    fn rejects_shallow_channels() {
        let topology = Topology::new(1, 1).unwrap();
        let mut network = ChannelNetwork::new();

        let err = network
            .create_channel(
                "mem_a0",
                topology.boundary(0),
                vec![topology.staging(0)],
                1,
                shape(16),
            )
            .unwrap_err();

        assert_eq!(
            err,
            ConfigError::ChannelDepth {
                channel: "mem_a0".into(),
                depth: 1
            }
        );
        assert!(network.channels().is_empty());
    }

    #[test]
    fn rejects_duplicates_and_orphans() {
        let topology = Topology::new(1, 1).unwrap();
        let mut network = ChannelNetwork::new();
        let (boundary, staging) = (topology.boundary(0), topology.staging(0));

        network
            .create_channel("mem_b", boundary, vec![staging], 2, shape(16))
            .unwrap();

        assert_eq!(
            network.create_channel("mem_b", boundary, vec![staging], 2, shape(16)),
            Err(ConfigError::DuplicateChannel {
                channel: "mem_b".into()
            })
        );
        assert_eq!(
            network.create_channel("in_b", staging, vec![], 2, shape(16)),
            Err(ConfigError::EmptyConsumers {
                channel: "in_b".into()
            })
        );
    }

    #[test]
    fn broadcast_records_every_consumer() {
        let topology = Topology::new(1, 4).unwrap();
        let cores: Vec<Tile> = topology.compute_tiles().copied().collect();
        let mut network = ChannelNetwork::new();

        let mem_b = network
            .create_channel(
                "mem_b",
                topology.boundary(0),
                vec![topology.staging(0)],
                2,
                shape(128),
            )
            .unwrap();
        let in_b = network
            .create_channel("in_b", topology.staging(0), cores.clone(), 2, shape(128))
            .unwrap();
        network
            .link(Link::Broadcast {
                source: mem_b,
                dest: in_b,
            })
            .unwrap();

        assert_eq!(network.channel(in_b).unwrap().consumers, cores);
        assert_eq!(network.link_into(in_b), network.link_from(mem_b));
        assert_eq!(network.host_facing().count(), 1);
        assert_eq!(network.elems(in_b), Ok(128));
    }

    fn split_network(rows: u32) -> (ChannelNetwork, ChannelId, Vec<ChannelId>) {
        let topology = Topology::new(1, rows).unwrap();
        let mut network = ChannelNetwork::new();

        let mem_a = network
            .create_channel(
                "mem_a0",
                topology.boundary(0),
                vec![topology.staging(0)],
                2,
                shape(64 * rows as usize),
            )
            .unwrap();
        let in_a = (0..rows)
            .map(|row| {
                network
                    .create_channel(
                        format!("in_a0_{row}"),
                        topology.staging(0),
                        vec![topology.compute(0, row)],
                        2,
                        shape(64),
                    )
                    .unwrap()
            })
            .collect();

        (network, mem_a, in_a)
    }

    #[test]
    fn distribute_needs_one_offset_per_branch() {
        let (mut network, mem_a, in_a) = split_network(4);

        let err = network
            .link(Link::Distribute {
                sources: vec![mem_a],
                dests: in_a,
                offsets: vec![0, 64, 128],
            })
            .unwrap_err();

        assert_eq!(
            err,
            SchedulingError::LinkOffsetMismatch {
                branches: 4,
                offsets: 3
            }
        );
        assert!(network.links().is_empty());
    }

    #[test]
    fn join_needs_one_offset_per_source() {
        let topology = Topology::new(1, 3).unwrap();
        let mut network = ChannelNetwork::new();
        let staging = topology.staging(0);

        let out_c: Vec<ChannelId> = (0..3)
            .map(|row| {
                network
                    .create_channel(
                        format!("out_c0_{row}"),
                        topology.compute(0, row),
                        vec![staging],
                        2,
                        shape(16),
                    )
                    .unwrap()
            })
            .collect();
        let mem_c = network
            .create_channel("mem_c0", staging, vec![topology.boundary(0)], 2, shape(48))
            .unwrap();

        let err = network
            .link(Link::Distribute {
                sources: out_c,
                dests: vec![mem_c],
                offsets: vec![0, 16],
            })
            .unwrap_err();

        assert_eq!(
            err,
            SchedulingError::LinkOffsetMismatch {
                branches: 3,
                offsets: 2
            }
        );
        assert!(network.link_into(mem_c).is_none());
    }

    #[test]
    fn distribute_rejects_offsets_past_addressable_memory() {
        let (mut network, mem_a, in_a) = split_network(2);

        let err = network
            .link(Link::Distribute {
                sources: vec![mem_a],
                dests: in_a,
                offsets: vec![0, usize::MAX],
            })
            .unwrap_err();

        assert!(matches!(err, SchedulingError::InvalidLink { .. }));
        assert!(network.links().is_empty());
    }

    #[test]
    fn distribute_rejects_overlapping_branches() {
        let (mut network, mem_a, in_a) = split_network(2);

        let err = network
            .link(Link::Distribute {
                sources: vec![mem_a],
                dests: in_a,
                offsets: vec![0, 32],
            })
            .unwrap_err();

        assert!(matches!(err, SchedulingError::InvalidLink { .. }));
    }

    #[test]
    fn distribute_rejects_branches_past_the_buffer() {
        let (mut network, mem_a, in_a) = split_network(2);

        let err = network
            .link(Link::Distribute {
                sources: vec![mem_a],
                dests: in_a,
                offsets: vec![0, 96],
            })
            .unwrap_err();

        assert!(matches!(err, SchedulingError::InvalidLink { .. }));
    }

    #[test]
    fn channels_are_linked_once() {
        let (mut network, mem_a, in_a) = split_network(2);
        let link = Link::Distribute {
            sources: vec![mem_a],
            dests: in_a,
            offsets: vec![0, 64],
        };

        network.link(link.clone()).unwrap();
        assert!(matches!(
            network.link(link),
            Err(SchedulingError::InvalidLink { .. })
        ));
    }

    #[test]
    fn links_must_meet_on_one_tile() {
        let topology = Topology::new(2, 1).unwrap();
        let mut network = ChannelNetwork::new();

        let mem_b = network
            .create_channel(
                "mem_b",
                topology.boundary(0),
                vec![topology.staging(0)],
                2,
                shape(16),
            )
            .unwrap();
        let in_b = network
            .create_channel(
                "in_b",
                topology.staging(1),
                vec![topology.compute(1, 0)],
                2,
                shape(16),
            )
            .unwrap();

        assert!(matches!(
            network.link(Link::Broadcast {
                source: mem_b,
                dest: in_b
            }),
            Err(SchedulingError::InvalidLink { .. })
        ));
    }

    #[test]
    fn layouts_respect_transfer_limits() {
        let (mut network, _, in_a) = split_network(1);
        let limits = TransferLimits::new(2, 1024);

        let err = network
            .with_layout(
                in_a[0],
                AccessPattern::from_pairs(0, &[(2, 4), (8, 8), (4, 1)]),
                &limits,
            )
            .unwrap_err();

        assert!(matches!(err, SchedulingError::Layout { .. }));
        assert!(network.channel(in_a[0]).unwrap().layout.is_none());
    }
}
