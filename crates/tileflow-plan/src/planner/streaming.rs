use crate::components::{
    BufferShape, ElemType, HostBuffer, PlanError,
    access::AccessPattern,
    channel::{ChannelId, Link},
    descriptor::TransferRequest,
    partition::StreamingPartition,
    program::CoreProgram,
};

use super::PlanBuilder;

struct ColumnChannels {
    inputs: [ChannelId; 2],
    token_out: ChannelId,
}

/// Wires the streaming benchmark.
///
/// Every column receives two input streams that its staging tile broadcasts to the column's
/// compute tiles. Each compute tile answers `token_rate` bursts with one token slice, and the
/// slices of a column are joined into one token burst written back to the host.
pub(super) fn wire(builder: &mut PlanBuilder, p: &StreamingPartition) -> Result<(), PlanError> {
    let columns = (0..p.cols)
        .map(|col| wire_column(builder, p, col))
        .collect::<Result<Vec<_>, _>>()?;

    for round in 0..p.rounds {
        for (col, channels) in columns.iter().enumerate() {
            builder.transfer(TransferRequest::new(
                channels.token_out,
                HostBuffer::Tokens,
                round,
                AccessPattern::contiguous(col * p.burst_len, p.burst_len),
            ));

            // Every column replays the same source bursts.
            for input in channels.inputs {
                builder.transfer(TransferRequest::new(
                    input,
                    HostBuffer::A,
                    round,
                    AccessPattern::contiguous(0, p.token_rate as usize * p.burst_len),
                ));
            }
        }
    }

    Ok(())
}

fn wire_column(
    builder: &mut PlanBuilder,
    p: &StreamingPartition,
    col: u32,
) -> Result<ColumnChannels, PlanError> {
    let topology = builder.topology().clone();
    let (boundary, staging) = (topology.boundary(col), topology.staging(col));
    let cores = topology.compute[col as usize].clone();
    let burst = BufferShape::new(ElemType::UInt32, vec![p.burst_len]);

    let mut inputs = Vec::with_capacity(2);
    let mut broadcasts = Vec::with_capacity(2);
    for stream in 0..2 {
        let input = builder.channel(
            format!("in{stream}_{col}"),
            boundary,
            vec![staging],
            burst.clone(),
        )?;
        let broadcast = builder.channel(
            format!("bcast{stream}_{col}"),
            staging,
            cores.clone(),
            burst.clone(),
        )?;
        builder.link(Link::Broadcast {
            source: input,
            dest: broadcast,
        })?;

        inputs.push(input);
        broadcasts.push(broadcast);
    }

    let mut tokens = Vec::with_capacity(cores.len());
    for (row, core) in cores.iter().enumerate() {
        tokens.push(builder.channel(
            format!("token_{col}_{row}"),
            *core,
            vec![staging],
            BufferShape::new(ElemType::UInt32, vec![p.slice_len]),
        )?);
    }

    let token_out = builder.channel(format!("token_out_{col}"), staging, vec![boundary], burst)?;
    builder.link(Link::Distribute {
        sources: tokens.clone(),
        dests: vec![token_out],
        offsets: (0..tokens.len())
            .map(|row| row * p.slice_len * ElemType::UInt32.size())
            .collect(),
    })?;

    // Pass-through: the loops only acquire and release.
    for (core, token) in cores.iter().zip(tokens) {
        builder.program(CoreProgram {
            tile: *core,
            output: token,
            inputs: broadcasts.clone(),
            rounds: p.token_rate,
            init: None,
            body: None,
        });
    }

    Ok(ColumnChannels {
        inputs: [inputs[0], inputs[1]],
        token_out,
    })
}
