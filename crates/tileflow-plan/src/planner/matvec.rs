use crate::components::{
    BufferShape, ElemType, HostBuffer, PlanError, TransferGranularity,
    access::AccessPattern,
    channel::{ChannelId, Link},
    descriptor::TransferRequest,
    partition::MatVecPartition,
    program::{CoreProgram, ExternalKernel, KernelCall},
};

use super::PlanBuilder;

const KERNEL_OBJECT: &str = "mvm_i8.o";
const ZERO_KERNEL: &str = "zero_m_int8";
const MATVEC_KERNEL: &str = "mv_int8";

struct ColumnChannels {
    mem_a: ChannelId,
    in_a: Vec<ChannelId>,
    out_c: Vec<ChannelId>,
    mem_c: ChannelId,
}

/// Wires a matrix-vector workload.
///
/// Every column streams its rows of A through its staging tile, which splits each block into one
/// tile per compute row. B is read once by the first column and broadcast to every compute tile.
/// Partial results of the compute rows are joined back into one block per column.
pub(super) fn wire(builder: &mut PlanBuilder, p: &MatVecPartition) -> Result<(), PlanError> {
    let a_tile = BufferShape::new(ElemType::Int8, vec![p.tile_m, p.tile_k]);
    let b_tile = BufferShape::new(ElemType::Int8, vec![p.tile_k]);
    let c_tile = BufferShape::new(ElemType::Int32, vec![p.tile_m]);

    let columns = (0..p.cols)
        .map(|col| wire_column(builder, p, col, &a_tile, &c_tile))
        .collect::<Result<Vec<_>, _>>()?;

    let (mem_b, in_b) = wire_vector(builder, &b_tile)?;

    builder.kernel(ExternalKernel::new(
        ZERO_KERNEL.into(),
        KERNEL_OBJECT.into(),
        vec![c_tile.clone()],
    ));
    builder.kernel(ExternalKernel::new(
        MATVEC_KERNEL.into(),
        KERNEL_OBJECT.into(),
        vec![a_tile, b_tile, c_tile],
    ));

    for (col, channels) in columns.iter().enumerate() {
        for row in 0..p.rows as usize {
            let (in_a, out_c) = (channels.in_a[row], channels.out_c[row]);
            let tile = builder.topology().compute(col as u32, row as u32);
            builder.program(CoreProgram {
                tile,
                output: out_c,
                inputs: vec![in_a, in_b],
                rounds: p.rounds,
                init: Some(KernelCall::new(ZERO_KERNEL.into(), vec![out_c])),
                body: Some(KernelCall::new(
                    MATVEC_KERNEL.into(),
                    vec![in_a, in_b, out_c],
                )),
            });
        }
    }

    match builder.granularity() {
        TransferGranularity::PerBlock => transfers_per_block(builder, p, &columns, mem_b),
        TransferGranularity::PerRound => transfers_per_round(builder, p, &columns, mem_b),
        TransferGranularity::Coalesced => transfers_coalesced(builder, p, &columns, mem_b),
    }

    Ok(())
}

fn wire_column(
    builder: &mut PlanBuilder,
    p: &MatVecPartition,
    col: u32,
    a_tile: &BufferShape,
    c_tile: &BufferShape,
) -> Result<ColumnChannels, PlanError> {
    let topology = builder.topology().clone();
    let (boundary, staging) = (topology.boundary(col), topology.staging(col));
    let tile_elems = p.tile_m * p.tile_k;

    let mem_a = builder.channel(
        format!("mem_a{col}"),
        boundary,
        vec![staging],
        BufferShape::new(ElemType::Int8, vec![p.rows as usize * tile_elems]),
    )?;

    let mut in_a = Vec::with_capacity(p.rows as usize);
    for row in 0..p.rows {
        let channel = builder.channel(
            format!("in_a{col}_{row}"),
            staging,
            vec![topology.compute(col, row)],
            a_tile.clone(),
        )?;
        // Groups of four columns, row by row, as the kernel reads them.
        builder.layout(
            channel,
            AccessPattern::from_pairs(
                0,
                &[(p.tile_k / 4, 4), (p.tile_m, p.tile_k), (4, 1)],
            ),
        )?;
        in_a.push(channel);
    }

    builder.link(Link::Distribute {
        sources: vec![mem_a],
        dests: in_a.clone(),
        offsets: (0..p.rows as usize)
            .map(|row| row * tile_elems * ElemType::Int8.size())
            .collect(),
    })?;

    let mut out_c = Vec::with_capacity(p.rows as usize);
    for row in 0..p.rows {
        out_c.push(builder.channel(
            format!("out_c{col}_{row}"),
            topology.compute(col, row),
            vec![staging],
            c_tile.clone(),
        )?);
    }

    let mem_c = builder.channel(
        format!("mem_c{col}"),
        staging,
        vec![boundary],
        BufferShape::new(ElemType::Int32, vec![p.block_rows]),
    )?;

    builder.link(Link::Distribute {
        sources: out_c.clone(),
        dests: vec![mem_c],
        offsets: (0..p.rows as usize)
            .map(|row| row * p.tile_m * ElemType::Int32.size())
            .collect(),
    })?;

    Ok(ColumnChannels {
        mem_a,
        in_a,
        out_c,
        mem_c,
    })
}

fn wire_vector(
    builder: &mut PlanBuilder,
    b_tile: &BufferShape,
) -> Result<(ChannelId, ChannelId), PlanError> {
    let topology = builder.topology().clone();

    let mem_b = builder.channel(
        "mem_b",
        topology.boundary(0),
        vec![topology.staging(0)],
        b_tile.clone(),
    )?;
    let in_b = builder.channel(
        "in_b",
        topology.staging(0),
        topology.compute_tiles().copied().collect(),
        b_tile.clone(),
    )?;

    builder.link(Link::Broadcast {
        source: mem_b,
        dest: in_b,
    })?;

    Ok((mem_b, in_b))
}

// Results are drained once per column, before any input is streamed in.
fn transfers_output(builder: &mut PlanBuilder, p: &MatVecPartition, columns: &[ColumnChannels]) {
    for (col, channels) in columns.iter().enumerate() {
        builder.transfer(TransferRequest::new(
            channels.mem_c,
            HostBuffer::C,
            0,
            AccessPattern::from_pairs(
                col * p.rows_per_column,
                &[
                    (p.blocks_per_column as usize, p.block_rows),
                    (p.block_rows, 1),
                ],
            ),
        ));
    }
}

fn transfers_per_block(
    builder: &mut PlanBuilder,
    p: &MatVecPartition,
    columns: &[ColumnChannels],
    mem_b: ChannelId,
) {
    transfers_output(builder, p, columns);

    for block in 0..p.blocks_per_column {
        builder.transfer(TransferRequest::new(
            mem_b,
            HostBuffer::B,
            block,
            AccessPattern::contiguous(0, p.k_total),
        ));

        // Rounds outermost so the column receives its K tiles in the order the cores consume them.
        for (col, channels) in columns.iter().enumerate() {
            let row_offset = col * p.rows_per_column + block as usize * p.block_rows;
            builder.transfer(TransferRequest::new(
                channels.mem_a,
                HostBuffer::A,
                block,
                AccessPattern::from_pairs(
                    row_offset * p.k_total,
                    &[
                        (p.rounds as usize, p.tile_k),
                        (p.block_rows, p.k_total),
                        (p.tile_k, 1),
                    ],
                ),
            ));
        }
    }
}

fn transfers_per_round(
    builder: &mut PlanBuilder,
    p: &MatVecPartition,
    columns: &[ColumnChannels],
    mem_b: ChannelId,
) {
    transfers_output(builder, p, columns);

    for block in 0..p.blocks_per_column {
        for r in 0..p.rounds {
            let round = block * p.rounds + r;
            let k_offset = r as usize * p.tile_k;

            builder.transfer(TransferRequest::new(
                mem_b,
                HostBuffer::B,
                round,
                AccessPattern::contiguous(k_offset, p.tile_k),
            ));

            for (col, channels) in columns.iter().enumerate() {
                let row_offset = col * p.rows_per_column + block as usize * p.block_rows;
                builder.transfer(TransferRequest::new(
                    channels.mem_a,
                    HostBuffer::A,
                    round,
                    AccessPattern::from_pairs(
                        row_offset * p.k_total + k_offset,
                        &[(p.block_rows, p.k_total), (p.tile_k, 1)],
                    ),
                ));
            }
        }
    }
}

fn transfers_coalesced(
    builder: &mut PlanBuilder,
    p: &MatVecPartition,
    columns: &[ColumnChannels],
    mem_b: ChannelId,
) {
    transfers_output(builder, p, columns);

    builder.transfer(TransferRequest::new(
        mem_b,
        HostBuffer::B,
        0,
        AccessPattern::from_pairs(0, &[(p.blocks_per_column as usize, 0), (p.k_total, 1)]),
    ));

    for (col, channels) in columns.iter().enumerate() {
        builder.transfer(TransferRequest::new(
            channels.mem_a,
            HostBuffer::A,
            0,
            AccessPattern::from_pairs(
                col * p.rows_per_column * p.k_total,
                &[
                    (p.blocks_per_column as usize, p.block_rows * p.k_total),
                    (p.rounds as usize, p.tile_k),
                    (p.block_rows, p.k_total),
                    (p.tile_k, 1),
                ],
            ),
        ));
    }
}
