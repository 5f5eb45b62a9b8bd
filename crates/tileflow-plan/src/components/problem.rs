use core::fmt::Display;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Element types moved through the grid
pub enum ElemType {
    Int8,
    Int32,
    UInt32,
}

impl ElemType {
    pub fn size(&self) -> usize {
        match self {
            ElemType::Int8 => 1,
            ElemType::Int32 | ElemType::UInt32 => 4,
        }
    }
}

impl Display for ElemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ElemType::Int8 => "i8",
            ElemType::Int32 => "i32",
            ElemType::UInt32 => "u32",
        })
    }
}

#[derive(new, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Element type and dimensions of one buffer object
pub struct BufferShape {
    pub elem: ElemType,
    pub dims: Vec<usize>,
}

impl BufferShape {
    pub fn num_elems(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn size_bytes(&self) -> usize {
        self.num_elems() * self.elem.size()
    }
}

impl Display for BufferShape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}[", self.elem)?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str("x")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// Host-visible buffers passed to the runtime sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HostBuffer {
    /// Matrix for matrix-vector, streaming source for the benchmark.
    A,
    /// Vector operand.
    B,
    /// Result vector.
    C,
    /// Tokens written back by the benchmark.
    Tokens,
}

impl Display for HostBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            HostBuffer::A => "A",
            HostBuffer::B => "B",
            HostBuffer::C => "C",
            HostBuffer::Tokens => "Tokens",
        })
    }
}

#[derive(new, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// A host buffer with its shape
pub struct HostArgument {
    pub buffer: HostBuffer,
    pub shape: BufferShape,
}

impl HostArgument {
    pub fn len(&self) -> usize {
        self.shape.num_elems()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Description of a matrix-vector problem, `C (m_total) = A (m_total x k_total) * B (k_total)`
pub struct WorkloadParams {
    /// Rows of A.
    pub m_total: usize,
    /// Columns of A, length of B.
    pub k_total: usize,
    /// Rows of one A tile.
    pub tile_m: usize,
    /// Columns of one A tile.
    pub tile_k: usize,
    /// Compute rows used per column.
    pub rows: u32,
    /// Columns used.
    pub cols: u32,
}

#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Description of the streaming bandwidth benchmark
pub struct StreamingParams {
    /// Elements of one token burst per column.
    pub burst_len: usize,
    /// Bursts streamed into a column for every token written back.
    pub token_rate: usize,
    /// Times the whole exchange is replayed.
    pub rounds: u32,
    pub rows: u32,
    pub cols: u32,
}

/// A workload to map onto the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Workload {
    MatVec(WorkloadParams),
    Streaming(StreamingParams),
}

impl Workload {
    /// Compute rows and columns requested, in that order.
    pub fn grid(&self) -> (u32, u32) {
        match self {
            Workload::MatVec(params) => (params.rows, params.cols),
            Workload::Streaming(params) => (params.rows, params.cols),
        }
    }

    /// Buffers the host passes to the runtime sequence, in argument order.
    pub fn host_arguments(&self) -> Vec<HostArgument> {
        match self {
            Workload::MatVec(params) => vec![
                HostArgument::new(
                    HostBuffer::A,
                    BufferShape::new(ElemType::Int8, vec![params.m_total, params.k_total]),
                ),
                HostArgument::new(
                    HostBuffer::B,
                    BufferShape::new(ElemType::Int8, vec![params.k_total]),
                ),
                HostArgument::new(
                    HostBuffer::C,
                    BufferShape::new(ElemType::Int32, vec![params.m_total]),
                ),
            ],
            Workload::Streaming(params) => {
                let tokens = params.cols as usize * params.burst_len;
                vec![
                    HostArgument::new(
                        HostBuffer::A,
                        BufferShape::new(ElemType::UInt32, vec![tokens, params.token_rate * 2]),
                    ),
                    HostArgument::new(
                        HostBuffer::Tokens,
                        BufferShape::new(ElemType::UInt32, vec![tokens]),
                    ),
                ]
            }
        }
    }

    pub fn host_argument(&self, buffer: HostBuffer) -> Option<HostArgument> {
        self.host_arguments()
            .into_iter()
            .find(|argument| argument.buffer == buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matvec_host_arguments() {
        let workload = Workload::MatVec(WorkloadParams::new(2048, 512, 128, 128, 1, 4));
        let c = workload.host_argument(HostBuffer::C).unwrap();

        assert_eq!(workload.host_arguments().len(), 3);
        assert_eq!(c.len(), 2048);
        assert_eq!(c.shape.size_bytes(), 2048 * 4);
        assert_eq!(workload.host_argument(HostBuffer::Tokens), None);
    }

    #[test]
    fn streaming_host_arguments() {
        let workload = Workload::Streaming(StreamingParams::new(1024, 32, 4, 1, 4));
        let a = workload.host_argument(HostBuffer::A).unwrap();

        assert_eq!(a.shape.to_string(), "u32[4096x64]");
        assert_eq!(workload.grid(), (1, 4));
    }
}
