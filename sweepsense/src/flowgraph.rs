/*!
Declarative description of a streaming topology.

Nothing in here processes samples. A [`Flowgraph`] is a list of blocks that
the external streaming runtime already provides, plus the typed connections
between their ports. The capture and combination code builds one of these per
run and hands it to a [`StreamingRuntime`][crate::StreamingRuntime], which
instantiates the real blocks, connects them, and runs them.

Connections are checked as they're made: both blocks must exist, both ports
must be in range, the item types must match, and an input port can only be
fed once.
*/

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Stream item type carried on a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Complex 32-bit float samples.
    Complex32,
    /// Real 32-bit float samples.
    Float32,
}

/// A block provided by the external streaming runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Block {
    /// The opened receive device, one complex output per channel.
    DeviceSource { channels: usize },
    /// The opened transmit device, one complex input per channel.
    DeviceSink { channels: usize },
    /// Complex samples read from a file, optionally repeating forever.
    FileSource { path: PathBuf, repeat: bool },
    /// Complex samples written to a file.
    FileSink { path: PathBuf },
    /// Complex samples written to a file with segment metadata headers.
    FileMetaSink {
        path: PathBuf,
        samp_rate: f64,
        max_segment_size: u64,
        detached_header: bool,
    },
    NullSource { item: ItemType },
    NullSink { item: ItemType },
    /// Constant complex value, i.e. a zero-frequency signal source.
    ConstSource { re: f32, im: f32 },
    /// Complex cosine at `freq` Hz.
    CosineSource {
        samp_rate: f64,
        freq: f64,
        amplitude: f32,
    },
    /// Passes the first `n` items then ends the stream.
    Head { item: ItemType, n: u64 },
    /// Drops the first `n` items.
    SkipHead { n: u64 },
    /// Keeps `m` items out of every `n`, starting at `offset`.
    KeepMInN { m: u64, n: u64, offset: u64 },
    DcBlocker { length: usize, long_form: bool },
    /// `in0 * conj(in1)`
    MultiplyConjugate,
    /// `in0 + in1`
    Add,
    Throttle { samples_per_sec: f64 },
    /// Outputs magnitude on port 0 and phase on port 1.
    ComplexToMagPhase,
    ComplexToMag,
    /// Hysteresis gate: output goes to 1 above `high`, to 0 below `low`.
    Threshold { low: f32, high: f32, initial: f32 },
    /// Magnitude on input 0, phase on input 1.
    MagPhaseToComplex,
}

impl Block {
    /// Item types of each input port.
    pub fn inputs(&self) -> Vec<ItemType> {
        use ItemType::*;
        match self {
            Self::DeviceSink { channels } => vec![Complex32; *channels],
            Self::FileSink { .. } | Self::FileMetaSink { .. } => vec![Complex32],
            Self::NullSink { item } => vec![*item],
            Self::Head { item, .. } => vec![*item],
            Self::SkipHead { .. }
            | Self::KeepMInN { .. }
            | Self::DcBlocker { .. }
            | Self::Throttle { .. }
            | Self::ComplexToMagPhase
            | Self::ComplexToMag => vec![Complex32],
            Self::MultiplyConjugate | Self::Add => vec![Complex32, Complex32],
            Self::Threshold { .. } => vec![Float32],
            Self::MagPhaseToComplex => vec![Float32, Float32],
            Self::DeviceSource { .. }
            | Self::FileSource { .. }
            | Self::NullSource { .. }
            | Self::ConstSource { .. }
            | Self::CosineSource { .. } => Vec::new(),
        }
    }

    /// Item types of each output port.
    pub fn outputs(&self) -> Vec<ItemType> {
        use ItemType::*;
        match self {
            Self::DeviceSource { channels } => vec![Complex32; *channels],
            Self::NullSource { item } => vec![*item],
            Self::Head { item, .. } => vec![*item],
            Self::FileSource { .. }
            | Self::ConstSource { .. }
            | Self::CosineSource { .. }
            | Self::SkipHead { .. }
            | Self::KeepMInN { .. }
            | Self::DcBlocker { .. }
            | Self::MultiplyConjugate
            | Self::Add
            | Self::Throttle { .. }
            | Self::MagPhaseToComplex => vec![Complex32],
            Self::ComplexToMagPhase => vec![Float32, Float32],
            Self::ComplexToMag | Self::Threshold { .. } => vec![Float32],
            Self::DeviceSink { .. }
            | Self::FileSink { .. }
            | Self::FileMetaSink { .. }
            | Self::NullSink { .. } => Vec::new(),
        }
    }

    /// The file this block writes, if it's a file sink.
    pub fn sink_path(&self) -> Option<&Path> {
        match self {
            Self::FileSink { path } | Self::FileMetaSink { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Index of a block within its [`Flowgraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(usize);

impl BlockId {
    pub(crate) fn from_index(i: usize) -> Self {
        Self(i)
    }

    /// Position of the block in [`Flowgraph::blocks`].
    pub fn index(self) -> usize {
        self.0
    }
}

/// One end of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// The block.
    pub block: BlockId,
    /// Port index on that block.
    pub port: usize,
}

impl From<(BlockId, usize)> for Port {
    fn from((block, port): (BlockId, usize)) -> Self {
        Self { block, port }
    }
}

impl From<BlockId> for Port {
    fn from(block: BlockId) -> Self {
        Self { block, port: 0 }
    }
}

/// A connection from an output port to an input port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Output side.
    pub src: Port,
    /// Input side.
    pub dst: Port,
}

/// A topology of external blocks and their connections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Flowgraph {
    blocks: Vec<Block>,
    edges: Vec<Edge>,
}

impl Flowgraph {
    /// Start an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block and get its id.
    pub fn add(&mut self, block: Block) -> BlockId {
        self.blocks.push(block);
        BlockId(self.blocks.len() - 1)
    }

    /// All blocks, indexed by [`BlockId::index`].
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// All connections, in the order they were made.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Look up a block.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0)
    }

    /// Connect an output port to an input port. Passing a bare [`BlockId`]
    /// means port 0.
    pub fn connect(&mut self, src: impl Into<Port>, dst: impl Into<Port>) -> Result<(), Error> {
        let src = src.into();
        let dst = dst.into();
        let src_ty = self
            .block(src.block)
            .ok_or_else(|| Error::Topology(format!("no block {}", src.block.0)))?
            .outputs()
            .get(src.port)
            .copied()
            .ok_or_else(|| {
                Error::Topology(format!("block {} has no output {}", src.block.0, src.port))
            })?;
        let dst_ty = self
            .block(dst.block)
            .ok_or_else(|| Error::Topology(format!("no block {}", dst.block.0)))?
            .inputs()
            .get(dst.port)
            .copied()
            .ok_or_else(|| {
                Error::Topology(format!("block {} has no input {}", dst.block.0, dst.port))
            })?;
        if src_ty != dst_ty {
            return Err(Error::Topology(format!(
                "can't connect {src_ty:?} output of block {} to {dst_ty:?} input of block {}",
                src.block.0, dst.block.0
            )));
        }
        if self.upstream(dst).is_some() {
            return Err(Error::Topology(format!(
                "input {} of block {} is already connected",
                dst.port, dst.block.0
            )));
        }
        self.edges.push(Edge { src, dst });
        Ok(())
    }

    /// Connect a run of single-port blocks, port 0 to port 0.
    pub fn chain(&mut self, ids: &[BlockId]) -> Result<(), Error> {
        for pair in ids.windows(2) {
            self.connect(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// What feeds a given input port, if anything.
    pub fn upstream(&self, dst: impl Into<Port>) -> Option<Port> {
        let dst = dst.into();
        self.edges.iter().find(|e| e.dst == dst).map(|e| e.src)
    }

    /// Check every input port is fed. Unconnected outputs are allowed.
    pub fn validate(&self) -> Result<(), Error> {
        for (i, block) in self.blocks.iter().enumerate() {
            for port in 0..block.inputs().len() {
                if self.upstream((BlockId(i), port)).is_none() {
                    return Err(Error::Topology(format!(
                        "input {port} of block {i} ({block:?}) is not connected"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Paths of every file this topology writes.
    pub fn file_sinks(&self) -> impl Iterator<Item = &Path> {
        self.blocks.iter().filter_map(Block::sink_path)
    }

    /// Paths of every file this topology reads.
    pub fn file_sources(&self) -> impl Iterator<Item = &Path> {
        self.blocks.iter().filter_map(|b| match b {
            Block::FileSource { path, .. } => Some(path.as_path()),
            _ => None,
        })
    }

    /// The item limit on the path into a block: the `n` of the nearest
    /// upstream [`Block::Head`], following port 0 back. `None` means the
    /// stream is unbounded.
    pub fn limit_into(&self, id: BlockId) -> Option<u64> {
        let mut cur = Port { block: id, port: 0 };
        // Each step moves strictly upstream; a topology can't be deeper than
        // its block count.
        for _ in 0..self.blocks.len() {
            let src = self.upstream(cur)?;
            if let Some(Block::Head { n, .. }) = self.block(src.block) {
                return Some(*n);
            }
            cur = Port {
                block: src.block,
                port: 0,
            };
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_and_validate() {
        let mut fg = Flowgraph::new();
        let src = fg.add(Block::ConstSource { re: 1.0, im: 0.0 });
        let head = fg.add(Block::Head {
            item: ItemType::Complex32,
            n: 10,
        });
        let sink = fg.add(Block::FileSink {
            path: "out.dat".into(),
        });
        fg.chain(&[src, head, sink]).unwrap();
        fg.validate().unwrap();
        assert_eq!(fg.edges().len(), 2);
        assert_eq!(fg.file_sinks().collect::<Vec<_>>(), [Path::new("out.dat")]);
        assert_eq!(fg.limit_into(sink), Some(10));
    }

    #[test]
    fn mismatched_types_rejected() {
        let mut fg = Flowgraph::new();
        let src = fg.add(Block::ConstSource { re: 1.0, im: 0.0 });
        let thresh = fg.add(Block::Threshold {
            low: 0.01,
            high: 0.04,
            initial: 0.0,
        });
        assert!(matches!(fg.connect(src, thresh), Err(Error::Topology(_))));
    }

    #[test]
    fn inputs_fed_once() {
        let mut fg = Flowgraph::new();
        let a = fg.add(Block::ConstSource { re: 1.0, im: 0.0 });
        let b = fg.add(Block::ConstSource { re: 0.0, im: 1.0 });
        let sink = fg.add(Block::NullSink {
            item: ItemType::Complex32,
        });
        fg.connect(a, sink).unwrap();
        assert!(matches!(fg.connect(b, sink), Err(Error::Topology(_))));
    }

    #[test]
    fn out_of_range_ports_rejected() {
        let mut fg = Flowgraph::new();
        let src = fg.add(Block::DeviceSource { channels: 1 });
        let add = fg.add(Block::Add);
        assert!(fg.connect((src, 1), (add, 0)).is_err());
        assert!(fg.connect((src, 0), (add, 2)).is_err());
        fg.connect((src, 0), (add, 0)).unwrap();
    }

    #[test]
    fn unfed_input_fails_validation() {
        let mut fg = Flowgraph::new();
        let src = fg.add(Block::DeviceSource { channels: 1 });
        let mult = fg.add(Block::MultiplyConjugate);
        fg.connect(src, (mult, 0)).unwrap();
        assert!(matches!(fg.validate(), Err(Error::Topology(_))));
    }

    #[test]
    fn unbounded_streams_have_no_limit() {
        let mut fg = Flowgraph::new();
        let src = fg.add(Block::DeviceSource { channels: 1 });
        let sink = fg.add(Block::NullSink {
            item: ItemType::Complex32,
        });
        fg.connect(src, sink).unwrap();
        assert_eq!(fg.limit_into(sink), None);
    }
}
