//! The shader: arenas of values, instructions and blocks plus the metadata cache.
//!
//! A [`Shader`] exclusively owns everything it contains. Values, instructions
//! and blocks live in `Vec` arenas addressed by [`ValueId`], [`InstrId`] and
//! [`BlockId`]; removal tombstones the slot so ids are never reused.
//!
//! Reads go through the accessors in this module. All writes go through the
//! mutation API in the `mutation` and `cfg` submodules, which keep use sets and
//! predecessor lists consistent and declare every change to the
//! [`MetadataCache`] through `touch`.

mod cfg;
mod mutation;

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use strum::{Display, EnumIter};

use crate::{
    analysis::{DependencyMask, MetadataCache},
    ir::{AluOp, Block, BlockId, Cursor, Dest, InstrId, Instruction, Value, ValueId},
};

/// Size of one general register in bytes.
pub const REG_SIZE: u32 = 32;

/// Pipeline stage a shader runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ShaderStage {
    /// Vertex shader.
    #[strum(serialize = "vs")]
    Vertex,
    /// Tessellation control shader.
    #[strum(serialize = "tcs")]
    TessControl,
    /// Tessellation evaluation shader.
    #[strum(serialize = "tes")]
    TessEval,
    /// Geometry shader.
    #[strum(serialize = "gs")]
    Geometry,
    /// Fragment shader.
    #[strum(serialize = "fs")]
    Fragment,
    /// Compute shader.
    #[strum(serialize = "cs")]
    Compute,
    /// Task shader.
    #[strum(serialize = "task")]
    Task,
    /// Mesh shader.
    #[strum(serialize = "mesh")]
    Mesh,
}

/// A shader in SSA form.
#[derive(Debug, Clone)]
pub struct Shader {
    name: String,
    stage: ShaderStage,
    next_stage: Option<ShaderStage>,
    pub(crate) values: Vec<Value>,
    pub(crate) instrs: Vec<Instruction>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) layout: Vec<BlockId>,
    pub(crate) regs: Vec<u32>,
    entry: BlockId,
    pub(crate) metadata: MetadataCache,
}

impl Shader {
    /// Creates a shader with a single empty entry block.
    #[must_use]
    pub fn new(name: impl Into<String>, stage: ShaderStage) -> Self {
        let entry = BlockId::new(0);
        Shader {
            name: name.into(),
            stage,
            next_stage: None,
            values: Vec::new(),
            instrs: Vec::new(),
            blocks: vec![Block::new(entry)],
            layout: vec![entry],
            regs: Vec::new(),
            entry,
            metadata: MetadataCache::default(),
        }
    }

    /// Sets the stage consuming this shader's outputs.
    #[must_use]
    pub fn with_next_stage(mut self, next: ShaderStage) -> Self {
        self.next_stage = Some(next);
        self
    }

    /// Shader name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pipeline stage.
    #[must_use]
    pub const fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage consuming the outputs, if known.
    #[must_use]
    pub const fn next_stage(&self) -> Option<ShaderStage> {
        self.next_stage
    }

    /// Entry block.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// Value by id (live or tombstoned).
    #[must_use]
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    /// Instruction by id (live or tombstoned).
    #[must_use]
    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instrs[id.index()]
    }

    /// Block by id (live or removed).
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Live blocks in program order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.layout.iter().copied()
    }

    /// Live blocks in program order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.layout.iter().map(|b| &self.blocks[b.index()])
    }

    /// Live instructions in program order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.blocks()
            .flat_map(|b| b.instrs.iter().map(|i| &self.instrs[i.index()]))
    }

    /// Snapshot of the live instruction ids in program order.
    ///
    /// Passes iterate over the snapshot while mutating; entries removed in the
    /// meantime must be skipped with [`Instruction::is_live`].
    #[must_use]
    pub fn instr_ids(&self) -> Vec<InstrId> {
        self.blocks().flat_map(|b| b.instrs.iter().copied()).collect()
    }

    /// Live values.
    pub fn live_values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.values.iter().filter(|v| v.live)
    }

    /// Number of live instructions.
    #[must_use]
    pub fn num_instructions(&self) -> usize {
        self.blocks().map(|b| b.instrs.len()).sum()
    }

    /// Number of live values.
    #[must_use]
    pub fn num_values(&self) -> usize {
        self.live_values().count()
    }

    /// Size of the value arena, including tombstones.
    #[must_use]
    pub fn value_capacity(&self) -> usize {
        self.values.len()
    }

    /// Size of the instruction arena, including tombstones.
    #[must_use]
    pub fn instr_capacity(&self) -> usize {
        self.instrs.len()
    }

    /// Size of the block arena, including removed blocks.
    #[must_use]
    pub fn block_capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Predecessors of `block`, one entry per incoming edge.
    #[must_use]
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        &self.blocks[block.index()].preds
    }

    /// Successors of `block`, one entry per outgoing edge.
    #[must_use]
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.blocks[block.index()].terminator.successors()
    }

    /// Whether two instructions belong to the same block.
    #[must_use]
    pub fn same_block(&self, a: InstrId, b: InstrId) -> bool {
        self.instr(a).block == self.instr(b).block
    }

    /// Index of `instr` within its block.
    ///
    /// # Panics
    ///
    /// Panics if the instruction is not live.
    #[must_use]
    pub fn position(&self, instr: InstrId) -> usize {
        let inst = self.instr(instr);
        assert!(inst.live, "{instr} is not part of the shader");
        self.blocks[inst.block.index()]
            .instrs
            .iter()
            .position(|&i| i == instr)
            .unwrap_or_else(|| panic!("{instr} missing from {}", inst.block))
    }

    /// Number of phis at the top of `block`.
    #[must_use]
    pub fn phi_count(&self, block: BlockId) -> usize {
        self.blocks[block.index()]
            .instrs
            .iter()
            .take_while(|i| self.instrs[i.index()].is_phi())
            .count()
    }

    /// Phis of `block`.
    #[must_use]
    pub fn phis(&self, block: BlockId) -> Vec<InstrId> {
        self.blocks[block.index()].instrs[..self.phi_count(block)].to_vec()
    }

    /// Instruction producing `value`.
    #[must_use]
    pub fn def_instr(&self, value: ValueId) -> Option<&Instruction> {
        self.value(value).parent.map(|i| self.instr(i))
    }

    /// The ALU opcode producing `value`, if it is an ALU result.
    #[must_use]
    pub fn def_alu(&self, value: ValueId) -> Option<(InstrId, AluOp)> {
        let inst = self.def_instr(value)?;
        inst.alu_op().map(|op| (inst.id, op))
    }

    /// Constant bits of component `comp` of `value`, if it is a load-const.
    #[must_use]
    pub fn const_component(&self, value: ValueId, comp: usize) -> Option<u64> {
        match &self.def_instr(value)?.kind {
            crate::ir::InstrKind::LoadConst(bits) => bits.get(comp).copied(),
            _ => None,
        }
    }

    /// Size of VGRF `nr` in registers.
    #[must_use]
    pub fn reg_size(&self, nr: u32) -> u32 {
        self.regs[nr as usize]
    }

    /// Number of allocated VGRFs.
    #[must_use]
    pub fn num_regs(&self) -> usize {
        self.regs.len()
    }

    /// Block and index at which an instruction inserted at `cursor` lands.
    ///
    /// # Panics
    ///
    /// Panics if the cursor names a removed instruction or block.
    #[must_use]
    pub fn resolve(&self, cursor: Cursor) -> (BlockId, usize) {
        match cursor {
            Cursor::Before(i) => (self.instr(i).block, self.position(i)),
            Cursor::After(i) => (self.instr(i).block, self.position(i) + 1),
            Cursor::BlockStart(b) => {
                assert!(self.block(b).live, "{b} was removed");
                (b, self.phi_count(b))
            }
            Cursor::BlockEnd(b) => {
                assert!(self.block(b).live, "{b} was removed");
                (b, self.block(b).instrs.len())
            }
        }
    }

    /// Structural checksum of the parts of the shader named by `mask`.
    ///
    /// Two shaders with equal checksums for a mask are, with overwhelming
    /// probability, identical in those parts. Use sets are derived data and
    /// not included.
    #[must_use]
    pub fn checksum(&self, mask: DependencyMask) -> u64 {
        let mut h = DefaultHasher::new();
        if mask.contains(DependencyMask::BLOCKS) {
            self.layout.hash(&mut h);
            for block in self.blocks() {
                block.preds.hash(&mut h);
                block.terminator.hash(&mut h);
            }
        }
        if mask.contains(DependencyMask::INSTRUCTIONS) {
            for block in self.blocks() {
                block.id.hash(&mut h);
                for inst in block.instrs.iter().map(|i| &self.instrs[i.index()]) {
                    inst.id.hash(&mut h);
                    inst.kind.hash(&mut h);
                    inst.srcs.hash(&mut h);
                    inst.dest.hash(&mut h);
                    inst.exact.hash(&mut h);
                    inst.fast_math.hash(&mut h);
                    inst.exec_size.hash(&mut h);
                }
                if let Some(cond) = block.terminator.condition() {
                    cond.hash(&mut h);
                }
            }
        }
        if mask.contains(DependencyMask::VARIABLES) {
            for v in self.live_values() {
                (v.id, v.bit_size, v.num_components).hash(&mut h);
            }
            self.regs.hash(&mut h);
        }
        h.finish()
    }

    /// Bit size of what `dest` writes.
    #[must_use]
    pub fn dest_bit_size(&self, dest: &Dest) -> u8 {
        match dest {
            Dest::Value(v) => self.value(*v).bit_size,
            Dest::Reg(r) => r.reg.type_bits,
        }
    }

    /// Declares a change to the metadata cache.
    pub(crate) fn touch(&mut self, mask: DependencyMask) {
        self.metadata.invalidate(mask);
    }

    /// Evicts every cached analysis depending on `mask`.
    ///
    /// Mutations through the shader API invalidate automatically; this is for
    /// callers that want to force recomputation.
    pub fn invalidate(&mut self, mask: DependencyMask) {
        self.touch(mask);
    }
}
