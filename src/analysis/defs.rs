//! Raw registers that already behave like SSA values.
//!
//! A VGRF qualifies when exactly one instruction writes it, that write covers
//! the whole allocation unpredicated, and it dominates every read of the
//! register. Such a register can be read anywhere after its definition
//! without materializing a copy, so load insertion leaves it alone.

use crate::{
    analysis::{Analysis, AnalysisKind, DependencyMask, Dominance},
    ir::{Dest, InstrId, Instruction, RegDest, RegFile, RegRef, Shader, REG_SIZE},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefState {
    Unwritten,
    Single(InstrId),
    Invalid,
}

/// Single fully-defining writer per VGRF, where one exists.
///
/// # Examples
///
/// ```rust
/// use shadeopt::{
///     analysis::RegisterDefs,
///     ir::{Builder, Cursor, Operand, RegDest, RegRef, Shader, ShaderStage},
/// };
///
/// let mut shader = Shader::new("defs", ShaderStage::Compute);
/// let src = shader.alloc_reg(1);
/// let dst = shader.alloc_reg(1);
/// let entry = shader.entry();
/// let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
/// let mov = b.mov_reg(RegDest::new(RegRef::vgrf(dst, 32), 32), Operand::reg(RegRef::vgrf(src, 32)));
///
/// let defs = shader.require::<RegisterDefs>();
/// assert_eq!(defs.get(&RegRef::vgrf(dst, 32)), Some(mov));
/// assert!(!defs.is_ssa(src));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegisterDefs {
    defs: Vec<Option<InstrId>>,
}

impl Analysis for RegisterDefs {
    const KIND: AnalysisKind = AnalysisKind::RegisterDefs;
    const DEPENDENCIES: DependencyMask = DependencyMask::all();

    fn compute(shader: &mut Shader) -> Self {
        let dom = shader.require::<Dominance>();
        RegisterDefs::build(shader, &dom)
    }
}

impl RegisterDefs {
    /// Computes the analysis from an already built dominator tree.
    #[must_use]
    pub fn build(shader: &Shader, dom: &Dominance) -> Self {
        let mut state = vec![DefState::Unwritten; shader.num_regs()];

        for instr in shader.instructions() {
            let Some(Dest::Reg(dest)) = instr.dest() else {
                continue;
            };
            if dest.reg.file != RegFile::Vgrf {
                continue;
            }
            let slot = &mut state[dest.reg.nr as usize];
            *slot = match *slot {
                DefState::Unwritten
                    if fully_defines(shader, dest) && !instr.reads_accumulator_implicitly() =>
                {
                    DefState::Single(instr.id())
                }
                _ => DefState::Invalid,
            };
        }

        for instr in shader.instructions() {
            for reg in vgrf_reads(instr) {
                let slot = &mut state[reg.nr as usize];
                if let DefState::Single(def) = *slot {
                    if def == instr.id() || !dom.instr_dominates(shader, def, instr.id()) {
                        *slot = DefState::Invalid;
                    }
                }
            }
        }

        RegisterDefs {
            defs: state
                .into_iter()
                .map(|s| match s {
                    DefState::Single(def) => Some(def),
                    _ => None,
                })
                .collect(),
        }
    }

    /// The defining instruction of the VGRF `reg` names, if it is SSA-like.
    ///
    /// Registers outside the VGRF file never have one.
    #[must_use]
    pub fn get(&self, reg: &RegRef) -> Option<InstrId> {
        if reg.file != RegFile::Vgrf {
            return None;
        }
        self.defs.get(reg.nr as usize).copied().flatten()
    }

    /// Whether VGRF `nr` is SSA-like.
    #[must_use]
    pub fn is_ssa(&self, nr: u32) -> bool {
        self.defs.get(nr as usize).is_some_and(Option::is_some)
    }

    /// Number of SSA-like VGRFs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.defs.iter().filter(|d| d.is_some()).count()
    }
}

/// Whether `dest` overwrites the whole allocation of its VGRF in every lane.
#[must_use]
pub fn fully_defines(shader: &Shader, dest: &RegDest) -> bool {
    dest.reg.file == RegFile::Vgrf
        && !dest.is_partial_write()
        && dest.reg.offset == 0
        && (dest.reg.nr as usize) < shader.num_regs()
        && dest.size_written == shader.reg_size(dest.reg.nr) * REG_SIZE
}

fn vgrf_reads(instr: &Instruction) -> impl Iterator<Item = &RegRef> + '_ {
    instr
        .srcs()
        .iter()
        .filter_map(|op| op.as_reg())
        .filter(|r| r.file == RegFile::Vgrf)
}
