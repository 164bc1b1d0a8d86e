//! Which input components each output is computed from.
//!
//! [`gather_output_dependencies`] walks the def-use graph backwards from every
//! store to a requested output slot and collects the input components it
//! transitively reads, plus whether it depends on output read-back, storage
//! buffer reads or image reads.
//!
//! Input components are recorded as bits of a [`BitSet`] with 8 bits per
//! varying slot: `slot * 8 + component * 2 + high_16bits`.
//!
//! Component tracking is precise through vector constructors and
//! per-component ALU operations; every other instruction conservatively
//! depends on all components of all its operands. Results are memoized per
//! instruction, but only for scalar values, since a vector value can have a
//! different dependency set per component.
//!
//! Phis are marked when first entered so loop back edges do not recurse
//! forever. A marked phi contributes nothing on re-entry; the first visit has
//! already folded the loop-invariant part into the caller.

use std::{collections::HashMap, fmt};

use crate::{
    ir::{InstrId, InstrKind, Instruction, Operand, Shader, ValueId},
    utils::BitSet,
};

/// Position of a shader's varying slots.
pub mod slot {
    /// Vertex position.
    pub const POS: u32 = 0;
    /// Legacy clip vertex.
    pub const CLIP_VERTEX: u32 = 16;
    /// Clip distances 0-3.
    pub const CLIP_DIST0: u32 = 17;
    /// Clip distances 4-7.
    pub const CLIP_DIST1: u32 = 18;
    /// First generic varying.
    pub const VAR0: u32 = 32;
    /// First per-patch varying.
    pub const PATCH0: u32 = 64;
    /// First 16-bit generic varying.
    pub const VAR0_16BIT: u32 = 96;
    /// Number of varying slots.
    pub const NUM_TOTAL_VARYING_SLOTS: u32 = 112;
}

/// Bits per varying slot in an input set.
pub const BITS_PER_SLOT: usize = 8;

/// Human-readable name of varying slot `location`.
#[must_use]
pub fn varying_slot_name(location: u32) -> String {
    match location {
        slot::POS => "POS".to_string(),
        slot::CLIP_VERTEX => "CLIP_VERTEX".to_string(),
        slot::CLIP_DIST0 => "CLIP_DIST0".to_string(),
        slot::CLIP_DIST1 => "CLIP_DIST1".to_string(),
        l if (slot::VAR0..slot::PATCH0).contains(&l) => format!("VAR{}", l - slot::VAR0),
        l if (slot::PATCH0..slot::VAR0_16BIT).contains(&l) => format!("PATCH{}", l - slot::PATCH0),
        l if (slot::VAR0_16BIT..slot::NUM_TOTAL_VARYING_SLOTS).contains(&l) => {
            format!("VAR{}_16BIT", l - slot::VAR0_16BIT)
        }
        l => format!("SLOT{l}"),
    }
}

fn input_set() -> BitSet {
    BitSet::new(slot::NUM_TOTAL_VARYING_SLOTS as usize * BITS_PER_SLOT)
}

/// Dependencies of one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeps {
    /// Input component bits read.
    pub inputs: BitSet,
    /// Reads back a previously written output.
    pub uses_output_load: bool,
    /// Reads a storage buffer.
    pub uses_ssbo_reads: bool,
    /// Reads texels of an image or texture.
    pub uses_image_reads: bool,
}

impl Default for OutputDeps {
    fn default() -> Self {
        OutputDeps {
            inputs: input_set(),
            uses_output_load: false,
            uses_ssbo_reads: false,
            uses_image_reads: false,
        }
    }
}

impl OutputDeps {
    fn merge(&mut self, other: &OutputDeps) {
        self.inputs.union_with(&other.inputs);
        self.uses_output_load |= other.uses_output_load;
        self.uses_ssbo_reads |= other.uses_ssbo_reads;
        self.uses_image_reads |= other.uses_image_reads;
    }

    /// Whether input component `component` of slot `location` is read.
    #[must_use]
    pub fn reads_input(&self, location: u32, component: u8, high_16bits: bool) -> bool {
        self.inputs
            .contains(input_bit(location, u32::from(component), high_16bits))
    }
}

/// `12.x 12.y.hi (output_load)`
impl fmt::Display for OutputDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LETTERS: [char; 4] = ['x', 'y', 'z', 'w'];
        let mut parts = Vec::new();
        for bit in self.inputs.iter() {
            let comp = (bit % BITS_PER_SLOT) / 2;
            parts.push(format!(
                "{}.{}{}",
                bit / BITS_PER_SLOT,
                LETTERS[comp],
                if bit % 2 == 1 { ".hi" } else { "" }
            ));
        }
        for (set, label) in [
            (self.uses_output_load, "(output_load)"),
            (self.uses_ssbo_reads, "(ssbo read)"),
            (self.uses_image_reads, "(image read)"),
        ] {
            if set {
                parts.push(label.to_string());
            }
        }
        f.write_str(&parts.join(" "))
    }
}

/// Dependencies of a list of outputs, in the order they were requested.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputsDeps {
    /// Requested output slots.
    pub locations: Vec<u32>,
    /// Dependencies, parallel to `locations`.
    pub outputs: Vec<OutputDeps>,
}

impl OutputsDeps {
    /// Dependencies of output slot `location`, if it was requested.
    #[must_use]
    pub fn get(&self, location: u32) -> Option<&OutputDeps> {
        self.locations
            .iter()
            .position(|&l| l == location)
            .map(|i| &self.outputs[i])
    }

    /// Renders one line per output, `vs(->fs): VAR0 = 0.x 1.y`.
    #[must_use]
    pub fn render(&self, shader: &Shader) -> String {
        let next = shader
            .next_stage()
            .map_or_else(|| "none".to_string(), |s| s.to_string());
        let mut out = String::new();
        for (&location, deps) in self.locations.iter().zip(&self.outputs) {
            out.push_str(&format!(
                "{}(->{next}): {} = {deps}\n",
                shader.stage(),
                varying_slot_name(location)
            ));
        }
        out
    }
}

const fn input_bit(location: u32, component: u32, high_16bits: bool) -> usize {
    (location as usize) * BITS_PER_SLOT + (component as usize) * 2 + high_16bits as usize
}

struct Gather<'a> {
    shader: &'a Shader,
    memo: HashMap<InstrId, OutputDeps>,
    visited_phis: BitSet,
}

impl Gather<'_> {
    /// Dependencies of the components `read` of `value`, folded into `into`.
    fn value(&mut self, value: ValueId, read: u32, into: &mut OutputDeps) {
        let shader = self.shader;
        let Some(def) = shader.value(value).parent() else {
            return;
        };
        let instr = shader.instr(def);
        match instr.kind() {
            InstrKind::LoadConst(_) | InstrKind::Undef => return,
            _ => {}
        }
        if let Some(cached) = self.memo.get(&def) {
            into.merge(cached);
            return;
        }
        if instr.is_phi() && !self.visited_phis.insert(def.index()) {
            return;
        }

        let mut cur = OutputDeps::default();
        self.own_reads(instr, read, &mut cur);
        self.sources(instr, read, &mut cur);
        into.merge(&cur);
        if shader.value(value).num_components() == 1 {
            self.memo.insert(def, cur);
        }
    }

    fn own_reads(&self, instr: &Instruction, read: u32, cur: &mut OutputDeps) {
        match instr.kind() {
            InstrKind::Intrinsic(intr, idx) => {
                if intr.is_input_load() {
                    assert!(idx.num_slots >= 1, "{} reads no slots", instr.id());
                    let comps = instr
                        .def()
                        .map_or(0, |v| u32::from(self.shader.value(v).num_components()));
                    let mask = read & ((1u32 << comps) - 1);
                    for i in 0..idx.num_slots {
                        for c in (0..comps).filter(|c| mask & (1 << c) != 0) {
                            cur.inputs.insert(input_bit(
                                idx.location + i,
                                u32::from(idx.component) + c,
                                idx.high_16bits,
                            ));
                        }
                    }
                } else if intr.is_output_load() {
                    cur.uses_output_load = true;
                } else {
                    cur.uses_ssbo_reads |= intr.is_ssbo_read();
                    cur.uses_image_reads |= intr.is_image_read();
                }
            }
            InstrKind::Tex { query } => cur.uses_image_reads |= !query,
            _ => {}
        }
    }

    fn sources(&mut self, instr: &Instruction, read: u32, cur: &mut OutputDeps) {
        let Some(op) = instr.alu_op() else {
            for operand in instr.srcs() {
                if let Some(v) = operand.as_value() {
                    self.value(v, u32::MAX, cur);
                }
            }
            return;
        };

        let dest_comps = instr
            .def()
            .map_or(1, |v| usize::from(self.shader.value(v).num_components()));
        let dest_mask = read & ((1u32 << dest_comps) - 1);

        if op.is_vec() {
            for i in (0..dest_comps).filter(|&i| dest_mask & (1 << i) != 0) {
                self.operand(instr.src(i), 1 << instr.src(i).swizzle.lane(0), cur);
            }
        } else if op.output_size() != 0 {
            // Not per-component: every component of every source counts.
            for operand in instr.srcs() {
                let mask = (1u32 << self.width_of(operand)) - 1;
                self.operand(operand, mask, cur);
            }
        } else {
            for operand in instr.srcs() {
                let mask = (0..dest_comps)
                    .filter(|&c| dest_mask & (1 << c) != 0)
                    .fold(0, |m, c| m | 1 << operand.swizzle.lane(c));
                self.operand(operand, mask, cur);
            }
        }
    }

    fn operand(&mut self, operand: &Operand, read: u32, cur: &mut OutputDeps) {
        if let Some(v) = operand.as_value() {
            self.value(v, read, cur);
        }
    }

    fn width_of(&self, operand: &Operand) -> usize {
        operand
            .as_value()
            .map_or(1, |v| usize::from(self.shader.value(v).num_components()))
    }
}

/// Gathers the dependencies of the output slots `locations`.
///
/// A store covering several slots counts for the first requested slot within
/// its range. Stores to slots that were not requested are ignored.
///
/// # Panics
///
/// Panics if an output store's write mask is not contiguous from `x`.
///
/// # Examples
///
/// ```rust
/// use shadeopt::{analysis::output_deps::gather_output_dependencies, ir::{Builder, Cursor, Shader, ShaderStage}};
///
/// let mut shader = Shader::new("deps", ShaderStage::Vertex);
/// let entry = shader.entry();
/// let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
/// let a = b.load_input(12, 0, 2, 32);
/// let y = b.channel(a, 1);
/// let s = b.fadd(y, y);
/// b.store_output(s, 32, 0);
///
/// let deps = gather_output_dependencies(&shader, &[32]);
/// assert_eq!(deps.get(32).unwrap().to_string(), "12.y");
/// ```
#[must_use]
pub fn gather_output_dependencies(shader: &Shader, locations: &[u32]) -> OutputsDeps {
    let mut all = OutputsDeps {
        locations: locations.to_vec(),
        outputs: vec![OutputDeps::default(); locations.len()],
    };
    let mut gather = Gather {
        shader,
        memo: HashMap::new(),
        visited_phis: BitSet::new(shader.instr_capacity()),
    };

    for instr in shader.instructions() {
        let InstrKind::Intrinsic(intr, idx) = instr.kind() else {
            continue;
        };
        if !intr.is_output_store() {
            continue;
        }
        assert!(idx.num_slots >= 1, "{} writes no slots", instr.id());
        let mask = u32::from(idx.write_mask);
        assert_eq!(
            mask,
            (1u32 << mask.count_ones()) - 1,
            "write mask of {} is not contiguous",
            instr.id()
        );

        let range = idx.location..idx.location + idx.num_slots;
        let Some(index) = locations.iter().position(|l| range.contains(l)) else {
            continue;
        };

        let stored = instr.src(0);
        let Some(value) = stored.as_value() else {
            continue;
        };
        let comps = shader.value(value).num_components();
        let read = (0..comps).fold(0, |m, c| m | 1 << stored.swizzle.lane(usize::from(c)));

        gather.visited_phis.clear();
        let mut deps = std::mem::take(&mut all.outputs[index]);
        gather.value(value, read, &mut deps);
        all.outputs[index] = deps;
    }
    all
}

/// Input components split by the kind of output they feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipperVarGroups {
    /// Only used for position and clip outputs.
    pub pos_only: BitSet,
    /// Only used for other outputs.
    pub var_only: BitSet,
    /// Used for both.
    pub both: BitSet,
}

/// Output slots `shader` stores to, in ascending order.
#[must_use]
pub fn outputs_written(shader: &Shader) -> Vec<u32> {
    let mut slots: Vec<u32> = shader
        .instructions()
        .filter_map(|i| match i.kind() {
            InstrKind::Intrinsic(intr, idx) if intr.is_output_store() => {
                Some(idx.location..idx.location + idx.num_slots.max(1))
            }
            _ => None,
        })
        .flatten()
        .collect();
    slots.sort_unstable();
    slots.dedup();
    slots
}

/// Splits the inputs into those feeding only the clipper outputs (position,
/// clip vertex, clip distances), only the remaining outputs, or both.
///
/// Patch outputs are not considered; shaders feeding the clipper have none.
///
/// # Panics
///
/// Panics if an output depends on reading back an output.
#[must_use]
pub fn gather_output_clipper_var_groups(shader: &Shader) -> ClipperVarGroups {
    let clipper = [slot::POS, slot::CLIP_VERTEX, slot::CLIP_DIST0, slot::CLIP_DIST1];
    let written = outputs_written(shader);
    let is_patch = |l: u32| (slot::PATCH0..slot::VAR0_16BIT).contains(&l);

    let pos: Vec<u32> = written.iter().copied().filter(|l| clipper.contains(l)).collect();
    let var: Vec<u32> = written
        .iter()
        .copied()
        .filter(|&l| !clipper.contains(&l) && !is_patch(l))
        .collect();

    let union_of = |locations: &[u32]| {
        let mut set = input_set();
        if locations.is_empty() {
            return set;
        }
        for deps in gather_output_dependencies(shader, locations).outputs {
            assert!(!deps.uses_output_load, "clipper grouping with output read-back");
            set.union_with(&deps.inputs);
        }
        set
    };
    let mut pos_only = union_of(&pos);
    let mut var_only = union_of(&var);

    let mut both = pos_only.clone();
    both.intersect_with(&var_only);
    pos_only.difference_with(&both);
    var_only.difference_with(&both);

    ClipperVarGroups {
        pos_only,
        var_only,
        both,
    }
}
