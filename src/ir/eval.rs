//! Reference interpreter.
//!
//! Executes a shader for a single invocation on concrete input varyings and
//! returns the varyings it stores. Lowering passes are tested by running a
//! shader before and after the pass and comparing the outputs.
//!
//! Values are kept as raw bit patterns, one `u64` per component, masked to the
//! value's bit size. Float arithmetic on 32- and 64-bit values is carried out
//! in `f64` and rounded to the destination width; 16-bit float arithmetic,
//! textures, memory and raw registers are reported as
//! [`Error::Unsupported`](crate::Error::Unsupported).
//!
//! # Examples
//!
//! ```rust
//! use shadeopt::ir::{eval::{self, Varyings}, Builder, Cursor, Shader, ShaderStage};
//!
//! let mut shader = Shader::new("double", ShaderStage::Fragment);
//! let entry = shader.entry();
//! let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
//! let x = b.load_input(32, 0, 1, 32);
//! let y = b.fmul_imm(x, 2.0);
//! b.store_output(y, 32, 0);
//!
//! let mut inputs = Varyings::new();
//! inputs.set_f32(32, 0, 1.5);
//! let result = eval::run(&shader, &inputs)?;
//! assert_eq!(result.outputs.get_f32(32, 0), Some(3.0));
//! # Ok::<(), shadeopt::Error>(())
//! ```

use std::collections::BTreeMap;

use crate::{
    ir::{
        float_bits, AluOp, AluType, BlockId, Dest, FloatControls, InstrKind, Instruction,
        Intrinsic, IoIndices, Operand, Shader, Src, Terminator, ValueId,
    },
    utils::{low_mask, sign_extend},
    Error, Result,
};

/// Step budget used by [`run`].
pub const DEFAULT_STEP_LIMIT: usize = 1 << 20;

/// Varying slot contents keyed by `(location, component)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Varyings {
    slots: BTreeMap<(u32, u8), u64>,
}

impl Varyings {
    /// No varyings set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the raw bits of one component.
    pub fn set(&mut self, location: u32, component: u8, bits: u64) {
        self.slots.insert((location, component), bits);
    }

    /// Sets one component to a 32-bit float.
    pub fn set_f32(&mut self, location: u32, component: u8, value: f32) {
        self.set(location, component, u64::from(value.to_bits()));
    }

    /// Raw bits of one component, if set.
    #[must_use]
    pub fn get(&self, location: u32, component: u8) -> Option<u64> {
        self.slots.get(&(location, component)).copied()
    }

    /// One component read as a 32-bit float, if set.
    #[must_use]
    pub fn get_f32(&self, location: u32, component: u8) -> Option<f32> {
        self.get(location, component).map(|b| f32::from_bits(b as u32))
    }

    /// Number of components set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All components in `(location, component)` order.
    pub fn iter(&self) -> impl Iterator<Item = ((u32, u8), u64)> + '_ {
        self.slots.iter().map(|(&k, &v)| (k, v))
    }
}

/// Result of running a shader.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Varyings written by output stores.
    pub outputs: Varyings,
    /// Instructions and terminators executed.
    pub steps: usize,
}

/// Runs `shader` with the default step budget.
///
/// # Errors
///
/// See [`run_with_limit`].
pub fn run(shader: &Shader, inputs: &Varyings) -> Result<Evaluation> {
    run_with_limit(shader, inputs, DEFAULT_STEP_LIMIT)
}

/// Runs `shader` for at most `max_steps` instructions and terminators.
///
/// Inputs that were not set read as zero.
///
/// # Errors
///
/// Returns [`Error::EvaluationLimit`] when the budget runs out,
/// [`Error::Unsupported`] for operations the interpreter does not model and
/// [`Error::Malformed`] when a value is read before it is defined.
pub fn run_with_limit(shader: &Shader, inputs: &Varyings, max_steps: usize) -> Result<Evaluation> {
    let mut machine = Machine {
        shader,
        inputs,
        outputs: Varyings::new(),
        values: vec![None; shader.value_capacity()],
    };

    let mut block = shader.entry();
    let mut prev: Option<BlockId> = None;
    let mut steps = 0usize;
    loop {
        machine.enter(block, prev)?;
        let instrs = shader.block(block).instrs();
        for &i in &instrs[shader.phi_count(block)..] {
            steps += 1;
            if steps > max_steps {
                return Err(Error::EvaluationLimit(max_steps));
            }
            machine.exec(shader.instr(i))?;
        }

        steps += 1;
        if steps > max_steps {
            return Err(Error::EvaluationLimit(max_steps));
        }
        prev = Some(block);
        block = match *shader.block(block).terminator() {
            Terminator::Jump(target) => target,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                if machine.get(cond)?[0] & 1 != 0 {
                    then_block
                } else {
                    else_block
                }
            }
            Terminator::Return => break,
        };
    }

    Ok(Evaluation {
        outputs: machine.outputs,
        steps,
    })
}

struct Machine<'a> {
    shader: &'a Shader,
    inputs: &'a Varyings,
    outputs: Varyings,
    values: Vec<Option<Vec<u64>>>,
}

impl Machine<'_> {
    fn get(&self, v: ValueId) -> Result<&[u64]> {
        self.values[v.index()]
            .as_deref()
            .ok_or_else(|| malformed_error!("{} read before it is defined", v))
    }

    /// Evaluates the phis of `block` simultaneously for the edge from `prev`.
    fn enter(&mut self, block: BlockId, prev: Option<BlockId>) -> Result<()> {
        let phis = self.shader.phis(block);
        if phis.is_empty() {
            return Ok(());
        }
        let pred = prev.ok_or_else(|| malformed_error!("phi in entry {}", block))?;

        let mut incoming = Vec::with_capacity(phis.len());
        for phi in phis {
            let instr = self.shader.instr(phi);
            let InstrKind::Phi(preds) = instr.kind() else {
                unreachable!("phis() returned a non-phi");
            };
            let slot = preds
                .iter()
                .position(|&p| p == pred)
                .ok_or_else(|| malformed_error!("{} has no operand for {}", phi, pred))?;
            let operand = instr.src(slot);
            let width = self.width_of(operand);
            let data = self.read(operand, width, AluType::Any)?;
            incoming.push((instr.def(), data));
        }
        for (dest, data) in incoming {
            if let Some(dest) = dest {
                self.values[dest.index()] = Some(data);
            }
        }
        Ok(())
    }

    fn width_of(&self, operand: &Operand) -> usize {
        operand
            .as_value()
            .map_or(1, |v| self.shader.value(v).num_components() as usize)
    }

    /// Reads `lanes` lanes of an operand through its swizzle and modifiers.
    fn read(&self, operand: &Operand, lanes: usize, ty: AluType) -> Result<Vec<u64>> {
        let v = match operand.src {
            Src::Value(v) => v,
            Src::Reg(r) => {
                return Err(Error::Unsupported(format!("register operand {r}")));
            }
        };
        let bits = u32::from(self.shader.value(v).bit_size());
        let data = self.get(v)?;
        (0..lanes)
            .map(|lane| {
                let comp = operand.swizzle.lane(lane) as usize;
                let raw = *data
                    .get(comp)
                    .ok_or_else(|| malformed_error!("{} has no component {}", v, comp))?;
                Ok(apply_modifiers(raw, bits, operand, ty))
            })
            .collect()
    }

    fn exec(&mut self, instr: &Instruction) -> Result<()> {
        let result = match instr.kind() {
            InstrKind::LoadConst(bits) => Some(bits.clone()),
            InstrKind::Undef => instr
                .def()
                .map(|v| vec![0; self.shader.value(v).num_components() as usize]),
            InstrKind::Alu(op) => Some(self.alu(instr, *op)?),
            InstrKind::Intrinsic(intr, idx) => self.intrinsic(instr, *intr, idx)?,
            InstrKind::Tex { .. } => {
                return Err(Error::Unsupported("texture access".to_string()));
            }
            InstrKind::LoadReg { .. } => {
                return Err(Error::Unsupported("register load".to_string()));
            }
            InstrKind::Phi(_) => {
                return Err(malformed_error!("phi {} after a non-phi", instr.id()));
            }
        };

        match (instr.dest(), result) {
            (Some(Dest::Value(v)), Some(data)) => {
                self.values[v.index()] = Some(data);
                Ok(())
            }
            (Some(Dest::Reg(r)), _) => Err(Error::Unsupported(format!("register write to {}", r.reg))),
            _ => Ok(()),
        }
    }

    fn alu(&self, instr: &Instruction, op: AluOp) -> Result<Vec<u64>> {
        let dest = instr
            .def()
            .ok_or_else(|| Error::Unsupported(format!("{} writes a register", instr.id())))?;
        let value = self.shader.value(dest);
        let (bits, comps) = (value.bit_size(), value.num_components() as usize);

        let mut src_bits = Vec::with_capacity(instr.srcs().len());
        let mut args = Vec::with_capacity(instr.srcs().len());
        for (slot, operand) in instr.srcs().iter().enumerate() {
            let lanes = instr.lanes_read(slot, comps, self.width_of(operand));
            src_bits.push(
                operand
                    .as_value()
                    .map_or(bits, |v| self.shader.value(v).bit_size()),
            );
            args.push(self.read(operand, lanes, op.input_type(slot))?);
        }

        match op {
            AluOp::Vec2 | AluOp::Vec3 | AluOp::Vec4 => Ok(args.iter().map(|a| a[0]).collect()),
            AluOp::Fdot2 | AluOp::Fdot3 | AluOp::Fdot4 => {
                let mut acc = 0.0f64;
                for (&x, &y) in args[0].iter().zip(&args[1]) {
                    acc += to_float(x, src_bits[0])? * to_float(y, src_bits[1])?;
                }
                Ok(vec![from_float(acc, bits)?])
            }
            _ => (0..comps)
                .map(|c| {
                    let lane: Vec<u64> = args.iter().map(|a| a[c]).collect();
                    alu_scalar(op, bits, &src_bits, &lane, instr.fast_math)
                })
                .collect(),
        }
    }

    fn intrinsic(
        &mut self,
        instr: &Instruction,
        intr: Intrinsic,
        idx: &IoIndices,
    ) -> Result<Option<Vec<u64>>> {
        match intr {
            Intrinsic::LoadInput
            | Intrinsic::LoadInterpolatedInput
            | Intrinsic::LoadPerPrimitiveInput
            | Intrinsic::LoadOutput => {
                let dest = instr
                    .def()
                    .ok_or_else(|| malformed_error!("{} without a result", intr))?;
                let value = self.shader.value(dest);
                let mask = low_mask(u32::from(value.bit_size()));
                let base = idx.location + self.slot_offset(instr.src(0))?;
                let source = if intr == Intrinsic::LoadOutput {
                    &self.outputs
                } else {
                    self.inputs
                };
                let data = (0..value.num_components())
                    .map(|c| {
                        let raw = source.get(base, idx.component + c).unwrap_or(0);
                        let raw = if idx.high_16bits { raw >> 16 } else { raw };
                        raw & mask
                    })
                    .collect();
                Ok(Some(data))
            }
            Intrinsic::StoreOutput | Intrinsic::StorePerPrimitiveOutput => {
                let stored = instr.src(0);
                let data = self.read(stored, self.width_of(stored), AluType::Any)?;
                let base = idx.location + self.slot_offset(instr.src(1))?;
                for (c, &bits) in data.iter().enumerate() {
                    if idx.write_mask & (1 << c) == 0 {
                        continue;
                    }
                    let comp = idx.component + c as u8;
                    let bits = if idx.high_16bits {
                        let low = self.outputs.get(base, comp).unwrap_or(0) & 0xffff;
                        low | ((bits & 0xffff) << 16)
                    } else {
                        bits
                    };
                    self.outputs.set(base, comp, bits);
                }
                Ok(None)
            }
            _ => Err(Error::Unsupported(format!("{intr} in the reference interpreter"))),
        }
    }

    fn slot_offset(&self, operand: &Operand) -> Result<u32> {
        Ok(self.read(operand, 1, AluType::Any)?[0] as u32)
    }
}

fn apply_modifiers(raw: u64, bits: u32, operand: &Operand, ty: AluType) -> u64 {
    let mask = low_mask(bits);
    match ty {
        AluType::Float => {
            let sign = 1u64 << (bits - 1);
            let mut out = raw;
            if operand.abs {
                out &= !sign;
            }
            if operand.negate {
                out ^= sign;
            }
            out & mask
        }
        AluType::Int => {
            let mut out = raw;
            if operand.abs {
                out = sign_extend(out, bits).wrapping_abs() as u64 & mask;
            }
            if operand.negate {
                out = out.wrapping_neg() & mask;
            }
            out
        }
        _ => raw,
    }
}

fn to_float(raw: u64, bits: u8) -> Result<f64> {
    match bits {
        32 => Ok(f64::from(f32::from_bits(raw as u32))),
        64 => Ok(f64::from_bits(raw)),
        _ => Err(Error::Unsupported(format!("{bits}-bit float arithmetic"))),
    }
}

fn from_float(value: f64, bits: u8) -> Result<u64> {
    match bits {
        32 => Ok(u64::from((value as f32).to_bits())),
        64 => Ok(value.to_bits()),
        _ => Err(Error::Unsupported(format!("{bits}-bit float arithmetic"))),
    }
}

/// Evaluates one component of a per-component ALU operation.
///
/// `args` holds the raw operand bits after modifiers, `src_bits` the bit sizes
/// of the operands and `bits` the size of the result.
///
/// # Errors
///
/// Returns [`Error::Unsupported`] for 16-bit float arithmetic and for
/// operations that are not per-component (vector constructors, dot products)
/// or read implicit state (`mac`, `dpas`).
pub fn alu_scalar(
    op: AluOp,
    bits: u8,
    src_bits: &[u8],
    args: &[u64],
    controls: FloatControls,
) -> Result<u64> {
    let s = u32::from(bits);
    let mask = low_mask(s);
    let a = args[0];
    let b = args.get(1).copied().unwrap_or(0);
    let c = args.get(2).copied().unwrap_or(0);
    let sb = src_bits[0];
    let sext = |x: u64| sign_extend(x, u32::from(sb));
    let shift = |count: u64| (count & u64::from(s - 1)) as u32;
    let float1 = |f: fn(f64) -> f64| from_float(f(to_float(a, bits)?), bits);
    let float2 = |f: fn(f64, f64) -> f64| from_float(f(to_float(a, bits)?, to_float(b, bits)?), bits);
    let cmp_f = |f: fn(f64, f64) -> bool| -> Result<u64> {
        Ok(u64::from(f(to_float(a, sb)?, to_float(b, sb)?)))
    };

    Ok(match op {
        AluOp::Mov => a,
        AluOp::Fneg => (a ^ (1 << (s - 1))) & mask,
        AluOp::Fabs => a & !(1 << (s - 1)) & mask,
        AluOp::Fadd => float2(|x, y| x + y)?,
        AluOp::Fmul => float2(|x, y| x * y)?,
        AluOp::Ffma => {
            if bits == 32 {
                let f = |r: u64| f32::from_bits(r as u32);
                u64::from(f(a).mul_add(f(b), f(c)).to_bits())
            } else {
                from_float(
                    to_float(a, bits)?.mul_add(to_float(b, bits)?, to_float(c, bits)?),
                    bits,
                )?
            }
        }
        AluOp::Frcp => float1(|x| 1.0 / x)?,
        AluOp::Fmin | AluOp::Fmax => float_min_max(op == AluOp::Fmin, a, b, bits, controls)?,
        AluOp::Atan => float1(f64::atan)?,
        AluOp::Atan2 => float2(f64::atan2)?,
        AluOp::Feq => cmp_f(|x, y| x == y)?,
        AluOp::Fneu => cmp_f(|x, y| x != y)?,
        AluOp::Flt => cmp_f(|x, y| x < y)?,
        AluOp::Fge => cmp_f(|x, y| x >= y)?,

        AluOp::Ineg => a.wrapping_neg() & mask,
        AluOp::Iabs => sign_extend(a, s).wrapping_abs() as u64 & mask,
        AluOp::Iadd => a.wrapping_add(b) & mask,
        AluOp::Isub => a.wrapping_sub(b) & mask,
        AluOp::Imul => a.wrapping_mul(b) & mask,
        AluOp::ImulHigh => {
            let product = i128::from(sign_extend(a, s)) * i128::from(sign_extend(b, s));
            (product >> s) as u64 & mask
        }
        AluOp::UmulHigh => ((u128::from(a) * u128::from(b)) >> s) as u64 & mask,
        AluOp::UaddCarry => u64::from(u128::from(a) + u128::from(b) > u128::from(mask)),
        AluOp::Iand => a & b,
        AluOp::Ior => a | b,
        AluOp::Ixor => a ^ b,
        AluOp::Inot => !a & mask,
        AluOp::Ishl => (a << shift(b)) & mask,
        AluOp::Ishr => (sign_extend(a, s) >> shift(b)) as u64 & mask,
        AluOp::Ushr => a >> shift(b),
        AluOp::Ieq => u64::from(a == b),
        AluOp::Ine => u64::from(a != b),
        AluOp::Ilt => u64::from(sext(a) < sext(b)),
        AluOp::Ige => u64::from(sext(a) >= sext(b)),
        AluOp::Ult => u64::from(a < b),
        AluOp::Imin => sign_extend(a, s).min(sign_extend(b, s)) as u64 & mask,
        AluOp::Imax => sign_extend(a, s).max(sign_extend(b, s)) as u64 & mask,
        AluOp::Umin => a.min(b),
        AluOp::Umax => a.max(b),

        AluOp::Bcsel => {
            if a & 1 != 0 {
                b
            } else {
                c
            }
        }
        AluOp::B2f => float_bits(if a & 1 != 0 { 1.0 } else { 0.0 }, bits),
        AluOp::B2i => a & 1,
        AluOp::U2u => a & mask,
        AluOp::I2i => sext(a) as u64 & mask,
        AluOp::BitfieldReverse => a.reverse_bits() >> (64 - s),
        AluOp::BitCount => u64::from(a.count_ones()),

        AluOp::Vec2
        | AluOp::Vec3
        | AluOp::Vec4
        | AluOp::Fdot2
        | AluOp::Fdot3
        | AluOp::Fdot4
        | AluOp::Mac
        | AluOp::Dpas => {
            return Err(Error::Unsupported(format!("{op} is not a per-component operation")));
        }
    })
}

/// IEEE minNum/maxNum on raw bits. Equal operands return `b`, except that
/// with signed-zero preservation `-0.0` orders below `+0.0`.
fn float_min_max(min: bool, a: u64, b: u64, bits: u8, controls: FloatControls) -> Result<u64> {
    let (x, y) = (to_float(a, bits)?, to_float(b, bits)?);
    if x.is_nan() {
        return Ok(b);
    }
    if y.is_nan() {
        return Ok(a);
    }
    if x == y {
        if x == 0.0 && controls.preserves_signed_zero(bits) {
            let a_negative = a >> (bits - 1) & 1 == 1;
            return Ok(if a_negative == min { a } else { b });
        }
        return Ok(b);
    }
    Ok(if (x < y) == min { a } else { b })
}
